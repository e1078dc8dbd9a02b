//! The graph of node files describing what goes into an archive.
//!
//! A node file lists child nodes and the files it contributes, one per line:
//!
//! ```text
//! Node=Levels/Track1.gdn
//! File=Levels/Track1/track.bin
//! ```
//!
//! Paths are relative to the compiled data root. Other lines are ignored.

use crate::error::{ErrorKind, Result};
use databuild_storage::{logical_name, validate_path};
use exn::ResultExt;
use std::collections::{HashSet, VecDeque};
use std::path::Path;

/// Every node reachable from a root node and the files they list, each in
/// breadth-first, first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeGraph {
    nodes: Vec<String>,
    files: Vec<String>,
}
impl NodeGraph {
    /// Walk the graph from `main` under `root`. Nodes referenced more than
    /// once (including cycles) are read once.
    pub fn load(root: impl AsRef<Path>, main: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let mut graph = Self::default();
        let mut seen_nodes = HashSet::new();
        let mut seen_files = HashSet::new();
        let mut queue = VecDeque::from([logical_name(main)]);
        while let Some(node) = queue.pop_front() {
            if !seen_nodes.insert(node.clone()) {
                continue;
            }
            for line in read_node(&root.join(&node))?.lines() {
                let Some(line) = parse_line(line) else {
                    continue;
                };
                let (Line::Node(path) | Line::File(path)) = line;
                // Everything a node lists has to live under the root.
                let Ok(path) = validate_path(path) else {
                    tracing::warn!(node = %node, path, "Ignoring path outside the data root");
                    continue;
                };
                let path = logical_name(path);
                match line {
                    Line::Node(_) => queue.push_back(path),
                    Line::File(_) if seen_files.insert(path.clone()) => graph.files.push(path),
                    Line::File(_) => {},
                }
            }
            graph.nodes.push(node);
        }
        tracing::debug!(nodes = graph.nodes.len(), files = graph.files.len(), "Loaded node graph");
        Ok(graph)
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }
}

#[derive(Clone, Copy)]
enum Line<'a> {
    Node(&'a str),
    File(&'a str),
}

fn parse_line(line: &str) -> Option<Line<'_>> {
    let (key, value) = line.split_once('=')?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    match key.trim() {
        "Node" => Some(Line::Node(value)),
        "File" => Some(Line::File(value)),
        _ => None,
    }
}

fn read_node(path: &Path) -> Result<String> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => exn::bail!(ErrorKind::NodeNotFound(path.to_path_buf())),
        Err(e) => Err(e).or_raise(|| ErrorKind::Read(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, node: &str, contents: &str) {
        let path = root.join(node);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_breadth_first_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        write(root, "Game.gdn", "Node=Levels/A.gdn\nFile=boot.bin\nNode=Levels/B.gdn\n");
        write(root, "Levels/A.gdn", "File=Levels/A/a.bin\nNode=Levels/A/Deep.gdn\r\n");
        write(root, "Levels/B.gdn", "File=Levels/B/b.bin\n# comment\nFile=boot.bin\n");
        write(root, "Levels/A/Deep.gdn", "File = Levels/A/deep.bin\n");

        let graph = NodeGraph::load(root, "Game.gdn").unwrap();
        assert_eq!(graph.nodes(), ["Game.gdn", "Levels/A.gdn", "Levels/B.gdn", "Levels/A/Deep.gdn"]);
        assert_eq!(graph.files(), ["boot.bin", "Levels/A/a.bin", "Levels/B/b.bin", "Levels/A/deep.bin"]);
    }

    #[test]
    fn test_cycles_terminate() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        write(root, "Game.gdn", "Node=Sub.gdn\nFile=a.bin\n");
        write(root, "Sub.gdn", "Node=Game.gdn\nNode=./Sub.gdn\nFile=b.bin\nFile=../outside.bin\nFile=x/../a.bin\n");
        let graph = NodeGraph::load(root, "Game.gdn").unwrap();
        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(graph.files(), ["a.bin", "b.bin"]);
    }

    #[test]
    fn test_missing_node() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        write(root, "Game.gdn", "Node=Missing.gdn\n");
        let err = NodeGraph::load(root, "Game.gdn").unwrap_err();
        assert!(matches!(&*err, ErrorKind::NodeNotFound(path) if path.ends_with("Missing.gdn")));
        assert!(NodeGraph::load(root, "Other.gdn").is_err());
    }
}
