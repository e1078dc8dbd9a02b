//! Line-based text records.
//!
//! ```text
//! FILE={
//!     FILENAME=Cars/BMW/body.mesh
//!     FOLDER=/data/Src
//!     USERKEY=release
//!     METHOD=TIMESTAMP
//!     RULE=ON_CHANGE
//!     HASH=00000000000000000008DC1E3B7A2F1C
//!     IN={
//!         FILENAME=Cars/BMW/body.mtl
//!         ...
//!     }
//!     OUT={
//!         ...
//!     }
//! }
//! ```
//!
//! Lines are matched by key prefix after trimming, so scalar lines may come in
//! any order and keys this reader doesn't know are skipped. An `IN`/`OUT`
//! block may also sit on a single line, `IN={ FILENAME=a.mtl FOLDER=/data }`,
//! with its fields separated by whitespace.

use super::{method_token, parse_method, parse_rule, rule_token};
use crate::error::{ErrorKind, Result};
use crate::file::DepFile;
use crate::record::{DepRecord, DepRule};
use databuild_hash::{Digest, HashMethod};
use std::fmt::Write;
use std::path::PathBuf;

pub(super) fn write(files: &[DepFile]) -> String {
    let mut out = String::new();
    for file in files {
        out.push_str("FILE={\n");
        write_fields(&mut out, file.main(), "\t", Some(file.user_key()));
        for (key, records) in [("IN", file.inputs()), ("OUT", file.outputs())] {
            for record in records {
                let _ = writeln!(out, "\t{key}={{");
                write_fields(&mut out, record, "\t\t", None);
                out.push_str("\t}\n");
            }
        }
        out.push_str("}\n");
    }
    out
}

fn write_fields(out: &mut String, record: &DepRecord, indent: &str, user_key: Option<&str>) {
    // Writing to a String can't fail.
    let _ = writeln!(out, "{indent}FILENAME={}", record.filename());
    let _ = writeln!(out, "{indent}FOLDER={}", record.folder().display());
    if let Some(user_key) = user_key {
        let _ = writeln!(out, "{indent}USERKEY={user_key}");
    }
    let _ = writeln!(out, "{indent}METHOD={}", method_token(record.method()));
    let _ = writeln!(out, "{indent}RULE={}", rule_token(record.rule()));
    let _ = writeln!(out, "{indent}HASH={}", record.hash());
}

/// Fields collected for one record before it's built.
#[derive(Default)]
struct Fields {
    filename: String,
    folder: PathBuf,
    method: HashMethod,
    rule: DepRule,
    hash: Digest,
}
impl Fields {
    /// Set one field. Unknown keys are ignored; `Err` names what was invalid.
    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), &'static str> {
        match key {
            "FILENAME" => self.filename = value.to_string(),
            "FOLDER" => self.folder = PathBuf::from(value),
            "METHOD" => self.method = parse_method(value).ok_or("unknown METHOD")?,
            "RULE" => self.rule = parse_rule(value).ok_or("unknown RULE")?,
            "HASH" => self.hash = value.parse().map_err(|_| "invalid HASH")?,
            _ => {},
        }
        Ok(())
    }

    fn build(self) -> DepRecord {
        DepRecord::new(self.filename, self.folder)
            .with_method(self.method)
            .with_rule(self.rule)
            .with_hash(self.hash)
    }
}

enum Block {
    In,
    Out,
}

pub(super) fn read_all(text: &str) -> Result<Vec<DepFile>> {
    let mut lines = text.lines().enumerate();
    let mut files = Vec::new();
    loop {
        match read_one(&mut lines) {
            Ok(Some(file)) => files.push(file),
            Ok(None) => break,
            Err(e) if files.is_empty() => return Err(e),
            Err(e) => {
                tracing::warn!(error = ?e, kept = files.len(), "Stopped reading dependency records at a malformed record");
                break;
            },
        }
    }
    Ok(files)
}

/// Read up to and including the `}` closing the next record. `None` when only
/// blank lines (or nothing) are left.
fn read_one<'a>(lines: &mut impl Iterator<Item = (usize, &'a str)>) -> Result<Option<DepFile>> {
    let mut started = false;
    let mut main = Fields::default();
    let mut user_key = String::new();
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    // The IN/OUT block currently open, if any.
    let mut open: Option<(Block, Fields)> = None;

    for (number, line) in lines {
        let line = line.trim_matches([' ', '\t', '\r']);
        let malformed = |what: &str| ErrorKind::malformed(format!("line {}: {what}", number + 1));
        if line.is_empty() {
            continue;
        }
        if line.starts_with("FILE=") {
            if started {
                exn::bail!(malformed("record opened before the previous one was closed"));
            }
            started = true;
            continue;
        }
        if !started {
            // Whatever precedes the first record isn't ours to judge.
            continue;
        }
        if line == "}" {
            match open.take() {
                Some((Block::In, fields)) => inputs.push(fields.build()),
                Some((Block::Out, fields)) => outputs.push(fields.build()),
                None => {
                    let mut file = DepFile::from_main(main.build());
                    file.set_user_key(user_key);
                    inputs.into_iter().for_each(|record| {
                        file.push_in(record);
                    });
                    outputs.into_iter().for_each(|record| {
                        file.push_out(record);
                    });
                    return Ok(Some(file));
                },
            }
            continue;
        }
        let block = match (line.starts_with("IN="), line.starts_with("OUT=")) {
            (true, _) => Some(Block::In),
            (_, true) => Some(Block::Out),
            _ => None,
        };
        if let Some(block) = block {
            if open.is_some() {
                exn::bail!(malformed("nested IN/OUT block"));
            }
            let inline = line.split_once('{').map_or("", |(_, rest)| rest).trim();
            if inline.is_empty() {
                open = Some((block, Fields::default()));
                continue;
            }
            let Some(body) = inline.strip_suffix('}') else {
                exn::bail!(malformed("single-line IN/OUT block isn't closed"));
            };
            let mut fields = Fields::default();
            for (key, value) in inline_fields(body) {
                fields.set(key, &value).map_err(malformed)?;
            }
            match block {
                Block::In => inputs.push(fields.build()),
                Block::Out => outputs.push(fields.build()),
            }
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let in_block = open.is_some();
        let fields = match open {
            Some((_, ref mut fields)) => fields,
            None => &mut main,
        };
        match key {
            "USERKEY" if !in_block => user_key = value.to_string(),
            _ => fields.set(key, value).map_err(malformed)?,
        }
    }
    match started {
        true => exn::bail!(ErrorKind::malformed("record is truncated")),
        false => Ok(None),
    }
}

/// Split the inside of a single-line block into `KEY=value` pairs. A word
/// without an upper-case key belongs to the previous value, so values may
/// contain spaces.
fn inline_fields(body: &str) -> Vec<(&str, String)> {
    let mut fields: Vec<(&str, String)> = Vec::new();
    for word in body.split_whitespace() {
        let key = word
            .split_once('=')
            .map(|(key, _)| key)
            .filter(|key| !key.is_empty() && key.bytes().all(|b| b.is_ascii_uppercase() || b == b'_'));
        match key {
            Some(key) => fields.push((key, word[key.len() + 1..].to_string())),
            None => {
                if let Some((_, value)) = fields.last_mut() {
                    value.push(' ');
                    value.push_str(word);
                }
            },
        }
    }
    fields
}
