use databuild_bigfile::{BigfileConfig, Toc};
use databuild_config::{Config, Paths};
use databuild_linker::error::ErrorKind;
use databuild_linker::{FileEntryCache, LinkOutcome, Linker};
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

fn config(root: &Path) -> Config {
    Config {
        name: "Game".to_string(),
        paths: Paths {
            src: root.join("Src"),
            dst: root.join("Bin"),
            dep: root.join("Dep"),
            publish: root.join("Publish"),
        },
        build_bigfile: true,
        threads: 2,
        bigfile: BigfileConfig { file_alignment: 16, ..BigfileConfig::default() },
        ..Config::default()
    }
}

fn write(path: impl AsRef<Path>, contents: &[u8]) {
    let path = path.as_ref();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Give a file a write time that can't collide with the one it had.
fn touch(path: impl AsRef<Path>, seconds_ago: u64) {
    let at = SystemTime::now() - Duration::from_secs(seconds_ago);
    File::options().write(true).open(path).unwrap().set_modified(at).unwrap();
}

/// Compiled data for `a.bin`, `b.bin` (same bytes as `a.bin`) and `c.bin`,
/// spread over two nodes.
fn fixture(config: &Config) {
    let dst = &config.paths.dst;
    write(dst.join("Game.gdn"), b"Node=Levels/Track1.gdn\nFile=a.bin\n");
    write(dst.join("Levels/Track1.gdn"), b"File=Levels/Track1/b.bin\nFile=c.bin\n");
    write(dst.join("a.bin"), b"hello world");
    write(dst.join("Levels/Track1/b.bin"), b"hello world");
    write(dst.join("c.bin"), b"other");
}

fn run(config: &Config) -> LinkOutcome {
    Linker::new(config).unwrap().run().unwrap()
}

fn artifacts(config: &Config) -> Vec<Vec<u8>> {
    ["gda", "gdt", "gdf", "gdh"].iter().map(|ext| fs::read(config.paths.publish.join(format!("Game.{ext}"))).unwrap()).collect()
}

#[test]
fn test_second_run_is_up_to_date() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config(temp_dir.path());
    fixture(&config);

    assert_eq!(run(&config), LinkOutcome::Linked { entries: 2, instances: 3 });
    let first = artifacts(&config);
    assert_eq!(run(&config), LinkOutcome::UpToDate);
    assert_eq!(run(&config), LinkOutcome::UpToDate);
    assert_eq!(artifacts(&config), first);

    let toc = Toc::load(&config.paths.publish, "Game", &config.bigfile).unwrap();
    let (a, a_instance) = toc.find("a.bin").unwrap();
    let (_, b_instance) = toc.find("Levels/Track1/b.bin").unwrap();
    let (_, c_instance) = toc.find("c.bin").unwrap();
    assert_eq!(a.size, 11);
    assert_eq!(a_instance.offset, 0);
    assert_eq!(b_instance.offset, 0);
    assert_eq!(c_instance.offset, 16);

    let cache = FileEntryCache::load(Linker::new(&config).unwrap().cache_path()).unwrap();
    let paths: Vec<_> = cache.iter().map(|entry| entry.path()).collect();
    assert_eq!(paths, ["a.bin", "Levels/Track1/b.bin", "c.bin"]);
}

#[test]
fn test_changed_file_relinks() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config(temp_dir.path());
    fixture(&config);
    run(&config);

    let c = config.paths.dst.join("c.bin");
    fs::write(&c, b"changed!").unwrap();
    touch(&c, 3600);
    assert_eq!(run(&config), LinkOutcome::Linked { entries: 2, instances: 3 });
    let toc = Toc::load(&config.paths.publish, "Game", &config.bigfile).unwrap();
    assert_eq!(toc.find("c.bin").unwrap().0.size, 8);
    assert_eq!(run(&config), LinkOutcome::UpToDate);
}

#[test]
fn test_removed_file_relinks() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config(temp_dir.path());
    fixture(&config);
    run(&config);

    // Dropped from the graph while the file itself stays untouched.
    let node = config.paths.dst.join("Levels/Track1.gdn");
    write(&node, b"File=Levels/Track1/b.bin\n");
    assert_eq!(run(&config), LinkOutcome::Linked { entries: 1, instances: 2 });
    let toc = Toc::load(&config.paths.publish, "Game", &config.bigfile).unwrap();
    assert!(toc.find("c.bin").is_none());
    assert_eq!(run(&config), LinkOutcome::UpToDate);
}

#[test]
fn test_missing_output_relinks() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config(temp_dir.path());
    fixture(&config);
    run(&config);

    fs::remove_file(config.paths.publish.join("Game.gdh")).unwrap();
    assert!(matches!(run(&config), LinkOutcome::Linked { .. }));
    assert!(config.paths.publish.join("Game.gdh").is_file());
    assert_eq!(run(&config), LinkOutcome::UpToDate);
}

#[test]
fn test_failed_link_keeps_previous_archive() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config(temp_dir.path());
    fixture(&config);
    run(&config);
    let before = artifacts(&config);

    write(config.paths.dst.join("Game.gdn"), b"Node=Levels/Track1.gdn\nFile=a.bin\nFile=missing.bin\n");
    let err = Linker::new(&config).unwrap().run().unwrap_err();
    assert!(matches!(&*err, ErrorKind::Archive));
    assert_eq!(artifacts(&config), before);
}

#[test]
fn test_missing_root_node() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config(temp_dir.path());
    let err = Linker::new(&config).unwrap().run().unwrap_err();
    assert!(matches!(&*err, ErrorKind::NodeNotFound(_)));
}

#[test]
fn test_toc_only_then_payload() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = config(temp_dir.path());
    fixture(&config);
    config.build_bigfile = false;
    assert!(matches!(run(&config), LinkOutcome::Linked { .. }));
    assert!(!config.paths.publish.join("Game.gda").exists());
    assert_eq!(run(&config), LinkOutcome::UpToDate);

    let toc_only = fs::read(config.paths.publish.join("Game.gdt")).unwrap();
    config.build_bigfile = true;
    assert!(matches!(run(&config), LinkOutcome::Linked { .. }));
    assert!(config.paths.publish.join("Game.gda").is_file());
    assert_eq!(fs::read(config.paths.publish.join("Game.gdt")).unwrap(), toc_only);
    assert_eq!(run(&config), LinkOutcome::UpToDate);
}

#[test]
fn test_moved_publish_folder_relinks() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = config(temp_dir.path());
    fixture(&config);
    config.build_bigfile = false;
    config.paths.publish = temp_dir.path().join("Publish1");
    assert!(matches!(run(&config), LinkOutcome::Linked { .. }));
    assert_eq!(run(&config), LinkOutcome::UpToDate);

    config.paths.publish = temp_dir.path().join("Publish2");
    assert_eq!(run(&config), LinkOutcome::Linked { entries: 2, instances: 3 });
    assert!(config.paths.publish.join("Game.gdt").is_file());
    assert_eq!(run(&config), LinkOutcome::UpToDate);
}

#[test]
fn test_unreadable_record_relinks() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = config(temp_dir.path());
    fixture(&config);
    run(&config);

    let linker = Linker::new(&config).unwrap();
    write(linker.record_path(), b"FILE={\n\tHASH=nope\n}\n");
    assert!(matches!(linker.run().unwrap(), LinkOutcome::Linked { .. }));
    assert_eq!(linker.run().unwrap(), LinkOutcome::UpToDate);
}
