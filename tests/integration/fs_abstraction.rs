// tests/integration/fs_abstraction.rs

use std::path::PathBuf;

use pipechain::fs::mock::MockFileSystem;
use pipechain::fs::{FileSystem, RealFileSystem};

#[test]
fn mock_fs_tracks_mtimes_and_failures() {
    let fs = MockFileSystem::new();
    let path = PathBuf::from("data/input.csv");

    assert_eq!(fs.modified_secs(&path).unwrap(), None);

    fs.add_file_with_mtime(&path, "a,b\n", 12.5);
    assert!(fs.exists(&path));
    assert_eq!(fs.modified_secs(&path).unwrap(), Some(12.5));
    assert_eq!(fs.read_to_string(&path).unwrap(), "a,b\n");

    fs.set_modified(&path, 20.0);
    assert_eq!(fs.modified_secs(&path).unwrap(), Some(20.0));
    // Writing keeps the mtime the test chose.
    fs.write(&path, b"x").unwrap();
    assert_eq!(fs.modified_secs(&path).unwrap(), Some(20.0));

    fs.set_fail_stat(true);
    assert!(fs.modified_secs(&path).is_err());
    fs.set_fail_stat(false);

    fs.remove(&path);
    assert_eq!(fs.modified_secs(&path).unwrap(), None);
}

#[test]
fn real_fs_reports_missing_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let fs = RealFileSystem;
    let path = dir.path().join("nested/file.csv");

    assert_eq!(fs.modified_secs(&path).unwrap(), None);

    fs.write(&path, b"id\n1\n").unwrap();
    let mtime = fs.modified_secs(&path).unwrap().unwrap();
    assert!(mtime > 0.0);
    assert_eq!(fs.read_to_string(&path).unwrap(), "id\n1\n");
}
