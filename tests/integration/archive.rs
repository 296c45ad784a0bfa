//! Content root discovery for arbitrary archive layouts.

use appsync_cli::core::{DeployError, ErrorClass};
use appsync_cli::snapshot::{StagingArea, tree_digest};
use appsync_cli::test_utils::zip_with_root;
use std::io::{Cursor, Write};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn zip_entries(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        match content {
            Some(content) => {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            None => writer.add_directory(*name, SimpleFileOptions::default()).unwrap(),
        }
    }
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_arbitrary_root_name_is_discovered() {
    let temp = TempDir::new().unwrap();
    let staging = StagingArea::new(temp.path().join("staging"));
    let archive = zip_with_root("My App (v2) build_42", &[("a.txt", "a"), ("deep/b/c.txt", "c")]);

    let snapshot = staging.stage_bytes("v1", &archive).await.unwrap();

    assert_eq!(snapshot.root.file_name().unwrap(), "My App (v2) build_42");
    assert_eq!(std::fs::read_to_string(snapshot.root.join("deep/b/c.txt")).unwrap(), "c");
    assert_eq!(snapshot.digest, tree_digest(&snapshot.root).unwrap());
    assert!(snapshot.manifest.contains(&"deep/b/c.txt".to_string()));
}

#[tokio::test]
async fn test_root_without_directory_entry_is_discovered() {
    let temp = TempDir::new().unwrap();
    let staging = StagingArea::new(temp.path().join("staging"));
    let archive = zip_entries(&[("release/index.js", Some("x")), ("release/lib/a.js", Some("y"))]);

    let snapshot = staging.stage_bytes("v1", &archive).await.unwrap();

    assert_eq!(snapshot.root.file_name().unwrap(), "release");
}

#[tokio::test]
async fn test_two_roots_is_extract_error() {
    let temp = TempDir::new().unwrap();
    let staging = StagingArea::new(temp.path().join("staging"));
    let archive = zip_entries(&[("one/a.txt", Some("a")), ("two/b.txt", Some("b"))]);

    let err = staging.stage_bytes("v1", &archive).await.unwrap_err();

    assert!(matches!(err, DeployError::ExtractError { .. }));
    assert_eq!(err.class(), ErrorClass::Malformed);
    assert_eq!(std::fs::read_dir(staging.root()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_zero_roots_is_extract_error() {
    let temp = TempDir::new().unwrap();
    let staging = StagingArea::new(temp.path().join("staging"));

    let empty = zip_entries(&[]);
    let err = staging.stage_bytes("v1", &empty).await.unwrap_err();
    assert!(matches!(err, DeployError::ExtractError { .. }));

    let loose_file = zip_entries(&[("README.md", Some("hi"))]);
    let err = staging.stage_bytes("v1", &loose_file).await.unwrap_err();
    assert!(matches!(err, DeployError::ExtractError { .. }));
}
