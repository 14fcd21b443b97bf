//! Error log file layer

use ccp_common::logging::{error_file_layer, ERROR_LOG_FILE};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing_subscriber::layer::SubscriberExt;

fn read_error_logs(dir: &Path) -> String {
    let mut contents = String::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        if name.starts_with(ERROR_LOG_FILE) {
            contents.push_str(&fs::read_to_string(&path).unwrap());
        }
    }
    contents
}

#[test]
fn test_error_events_land_in_dated_file() {
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("error_logs");

    let (layer, guard) = error_file_layer(&log_dir).unwrap();
    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("routine progress line");
        tracing::warn!("3 remote call(s) failed");
        tracing::error!(stage = "writing", kind = "StoreError", "Sync run failed");
    });
    drop(guard);

    let contents = read_error_logs(&log_dir);
    assert!(contents.contains("Sync run failed"));
    assert!(contents.contains("stage=\"writing\""));
    assert!(contents.contains("ERROR"));
    assert!(!contents.contains("routine progress line"));
    assert!(!contents.contains("remote call(s) failed"));
}

#[test]
fn test_error_log_dir_is_created() {
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("nested").join("errors");

    let (_layer, guard) = error_file_layer(&log_dir).unwrap();
    drop(guard);

    assert!(log_dir.is_dir());
}
