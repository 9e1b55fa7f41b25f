//! End-to-end tests over local filesystem storage.
//!
//! These drive the real source and warehouse implementations through the
//! loader and then inspect the files on disk: the raw-layer envelopes, the
//! table descriptor, the watermark document, and the load history.
//!
//! Run with: cargo test --test end_to_end_tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use floe::config::{Config, ErrorHandlingConfig};
use floe::dlq::DeadLetterQueue;
use floe::loader::Loader;
use floe::source::StorageSource;
use floe::storage::{StorageProvider, StorageProviderRef};
use floe::warehouse::StorageWarehouse;

async fn local_provider(dir: &Path) -> StorageProviderRef {
    Arc::new(
        StorageProvider::for_url(&dir.display().to_string())
            .await
            .unwrap(),
    )
}

async fn local_loader(
    source_dir: &TempDir,
    warehouse_dir: &TempDir,
) -> Loader<StorageSource, StorageWarehouse> {
    let source = StorageSource::new(local_provider(source_dir.path()).await, ".json");
    let warehouse = StorageWarehouse::new(local_provider(warehouse_dir.path()).await, "fhir_bundles");
    Loader::new(source, warehouse)
}

fn bundle_json(id: &str, entries: usize) -> String {
    let entry: Vec<Value> = (0..entries)
        .map(|i| serde_json::json!({"resource": {"id": format!("r-{i}")}}))
        .collect();
    serde_json::json!({"resourceType": "Bundle", "id": id, "entry": entry}).to_string()
}

fn write_source_object(dir: &Path, key: &str, content: &str) {
    let path = dir.join(key);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn read_json(path: impl AsRef<Path>) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

/// Spread file mtimes so the discovery order is deterministic.
async fn settle_mtime() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_load_local_prefix_into_warehouse() {
    let source_dir = TempDir::new().unwrap();
    let warehouse_dir = TempDir::new().unwrap();

    write_source_object(
        source_dir.path(),
        "p-0001/bundle.json",
        &bundle_json("p-0001", 2),
    );
    settle_mtime().await;
    write_source_object(
        source_dir.path(),
        "p-0002/bundle.json",
        &bundle_json("p-0002", 3),
    );

    let loader = local_loader(&source_dir, &warehouse_dir).await;
    let summary = loader.run_once().await.unwrap();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.loaded, 2);
    assert_eq!(summary.failed, 0);

    // Raw-layer envelope keeps the full body plus load provenance
    let envelope = read_json(
        warehouse_dir
            .path()
            .join("fhir_bundles/p-0001/bundle.json"),
    );
    assert_eq!(envelope["key"], "p-0001/bundle.json");
    assert_eq!(envelope["record_count"], 2);
    assert_eq!(envelope["body"]["resourceType"], "Bundle");
    assert_eq!(envelope["body"]["id"], "p-0001");

    assert!(
        warehouse_dir
            .path()
            .join("fhir_bundles/p-0002/bundle.json")
            .exists()
    );
    assert!(warehouse_dir.path().join("_floe/table.json").exists());

    // The watermark sits at the newest object and records the load
    let watermark = read_json(warehouse_dir.path().join("_floe/watermark.json"));
    assert_eq!(watermark["key"], "p-0002/bundle.json");
    assert_eq!(watermark["load_id"], 1);
    assert_eq!(watermark["files_processed"], 2);

    assert!(
        warehouse_dir
            .path()
            .join("_floe/loads/load-0000000001.json")
            .exists()
    );
}

#[tokio::test]
async fn test_second_run_loads_only_new_objects() {
    let source_dir = TempDir::new().unwrap();
    let warehouse_dir = TempDir::new().unwrap();
    let loader = local_loader(&source_dir, &warehouse_dir).await;

    write_source_object(source_dir.path(), "a.json", &bundle_json("a", 1));
    let first = loader.run_once().await.unwrap();
    assert_eq!(first.loaded, 1);

    settle_mtime().await;
    write_source_object(source_dir.path(), "b.json", &bundle_json("b", 1));
    let second = loader.run_once().await.unwrap();

    assert_eq!(second.discovered, 1);
    assert_eq!(second.loaded, 1);

    assert!(warehouse_dir.path().join("fhir_bundles/a.json").exists());
    assert!(warehouse_dir.path().join("fhir_bundles/b.json").exists());

    let watermark = read_json(warehouse_dir.path().join("_floe/watermark.json"));
    assert_eq!(watermark["key"], "b.json");
    assert_eq!(watermark["load_id"], 2);
    assert!(
        warehouse_dir
            .path()
            .join("_floe/loads/load-0000000002.json")
            .exists()
    );
}

#[tokio::test]
async fn test_malformed_object_lands_in_dlq() {
    let source_dir = TempDir::new().unwrap();
    let warehouse_dir = TempDir::new().unwrap();
    let dlq_dir = TempDir::new().unwrap();

    write_source_object(source_dir.path(), "good.json", &bundle_json("good", 1));
    settle_mtime().await;
    write_source_object(source_dir.path(), "bad.json", "{definitely not json");

    let error_handling = ErrorHandlingConfig {
        dlq_url: Some(dlq_dir.path().display().to_string()),
        dlq_storage_options: HashMap::new(),
    };
    let dlq = DeadLetterQueue::from_config(&error_handling)
        .await
        .unwrap()
        .unwrap();

    let loader = local_loader(&source_dir, &warehouse_dir)
        .await
        .with_dlq(Some(Arc::new(dlq)));
    let summary = loader.run_once().await.unwrap();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.loaded, 1);
    assert_eq!(summary.failed, 1);

    assert!(warehouse_dir.path().join("fhir_bundles/good.json").exists());
    assert!(!warehouse_dir.path().join("fhir_bundles/bad.json").exists());

    // The watermark covers the skipped object so it is never re-offered
    let watermark = read_json(warehouse_dir.path().join("_floe/watermark.json"));
    assert_eq!(watermark["key"], "bad.json");

    // One NDJSON failure file, one line, with the parse stage recorded
    let dlq_files: Vec<_> = std::fs::read_dir(dlq_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(dlq_files.len(), 1);

    let content = std::fs::read_to_string(dlq_files[0].path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);

    let failure: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(failure["key"], "bad.json");
    assert_eq!(failure["stage"], "parse");
}

#[tokio::test]
async fn test_from_config_wires_suffix_filter() {
    let source_dir = TempDir::new().unwrap();
    let warehouse_dir = TempDir::new().unwrap();

    write_source_object(source_dir.path(), "one.json", &bundle_json("one", 1));
    write_source_object(source_dir.path(), "two.json", &bundle_json("two", 1));
    // Upload-pipeline marker, filtered out by the default suffix
    write_source_object(source_dir.path(), "two.json.uploading.tmp", "");

    let yaml = format!(
        r#"
source:
  url: "{source}"
  max_batch_size: 10

warehouse:
  url: "{warehouse}"
"#,
        source = source_dir.path().display(),
        warehouse = warehouse_dir.path().display(),
    );
    let config = Config::from_yaml(&yaml).unwrap();
    let loader = Loader::from_config(&config).await.unwrap();

    let summary = loader.run_once().await.unwrap();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.loaded, 2);
    assert!(warehouse_dir.path().join("fhir_bundles/one.json").exists());
    assert!(warehouse_dir.path().join("fhir_bundles/two.json").exists());
    assert!(
        !warehouse_dir
            .path()
            .join("fhir_bundles/two.json.uploading.tmp")
            .exists()
    );
}

/// Crash simulation: the watermark document is lost after a successful run.
/// The redo re-loads the same objects over their existing envelopes and
/// rebuilds the watermark, leaving the warehouse identical.
#[tokio::test]
async fn test_lost_watermark_redo_converges() {
    let source_dir = TempDir::new().unwrap();
    let warehouse_dir = TempDir::new().unwrap();
    let loader = local_loader(&source_dir, &warehouse_dir).await;

    write_source_object(source_dir.path(), "a.json", &bundle_json("a", 1));
    settle_mtime().await;
    write_source_object(source_dir.path(), "b.json", &bundle_json("b", 2));

    let first = loader.run_once().await.unwrap();
    assert_eq!(first.loaded, 2);
    let envelope_before = read_json(warehouse_dir.path().join("fhir_bundles/b.json"));

    std::fs::remove_file(warehouse_dir.path().join("_floe/watermark.json")).unwrap();

    let redo = loader.run_once().await.unwrap();
    assert_eq!(redo.discovered, 2);
    assert_eq!(redo.loaded, 2);

    // Same rows, no duplicates: keyed envelopes were overwritten in place
    let table_entries: Vec<_> = std::fs::read_dir(warehouse_dir.path().join("fhir_bundles"))
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(table_entries.len(), 2);

    let envelope_after = read_json(warehouse_dir.path().join("fhir_bundles/b.json"));
    assert_eq!(envelope_after["key"], envelope_before["key"]);
    assert_eq!(envelope_after["body"], envelope_before["body"]);
    assert_eq!(envelope_after["record_count"], envelope_before["record_count"]);

    let watermark = read_json(warehouse_dir.path().join("_floe/watermark.json"));
    assert_eq!(watermark["key"], "b.json");
}
