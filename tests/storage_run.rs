// tests/storage_run.rs
// Storage-variant run against in-memory fakes: prefix listing, skip-list
// filtering, URI loads, and row-count verification from gzip blobs.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use drive_bq_connector::bq::{CsvLoadOptions, Warehouse, WarehouseError};
use drive_bq_connector::pipeline::Outcome;
use drive_bq_connector::schema::SchemaField;
use drive_bq_connector::storage::{BucketStore, StorageBlob, StorageRun};

fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

struct FakeBucket {
    blobs: Vec<StorageBlob>,
    contents: HashMap<String, Vec<u8>>,
}

impl FakeBucket {
    fn new(entries: &[(&str, &str)]) -> Self {
        let blobs = entries
            .iter()
            .map(|(name, _)| StorageBlob {
                name: name.to_string(),
                media_link: None,
            })
            .collect();
        let contents = entries
            .iter()
            .map(|(name, content)| (name.to_string(), gzip(content)))
            .collect();
        Self { blobs, contents }
    }
}

#[async_trait]
impl BucketStore for FakeBucket {
    async fn list(&self, prefix: &str) -> Result<Vec<StorageBlob>> {
        Ok(self
            .blobs
            .iter()
            .filter(|b| b.name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn download(&self, blob: &StorageBlob) -> Result<Vec<u8>> {
        self.contents
            .get(&blob.name)
            .cloned()
            .ok_or_else(|| anyhow!("no content for {}", blob.name))
    }
}

#[derive(Default)]
struct UriWarehouse {
    loads: Mutex<Vec<(String, String)>>,
    rows: u64,
    reject: Vec<String>,
}

#[async_trait]
impl Warehouse for UriWarehouse {
    async fn marker_rows(&self, _table_id: &str, _file_name: &str) -> Result<u64, WarehouseError> {
        unimplemented!("storage runs have no dedup gate")
    }

    async fn load_rows(
        &self,
        _table_id: &str,
        _schema: &[SchemaField],
        _ndjson: String,
    ) -> Result<u64, WarehouseError> {
        unimplemented!("storage runs load by URI")
    }

    async fn load_uri(
        &self,
        table_id: &str,
        uri: &str,
        options: &CsvLoadOptions,
    ) -> Result<u64, WarehouseError> {
        assert_eq!(options.field_delimiter, ";");
        assert_eq!(options.skip_leading_rows, 1);
        if self.reject.iter().any(|t| t == table_id) {
            return Err(WarehouseError::MalformedRequest("bad csv layout".into()));
        }
        self.loads
            .lock()
            .unwrap()
            .push((table_id.to_string(), uri.to_string()));
        Ok(self.rows)
    }
}

#[tokio::test]
async fn skip_list_filters_tables_by_substring() {
    let bucket = FakeBucket::new(&[
        ("2020/events.csv.gz", "id;name\n1;a\n2;b\n"),
        ("2020/events_tmp.csv.gz", "id;name\n1;a\n"),
    ]);
    let warehouse = UriWarehouse {
        rows: 2,
        ..Default::default()
    };
    let mut run = StorageRun::new(&bucket, &warehouse, "bucket", "ds", vec!["tmp".to_string()]);
    let outcomes = run.run(&["2020".to_string()]).await.unwrap().to_vec();

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(&outcomes[0], Outcome::Loaded { table, .. } if table == "events"));
    assert!(
        matches!(&outcomes[1], Outcome::SkippedFilteredOut { table, .. } if table == "events_tmp")
    );

    let loads = warehouse.loads.lock().unwrap();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].0, "ds.events");
    assert_eq!(loads[0].1, "gs://bucket/2020/events.csv.gz");
}

#[tokio::test]
async fn only_matching_prefixes_are_scanned() {
    let bucket = FakeBucket::new(&[
        ("2019/old.csv.gz", "id\n1\n"),
        ("2020/fresh.csv.gz", "id\n1\n"),
    ]);
    let warehouse = UriWarehouse {
        rows: 1,
        ..Default::default()
    };
    let mut run = StorageRun::new(&bucket, &warehouse, "bucket", "ds", Vec::new());
    let outcomes = run.run(&["2020".to_string()]).await.unwrap().to_vec();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].file(), "2020/fresh.csv.gz");
}

#[tokio::test]
async fn rejected_loads_are_skipped_and_the_run_continues() {
    let bucket = FakeBucket::new(&[
        ("2020/bad.csv.gz", "id;name\n1;a\n"),
        ("2020/good.csv.gz", "id;name\n1;a\n"),
    ]);
    let warehouse = UriWarehouse {
        rows: 1,
        reject: vec!["ds.bad".to_string()],
        ..Default::default()
    };
    let mut run = StorageRun::new(&bucket, &warehouse, "bucket", "ds", Vec::new());
    let outcomes = run.run(&["2020".to_string()]).await.unwrap().to_vec();

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(&outcomes[0], Outcome::SkippedLoadError { .. }));
    assert!(outcomes[1].is_loaded());
}

#[tokio::test]
async fn mismatched_row_counts_do_not_block_the_run() {
    // Blob has 2 data rows, warehouse claims 5; the load still counts.
    let bucket = FakeBucket::new(&[("2020/events.csv.gz", "id;name\n1;a\n2;b\n")]);
    let warehouse = UriWarehouse {
        rows: 5,
        ..Default::default()
    };
    let mut run = StorageRun::new(&bucket, &warehouse, "bucket", "ds", Vec::new());
    let outcomes = run.run(&["2020".to_string()]).await.unwrap().to_vec();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_loaded());
}
