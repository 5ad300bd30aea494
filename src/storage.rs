// src/storage.rs
//
// Storage-variant connector: gzip CSV blobs in a Cloud Storage bucket loaded
// into BigQuery by URI with schema autodetection. Tables come from the blob
// path, a substring skip-list filters them, and every load is verified
// against a row count recomputed from the raw blob.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::bq::{CsvLoadOptions, Warehouse};
use crate::pipeline::Outcome;
use crate::verify::{gzip_data_rows, rows_match};

const API_BASE: &str = "https://storage.googleapis.com/storage/v1";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageBlob {
    pub name: String,
    #[serde(default)]
    pub media_link: Option<String>,
}

/// Listing and fetching against the bucket; tests plug in fakes.
#[async_trait]
pub trait BucketStore {
    async fn list(&self, prefix: &str) -> Result<Vec<StorageBlob>>;
    async fn download(&self, blob: &StorageBlob) -> Result<Vec<u8>>;
}

pub struct GcsClient {
    http: reqwest::Client,
    token: String,
    bucket: String,
}

impl GcsClient {
    pub fn new(bucket: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BucketStore for GcsClient {
    async fn list(&self, prefix: &str) -> Result<Vec<StorageBlob>> {
        let url = format!("{API_BASE}/b/{}/o", self.bucket);
        let mut blobs = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("prefix", prefix)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let listing: ObjectListing = request
                .send()
                .await
                .context("objects.list request")?
                .error_for_status()
                .context("objects.list")?
                .json()
                .await
                .context("decoding objects.list")?;
            blobs.extend(listing.items);
            match listing.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(blobs)
    }

    async fn download(&self, blob: &StorageBlob) -> Result<Vec<u8>> {
        let url = blob
            .media_link
            .as_deref()
            .with_context(|| format!("blob {} has no mediaLink", blob.name))?;
        let bytes = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("downloading {}", blob.name))?
            .error_for_status()
            .with_context(|| format!("downloading {}", blob.name))?
            .bytes()
            .await
            .with_context(|| format!("reading body of {}", blob.name))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectListing {
    #[serde(default)]
    items: Vec<StorageBlob>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Destination table from a blob path: second path segment, stem before the
/// first dot (`2020/table_name.csv.gz` → `table_name`).
pub fn table_from_blob_name(name: &str) -> Option<String> {
    let segment = name.split('/').nth(1)?;
    let stem = segment.split('.').next()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// The skip-list matches on substrings, regardless of dedup status.
pub fn should_skip(table: &str, skip_substrings: &[String]) -> bool {
    skip_substrings.iter().any(|s| table.contains(s.as_str()))
}

/// One Storage → BigQuery transfer run.
pub struct StorageRun<'a> {
    bucket_store: &'a dyn BucketStore,
    warehouse: &'a dyn Warehouse,
    bucket: String,
    dataset: String,
    tables_to_skip: Vec<String>,
    outcomes: Vec<Outcome>,
}

impl<'a> StorageRun<'a> {
    pub fn new(
        bucket_store: &'a dyn BucketStore,
        warehouse: &'a dyn Warehouse,
        bucket: impl Into<String>,
        dataset: impl Into<String>,
        tables_to_skip: Vec<String>,
    ) -> Self {
        Self {
            bucket_store,
            warehouse,
            bucket: bucket.into(),
            dataset: dataset.into(),
            tables_to_skip,
            outcomes: Vec::new(),
        }
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Load all matching blobs for the given prefixes (typically years).
    /// A listing failure is fatal; per-blob load failures are isolated.
    pub async fn run(&mut self, prefixes: &[String]) -> Result<&[Outcome]> {
        for prefix in prefixes {
            let blobs = self
                .bucket_store
                .list(prefix)
                .await
                .with_context(|| format!("listing blobs under {prefix:?}"))?;
            info!(prefix = %prefix, count = blobs.len(), "listed storage blobs");
            for blob in &blobs {
                if let Some(outcome) = self.process_one(blob).await {
                    self.outcomes.push(outcome);
                }
            }
        }
        Ok(&self.outcomes)
    }

    async fn process_one(&mut self, blob: &StorageBlob) -> Option<Outcome> {
        let Some(table) = table_from_blob_name(&blob.name) else {
            warn!(blob = %blob.name, "blob path has no table segment, skipping");
            return None;
        };

        if should_skip(&table, &self.tables_to_skip) {
            info!(table = %table, "table skipped");
            return Some(Outcome::SkippedFilteredOut {
                file: blob.name.clone(),
                table,
            });
        }

        let uri = format!("gs://{}/{}", self.bucket, blob.name);
        let table_id = format!("{}.{}", self.dataset, table);
        let reported = match self
            .warehouse
            .load_uri(&table_id, &uri, &CsvLoadOptions::default())
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table = %table, error = %e, "table skipped because of error");
                return Some(Outcome::SkippedLoadError {
                    file: blob.name.clone(),
                    table,
                    reason: e.to_string(),
                });
            }
        };

        // Recompute the row count straight from the source blob; a mismatch
        // is a warning only, the rows are already appended.
        match self.bucket_store.download(blob).await {
            Ok(bytes) => match gzip_data_rows(&bytes) {
                Ok(counted) => {
                    rows_match(&blob.name, reported, counted);
                }
                Err(e) => warn!(blob = %blob.name, error = ?e, "could not count source rows"),
            },
            Err(e) => warn!(blob = %blob.name, error = ?e, "row-count verification unavailable"),
        }

        info!(table_id = %table_id, rows = reported, "blob loaded");
        Some(Outcome::Loaded {
            file: blob.name.clone(),
            table,
        })
    }
}
