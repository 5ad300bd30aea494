// src/drive.rs
//
// Google Drive v3 client for shared drives, implementing the `ObjectStore`
// seam: file discovery, folder listing for category resolution, and media
// downloads.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::catalog::{ObjectStore, SourceObject};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const FILE_FIELDS: &str = "nextPageToken, files(id, name, mimeType, parents, trashed, modifiedTime)";
const FOLDER_FIELDS: &str = "nextPageToken, files(id, name)";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

pub struct DriveClient {
    http: reqwest::Client,
    token: String,
    drive_id: String,
}

impl DriveClient {
    /// Resolve a shared drive by display name. Failure here is fatal for the
    /// whole run: without a drive there is nothing to discover.
    pub async fn for_shared_drive(token: &str, shared_drive_name: &str) -> Result<Self> {
        let http = reqwest::Client::new();
        let listing: DriveListing = http
            .get(format!("{API_BASE}/drives"))
            .bearer_auth(token)
            .query(&[("pageSize", "10")])
            .send()
            .await
            .context("drives.list request")?
            .error_for_status()
            .context("drives.list")?
            .json()
            .await
            .context("decoding drives.list")?;

        let drive_id = listing
            .drives
            .into_iter()
            .find(|d| d.name == shared_drive_name)
            .map(|d| d.id)
            .with_context(|| format!("shared drive {shared_drive_name:?} not found"))?;
        info!(drive_id, "resolved shared drive");

        Ok(Self {
            http,
            token: token.to_string(),
            drive_id,
        })
    }

    async fn list_files(&self, query: &str, fields: &str) -> Result<Vec<SourceObject>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(format!("{API_BASE}/files"))
                .bearer_auth(&self.token)
                .query(&[
                    ("q", query),
                    ("fields", fields),
                    ("pageSize", "1000"),
                    ("driveId", self.drive_id.as_str()),
                    ("includeItemsFromAllDrives", "true"),
                    ("supportsAllDrives", "true"),
                    ("spaces", "drive"),
                    ("corpora", "drive"),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let listing: FileListing = request
                .send()
                .await
                .context("files.list request")?
                .error_for_status()
                .context("files.list")?
                .json()
                .await
                .context("decoding files.list")?;

            files.extend(listing.files);
            match listing.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl ObjectStore for DriveClient {
    async fn discover(&self, since: DateTime<Utc>) -> Result<Vec<SourceObject>> {
        // https://developers.google.com/drive/api/v3/search-files
        let query = format!(
            "modifiedTime > '{}' and (mimeType = 'text/csv')",
            since.format("%Y-%m-%dT%H:%M:%S")
        );
        self.list_files(&query, FILE_FIELDS).await
    }

    async fn resolve_categories(&self) -> Result<HashMap<String, String>> {
        let query = format!("mimeType = '{FOLDER_MIME}'");
        let folders = self.list_files(&query, FOLDER_FIELDS).await?;
        Ok(folders.into_iter().map(|f| (f.id, f.name)).collect())
    }

    async fn fetch(&self, object: &SourceObject) -> Result<Vec<u8>> {
        let bytes = self
            .http
            .get(format!("{API_BASE}/files/{}", object.id))
            .bearer_auth(&self.token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .with_context(|| format!("downloading {}", object.name))?
            .error_for_status()
            .with_context(|| format!("downloading {}", object.name))?
            .bytes()
            .await
            .with_context(|| format!("reading body of {}", object.name))?;
        debug!(file = %object.name, bytes = bytes.len(), "downloaded source object");
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct DriveListing {
    #[serde(default)]
    drives: Vec<DriveRef>,
}

#[derive(Debug, Deserialize)]
struct DriveRef {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListing {
    #[serde(default)]
    files: Vec<SourceObject>,
    #[serde(default)]
    next_page_token: Option<String>,
}
