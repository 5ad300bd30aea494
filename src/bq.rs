// src/bq.rs
//
// BigQuery boundary: the `Warehouse` trait the pipelines program against, the
// error classification they branch on, and the REST client implementing it.
// Callers supply a bearer token; credential acquisition happens outside.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::schema::SchemaField;

const API_BASE: &str = "https://bigquery.googleapis.com";
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Destination table does not exist. The dedup gate treats this as
    /// "not yet ingested".
    #[error("destination table not found: {0}")]
    TableNotFound(String),
    /// The destination rejected the request for structural reasons.
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    /// The load job ran and failed (type/shape mismatch, bad rows).
    #[error("load failed: {0}")]
    LoadFailed(String),
    #[error("api error {code}: {message}")]
    Api { code: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// CSV parser options for URI-based loads (storage variant).
#[derive(Debug, Clone)]
pub struct CsvLoadOptions {
    pub skip_leading_rows: u32,
    pub field_delimiter: String,
    pub allow_quoted_newlines: bool,
}

impl Default for CsvLoadOptions {
    fn default() -> Self {
        Self {
            skip_leading_rows: 1,
            field_delimiter: ";".to_string(),
            allow_quoted_newlines: true,
        }
    }
}

/// The warehouse operations the pipelines need. `table_id` is always
/// `{dataset}.{table}`; the client scopes it to its project.
#[async_trait]
pub trait Warehouse {
    /// Rows in `table_id` whose marker column equals `file_name`, capped at one.
    async fn marker_rows(&self, table_id: &str, file_name: &str) -> Result<u64, WarehouseError>;

    /// Append NDJSON rows with an explicit schema; returns rows loaded.
    async fn load_rows(
        &self,
        table_id: &str,
        schema: &[SchemaField],
        ndjson: String,
    ) -> Result<u64, WarehouseError>;

    /// Append a CSV object by URI with schema autodetection; returns rows loaded.
    async fn load_uri(
        &self,
        table_id: &str,
        uri: &str,
        options: &CsvLoadOptions,
    ) -> Result<u64, WarehouseError>;
}

pub struct BigQueryClient {
    http: reqwest::Client,
    project: String,
    token: String,
}

impl BigQueryClient {
    pub fn new(project: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            project: project.into(),
            token: token.into(),
        }
    }

    async fn wait_for_job(&self, mut job: Job) -> Result<u64, WarehouseError> {
        loop {
            if let Some(status) = &job.status {
                if status.state == "DONE" {
                    if let Some(err) = &status.error_result {
                        return Err(WarehouseError::LoadFailed(format!(
                            "{}: {}",
                            err.reason, err.message
                        )));
                    }
                    let rows = job
                        .statistics
                        .as_ref()
                        .and_then(|s| s.load.as_ref())
                        .and_then(|l| l.output_rows.as_ref())
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(0);
                    return Ok(rows);
                }
            }

            tokio::time::sleep(POLL_INTERVAL).await;

            let reference = job.job_reference.as_ref().ok_or_else(|| WarehouseError::Api {
                code: 500,
                message: "job response without a job reference".to_string(),
            })?;
            let url = format!(
                "{API_BASE}/bigquery/v2/projects/{}/jobs/{}",
                self.project, reference.job_id
            );
            let mut request = self.http.get(&url).bearer_auth(&self.token);
            if let Some(location) = &reference.location {
                request = request.query(&[("location", location)]);
            }
            job = check(request.send().await?).await?.json().await?;
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn marker_rows(&self, table_id: &str, file_name: &str) -> Result<u64, WarehouseError> {
        let sql = format!(
            "SELECT `file` FROM `{}.{}` WHERE `file` = @file LIMIT 1",
            self.project, table_id
        );
        let request = json!({
            "query": sql,
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": [{
                "name": "file",
                "parameterType": { "type": "STRING" },
                "parameterValue": { "value": file_name },
            }],
        });

        let url = format!("{API_BASE}/bigquery/v2/projects/{}/queries", self.project);
        let response = check(
            self.http
                .post(&url)
                .bearer_auth(&self.token)
                .json(&request)
                .send()
                .await?,
        )
        .await?;
        let body: QueryResponse = response.json().await?;
        let rows = body
            .total_rows
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(0);
        debug!(table_id, file_name, rows, "marker lookup");
        Ok(rows)
    }

    async fn load_rows(
        &self,
        table_id: &str,
        schema: &[SchemaField],
        ndjson: String,
    ) -> Result<u64, WarehouseError> {
        let (dataset, table) = split_table_id(table_id)?;
        let job = json!({
            "configuration": { "load": {
                "destinationTable": {
                    "projectId": self.project,
                    "datasetId": dataset,
                    "tableId": table,
                },
                "writeDisposition": "WRITE_APPEND",
                "sourceFormat": "NEWLINE_DELIMITED_JSON",
                "schema": { "fields": schema },
            }},
        });

        // Resumable upload: create the session, then push the row payload.
        let url = format!(
            "{API_BASE}/upload/bigquery/v2/projects/{}/jobs?uploadType=resumable",
            self.project
        );
        let response = check(
            self.http
                .post(&url)
                .bearer_auth(&self.token)
                .json(&job)
                .send()
                .await?,
        )
        .await?;
        let session = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| WarehouseError::Api {
                code: 500,
                message: "resumable session without Location header".to_string(),
            })?;

        let response = check(
            self.http
                .put(&session)
                .bearer_auth(&self.token)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(ndjson)
                .send()
                .await?,
        )
        .await?;
        let job: Job = response.json().await?;
        self.wait_for_job(job).await
    }

    async fn load_uri(
        &self,
        table_id: &str,
        uri: &str,
        options: &CsvLoadOptions,
    ) -> Result<u64, WarehouseError> {
        let (dataset, table) = split_table_id(table_id)?;
        let job = json!({
            "configuration": { "load": {
                "destinationTable": {
                    "projectId": self.project,
                    "datasetId": dataset,
                    "tableId": table,
                },
                "sourceUris": [uri],
                "sourceFormat": "CSV",
                "autodetect": true,
                "writeDisposition": "WRITE_APPEND",
                "skipLeadingRows": options.skip_leading_rows,
                "fieldDelimiter": options.field_delimiter,
                "allowQuotedNewlines": options.allow_quoted_newlines,
            }},
        });

        let url = format!("{API_BASE}/bigquery/v2/projects/{}/jobs", self.project);
        let response = check(
            self.http
                .post(&url)
                .bearer_auth(&self.token)
                .json(&job)
                .send()
                .await?,
        )
        .await?;
        let job: Job = response.json().await?;
        self.wait_for_job(job).await
    }
}

/// Map a non-2xx response to the error taxonomy the pipelines branch on.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, WarehouseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let envelope: ApiErrorEnvelope = response.json().await.unwrap_or_default();
    let message = if envelope.error.message.is_empty() {
        status.to_string()
    } else {
        envelope.error.message
    };
    let reason = envelope
        .error
        .errors
        .first()
        .map(|e| e.reason.as_str())
        .unwrap_or("");

    if status.as_u16() == 404 || reason == "notFound" {
        return Err(WarehouseError::TableNotFound(message));
    }
    if status.as_u16() == 400 {
        return Err(WarehouseError::MalformedRequest(message));
    }
    Err(WarehouseError::Api {
        code: status.as_u16(),
        message,
    })
}

fn split_table_id(table_id: &str) -> Result<(&str, &str), WarehouseError> {
    table_id.split_once('.').ok_or_else(|| {
        WarehouseError::MalformedRequest(format!("table id {table_id:?} is not dataset.table"))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    total_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatistics {
    #[serde(default)]
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    #[serde(default)]
    output_rows: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiErrorEnvelope {
    #[serde(default)]
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}
