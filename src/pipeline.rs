// src/pipeline.rs
//
// Drive-variant orchestration: discover → dedup-gate → fetch → normalize →
// derive schema → throttled append load, one object at a time. Per-object
// failures become outcomes and the run keeps going; only discovery failures
// abort. Exactly one summary notification goes out at the end of a run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

use crate::bq::Warehouse;
use crate::catalog::{categorize, previous_midnight, ObjectStore, SourceObject};
use crate::config::CategoryConfig;
use crate::dedup::DedupGate;
use crate::frame::Frame;
use crate::normalize::prepare_for_load;
use crate::notify::{load_error_message, summary_message, Notifier, OutboundMessage};
use crate::schema::{derive, with_ingestion_fields};

/// Terminal classification of processing one source object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Loaded {
        file: String,
        table: String,
    },
    SkippedAlreadyPresent {
        file: String,
        table: String,
    },
    SkippedEmpty {
        file: String,
        table: String,
    },
    SkippedLoadError {
        file: String,
        table: String,
        reason: String,
    },
    SkippedFilteredOut {
        file: String,
        table: String,
    },
}

impl Outcome {
    pub fn file(&self) -> &str {
        match self {
            Outcome::Loaded { file, .. }
            | Outcome::SkippedAlreadyPresent { file, .. }
            | Outcome::SkippedEmpty { file, .. }
            | Outcome::SkippedLoadError { file, .. }
            | Outcome::SkippedFilteredOut { file, .. } => file,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Outcome::Loaded { .. })
    }
}

/// Run-scoped pacing of load submissions.
///
/// BigQuery caps table-write request rates, so every fifth attempted load in
/// a run is preceded by a fixed pause. The counter spans the whole run, not a
/// single category.
#[derive(Debug)]
pub struct Throttle {
    every: u64,
    pause: Duration,
    attempts: u64,
}

impl Throttle {
    pub fn new(every: u64, pause: Duration) -> Self {
        Self {
            every: every.max(1),
            pause,
            attempts: 0,
        }
    }

    // https://cloud.google.com/bigquery/quotas#standard_tables
    pub fn bigquery_default() -> Self {
        Self::new(5, Duration::from_secs(10))
    }

    /// Count one attempt; true when it lands on a pause point.
    pub fn pause_due(&mut self) -> bool {
        self.attempts += 1;
        self.attempts % self.every == 0
    }

    pub async fn before_load(&mut self) {
        if self.pause_due() {
            info!(attempts = self.attempts, "pausing before load, be nice to the API");
            tokio::time::sleep(self.pause).await;
        }
    }
}

/// One Drive → BigQuery transfer run.
pub struct DriveRun<'a> {
    store: &'a dyn ObjectStore,
    warehouse: &'a dyn Warehouse,
    notifier: &'a dyn Notifier,
    config: &'a CategoryConfig,
    dataset: String,
    outcomes: Vec<Outcome>,
    throttle: Throttle,
}

impl<'a> DriveRun<'a> {
    /// Run state (outcome list, throttle counter) is initialized fresh here,
    /// per run instance; nothing is shared across runs.
    pub fn new(
        store: &'a dyn ObjectStore,
        warehouse: &'a dyn Warehouse,
        notifier: &'a dyn Notifier,
        config: &'a CategoryConfig,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            store,
            warehouse,
            notifier,
            config,
            dataset: dataset.into(),
            outcomes: Vec::new(),
            throttle: Throttle::bigquery_default(),
        }
    }

    /// Override the pacing (tests use a zero pause).
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Execute the transfer. Only discovery failures abort; everything else
    /// is isolated per object.
    pub async fn run(&mut self, now: DateTime<Utc>) -> Result<&[Outcome]> {
        let folders = self
            .store
            .resolve_categories()
            .await
            .context("resolving source folders")?;
        let since = previous_midnight(now);
        let objects = self
            .store
            .discover(since)
            .await
            .context("discovering source files")?;
        info!(count = objects.len(), since = %since, "discovered candidate files");

        for object in &objects {
            let Some(table) = categorize(object, &folders, self.config) else {
                continue;
            };
            let outcome = self.process_one(object, &table).await;
            self.outcomes.push(outcome);
        }

        self.send_summary().await;
        Ok(&self.outcomes)
    }

    async fn process_one(&mut self, object: &SourceObject, table: &str) -> Outcome {
        let file = object.name.clone();

        let gate = DedupGate::new(self.warehouse, &self.dataset);
        match gate.already_ingested(table, &file).await {
            Ok(true) => {
                info!(file = %file, table = %table, "file already in BQ, skipping");
                return Outcome::SkippedAlreadyPresent {
                    file,
                    table: table.to_string(),
                };
            }
            Ok(false) => {}
            Err(e) => {
                return self
                    .skip_with_error(&file, table, &format!("dedup query failed: {e}"))
                    .await;
            }
        }

        info!(file = %file, table = %table, "uploading");

        let Some(entry) = self.config.entry(table) else {
            // Allow-listed category without a config entry: nothing to parse with.
            return self
                .skip_with_error(&file, table, "no category config entry")
                .await;
        };

        let raw = match self.store.fetch(object).await {
            Ok(bytes) => bytes,
            Err(e) => return self.skip_with_error(&file, table, &format!("{e:#}")).await,
        };

        let mut frame = match Frame::read_csv(&raw, entry) {
            Ok(frame) => frame,
            Err(e) => return self.skip_with_error(&file, table, &format!("{e:#}")).await,
        };

        if frame.is_empty() {
            self.notify(load_error_message(&file, table, "CSV is empty!"))
                .await;
            return Outcome::SkippedEmpty {
                file,
                table: table.to_string(),
            };
        }

        if let Err(e) = prepare_for_load(&mut frame, entry, &file, Utc::now()) {
            return self.skip_with_error(&file, table, &format!("{e:#}")).await;
        }

        let schema = with_ingestion_fields(derive(entry));
        let ndjson = frame.to_ndjson();
        let table_id = format!("{}.{}", self.dataset, table);

        self.throttle.before_load().await;
        match self.warehouse.load_rows(&table_id, &schema, ndjson).await {
            Ok(rows) => {
                info!(file = %file, table_id = %table_id, rows, "table uploaded to BQ");
                Outcome::Loaded {
                    file,
                    table: table.to_string(),
                }
            }
            Err(e) => self.skip_with_error(&file, table, &e.to_string()).await,
        }
    }

    async fn skip_with_error(&self, file: &str, table: &str, reason: &str) -> Outcome {
        warn!(file = %file, table = %table, reason = %reason, "file skipped");
        self.notify(load_error_message(file, table, reason)).await;
        Outcome::SkippedLoadError {
            file: file.to_string(),
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Notifications are best-effort; a failed send never fails the run.
    async fn notify(&self, message: OutboundMessage) {
        if let Err(e) = self.notifier.send(&message).await {
            warn!(error = ?e, subject = %message.subject, "notification failed");
        }
    }

    async fn send_summary(&self) {
        let loaded: Vec<String> = self
            .outcomes
            .iter()
            .filter(|o| o.is_loaded())
            .map(|o| o.file().to_string())
            .collect();
        self.notify(summary_message(&loaded)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_lands_on_every_fifth_attempt() {
        let mut throttle = Throttle::new(5, Duration::ZERO);
        let mut hits = Vec::new();
        for attempt in 1..=20u64 {
            if throttle.pause_due() {
                hits.push(attempt);
            }
        }
        assert_eq!(hits, vec![5, 10, 15, 20]);
    }

    #[test]
    fn counter_spans_the_whole_run() {
        // 4 attempts, then a 5th from a "different category": still pauses.
        let mut throttle = Throttle::new(5, Duration::ZERO);
        for _ in 0..4 {
            assert!(!throttle.pause_due());
        }
        assert!(throttle.pause_due());
    }
}
