//! Drive/Storage → BigQuery connector — binary entrypoint.
//! Two batch subcommands sharing the BigQuery client and logging setup:
//! `drive` syncs shared-drive CSVs, `storage` loads bucket blobs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use drive_bq_connector::bq::BigQueryClient;
use drive_bq_connector::config::CategoryConfig;
use drive_bq_connector::drive::DriveClient;
use drive_bq_connector::notify::email::EmailNotifier;
use drive_bq_connector::pipeline::DriveRun;
use drive_bq_connector::storage::{GcsClient, StorageRun};

#[derive(Parser, Debug)]
#[command(name = "drive-bq-connector")]
#[command(author, version, about = "Move CSV data from Google Drive / Cloud Storage to BigQuery")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync CSV files from a Google Shared Drive into BigQuery
    Drive {
        /// Destination dataset
        #[arg(long, env = "BQ_DATASET")]
        dataset: String,

        /// Shared drive display name
        #[arg(long, env = "SHARED_DRIVE_NAME")]
        drive_name: String,

        /// GCP project owning the dataset
        #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
        project: String,

        /// Notification recipients (comma separated)
        #[arg(long, env = "MAIL_RECIPIENTS", value_delimiter = ',')]
        recipients: Vec<String>,
    },

    /// Load gzip CSV blobs from a Cloud Storage bucket into BigQuery
    Storage {
        /// Destination dataset
        #[arg(long, env = "BQ_DATASET")]
        dataset: String,

        /// Source bucket name
        #[arg(long, env = "GCS_BUCKET")]
        bucket: String,

        /// GCP project owning the dataset
        #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
        project: String,

        /// Blob prefixes to scan, e.g. --years 2024 2025
        #[arg(long, num_args = 1.., required = true)]
        years: Vec<String>,

        /// Skip tables whose name contains any of these substrings
        #[arg(long)]
        skip: Vec<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Credential acquisition stays outside the connector: a ready bearer
    // token is expected in the environment.
    let token = std::env::var("GOOGLE_ACCESS_TOKEN").context("GOOGLE_ACCESS_TOKEN missing")?;

    match cli.command {
        Command::Drive {
            dataset,
            drive_name,
            project,
            recipients,
        } => {
            let config = CategoryConfig::load_default()?;
            let store = DriveClient::for_shared_drive(&token, &drive_name).await?;
            let warehouse = BigQueryClient::new(project, &token);
            let notifier = EmailNotifier::from_env(&recipients)?;

            let mut run = DriveRun::new(&store, &warehouse, &notifier, &config, dataset);
            let outcomes = run.run(chrono::Utc::now()).await?;
            let loaded = outcomes.iter().filter(|o| o.is_loaded()).count();
            info!(
                loaded,
                skipped = outcomes.len() - loaded,
                "drive transfer finished"
            );
        }
        Command::Storage {
            dataset,
            bucket,
            project,
            years,
            skip,
        } => {
            let store = GcsClient::new(&bucket, &token);
            let warehouse = BigQueryClient::new(project, &token);

            let mut run = StorageRun::new(&store, &warehouse, &bucket, dataset, skip);
            let outcomes = run.run(&years).await?;
            let loaded = outcomes.iter().filter(|o| o.is_loaded()).count();
            info!(
                loaded,
                skipped = outcomes.len() - loaded,
                "storage transfer finished"
            );
        }
    }

    Ok(())
}
