//! Sync CLI commands for refreshing local data from the remote API.

use chrono::Utc;
use clap::{Args, Subcommand};
use serde::Serialize;

use custsync::config::Config;
use custsync::sync::StalenessPolicy;
use custsync::{SyncOutcome, SyncState};

use super::{print_notifications, CliCoordinator, OutputFormat};

/// Sync with the remote API
#[derive(Args)]
pub struct SyncCommand {
    /// Fetch even if local data is fresh
    #[arg(long, short)]
    force: bool,

    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Show remote configuration and sync state
    Status {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Serialize)]
struct StatusReport<'a> {
    remote_configured: bool,
    endpoint: Option<&'a str>,
    staleness_hours: u64,
    local_records: u64,
    stale: bool,
    #[serde(flatten)]
    state: SyncState,
}

impl SyncCommand {
    pub async fn run(
        &self,
        coordinator: &CliCoordinator,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(coordinator).await,
            Some(SyncSubcommand::Status { format }) => {
                self.status(coordinator, config, format).await
            }
        }
    }

    async fn sync(&self, coordinator: &CliCoordinator) -> Result<(), Box<dyn std::error::Error>> {
        println!("Syncing with remote...");

        let mut events = coordinator.subscribe();
        let outcome = coordinator.request_sync(self.force).await;
        print_notifications(&mut events);

        match outcome {
            SyncOutcome::Fetched(report) => {
                println!();
                println!("  fetched:   {}", report.fetched);
                println!("  created:   {}", report.created);
                println!("  updated:   {}", report.updated);
                println!("  unchanged: {}", report.unchanged);
                if report.skipped > 0 {
                    println!("  skipped:   {} (invalid records)", report.skipped);
                }
                println!();
                println!("Sync complete.");
                Ok(())
            }
            SyncOutcome::Fresh => {
                println!("Already up to date.");
                Ok(())
            }
            SyncOutcome::Busy => Err("another operation is in progress".into()),
            SyncOutcome::Failed(message) => Err(message.into()),
        }
    }

    async fn status(
        &self,
        coordinator: &CliCoordinator,
        config: &Config,
        format: &OutputFormat,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let state = coordinator.state();
        let policy = StalenessPolicy::from_hours(config.staleness_hours.value);
        let local_records = coordinator.store().count().await?;
        let stale = policy
            .verdict(local_records, state.last_sync_timestamp, Utc::now())
            .needs_sync();

        let report = StatusReport {
            remote_configured: config.remote.is_configured(),
            endpoint: config.remote.endpoint.as_deref(),
            staleness_hours: config.staleness_hours.value,
            local_records,
            stale,
            state,
        };

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Text => print_status(&report),
        }
        Ok(())
    }
}

fn print_status(report: &StatusReport<'_>) {
    println!("Sync Status");
    println!("===========");
    println!();

    if report.remote_configured {
        println!("Remote:    {}", report.endpoint.unwrap_or("-"));
    } else {
        println!("Remote:    Not configured");
        println!();
        println!("To enable sync, add to your config file:");
        println!();
        println!("  remote:");
        println!("    endpoint: \"https://example.com/graphql\"");
        println!("    api_key: \"your-api-key\"");
        println!();
        println!("Or set environment variables:");
        println!("  CUSTSYNC_REMOTE_URL");
        println!("  CUSTSYNC_API_KEY");
        println!();
    }

    match report.state.last_sync_timestamp {
        Some(ts) => println!("Last sync: {}", ts.to_rfc3339()),
        None => println!("Last sync: never"),
    }
    println!("Records:   {}", report.local_records);
    println!(
        "Data:      {} (threshold {}h)",
        if report.stale { "stale" } else { "fresh" },
        report.staleness_hours
    );
}
