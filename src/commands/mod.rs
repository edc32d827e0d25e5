mod config_cmd;
mod customer;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use customer::CustomerCommand;
pub use sync_cmd::SyncCommand;

use clap::ValueEnum;
use tokio::sync::broadcast;

use custsync::config::Config;
use custsync::coordinator::{CoordinatorEvent, MutationCoordinator, Severity};
use custsync::db::CustomerStore;
use custsync::remote::GraphQlClient;
use custsync::state::StateFile;
use custsync::sync::StalenessPolicy;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Coordinator used by the CLI. Without remote config every sync fails with
/// a "not configured" error while local edits keep working.
pub type CliCoordinator = MutationCoordinator<Option<GraphQlClient>>;

pub async fn open_coordinator(config: &Config) -> Result<CliCoordinator, Box<dyn std::error::Error>> {
    let store = CustomerStore::open(&config.database_path.value).await?;

    let remote = if config.remote.is_configured() {
        Some(GraphQlClient::from_config(&config.remote)?)
    } else {
        None
    };

    Ok(MutationCoordinator::with_state_file(
        store,
        remote,
        StalenessPolicy::from_hours(config.staleness_hours.value),
        StateFile::new(config.state_path.value.clone()),
    ))
}

/// Prints the notifications of all events received so far.
pub fn print_notifications(events: &mut broadcast::Receiver<CoordinatorEvent>) {
    while let Ok(event) = events.try_recv() {
        print_notification(&event);
    }
}

pub fn print_notification(event: &CoordinatorEvent) {
    if let Some(notification) = &event.notification {
        match notification.severity {
            Severity::Success => println!("{}", notification.message),
            Severity::Error => eprintln!("{}", notification.message),
        }
    }
}
