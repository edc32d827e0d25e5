use clap::{Args, Subcommand};
use std::io::{self, Write};

use custsync::coordinator::MutationOutcome;
use custsync::db::CustomerQuery;
use custsync::models::{Customer, CustomerFields, Role};
use custsync::query::{group_by_initial, QueryObserver};
use custsync::SyncOutcome;

use super::{print_notification, print_notifications, CliCoordinator, OutputFormat};

#[derive(Args)]
pub struct CustomerCommand {
    #[command(subcommand)]
    pub command: CustomerSubcommand,
}

#[derive(Subcommand)]
pub enum CustomerSubcommand {
    /// Add a new customer
    Add {
        /// First name
        first_name: String,

        /// Last name
        #[arg(default_value = "")]
        last_name: String,

        /// Role (admin or manager)
        #[arg(long, short)]
        role: Role,

        /// Email address
        #[arg(long)]
        email: Option<String>,
    },

    /// List customers, syncing first if local data is stale
    List {
        /// Only show customers with this role
        #[arg(long, short)]
        role: Option<Role>,

        /// Name prefix to search for
        #[arg(long, short)]
        search: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a customer's details
    Show {
        /// Customer ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing customer
    Edit {
        /// Customer ID
        id: String,

        /// New first name
        #[arg(long)]
        first_name: Option<String>,

        /// New last name
        #[arg(long)]
        last_name: Option<String>,

        /// New role (admin or manager)
        #[arg(long, short)]
        role: Option<Role>,

        /// New email address (empty string clears it)
        #[arg(long)]
        email: Option<String>,
    },

    /// Delete a customer
    Delete {
        /// Customer ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Print the customer list and reprint it whenever it changes
    Watch {
        /// Only show customers with this role
        #[arg(long, short)]
        role: Option<Role>,

        /// Name prefix to search for
        #[arg(long, short)]
        search: Option<String>,
    },
}

impl CustomerCommand {
    pub async fn run(&self, coordinator: &CliCoordinator) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            CustomerSubcommand::Add {
                first_name,
                last_name,
                role,
                email,
            } => {
                let mut fields = CustomerFields::new(first_name, last_name, *role);
                if let Some(email) = email {
                    fields = fields.with_email(email);
                }

                let mut events = coordinator.subscribe();
                let outcome = coordinator.request_create(fields).await;
                print_notifications(&mut events);

                if let MutationOutcome::Applied(Some(created)) = &outcome {
                    println!();
                    println!("{}", created);
                }
                into_result(outcome)
            }

            CustomerSubcommand::List {
                role,
                search,
                format,
            } => {
                sync_before_read(coordinator).await;

                let query = build_query(*role, search.as_deref());
                let customers = coordinator.store().query(&query).await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&customers)?);
                    }
                    OutputFormat::Text => print_table(&customers),
                }
                Ok(())
            }

            CustomerSubcommand::Show { id, format } => {
                let customer = coordinator
                    .store()
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| format!("Customer not found: {}", id))?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&customer)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", customer);
                    }
                }
                Ok(())
            }

            CustomerSubcommand::Edit {
                id,
                first_name,
                last_name,
                role,
                email,
            } => {
                let existing = coordinator
                    .store()
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| format!("Customer not found: {}", id))?;

                let mut fields = CustomerFields::from(&existing);
                if let Some(first_name) = first_name {
                    fields.first_name = first_name.clone();
                }
                if let Some(last_name) = last_name {
                    fields.last_name = last_name.clone();
                }
                if let Some(role) = role {
                    fields.role = *role;
                }
                if let Some(email) = email {
                    fields.email = Some(email.clone()).filter(|e| !e.is_empty());
                }

                let mut events = coordinator.subscribe();
                let outcome = coordinator.request_update(id, fields).await;
                print_notifications(&mut events);

                if let MutationOutcome::Applied(Some(updated)) = &outcome {
                    println!();
                    println!("{}", updated);
                }
                into_result(outcome)
            }

            CustomerSubcommand::Delete { id, force } => {
                if !force {
                    let name = coordinator
                        .store()
                        .get_by_id(id)
                        .await?
                        .map(|c| c.name)
                        .unwrap_or_else(|| id.clone());
                    print!("Delete customer '{}'? [y/N] ", name);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                let mut events = coordinator.subscribe();
                let outcome = coordinator.request_delete(id).await;
                print_notifications(&mut events);
                into_result(outcome)
            }

            CustomerSubcommand::Watch { role, search } => {
                watch(coordinator, build_query(*role, search.as_deref())).await
            }
        }
    }
}

fn build_query(role: Option<Role>, search: Option<&str>) -> CustomerQuery {
    let query = CustomerQuery::new().with_role(role);
    match search {
        Some(search) => query.with_search(search),
        None => query,
    }
}

/// Requests a non-forced sync. A failure is reported but still lets the
/// caller read whatever is stored locally.
async fn sync_before_read(coordinator: &CliCoordinator) {
    let mut events = coordinator.subscribe();
    let outcome = coordinator.request_sync(false).await;
    print_notifications(&mut events);

    if let SyncOutcome::Failed(message) = outcome {
        if coordinator.state().blocking_error().is_some() {
            eprintln!("Could not load customers: {}", message);
        }
    }
}

async fn watch(
    coordinator: &CliCoordinator,
    query: CustomerQuery,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut observer = QueryObserver::new(coordinator.store().clone());
    observer.set_params(query);
    let mut events = coordinator.subscribe();

    let sync = coordinator.request_sync(false);
    tokio::pin!(sync);
    let mut sync_done = false;

    loop {
        tokio::select! {
            outcome = &mut sync, if !sync_done => {
                sync_done = true;
                if let SyncOutcome::Failed(message) = outcome {
                    if coordinator.state().blocking_error().is_some() {
                        eprintln!("Could not load customers: {}", message);
                    }
                }
            }
            snapshot = observer.next() => match snapshot {
                Some(Ok(customers)) => {
                    println!();
                    print_table(&customers);
                }
                Some(Err(e)) => eprintln!("Error: {}", e),
                None => break,
            },
            Ok(event) = events.recv() => print_notification(&event),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    observer.cancel();
    Ok(())
}

fn print_table(customers: &[Customer]) {
    if customers.is_empty() {
        println!("No customers found");
        return;
    }

    for section in group_by_initial(customers) {
        println!("{}", section.title);
        for customer in &section.customers {
            let name = if customer.name.chars().count() > 30 {
                format!("{}...", customer.name.chars().take(27).collect::<String>())
            } else {
                customer.name.clone()
            };
            println!(
                "  {:<36}  {:<30}  {:<8}  {}",
                customer.id,
                name,
                customer.role,
                customer.email.as_deref().unwrap_or("-")
            );
        }
    }
    println!("\nTotal: {} customer(s)", customers.len());
}

fn into_result(outcome: MutationOutcome) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        MutationOutcome::Applied(_) => Ok(()),
        MutationOutcome::Busy => Err("another operation is in progress".into()),
        MutationOutcome::Failed(message) => Err(message.into()),
    }
}
