//! Local-first customer list.
//!
//! Customers live in a local SQLite store that is periodically refreshed from
//! a remote GraphQL API. Every write (sync, create, update, delete) goes
//! through [`MutationCoordinator`], which allows one mutation at a time and
//! rejects the rest. Readers observe the store through [`LiveQuery`].

pub mod config;
pub mod coordinator;
pub mod db;
pub mod models;
pub mod query;
pub mod remote;
pub mod state;
pub mod sync;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use coordinator::{
    CoordinatorEvent, EventKind, MutationCoordinator, MutationKind, MutationOutcome, Notification,
    Severity, SyncOutcome,
};
pub use db::{CustomerQuery, CustomerReader, CustomerStore, StoreError};
pub use models::{Customer, CustomerFields, RawCustomer, Role};
pub use query::{group_by_initial, LiveQuery, QueryObserver, Section, Snapshot};
pub use remote::{GraphQlClient, RemoteError, RemoteSource};
pub use state::{StateFile, SyncState};
pub use sync::{ReconcileReport, StalenessPolicy, SyncError};
