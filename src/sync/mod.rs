//! Pulling customers from the remote source into the local store.
//!
//! [`StalenessPolicy`] decides whether a pull is worth doing and
//! [`reconcile`] performs it: fetch, validate, then one atomic upsert batch.
//! Sync never deletes local records.

mod error;
mod reconcile;
mod staleness;

pub use error::{SyncError, ValidationError};
pub use reconcile::{reconcile, validate, ReconcileReport};
pub use staleness::{StalenessPolicy, SyncVerdict};
