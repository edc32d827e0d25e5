//! The mutation coordinator: the single choke point for every write.
//!
//! Sync, create, update and delete all follow the same shape:
//!
//! 1. try to take the mutation lock; if it is held, emit a busy notification
//!    and drop the request (nothing is queued or retried),
//! 2. run the store or network operation,
//! 3. release the lock,
//! 4. emit the lifecycle event and its user-facing notification.
//!
//! Failures are turned into state (`sync_error`) and notifications here; no
//! error escapes a `request_*` call.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::{CustomerReader, CustomerStore, StoreError};
use crate::models::{Customer, CustomerFields};
use crate::remote::RemoteSource;
use crate::state::{StateFile, SyncState};
use crate::sync::{reconcile, ReconcileReport, StalenessPolicy};

pub const BUSY_MESSAGE: &str = "Operation in progress. Please try again later.";

const EVENT_CAPACITY: usize = 64;

/// Which CRUD write a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
}

/// A toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Success,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    SyncStarted,
    SyncSucceeded { did_fetch: bool },
    SyncFailed { message: String },
    MutationBusy,
    MutationSucceeded { kind: MutationKind },
    MutationFailed { kind: MutationKind },
}

/// Lifecycle event, optionally paired with a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    pub notification: Option<Notification>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote was fetched and reconciled
    Fetched(ReconcileReport),
    /// Local data was fresh; nothing was fetched
    Fresh,
    /// Another mutation held the lock; the request was dropped
    Busy,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The write was committed. Carries the stored record for create and update.
    Applied(Option<Customer>),
    /// Another mutation held the lock; the request was dropped
    Busy,
    Failed(String),
}

/// Held while a mutation runs. Dropping it releases the lock.
struct MutationLock<'a> {
    state: Option<&'a Mutex<SyncState>>,
}

impl MutationLock<'_> {
    /// Releases the lock and applies `update` in the same critical section.
    fn release_with(mut self, update: impl FnOnce(&mut SyncState)) {
        if let Some(state) = self.state.take() {
            let mut state = lock_state(state);
            state.is_mutating = false;
            state.is_syncing = false;
            update(&mut state);
            tracing::debug!("Mutation lock released");
        }
    }

    fn release(self) {
        self.release_with(|_| {});
    }
}

impl Drop for MutationLock<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            let mut state = lock_state(state);
            state.is_mutating = false;
            state.is_syncing = false;
            tracing::debug!("Mutation lock released on drop");
        }
    }
}

fn lock_state(state: &Mutex<SyncState>) -> MutexGuard<'_, SyncState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns [`SyncState`] and serializes all writes against the store.
pub struct MutationCoordinator<R> {
    store: CustomerStore,
    reader: CustomerReader,
    remote: R,
    policy: StalenessPolicy,
    state: Mutex<SyncState>,
    state_file: Option<StateFile>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl<R: RemoteSource> MutationCoordinator<R> {
    /// Creates a coordinator. Lock and error fields of `initial` are reset.
    pub fn new(
        store: CustomerStore,
        remote: R,
        policy: StalenessPolicy,
        initial: SyncState,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            reader: store.reader(),
            store,
            remote,
            policy,
            state: Mutex::new(SyncState::rehydrate(initial.persisted())),
            state_file: None,
            events,
        }
    }

    /// Creates a coordinator whose last sync time is loaded from and saved to `file`.
    pub fn with_state_file(
        store: CustomerStore,
        remote: R,
        policy: StalenessPolicy,
        file: StateFile,
    ) -> Self {
        let initial = file.load_or_default();
        let mut coordinator = Self::new(store, remote, policy, initial);
        coordinator.state_file = Some(file);
        coordinator
    }

    /// Read access to the store. Writes only happen through `request_*`.
    pub fn store(&self) -> &CustomerReader {
        &self.reader
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SyncState {
        lock_state(&self.state).clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    /// Dismisses the last sync error.
    pub fn clear_sync_error(&self) {
        lock_state(&self.state).sync_error = None;
    }

    pub async fn request_sync(&self, force_refresh: bool) -> SyncOutcome {
        let last_sync = self.state().last_sync_timestamp;

        let needed = match self
            .policy
            .should_sync(&self.reader, force_refresh, last_sync)
            .await
        {
            Ok(needed) => needed,
            Err(e) => return self.sync_failed(e.to_string()),
        };

        if !needed {
            self.emit(EventKind::SyncSucceeded { did_fetch: false }, None);
            return SyncOutcome::Fresh;
        }

        let Some(lock) = self.try_acquire(true) else {
            self.reject("sync");
            return SyncOutcome::Busy;
        };
        self.emit(EventKind::SyncStarted, None);

        match reconcile(&self.remote, &self.store).await {
            Ok(report) => {
                lock.release_with(|state| {
                    state.last_sync_timestamp = Some(chrono::Utc::now());
                    state.sync_error = None;
                });
                self.persist();
                self.emit(EventKind::SyncSucceeded { did_fetch: true }, None);
                SyncOutcome::Fetched(report)
            }
            Err(e) => {
                lock.release();
                self.sync_failed(e.to_string())
            }
        }
    }

    pub async fn request_create(&self, fields: CustomerFields) -> MutationOutcome {
        let Some(lock) = self.try_acquire(false) else {
            self.reject("create");
            return MutationOutcome::Busy;
        };

        let result = if fields.full_name().is_empty() {
            Err("Customer name cannot be empty".to_string())
        } else {
            self.store
                .create(&fields.into_customer())
                .await
                .map_err(|e| e.to_string())
        };
        lock.release();

        match result {
            Ok(customer) => {
                tracing::info!("Created customer {}", customer.id);
                self.emit(
                    EventKind::MutationSucceeded {
                        kind: MutationKind::Create,
                    },
                    Some(Notification::success("User created successfully!")),
                );
                MutationOutcome::Applied(Some(customer))
            }
            Err(message) => {
                tracing::error!("Failed to add customer: {}", message);
                self.emit(
                    EventKind::MutationFailed {
                        kind: MutationKind::Create,
                    },
                    Some(Notification::error("Could not create user.")),
                );
                MutationOutcome::Failed(message)
            }
        }
    }

    pub async fn request_update(&self, id: &str, fields: CustomerFields) -> MutationOutcome {
        let Some(lock) = self.try_acquire(false) else {
            self.reject("update");
            return MutationOutcome::Busy;
        };

        let result = self.update_customer(id, &fields).await;
        lock.release();

        match result {
            Ok(customer) => {
                tracing::info!("Updated customer {}", customer.id);
                self.emit(
                    EventKind::MutationSucceeded {
                        kind: MutationKind::Update,
                    },
                    Some(Notification::success("User updated successfully!")),
                );
                MutationOutcome::Applied(Some(customer))
            }
            Err(message) => {
                tracing::error!("Failed to update customer {}: {}", id, message);
                self.emit(
                    EventKind::MutationFailed {
                        kind: MutationKind::Update,
                    },
                    Some(Notification::error("Could not update user.")),
                );
                MutationOutcome::Failed(message)
            }
        }
    }

    pub async fn request_delete(&self, id: &str) -> MutationOutcome {
        let Some(lock) = self.try_acquire(false) else {
            self.reject("delete");
            return MutationOutcome::Busy;
        };

        let name = match self.store.get_by_id(id).await {
            Ok(Some(customer)) => customer.name,
            Ok(None) => id.to_string(),
            Err(e) => {
                tracing::warn!("Failed to look up customer {} before delete: {}", id, e);
                id.to_string()
            }
        };
        let result = self.store.delete(id).await;
        lock.release();

        match result {
            Ok(()) => {
                tracing::info!("Deleted customer {}", id);
                self.emit(
                    EventKind::MutationSucceeded {
                        kind: MutationKind::Delete,
                    },
                    Some(Notification::success(format!("User \"{}\" deleted.", name))),
                );
                MutationOutcome::Applied(None)
            }
            Err(e) => {
                tracing::error!("Failed to delete customer {}: {}", id, e);
                self.emit(
                    EventKind::MutationFailed {
                        kind: MutationKind::Delete,
                    },
                    Some(Notification::error(format!(
                        "Failed to delete \"{}\".",
                        name
                    ))),
                );
                MutationOutcome::Failed(e.to_string())
            }
        }
    }

    async fn update_customer(&self, id: &str, fields: &CustomerFields) -> Result<Customer, String> {
        if fields.full_name().is_empty() {
            return Err("Customer name cannot be empty".to_string());
        }

        let mut customer = self
            .store
            .get_by_id(id)
            .await
            .and_then(|found| found.ok_or_else(|| StoreError::NotFound(id.to_string())))
            .map_err(|e| e.to_string())?;
        customer.apply(fields);

        self.store.update(&customer).await.map_err(|e| e.to_string())
    }

    /// Takes the lock if it is free.
    fn try_acquire(&self, syncing: bool) -> Option<MutationLock<'_>> {
        let mut state = lock_state(&self.state);
        if state.is_mutating {
            return None;
        }
        state.is_mutating = true;
        state.is_syncing = syncing;
        tracing::debug!("Mutation lock acquired");
        Some(MutationLock {
            state: Some(&self.state),
        })
    }

    fn reject(&self, operation: &str) {
        tracing::warn!("Rejected {}: another mutation is in flight", operation);
        self.emit(
            EventKind::MutationBusy,
            Some(Notification::error(BUSY_MESSAGE)),
        );
    }

    fn sync_failed(&self, message: String) -> SyncOutcome {
        tracing::error!("Failed to sync data: {}", message);

        let blocking = {
            let mut state = lock_state(&self.state);
            state.sync_error = Some(message.clone());
            !state.has_synced()
        };

        // Before the first successful sync the error is shown as a blocking
        // state rather than a toast.
        let notification = if blocking {
            None
        } else {
            Some(Notification::error(format!("Sync failed: {}", message)))
        };
        self.emit(
            EventKind::SyncFailed {
                message: message.clone(),
            },
            notification,
        );
        SyncOutcome::Failed(message)
    }

    fn persist(&self) {
        if let Some(file) = &self.state_file {
            if let Err(e) = file.save(&self.state()) {
                tracing::warn!("{}", e);
            }
        }
    }

    fn emit(&self, kind: EventKind, notification: Option<Notification>) {
        // No receivers is fine.
        let _ = self.events.send(CoordinatorEvent { kind, notification });
    }
}
