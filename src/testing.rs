//! Test doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::models::RawCustomer;
use crate::remote::{RemoteError, RemoteSource};

pub fn raw(id: &str, name: Option<&str>, role: Option<&str>) -> RawCustomer {
    RawCustomer {
        id: id.to_string(),
        name: name.map(str::to_string),
        email: None,
        role: role.map(str::to_string),
    }
}

/// In-memory remote whose response can be swapped and held open.
#[derive(Default)]
pub struct FakeRemote {
    response: Mutex<Vec<RawCustomer>>,
    failure: Mutex<Option<RemoteError>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
    started: Arc<Notify>,
}

impl FakeRemote {
    pub fn new(customers: Vec<RawCustomer>) -> Self {
        Self {
            response: Mutex::new(customers),
            ..Self::default()
        }
    }

    pub fn failing(error: RemoteError) -> Self {
        Self {
            failure: Mutex::new(Some(error)),
            ..Self::default()
        }
    }

    /// Every fetch waits for `gate` to be notified before answering.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Notified each time a fetch begins.
    pub fn started(&self) -> Arc<Notify> {
        self.started.clone()
    }

    pub fn set_response(&self, customers: Vec<RawCustomer>) {
        *self.response.lock().unwrap() = customers;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteSource for FakeRemote {
    async fn fetch_all_customers(&self) -> Result<Vec<RawCustomer>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let failure = self.failure.lock().unwrap().clone();
        match failure {
            Some(e) => Err(e),
            None => Ok(self.response.lock().unwrap().clone()),
        }
    }
}
