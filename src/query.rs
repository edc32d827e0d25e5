//! Live queries over the customer store.
//!
//! A [`LiveQuery`] emits the full matching result set as soon as it starts and
//! again after every committed store write, until it is cancelled or dropped.
//! [`QueryObserver`] owns at most one live query and replaces it whenever the
//! filter parameters change.

use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::{CustomerQuery, CustomerReader, StoreError};
use crate::models::Customer;

/// One delivery from a live query.
pub type Snapshot = Result<Vec<Customer>, StoreError>;

const DELIVERY_CAPACITY: usize = 16;

/// A running subscription to one [`CustomerQuery`].
pub struct LiveQuery {
    params: CustomerQuery,
    receiver: mpsc::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl LiveQuery {
    /// Starts watching `params` on `store`. Must be called inside a tokio runtime.
    pub fn start(store: CustomerReader, params: CustomerQuery) -> Self {
        let (sender, receiver) = mpsc::channel(DELIVERY_CAPACITY);
        let mut changes = store.subscribe_changes();
        let query = params.clone();

        let task = tokio::spawn(async move {
            loop {
                // Mark the current version seen before reading, so a write that
                // lands during the query triggers another pass.
                changes.borrow_and_update();

                let snapshot = store.query(&query).await;
                if let Err(e) = &snapshot {
                    tracing::warn!("Live query failed: {}", e);
                }
                if sender.send(snapshot).await.is_err() {
                    break;
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
            tracing::debug!("Live query stopped");
        });

        Self {
            params,
            receiver,
            task,
        }
    }

    pub fn params(&self) -> &CustomerQuery {
        &self.params
    }

    /// Waits for the next snapshot. `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    /// Stops the subscription. No further snapshots are produced.
    pub fn cancel(self) {
        drop(self);
    }

    pub fn into_stream(self) -> impl Stream<Item = Snapshot> {
        futures::stream::unfold(self, |mut query| async move {
            query.next().await.map(|snapshot| (snapshot, query))
        })
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Keeps one live query in step with changing filter parameters.
pub struct QueryObserver {
    store: CustomerReader,
    current: Option<LiveQuery>,
}

impl QueryObserver {
    pub fn new(store: CustomerReader) -> Self {
        Self {
            store,
            current: None,
        }
    }

    /// Cancels the running subscription and starts one for `params`.
    ///
    /// Unchanged parameters keep the existing subscription.
    pub fn set_params(&mut self, params: CustomerQuery) {
        if self.params() == Some(&params) {
            return;
        }
        if let Some(previous) = self.current.take() {
            previous.cancel();
        }
        tracing::debug!("Subscribing to {:?}", params);
        self.current = Some(LiveQuery::start(self.store.clone(), params));
    }

    pub fn params(&self) -> Option<&CustomerQuery> {
        self.current.as_ref().map(LiveQuery::params)
    }

    /// Next snapshot of the current subscription, `None` if there is none.
    pub async fn next(&mut self) -> Option<Snapshot> {
        match self.current.as_mut() {
            Some(query) => query.next().await,
            None => None,
        }
    }

    pub fn cancel(&mut self) {
        self.current = None;
    }
}

/// Customers sharing a leading letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: String,
    pub customers: Vec<Customer>,
}

/// Groups a sorted snapshot into consecutive runs by upper-cased initial.
pub fn group_by_initial(customers: &[Customer]) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();

    for customer in customers {
        let title = customer
            .name
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect::<String>())
            .unwrap_or_else(|| "#".to_string());

        match sections.last_mut() {
            Some(section) if section.title == title => section.customers.push(customer.clone()),
            _ => sections.push(Section {
                title,
                customers: vec![customer.clone()],
            }),
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, CustomerStore};
    use crate::models::Role;
    use futures::StreamExt;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    struct TestContext {
        store: CustomerStore,
        _temp_dir: TempDir,
    }

    async fn setup_store() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let store = CustomerStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        for (id, name, role) in [
            ("1", "Alice", Role::Admin),
            ("2", "Alicia", Role::Manager),
            ("3", "Bob", Role::Admin),
        ] {
            store
                .create(&Customer::with_id(id, name, role))
                .await
                .unwrap();
        }
        TestContext {
            store,
            _temp_dir: temp_dir,
        }
    }

    async fn next_names(query: &mut LiveQuery) -> Vec<String> {
        let snapshot = timeout(Duration::from_secs(5), query.next())
            .await
            .expect("timed out waiting for snapshot")
            .expect("subscription ended")
            .unwrap();
        snapshot.into_iter().map(|c| c.name).collect()
    }

    #[tokio::test]
    async fn test_search_emits_matching_prefix_sorted() {
        let ctx = setup_store().await;

        let mut query = LiveQuery::start(ctx.store.reader(), CustomerQuery::new().with_search("ali"));

        assert_eq!(next_names(&mut query).await, vec!["Alice", "Alicia"]);
    }

    #[tokio::test]
    async fn test_role_filter() {
        let ctx = setup_store().await;

        let mut query = LiveQuery::start(
            ctx.store.reader(),
            CustomerQuery::new().with_role(Some(Role::Admin)),
        );

        assert_eq!(next_names(&mut query).await, vec!["Alice", "Bob"]);
    }

    #[tokio::test]
    async fn test_reemits_after_store_change() {
        let ctx = setup_store().await;
        let mut query = LiveQuery::start(ctx.store.reader(), CustomerQuery::new());
        assert_eq!(next_names(&mut query).await.len(), 3);

        ctx.store
            .create(&Customer::with_id("4", "Aaron", Role::Manager))
            .await
            .unwrap();
        assert_eq!(
            next_names(&mut query).await,
            vec!["Aaron", "Alice", "Alicia", "Bob"]
        );

        ctx.store.delete("3").await.unwrap();
        assert_eq!(
            next_names(&mut query).await,
            vec!["Aaron", "Alice", "Alicia"]
        );
    }

    #[tokio::test]
    async fn test_store_error_is_delivered() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let store = CustomerStore::new(pool.clone());
        pool.close().await;

        let mut query = LiveQuery::start(store.reader(), CustomerQuery::new());

        let snapshot = timeout(Duration::from_secs(5), query.next())
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.is_err());
    }

    #[tokio::test]
    async fn test_into_stream() {
        let ctx = setup_store().await;
        let stream = LiveQuery::start(ctx.store.reader(), CustomerQuery::new().with_search("b"))
            .into_stream();
        futures::pin_mut!(stream);

        let first = timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "Bob");
    }

    #[tokio::test]
    async fn test_observer_resubscribes_on_param_change() {
        let ctx = setup_store().await;
        let mut observer = QueryObserver::new(ctx.store.reader());
        assert!(observer.next().await.is_none());

        observer.set_params(CustomerQuery::new().with_search("ali"));
        let first = observer.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);

        observer.set_params(CustomerQuery::new().with_role(Some(Role::Admin)));
        assert_eq!(
            observer.params(),
            Some(&CustomerQuery::new().with_role(Some(Role::Admin)))
        );
        let second = timeout(Duration::from_secs(5), observer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let names: Vec<_> = second.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);

        observer.cancel();
        assert!(observer.params().is_none());
        assert!(observer.next().await.is_none());
    }

    #[tokio::test]
    async fn test_observer_keeps_subscription_for_same_params() {
        let ctx = setup_store().await;
        let mut observer = QueryObserver::new(ctx.store.reader());

        observer.set_params(CustomerQuery::new());
        observer.next().await.unwrap().unwrap();
        observer.set_params(CustomerQuery::new());

        // A fresh subscription would emit immediately; the kept one waits for a change.
        let pending = timeout(Duration::from_millis(100), observer.next()).await;
        assert!(pending.is_err());
    }

    #[test]
    fn test_group_by_initial() {
        let customers = vec![
            Customer::with_id("1", "alice", Role::Admin),
            Customer::with_id("2", "Alicia", Role::Admin),
            Customer::with_id("3", "Bob", Role::Manager),
        ];

        let sections = group_by_initial(&customers);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "A");
        assert_eq!(sections[0].customers.len(), 2);
        assert_eq!(sections[1].title, "B");
        assert!(group_by_initial(&[]).is_empty());
    }
}
