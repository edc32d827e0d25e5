use std::collections::HashMap;

use super::error::{SyncError, ValidationError};
use crate::db::{BatchOp, CustomerStore};
use crate::models::{Customer, RawCustomer, Role};
use crate::remote::RemoteSource;

/// Counts from one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records returned by the remote
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    /// Existing records whose fields already matched
    pub unchanged: usize,
    /// Records dropped by validation
    pub skipped: usize,
}

/// Turns a remote record into a customer, keeping the remote id.
pub fn validate(raw: &RawCustomer) -> Result<Customer, ValidationError> {
    let name = raw
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or(ValidationError::MissingName)?;

    let role = raw
        .role
        .as_deref()
        .filter(|role| !role.is_empty())
        .ok_or(ValidationError::MissingRole)?;

    let role = Role::from_wire(role).ok_or_else(|| ValidationError::InvalidRole(role.to_string()))?;

    Ok(Customer::with_id(raw.id.clone(), name, role).with_email(raw.email.clone()))
}

/// Fetches the remote list and upserts it into the store as one batch.
///
/// Invalid records are skipped and logged. A remote failure leaves the store
/// untouched. Local records missing from the remote list are kept.
pub async fn reconcile<R: RemoteSource>(
    remote: &R,
    store: &CustomerStore,
) -> Result<ReconcileReport, SyncError> {
    let fetched = remote.fetch_all_customers().await?;

    let mut report = ReconcileReport {
        fetched: fetched.len(),
        ..ReconcileReport::default()
    };

    let mut valid: Vec<Customer> = Vec::with_capacity(fetched.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in &fetched {
        match validate(record) {
            Ok(customer) => match positions.get(&customer.id) {
                Some(&pos) => {
                    tracing::warn!(
                        "Duplicate customer ID {} from API; keeping the later record",
                        customer.id
                    );
                    valid[pos] = customer;
                }
                None => {
                    positions.insert(customer.id.clone(), valid.len());
                    valid.push(customer);
                }
            },
            Err(e) => {
                tracing::warn!("Filtering out invalid customer from API: ID {} ({})", record.id, e);
                report.skipped += 1;
            }
        }
    }

    let ids: Vec<String> = valid.iter().map(|c| c.id.clone()).collect();
    let existing = store.existing_ids(&ids).await?;

    let ops: Vec<BatchOp> = valid
        .into_iter()
        .map(|customer| {
            if existing.contains(&customer.id) {
                BatchOp::Update(customer)
            } else {
                BatchOp::Create(customer)
            }
        })
        .collect();

    let result = store.apply_batch(&ops).await?;
    report.created = result.created;
    report.updated = result.updated;
    report.unchanged = result.unchanged;

    tracing::info!(
        "Upsert complete: {} created, {} updated, {} unchanged, {} skipped",
        report.created,
        report.updated,
        report.unchanged,
        report.skipped
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;
    use crate::testing::{raw, FakeRemote};
    use tempfile::TempDir;

    struct TestContext {
        store: CustomerStore,
        _temp_dir: TempDir,
    }

    async fn setup_store() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let store = CustomerStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        TestContext {
            store,
            _temp_dir: temp_dir,
        }
    }

    #[test]
    fn test_validate_rejects_missing_and_unknown_fields() {
        assert_eq!(
            validate(&raw("1", None, Some("ADMIN"))).unwrap_err(),
            ValidationError::MissingName
        );
        assert_eq!(
            validate(&raw("1", Some(""), Some("ADMIN"))).unwrap_err(),
            ValidationError::MissingName
        );
        assert_eq!(
            validate(&raw("1", Some("Ann"), None)).unwrap_err(),
            ValidationError::MissingRole
        );
        assert_eq!(
            validate(&raw("1", Some("Ann"), Some("BOGUS"))).unwrap_err(),
            ValidationError::InvalidRole("BOGUS".to_string())
        );
        assert_eq!(
            validate(&raw("1", Some("Ann"), Some("admin"))).unwrap_err(),
            ValidationError::InvalidRole("admin".to_string())
        );
    }

    #[test]
    fn test_validate_keeps_remote_id() {
        let customer = validate(&raw("remote-1", Some("Ann Lee"), Some("MANAGER"))).unwrap();
        assert_eq!(customer.id, "remote-1");
        assert_eq!(customer.role, Role::Manager);
        assert_eq!(customer.sortable_name, "ann lee");
    }

    #[tokio::test]
    async fn test_reconcile_into_empty_store() {
        let ctx = setup_store().await;
        let mut john = raw("1", Some("John Doe"), Some("ADMIN"));
        john.email = Some("j@x.com".to_string());
        let remote = FakeRemote::new(vec![john]);

        let report = reconcile(&remote, &ctx.store).await.unwrap();

        assert_eq!(report.created, 1);
        let all = ctx.store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "1");
        assert_eq!(all[0].role, Role::Admin);
        assert_eq!(all[0].email.as_deref(), Some("j@x.com"));
    }

    #[tokio::test]
    async fn test_invalid_record_is_skipped_not_fatal() {
        let ctx = setup_store().await;
        let remote = FakeRemote::new(vec![
            raw("1", Some("Alice"), Some("ADMIN")),
            raw("2", Some("Bogus"), Some("BOGUS")),
            raw("3", Some("Carol"), Some("MANAGER")),
        ]);

        let report = reconcile(&remote, &ctx.store).await.unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.created, 2);
        assert_eq!(report.skipped, 1);
        assert!(ctx.store.get_by_id("2").await.unwrap().is_none());
        assert_eq!(ctx.store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_second_identical_run_changes_nothing() {
        let ctx = setup_store().await;
        let remote = FakeRemote::new(vec![
            raw("1", Some("Alice"), Some("ADMIN")),
            raw("2", Some("Bob"), Some("MANAGER")),
        ]);

        reconcile(&remote, &ctx.store).await.unwrap();
        let before = ctx.store.list().await.unwrap();
        let version = *ctx.store.subscribe_changes().borrow();

        let report = reconcile(&remote, &ctx.store).await.unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 0);
        assert_eq!(report.unchanged, 2);
        assert_eq!(ctx.store.list().await.unwrap(), before);
        assert_eq!(*ctx.store.subscribe_changes().borrow(), version);
    }

    #[tokio::test]
    async fn test_existing_records_are_updated_in_place() {
        let ctx = setup_store().await;
        ctx.store
            .create(
                &Customer::with_id("1", "Old Name", Role::Admin)
                    .with_email(Some("old@x.com".into())),
            )
            .await
            .unwrap();
        let remote = FakeRemote::new(vec![raw("1", Some("New Name"), Some("MANAGER"))]);

        let report = reconcile(&remote, &ctx.store).await.unwrap();

        assert_eq!(report.updated, 1);
        let updated = ctx.store.get_by_id("1").await.unwrap().unwrap();
        assert_eq!(updated.name, "New Name");
        assert_eq!(updated.sortable_name, "new name");
        assert_eq!(updated.role, Role::Manager);
        assert!(updated.email.is_none());
    }

    #[tokio::test]
    async fn test_sync_never_deletes_local_records() {
        let ctx = setup_store().await;
        ctx.store
            .create(&Customer::with_id("local", "Local Only", Role::Admin))
            .await
            .unwrap();
        let remote = FakeRemote::new(vec![raw("1", Some("Remote"), Some("ADMIN"))]);

        reconcile(&remote, &ctx.store).await.unwrap();

        assert!(ctx.store.get_by_id("local").await.unwrap().is_some());
        assert_eq!(ctx.store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_store_untouched() {
        let ctx = setup_store().await;
        ctx.store
            .create(&Customer::with_id("1", "Existing", Role::Admin))
            .await
            .unwrap();
        let remote = FakeRemote::failing(RemoteError::Http("connection refused".to_string()));

        let err = reconcile(&remote, &ctx.store).await.unwrap_err();

        assert!(matches!(err, SyncError::Remote(RemoteError::Http(_))));
        assert_eq!(ctx.store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_remote_ids_keep_last() {
        let ctx = setup_store().await;
        let remote = FakeRemote::new(vec![
            raw("1", Some("First"), Some("ADMIN")),
            raw("1", Some("Second"), Some("MANAGER")),
        ]);

        let report = reconcile(&remote, &ctx.store).await.unwrap();

        assert_eq!(report.created, 1);
        let stored = ctx.store.get_by_id("1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Second");
    }
}
