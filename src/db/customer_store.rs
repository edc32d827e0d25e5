use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::watch;

use super::error::StoreError;
use super::query::CustomerQuery;
use crate::models::{Customer, Role};

/// Local customer store backed by SQLite.
///
/// Every committed write bumps a change counter that live queries watch, so
/// observers re-run their query after each create, update, delete or batch.
/// Writes are crate-private: outside callers write through the mutation
/// coordinator and read through [`CustomerReader`].
#[derive(Clone)]
pub struct CustomerStore {
    pool: SqlitePool,
    changes: Arc<watch::Sender<u64>>,
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    sortable_name: String,
    email: Option<String>,
    role: String,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let role = Role::from_wire(&row.role).ok_or_else(|| {
            StoreError::InvalidRow(format!("customer {} has role '{}'", row.id, row.role))
        })?;

        Ok(Customer {
            id: row.id,
            name: row.name,
            sortable_name: row.sortable_name,
            email: row.email,
            role,
        })
    }
}

/// A single write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Create(Customer),
    Update(Customer),
}

/// Row counts from an applied batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub created: usize,
    pub updated: usize,
    /// Updates whose fields already matched the stored row.
    pub unchanged: usize,
}

impl CustomerStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            pool,
            changes: Arc::new(changes),
        }
    }

    /// Opens (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let pool = super::init_db(path).await?;
        Ok(Self::new(pool))
    }

    /// Read-only handle sharing this store's pool and change counter.
    pub fn reader(&self) -> CustomerReader {
        CustomerReader {
            store: self.clone(),
        }
    }

    /// Receiver that observes the change counter.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Customer>, StoreError> {
        let row: Option<CustomerRow> = sqlx::query_as(
            "SELECT id, name, sortable_name, email, role FROM customers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Customer::try_from).transpose()
    }

    pub(crate) async fn create(&self, customer: &Customer) -> Result<Customer, StoreError> {
        insert(&self.pool, customer).await?;
        self.notify_changed();

        self.get_by_id(&customer.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(customer.id.clone()))
    }

    pub(crate) async fn update(&self, customer: &Customer) -> Result<Customer, StoreError> {
        let affected = sqlx::query(
            "UPDATE customers SET name = ?, sortable_name = ?, email = ?, role = ? WHERE id = ?",
        )
        .bind(&customer.name)
        .bind(&customer.sortable_name)
        .bind(&customer.email)
        .bind(customer.role.as_str())
        .bind(&customer.id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::NotFound(customer.id.clone()));
        }
        self.notify_changed();

        self.get_by_id(&customer.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(customer.id.clone()))
    }

    pub(crate) async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let affected = sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.notify_changed();
        Ok(())
    }

    /// Returns which of `ids` already exist, in a single query.
    pub(crate) async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, StoreError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT id FROM customers WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows: Vec<(String,)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Applies all operations in one transaction; any failure rolls back all of them.
    pub(crate) async fn apply_batch(&self, ops: &[BatchOp]) -> Result<BatchResult, StoreError> {
        let mut result = BatchResult::default();
        if ops.is_empty() {
            return Ok(result);
        }

        let mut tx = self.pool.begin().await?;

        for op in ops {
            match op {
                BatchOp::Create(customer) => {
                    insert(&mut *tx, customer).await?;
                    result.created += 1;
                }
                BatchOp::Update(customer) => {
                    // IS NOT compares NULLs as values, so a NULL email still counts as a change.
                    let affected = sqlx::query(
                        r#"
                        UPDATE customers
                        SET name = ?, sortable_name = ?, email = ?, role = ?
                        WHERE id = ? AND (name IS NOT ? OR email IS NOT ? OR role IS NOT ?)
                        "#,
                    )
                    .bind(&customer.name)
                    .bind(&customer.sortable_name)
                    .bind(&customer.email)
                    .bind(customer.role.as_str())
                    .bind(&customer.id)
                    .bind(&customer.name)
                    .bind(&customer.email)
                    .bind(customer.role.as_str())
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

                    if affected > 0 {
                        result.updated += 1;
                    } else {
                        result.unchanged += 1;
                    }
                }
            }
        }

        tx.commit().await?;

        if result.created + result.updated > 0 {
            self.notify_changed();
        }
        Ok(result)
    }

    /// Runs a list query once.
    pub async fn query(&self, query: &CustomerQuery) -> Result<Vec<Customer>, StoreError> {
        let mut qb = query.build();
        let rows: Vec<CustomerRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Customer::try_from).collect()
    }

    pub async fn list(&self) -> Result<Vec<Customer>, StoreError> {
        self.query(&CustomerQuery::new()).await
    }
}

/// Read-only view of a [`CustomerStore`].
///
/// Has no write methods, so holding one never bypasses the mutation lock:
///
/// ```compile_fail
/// # async fn attempt(reader: custsync::db::CustomerReader) {
/// reader.delete("1").await;
/// # }
/// ```
///
/// A [`CustomerStore`] opened outside the crate cannot write either:
///
/// ```compile_fail
/// # async fn attempt(store: custsync::db::CustomerStore) {
/// store.delete("1").await;
/// # }
/// ```
#[derive(Clone)]
pub struct CustomerReader {
    store: CustomerStore,
}

impl CustomerReader {
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.store.subscribe_changes()
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        self.store.count().await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Customer>, StoreError> {
        self.store.get_by_id(id).await
    }

    pub async fn query(&self, query: &CustomerQuery) -> Result<Vec<Customer>, StoreError> {
        self.store.query(query).await
    }

    pub async fn list(&self) -> Result<Vec<Customer>, StoreError> {
        self.store.list().await
    }
}

async fn insert<'e, E>(executor: E, customer: &Customer) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO customers (id, name, sortable_name, email, role) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&customer.id)
    .bind(&customer.name)
    .bind(&customer.sortable_name)
    .bind(&customer.email)
    .bind(customer.role.as_str())
    .execute(executor)
    .await
    .map_err(|e| StoreError::on_insert(e, &customer.id))?;
    Ok(())
}
