use std::fmt;

/// Errors from the local customer store.
#[derive(Debug)]
pub enum StoreError {
    /// SQLite / driver failure
    Database(sqlx::Error),
    /// Schema migration failed
    Migration(sqlx::migrate::MigrateError),
    /// Filesystem failure while preparing the database
    Io(std::io::Error),
    /// No record with the given id
    NotFound(String),
    /// A record with the given id already exists
    DuplicateId(String),
    /// A stored row could not be turned into a customer
    InvalidRow(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Migration(e) => write!(f, "Migration error: {}", e),
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
            StoreError::NotFound(id) => write!(f, "Customer not found: {}", id),
            StoreError::DuplicateId(id) => write!(f, "Customer already exists: {}", id),
            StoreError::InvalidRow(e) => write!(f, "Invalid stored customer: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::Migration(e) => Some(e),
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(e)
    }
}

impl StoreError {
    /// Maps a unique-constraint violation on insert to `DuplicateId`.
    pub(crate) fn on_insert(e: sqlx::Error, id: &str) -> Self {
        match &e {
            sqlx::Error::Database(db)
                if db.is_unique_violation() || db.message().contains("UNIQUE constraint failed") =>
            {
                StoreError::DuplicateId(id.to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}
