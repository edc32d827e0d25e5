use sqlx::{QueryBuilder, Sqlite};

use crate::models::{sortable_name, Role};

/// Escape character used in LIKE patterns.
pub const LIKE_ESCAPE: char = '\\';

/// Shape of a customer list query: optional role filter, optional name prefix.
///
/// Results are always ordered by `sortable_name` ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerQuery {
    pub role: Option<Role>,
    pub search: Option<String>,
}

impl CustomerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: Option<Role>) -> Self {
        self.role = role;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// The normalized prefix to match, or `None` when the search is blank.
    pub fn search_prefix(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(sortable_name)
    }

    /// LIKE pattern for the prefix, with wildcards in the input escaped.
    pub fn like_pattern(&self) -> Option<String> {
        self.search_prefix()
            .map(|prefix| format!("{}%", escape_like(&prefix)))
    }

    pub(crate) fn build(&self) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(
            "SELECT id, name, sortable_name, email, role FROM customers WHERE 1 = 1",
        );

        if let Some(role) = self.role {
            qb.push(" AND role = ");
            qb.push_bind(role.as_str());
        }

        if let Some(pattern) = self.like_pattern() {
            qb.push(" AND sortable_name LIKE ");
            qb.push_bind(pattern);
            qb.push(" ESCAPE '\\'");
        }

        qb.push(" ORDER BY sortable_name ASC, id ASC");
        qb
    }
}

/// Escapes LIKE wildcards (`%`, `_`) and the escape character itself.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
