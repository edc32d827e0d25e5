use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::role::Role;

/// A persisted customer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub sortable_name: String,
    pub email: Option<String>,
    pub role: Role,
}

impl Customer {
    /// Creates a customer with a freshly generated id.
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, role)
    }

    /// Creates a customer with a caller-supplied id (used by sync).
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            sortable_name: sortable_name(&name),
            name,
            email: None,
            role,
        }
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Splits the stored name on the first space into first and last name.
    pub fn name_parts(&self) -> (String, String) {
        match self.name.split_once(' ') {
            Some((first, last)) => (first.to_string(), last.to_string()),
            None => (self.name.clone(), String::new()),
        }
    }

    /// Replaces the editable fields, keeping the id.
    pub fn apply(&mut self, fields: &CustomerFields) {
        self.name = fields.full_name();
        self.sortable_name = sortable_name(&self.name);
        self.email = fields.email.clone();
        self.role = fields.role;
    }
}

impl fmt::Display for Customer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.len()))?;
        writeln!(f, "ID:    {}", self.id)?;
        writeln!(f, "Role:  {}", self.role)?;
        write!(f, "Email: {}", self.email.as_deref().unwrap_or("-"))
    }
}

/// Lower-cased name used for case-insensitive ordering and prefix search.
pub fn sortable_name(name: &str) -> String {
    name.to_lowercase()
}

/// User-editable fields of a customer, as submitted by a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerFields {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub role: Role,
}

impl CustomerFields {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>, role: Role) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: None,
            role,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// Builds a new record with a locally generated id.
    pub fn into_customer(self) -> Customer {
        Customer::new(self.full_name(), self.role).with_email(self.email)
    }
}

impl From<&Customer> for CustomerFields {
    fn from(customer: &Customer) -> Self {
        let (first_name, last_name) = customer.name_parts();
        Self {
            first_name,
            last_name,
            email: customer.email.clone(),
            role: customer.role,
        }
    }
}

/// A customer as delivered by the remote API, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCustomer {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}
