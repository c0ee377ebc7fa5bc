//! Represents a named key/value attribute attached to a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

pub const NAME_MAX_LEN: usize = 120;
pub const VALUE_MAX_LEN: usize = 65_535;
pub const REMARK_MAX_LEN: usize = 1_000;

/// Who wrote a record, from where, and when.
///
/// These columns are stamped by the attribute store on every write and are
/// read-only for callers.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, Default, PartialEq)]
pub struct AuditTrail {
    pub(crate) created_by: Option<String>,
    pub(crate) updated_by: Option<String>,
    pub(crate) created_from_ip: Option<String>,
    pub(crate) updated_from_ip: Option<String>,
    pub(crate) create_time: Option<DateTime<Utc>>,
    pub(crate) update_time: Option<DateTime<Utc>>,
}

impl AuditTrail {
    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn updated_by(&self) -> Option<&str> {
        self.updated_by.as_deref()
    }

    pub fn created_from_ip(&self) -> Option<&str> {
        self.created_from_ip.as_deref()
    }

    pub fn updated_from_ip(&self) -> Option<&str> {
        self.updated_from_ip.as_deref()
    }

    pub fn create_time(&self) -> Option<DateTime<Utc>> {
        self.create_time
    }

    pub fn update_time(&self) -> Option<DateTime<Utc>> {
        self.update_time
    }
}

/// One named piece of extension data owned by exactly one user.
///
/// `(user_id, name)` is unique. `value` is opaque text: callers may store JSON
/// or anything else, the store never parses it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct UserAttribute {
    /// Assigned on first save; `None` means the record was never persisted.
    pub id: Option<Uuid>,

    /// Owning user. Deleting the user deletes the attribute.
    pub user_id: i64,

    pub name: String,

    pub value: String,

    /// Free-form operator note.
    pub remark: Option<String>,

    #[sqlx(flatten)]
    #[serde(flatten)]
    pub audit: AuditTrail,
}

impl UserAttribute {
    pub fn new(user_id: i64, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id,
            name: name.into(),
            value: value.into(),
            remark: None,
            audit: AuditTrail::default(),
        }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Narrow projection served to API clients.
    pub fn api_view(&self) -> ApiView {
        ApiView {
            id: self.id,
            name: self.name.clone(),
            value: self.value.clone(),
        }
    }

    /// Projection used by admin listings.
    pub fn admin_view(&self) -> AdminView {
        AdminView {
            id: self.id,
            name: self.name.clone(),
            value: self.value.clone(),
            remark: self.remark.clone(),
        }
    }

    /// Backdate the timestamps of a record that has not been saved yet. The
    /// store keeps preset timestamps on insert; demo data uses this for
    /// variety.
    pub(crate) fn backdate(&mut self, create_time: DateTime<Utc>, update_time: DateTime<Utc>) {
        self.audit.create_time = Some(create_time);
        self.audit.update_time = Some(update_time);
    }
}

impl fmt::Display for UserAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "UserAttribute {} ({})", id, self.name),
            None => Ok(()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApiView {
    pub id: Option<Uuid>,
    pub name: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AdminView {
    pub id: Option<Uuid>,
    pub name: String,
    pub value: String,
    pub remark: Option<String>,
}
