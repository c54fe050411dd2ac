//! Core types for the pipeline board
//!
//! Defines the records the board partitions and the small value types
//! shared between the store, the coordinator and the persistence service:
//! - Prospect identifiers and records
//! - Fetch filters
//! - Board version stamps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque prospect identifier, as assigned by the remote store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProspectId(pub String);

impl ProspectId {
    /// Create identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProspectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProspectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProspectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A prospect record.
///
/// Only `id` and `status` are interpreted by the board. The display fields
/// and anything else the remote store sends are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    /// Remote identifier
    #[serde(rename = "_id")]
    pub id: ProspectId,
    /// Free-text stage label as stored remotely, e.g. `Won/Sold`
    pub status: String,
    /// Contact name
    #[serde(default)]
    pub full_name: String,
    /// Contact email
    #[serde(default)]
    pub email: String,
    /// Contact phone
    #[serde(default)]
    pub phone_number: String,
    /// Creation time, when the store reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Remaining fields, opaque to the board
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Prospect {
    /// Create prospect with empty display fields
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<ProspectId>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            full_name: String::new(),
            email: String::new(),
            phone_number: String::new(),
            created_at: None,
            extra: serde_json::Map::new(),
        }
    }

    /// With contact name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    /// With contact email
    #[inline]
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// With contact phone
    #[inline]
    #[must_use]
    pub fn with_phone(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = phone_number.into();
        self
    }

    /// With creation time
    #[inline]
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Copy of this prospect with a new status label
    #[must_use]
    pub fn with_status(&self, status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..self.clone()
        }
    }
}

/// Filter for a full board load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectFilter {
    /// Exact status label to match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Free-text search term
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl ProspectFilter {
    /// Unfiltered load
    #[inline]
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// With search term
    #[inline]
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// True when neither criterion is set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.search.is_none()
    }
}

/// Monotonic stamp attached to every published board
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BoardVersion(pub u64);

impl BoardVersion {
    /// The version after this one
    #[inline]
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BoardVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
