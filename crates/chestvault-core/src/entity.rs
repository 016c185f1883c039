//! Entity keys identifying the owner of a persisted record

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Stable, globally unique identifier of the entity that owns a record.
///
/// The string form (hyphenated UUID) doubles as the record's file stem, so it
/// must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(Uuid);

impl EntityKey {
    /// Create a new random entity key
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an entity key from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The all-zero key, used as a placeholder before a decoded record is
    /// re-keyed by its store
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse an entity key from a string
    pub fn from_string(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s.trim())
            .map_err(|e| Error::InvalidKey(format!("Invalid entity key format: {}", e)))?;
        Ok(Self(uuid))
    }
}

impl Default for EntityKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EntityKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

impl From<Uuid> for EntityKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
