//! Persisted records: departments (addresses) and the messages filed under them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A known building address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: Uuid,
    pub address: String,
    /// Ids of the content records filed under this address, oldest first.
    pub messages: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AddressRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            address: address.into(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// A finalized report: the stored message text linked to one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub text: String,
    /// Transport-specific image reference (file id or URL).
    pub image: Option<String>,
    pub department_id: Uuid,
}

impl ContentRecord {
    pub fn new(text: impl Into<String>, department_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            text: text.into(),
            image: None,
            department_id,
        }
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }
}
