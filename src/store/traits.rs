//! `Database` trait — single async interface for department persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::model::{AddressRecord, ContentRecord};

/// Backend-agnostic store for addresses and their content records.
#[async_trait]
pub trait Database: Send + Sync {
    /// Create tables and run pending migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Addresses ───────────────────────────────────────────────────

    /// All known addresses in insertion order.
    async fn list_addresses(&self) -> Result<Vec<AddressRecord>, DatabaseError>;

    /// Get an address by id.
    async fn get_address(&self, id: Uuid) -> Result<Option<AddressRecord>, DatabaseError>;

    /// Return the record whose address equals `address` exactly, creating it
    /// if absent.
    async fn upsert_address(&self, address: &str) -> Result<AddressRecord, DatabaseError>;

    /// Append a content record id to an address's message list.
    async fn append_content_to_address(
        &self,
        address_id: Uuid,
        content_id: Uuid,
    ) -> Result<(), DatabaseError>;

    // ── Content ─────────────────────────────────────────────────────

    /// Insert a new content record.
    async fn create_content(&self, content: &ContentRecord) -> Result<(), DatabaseError>;

    /// Get a content record by id.
    async fn get_content(&self, id: Uuid) -> Result<Option<ContentRecord>, DatabaseError>;

    /// Content records filed under an address, oldest first.
    async fn list_contents_for_address(
        &self,
        address_id: Uuid,
    ) -> Result<Vec<ContentRecord>, DatabaseError>;
}
