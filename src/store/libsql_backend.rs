//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::model::{AddressRecord, ContentRecord};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn find_address_by_value(
        &self,
        address: &str,
    ) -> Result<Option<AddressRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ADDRESS_COLUMNS} FROM departments WHERE address = ?1"),
                params![address],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_address_by_value: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_address(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_address_by_value: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str, entity: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s)
        .map_err(|e| DatabaseError::Serialization(format!("invalid {entity} id '{s}': {e}")))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to an AddressRecord.
///
/// Column order matches ADDRESS_COLUMNS: 0:id, 1:address, 2:messages, 3:created_at
fn row_to_address(row: &libsql::Row) -> Result<AddressRecord, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("address row: {e}")))?;
    let address: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("address row: {e}")))?;
    let messages_str: String = row.get::<String>(2).unwrap_or_else(|_| "[]".into());
    let created_str: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(format!("address row: {e}")))?;

    let message_ids: Vec<String> = serde_json::from_str(&messages_str)
        .map_err(|e| DatabaseError::Serialization(format!("departments.messages: {e}")))?;
    let messages = message_ids
        .iter()
        .map(|s| parse_uuid(s, "message"))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AddressRecord {
        id: parse_uuid(&id_str, "department")?,
        address,
        messages,
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to a ContentRecord.
///
/// Column order matches CONTENT_COLUMNS: 0:id, 1:created_at, 2:text, 3:image, 4:department_id
fn row_to_content(row: &libsql::Row) -> Result<ContentRecord, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("content row: {e}")))?;
    let created_str: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("content row: {e}")))?;
    let text: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("content row: {e}")))?;
    let image: Option<String> = row.get(3).ok();
    let department_str: String = row
        .get(4)
        .map_err(|e| DatabaseError::Query(format!("content row: {e}")))?;

    Ok(ContentRecord {
        id: parse_uuid(&id_str, "message")?,
        created_at: parse_datetime(&created_str),
        text,
        image,
        department_id: parse_uuid(&department_str, "department")?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

const ADDRESS_COLUMNS: &str = "id, address, messages, created_at";

const CONTENT_COLUMNS: &str = "id, created_at, text, image, department_id";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Addresses ───────────────────────────────────────────────────

    async fn list_addresses(&self) -> Result<Vec<AddressRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ADDRESS_COLUMNS} FROM departments ORDER BY rowid ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_addresses: {e}")))?;

        let mut addresses = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_addresses: {e}")))?
        {
            addresses.push(row_to_address(&row)?);
        }
        Ok(addresses)
    }

    async fn get_address(&self, id: Uuid) -> Result<Option<AddressRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ADDRESS_COLUMNS} FROM departments WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_address: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_address(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_address: {e}"))),
        }
    }

    async fn upsert_address(&self, address: &str) -> Result<AddressRecord, DatabaseError> {
        let candidate = AddressRecord::new(address);
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO departments (id, address, messages, created_at) VALUES (?1, ?2, '[]', ?3)
                 ON CONFLICT (address) DO NOTHING",
                params![
                    candidate.id.to_string(),
                    address,
                    candidate.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_address: {e}")))?;

        if inserted > 0 {
            debug!(department_id = %candidate.id, address, "Department created");
        }

        self.find_address_by_value(address)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "department".into(),
                id: address.to_string(),
            })
    }

    async fn append_content_to_address(
        &self,
        address_id: Uuid,
        content_id: Uuid,
    ) -> Result<(), DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE departments SET messages = json_insert(messages, '$[#]', ?1) WHERE id = ?2",
                params![content_id.to_string(), address_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_content_to_address: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "department".into(),
                id: address_id.to_string(),
            });
        }

        debug!(department_id = %address_id, message_id = %content_id, "Message linked to department");
        Ok(())
    }

    // ── Content ─────────────────────────────────────────────────────

    async fn create_content(&self, content: &ContentRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO department_messages (id, created_at, text, image, department_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    content.id.to_string(),
                    content.created_at.to_rfc3339(),
                    content.text.as_str(),
                    opt_text(content.image.as_deref()),
                    content.department_id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_content: {e}")))?;

        debug!(message_id = %content.id, department_id = %content.department_id, "Message inserted into DB");
        Ok(())
    }

    async fn get_content(&self, id: Uuid) -> Result<Option<ContentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CONTENT_COLUMNS} FROM department_messages WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_content: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_content(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_content: {e}"))),
        }
    }

    async fn list_contents_for_address(
        &self,
        address_id: Uuid,
    ) -> Result<Vec<ContentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONTENT_COLUMNS} FROM department_messages
                     WHERE department_id = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![address_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_contents_for_address: {e}")))?;

        let mut contents = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_contents_for_address: {e}")))?
        {
            contents.push(row_to_content(&row)?);
        }
        Ok(contents)
    }
}
