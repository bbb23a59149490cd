//! libSQL backend — async `ProgressStore` implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is safe for concurrent
//! async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::onboarding::model::{ServiceEntry, SetupRecord};
use crate::onboarding::step::SetupStep;
use crate::store::migrations;
use crate::store::traits::{ProgressStore, StoredProgress};

/// libSQL-backed progress store.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        info!(path = %path.display(), "Progress store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Existing provider row id for an owner, if any.
    async fn provider_id(&self, owner_id: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM providers WHERE owner_id = ?1",
                params![owner_id],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get(0).map_err(|e| StoreError::Query(e.to_string()))?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(e.to_string())),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Map a libsql write error, turning unique-constraint violations into the
/// typed conflict the flow layer needs.
fn map_write_err(e: libsql::Error) -> StoreError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        let field = if msg.contains("providers.username") {
            "username"
        } else {
            "owner_id"
        };
        return StoreError::Conflict {
            field: field.to_string(),
        };
    }
    StoreError::Query(msg)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Empty usernames are stored as NULL so the UNIQUE constraint only applies
/// to chosen usernames.
fn username_column(record: &SetupRecord) -> Option<String> {
    let trimmed = record.username.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[async_trait]
impl ProgressStore for LibSqlStore {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn load_progress(
        &self,
        owner_id: &str,
    ) -> Result<Option<StoredProgress>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT business_name, category, username, whatsapp_phone, address,
                        postal_code, last_step, completed, completed_at
                 FROM providers WHERE owner_id = ?1",
                params![owner_id],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(StoreError::Query(e.to_string())),
        };

        let map_col = |e: libsql::Error| StoreError::Query(e.to_string());
        let mut record = SetupRecord {
            business_name: row.get::<String>(0).map_err(map_col)?,
            category: row.get::<String>(1).map_err(map_col)?,
            username: row.get::<Option<String>>(2).map_err(map_col)?.unwrap_or_default(),
            whatsapp_phone: row.get::<Option<String>>(3).map_err(map_col)?,
            address: row.get::<Option<String>>(4).map_err(map_col)?,
            postal_code: row.get::<Option<String>>(5).map_err(map_col)?,
            services: Vec::new(),
            completed: row.get::<i64>(7).map_err(map_col)? != 0,
            completed_at: row
                .get::<Option<String>>(8)
                .map_err(map_col)?
                .as_deref()
                .and_then(parse_datetime),
        };
        let step = row
            .get::<Option<i64>>(6)
            .map_err(map_col)?
            .and_then(|i| u8::try_from(i).ok())
            .and_then(SetupStep::from_index);

        let mut service_rows = self
            .conn()
            .query(
                "SELECT name, price, duration_minutes, description, category
                 FROM provider_services WHERE owner_id = ?1 ORDER BY position",
                params![owner_id],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        while let Ok(Some(row)) = service_rows.next().await {
            let price_str: String = row.get(1).map_err(map_col)?;
            let price = price_str.parse::<Decimal>().unwrap_or_else(|e| {
                warn!(price = %price_str, "Unparseable stored price: {e}");
                Decimal::ZERO
            });
            record.services.push(ServiceEntry {
                name: row.get::<String>(0).map_err(map_col)?,
                price,
                duration_minutes: row
                    .get::<i64>(2)
                    .map_err(map_col)?
                    .try_into()
                    .unwrap_or(0),
                description: row.get::<Option<String>>(3).map_err(map_col)?,
                category: row.get::<Option<String>>(4).map_err(map_col)?,
            });
        }

        Ok(Some(StoredProgress { record, step }))
    }

    async fn save_progress(
        &self,
        owner_id: &str,
        record: &SetupRecord,
        step: SetupStep,
    ) -> Result<String, StoreError> {
        let id = self
            .provider_id(owner_id)
            .await?
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO providers
                    (id, owner_id, business_name, category, username, whatsapp_phone,
                     address, postal_code, last_step, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT(owner_id) DO UPDATE SET
                    business_name = excluded.business_name,
                    category = excluded.category,
                    username = excluded.username,
                    whatsapp_phone = excluded.whatsapp_phone,
                    address = excluded.address,
                    postal_code = excluded.postal_code,
                    last_step = excluded.last_step,
                    updated_at = excluded.updated_at",
                params![
                    id.clone(),
                    owner_id,
                    record.business_name.clone(),
                    record.category.clone(),
                    username_column(record),
                    record.whatsapp_phone.clone(),
                    record.address.clone(),
                    record.postal_code.clone(),
                    step.index() as i64,
                    now,
                ],
            )
            .await
            .map_err(map_write_err)?;

        Ok(id)
    }

    async fn replace_services(
        &self,
        owner_id: &str,
        services: &[ServiceEntry],
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "DELETE FROM provider_services WHERE owner_id = ?1",
                params![owner_id],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        for (position, entry) in services.iter().enumerate() {
            self.conn()
                .execute(
                    "INSERT INTO provider_services
                        (id, owner_id, position, name, price, duration_minutes,
                         description, category)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        Uuid::new_v4().to_string(),
                        owner_id,
                        position as i64,
                        entry.name.clone(),
                        entry.price.to_string(),
                        entry.duration_minutes as i64,
                        entry.description.clone(),
                        entry.category.clone(),
                    ],
                )
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
        }

        Ok(())
    }

    async fn mark_complete(&self, owner_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE providers
                 SET completed = 1, completed_at = ?1, updated_at = ?1
                 WHERE owner_id = ?2",
                params![at.to_rfc3339(), owner_id],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        if affected == 0 {
            return Err(StoreError::NotFound(owner_id.to_string()));
        }
        Ok(())
    }

    async fn is_available(
        &self,
        candidate: &str,
        exclude_owner: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM providers
                 WHERE username = ?1 AND (?2 IS NULL OR owner_id != ?2)",
                params![candidate.trim(), exclude_owner],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(count == 0)
            }
            Ok(None) => Ok(true),
            Err(e) => Err(StoreError::Query(e.to_string())),
        }
    }
}
