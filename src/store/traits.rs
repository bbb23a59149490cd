//! `ProgressStore` trait — single async interface for setup persistence.
//!
//! The flow controller only knows this trait; the libsql backend is one
//! implementation, tests inject their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::onboarding::model::{ServiceEntry, SetupRecord};
use crate::onboarding::step::SetupStep;

/// What `load_progress` hands back: the saved record plus the last step
/// marker, if one was recorded.
#[derive(Debug, Clone)]
pub struct StoredProgress {
    pub record: SetupRecord,
    pub step: Option<SetupStep>,
}

/// Backend-agnostic persistence for the setup wizard.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError>;

    /// Load the owner's saved progress. `None` on first interaction.
    async fn load_progress(&self, owner_id: &str)
    -> Result<Option<StoredProgress>, StoreError>;

    /// Upsert the profile fields and the step marker. Returns the provider
    /// row id. A duplicate username surfaces as `StoreError::Conflict`.
    async fn save_progress(
        &self,
        owner_id: &str,
        record: &SetupRecord,
        step: SetupStep,
    ) -> Result<String, StoreError>;

    /// Replace the owner's full service list. This is a replace-all write,
    /// not an incremental upsert: rows the caller no longer sends are gone.
    async fn replace_services(
        &self,
        owner_id: &str,
        services: &[ServiceEntry],
    ) -> Result<(), StoreError>;

    /// Mark the owner's setup finished at the given instant.
    async fn mark_complete(&self, owner_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Username uniqueness check. `exclude_owner` skips the owner's own row
    /// so re-saving an unchanged username is not a collision.
    async fn is_available(
        &self,
        candidate: &str,
        exclude_owner: Option<&str>,
    ) -> Result<bool, StoreError>;
}
