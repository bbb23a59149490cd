//! Flow controller — the only mutation surface for a provider's setup record.
//!
//! Sequences validate → persist → advance so the caller sees each transition
//! as atomic: any failure leaves the in-memory record and step exactly as
//! they were. One controller per owner per session; `advance()` and
//! `complete()` serialize behind a transition lock, while auto-save and the
//! username availability probe run as debounced background tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FlowConfig;
use crate::error::{FlowError, Result};
use crate::onboarding::infer::reconcile;
use crate::onboarding::model::{FieldPatch, SetupRecord};
use crate::onboarding::rules::{username_length_ok, validate_step};
use crate::onboarding::step::{FlowPhase, SetupStep};
use crate::store::ProgressStore;

/// Latest settled result of the username availability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsernameProbe {
    pub candidate: String,
    pub available: bool,
}

/// Snapshot of the flow for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct FlowStatus {
    #[serde(flatten)]
    pub phase: FlowPhase,
    /// 1-based step index, the form the wizard header renders.
    pub step_index: u8,
    pub record: SetupRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_probe: Option<UsernameProbe>,
}

/// Coordinates validation, persistence, and step transitions for one owner.
pub struct FlowController {
    owner_id: String,
    config: FlowConfig,
    store: Arc<dyn ProgressStore>,
    record: Arc<RwLock<SetupRecord>>,
    step: Arc<RwLock<SetupStep>>,
    /// Serializes advance()/complete(); a second call queues, never
    /// interleaves.
    transition: Mutex<()>,
    autosave_task: Mutex<Option<JoinHandle<()>>>,
    probe: Arc<RwLock<Option<UsernameProbe>>>,
    probe_generation: Arc<AtomicU64>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl FlowController {
    /// Load stored progress for an owner and reconcile the stored step
    /// marker against what the data actually supports.
    pub async fn load(
        owner_id: impl Into<String>,
        store: Arc<dyn ProgressStore>,
        config: FlowConfig,
    ) -> Result<Self> {
        let owner_id = owner_id.into();
        let (record, step) = match store.load_progress(&owner_id).await? {
            Some(progress) => {
                let step = reconcile(progress.step, &progress.record);
                (progress.record, step)
            }
            None => (SetupRecord::default(), SetupStep::FIRST),
        };
        info!(owner = %owner_id, step = %step, "Loaded setup progress");

        Ok(Self {
            owner_id,
            config,
            store,
            record: Arc::new(RwLock::new(record)),
            step: Arc::new(RwLock::new(step)),
            transition: Mutex::new(()),
            autosave_task: Mutex::new(None),
            probe: Arc::new(RwLock::new(None)),
            probe_generation: Arc::new(AtomicU64::new(0)),
            probe_task: Mutex::new(None),
        })
    }

    pub async fn current_step(&self) -> SetupStep {
        *self.step.read().await
    }

    pub async fn record(&self) -> SetupRecord {
        self.record.read().await.clone()
    }

    pub async fn status(&self) -> FlowStatus {
        let record = self.record.read().await.clone();
        let step = *self.step.read().await;
        FlowStatus {
            phase: if record.completed {
                FlowPhase::Completed
            } else {
                FlowPhase::InProgress(step)
            },
            step_index: step.index(),
            record,
            username_probe: self.probe.read().await.clone(),
        }
    }

    /// Merge a partial field update into the in-memory record.
    ///
    /// No validation, no synchronous persistence: a debounced background
    /// auto-save picks the change up, and its failures are logged rather
    /// than surfaced so typing is never interrupted.
    pub async fn update_fields(&self, patch: FieldPatch) {
        if patch.is_empty() {
            return;
        }
        {
            let mut record = self.record.write().await;
            record.apply(patch);
        }
        self.schedule_autosave().await;
    }

    /// Validate the current step and, only if it passes, persist the merged
    /// record and move forward exactly one step.
    pub async fn advance(&self, patch: Option<FieldPatch>) -> Result<SetupStep> {
        let _guard = self.transition.lock().await;

        let current = *self.step.read().await;
        // Work on a merged copy; memory is only touched after persistence
        // succeeds.
        let mut merged = self.record.read().await.clone();
        if merged.completed {
            return Err(FlowError::Completed);
        }
        if let Some(patch) = patch {
            merged.apply(patch);
        }

        validate_step(current, &merged)?;
        let next = current.next().ok_or(FlowError::FinalStep)?;
        debug_assert!(current.can_advance_to(next));

        // The identifier step also needs the external uniqueness check;
        // length/charset alone is not enough.
        if current == SetupStep::Identifier {
            self.require_available(merged.username.trim()).await?;
        }

        self.store
            .save_progress(&self.owner_id, &merged, next)
            .await?;
        self.store
            .replace_services(&self.owner_id, &merged.services)
            .await?;

        *self.record.write().await = merged;
        *self.step.write().await = next;
        info!(owner = %self.owner_id, step = %next, "Advanced setup step");
        Ok(next)
    }

    /// Step back one step. Pure UI navigation: no validation, no
    /// persistence, and nothing entered so far is lost.
    pub async fn retreat(&self) -> Option<SetupStep> {
        let mut step = self.step.write().await;
        let prev = step.prev()?;
        *step = prev;
        debug!(step = %prev, "Stepped back");
        Some(prev)
    }

    /// Re-validate the final step, persist everything, and close the record.
    pub async fn complete(&self) -> Result<()> {
        let _guard = self.transition.lock().await;

        let snapshot = self.record.read().await.clone();
        if snapshot.completed {
            return Err(FlowError::Completed);
        }

        validate_step(SetupStep::FINAL, &snapshot)?;
        self.require_available(snapshot.username.trim()).await?;

        // Make the latest fields durable before flipping the flag.
        self.store
            .save_progress(&self.owner_id, &snapshot, SetupStep::FINAL)
            .await?;
        self.store
            .replace_services(&self.owner_id, &snapshot.services)
            .await?;

        let at = Utc::now();
        self.store.mark_complete(&self.owner_id, at).await?;

        let mut record = self.record.write().await;
        record.completed = true;
        record.completed_at = Some(at);
        info!(owner = %self.owner_id, "Setup completed");
        Ok(())
    }

    /// Debounced availability probe for live feedback while the user types.
    ///
    /// Each call supersedes the previous one: the in-flight task is aborted
    /// and a generation counter drops any result that still lands late, so
    /// the latest input wins by issuance order, not completion order.
    pub async fn check_username(&self, candidate: impl Into<String>) {
        let candidate = candidate.into();
        let generation = self.probe_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut task = self.probe_task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }

        if !username_length_ok(&candidate) {
            // Not worth a round trip; also clear any verdict for older input.
            *self.probe.write().await = None;
            return;
        }

        let store = Arc::clone(&self.store);
        let probe = Arc::clone(&self.probe);
        let generations = Arc::clone(&self.probe_generation);
        let owner = self.owner_id.clone();
        let debounce = self.config.username_check_debounce;

        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let result = store.is_available(candidate.trim(), Some(&owner)).await;
            if generations.load(Ordering::SeqCst) != generation {
                return; // superseded while in flight
            }
            match result {
                Ok(available) => {
                    *probe.write().await = Some(UsernameProbe {
                        candidate,
                        available,
                    });
                }
                Err(e) => warn!("Username availability check failed: {e}"),
            }
        }));
    }

    /// Latest settled probe result, if any.
    pub async fn username_probe(&self) -> Option<UsernameProbe> {
        self.probe.read().await.clone()
    }

    async fn require_available(&self, candidate: &str) -> Result<()> {
        let available = self
            .store
            .is_available(candidate, Some(&self.owner_id))
            .await?;
        if !available {
            return Err(FlowError::Conflict {
                field: "username".into(),
            });
        }
        Ok(())
    }

    /// Fire-and-forget debounced save of the current record. A newer edit
    /// aborts the pending save and starts the clock again.
    async fn schedule_autosave(&self) {
        let mut task = self.autosave_task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }

        let store = Arc::clone(&self.store);
        let record = Arc::clone(&self.record);
        let step = Arc::clone(&self.step);
        let owner = self.owner_id.clone();
        let debounce = self.config.autosave_debounce;

        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let snapshot = record.read().await.clone();
            if snapshot.completed {
                return;
            }
            let step = *step.read().await;
            // Failures are swallowed: logged, never surfaced to the UI.
            if let Err(e) = store.save_progress(&owner, &snapshot, step).await {
                warn!("Auto-save failed: {e}");
                return;
            }
            if let Err(e) = store.replace_services(&owner, &snapshot.services).await {
                warn!("Auto-save of services failed: {e}");
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::onboarding::model::ServiceEntry;
    use crate::store::StoredProgress;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicBool;

    /// In-memory `ProgressStore` with failure injection.
    #[derive(Default)]
    struct MockStore {
        progress: StdMutex<Option<StoredProgress>>,
        saves: StdMutex<Vec<(SetupRecord, SetupStep)>>,
        service_writes: StdMutex<Vec<Vec<ServiceEntry>>>,
        completions: StdMutex<Vec<DateTime<Utc>>>,
        taken_usernames: StdMutex<HashSet<String>>,
        conflict_on_save: AtomicBool,
        transient_on_save: AtomicBool,
    }

    impl MockStore {
        fn with_taken(usernames: &[&str]) -> Self {
            let store = Self::default();
            *store.taken_usernames.lock().unwrap() =
                usernames.iter().map(|s| s.to_string()).collect();
            store
        }

        fn save_count(&self) -> usize {
            self.saves.lock().unwrap().len()
        }

        fn last_save(&self) -> (SetupRecord, SetupStep) {
            self.saves.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ProgressStore for MockStore {
        async fn run_migrations(&self) -> std::result::Result<(), StoreError> {
            Ok(())
        }

        async fn load_progress(
            &self,
            _owner_id: &str,
        ) -> std::result::Result<Option<StoredProgress>, StoreError> {
            Ok(self.progress.lock().unwrap().clone())
        }

        async fn save_progress(
            &self,
            _owner_id: &str,
            record: &SetupRecord,
            step: SetupStep,
        ) -> std::result::Result<String, StoreError> {
            if self.conflict_on_save.load(Ordering::SeqCst) {
                return Err(StoreError::Conflict {
                    field: "username".into(),
                });
            }
            if self.transient_on_save.load(Ordering::SeqCst) {
                return Err(StoreError::Query("connection reset".into()));
            }
            self.saves.lock().unwrap().push((record.clone(), step));
            Ok("provider-1".into())
        }

        async fn replace_services(
            &self,
            _owner_id: &str,
            services: &[ServiceEntry],
        ) -> std::result::Result<(), StoreError> {
            self.service_writes.lock().unwrap().push(services.to_vec());
            Ok(())
        }

        async fn mark_complete(
            &self,
            _owner_id: &str,
            at: DateTime<Utc>,
        ) -> std::result::Result<(), StoreError> {
            self.completions.lock().unwrap().push(at);
            Ok(())
        }

        async fn is_available(
            &self,
            candidate: &str,
            _exclude_owner: Option<&str>,
        ) -> std::result::Result<bool, StoreError> {
            Ok(!self.taken_usernames.lock().unwrap().contains(candidate))
        }
    }

    fn service(name: &str) -> ServiceEntry {
        ServiceEntry {
            name: name.into(),
            price: dec!(150),
            duration_minutes: 30,
            description: None,
            category: None,
        }
    }

    fn filled_record() -> SetupRecord {
        SetupRecord {
            business_name: "Ana's Nails".into(),
            category: "unas".into(),
            username: "ana-nails".into(),
            services: vec![service("Corte")],
            ..Default::default()
        }
    }

    async fn controller_with(store: Arc<MockStore>) -> FlowController {
        FlowController::load("owner-1", store, FlowConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_record_starts_at_first_step() {
        let controller = controller_with(Arc::new(MockStore::default())).await;
        assert_eq!(controller.current_step().await, SetupStep::BasicInfo);
    }

    #[tokio::test]
    async fn advance_with_empty_basic_info_fails_and_stays() {
        let store = Arc::new(MockStore::default());
        let controller = controller_with(Arc::clone(&store)).await;

        let err = controller
            .advance(Some(FieldPatch {
                business_name: Some(String::new()),
                category: Some(String::new()),
                ..Default::default()
            }))
            .await
            .unwrap_err();

        match err {
            FlowError::Validation(r) => assert_eq!(r.field, "business_name"),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(controller.current_step().await, SetupStep::BasicInfo);
        // Failed advance leaves the in-memory record untouched too.
        assert_eq!(controller.record().await, SetupRecord::default());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn advance_with_valid_basic_info_moves_to_identifier() {
        let store = Arc::new(MockStore::default());
        let controller = controller_with(Arc::clone(&store)).await;

        let next = controller
            .advance(Some(FieldPatch {
                business_name: Some("Ana's Nails".into()),
                category: Some("unas".into()),
                ..Default::default()
            }))
            .await
            .unwrap();

        assert_eq!(next, SetupStep::Identifier);
        assert_eq!(controller.current_step().await, SetupStep::Identifier);
        // The stored step marker points at the step the user resumes on.
        let (saved, step) = store.last_save();
        assert_eq!(saved.business_name, "Ana's Nails");
        assert_eq!(step, SetupStep::Identifier);
    }

    #[tokio::test]
    async fn retreat_then_advance_round_trips() {
        let store = Arc::new(MockStore::default());
        *store.progress.lock().unwrap() = Some(StoredProgress {
            record: filled_record(),
            step: Some(SetupStep::Services),
        });
        let controller = controller_with(Arc::clone(&store)).await;
        assert_eq!(controller.current_step().await, SetupStep::Services);

        assert_eq!(controller.retreat().await, Some(SetupStep::Identifier));
        let next = controller.advance(None).await.unwrap();
        assert_eq!(next, SetupStep::Services);
    }

    #[tokio::test]
    async fn retreat_stops_at_first_step() {
        let controller = controller_with(Arc::new(MockStore::default())).await;
        assert_eq!(controller.retreat().await, None);
        assert_eq!(controller.current_step().await, SetupStep::BasicInfo);
    }

    #[tokio::test]
    async fn taken_username_is_a_conflict_not_validation() {
        let store = Arc::new(MockStore::with_taken(&["ana-nails"]));
        *store.progress.lock().unwrap() = Some(StoredProgress {
            record: SetupRecord {
                business_name: "Ana's Nails".into(),
                category: "unas".into(),
                username: "ana-nails".into(),
                ..Default::default()
            },
            step: Some(SetupStep::Identifier),
        });
        let controller = controller_with(Arc::clone(&store)).await;

        let err = controller.advance(None).await.unwrap_err();
        match err {
            FlowError::Conflict { field } => assert_eq!(field, "username"),
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert_eq!(controller.current_step().await, SetupStep::Identifier);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn store_conflict_during_save_surfaces_as_conflict() {
        let store = Arc::new(MockStore::default());
        store.conflict_on_save.store(true, Ordering::SeqCst);
        let controller = controller_with(Arc::clone(&store)).await;

        let err = controller
            .advance(Some(FieldPatch {
                business_name: Some("Ana's Nails".into()),
                category: Some("unas".into()),
                ..Default::default()
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::Conflict { .. }));
        assert_eq!(controller.current_step().await, SetupStep::BasicInfo);
    }

    #[tokio::test]
    async fn transient_store_failure_leaves_state_unchanged() {
        let store = Arc::new(MockStore::default());
        store.transient_on_save.store(true, Ordering::SeqCst);
        let controller = controller_with(Arc::clone(&store)).await;

        let err = controller
            .advance(Some(FieldPatch {
                business_name: Some("Ana's Nails".into()),
                category: Some("unas".into()),
                ..Default::default()
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::Transient(_)));
        assert_eq!(controller.current_step().await, SetupStep::BasicInfo);
        assert_eq!(controller.record().await, SetupRecord::default());
    }

    #[tokio::test]
    async fn advance_on_final_step_is_rejected() {
        let store = Arc::new(MockStore::default());
        *store.progress.lock().unwrap() = Some(StoredProgress {
            record: filled_record(),
            step: Some(SetupStep::Preview),
        });
        let controller = controller_with(store).await;

        assert!(matches!(
            controller.advance(None).await,
            Err(FlowError::FinalStep)
        ));
    }

    #[tokio::test]
    async fn complete_closes_the_record() {
        let store = Arc::new(MockStore::default());
        *store.progress.lock().unwrap() = Some(StoredProgress {
            record: filled_record(),
            step: Some(SetupStep::Preview),
        });
        let controller = controller_with(Arc::clone(&store)).await;

        controller.complete().await.unwrap();

        let record = controller.record().await;
        assert!(record.completed);
        assert!(record.completed_at.is_some());
        assert_eq!(store.completions.lock().unwrap().len(), 1);

        // The record is closed: no transitions remain.
        assert!(matches!(
            controller.advance(None).await,
            Err(FlowError::Completed)
        ));
        assert!(matches!(
            controller.complete().await,
            Err(FlowError::Completed)
        ));
    }

    #[tokio::test]
    async fn complete_revalidates_the_final_step() {
        let store = Arc::new(MockStore::default());
        let mut record = filled_record();
        record.services.clear();
        *store.progress.lock().unwrap() = Some(StoredProgress {
            record,
            step: Some(SetupStep::Preview),
        });
        let controller = controller_with(Arc::clone(&store)).await;

        let err = controller.complete().await.unwrap_err();
        match err {
            FlowError::Validation(r) => assert_eq!(r.field, "services"),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert!(store.completions.lock().unwrap().is_empty());
        assert!(!controller.record().await.completed);
    }

    #[tokio::test]
    async fn stale_stored_step_is_clamped_on_load() {
        let store = Arc::new(MockStore::default());
        let mut record = filled_record();
        record.services.clear();
        *store.progress.lock().unwrap() = Some(StoredProgress {
            record,
            step: Some(SetupStep::Preview),
        });
        let controller = controller_with(store).await;
        assert_eq!(controller.current_step().await, SetupStep::Services);
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_debounces_to_a_single_write() {
        let store = Arc::new(MockStore::default());
        let controller = controller_with(Arc::clone(&store)).await;

        controller
            .update_fields(FieldPatch {
                business_name: Some("Ana".into()),
                ..Default::default()
            })
            .await;
        controller
            .update_fields(FieldPatch {
                business_name: Some("Ana's Nails".into()),
                ..Default::default()
            })
            .await;

        assert_eq!(store.save_count(), 0);
        tokio::time::sleep(FlowConfig::default().autosave_debounce * 2).await;

        assert_eq!(store.save_count(), 1);
        let (saved, _) = store.last_save();
        assert_eq!(saved.business_name, "Ana's Nails");
    }

    #[tokio::test(start_paused = true)]
    async fn username_probe_latest_input_wins() {
        let store = Arc::new(MockStore::with_taken(&["taken-name"]));
        let controller = controller_with(Arc::clone(&store)).await;

        controller.check_username("taken-name").await;
        controller.check_username("fresh-name").await;

        tokio::time::sleep(FlowConfig::default().username_check_debounce * 2).await;

        let probe = controller.username_probe().await.unwrap();
        assert_eq!(probe.candidate, "fresh-name");
        assert!(probe.available);
    }

    #[tokio::test(start_paused = true)]
    async fn short_candidate_clears_probe_without_io() {
        let store = Arc::new(MockStore::default());
        let controller = controller_with(Arc::clone(&store)).await;

        controller.check_username("valid-name").await;
        tokio::time::sleep(FlowConfig::default().username_check_debounce * 2).await;
        assert!(controller.username_probe().await.is_some());

        controller.check_username("ab").await;
        assert!(controller.username_probe().await.is_none());
    }
}
