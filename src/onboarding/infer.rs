//! Step inference — recovers the wizard position from persisted data.
//!
//! Stored step counters go stale (older clients, interrupted writes), so the
//! controller reconciles the counter against what the data actually supports
//! once at load time. Pure functions, no IO.

use crate::onboarding::model::SetupRecord;
use crate::onboarding::rules::username_length_ok;
use crate::onboarding::step::SetupStep;

/// Infer the step purely from field completeness.
///
/// Precedence order, first match wins. Contact is never inferred: all its
/// fields are optional, so data alone cannot distinguish "on the contact
/// step" from "past it" — only a stored counter can place a user there.
pub fn infer_step(record: &SetupRecord) -> SetupStep {
    if !record.has_basic_info() {
        return SetupStep::BasicInfo;
    }
    if !username_length_ok(&record.username) {
        return SetupStep::Identifier;
    }
    if !record.has_valid_service() {
        return SetupStep::Services;
    }
    SetupStep::Preview
}

/// Reconcile a stored step counter with the data.
///
/// The stored counter is authoritative while it stays at or behind what the
/// data supports (the user may have navigated backward). A counter ahead of
/// the inferred step implies prerequisites the data contradicts, so it is
/// clamped back to the inferred step.
pub fn reconcile(stored: Option<SetupStep>, record: &SetupRecord) -> SetupStep {
    let inferred = infer_step(record);
    match stored {
        Some(step) if step <= inferred => step,
        _ => inferred,
    }
}
