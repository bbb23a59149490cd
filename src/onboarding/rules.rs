//! Per-step validation rules.
//!
//! Each step gets a pass/fail decision over the full field set. On failure
//! only the first violated rule is reported; the controller shows that one
//! message and nothing else.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Rejection;
use crate::onboarding::model::{
    MAX_SERVICE_DURATION_MIN, MAX_SERVICE_NAME_CHARS, MIN_SERVICE_DURATION_MIN,
    MIN_SERVICE_NAME_CHARS, ServiceEntry, SetupRecord,
};
use crate::onboarding::step::SetupStep;

/// Username length bounds (chars, after trimming).
pub const MIN_USERNAME_CHARS: usize = 3;
pub const MAX_USERNAME_CHARS: usize = 30;

/// Business name length bounds.
pub const MIN_BUSINESS_NAME_CHARS: usize = 2;
pub const MAX_BUSINESS_NAME_CHARS: usize = 100;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());

/// E.164: `+`, first digit 1-9, then 1-14 more digits.
static E164_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{1,14}$").unwrap());

static POSTAL_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{5}$").unwrap());

/// Validate one step against the full current field set.
pub fn validate_step(step: SetupStep, record: &SetupRecord) -> Result<(), Rejection> {
    match step {
        SetupStep::BasicInfo => basic_info(record),
        SetupStep::Identifier => identifier(record),
        SetupStep::Services => services(record),
        SetupStep::Contact => contact(record),
        SetupStep::Preview => preview(record),
    }
}

/// Username length check shared with step inference.
pub fn username_length_ok(username: &str) -> bool {
    let chars = username.trim().chars().count();
    (MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&chars)
}

fn basic_info(record: &SetupRecord) -> Result<(), Rejection> {
    let name = record.business_name.trim();
    if name.is_empty() {
        return Err(Rejection::new("business_name", "Enter your business name"));
    }
    let chars = name.chars().count();
    if !(MIN_BUSINESS_NAME_CHARS..=MAX_BUSINESS_NAME_CHARS).contains(&chars) {
        return Err(Rejection::new(
            "business_name",
            format!(
                "Business name must be {MIN_BUSINESS_NAME_CHARS} to {MAX_BUSINESS_NAME_CHARS} characters"
            ),
        ));
    }
    if record.category.trim().is_empty() {
        return Err(Rejection::new("category", "Pick a category for your business"));
    }
    Ok(())
}

fn identifier(record: &SetupRecord) -> Result<(), Rejection> {
    let username = record.username.trim();
    if username.is_empty() {
        return Err(Rejection::new("username", "Choose a username"));
    }
    if !username_length_ok(username) {
        return Err(Rejection::new(
            "username",
            format!("Username must be {MIN_USERNAME_CHARS} to {MAX_USERNAME_CHARS} characters"),
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(Rejection::new(
            "username",
            "Username can only contain letters, numbers, hyphens and underscores",
        ));
    }
    Ok(())
}

/// A partially filled invalid row fails the whole step; all-blank placeholder
/// rows are ignored.
fn services(record: &SetupRecord) -> Result<(), Rejection> {
    for entry in &record.services {
        if !entry.is_blank() {
            service_entry(entry)?;
        }
    }
    if !record.has_valid_service() {
        return Err(Rejection::new("services", "Add at least one service"));
    }
    Ok(())
}

fn service_entry(entry: &ServiceEntry) -> Result<(), Rejection> {
    let name_chars = entry.name.trim().chars().count();
    if name_chars < MIN_SERVICE_NAME_CHARS {
        return Err(Rejection::new(
            "services",
            format!("Service name must be at least {MIN_SERVICE_NAME_CHARS} characters"),
        ));
    }
    if name_chars > MAX_SERVICE_NAME_CHARS {
        return Err(Rejection::new(
            "services",
            format!("Service name must be at most {MAX_SERVICE_NAME_CHARS} characters"),
        ));
    }
    if entry.price <= rust_decimal::Decimal::ZERO {
        return Err(Rejection::new(
            "services",
            "Service price must be greater than zero",
        ));
    }
    if !(MIN_SERVICE_DURATION_MIN..=MAX_SERVICE_DURATION_MIN).contains(&entry.duration_minutes) {
        return Err(Rejection::new(
            "services",
            format!(
                "Service duration must be between {MIN_SERVICE_DURATION_MIN} and {MAX_SERVICE_DURATION_MIN} minutes"
            ),
        ));
    }
    Ok(())
}

/// Contact fields are all optional, but a provided value must be well-formed.
fn contact(record: &SetupRecord) -> Result<(), Rejection> {
    if let Some(phone) = record.whatsapp_phone.as_deref() {
        let phone = phone.trim();
        if !phone.is_empty() && !E164_RE.is_match(phone) {
            return Err(Rejection::new(
                "whatsapp_phone",
                "WhatsApp number must be in international format, e.g. +5215512345678",
            ));
        }
    }
    if let Some(postal) = record.postal_code.as_deref() {
        let postal = postal.trim();
        if !postal.is_empty() && !POSTAL_CODE_RE.is_match(postal) {
            return Err(Rejection::new(
                "postal_code",
                "Postal code must be exactly 5 digits",
            ));
        }
    }
    Ok(())
}

/// Re-check before publishing: everything the public profile needs must still
/// be present, whatever the stored step counter claims.
fn preview(record: &SetupRecord) -> Result<(), Rejection> {
    basic_info(record)?;
    identifier(record)?;
    if !record.has_valid_service() {
        return Err(Rejection::new(
            "services",
            "Add at least one service before publishing",
        ));
    }
    Ok(())
}
