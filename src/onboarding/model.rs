//! Provider setup record and service entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Allowed service duration window, in minutes.
pub const MIN_SERVICE_DURATION_MIN: u32 = 15;
pub const MAX_SERVICE_DURATION_MIN: u32 = 480;

/// Service name length bounds (counted in chars, after trimming).
pub const MIN_SERVICE_NAME_CHARS: usize = 2;
pub const MAX_SERVICE_NAME_CHARS: usize = 100;

/// One row of the services step.
///
/// The UI keeps a trailing all-blank row as the "add another" affordance, so
/// blank rows are expected in the list and are not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ServiceEntry {
    /// An untouched placeholder row: every field blank or zero.
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty()
            && self.price.is_zero()
            && self.duration_minutes == 0
            && self.description.as_deref().is_none_or(|s| s.trim().is_empty())
            && self.category.as_deref().is_none_or(|s| s.trim().is_empty())
    }

    /// A bookable service: real name, positive price, sane duration.
    pub fn is_valid(&self) -> bool {
        let name_chars = self.name.trim().chars().count();
        (MIN_SERVICE_NAME_CHARS..=MAX_SERVICE_NAME_CHARS).contains(&name_chars)
            && self.price > Decimal::ZERO
            && (MIN_SERVICE_DURATION_MIN..=MAX_SERVICE_DURATION_MIN)
                .contains(&self.duration_minutes)
    }
}

/// The provider's in-progress setup record.
///
/// Every field is independently empty until filled; navigating backward never
/// deletes anything. The record is the union of all fields ever entered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupRecord {
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SetupRecord {
    /// Both basic-info fields filled in.
    pub fn has_basic_info(&self) -> bool {
        !self.business_name.trim().is_empty() && !self.category.trim().is_empty()
    }

    /// At least one bookable service.
    pub fn has_valid_service(&self) -> bool {
        self.services.iter().any(ServiceEntry::is_valid)
    }

    /// Merge a partial update into the record. Provided fields overwrite,
    /// absent fields are left alone; the service list replaces wholesale.
    pub fn apply(&mut self, patch: FieldPatch) {
        if let Some(v) = patch.business_name {
            self.business_name = v;
        }
        if let Some(v) = patch.category {
            self.category = v;
        }
        if let Some(v) = patch.username {
            self.username = v;
        }
        if let Some(v) = patch.whatsapp_phone {
            self.whatsapp_phone = Some(v);
        }
        if let Some(v) = patch.address {
            self.address = Some(v);
        }
        if let Some(v) = patch.postal_code {
            self.postal_code = Some(v);
        }
        if let Some(v) = patch.services {
            self.services = v;
        }
    }
}

/// A partial field update from the UI. `None` means "not touched".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldPatch {
    pub business_name: Option<String>,
    pub category: Option<String>,
    pub username: Option<String>,
    pub whatsapp_phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub services: Option<Vec<ServiceEntry>>,
}

impl FieldPatch {
    pub fn is_empty(&self) -> bool {
        self.business_name.is_none()
            && self.category.is_none()
            && self.username.is_none()
            && self.whatsapp_phone.is_none()
            && self.address.is_none()
            && self.postal_code.is_none()
            && self.services.is_none()
    }
}
