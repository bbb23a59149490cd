//! Provider Setup — booking-marketplace onboarding core.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
