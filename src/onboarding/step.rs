//! Setup step machine — tracks which wizard step the provider is on.

use serde::{Deserialize, Serialize};

/// The steps of the provider setup wizard.
///
/// Progresses linearly: BasicInfo → Identifier → Services → Contact →
/// Preview. `complete()` on the Preview step closes the record; there is no
/// step after Preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStep {
    BasicInfo,
    Identifier,
    Services,
    Contact,
    Preview,
}

impl SetupStep {
    pub const FIRST: SetupStep = SetupStep::BasicInfo;
    pub const FINAL: SetupStep = SetupStep::Preview;

    /// 1-based position, the form the store persists.
    pub fn index(&self) -> u8 {
        match self {
            Self::BasicInfo => 1,
            Self::Identifier => 2,
            Self::Services => 3,
            Self::Contact => 4,
            Self::Preview => 5,
        }
    }

    /// Parse a stored 1-based counter. Out-of-range values are `None`
    /// (stale counters from older wizard layouts are treated as absent).
    pub fn from_index(index: u8) -> Option<SetupStep> {
        match index {
            1 => Some(Self::BasicInfo),
            2 => Some(Self::Identifier),
            3 => Some(Self::Services),
            4 => Some(Self::Contact),
            5 => Some(Self::Preview),
            _ => None,
        }
    }

    /// Get the next step in the linear progression, if any.
    pub fn next(&self) -> Option<SetupStep> {
        Self::from_index(self.index() + 1)
    }

    /// Get the previous step, if any.
    pub fn prev(&self) -> Option<SetupStep> {
        self.index().checked_sub(2).and_then(|i| Self::from_index(i + 1))
    }

    /// Check whether advancing from `self` to `target` is valid.
    /// Forward transitions move exactly one step; never skip.
    pub fn can_advance_to(&self, target: SetupStep) -> bool {
        self.next() == Some(target)
    }
}

impl std::fmt::Display for SetupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BasicInfo => "basic_info",
            Self::Identifier => "identifier",
            Self::Services => "services",
            Self::Contact => "contact",
            Self::Preview => "preview",
        };
        write!(f, "{s}")
    }
}

/// Where the record is in its lifecycle: still walking the wizard, or closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "step")]
pub enum FlowPhase {
    InProgress(SetupStep),
    Completed,
}

impl FlowPhase {
    /// Whether this phase is terminal (setup is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}
