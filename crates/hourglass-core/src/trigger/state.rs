//! Store-side trigger states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a stored trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    /// Eligible for acquisition once due.
    #[default]
    Waiting,
    /// Claimed by a scheduler loop, pending fire.
    Acquired,
    /// Excluded from acquisition until resumed.
    Paused,
    /// Exhausted; will never fire again.
    Complete,
}

impl TriggerState {
    /// Stable string form used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerState::Waiting => "WAITING",
            TriggerState::Acquired => "ACQUIRED",
            TriggerState::Paused => "PAUSED",
            TriggerState::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WAITING" => Ok(TriggerState::Waiting),
            "ACQUIRED" => Ok(TriggerState::Acquired),
            "PAUSED" => Ok(TriggerState::Paused),
            "COMPLETE" => Ok(TriggerState::Complete),
            other => Err(format!("unknown trigger state: {}", other)),
        }
    }
}
