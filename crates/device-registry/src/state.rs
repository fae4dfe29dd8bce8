//! Mapping from backend state codes to canonical lifecycle states.

use core::fmt;
use device_notify::RawState;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalState {
    Unknown,
    Creating,
    Connecting,
    Booting,
    Booted,
    BootedOs,
    ShuttingDown,
    Shutdown,
    Dfu,
    Recovery,
    RestoreOs,
    Disconnected,
}

impl CanonicalState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Creating => "creating",
            Self::Connecting => "connecting",
            Self::Booting => "booting",
            Self::Booted => "booted",
            Self::BootedOs => "booted_os",
            Self::ShuttingDown => "shutting_down",
            Self::Shutdown => "shutdown",
            Self::Dfu => "dfu",
            Self::Recovery => "recovery",
            Self::RestoreOs => "restore_os",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Classification {
    pub state: CanonicalState,
    /// Whether the manager owning the table is responsible for devices in this state.
    pub trackable: bool,
}

impl Classification {
    pub const UNKNOWN: Self = Self {
        state: CanonicalState::Unknown,
        trackable: false,
    };
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StateEntry {
    pub raw: RawState,
    pub state: CanonicalState,
    pub trackable: bool,
}

impl StateEntry {
    pub const fn tracked(raw: u32, state: CanonicalState) -> Self {
        Self {
            raw: RawState(raw),
            state,
            trackable: true,
        }
    }

    pub const fn ignored(raw: u32, state: CanonicalState) -> Self {
        Self {
            raw: RawState(raw),
            state,
            trackable: false,
        }
    }
}

/// Lookup table for one backend's raw state codes. Codes that are not listed classify
/// as [`Classification::UNKNOWN`].
#[derive(Debug)]
pub struct StateTable {
    name: &'static str,
    entries: &'static [StateEntry],
}

impl StateTable {
    pub const fn new(name: &'static str, entries: &'static [StateEntry]) -> Self {
        Self { name, entries }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn entries(&self) -> &'static [StateEntry] {
        self.entries
    }

    pub fn classify(&self, raw: RawState) -> Classification {
        classify(self, raw)
    }
}

pub fn classify(table: &StateTable, raw: RawState) -> Classification {
    table
        .entries
        .iter()
        .find(|e| e.raw == raw)
        .map(|e| Classification {
            state: e.state,
            trackable: e.trackable,
        })
        .unwrap_or(Classification::UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRIES: &[StateEntry] = &[
        StateEntry::tracked(1, CanonicalState::Booting),
        StateEntry::ignored(2, CanonicalState::BootedOs),
    ];
    static TABLE: StateTable = StateTable::new("test", ENTRIES);

    #[test]
    fn test_listed_codes_classify_from_table() {
        assert_eq!(
            classify(&TABLE, RawState(1)),
            Classification {
                state: CanonicalState::Booting,
                trackable: true
            }
        );
        assert_eq!(
            TABLE.classify(RawState(2)),
            Classification {
                state: CanonicalState::BootedOs,
                trackable: false
            }
        );
    }

    #[test]
    fn test_unlisted_codes_are_unknown_and_untracked() {
        assert_eq!(TABLE.classify(RawState(42)), Classification::UNKNOWN);
    }

    #[test]
    fn test_state_names_match_serde() {
        for state in [
            CanonicalState::BootedOs,
            CanonicalState::RestoreOs,
            CanonicalState::ShuttingDown,
            CanonicalState::Disconnected,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }
}
