use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{FwState, UnknownState};

/// Estado de un intento de ejecución (Launch).
///
/// - `Reserved` -> `Running` | `Fizzled`
/// - `Running` -> `Completed` | `Fizzled`
///
/// `Completed` y `Fizzled` son historia inmutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaunchState {
    Reserved,
    Running,
    Completed,
    Fizzled,
}

impl LaunchState {
    pub const ALL: [LaunchState; 4] = [Self::Reserved, Self::Running, Self::Completed, Self::Fizzled];

    pub fn as_str(&self) -> &'static str {
        self.fw_state().as_str()
    }

    /// Estado del job que corresponde a un launch vigente en este estado.
    pub fn fw_state(self) -> FwState {
        match self {
            Self::Reserved => FwState::Reserved,
            Self::Running => FwState::Running,
            Self::Completed => FwState::Completed,
            Self::Fizzled => FwState::Fizzled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Fizzled)
    }

    pub fn can_transition_to(self, next: LaunchState) -> bool {
        use LaunchState::*;
        matches!((self, next), (Reserved, Running | Fizzled) | (Running, Completed | Fizzled))
    }
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LaunchState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter()
                 .find(|st| st.as_str().eq_ignore_ascii_case(s))
                 .ok_or_else(|| UnknownState(s.to_string()))
    }
}
