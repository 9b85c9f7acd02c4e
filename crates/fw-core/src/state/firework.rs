use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Estado de un FireWork.
///
/// Transiciones válidas:
/// - `Waiting` -> `Ready` (todos los padres COMPLETED)
/// - `Ready` -> `Reserved` (reserva ganada por un worker)
/// - `Ready` -> `Waiting` (un ancestro volvió a ejecutarse)
/// - `Reserved` -> `Running` (el worker confirmó el inicio)
/// - `Reserved` -> `Ready` | `Waiting` (reserva expirada y recuperada)
/// - `Reserved` | `Running` -> `Fizzled`
/// - `Running` -> `Completed`
/// - `Completed` | `Fizzled` -> `Waiting` | `Ready` (rerun)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FwState {
    Waiting,
    Ready,
    Reserved,
    Running,
    Completed,
    Fizzled,
}

impl FwState {
    pub const ALL: [FwState; 6] = [Self::Waiting,
                                   Self::Ready,
                                   Self::Reserved,
                                   Self::Running,
                                   Self::Completed,
                                   Self::Fizzled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Ready => "READY",
            Self::Reserved => "RESERVED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Fizzled => "FIZZLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Fizzled)
    }

    /// Hay un worker con un launch vivo sobre el job.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Reserved | Self::Running)
    }

    pub fn can_transition_to(self, next: FwState) -> bool {
        use FwState::*;
        matches!((self, next),
                 (Waiting, Ready)
                 | (Ready, Waiting | Reserved)
                 | (Reserved, Running | Ready | Waiting | Fizzled)
                 | (Running, Completed | Fizzled)
                 | (Completed | Fizzled, Waiting | Ready))
    }
}

impl fmt::Display for FwState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for FwState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter()
                 .find(|st| st.as_str().eq_ignore_ascii_case(s))
                 .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// Estado de elegibilidad de un job no iniciado a partir de sus padres.
pub fn readiness<I>(parent_states: I) -> FwState
    where I: IntoIterator<Item = FwState>
{
    if parent_states.into_iter().all(|s| s == FwState::Completed) {
        FwState::Ready
    } else {
        FwState::Waiting
    }
}
