use std::fmt;

use serde::{Deserialize, Serialize};

use super::FwState;
use crate::model::Firework;

/// Estado agregado de un workflow, derivado de sus jobs en cada lectura.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Waiting,
    Ready,
    Running,
    Completed,
    Fizzled,
    Defused,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Fizzled => "FIZZLED",
            Self::Defused => "DEFUSED",
        }
    }

    /// Reglas, en orden de precedencia:
    /// 1. todos COMPLETED -> `Completed`
    /// 2. algún job RESERVED/RUNNING -> `Running`
    /// 3. algún FIZZLED (y nada en vuelo) -> `Fizzled`
    /// 4. todos los no completados están defused -> `Defused`
    /// 5. progreso parcial -> `Running`
    /// 6. algún READY armado -> `Ready`
    /// 7. resto -> `Waiting`
    pub fn aggregate<'a, I>(fireworks: I) -> WorkflowState
        where I: IntoIterator<Item = &'a Firework>
    {
        let mut total = 0usize;
        let mut completed = 0usize;
        let mut in_flight = false;
        let mut fizzled = false;
        let mut all_pending_defused = true;
        let mut ready = false;
        for fw in fireworks {
            total += 1;
            match fw.state {
                FwState::Completed => {
                    completed += 1;
                    continue;
                }
                FwState::Reserved | FwState::Running => in_flight = true,
                FwState::Fizzled => fizzled = true,
                FwState::Ready if !fw.defused => ready = true,
                FwState::Ready | FwState::Waiting => {}
            }
            all_pending_defused &= fw.defused;
        }
        if total == 0 {
            return Self::Waiting;
        }
        if completed == total {
            Self::Completed
        } else if in_flight {
            Self::Running
        } else if fizzled {
            Self::Fizzled
        } else if all_pending_defused {
            Self::Defused
        } else if completed > 0 {
            Self::Running
        } else if ready {
            Self::Ready
        } else {
            Self::Waiting
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
