//! Errores del motor.
//!
//! `NoEligibleJob` no aparece aquí: una reserva sin candidatos es un
//! resultado vacío (`Ok(None)`), no un error.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::FwId;
use crate::state::FwState;

/// Tipo de registro persistido, usado para reportar ids desconocidos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Firework,
    Workflow,
    Launch,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firework => f.write_str("firework"),
            Self::Workflow => f.write_str("workflow"),
            Self::Launch => f.write_str("launch"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum LaunchPadError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: i64 },
    #[error("invalid transition for fw_id={fw_id}: {from} -> {to}")]
    InvalidTransition { fw_id: FwId, from: FwState, to: FwState },
    #[error("cycle detected in workflow '{workflow}'")]
    CycleDetected { workflow: String },
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),
    #[error("reset refused: confirmation token does not match today's date")]
    ConfirmationMismatch,
    #[error("gave up on fw_id={fw_id} after {attempts} lost compare-and-set rounds")]
    ContentionExceeded { fw_id: FwId, attempts: usize },
    /// El store rechazó la escritura por romper una restricción (id
    /// duplicado, referencia inválida). Reintentar no cambia el resultado.
    #[error("store integrity violation: {0}")]
    Integrity(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LaunchPadError {
    pub fn not_found(kind: RecordKind, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Errores tras los cuales reintentar más tarde tiene sentido.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::ContentionExceeded { .. })
    }
}

pub type LaunchPadResult<T> = Result<T, LaunchPadError>;
