//! Máquina de estados de FireWorks y Launches.
//!
//! - `FwState`: estado de un job. Las transiciones válidas están en
//!   `FwState::can_transition_to`.
//! - `LaunchState`: estado de un intento de ejecución.
//! - `WorkflowState`: agregado derivado (nunca persistido) de un workflow.
//! - `readiness`: WAITING/READY según el estado de los padres en el DAG.

mod firework;
mod launch;
mod workflow;

pub use firework::{readiness, FwState, UnknownState};
pub use launch::LaunchState;
pub use workflow::WorkflowState;
