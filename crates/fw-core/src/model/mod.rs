//! Modelos persistidos (Firework, Workflow, Launch) y definiciones de entrada
//! (`WorkflowSpec`, `FireworkSpec`).

mod firework;
mod launch;
mod spec;
mod workflow;

pub use firework::Firework;
pub use launch::{Launch, LaunchStateEntry};
pub use spec::{FireworkSpec, WorkflowSpec};
pub use workflow::Workflow;

/// Id de un FireWork (job).
pub type FwId = i64;
/// Id de un Workflow.
pub type WfId = i64;
/// Id de un Launch (intento de ejecución).
pub type LaunchId = i64;
