//! fw-core: motor de la LaunchPad de FireWorks.
//!
//! Agrupa el modelo (FireWorks, Workflows, Launches), la máquina de estados,
//! los contratos del store (`LaunchPadStore`, `IdAllocator`) con su backend en
//! memoria, el motor de consultas y la fachada `LaunchPad` que compone
//! reservas, reportes de workers y mantenimiento.
pub mod clock;
pub mod config;
pub mod constants;
pub mod errors;
pub mod launchpad;
pub mod model;
pub mod query;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LaunchPadConfig;
pub use errors::{LaunchPadError, LaunchPadResult, RecordKind};
pub use launchpad::{AddedWorkflow, LaunchPad, MaintenanceReport, MaintenanceSignal, Reservation, TuneupReport};
pub use model::{Firework, FireworkSpec, FwId, Launch, LaunchId, LaunchStateEntry, WfId, Workflow, WorkflowSpec};
pub use query::{FireworkPredicate, FwQuery, WfQuery, WorkflowPredicate};
pub use state::{FwState, LaunchState, WorkflowState};
pub use store::{FireworkUpdate, IdAllocator, IdKind, InMemoryStore, LaunchChange, LaunchPadStore, Precondition, StoreSnapshot};
