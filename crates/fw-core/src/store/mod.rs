//! Contratos del store y su backend en memoria.
//!
//! - `IdAllocator`: ids monotónicos por tipo, únicos entre procesos.
//! - `LaunchPadStore`: registros por id, compare-and-set (`update_if`),
//!   inserción atómica de workflows y lecturas consistentes (`snapshot`).
//! - `Precondition` / `FireworkUpdate` / `LaunchChange`: la lógica de CAS es
//!   compartida; cada backend sólo aporta la atomicidad. Así el backend en
//!   memoria sirve de referencia exacta para el durable.

mod memory;
mod update;

pub use memory::InMemoryStore;
pub use update::{FireworkUpdate, LaunchChange, Precondition};

use serde::{Deserialize, Serialize};

use crate::errors::LaunchPadResult;
use crate::model::{Firework, FwId, Launch, LaunchId, WfId, Workflow};
use crate::state::{FwState, LaunchState};

/// Espacio de ids independiente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdKind {
    Firework,
    Workflow,
    Launch,
}

impl IdKind {
    pub const ALL: [IdKind; 3] = [Self::Firework, Self::Workflow, Self::Launch];

    /// Clave estable usada por los backends durables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Firework => "fw",
            Self::Workflow => "wf",
            Self::Launch => "launch",
        }
    }
}

/// Asignador de ids.
///
/// Contrato: cada llamada devuelve un valor estrictamente mayor que los
/// anteriores para el mismo `kind`, aun con muchos llamadores concurrentes. Un
/// id entregado nunca se reutiliza (aunque la inserción que lo usaba falle).
/// Si el contador no es accesible devuelve `StoreUnavailable`.
pub trait IdAllocator: Send + Sync {
    fn next_id(&self, kind: IdKind) -> LaunchPadResult<i64>;
}

/// Lectura consistente de workflows y jobs (una sola vista del store).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub workflows: Vec<Workflow>,
    pub fireworks: Vec<Firework>,
}

/// Store de FireWorks, Workflows y Launches.
pub trait LaunchPadStore: IdAllocator {
    /// Inserta el workflow con todos sus jobs: o todo es visible o nada.
    fn insert_workflow(&self, workflow: &Workflow, fireworks: &[Firework]) -> LaunchPadResult<()>;

    fn firework(&self, fw_id: FwId) -> LaunchPadResult<Option<Firework>>;

    fn workflow(&self, wf_id: WfId) -> LaunchPadResult<Option<Workflow>>;

    fn launch(&self, launch_id: LaunchId) -> LaunchPadResult<Option<Launch>>;

    /// Workflow dueño del job.
    fn workflow_of(&self, fw_id: FwId) -> LaunchPadResult<Option<Workflow>> {
        match self.firework(fw_id)? {
            Some(fw) => self.workflow(fw.wf_id),
            None => Ok(None),
        }
    }

    /// Compare-and-set sobre un job.
    ///
    /// Aplica `update` (incluido el cambio de launch que transporte) sólo si
    /// `precondition` se cumple sobre el estado actual, de forma atómica.
    /// Devuelve `Ok(false)` sin efectos si no se cumple y `NotFound` si el job
    /// (o el launch referido) no existe.
    fn update_if(&self, fw_id: FwId, precondition: Precondition, update: &FireworkUpdate) -> LaunchPadResult<bool>;

    fn fireworks_in_state(&self, state: FwState) -> LaunchPadResult<Vec<Firework>>;

    fn launches_in_state(&self, state: LaunchState) -> LaunchPadResult<Vec<Launch>>;

    /// Launches de un job, en orden de creación.
    fn launches_of(&self, fw_id: FwId) -> LaunchPadResult<Vec<Launch>>;

    fn snapshot(&self) -> LaunchPadResult<StoreSnapshot>;

    /// Borra todos los registros y rebobina los contadores.
    fn reset(&self) -> LaunchPadResult<()>;

    /// Mantenimiento propio del backend (índices, estadísticas).
    fn tuneup(&self) -> LaunchPadResult<()>;
}
