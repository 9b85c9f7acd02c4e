use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{FwId, LaunchId, WfId};
use crate::state::FwState;

/// Un job persistido.
///
/// `state` y `current_launch` se escriben siempre en la misma operación
/// atómica que el launch al que se refieren (ver `FireworkUpdate`), por lo que
/// no pueden divergir. `revision` crece en cada escritura y es el token de
/// concurrencia optimista del backend durable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Firework {
    pub fw_id: FwId,
    pub wf_id: WfId,
    pub name: String,
    pub spec: Value, // payload opaco del usuario
    pub priority: i32,
    pub state: FwState,
    pub defused: bool,
    pub revision: i64,
    pub current_launch: Option<LaunchId>,
    pub launch_ids: Vec<LaunchId>, // historia append-only
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl Firework {
    /// READY y sin defuse: puede ofrecerse a un worker.
    pub fn is_reservable(&self) -> bool {
        self.state == FwState::Ready && !self.defused
    }
}
