use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{FwId, LaunchId};
use crate::state::LaunchState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchStateEntry {
    pub state: LaunchState,
    pub at: DateTime<Utc>,
}

/// Un intento de ejecución de un job por un worker.
///
/// `superseded` marca launches invalidados (reserva recuperada por
/// mantenimiento o `rerun`); nunca se borran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    pub launch_id: LaunchId,
    pub fw_id: FwId,
    pub state: LaunchState,
    pub reservation_id: Uuid,
    pub worker: Option<String>,
    pub reserved_on: DateTime<Utc>,
    pub reservation_expires: DateTime<Utc>,
    pub started_on: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub finished_on: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub fizzle_reason: Option<String>,
    pub superseded: bool,
    pub state_history: Vec<LaunchStateEntry>,
}

impl Launch {
    /// Nuevo launch en RESERVED con un `reservation_id` fresco.
    pub fn reserve(launch_id: LaunchId,
                   fw_id: FwId,
                   worker: Option<String>,
                   reserved_on: DateTime<Utc>,
                   reservation_expires: DateTime<Utc>)
                   -> Self {
        Self { launch_id,
               fw_id,
               state: LaunchState::Reserved,
               reservation_id: Uuid::new_v4(),
               worker,
               reserved_on,
               reservation_expires,
               started_on: None,
               last_heartbeat: None,
               finished_on: None,
               result: None,
               fizzle_reason: None,
               superseded: false,
               state_history: vec![LaunchStateEntry { state: LaunchState::Reserved,
                                                      at: reserved_on }] }
    }

    /// Vigente y no terminal: ocupa el job.
    pub fn is_active(&self) -> bool {
        !self.superseded && !self.state.is_terminal()
    }

    /// Último signo de vida: heartbeat, inicio o reserva.
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_heartbeat.or(self.started_on).unwrap_or(self.reserved_on)
    }

    pub(crate) fn record(&mut self, state: LaunchState, at: DateTime<Utc>) {
        self.state = state;
        self.state_history.push(LaunchStateEntry { state, at });
    }
}
