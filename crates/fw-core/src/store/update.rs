//! Precondiciones y actualizaciones del compare-and-set.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::{Firework, Launch, LaunchId};
use crate::state::{FwState, LaunchState};

/// Lo que debe cumplir un job para que `update_if` aplique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precondition {
    pub state: FwState,
    /// `Some(flag)` exige ese valor de `defused`.
    pub defused: Option<bool>,
    /// `Some(id)` exige que `id` sea el launch vigente del job.
    pub current_launch: Option<LaunchId>,
    /// `Some(rev)` exige que el job no haya cambiado desde esa lectura.
    pub revision: Option<i64>,
}

impl Precondition {
    pub fn state(state: FwState) -> Self {
        Self { state,
               defused: None,
               current_launch: None,
               revision: None }
    }

    /// Estado esperado y sin defuse.
    pub fn armed(state: FwState) -> Self {
        Self::state(state).with_defused(false)
    }

    pub fn with_defused(mut self, defused: bool) -> Self {
        self.defused = Some(defused);
        self
    }

    pub fn with_launch(mut self, launch_id: LaunchId) -> Self {
        self.current_launch = Some(launch_id);
        self
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn holds(&self, fw: &Firework) -> bool {
        fw.state == self.state
        && self.defused.map_or(true, |d| fw.defused == d)
        && self.current_launch.map_or(true, |id| fw.current_launch == Some(id))
        && self.revision.map_or(true, |rev| fw.revision == rev)
    }
}

impl From<FwState> for Precondition {
    fn from(state: FwState) -> Self {
        Self::state(state)
    }
}

/// Cambio sobre un launch que viaja en la misma operación atómica que el job.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchChange {
    /// Alta de un launch nuevo; pasa a ser el vigente del job.
    Insert(Launch),
    Transition {
        launch_id: LaunchId,
        state: LaunchState,
        at: DateTime<Utc>,
        result: Option<Value>,
        reason: Option<String>,
    },
    Heartbeat { launch_id: LaunchId, at: DateTime<Utc> },
}

impl LaunchChange {
    pub fn transition(launch_id: LaunchId, state: LaunchState, at: DateTime<Utc>) -> Self {
        Self::Transition { launch_id,
                           state,
                           at,
                           result: None,
                           reason: None }
    }

    pub fn launch_id(&self) -> LaunchId {
        match self {
            Self::Insert(launch) => launch.launch_id,
            Self::Transition { launch_id, .. } | Self::Heartbeat { launch_id, .. } => *launch_id,
        }
    }

    /// Aplica el cambio a un launch existente. `Insert` lo reemplaza.
    pub fn apply_to(&self, launch: &mut Launch) {
        match self {
            Self::Insert(new) => *launch = new.clone(),
            Self::Transition { state,
                               at,
                               result,
                               reason,
                               .. } => {
                launch.record(*state, *at);
                match state {
                    LaunchState::Running => {
                        launch.started_on = Some(*at);
                        launch.last_heartbeat = Some(*at);
                    }
                    LaunchState::Completed | LaunchState::Fizzled => {
                        launch.finished_on = Some(*at);
                        if result.is_some() {
                            launch.result = result.clone();
                        }
                        if reason.is_some() {
                            launch.fizzle_reason = reason.clone();
                        }
                    }
                    LaunchState::Reserved => {}
                }
            }
            Self::Heartbeat { at, .. } => launch.last_heartbeat = Some(*at),
        }
    }
}

/// Campos a escribir en un job (más el launch asociado).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FireworkUpdate {
    pub state: Option<FwState>,
    pub defused: Option<bool>,
    /// `Some(None)` limpia el launch vigente.
    pub current_launch: Option<Option<LaunchId>>,
    pub launch: Option<LaunchChange>,
    /// Launches a marcar como `superseded`.
    pub supersede: Vec<LaunchId>,
    /// Instante de la escritura (`updated_on`); por defecto, el reloj del sistema.
    pub at: Option<DateTime<Utc>>,
}

impl FireworkUpdate {
    pub fn to_state(state: FwState) -> Self {
        Self { state: Some(state),
               ..Self::default() }
    }

    pub fn defused(mut self, defused: bool) -> Self {
        self.defused = Some(defused);
        self
    }

    pub fn with_launch(mut self, change: LaunchChange) -> Self {
        self.launch = Some(change);
        self
    }

    pub fn clear_current_launch(mut self) -> Self {
        self.current_launch = Some(None);
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    pub fn stamp(&self) -> DateTime<Utc> {
        self.at.unwrap_or_else(Utc::now)
    }

    pub fn supersede<I>(mut self, launch_ids: I) -> Self
        where I: IntoIterator<Item = LaunchId>
    {
        self.supersede.extend(launch_ids);
        self
    }

    /// Aplica los campos al job: bumpea `revision` y `updated_on`. Un
    /// `LaunchChange::Insert` agrega el id a la historia y lo vuelve vigente.
    pub fn apply_to(&self, fw: &mut Firework) {
        if let Some(state) = self.state {
            fw.state = state;
        }
        if let Some(defused) = self.defused {
            fw.defused = defused;
        }
        if let Some(LaunchChange::Insert(launch)) = &self.launch {
            if !fw.launch_ids.contains(&launch.launch_id) {
                fw.launch_ids.push(launch.launch_id);
            }
            fw.current_launch = Some(launch.launch_id);
        }
        if let Some(current) = self.current_launch {
            fw.current_launch = current;
        }
        fw.revision += 1;
        fw.updated_on = self.stamp();
    }
}
