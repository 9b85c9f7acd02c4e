//! Filas Diesel y su conversión a los modelos del core. El orden de los
//! campos sigue al de `schema.rs` (requisito de `Queryable`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use fw_core::{Firework, FwId, FwState, Launch, LaunchState, LaunchStateEntry, Workflow};
use serde_json::Value;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::schema::{fireworks, launches, workflows};

#[derive(Queryable, Insertable, Debug)]
#[diesel(table_name = workflows)]
pub struct WorkflowRow {
    pub wf_id: i64,
    pub name: String,
    pub metadata: Value,
    pub fw_ids: Vec<i64>,
    pub links: Value,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl WorkflowRow {
    pub fn from_model(wf: &Workflow) -> Result<Self, PersistenceError> {
        Ok(Self { wf_id: wf.wf_id,
                  name: wf.name.clone(),
                  metadata: wf.metadata.clone(),
                  fw_ids: wf.fw_ids.clone(),
                  links: serde_json::to_value(&wf.links)?,
                  created_on: wf.created_on,
                  updated_on: wf.updated_on })
    }

    pub fn into_model(self) -> Result<Workflow, PersistenceError> {
        let links: BTreeMap<FwId, Vec<FwId>> = serde_json::from_value(self.links)?;
        Ok(Workflow { wf_id: self.wf_id,
                      name: self.name,
                      metadata: self.metadata,
                      fw_ids: self.fw_ids,
                      links,
                      created_on: self.created_on,
                      updated_on: self.updated_on })
    }
}

/// `treat_none_as_null`: limpiar `current_launch` debe escribir NULL.
#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = fireworks, primary_key(fw_id), treat_none_as_null = true)]
pub struct FireworkRow {
    pub fw_id: i64,
    pub wf_id: i64,
    pub name: String,
    pub spec: Value,
    pub priority: i32,
    pub state: String,
    pub defused: bool,
    pub revision: i64,
    pub current_launch: Option<i64>,
    pub launch_ids: Vec<i64>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl From<&Firework> for FireworkRow {
    fn from(fw: &Firework) -> Self {
        Self { fw_id: fw.fw_id,
               wf_id: fw.wf_id,
               name: fw.name.clone(),
               spec: fw.spec.clone(),
               priority: fw.priority,
               state: fw.state.as_str().to_string(),
               defused: fw.defused,
               revision: fw.revision,
               current_launch: fw.current_launch,
               launch_ids: fw.launch_ids.clone(),
               created_on: fw.created_on,
               updated_on: fw.updated_on }
    }
}

impl FireworkRow {
    pub fn into_model(self) -> Result<Firework, PersistenceError> {
        let state: FwState = self.state
                                 .parse()
                                 .map_err(|e| PersistenceError::CorruptRow(format!("fw_id={}: {e}", self.fw_id)))?;
        Ok(Firework { fw_id: self.fw_id,
                      wf_id: self.wf_id,
                      name: self.name,
                      spec: self.spec,
                      priority: self.priority,
                      state,
                      defused: self.defused,
                      revision: self.revision,
                      current_launch: self.current_launch,
                      launch_ids: self.launch_ids,
                      created_on: self.created_on,
                      updated_on: self.updated_on })
    }
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = launches, primary_key(launch_id), treat_none_as_null = true)]
pub struct LaunchRow {
    pub launch_id: i64,
    pub fw_id: i64,
    pub state: String,
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
    pub state_history: Value,
}

impl LaunchRow {
    pub fn from_model(l: &Launch) -> Result<Self, PersistenceError> {
        Ok(Self { launch_id: l.launch_id,
                  fw_id: l.fw_id,
                  state: l.state.as_str().to_string(),
                  reservation_id: l.reservation_id,
                  worker: l.worker.clone(),
                  reserved_on: l.reserved_on,
                  reservation_expires: l.reservation_expires,
                  started_on: l.started_on,
                  last_heartbeat: l.last_heartbeat,
                  finished_on: l.finished_on,
                  result: l.result.clone(),
                  fizzle_reason: l.fizzle_reason.clone(),
                  superseded: l.superseded,
                  state_history: serde_json::to_value(&l.state_history)? })
    }

    pub fn into_model(self) -> Result<Launch, PersistenceError> {
        let state: LaunchState =
            self.state
                .parse()
                .map_err(|e| PersistenceError::CorruptRow(format!("launch_id={}: {e}", self.launch_id)))?;
        let state_history: Vec<LaunchStateEntry> = serde_json::from_value(self.state_history)?;
        Ok(Launch { launch_id: self.launch_id,
                    fw_id: self.fw_id,
                    state,
                    reservation_id: self.reservation_id,
                    worker: self.worker,
                    reserved_on: self.reserved_on,
                    reservation_expires: self.reservation_expires,
                    started_on: self.started_on,
                    last_heartbeat: self.last_heartbeat,
                    finished_on: self.finished_on,
                    result: self.result,
                    fizzle_reason: self.fizzle_reason,
                    superseded: self.superseded,
                    state_history })
    }
}
