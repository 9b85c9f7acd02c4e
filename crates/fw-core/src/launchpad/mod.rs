//! Fachada `LaunchPad`: compone store, asignador de ids, máquina de estados,
//! reservas, mantenimiento y consultas.
//!
//! Toda mutación de un job pasa por `LaunchPadStore::update_if`; la fachada
//! lee, decide la transición y reintenta si pierde la carrera (`cas_loop`).

mod admin;
mod maintenance;
mod reservation;

pub use maintenance::{MaintenanceReport, MaintenanceSignal, TuneupReport};
pub use reservation::Reservation;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::config::LaunchPadConfig;
use crate::constants::{MAX_CAS_ATTEMPTS, RESET_DATE_FORMAT};
use crate::errors::{LaunchPadError, LaunchPadResult, RecordKind};
use crate::model::{Firework, FwId, Launch, LaunchId, WfId, Workflow, WorkflowSpec};
use crate::query::{self, FireworkPredicate, WorkflowPredicate};
use crate::state::{readiness, FwState, WorkflowState};
use crate::store::{FireworkUpdate, IdKind, InMemoryStore, LaunchPadStore, Precondition};

/// Resultado de insertar un workflow: su id y el id asignado a cada clave
/// local de `FireworkSpec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedWorkflow {
    pub wf_id: WfId,
    pub id_map: BTreeMap<i64, FwId>,
}

/// Paso de un `cas_loop`: escribir (si la precondición sigue valiendo) o
/// terminar sin escribir.
pub(crate) enum CasStep<T> {
    Write(Precondition, FireworkUpdate, T),
    Done(T),
}

pub struct LaunchPad<S>
    where S: LaunchPadStore
{
    store: S,
    config: LaunchPadConfig,
    clock: Arc<dyn Clock>,
}

impl LaunchPad<InMemoryStore> {
    /// LaunchPad efímera con configuración por defecto.
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new(), LaunchPadConfig::default())
    }
}

impl<S> LaunchPad<S> where S: LaunchPadStore
{
    pub fn new(store: S, config: LaunchPadConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Igual que `new` pero con un reloj inyectado (tests, simulaciones).
    pub fn with_clock(store: S, config: LaunchPadConfig, clock: Arc<dyn Clock>) -> Self {
        Self { store, config, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LaunchPadConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Borra todo el contenido del store. `token` debe ser la fecha de hoy
    /// (UTC, `YYYY-MM-DD`).
    pub fn reset(&self, token: &str) -> LaunchPadResult<()> {
        let today = self.now().format(RESET_DATE_FORMAT).to_string();
        if token != today {
            return Err(LaunchPadError::ConfirmationMismatch);
        }
        self.store.reset()?;
        info!("reset:done date={today}");
        Ok(())
    }

    /// Valida e inserta un workflow con todos sus jobs en una sola operación.
    /// Las raíces quedan READY y el resto WAITING.
    pub fn add_wf(&self, spec: &WorkflowSpec) -> LaunchPadResult<AddedWorkflow> {
        spec.validate()?;
        self.insert_validated(spec)
    }

    /// Valida todas las definiciones antes de insertar ninguna; cada workflow
    /// se inserta atómicamente por separado.
    pub fn add_wfs(&self, specs: &[WorkflowSpec]) -> LaunchPadResult<Vec<AddedWorkflow>> {
        for spec in specs {
            spec.validate()?;
        }
        specs.iter().map(|spec| self.insert_validated(spec)).collect()
    }

    fn insert_validated(&self, spec: &WorkflowSpec) -> LaunchPadResult<AddedWorkflow> {
        let now = self.now();
        let wf_id = self.store.next_id(IdKind::Workflow)?;
        let mut id_map = BTreeMap::new();
        for fw in &spec.fireworks {
            id_map.insert(fw.key, self.store.next_id(IdKind::Firework)?);
        }
        let children = spec.children_by_key();
        let links: BTreeMap<FwId, Vec<FwId>> =
            children.iter()
                    .map(|(parent, kids)| (id_map[parent], kids.iter().map(|k| id_map[k]).collect()))
                    .collect();
        let has_parent: Vec<i64> = children.values().flatten().copied().collect();

        let workflow = Workflow { wf_id,
                                  name: spec.name.clone(),
                                  metadata: spec.metadata.clone(),
                                  fw_ids: spec.fireworks.iter().map(|fw| id_map[&fw.key]).collect(),
                                  links,
                                  created_on: now,
                                  updated_on: now };
        let fireworks: Vec<Firework> =
            spec.fireworks
                .iter()
                .map(|fw| Firework { fw_id: id_map[&fw.key],
                                     wf_id,
                                     name: fw.name.clone(),
                                     spec: fw.spec.clone(),
                                     priority: fw.priority,
                                     state: if has_parent.contains(&fw.key) { FwState::Waiting } else { FwState::Ready },
                                     defused: false,
                                     revision: 0,
                                     current_launch: None,
                                     launch_ids: Vec::new(),
                                     created_on: now,
                                     updated_on: now })
                .collect();
        self.store.insert_workflow(&workflow, &fireworks)?;
        info!("add_wf:done wf_id={wf_id} name={} fireworks={}", spec.name, fireworks.len());
        Ok(AddedWorkflow { wf_id, id_map })
    }

    pub fn get_fw_by_id(&self, fw_id: FwId) -> LaunchPadResult<Firework> {
        self.store.firework(fw_id)?.ok_or_else(|| LaunchPadError::not_found(RecordKind::Firework, fw_id))
    }

    pub fn get_wf_by_fw_id(&self, fw_id: FwId) -> LaunchPadResult<Workflow> {
        let fw = self.get_fw_by_id(fw_id)?;
        self.store
            .workflow(fw.wf_id)?
            .ok_or_else(|| LaunchPadError::not_found(RecordKind::Workflow, fw.wf_id))
    }

    /// Estado agregado del workflow al que pertenece `fw_id`.
    pub fn get_wf_state(&self, fw_id: FwId) -> LaunchPadResult<WorkflowState> {
        let wf = self.get_wf_by_fw_id(fw_id)?;
        let jobs = self.fireworks_of(&wf)?;
        Ok(WorkflowState::aggregate(&jobs))
    }

    pub fn get_launch(&self, launch_id: LaunchId) -> LaunchPadResult<Launch> {
        self.store.launch(launch_id)?.ok_or_else(|| LaunchPadError::not_found(RecordKind::Launch, launch_id))
    }

    /// Historia de launches de un job (incluye los superseded).
    pub fn launches_of(&self, fw_id: FwId) -> LaunchPadResult<Vec<Launch>> {
        self.get_fw_by_id(fw_id)?;
        self.store.launches_of(fw_id)
    }

    pub fn get_fw_ids(&self, pred: Option<&dyn FireworkPredicate>) -> LaunchPadResult<Vec<FwId>> {
        Ok(query::select_fw_ids(&self.store.snapshot()?, pred))
    }

    pub fn get_wf_ids(&self, pred: Option<&dyn WorkflowPredicate>) -> LaunchPadResult<Vec<WfId>> {
        Ok(query::select_wf_ids(&self.store.snapshot()?, pred))
    }

    /// Jobs de los workflows que cumplen `pred`.
    pub fn get_fw_ids_in_workflows(&self, pred: Option<&dyn WorkflowPredicate>) -> LaunchPadResult<Vec<FwId>> {
        Ok(query::select_fw_ids_in_workflows(&self.store.snapshot()?, pred))
    }

    fn fireworks_of(&self, wf: &Workflow) -> LaunchPadResult<Vec<Firework>> {
        wf.fw_ids.iter().map(|id| self.get_fw_by_id(*id)).collect()
    }

    /// Estado WAITING/READY que corresponde a `fw_id` según sus padres.
    pub(crate) fn readiness_of(&self, wf: &Workflow, fw_id: FwId) -> LaunchPadResult<FwState> {
        let parents = wf.parents_of(fw_id)
                        .into_iter()
                        .map(|id| self.get_fw_by_id(id).map(|fw| fw.state))
                        .collect::<LaunchPadResult<Vec<_>>>()?;
        Ok(readiness(parents))
    }

    /// Pasa a READY el job si está WAITING y todos sus padres completaron.
    pub(crate) fn ready_if_eligible(&self, wf: &Workflow, fw_id: FwId) -> LaunchPadResult<bool> {
        self.cas_loop(fw_id, |fw| {
                if fw.state != FwState::Waiting || self.readiness_of(wf, fw_id)? != FwState::Ready {
                    return Ok(CasStep::Done(false));
                }
                Ok(CasStep::Write(Precondition::state(FwState::Waiting),
                                  FireworkUpdate::to_state(FwState::Ready).at(self.now()),
                                  true))
            })
    }

    /// Hijos de `fw_id` que pasan a READY tras su finalización.
    pub(crate) fn ready_children(&self, wf: &Workflow, fw_id: FwId) -> LaunchPadResult<Vec<FwId>> {
        let mut readied = Vec::new();
        for child in wf.children_of(fw_id) {
            if self.ready_if_eligible(wf, *child)? {
                readied.push(*child);
            }
        }
        Ok(readied)
    }

    /// Lee el job, deja que `step` decida y aplica la escritura con CAS,
    /// releyendo mientras se pierdan carreras.
    pub(crate) fn cas_loop<T, F>(&self, fw_id: FwId, mut step: F) -> LaunchPadResult<T>
        where F: FnMut(&Firework) -> LaunchPadResult<CasStep<T>>
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let fw = self.get_fw_by_id(fw_id)?;
            match step(&fw)? {
                CasStep::Done(value) => return Ok(value),
                CasStep::Write(precondition, update, value) => {
                    if let Some(to) = update.state {
                        if to != fw.state && !fw.state.can_transition_to(to) {
                            return Err(LaunchPadError::InvalidTransition { fw_id, from: fw.state, to });
                        }
                    }
                    if self.store.update_if(fw_id, precondition, &update)? {
                        return Ok(value);
                    }
                    debug!("cas:lost fw_id={fw_id} attempt={attempt}");
                }
            }
        }
        Err(LaunchPadError::ContentionExceeded { fw_id,
                                                 attempts: MAX_CAS_ATTEMPTS })
    }
}
