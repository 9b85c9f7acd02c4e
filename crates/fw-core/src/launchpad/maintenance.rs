//! Mantenimiento: recuperación de reservas y ejecuciones abandonadas,
//! reparación de readiness, bucle `maintain` y `tuneup`.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::LaunchPad;
use crate::config::secs_to_duration;
use crate::constants::FIZZLE_REASON_NO_HEARTBEAT;
use crate::errors::LaunchPadResult;
use crate::model::{FwId, LaunchId, WfId, Workflow};
use crate::state::{readiness, FwState, LaunchState};
use crate::store::{FireworkUpdate, LaunchChange, LaunchPadStore, Precondition};

/// Señal de cancelación compartida entre el bucle `maintain` y quien lo
/// controla. Clonar comparte la misma señal.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl MaintenanceSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Duerme hasta `timeout` o hasta la cancelación; devuelve si se canceló.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut cancelled = flag.lock().unwrap_or_else(|e| e.into_inner());
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = match cvar.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *cancelled
    }
}

/// Acumulado de las pasadas de `maintain`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub iterations: u64,
    pub unreserved: Vec<LaunchId>,
    pub fizzled: Vec<LaunchId>,
    pub readied: Vec<FwId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuneupReport {
    /// Jobs WAITING/READY cuyo estado no correspondía a sus padres.
    pub readiness_fixed: Vec<FwId>,
    /// Jobs RESERVED/RUNNING sin un launch vigente coherente.
    pub launches_reconciled: Vec<FwId>,
}

impl<S> LaunchPad<S> where S: LaunchPadStore
{
    /// Launches RESERVED (no superseded) reservados hace más de
    /// `expiration_secs`. Con `fix`, el job vuelve a WAITING/READY y el launch
    /// queda superseded; sólo se devuelven los reparados. Sin `fix` no se
    /// modifica nada.
    pub fn detect_unreserved(&self, expiration_secs: u64, fix: bool) -> LaunchPadResult<Vec<LaunchId>> {
        let cutoff = self.now() - secs_to_duration(expiration_secs);
        let mut stale: Vec<(LaunchId, FwId)> = self.store
                                                   .launches_in_state(LaunchState::Reserved)?
                                                   .into_iter()
                                                   .filter(|l| !l.superseded && l.reserved_on < cutoff)
                                                   .map(|l| (l.launch_id, l.fw_id))
                                                   .collect();
        stale.sort_unstable();
        if !fix {
            debug!("detect_unreserved:dry-run found={}", stale.len());
            return Ok(stale.into_iter().map(|(id, _)| id).collect());
        }
        let mut fixed = Vec::new();
        for (launch_id, fw_id) in stale {
            let wf = self.get_wf_by_fw_id(fw_id)?;
            let target = self.readiness_of(&wf, fw_id)?;
            let update = FireworkUpdate::to_state(target).clear_current_launch()
                                                         .supersede([launch_id])
                                                         .at(self.now());
            let precondition = Precondition::state(FwState::Reserved).with_launch(launch_id);
            if self.store.update_if(fw_id, precondition, &update)? {
                info!("detect_unreserved:fixed fw_id={fw_id} launch_id={launch_id} -> {target}");
                fixed.push(launch_id);
            } else {
                debug!("detect_unreserved:skip launch_id={launch_id} (changed concurrently)");
            }
        }
        Ok(fixed)
    }

    /// Launches RUNNING (no superseded) sin señales de vida desde hace más de
    /// `expiration_secs`. Con `fix` pasan a FIZZLED con motivo "no heartbeat".
    pub fn detect_fizzled(&self, expiration_secs: u64, fix: bool) -> LaunchPadResult<Vec<LaunchId>> {
        let cutoff = self.now() - secs_to_duration(expiration_secs);
        let mut stale: Vec<(LaunchId, FwId)> = self.store
                                                   .launches_in_state(LaunchState::Running)?
                                                   .into_iter()
                                                   .filter(|l| !l.superseded && l.last_seen() < cutoff)
                                                   .map(|l| (l.launch_id, l.fw_id))
                                                   .collect();
        stale.sort_unstable();
        if !fix {
            debug!("detect_fizzled:dry-run found={}", stale.len());
            return Ok(stale.into_iter().map(|(id, _)| id).collect());
        }
        let mut fixed = Vec::new();
        for (launch_id, fw_id) in stale {
            // Relectura: un heartbeat posterior al escaneo deja el launch vivo.
            let Some(fw) = self.store.firework(fw_id)? else {
                continue;
            };
            let still_stale = match self.store.launch(launch_id)? {
                Some(l) => !l.superseded && l.state == LaunchState::Running && l.last_seen() < cutoff,
                None => false,
            };
            if !still_stale {
                debug!("detect_fizzled:skip launch_id={launch_id} (alive again)");
                continue;
            }
            let now = self.now();
            let change = LaunchChange::Transition { launch_id,
                                                    state: LaunchState::Fizzled,
                                                    at: now,
                                                    result: None,
                                                    reason: Some(FIZZLE_REASON_NO_HEARTBEAT.to_owned()) };
            let update = FireworkUpdate::to_state(FwState::Fizzled).with_launch(change).at(now);
            let precondition = Precondition::state(FwState::Running).with_launch(launch_id)
                                                                    .with_revision(fw.revision);
            if self.store.update_if(fw_id, precondition, &update)? {
                warn!("detect_fizzled:fixed fw_id={fw_id} launch_id={launch_id}");
                fixed.push(launch_id);
            } else {
                debug!("detect_fizzled:skip launch_id={launch_id} (changed concurrently)");
            }
        }
        Ok(fixed)
    }

    /// Pasa a READY todo job WAITING cuyos padres completaron. Cubre a un
    /// worker que murió entre su `complete` y la activación de los hijos.
    pub fn refresh_readiness(&self) -> LaunchPadResult<Vec<FwId>> {
        let mut workflows: HashMap<WfId, Workflow> = HashMap::new();
        let mut readied = Vec::new();
        for fw in self.store.fireworks_in_state(FwState::Waiting)? {
            if !workflows.contains_key(&fw.wf_id) {
                let wf = self.get_wf_by_fw_id(fw.fw_id)?;
                workflows.insert(fw.wf_id, wf);
            }
            if let Some(wf) = workflows.get(&fw.wf_id) {
                if self.ready_if_eligible(wf, fw.fw_id)? {
                    readied.push(fw.fw_id);
                }
            }
        }
        if !readied.is_empty() {
            info!("refresh_readiness:readied {readied:?}");
        }
        Ok(readied)
    }

    fn maintain_pass(&self, report: &mut MaintenanceReport) -> LaunchPadResult<()> {
        report.unreserved
              .extend(self.detect_unreserved(self.config.reservation_expiration_secs, true)?);
        report.fizzled.extend(self.detect_fizzled(self.config.run_expiration_secs, true)?);
        report.readied.extend(self.refresh_readiness()?);
        Ok(())
    }

    /// Ejecuta una pasada de mantenimiento (`infinite = false`) o repite cada
    /// `interval` hasta que `signal` se cancele. En modo infinito los errores
    /// se registran y el bucle sigue.
    pub fn maintain(&self,
                    infinite: bool,
                    interval: Duration,
                    signal: &MaintenanceSignal)
                    -> LaunchPadResult<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        while !signal.is_cancelled() {
            match self.maintain_pass(&mut report) {
                Ok(()) => {}
                Err(e) if infinite => error!("maintain:pass failed: {e}"),
                Err(e) => return Err(e),
            }
            report.iterations += 1;
            if !infinite || signal.wait(interval) {
                break;
            }
        }
        info!("maintain:done iterations={} unreserved={} fizzled={} readied={}",
              report.iterations,
              report.unreserved.len(),
              report.fizzled.len(),
              report.readied.len());
        Ok(report)
    }

    /// Revisión completa del store: recalcula WAITING/READY desde el DAG,
    /// reconcilia jobs en vuelo con su launch vigente y delega el
    /// mantenimiento propio del backend. Las reparaciones no pasan por la
    /// tabla de transiciones.
    pub fn tuneup(&self) -> LaunchPadResult<TuneupReport> {
        let snapshot = self.store.snapshot()?;
        let states: HashMap<FwId, FwState> = snapshot.fireworks.iter().map(|fw| (fw.fw_id, fw.state)).collect();
        let workflows: HashMap<WfId, &Workflow> = snapshot.workflows.iter().map(|wf| (wf.wf_id, wf)).collect();
        let mut report = TuneupReport::default();

        for fw in &snapshot.fireworks {
            let Some(wf) = workflows.get(&fw.wf_id) else {
                warn!("tuneup: fw_id={} references missing wf_id={}", fw.fw_id, fw.wf_id);
                continue;
            };
            let target = readiness(wf.parents_of(fw.fw_id).iter().filter_map(|p| states.get(p).copied()));
            match fw.state {
                FwState::Waiting | FwState::Ready if fw.state != target => {
                    let update = FireworkUpdate::to_state(target).at(self.now());
                    if self.store.update_if(fw.fw_id, Precondition::state(fw.state), &update)? {
                        report.readiness_fixed.push(fw.fw_id);
                    }
                }
                FwState::Reserved | FwState::Running => {
                    let launch = match fw.current_launch {
                        Some(id) => self.store.launch(id)?,
                        None => None,
                    };
                    let consistent =
                        launch.as_ref().map_or(false, |l| !l.superseded && l.state.fw_state() == fw.state);
                    if consistent {
                        continue;
                    }
                    let mut precondition = Precondition::state(fw.state);
                    let mut update = FireworkUpdate::to_state(target).clear_current_launch().at(self.now());
                    if let Some(l) = &launch {
                        precondition = precondition.with_launch(l.launch_id);
                        update = update.supersede([l.launch_id]);
                    }
                    if self.store.update_if(fw.fw_id, precondition, &update)? {
                        warn!("tuneup: reconciled fw_id={} {} -> {target}", fw.fw_id, fw.state);
                        report.launches_reconciled.push(fw.fw_id);
                    }
                }
                _ => {}
            }
        }
        self.store.tuneup()?;
        info!("tuneup:done readiness_fixed={:?} launches_reconciled={:?}",
              report.readiness_fixed,
              report.launches_reconciled);
        Ok(report)
    }
}
