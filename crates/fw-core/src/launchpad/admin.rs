//! Operaciones de operador: defuse/reignite y rerun.

use log::{info, warn};

use super::{CasStep, LaunchPad};
use crate::errors::{LaunchPadError, LaunchPadResult};
use crate::model::{FwId, Workflow};
use crate::state::FwState;
use crate::store::{FireworkUpdate, LaunchPadStore, Precondition};

impl<S> LaunchPad<S> where S: LaunchPadStore
{
    /// Marca el job como defused: deja de ofrecerse para reservas. Un job
    /// COMPLETED no se toca. Devuelve si el flag cambió.
    pub fn defuse_fw(&self, fw_id: FwId) -> LaunchPadResult<bool> {
        let changed = self.cas_loop(fw_id, |fw| {
                              if fw.defused || fw.state == FwState::Completed {
                                  return Ok(CasStep::Done(false));
                              }
                              Ok(CasStep::Write(Precondition::state(fw.state).with_defused(false),
                                                FireworkUpdate::default().defused(true).at(self.now()),
                                                true))
                          })?;
        if changed {
            info!("defuse_fw fw_id={fw_id}");
        }
        Ok(changed)
    }

    /// Quita el defuse y recalcula WAITING/READY desde los padres. No crea
    /// launches ni toca la historia.
    pub fn reignite_fw(&self, fw_id: FwId) -> LaunchPadResult<bool> {
        let wf = self.get_wf_by_fw_id(fw_id)?;
        let changed = self.cas_loop(fw_id, |fw| {
                              if !fw.defused {
                                  return Ok(CasStep::Done(false));
                              }
                              let mut update = FireworkUpdate::default().defused(false).at(self.now());
                              if matches!(fw.state, FwState::Waiting | FwState::Ready) {
                                  update.state = Some(self.readiness_of(&wf, fw_id)?);
                              }
                              Ok(CasStep::Write(Precondition::state(fw.state).with_defused(true), update, true))
                          })?;
        if changed {
            info!("reignite_fw fw_id={fw_id}");
        }
        Ok(changed)
    }

    /// Defuse de todos los jobs no completados del workflow de `fw_id`.
    pub fn defuse_wf(&self, fw_id: FwId) -> LaunchPadResult<Vec<FwId>> {
        let wf = self.get_wf_by_fw_id(fw_id)?;
        let mut changed = Vec::new();
        for id in &wf.fw_ids {
            if self.defuse_fw(*id)? {
                changed.push(*id);
            }
        }
        info!("defuse_wf wf_id={} defused={changed:?}", wf.wf_id);
        Ok(changed)
    }

    pub fn reignite_wf(&self, fw_id: FwId) -> LaunchPadResult<Vec<FwId>> {
        let wf = self.get_wf_by_fw_id(fw_id)?;
        let mut changed = Vec::new();
        for id in wf.topological_order() {
            if self.reignite_fw(id)? {
                changed.push(id);
            }
        }
        info!("reignite_wf wf_id={} reignited={changed:?}", wf.wf_id);
        Ok(changed)
    }

    /// Vuelve a poner en cola un job COMPLETED o FIZZLED.
    ///
    /// Sus launches quedan superseded (nunca se borran) y el job vuelve a
    /// WAITING/READY según sus padres. Los descendientes READY vuelven a
    /// WAITING y los COMPLETED/FIZZLED se re-ejecutan igual; los que están en
    /// vuelo se dejan como están. Devuelve los jobs cuyo estado cambió.
    pub fn rerun_fw(&self, fw_id: FwId) -> LaunchPadResult<Vec<FwId>> {
        let fw = self.get_fw_by_id(fw_id)?;
        if !fw.state.is_terminal() {
            return Err(LaunchPadError::InvalidTransition { fw_id,
                                                           from: fw.state,
                                                           to: FwState::Waiting });
        }
        let wf = self.get_wf_by_fw_id(fw_id)?;
        let mut changed = Vec::new();
        if self.requeue(&wf, fw_id)? {
            changed.push(fw_id);
        }
        for id in wf.descendants_of(fw_id) {
            let state = self.get_fw_by_id(id)?.state;
            let moved = match state {
                FwState::Ready => self.unready(id)?,
                FwState::Completed | FwState::Fizzled => self.requeue(&wf, id)?,
                FwState::Reserved | FwState::Running => {
                    warn!("rerun_fw: descendant fw_id={id} of fw_id={fw_id} is {state}, left alone");
                    false
                }
                FwState::Waiting => false,
            };
            if moved {
                changed.push(id);
            }
        }
        info!("rerun_fw fw_id={fw_id} changed={changed:?}");
        Ok(changed)
    }

    /// COMPLETED|FIZZLED -> WAITING/READY, con su historia superseded.
    fn requeue(&self, wf: &Workflow, fw_id: FwId) -> LaunchPadResult<bool> {
        self.cas_loop(fw_id, |fw| {
                if !fw.state.is_terminal() {
                    return Ok(CasStep::Done(false));
                }
                let target = self.readiness_of(wf, fw_id)?;
                let update = FireworkUpdate::to_state(target).clear_current_launch()
                                                             .supersede(fw.launch_ids.iter().copied())
                                                             .at(self.now());
                Ok(CasStep::Write(Precondition::state(fw.state), update, true))
            })
    }

    /// READY -> WAITING porque un ancestro dejó de estar completo.
    fn unready(&self, fw_id: FwId) -> LaunchPadResult<bool> {
        self.cas_loop(fw_id, |fw| {
                if fw.state != FwState::Ready {
                    return Ok(CasStep::Done(false));
                }
                Ok(CasStep::Write(Precondition::state(FwState::Ready),
                                  FireworkUpdate::to_state(FwState::Waiting).at(self.now()),
                                  true))
            })
    }
}
