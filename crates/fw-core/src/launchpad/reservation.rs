//! Reservas y reportes de workers: reserve -> start -> heartbeat* ->
//! complete | fail.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{CasStep, LaunchPad};
use crate::errors::{LaunchPadError, LaunchPadResult};
use crate::model::{Firework, FwId, Launch, LaunchId};
use crate::query::FireworkPredicate;
use crate::state::{FwState, LaunchState};
use crate::store::{FireworkUpdate, IdKind, LaunchChange, LaunchPadStore, Precondition};

/// Lo que recibe un worker al reservar un job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub fw_id: FwId,
    pub launch_id: LaunchId,
    pub reservation_id: Uuid,
    pub expires: DateTime<Utc>,
}

impl<S> LaunchPad<S> where S: LaunchPadStore
{
    /// Reserva el job READY (sin defuse) de mayor prioridad que cumpla
    /// `filter`; empata por `fw_id` ascendente. `Ok(None)` si no hay ninguno.
    pub fn reserve_next(&self,
                        filter: Option<&dyn FireworkPredicate>,
                        worker: Option<&str>)
                        -> LaunchPadResult<Option<Reservation>> {
        let mut candidates: Vec<Firework> =
            self.store
                .fireworks_in_state(FwState::Ready)?
                .into_iter()
                .filter(|fw| fw.is_reservable() && filter.map_or(true, |p| p.matches(fw)))
                .collect();
        candidates.sort_by_key(|fw| (Reverse(fw.priority), fw.fw_id));

        // Un id por llamada: si se pierde una carrera se reutiliza con el
        // siguiente candidato.
        let mut launch_id = None;
        for fw in candidates {
            let id = match launch_id {
                Some(id) => id,
                None => *launch_id.insert(self.store.next_id(IdKind::Launch)?),
            };
            let now = self.now();
            let launch = Launch::reserve(id,
                                         fw.fw_id,
                                         worker.map(str::to_owned),
                                         now,
                                         now + self.config.reservation_expiration());
            let reservation = Reservation { fw_id: fw.fw_id,
                                            launch_id: id,
                                            reservation_id: launch.reservation_id,
                                            expires: launch.reservation_expires };
            let update = FireworkUpdate::to_state(FwState::Reserved).with_launch(LaunchChange::Insert(launch))
                                                                    .at(now);
            if self.store.update_if(fw.fw_id, Precondition::armed(FwState::Ready), &update)? {
                info!("reserve:done fw_id={} launch_id={id} worker={worker:?}", fw.fw_id);
                return Ok(Some(reservation));
            }
            debug!("reserve:lost fw_id={} launch_id={id}", fw.fw_id);
        }
        Ok(None)
    }

    /// RESERVED -> RUNNING.
    pub fn start(&self, launch_id: LaunchId) -> LaunchPadResult<()> {
        let fw_id = self.owner_of(launch_id)?;
        self.cas_loop(fw_id, |fw| {
                expect_current(fw, launch_id, &[FwState::Reserved], FwState::Running)?;
                let now = self.now();
                Ok(CasStep::Write(Precondition::state(FwState::Reserved).with_launch(launch_id),
                                  FireworkUpdate::to_state(FwState::Running)
                                      .with_launch(LaunchChange::transition(launch_id, LaunchState::Running, now))
                                      .at(now),
                                  ()))
            })?;
        info!("start:done fw_id={fw_id} launch_id={launch_id}");
        Ok(())
    }

    /// Refresca `last_heartbeat`. Sólo vale para el launch RUNNING vigente:
    /// un launch ya marcado FIZZLED por mantenimiento recibe `InvalidTransition`.
    pub fn heartbeat(&self, launch_id: LaunchId) -> LaunchPadResult<()> {
        let fw_id = self.owner_of(launch_id)?;
        self.cas_loop(fw_id, |fw| {
                expect_current(fw, launch_id, &[FwState::Running], FwState::Running)?;
                let now = self.now();
                Ok(CasStep::Write(Precondition::state(FwState::Running).with_launch(launch_id),
                                  FireworkUpdate::default().with_launch(LaunchChange::Heartbeat { launch_id, at: now })
                                                           .at(now),
                                  ()))
            })?;
        debug!("heartbeat fw_id={fw_id} launch_id={launch_id}");
        Ok(())
    }

    /// RUNNING -> COMPLETED con `result`; devuelve los hijos que quedaron READY.
    pub fn complete(&self, launch_id: LaunchId, result: Value) -> LaunchPadResult<Vec<FwId>> {
        let fw_id = self.owner_of(launch_id)?;
        self.cas_loop(fw_id, |fw| {
                expect_current(fw, launch_id, &[FwState::Running], FwState::Completed)?;
                let now = self.now();
                let change = LaunchChange::Transition { launch_id,
                                                        state: LaunchState::Completed,
                                                        at: now,
                                                        result: Some(result.clone()),
                                                        reason: None };
                Ok(CasStep::Write(Precondition::state(FwState::Running).with_launch(launch_id),
                                  FireworkUpdate::to_state(FwState::Completed).with_launch(change).at(now),
                                  ()))
            })?;
        let wf = self.get_wf_by_fw_id(fw_id)?;
        let readied = self.ready_children(&wf, fw_id)?;
        info!("complete:done fw_id={fw_id} launch_id={launch_id} readied={readied:?}");
        Ok(readied)
    }

    /// RESERVED|RUNNING -> FIZZLED reportado por el worker.
    pub fn fail(&self, launch_id: LaunchId, reason: &str) -> LaunchPadResult<()> {
        let fw_id = self.owner_of(launch_id)?;
        self.cas_loop(fw_id, |fw| {
                expect_current(fw, launch_id, &[FwState::Reserved, FwState::Running], FwState::Fizzled)?;
                let now = self.now();
                let change = LaunchChange::Transition { launch_id,
                                                        state: LaunchState::Fizzled,
                                                        at: now,
                                                        result: None,
                                                        reason: Some(reason.to_owned()) };
                Ok(CasStep::Write(Precondition::state(fw.state).with_launch(launch_id),
                                  FireworkUpdate::to_state(FwState::Fizzled).with_launch(change).at(now),
                                  ()))
            })?;
        info!("fail:done fw_id={fw_id} launch_id={launch_id} reason={reason}");
        Ok(())
    }

    fn owner_of(&self, launch_id: LaunchId) -> LaunchPadResult<FwId> {
        Ok(self.get_launch(launch_id)?.fw_id)
    }
}

/// El launch debe ser el vigente del job y el job estar en uno de `allowed`.
fn expect_current(fw: &Firework, launch_id: LaunchId, allowed: &[FwState], to: FwState) -> LaunchPadResult<()> {
    if fw.current_launch == Some(launch_id) && allowed.contains(&fw.state) {
        Ok(())
    } else {
        Err(LaunchPadError::InvalidTransition { fw_id: fw.fw_id,
                                                from: fw.state,
                                                to })
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{FireworkSpec, WorkflowSpec};
    use crate::query::FwQuery;
    use crate::{FwState, LaunchPad, LaunchPadError, LaunchState};
    use serde_json::json;

    #[test]
    fn reserve_prefers_priority_then_lowest_id() {
        let lp = LaunchPad::in_memory();
        let added = lp.add_wf(&WorkflowSpec::new("flat").firework(FireworkSpec::new(1, "low"))
                                                        .firework(FireworkSpec::new(2, "high").with_priority(5))
                                                        .firework(FireworkSpec::new(3, "high-too").with_priority(5)))
                      .unwrap();
        let first = lp.reserve_next(None, Some("node-1")).unwrap().unwrap();
        assert_eq!(first.fw_id, added.id_map[&2]);
        let second = lp.reserve_next(None, None).unwrap().unwrap();
        assert_eq!(second.fw_id, added.id_map[&3]);
        let third = lp.reserve_next(None, None).unwrap().unwrap();
        assert_eq!(third.fw_id, added.id_map[&1]);
        assert!(lp.reserve_next(None, None).unwrap().is_none());
    }

    #[test]
    fn reserve_honors_filter() {
        let lp = LaunchPad::in_memory();
        lp.add_wf(&WorkflowSpec::new("two").firework(FireworkSpec::new(1, "gpu").with_spec(json!({"queue": "gpu"})))
                                           .firework(FireworkSpec::new(2, "cpu").with_spec(json!({"queue": "cpu"}))))
          .unwrap();
        let only_cpu = FwQuery::new().spec_eq("/queue", json!("cpu"));
        let r = lp.reserve_next(Some(&only_cpu), None).unwrap().unwrap();
        assert_eq!(lp.get_fw_by_id(r.fw_id).unwrap().name, "cpu");
        assert!(lp.reserve_next(Some(&only_cpu), None).unwrap().is_none());
    }

    #[test]
    fn full_lifecycle_records_history() {
        let lp = LaunchPad::in_memory();
        let added = lp.add_wf(&WorkflowSpec::single(FireworkSpec::new(1, "solo"))).unwrap();
        let r = lp.reserve_next(None, Some("w")).unwrap().unwrap();
        lp.start(r.launch_id).unwrap();
        lp.heartbeat(r.launch_id).unwrap();
        assert!(lp.complete(r.launch_id, json!({"energy": -1.5})).unwrap().is_empty());

        let fw = lp.get_fw_by_id(added.id_map[&1]).unwrap();
        assert_eq!(fw.state, FwState::Completed);
        assert_eq!(fw.current_launch, Some(r.launch_id));
        let launch = lp.get_launch(r.launch_id).unwrap();
        assert_eq!(launch.state, LaunchState::Completed);
        assert_eq!(launch.worker.as_deref(), Some("w"));
        assert_eq!(launch.result, Some(json!({"energy": -1.5})));
        assert_eq!(launch.state_history.len(), 3);
    }

    #[test]
    fn out_of_order_reports_are_rejected() {
        let lp = LaunchPad::in_memory();
        lp.add_wf(&WorkflowSpec::single(FireworkSpec::new(1, "solo"))).unwrap();
        let r = lp.reserve_next(None, None).unwrap().unwrap();
        let err = lp.complete(r.launch_id, json!(null)).unwrap_err();
        assert!(matches!(err,
                         LaunchPadError::InvalidTransition { from: FwState::Reserved,
                                                             to: FwState::Completed,
                                                             .. }));
        assert!(matches!(lp.heartbeat(r.launch_id), Err(LaunchPadError::InvalidTransition { .. })));
        lp.fail(r.launch_id, "bad input").unwrap();
        assert_eq!(lp.get_launch(r.launch_id).unwrap().fizzle_reason.as_deref(), Some("bad input"));
        assert!(lp.start(r.launch_id).is_err());
    }
}
