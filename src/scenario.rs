//! Escenario de referencia: un workflow J1 -> J2 donde el worker de J2 muere
//! tras reservar, y el mantenimiento recupera la reserva.

use chrono::Duration;
use fw_core::{FireworkSpec, FwId, LaunchId, LaunchPad, LaunchPadStore, ManualClock, WorkflowSpec, WorkflowState};
use log::info;
use serde::Serialize;
use serde_json::json;

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub fw_ids: Vec<FwId>,
    /// Reservas recuperadas por `detect_unreserved`.
    pub recovered: Vec<LaunchId>,
    pub final_state: WorkflowState,
}

/// Ejecuta el escenario sobre `lp`, cuyo reloj debe ser `clock`.
pub fn reference_scenario<S>(lp: &LaunchPad<S>, clock: &ManualClock) -> Result<ScenarioReport, AppError>
    where S: LaunchPadStore
{
    let spec = WorkflowSpec::new("j1-j2").with_metadata(json!({"demo": true}))
                                         .firework(FireworkSpec::new(1, "J1").with_spec(json!({"task": "prepare"})))
                                         .firework(FireworkSpec::new(2, "J2").with_spec(json!({"task": "analyze"})))
                                         .link(1, 2);
    let added = lp.add_wf(&spec)?;
    let (j1, j2) = (added.id_map[&1], added.id_map[&2]);

    let first = next_reservation(lp, "worker-a")?;
    lp.start(first.launch_id)?;
    let readied = lp.complete(first.launch_id, json!({"prepared": true}))?;
    if readied != vec![j2] {
        return Err(AppError::Scenario(format!("expected J2 to be readied, got {readied:?}")));
    }

    let doomed = next_reservation(lp, "worker-b")?;
    info!("worker-b reserved fw_id={} and crashed", doomed.fw_id);
    clock.advance(lp.config().reservation_expiration() + Duration::seconds(1));
    let recovered = lp.detect_unreserved(lp.config().reservation_expiration_secs, true)?;

    let retry = next_reservation(lp, "worker-c")?;
    lp.start(retry.launch_id)?;
    lp.heartbeat(retry.launch_id)?;
    lp.complete(retry.launch_id, json!({"analyzed": true}))?;

    let final_state = lp.get_wf_state(j1)?;
    info!("scenario done: wf_id={} state={final_state} recovered={recovered:?}", added.wf_id);
    Ok(ScenarioReport { fw_ids: vec![j1, j2],
                        recovered,
                        final_state })
}

fn next_reservation<S>(lp: &LaunchPad<S>, worker: &str) -> Result<fw_core::Reservation, AppError>
    where S: LaunchPadStore
{
    lp.reserve_next(None, Some(worker))?
      .ok_or_else(|| AppError::Scenario(format!("{worker}: no READY job to reserve")))
}
