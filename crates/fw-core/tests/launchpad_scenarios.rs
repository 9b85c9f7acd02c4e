use std::sync::Arc;
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, TimeZone, Utc};
use fw_core::{AddedWorkflow, Clock, Firework, FireworkSpec, FireworkUpdate, FwId, FwQuery, FwState, InMemoryStore, LaunchPad,
              LaunchPadConfig, LaunchPadError, LaunchPadStore, LaunchState, MaintenanceSignal, ManualClock,
              Precondition, WfQuery, WorkflowSpec, WorkflowState};
use serde_json::json;

fn pad() -> (LaunchPad<InMemoryStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()));
    let config = LaunchPadConfig { reservation_expiration_secs: 3600,
                                   run_expiration_secs: 600,
                                   maintain_interval_secs: 1 };
    (LaunchPad::with_clock(InMemoryStore::new(), config, clock.clone()), clock)
}

fn chain(n: i64) -> WorkflowSpec {
    let mut spec = WorkflowSpec::new("chain");
    for key in 1..=n {
        spec = spec.firework(FireworkSpec::new(key, format!("J{key}")));
        if key > 1 {
            spec = spec.link(key - 1, key);
        }
    }
    spec
}

/// Reserva, arranca y completa el job `fw_id`; devuelve los hijos activados.
fn run(lp: &LaunchPad<InMemoryStore>, fw_id: FwId) -> Vec<FwId> {
    let only = move |fw: &Firework| fw.fw_id == fw_id;
    let r = lp.reserve_next(Some(&only), Some("runner")).unwrap().expect("job should be reservable");
    lp.start(r.launch_id).unwrap();
    lp.complete(r.launch_id, json!({"ok": true})).unwrap()
}

fn ids(added: &AddedWorkflow, keys: &[i64]) -> Vec<FwId> {
    keys.iter().map(|k| added.id_map[k]).collect()
}

#[test]
fn crashed_reservation_is_recovered_and_rerun() {
    let (lp, clock) = pad();
    let added = lp.add_wf(&chain(2)).unwrap();
    let (j1, j2) = (added.id_map[&1], added.id_map[&2]);

    assert_eq!(run(&lp, j1), vec![j2]);
    let stale = lp.reserve_next(None, Some("doomed")).unwrap().unwrap();
    assert_eq!(stale.fw_id, j2);

    // El worker muere sin llamar a start.
    clock.advance(Duration::hours(2));
    assert_eq!(lp.detect_unreserved(3600, false).unwrap(), vec![stale.launch_id]);
    assert_eq!(lp.get_fw_by_id(j2).unwrap().state, FwState::Reserved);

    assert_eq!(lp.detect_unreserved(3600, true).unwrap(), vec![stale.launch_id]);
    let fw = lp.get_fw_by_id(j2).unwrap();
    assert_eq!(fw.state, FwState::Ready);
    assert_eq!(fw.current_launch, None);
    assert!(lp.get_launch(stale.launch_id).unwrap().superseded);
    assert!(lp.detect_unreserved(3600, true).unwrap().is_empty());

    let retry = lp.reserve_next(None, None).unwrap().unwrap();
    assert_eq!(retry.fw_id, j2);
    assert_ne!(retry.launch_id, stale.launch_id);
    lp.start(retry.launch_id).unwrap();
    lp.complete(retry.launch_id, json!(1)).unwrap();
    assert_eq!(lp.get_wf_state(j1).unwrap(), WorkflowState::Completed);
    assert_eq!(lp.launches_of(j2).unwrap().len(), 2);
}

#[test]
fn unreserved_fix_only_touches_expired_launches() {
    let (lp, clock) = pad();
    lp.add_wf(&WorkflowSpec::new("pair").firework(FireworkSpec::new(1, "old"))
                                        .firework(FireworkSpec::new(2, "new")))
      .unwrap();
    let old = lp.reserve_next(None, None).unwrap().unwrap();
    clock.advance(Duration::minutes(50));
    let fresh = lp.reserve_next(None, None).unwrap().unwrap();
    clock.advance(Duration::minutes(20));

    assert_eq!(lp.detect_unreserved(3600, true).unwrap(), vec![old.launch_id]);
    assert_eq!(lp.get_fw_by_id(fresh.fw_id).unwrap().state, FwState::Reserved);
    assert!(!lp.get_launch(fresh.launch_id).unwrap().superseded);
}

#[test]
fn completion_readies_only_children_with_all_parents_done() {
    let (lp, _) = pad();
    let diamond = WorkflowSpec::new("diamond").firework(FireworkSpec::new(1, "top"))
                                              .firework(FireworkSpec::new(2, "left"))
                                              .firework(FireworkSpec::new(3, "right"))
                                              .firework(FireworkSpec::new(4, "bottom"))
                                              .link(1, 2)
                                              .link(1, 3)
                                              .link(2, 4)
                                              .link(3, 4);
    let added = lp.add_wf(&diamond).unwrap();
    let [top, left, right, bottom] = [1, 2, 3, 4].map(|k| added.id_map[&k]);

    assert_eq!(run(&lp, top), vec![left, right]);
    assert!(run(&lp, left).is_empty());
    assert_eq!(lp.get_fw_by_id(bottom).unwrap().state, FwState::Waiting);
    assert_eq!(lp.get_wf_state(top).unwrap(), WorkflowState::Running);
    assert_eq!(run(&lp, right), vec![bottom]);
    assert_eq!(lp.get_fw_by_id(bottom).unwrap().state, FwState::Ready);
}

#[test]
fn silent_runs_fizzle_and_late_heartbeats_fail() {
    let (lp, clock) = pad();
    lp.add_wf(&chain(1)).unwrap();
    let r = lp.reserve_next(None, None).unwrap().unwrap();
    lp.start(r.launch_id).unwrap();
    clock.advance(Duration::minutes(5));
    lp.heartbeat(r.launch_id).unwrap();
    clock.advance(Duration::minutes(8));
    assert!(lp.detect_fizzled(600, true).unwrap().is_empty());

    clock.advance(Duration::minutes(3));
    assert_eq!(lp.detect_fizzled(600, false).unwrap(), vec![r.launch_id]);
    assert_eq!(lp.detect_fizzled(600, true).unwrap(), vec![r.launch_id]);
    let launch = lp.get_launch(r.launch_id).unwrap();
    assert_eq!(launch.state, LaunchState::Fizzled);
    assert_eq!(launch.fizzle_reason.as_deref(), Some("no heartbeat"));
    assert_eq!(lp.get_fw_by_id(r.fw_id).unwrap().state, FwState::Fizzled);
    assert_eq!(lp.get_wf_state(r.fw_id).unwrap(), WorkflowState::Fizzled);

    let err = lp.heartbeat(r.launch_id).unwrap_err();
    assert!(matches!(err, LaunchPadError::InvalidTransition { from: FwState::Fizzled, .. }));
}

#[test]
fn defuse_and_reignite_restore_eligibility() {
    let (lp, _) = pad();
    let added = lp.add_wf(&chain(3)).unwrap();
    let [j1, j2, j3] = [1, 2, 3].map(|k| added.id_map[&k]);
    run(&lp, j1);

    assert_eq!(lp.defuse_wf(j3).unwrap(), vec![j2, j3]);
    assert!(lp.reserve_next(None, None).unwrap().is_none());
    assert_eq!(lp.get_wf_state(j1).unwrap(), WorkflowState::Defused);
    assert!(!lp.get_fw_by_id(j1).unwrap().defused);

    assert_eq!(lp.reignite_wf(j1).unwrap(), vec![j2, j3]);
    assert_eq!(lp.get_fw_by_id(j2).unwrap().state, FwState::Ready);
    assert_eq!(lp.get_fw_by_id(j3).unwrap().state, FwState::Waiting);
    assert!(lp.launches_of(j2).unwrap().is_empty());
    assert_eq!(lp.reserve_next(None, None).unwrap().unwrap().fw_id, j2);
}

#[test]
fn single_job_defuse_leaves_siblings_alone() {
    let (lp, _) = pad();
    let added = lp.add_wf(&WorkflowSpec::new("pair").firework(FireworkSpec::new(1, "a").with_priority(9))
                                                    .firework(FireworkSpec::new(2, "b")))
                  .unwrap();
    assert!(lp.defuse_fw(added.id_map[&1]).unwrap());
    assert!(!lp.defuse_fw(added.id_map[&1]).unwrap());
    assert_eq!(lp.reserve_next(None, None).unwrap().unwrap().fw_id, added.id_map[&2]);
    assert!(lp.reignite_fw(added.id_map[&1]).unwrap());
    assert_eq!(lp.reserve_next(None, None).unwrap().unwrap().fw_id, added.id_map[&1]);
}

#[test]
fn rerun_supersedes_history_and_resets_descendants() {
    let (lp, _) = pad();
    let added = lp.add_wf(&chain(3)).unwrap();
    let [j1, j2, j3] = [1, 2, 3].map(|k| added.id_map[&k]);
    run(&lp, j1);
    run(&lp, j2);
    assert_eq!(lp.get_fw_by_id(j3).unwrap().state, FwState::Ready);

    assert_eq!(lp.rerun_fw(j1).unwrap(), vec![j1, j2, j3]);
    assert_eq!(lp.get_fw_by_id(j1).unwrap().state, FwState::Ready);
    assert_eq!(lp.get_fw_by_id(j2).unwrap().state, FwState::Waiting);
    assert_eq!(lp.get_fw_by_id(j3).unwrap().state, FwState::Waiting);
    let history = lp.launches_of(j1).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history.iter().all(|l| l.superseded && l.state == LaunchState::Completed));
    assert_eq!(lp.get_fw_by_id(j1).unwrap().current_launch, None);

    let err = lp.rerun_fw(j1).unwrap_err();
    assert!(matches!(err, LaunchPadError::InvalidTransition { from: FwState::Ready, .. }));
}

#[test]
fn rerun_leaves_in_flight_descendants_running() {
    let (lp, _) = pad();
    let added = lp.add_wf(&chain(2)).unwrap();
    let [j1, j2] = [1, 2].map(|k| added.id_map[&k]);
    run(&lp, j1);
    let r = lp.reserve_next(None, None).unwrap().unwrap();
    lp.start(r.launch_id).unwrap();

    assert_eq!(lp.rerun_fw(j1).unwrap(), vec![j1]);
    assert_eq!(lp.get_fw_by_id(j2).unwrap().state, FwState::Running);
    lp.complete(r.launch_id, json!(null)).unwrap();
}

#[test]
fn queries_filter_jobs_and_workflows() {
    let (lp, clock) = pad();
    let start = lp.add_wf(&chain(2).with_metadata(json!({"project": "alpha"}))).unwrap();
    clock.advance(Duration::minutes(1));
    let later = lp.add_wf(&WorkflowSpec::single(FireworkSpec::new(1, "solo").with_spec(json!({"kind": "scf"}))))
                  .unwrap();

    let ready = FwQuery::new().state(FwState::Ready);
    assert_eq!(lp.get_fw_ids(Some(&ready)).unwrap(), vec![start.id_map[&1], later.id_map[&1]]);
    let scf = FwQuery::new().spec_eq("/kind", json!("scf"));
    assert_eq!(lp.get_fw_ids(Some(&scf)).unwrap(), ids(&later, &[1]));
    let recent = FwQuery::new().created_after(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 30).unwrap());
    assert_eq!(lp.get_fw_ids(Some(&recent)).unwrap(), ids(&later, &[1]));

    let alpha = WfQuery::new().metadata_eq("/project", json!("alpha"));
    assert_eq!(lp.get_wf_ids(Some(&alpha)).unwrap(), vec![start.wf_id]);
    assert_eq!(lp.get_fw_ids_in_workflows(Some(&alpha)).unwrap(), ids(&start, &[1, 2]));

    run(&lp, later.id_map[&1]);
    let done = WfQuery::new().state(WorkflowState::Completed);
    assert_eq!(lp.get_wf_ids(Some(&done)).unwrap(), vec![later.wf_id]);
    assert_eq!(lp.get_fw_ids(None).unwrap().len(), 3);
}

#[test]
fn tuneup_repairs_inconsistent_jobs() {
    let (lp, _) = pad();
    let added = lp.add_wf(&chain(2)).unwrap();
    let [j1, j2] = [1, 2].map(|k| added.id_map[&k]);
    // Corrupción directa en el store: J2 READY con padre incompleto, J1
    // RUNNING sin launch.
    let store = lp.store();
    assert!(store.update_if(j2, Precondition::state(FwState::Waiting), &FireworkUpdate::to_state(FwState::Ready))
                 .unwrap());
    assert!(store.update_if(j1, Precondition::state(FwState::Ready), &FireworkUpdate::to_state(FwState::Running))
                 .unwrap());

    let report = lp.tuneup().unwrap();
    assert_eq!(report.readiness_fixed, vec![j2]);
    assert_eq!(report.launches_reconciled, vec![j1]);
    assert_eq!(lp.get_fw_by_id(j1).unwrap().state, FwState::Ready);
    assert_eq!(lp.get_fw_by_id(j2).unwrap().state, FwState::Waiting);

    let clean = lp.tuneup().unwrap();
    assert!(clean.readiness_fixed.is_empty() && clean.launches_reconciled.is_empty());
}

#[test]
fn refresh_readiness_repairs_a_lost_child_activation() {
    let (lp, _) = pad();
    let added = lp.add_wf(&chain(2)).unwrap();
    let [j1, j2] = [1, 2].map(|k| added.id_map[&k]);
    let r = lp.reserve_next(None, None).unwrap().unwrap();
    lp.start(r.launch_id).unwrap();
    // Completa J1 sin activar a J2, como un worker que muere a mitad.
    let store = lp.store();
    let update = FireworkUpdate::to_state(FwState::Completed).with_launch(fw_core::LaunchChange::transition(
        r.launch_id,
        LaunchState::Completed,
        Utc::now(),
    ));
    assert!(store.update_if(j1, Precondition::state(FwState::Running), &update).unwrap());

    assert_eq!(lp.refresh_readiness().unwrap(), vec![j2]);
    assert!(lp.refresh_readiness().unwrap().is_empty());
}

#[test]
fn maintain_once_applies_every_sweep() {
    let (lp, clock) = pad();
    lp.add_wf(&WorkflowSpec::new("pair").firework(FireworkSpec::new(1, "reserved"))
                                        .firework(FireworkSpec::new(2, "running")))
      .unwrap();
    let reserved = lp.reserve_next(None, None).unwrap().unwrap();
    let running = lp.reserve_next(None, None).unwrap().unwrap();
    lp.start(running.launch_id).unwrap();
    clock.advance(Duration::hours(2));

    let report = lp.maintain(false, StdDuration::from_secs(1), &MaintenanceSignal::new()).unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.unreserved, vec![reserved.launch_id]);
    assert_eq!(report.fizzled, vec![running.launch_id]);
}

#[test]
fn maintain_stops_when_cancelled() {
    let lp = Arc::new(LaunchPad::in_memory());
    let signal = MaintenanceSignal::new();
    let handle = {
        let lp = lp.clone();
        let signal = signal.clone();
        thread::spawn(move || lp.maintain(true, StdDuration::from_secs(30), &signal))
    };
    thread::sleep(StdDuration::from_millis(50));
    let started = Instant::now();
    signal.cancel();
    let report = handle.join().unwrap().unwrap();
    assert!(report.iterations >= 1);
    assert!(started.elapsed() < StdDuration::from_secs(10));

    let cancelled = MaintenanceSignal::new();
    cancelled.cancel();
    assert_eq!(lp.maintain(true, StdDuration::from_secs(30), &cancelled).unwrap().iterations, 0);
}

#[test]
fn reset_with_wrong_token_keeps_data() {
    let (lp, _) = pad();
    lp.add_wf(&chain(2)).unwrap();
    assert_eq!(lp.reset("2024-04-30"), Err(LaunchPadError::ConfirmationMismatch));
    assert_eq!(lp.get_fw_ids(None).unwrap().len(), 2);
    lp.reset("2024-05-01").unwrap();
    assert!(lp.get_wf_ids(None).unwrap().is_empty());
}

#[test]
fn worker_reported_failure_fizzles_then_rerun_recovers() {
    let (lp, clock) = pad();
    let added = lp.add_wf(&chain(2)).unwrap();
    let [j1, j2] = [1, 2].map(|k| added.id_map[&k]);
    let r = lp.reserve_next(None, Some("w")).unwrap().unwrap();
    lp.start(r.launch_id).unwrap();
    clock.advance(Duration::minutes(1));

    lp.fail(r.launch_id, "segfault").unwrap();
    assert_eq!(lp.get_fw_by_id(j1).unwrap().state, FwState::Fizzled);
    assert_eq!(lp.get_fw_by_id(j2).unwrap().state, FwState::Waiting);
    let launch = lp.get_launch(r.launch_id).unwrap();
    assert_eq!(launch.state, LaunchState::Fizzled);
    assert_eq!(launch.fizzle_reason.as_deref(), Some("segfault"));
    assert_eq!(launch.finished_on, Some(clock.now()));
    assert_eq!(lp.get_wf_state(j1).unwrap(), WorkflowState::Fizzled);
    assert!(matches!(lp.heartbeat(r.launch_id), Err(LaunchPadError::InvalidTransition { .. })));
    assert!(lp.reserve_next(None, None).unwrap().is_none());

    assert_eq!(lp.rerun_fw(j1).unwrap(), vec![j1]);
    assert!(lp.get_launch(r.launch_id).unwrap().superseded);
    assert_eq!(run(&lp, j1), vec![j2]);
    assert_eq!(lp.launches_of(j1).unwrap().len(), 2);
}
