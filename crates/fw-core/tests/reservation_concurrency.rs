use std::sync::{Arc, Barrier};
use std::thread;

use fw_core::{FireworkSpec, FwState, LaunchPad, WorkflowSpec};

#[test]
fn exactly_one_worker_wins_a_single_ready_job() {
    let lp = Arc::new(LaunchPad::in_memory());
    let added = lp.add_wf(&WorkflowSpec::single(FireworkSpec::new(1, "contended"))).unwrap();
    let workers = 16;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers).map(|i| {
                                          let lp = lp.clone();
                                          let barrier = barrier.clone();
                                          thread::spawn(move || {
                                              barrier.wait();
                                              lp.reserve_next(None, Some(format!("worker-{i}").as_str())).unwrap()
                                          })
                                      })
                                      .collect();
    let wins: Vec<_> = handles.into_iter().filter_map(|h| h.join().unwrap()).collect();

    assert_eq!(wins.len(), 1);
    let fw = lp.get_fw_by_id(added.id_map[&1]).unwrap();
    assert_eq!(fw.state, FwState::Reserved);
    assert_eq!(fw.current_launch, Some(wins[0].launch_id));
    assert_eq!(lp.launches_of(fw.fw_id).unwrap().len(), 1);
}

#[test]
fn many_jobs_are_each_reserved_once() {
    let lp = Arc::new(LaunchPad::in_memory());
    let mut spec = WorkflowSpec::new("fan");
    for key in 0..40 {
        spec = spec.firework(FireworkSpec::new(key, format!("job-{key}")));
    }
    lp.add_wf(&spec).unwrap();

    let handles: Vec<_> = (0..8).map(|_| {
                                    let lp = lp.clone();
                                    thread::spawn(move || {
                                        let mut mine = Vec::new();
                                        while let Some(r) = lp.reserve_next(None, None).unwrap() {
                                            mine.push(r.fw_id);
                                        }
                                        mine
                                    })
                                })
                                .collect();
    let mut all: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    all.sort_unstable();
    let before = all.len();
    all.dedup();
    assert_eq!(before, 40);
    assert_eq!(all.len(), 40);
}
