use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{FireworkUpdate, IdAllocator, IdKind, LaunchChange, LaunchPadStore, Precondition, StoreSnapshot};
use crate::errors::{LaunchPadError, LaunchPadResult, RecordKind};
use crate::model::{Firework, FwId, Launch, LaunchId, WfId, Workflow};
use crate::state::{FwState, LaunchState};

#[derive(Default)]
struct Tables {
    counters: HashMap<IdKind, i64>,
    workflows: BTreeMap<WfId, Workflow>,
    fireworks: BTreeMap<FwId, Firework>,
    launches: BTreeMap<LaunchId, Launch>,
}

/// Backend en memoria: un único `Mutex` serializa todas las operaciones, lo
/// que hace triviales la atomicidad del CAS y la consistencia de `snapshot`.
/// Es la implementación de referencia para tests y demos.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> LaunchPadResult<MutexGuard<'_, Tables>> {
        self.inner
            .lock()
            .map_err(|_| LaunchPadError::StoreUnavailable("in-memory store lock poisoned".into()))
    }
}

impl IdAllocator for InMemoryStore {
    fn next_id(&self, kind: IdKind) -> LaunchPadResult<i64> {
        let mut t = self.tables()?;
        let counter = t.counters.entry(kind).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

impl LaunchPadStore for InMemoryStore {
    fn insert_workflow(&self, workflow: &Workflow, fireworks: &[Firework]) -> LaunchPadResult<()> {
        let mut t = self.tables()?;
        if t.workflows.contains_key(&workflow.wf_id) {
            return Err(LaunchPadError::InvalidWorkflow(format!("wf_id {} already exists", workflow.wf_id)));
        }
        if let Some(fw) = fireworks.iter().find(|fw| t.fireworks.contains_key(&fw.fw_id)) {
            return Err(LaunchPadError::InvalidWorkflow(format!("fw_id {} already exists", fw.fw_id)));
        }
        t.workflows.insert(workflow.wf_id, workflow.clone());
        for fw in fireworks {
            t.fireworks.insert(fw.fw_id, fw.clone());
        }
        Ok(())
    }

    fn firework(&self, fw_id: FwId) -> LaunchPadResult<Option<Firework>> {
        Ok(self.tables()?.fireworks.get(&fw_id).cloned())
    }

    fn workflow(&self, wf_id: WfId) -> LaunchPadResult<Option<Workflow>> {
        Ok(self.tables()?.workflows.get(&wf_id).cloned())
    }

    fn launch(&self, launch_id: LaunchId) -> LaunchPadResult<Option<Launch>> {
        Ok(self.tables()?.launches.get(&launch_id).cloned())
    }

    fn update_if(&self, fw_id: FwId, precondition: Precondition, update: &FireworkUpdate) -> LaunchPadResult<bool> {
        let mut t = self.tables()?;
        let Some(current) = t.fireworks.get(&fw_id) else {
            return Err(LaunchPadError::not_found(RecordKind::Firework, fw_id));
        };
        if !precondition.holds(current) {
            return Ok(false);
        }
        // Validar todo antes de escribir nada.
        match &update.launch {
            Some(LaunchChange::Insert(launch)) if t.launches.contains_key(&launch.launch_id) => {
                return Err(LaunchPadError::Integrity(format!("launch_id {} already exists", launch.launch_id)));
            }
            Some(change @ (LaunchChange::Transition { .. } | LaunchChange::Heartbeat { .. }))
                if !t.launches.contains_key(&change.launch_id()) =>
            {
                return Err(LaunchPadError::not_found(RecordKind::Launch, change.launch_id()));
            }
            _ => {}
        }
        if let Some(missing) = update.supersede.iter().find(|id| !t.launches.contains_key(*id)) {
            return Err(LaunchPadError::not_found(RecordKind::Launch, *missing));
        }

        let mut fw = current.clone();
        update.apply_to(&mut fw);
        t.fireworks.insert(fw_id, fw);
        match &update.launch {
            Some(LaunchChange::Insert(launch)) => {
                t.launches.insert(launch.launch_id, launch.clone());
            }
            Some(change) => {
                if let Some(launch) = t.launches.get_mut(&change.launch_id()) {
                    change.apply_to(launch);
                }
            }
            None => {}
        }
        for id in &update.supersede {
            if let Some(launch) = t.launches.get_mut(id) {
                launch.superseded = true;
            }
        }
        Ok(true)
    }

    fn fireworks_in_state(&self, state: FwState) -> LaunchPadResult<Vec<Firework>> {
        Ok(self.tables()?.fireworks.values().filter(|fw| fw.state == state).cloned().collect())
    }

    fn launches_in_state(&self, state: LaunchState) -> LaunchPadResult<Vec<Launch>> {
        Ok(self.tables()?.launches.values().filter(|l| l.state == state).cloned().collect())
    }

    fn launches_of(&self, fw_id: FwId) -> LaunchPadResult<Vec<Launch>> {
        Ok(self.tables()?.launches.values().filter(|l| l.fw_id == fw_id).cloned().collect())
    }

    fn snapshot(&self) -> LaunchPadResult<StoreSnapshot> {
        let t = self.tables()?;
        Ok(StoreSnapshot { workflows: t.workflows.values().cloned().collect(),
                           fireworks: t.fireworks.values().cloned().collect() })
    }

    fn reset(&self) -> LaunchPadResult<()> {
        *self.tables()? = Tables::default();
        Ok(())
    }

    fn tuneup(&self) -> LaunchPadResult<()> {
        let t = self.tables()?;
        log::debug!("in-memory tuneup: {} workflows, {} fireworks, {} launches",
                    t.workflows.len(),
                    t.fireworks.len(),
                    t.launches.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn sample(wf_id: WfId, fw_id: FwId) -> (Workflow, Firework) {
        let now = Utc::now();
        let wf = Workflow { wf_id,
                            name: "wf".into(),
                            metadata: json!({}),
                            fw_ids: vec![fw_id],
                            links: BTreeMap::new(),
                            created_on: now,
                            updated_on: now };
        let fw = Firework { fw_id,
                            wf_id,
                            name: "job".into(),
                            spec: json!({}),
                            priority: 0,
                            state: FwState::Ready,
                            defused: false,
                            revision: 0,
                            current_launch: None,
                            launch_ids: vec![],
                            created_on: now,
                            updated_on: now };
        (wf, fw)
    }

    #[test]
    fn ids_are_monotonic_per_kind() {
        let store = InMemoryStore::new();
        assert_eq!(store.next_id(IdKind::Firework).unwrap(), 1);
        assert_eq!(store.next_id(IdKind::Firework).unwrap(), 2);
        assert_eq!(store.next_id(IdKind::Launch).unwrap(), 1);
    }

    #[test]
    fn concurrent_allocation_never_repeats() {
        let store = Arc::new(InMemoryStore::new());
        let handles: Vec<_> = (0..8).map(|_| {
                                        let s = store.clone();
                                        thread::spawn(move || {
                                            (0..100).map(|_| s.next_id(IdKind::Workflow).unwrap())
                                                    .collect::<Vec<_>>()
                                        })
                                    })
                                    .collect();
        let mut all: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
    }

    #[test]
    fn insert_rejects_existing_ids() {
        let store = InMemoryStore::new();
        let (wf, fw) = sample(1, 1);
        store.insert_workflow(&wf, &[fw.clone()]).unwrap();
        let (wf2, _) = sample(2, 1);
        let err = store.insert_workflow(&wf2, &[fw]).unwrap_err();
        assert!(matches!(err, LaunchPadError::InvalidWorkflow(_)));
        assert!(store.workflow(2).unwrap().is_none());
    }

    #[test]
    fn update_if_is_noop_when_precondition_fails() {
        let store = InMemoryStore::new();
        let (wf, fw) = sample(1, 1);
        store.insert_workflow(&wf, &[fw]).unwrap();
        let applied = store.update_if(1, Precondition::state(FwState::Waiting), &FireworkUpdate::to_state(FwState::Ready))
                           .unwrap();
        assert!(!applied);
        assert_eq!(store.firework(1).unwrap().unwrap().revision, 0);
    }

    #[test]
    fn update_if_writes_job_and_launch_together() {
        let store = InMemoryStore::new();
        let (wf, fw) = sample(1, 1);
        store.insert_workflow(&wf, &[fw]).unwrap();
        let now = Utc::now();
        let launch = Launch::reserve(1, 1, None, now, now);
        let update = FireworkUpdate::to_state(FwState::Reserved).with_launch(LaunchChange::Insert(launch));
        assert!(store.update_if(1, Precondition::armed(FwState::Ready), &update).unwrap());
        let fw = store.firework(1).unwrap().unwrap();
        assert_eq!(fw.current_launch, Some(1));
        assert_eq!(store.launch(1).unwrap().unwrap().state, LaunchState::Reserved);
        assert_eq!(store.launches_of(1).unwrap().len(), 1);
    }

    #[test]
    fn missing_launch_leaves_job_untouched() {
        let store = InMemoryStore::new();
        let (wf, fw) = sample(1, 1);
        store.insert_workflow(&wf, &[fw]).unwrap();
        let update = FireworkUpdate::to_state(FwState::Running).with_launch(LaunchChange::transition(9,
                                                                                                     LaunchState::Running,
                                                                                                     Utc::now()));
        let err = store.update_if(1, Precondition::state(FwState::Ready), &update).unwrap_err();
        assert_eq!(err, LaunchPadError::not_found(RecordKind::Launch, 9));
        assert_eq!(store.firework(1).unwrap().unwrap().state, FwState::Ready);
    }

    #[test]
    fn duplicate_launch_id_is_an_integrity_error() {
        let store = InMemoryStore::new();
        let (wf, fw) = sample(1, 1);
        let (_, other) = sample(1, 2);
        store.insert_workflow(&wf, &[fw, other]).unwrap();
        let now = Utc::now();
        let reserve = |fw_id| {
            FireworkUpdate::to_state(FwState::Reserved).with_launch(LaunchChange::Insert(Launch::reserve(5,
                                                                                                        fw_id,
                                                                                                        None,
                                                                                                        now,
                                                                                                        now)))
        };
        assert!(store.update_if(1, Precondition::armed(FwState::Ready), &reserve(1)).unwrap());

        let err = store.update_if(2, Precondition::armed(FwState::Ready), &reserve(2)).unwrap_err();
        assert!(matches!(err, LaunchPadError::Integrity(_)));
        assert!(!err.is_retryable());
        assert_eq!(store.firework(2).unwrap().unwrap().state, FwState::Ready);
        assert_eq!(store.launch(5).unwrap().unwrap().fw_id, 1);
    }

    #[test]
    fn reset_rewinds_counters() {
        let store = InMemoryStore::new();
        store.next_id(IdKind::Firework).unwrap();
        let (wf, fw) = sample(1, 1);
        store.insert_workflow(&wf, &[fw]).unwrap();
        store.reset().unwrap();
        assert!(store.snapshot().unwrap().fireworks.is_empty());
        assert_eq!(store.next_id(IdKind::Firework).unwrap(), 1);
    }
}
