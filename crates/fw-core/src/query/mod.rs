//! Motor de consultas: predicados sobre jobs y workflows evaluados contra una
//! única lectura consistente del store (`StoreSnapshot`).
//!
//! Los closures implementan los traits, así que `get_fw_ids(Some(&|fw:
//! &Firework| fw.priority > 3))` funciona igual que un `FwQuery`.

mod filters;

pub use filters::{FwQuery, WfQuery};

use std::collections::HashMap;

use crate::model::{Firework, FwId, WfId, Workflow};
use crate::state::WorkflowState;
use crate::store::StoreSnapshot;

pub trait FireworkPredicate {
    fn matches(&self, fw: &Firework) -> bool;
}

impl<F> FireworkPredicate for F where F: Fn(&Firework) -> bool
{
    fn matches(&self, fw: &Firework) -> bool {
        self(fw)
    }
}

/// Predicado sobre un workflow; recibe además su estado agregado.
pub trait WorkflowPredicate {
    fn matches(&self, wf: &Workflow, state: WorkflowState) -> bool;
}

impl<F> WorkflowPredicate for F where F: Fn(&Workflow, WorkflowState) -> bool
{
    fn matches(&self, wf: &Workflow, state: WorkflowState) -> bool {
        self(wf, state)
    }
}

/// Ids de jobs que cumplen `pred` (todos si es `None`), ascendentes.
pub fn select_fw_ids(snapshot: &StoreSnapshot, pred: Option<&dyn FireworkPredicate>) -> Vec<FwId> {
    let mut ids: Vec<FwId> = snapshot.fireworks
                                     .iter()
                                     .filter(|fw| pred.map_or(true, |p| p.matches(fw)))
                                     .map(|fw| fw.fw_id)
                                     .collect();
    ids.sort_unstable();
    ids
}

pub fn select_wf_ids(snapshot: &StoreSnapshot, pred: Option<&dyn WorkflowPredicate>) -> Vec<WfId> {
    let mut ids: Vec<WfId> = matching_workflows(snapshot, pred).map(|wf| wf.wf_id).collect();
    ids.sort_unstable();
    ids
}

/// Ids de los jobs de los workflows que cumplen `pred`.
pub fn select_fw_ids_in_workflows(snapshot: &StoreSnapshot, pred: Option<&dyn WorkflowPredicate>) -> Vec<FwId> {
    let mut ids: Vec<FwId> = matching_workflows(snapshot, pred).flat_map(|wf| wf.fw_ids.iter().copied())
                                                               .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn matching_workflows<'a>(snapshot: &'a StoreSnapshot,
                          pred: Option<&'a dyn WorkflowPredicate>)
                          -> impl Iterator<Item = &'a Workflow> + 'a {
    let mut by_wf: HashMap<WfId, Vec<&Firework>> = HashMap::new();
    for fw in &snapshot.fireworks {
        by_wf.entry(fw.wf_id).or_default().push(fw);
    }
    snapshot.workflows.iter().filter(move |wf| match pred {
                                 None => true,
                                 Some(p) => {
                                     let jobs = by_wf.get(&wf.wf_id).map(Vec::as_slice).unwrap_or(&[]);
                                     p.matches(wf, WorkflowState::aggregate(jobs.iter().copied()))
                                 }
                             })
}
