use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{FireworkPredicate, WorkflowPredicate};
use crate::model::{Firework, FwId, WfId, Workflow};
use crate::state::{FwState, WorkflowState};

/// Filtro de jobs. Los criterios vacíos no restringen; los presentes se
/// combinan con AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FwQuery {
    pub states: Vec<FwState>,
    pub name: Option<String>,
    pub name_contains: Option<String>,
    pub defused: Option<bool>,
    pub wf_id: Option<WfId>,
    /// Pares (JSON pointer, valor) que deben coincidir en `spec`.
    pub spec_eq: Vec<(String, Value)>,
    pub created_after: Option<DateTime<Utc>>,
}

impl FwQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: FwState) -> Self {
        self.states.push(state);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name_contains(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn defused(mut self, defused: bool) -> Self {
        self.defused = Some(defused);
        self
    }

    pub fn in_workflow(mut self, wf_id: WfId) -> Self {
        self.wf_id = Some(wf_id);
        self
    }

    /// `pointer` sigue RFC 6901, p.ej. `/params/temperature`.
    pub fn spec_eq(mut self, pointer: impl Into<String>, value: Value) -> Self {
        self.spec_eq.push((pointer.into(), value));
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }
}

impl FireworkPredicate for FwQuery {
    fn matches(&self, fw: &Firework) -> bool {
        (self.states.is_empty() || self.states.contains(&fw.state))
        && self.name.as_ref().map_or(true, |n| &fw.name == n)
        && self.name_contains.as_ref().map_or(true, |f| fw.name.contains(f.as_str()))
        && self.defused.map_or(true, |d| fw.defused == d)
        && self.wf_id.map_or(true, |id| fw.wf_id == id)
        && self.created_after.map_or(true, |t| fw.created_on > t)
        && pointers_match(&fw.spec, &self.spec_eq)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WfQuery {
    pub name: Option<String>,
    pub state: Option<WorkflowState>,
    pub metadata_eq: Vec<(String, Value)>,
    pub contains_fw: Option<FwId>,
}

impl WfQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn state(mut self, state: WorkflowState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn metadata_eq(mut self, pointer: impl Into<String>, value: Value) -> Self {
        self.metadata_eq.push((pointer.into(), value));
        self
    }

    pub fn contains_fw(mut self, fw_id: FwId) -> Self {
        self.contains_fw = Some(fw_id);
        self
    }
}

impl WorkflowPredicate for WfQuery {
    fn matches(&self, wf: &Workflow, state: WorkflowState) -> bool {
        self.name.as_ref().map_or(true, |n| &wf.name == n)
        && self.state.map_or(true, |s| s == state)
        && self.contains_fw.map_or(true, |id| wf.contains(id))
        && pointers_match(&wf.metadata, &self.metadata_eq)
    }
}

fn pointers_match(doc: &Value, expected: &[(String, Value)]) -> bool {
    expected.iter().all(|(pointer, value)| doc.pointer(pointer) == Some(value))
}
