//! Definiciones de entrada para `LaunchPad::add_wf`.
//!
//! Los jobs se identifican con `key` locales a la definición; al insertar,
//! el allocator asigna los ids definitivos y devuelve el mapeo.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{LaunchPadError, LaunchPadResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireworkSpec {
    pub key: i64,
    pub name: String,
    #[serde(default)]
    pub spec: Value,
    #[serde(default)]
    pub priority: i32,
}

impl FireworkSpec {
    pub fn new(key: i64, name: impl Into<String>) -> Self {
        Self { key,
               name: name.into(),
               spec: json!({}),
               priority: 0 }
    }

    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub metadata: Value,
    pub fireworks: Vec<FireworkSpec>,
    /// Pares (padre, hijo) en términos de `FireworkSpec::key`.
    #[serde(default)]
    pub links: Vec<(i64, i64)>,
}

impl WorkflowSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               metadata: json!({}),
               fireworks: Vec::new(),
               links: Vec::new() }
    }

    /// Workflow de un único job (equivale a insertar un FireWork suelto).
    pub fn single(fw: FireworkSpec) -> Self {
        Self::new(fw.name.clone()).firework(fw)
    }

    pub fn firework(mut self, fw: FireworkSpec) -> Self {
        self.fireworks.push(fw);
        self
    }

    pub fn link(mut self, parent: i64, child: i64) -> Self {
        self.links.push((parent, child));
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Enlaces agrupados por padre, sin duplicados.
    pub fn children_by_key(&self) -> BTreeMap<i64, Vec<i64>> {
        let mut out: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for (parent, child) in &self.links {
            let children = out.entry(*parent).or_default();
            if !children.contains(child) {
                children.push(*child);
            }
        }
        out
    }

    /// Valida la definición y devuelve las keys en orden topológico.
    ///
    /// Errores:
    /// - `InvalidWorkflow`: sin jobs, keys duplicadas o enlaces a keys
    ///   desconocidas.
    /// - `CycleDetected`: el grafo tiene un ciclo (incluye auto-enlaces).
    pub fn validate(&self) -> LaunchPadResult<Vec<i64>> {
        if self.fireworks.is_empty() {
            return Err(LaunchPadError::InvalidWorkflow(format!("workflow '{}' has no fireworks", self.name)));
        }
        let mut keys = BTreeSet::new();
        for fw in &self.fireworks {
            if !keys.insert(fw.key) {
                return Err(LaunchPadError::InvalidWorkflow(format!("duplicate firework key {} in '{}'", fw.key, self.name)));
            }
        }
        for (parent, child) in &self.links {
            for end in [parent, child] {
                if !keys.contains(end) {
                    return Err(LaunchPadError::InvalidWorkflow(format!("link {parent}->{child} references unknown key {end}")));
                }
            }
        }

        let children = self.children_by_key();
        let mut indegree: BTreeMap<i64, usize> = keys.iter().map(|k| (*k, 0)).collect();
        for child in children.values().flatten() {
            *indegree.entry(*child).or_default() += 1;
        }
        let mut queue: VecDeque<i64> =
            self.fireworks.iter().map(|fw| fw.key).filter(|k| indegree[k] == 0).collect();
        let mut order = Vec::with_capacity(keys.len());
        while let Some(key) = queue.pop_front() {
            order.push(key);
            for child in children.get(&key).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(child) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }
        if order.len() != keys.len() {
            return Err(LaunchPadError::CycleDetected { workflow: self.name.clone() });
        }
        Ok(order)
    }
}
