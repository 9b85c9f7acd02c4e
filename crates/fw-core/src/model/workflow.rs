use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{FwId, WfId};

/// DAG de jobs. `links` va de padre a hijos: un hijo sólo es elegible cuando
/// todos sus padres completaron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub wf_id: WfId,
    pub name: String,
    pub metadata: Value,
    pub fw_ids: Vec<FwId>,
    pub links: BTreeMap<FwId, Vec<FwId>>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl Workflow {
    pub fn contains(&self, fw_id: FwId) -> bool {
        self.fw_ids.contains(&fw_id)
    }

    pub fn children_of(&self, fw_id: FwId) -> &[FwId] {
        self.links.get(&fw_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parents_of(&self, fw_id: FwId) -> Vec<FwId> {
        self.links
            .iter()
            .filter(|(_, children)| children.contains(&fw_id))
            .map(|(parent, _)| *parent)
            .collect()
    }

    /// Jobs sin padres.
    pub fn roots(&self) -> Vec<FwId> {
        let with_parent: BTreeSet<FwId> = self.links.values().flatten().copied().collect();
        self.fw_ids.iter().copied().filter(|id| !with_parent.contains(id)).collect()
    }

    /// Orden topológico estable (Kahn, desempate por posición en `fw_ids`).
    /// El DAG se valida al insertar, así que siempre cubre todos los jobs.
    pub fn topological_order(&self) -> Vec<FwId> {
        let mut indegree: BTreeMap<FwId, usize> = self.fw_ids.iter().map(|id| (*id, 0)).collect();
        for child in self.links.values().flatten() {
            if let Some(d) = indegree.get_mut(child) {
                *d += 1;
            }
        }
        let mut queue: VecDeque<FwId> = self.fw_ids.iter().copied().filter(|id| indegree[id] == 0).collect();
        let mut order = Vec::with_capacity(self.fw_ids.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for child in self.children_of(id) {
                if let Some(d) = indegree.get_mut(child) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }
        order
    }

    /// Descendientes (sin incluir `fw_id`) en orden topológico.
    pub fn descendants_of(&self, fw_id: FwId) -> Vec<FwId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<FwId> = self.children_of(fw_id).to_vec();
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend_from_slice(self.children_of(id));
            }
        }
        self.topological_order().into_iter().filter(|id| seen.contains(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 1 -> {2, 3}, 2 -> 4, 3 -> 4
    fn diamond() -> Workflow {
        let now = Utc::now();
        Workflow { wf_id: 9,
                   name: "diamond".into(),
                   metadata: json!({}),
                   fw_ids: vec![1, 2, 3, 4],
                   links: BTreeMap::from([(1, vec![2, 3]), (2, vec![4]), (3, vec![4])]),
                   created_on: now,
                   updated_on: now }
    }

    #[test]
    fn navigation_helpers() {
        let wf = diamond();
        assert_eq!(wf.roots(), vec![1]);
        assert_eq!(wf.parents_of(4), vec![2, 3]);
        assert_eq!(wf.children_of(4), &[] as &[FwId]);
        assert_eq!(wf.topological_order(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn descendants_come_in_dependency_order() {
        let wf = diamond();
        assert_eq!(wf.descendants_of(1), vec![2, 3, 4]);
        assert_eq!(wf.descendants_of(3), vec![4]);
        assert!(wf.descendants_of(4).is_empty());
    }
}
