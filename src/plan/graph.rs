// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Explicit dependency edges between declared resources.
//!
//! Ordering is data: a plan is validated and split into layers before
//! anything is submitted, and a node never lands in a layer before all of
//! its dependencies.

use super::resource::DeclaredResource;
use crate::error::{Result, SeedError};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub name: String,
    pub resource: DeclaredResource,
    pub depends_on: Vec<String>,
}

/// Declared resources keyed by stable logical name
#[derive(Debug, Clone, Default)]
pub struct Plan {
    nodes: Vec<PlanNode>,
    index: HashMap<String, usize>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; dependencies may be declared before or after it
    pub fn add(
        &mut self,
        name: impl Into<String>,
        resource: DeclaredResource,
        depends_on: &[&str],
    ) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(SeedError::Plan(format!("duplicate resource {}", name)));
        }
        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(PlanNode {
            name,
            resource,
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        });
        Ok(())
    }

    pub fn node(&self, name: &str) -> Option<&PlanNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Split the plan into layers; every node's dependencies sit in earlier layers.
    ///
    /// Within a layer nodes keep insertion order. Unknown dependencies and
    /// cycles are rejected.
    pub fn layers(&self) -> Result<Vec<Vec<&PlanNode>>> {
        let mut indegree = vec![0usize; self.nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.depends_on {
                let &d = self.index.get(dep).ok_or_else(|| {
                    SeedError::Plan(format!("{} depends on unknown resource {}", node.name, dep))
                })?;
                if d == i {
                    return Err(SeedError::Plan(format!("{} depends on itself", node.name)));
                }
                indegree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut layers = Vec::new();
        let mut ready: Vec<usize> = (0..self.nodes.len()).filter(|&i| indegree[i] == 0).collect();
        let mut placed = 0;

        while !ready.is_empty() {
            let mut next = Vec::new();
            for &i in &ready {
                for &dependent in &dependents[i] {
                    indegree[dependent] -= 1;
                    if indegree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            placed += ready.len();
            layers.push(ready.iter().map(|&i| &self.nodes[i]).collect());
            next.sort_unstable();
            ready = next;
        }

        if placed < self.nodes.len() {
            let stuck: Vec<&str> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| indegree[*i] > 0)
                .map(|(_, n)| n.name.as_str())
                .collect();
            return Err(SeedError::Plan(format!(
                "dependency cycle among {}",
                stuck.join(", ")
            )));
        }

        Ok(layers)
    }
}
