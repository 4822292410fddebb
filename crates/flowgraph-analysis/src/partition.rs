//! Graph partitioning.
//!
//! Splitting prefers the graph's natural shape: if undirected traversal finds
//! more than one connected component, those components ARE the partitions and
//! the requested count is ignored. Only a single-component graph is split
//! heuristically, by seeding the highest-degree states and attaching each
//! remaining state to the partition it shares the most edges with.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use flowgraph_core::{GraphIndex, State};

use crate::error::{AnalysisError, AnalysisResult};

/// Why an edge leaves its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// Target resolves to a state outside the partition.
    External,
    /// Target is missing or does not resolve at all.
    Dangling,
}

/// An edge whose source is inside a partition and whose target is not.
///
/// Always classified against the complete state set, never against other
/// partitions, so the classification is independent of how the rest of the
/// graph was partitioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryEdge {
    /// Id of the source state (inside the partition).
    pub from_state: String,
    /// Raw target id, `None` when the rule has no target.
    pub to_state: Option<String>,
    /// The rule's guard condition.
    pub condition: String,
    /// Boundary classification.
    pub kind: BoundaryKind,
}

/// A non-overlapping subset of states plus its edges to the rest of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    /// Identifier for the partition (`p1`, `p2`, ...).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Member state ids, in assignment order.
    pub state_ids: Vec<String>,
    /// Member states.
    pub states: Vec<State>,
    /// Edges leaving the partition.
    pub boundary_edges: Vec<BoundaryEdge>,
}

impl Partition {
    /// Number of member states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when the partition has no members.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Check membership by state id.
    pub fn contains(&self, state_id: &str) -> bool {
        self.state_ids.iter().any(|id| id == state_id)
    }
}

/// Connected components under undirected traversal: an edge in either
/// direction links two states into the same component.
pub fn find_connected_components(states: &[State]) -> Vec<Vec<State>> {
    let index = GraphIndex::new(states);
    component_indices(&index)
        .into_iter()
        .map(|idxs| idxs.into_iter().map(|i| index.state(i).clone()).collect())
        .collect()
}

fn component_indices(index: &GraphIndex<'_>) -> Vec<Vec<usize>> {
    let mut visited = vec![false; index.len()];
    let mut components = Vec::new();

    for root in 0..index.len() {
        if visited[root] {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::from([root]);
        visited[root] = true;

        while let Some(idx) = queue.pop_front() {
            component.push(idx);
            for neighbor in index.linked(idx) {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }
        components.push(component);
    }

    components
}

/// Split a graph into at most `target_count` partitions.
///
/// Natural decomposition takes priority: multiple connected components are
/// returned as-is, ignoring `target_count`. A single-component graph is
/// seeded with its `min(target_count, n)` highest-degree states and the rest
/// attach greedily. Empty partitions are dropped; the result never assigns
/// one state id to two partitions.
pub fn split_graph(states: &[State], target_count: usize) -> AnalysisResult<Vec<Partition>> {
    if target_count == 0 {
        return Err(AnalysisError::InvalidPartitionCount {
            requested: target_count,
        });
    }
    if states.is_empty() {
        return Ok(Vec::new());
    }

    let index = GraphIndex::new(states);
    let components = component_indices(&index);

    let groups = if components.len() > 1 {
        debug!(
            components = components.len(),
            "graph_split_natural_components"
        );
        components
    } else {
        seeded_groups(&index, target_count)
    };

    let partitions: Vec<Partition> = groups
        .into_iter()
        .filter(|g| !g.is_empty())
        .enumerate()
        .map(|(i, group)| build_partition(&index, i, &group))
        .collect();

    debug!(
        partitions = partitions.len(),
        requested = target_count,
        "graph_split_complete"
    );

    Ok(partitions)
}

/// Seed partitions with the highest-degree states, then attach each remaining
/// state (in input order) to the partition it shares the most edges with.
/// Ties resolve to the lowest partition index.
fn seeded_groups(index: &GraphIndex<'_>, target_count: usize) -> Vec<Vec<usize>> {
    let seed_count = target_count.min(index.len());

    let mut by_degree: Vec<usize> = (0..index.len()).collect();
    by_degree.sort_by_key(|&i| std::cmp::Reverse(index.degree(i)));

    let seeds: Vec<usize> = by_degree[..seed_count].to_vec();
    let seed_set: HashSet<usize> = seeds.iter().copied().collect();

    let mut groups: Vec<Vec<usize>> = seeds.iter().map(|&s| vec![s]).collect();

    for idx in 0..index.len() {
        if seed_set.contains(&idx) {
            continue;
        }
        let mut best_group = 0;
        let mut best_score = 0;
        for (g, members) in groups.iter().enumerate() {
            let score: usize = members
                .iter()
                .map(|&m| index.edge_count_between(idx, m))
                .sum();
            if score > best_score {
                best_score = score;
                best_group = g;
            }
        }
        groups[best_group].push(idx);
    }

    groups
}

fn build_partition(index: &GraphIndex<'_>, position: usize, members: &[usize]) -> Partition {
    let member_set: HashSet<usize> = members.iter().copied().collect();

    let mut state_ids = Vec::with_capacity(members.len());
    let mut states = Vec::with_capacity(members.len());
    let mut boundary_edges = Vec::new();

    for &idx in members {
        let state = index.state(idx);
        state_ids.push(state.id.clone());
        states.push(state.clone());

        for edge in index.outgoing(idx) {
            let rule = &state.rules[edge.rule_idx];
            match edge.target {
                Some(t) if member_set.contains(&t) => {}
                Some(_) => boundary_edges.push(BoundaryEdge {
                    from_state: state.id.clone(),
                    to_state: rule.next_state.clone(),
                    condition: rule.condition.clone(),
                    kind: BoundaryKind::External,
                }),
                None => boundary_edges.push(BoundaryEdge {
                    from_state: state.id.clone(),
                    to_state: rule.next_state.clone(),
                    condition: rule.condition.clone(),
                    kind: BoundaryKind::Dangling,
                }),
            }
        }
    }

    Partition {
        id: format!("p{}", position + 1),
        name: format!("Partition {}", position + 1),
        state_ids,
        states,
        boundary_edges,
    }
}

/// Member states referenced by rules of states outside the partition.
pub fn find_entry_points(partition: &Partition, all_states: &[State]) -> Vec<State> {
    let members: HashSet<&str> = partition.state_ids.iter().map(String::as_str).collect();

    let mut entry_ids: Vec<&str> = Vec::new();
    for state in all_states {
        if members.contains(state.id.as_str()) {
            continue;
        }
        for rule in &state.rules {
            if let Some(target) = rule.next_state.as_deref() {
                if members.contains(target) && !entry_ids.contains(&target) {
                    entry_ids.push(target);
                }
            }
        }
    }

    partition
        .states
        .iter()
        .filter(|s| entry_ids.contains(&s.id.as_str()))
        .cloned()
        .collect()
}

/// Member states with at least one rule whose target resolves outside the
/// partition.
pub fn find_exit_points(partition: &Partition, all_states: &[State]) -> Vec<State> {
    let members: HashSet<&str> = partition.state_ids.iter().map(String::as_str).collect();
    let known: HashSet<&str> = all_states.iter().map(|s| s.id.as_str()).collect();

    partition
        .states
        .iter()
        .filter(|state| {
            state.rules.iter().any(|rule| {
                rule.next_state
                    .as_deref()
                    .is_some_and(|t| known.contains(t) && !members.contains(t))
            })
        })
        .cloned()
        .collect()
}

/// True when no state id appears in more than one partition.
///
/// [`split_graph`] guarantees this by construction; the check exists as a
/// separate operation so heuristic changes cannot regress silently.
pub fn validate_partitions(partitions: &[Partition]) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    for partition in partitions {
        for id in &partition.state_ids {
            if !seen.insert(id.as_str()) {
                return false;
            }
        }
    }
    true
}
