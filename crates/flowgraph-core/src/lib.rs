//! Core domain types shared across the Flowgraph workspace.
//!
//! A flow diagram is a directed multigraph: `State` vertices carry an ordered
//! list of `Rule` edges, each guarded by a condition and pointing at a target
//! state by id. Analysis code never chases string ids during traversal;
//! it builds a [`GraphIndex`] once and works with integer indices.

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Model Types
// =============================================================================

/// A guarded transition out of a state.
///
/// `next_state` references the target [`State`] by id. The reference is not
/// guaranteed to resolve; consumers must tolerate dangling targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier for this rule.
    pub id: String,
    /// Guard condition, possibly compound ("a AND b").
    pub condition: String,
    /// Target state id, `None` when the transition has no (valid) target yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_state: Option<String>,
    /// Opaque ordering key; consumers decide whether lower or higher wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Side-effect label attached to the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl Rule {
    /// Create a rule with just an id and a condition.
    pub fn new(id: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            condition: condition.into(),
            next_state: None,
            priority: None,
            operation: None,
        }
    }

    /// Set the target state id.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.next_state = Some(target.into());
        self
    }

    /// Set the priority key.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the operation label.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }
}

/// A named vertex in the flow diagram.
///
/// `id` is the only stable identity; `name` is display text and may repeat
/// across states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Unique identifier within one graph snapshot.
    pub id: String,
    /// Display name, not guaranteed unique.
    pub name: String,
    /// Outgoing transitions in evaluation order.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl State {
    /// Create a state with no rules.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Append a rule (builder pattern).
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// A state with no outgoing rules is a dead end.
    pub fn is_dead_end(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A complete snapshot of a flow diagram.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateGraph {
    /// All states in the snapshot.
    pub states: Vec<State>,
    /// Arbitrary metadata about the snapshot (title, author, revision...).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StateGraph {
    /// Creates an empty graph.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a graph from a list of states.
    pub fn new(states: Vec<State>) -> Self {
        Self {
            states,
            metadata: HashMap::new(),
        }
    }

    /// Number of states.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Total number of rules across all states.
    pub fn rule_count(&self) -> usize {
        self.states.iter().map(|s| s.rules.len()).sum()
    }

    /// Look up a state by id.
    pub fn state_by_id(&self, id: &str) -> Option<&State> {
        self.states.iter().find(|s| s.id == id)
    }

    /// Look up a state by exact name (first match).
    pub fn state_by_name(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    /// Check whether a state id exists in the snapshot.
    pub fn contains_id(&self, id: &str) -> bool {
        self.state_by_id(id).is_some()
    }

    /// All states with zero outgoing rules.
    pub fn dead_end_states(&self) -> Vec<&State> {
        self.states.iter().filter(|s| s.is_dead_end()).collect()
    }

    /// Resolve a rule's target within this snapshot.
    pub fn resolve_target(&self, rule: &Rule) -> Option<&State> {
        rule.next_state.as_deref().and_then(|id| self.state_by_id(id))
    }

    /// Convert to petgraph StableDiGraph for visualization/analysis.
    /// Edge weights are rule conditions; dangling rules are skipped.
    pub fn to_petgraph(&self) -> (StableDiGraph<State, String>, HashMap<String, NodeIndex>) {
        let mut graph = StableDiGraph::new();
        let mut id_to_index = HashMap::new();

        for state in &self.states {
            let idx = graph.add_node(state.clone());
            id_to_index.insert(state.id.clone(), idx);
        }

        for state in &self.states {
            let from_idx = id_to_index[&state.id];
            for rule in &state.rules {
                if let Some(&to_idx) = rule
                    .next_state
                    .as_deref()
                    .and_then(|id| id_to_index.get(id))
                {
                    graph.add_edge(from_idx, to_idx, rule.condition.clone());
                }
            }
        }

        (graph, id_to_index)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for constructing a `StateGraph` incrementally.
///
/// Generates sequential ids (`s1`, `s2`, ... / `r1`, `r2`, ...) so callers
/// that assemble graphs programmatically never collide.
#[derive(Debug, Default)]
pub struct StateGraphBuilder {
    states: Vec<State>,
    name_to_id: HashMap<String, String>,
    next_state_id: u64,
    next_rule_id: u64,
    metadata: HashMap<String, String>,
}

impl StateGraphBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set metadata for the graph.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add a state, returning its generated id. Re-adding an existing name
    /// returns the original id.
    pub fn add_state(&mut self, name: impl Into<String>) -> String {
        let name = name.into();
        if let Some(id) = self.name_to_id.get(&name) {
            return id.clone();
        }

        self.next_state_id += 1;
        let id = format!("s{}", self.next_state_id);
        self.states.push(State::new(id.clone(), name.clone()));
        self.name_to_id.insert(name, id.clone());
        id
    }

    /// Add a rule to an existing state, returning the rule id.
    /// Returns `None` if the source state does not exist.
    pub fn add_rule(
        &mut self,
        state_id: &str,
        condition: impl Into<String>,
        target: Option<&str>,
    ) -> Option<String> {
        let state = self.states.iter_mut().find(|s| s.id == state_id)?;

        self.next_rule_id += 1;
        let id = format!("r{}", self.next_rule_id);
        let mut rule = Rule::new(id.clone(), condition);
        rule.next_state = target.map(|t| t.to_string());
        state.rules.push(rule);
        Some(id)
    }

    /// Get the id for a previously added state name.
    pub fn state_id(&self, name: &str) -> Option<&str> {
        self.name_to_id.get(name).map(|s| s.as_str())
    }

    /// Get the current state count.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Build the final `StateGraph`.
    pub fn build(self) -> StateGraph {
        StateGraph {
            states: self.states,
            metadata: self.metadata,
        }
    }
}

// =============================================================================
// Graph Index
// =============================================================================

/// A resolved outgoing edge: which rule, and where it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRef {
    /// Index of the rule within the source state's rule list.
    pub rule_idx: usize,
    /// Index of the target state, `None` when the reference does not resolve.
    pub target: Option<usize>,
}

/// Arena-indexed adjacency view over a slice of states.
///
/// Built once per algorithm invocation; all traversal happens over integer
/// indices into the original slice. The index borrows the states and holds
/// no copies of them.
#[derive(Debug)]
pub struct GraphIndex<'a> {
    states: &'a [State],
    id_to_index: HashMap<&'a str, usize>,
    outgoing: Vec<Vec<EdgeRef>>,
    incoming: Vec<Vec<usize>>,
}

impl<'a> GraphIndex<'a> {
    /// Build an index over the given states. Duplicate ids keep the first
    /// occurrence, matching lookup-by-id semantics elsewhere.
    pub fn new(states: &'a [State]) -> Self {
        let mut id_to_index: HashMap<&'a str, usize> = HashMap::with_capacity(states.len());
        for (idx, state) in states.iter().enumerate() {
            id_to_index.entry(state.id.as_str()).or_insert(idx);
        }

        let mut outgoing: Vec<Vec<EdgeRef>> = vec![Vec::new(); states.len()];
        let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); states.len()];

        for (idx, state) in states.iter().enumerate() {
            for (rule_idx, rule) in state.rules.iter().enumerate() {
                let target = rule
                    .next_state
                    .as_deref()
                    .and_then(|id| id_to_index.get(id).copied());
                outgoing[idx].push(EdgeRef { rule_idx, target });
                if let Some(t) = target {
                    incoming[t].push(idx);
                }
            }
        }

        Self {
            states,
            id_to_index,
            outgoing,
            incoming,
        }
    }

    /// Number of indexed states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when the index covers no states.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Resolve a state id to its index.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.id_to_index.get(id).copied()
    }

    /// The state at an index.
    pub fn state(&self, idx: usize) -> &'a State {
        &self.states[idx]
    }

    /// All indexed states.
    pub fn states(&self) -> &'a [State] {
        self.states
    }

    /// Outgoing edges of a state, in rule order.
    pub fn outgoing(&self, idx: usize) -> &[EdgeRef] {
        &self.outgoing[idx]
    }

    /// Source indices of incoming edges (one entry per referencing rule).
    pub fn incoming(&self, idx: usize) -> &[usize] {
        &self.incoming[idx]
    }

    /// Degree used for partition seeding: outgoing rule count plus incoming
    /// reference count. Dangling rules still count as outgoing.
    pub fn degree(&self, idx: usize) -> usize {
        self.states[idx].rules.len() + self.incoming[idx].len()
    }

    /// Unique neighbors in either direction.
    pub fn linked(&self, idx: usize) -> Vec<usize> {
        let mut seen: Vec<usize> = Vec::new();
        for edge in &self.outgoing[idx] {
            if let Some(t) = edge.target {
                if t != idx && !seen.contains(&t) {
                    seen.push(t);
                }
            }
        }
        for &s in &self.incoming[idx] {
            if s != idx && !seen.contains(&s) {
                seen.push(s);
            }
        }
        seen
    }

    /// Count of edges between two states, in either direction. Multi-edges
    /// each count once.
    pub fn edge_count_between(&self, a: usize, b: usize) -> usize {
        let a_to_b = self.outgoing[a]
            .iter()
            .filter(|e| e.target == Some(b))
            .count();
        let b_to_a = self.outgoing[b]
            .iter()
            .filter(|e| e.target == Some(a))
            .count();
        a_to_b + b_to_a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond_graph() -> StateGraph {
        // a -> b -> d, a -> c -> d
        StateGraph::new(vec![
            State::new("a", "Start")
                .with_rule(Rule::new("r1", "left").with_target("b"))
                .with_rule(Rule::new("r2", "right").with_target("c")),
            State::new("b", "Left").with_rule(Rule::new("r3", "down").with_target("d")),
            State::new("c", "Right").with_rule(Rule::new("r4", "down").with_target("d")),
            State::new("d", "End"),
        ])
    }

    #[test]
    fn test_graph_lookups() {
        let graph = diamond_graph();

        assert_eq!(graph.state_count(), 4);
        assert_eq!(graph.rule_count(), 4);
        assert_eq!(graph.state_by_id("b").unwrap().name, "Left");
        assert_eq!(graph.state_by_name("End").unwrap().id, "d");
        assert!(graph.contains_id("a"));
        assert!(!graph.contains_id("z"));

        let dead_ends = graph.dead_end_states();
        assert_eq!(dead_ends.len(), 1);
        assert_eq!(dead_ends[0].id, "d");
    }

    #[test]
    fn test_resolve_target_tolerates_dangling() {
        let graph = StateGraph::new(vec![
            State::new("a", "A").with_rule(Rule::new("r1", "go").with_target("missing"))
        ]);

        let rule = &graph.states[0].rules[0];
        assert!(graph.resolve_target(rule).is_none());
    }

    #[test]
    fn test_to_petgraph_skips_dangling_edges() {
        let mut graph = diamond_graph();
        graph.states[0]
            .rules
            .push(Rule::new("r5", "broken").with_target("nowhere"));

        let (pg, id_map) = graph.to_petgraph();
        assert_eq!(pg.node_count(), 4);
        assert_eq!(pg.edge_count(), 4); // dangling edge dropped
        assert!(id_map.contains_key("a"));
    }

    #[test]
    fn test_builder_generates_ids() {
        let mut b = StateGraphBuilder::new();
        let idle = b.add_state("Idle");
        let busy = b.add_state("Busy");
        let again = b.add_state("Idle");

        assert_eq!(idle, again);
        assert_ne!(idle, busy);

        let rule = b.add_rule(&idle, "start", Some(&busy));
        assert!(rule.is_some());
        assert!(b.add_rule("missing", "x", None).is_none());

        let graph = b.with_metadata("title", "test").build();
        assert_eq!(graph.state_count(), 2);
        assert_eq!(graph.rule_count(), 1);
        assert_eq!(graph.metadata.get("title"), Some(&"test".to_string()));
    }

    #[test]
    fn test_index_adjacency() {
        let graph = diamond_graph();
        let index = GraphIndex::new(&graph.states);

        let a = index.index_of("a").unwrap();
        let d = index.index_of("d").unwrap();

        assert_eq!(index.len(), 4);
        assert_eq!(index.outgoing(a).len(), 2);
        assert_eq!(index.incoming(d).len(), 2);
        assert_eq!(index.degree(a), 2);
        assert_eq!(index.degree(d), 2);
        assert!(index.index_of("z").is_none());
    }

    #[test]
    fn test_index_linked_and_edge_counts() {
        let graph = StateGraph::new(vec![
            State::new("1", "One")
                .with_rule(Rule::new("r1", "fwd").with_target("2"))
                .with_rule(Rule::new("r2", "alt").with_target("2")),
            State::new("2", "Two").with_rule(Rule::new("r3", "back").with_target("1")),
        ]);
        let index = GraphIndex::new(&graph.states);

        let one = index.index_of("1").unwrap();
        let two = index.index_of("2").unwrap();

        assert_eq!(index.edge_count_between(one, two), 3);
        assert_eq!(index.linked(one), vec![two]);
        assert_eq!(index.linked(two), vec![one]);
    }

    #[test]
    fn test_index_with_dangling_rule() {
        let graph = StateGraph::new(vec![
            State::new("a", "A").with_rule(Rule::new("r1", "go").with_target("ghost"))
        ]);
        let index = GraphIndex::new(&graph.states);

        let a = index.index_of("a").unwrap();
        assert_eq!(index.outgoing(a).len(), 1);
        assert_eq!(index.outgoing(a)[0].target, None);
        assert_eq!(index.degree(a), 1);
        assert!(index.linked(a).is_empty());
    }

    #[test]
    fn test_serde_round_trip() {
        let graph = diamond_graph();
        let json = serde_json::to_string(&graph).unwrap();
        let back: StateGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(graph, back);
    }
}
