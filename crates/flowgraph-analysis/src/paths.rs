//! Path enumeration with cycle detection.
//!
//! Search runs as an explicit worklist DFS over a [`GraphIndex`]: frames hold
//! integer state indices, and an on-current-path mask (not a global visited
//! set) guards against cycles. Re-convergent shapes like diamonds therefore
//! yield every acyclic route, while any edge landing back on the current path
//! is recorded as a cycle and pruned.

use serde::{Deserialize, Serialize};
use tracing::debug;

use flowgraph_core::{GraphIndex, State};

use crate::error::{AnalysisError, AnalysisResult};

/// What a search is looking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// All acyclic paths from the start to any dead-end state.
    ToEndStates,
    /// All acyclic paths from the start to one named state.
    ToTarget { target: String },
    /// Paths that pass through `via` on the way to `target`
    /// (or to any dead end when `target` is `None`).
    ViaState { via: String, target: Option<String> },
}

/// Enumeration bounds. Unrestricted DFS over a dense graph is combinatorial,
/// so both the number of recorded results and the path depth are capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum paths (and cycles) to record before truncating.
    pub max_paths: usize,
    /// Maximum edges in a single path.
    pub max_depth: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_paths: 1000,
            max_depth: 64,
        }
    }
}

impl SearchConfig {
    /// Cheap bounds for interactive previews.
    pub fn quick() -> Self {
        Self {
            max_paths: 100,
            max_depth: 16,
        }
    }

    /// Generous bounds for batch analysis.
    pub fn exhaustive() -> Self {
        Self {
            max_paths: 10_000,
            max_depth: 256,
        }
    }
}

/// The rule taken to leave a state along a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakenRule {
    /// Id of the rule.
    pub rule_id: String,
    /// The rule's guard condition.
    pub condition: String,
    /// Side-effect label, when the rule has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

/// One (state, rule-taken) step. The final step of a path carries no rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    /// Id of the state at this step.
    pub state_id: String,
    /// Display name of the state.
    pub state_name: String,
    /// Rule taken to leave this state, `None` at the terminus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<TakenRule>,
}

/// A finite acyclic path from the start to a terminus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundPath {
    /// Ordered steps from start to terminus.
    pub steps: Vec<PathStep>,
}

impl FoundPath {
    /// Number of edges taken.
    pub fn edge_count(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// The final step.
    pub fn terminus(&self) -> Option<&PathStep> {
        self.steps.last()
    }
}

/// A branch that re-entered a state already on the current path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleDetection {
    /// Steps from the start up to and including the closing rule.
    pub steps: Vec<PathStep>,
    /// Id of the state the closing rule re-entered.
    pub reentry_state_id: String,
}

/// Everything one search produced. Computed once; [`SearchOutcome::page`]
/// slices the cached result sequence, the search is never re-run per page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Paths in DFS discovery order (pre-order over rules in stored order).
    pub paths: Vec<FoundPath>,
    /// Cycles encountered while searching.
    pub cycles: Vec<CycleDetection>,
    /// True when `max_paths` or `max_depth` pruned enumeration.
    pub truncated: bool,
    /// Number of edges the search followed.
    pub explored: usize,
}

impl SearchOutcome {
    /// No paths and no cycles.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.cycles.is_empty()
    }

    /// Number of recorded paths.
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// A page of the result sequence. Out-of-range offsets yield an empty
    /// slice; the final page may be short.
    pub fn page(&self, offset: usize, page_size: usize) -> &[FoundPath] {
        if offset >= self.paths.len() {
            return &[];
        }
        let end = (offset + page_size).min(self.paths.len());
        &self.paths[offset..end]
    }
}

struct Frame {
    state: usize,
    next_edge: usize,
}

/// Enumerate paths from `start_id` according to `mode`.
///
/// Fails with [`AnalysisError::StateNotFound`] when the start (or a
/// target/via named by the mode) does not resolve. Finding nothing is not an
/// error: the outcome is simply empty.
pub fn find_paths(
    states: &[State],
    start_id: &str,
    mode: &SearchMode,
    config: SearchConfig,
) -> AnalysisResult<SearchOutcome> {
    let index = GraphIndex::new(states);

    let resolve = |id: &str| -> AnalysisResult<usize> {
        index.index_of(id).ok_or_else(|| AnalysisError::StateNotFound {
            state_id: id.to_string(),
        })
    };

    let start = resolve(start_id)?;
    let (target_idx, via_idx) = match mode {
        SearchMode::ToEndStates => (None, None),
        SearchMode::ToTarget { target } => (Some(resolve(target)?), None),
        SearchMode::ViaState { via, target } => {
            let t = target.as_deref().map(resolve).transpose()?;
            (t, Some(resolve(via)?))
        }
    };

    debug!(start = start_id, mode = ?mode, "path_search_start");

    let mut outcome = SearchOutcome::default();
    let mut frames = vec![Frame {
        state: start,
        next_edge: 0,
    }];
    let mut on_path = vec![false; index.len()];
    on_path[start] = true;
    // Edges of the current path as (state_idx, rule_idx) pairs.
    let mut taken: Vec<(usize, usize)> = Vec::new();

    while let Some(depth) = frames.len().checked_sub(1) {
        let state = frames[depth].state;
        let Some(&edge) = index.outgoing(state).get(frames[depth].next_edge) else {
            frames.pop();
            on_path[state] = false;
            taken.pop();
            continue;
        };
        frames[depth].next_edge += 1;

        // Dangling targets cannot be followed; tolerated, not an error.
        let Some(next) = edge.target else {
            continue;
        };
        outcome.explored += 1;

        if on_path[next] {
            if outcome.cycles.len() < config.max_paths {
                outcome
                    .cycles
                    .push(cycle_record(&index, &taken, state, edge.rule_idx, next));
            } else {
                outcome.truncated = true;
            }
            continue;
        }

        if taken.len() + 1 > config.max_depth {
            outcome.truncated = true;
            continue;
        }

        taken.push((state, edge.rule_idx));
        on_path[next] = true;
        frames.push(Frame {
            state: next,
            next_edge: 0,
        });

        let terminal = match target_idx {
            Some(t) => next == t,
            None => index.state(next).is_dead_end(),
        };
        if terminal && via_idx.is_none_or(|v| on_path[v]) {
            outcome.paths.push(found_path(&index, &taken, next));
            if outcome.paths.len() >= config.max_paths {
                outcome.truncated = true;
                break;
            }
            // Nothing beyond an accepted terminus can terminate again.
            frames.pop();
            on_path[next] = false;
            taken.pop();
        }
    }

    debug!(
        paths = outcome.paths.len(),
        cycles = outcome.cycles.len(),
        explored = outcome.explored,
        truncated = outcome.truncated,
        "path_search_complete"
    );

    Ok(outcome)
}

fn step_with_rule(index: &GraphIndex<'_>, state_idx: usize, rule_idx: usize) -> PathStep {
    let state = index.state(state_idx);
    let rule = &state.rules[rule_idx];
    PathStep {
        state_id: state.id.clone(),
        state_name: state.name.clone(),
        rule: Some(TakenRule {
            rule_id: rule.id.clone(),
            condition: rule.condition.clone(),
            operation: rule.operation.clone(),
        }),
    }
}

fn found_path(index: &GraphIndex<'_>, taken: &[(usize, usize)], terminus: usize) -> FoundPath {
    let mut steps: Vec<PathStep> = taken
        .iter()
        .map(|&(s, r)| step_with_rule(index, s, r))
        .collect();
    let end = index.state(terminus);
    steps.push(PathStep {
        state_id: end.id.clone(),
        state_name: end.name.clone(),
        rule: None,
    });
    FoundPath { steps }
}

fn cycle_record(
    index: &GraphIndex<'_>,
    taken: &[(usize, usize)],
    from: usize,
    closing_rule: usize,
    reentry: usize,
) -> CycleDetection {
    let mut steps: Vec<PathStep> = taken
        .iter()
        .map(|&(s, r)| step_with_rule(index, s, r))
        .collect();
    steps.push(step_with_rule(index, from, closing_rule));
    CycleDetection {
        steps,
        reentry_state_id: index.state(reentry).id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_core::{Rule, State};

    fn chain() -> Vec<State> {
        vec![
            State::new("a", "A").with_rule(Rule::new("r1", "go").with_target("b")),
            State::new("b", "B").with_rule(Rule::new("r2", "go").with_target("c")),
            State::new("c", "C"),
        ]
    }

    fn diamond() -> Vec<State> {
        vec![
            State::new("a", "Start")
                .with_rule(Rule::new("r1", "left").with_target("b"))
                .with_rule(Rule::new("r2", "right").with_target("c")),
            State::new("b", "Left").with_rule(Rule::new("r3", "down").with_target("d")),
            State::new("c", "Right").with_rule(Rule::new("r4", "down").with_target("d")),
            State::new("d", "End"),
        ]
    }

    #[test]
    fn test_chain_to_end() {
        let states = chain();
        let outcome =
            find_paths(&states, "a", &SearchMode::ToEndStates, SearchConfig::default()).unwrap();

        assert_eq!(outcome.path_count(), 1);
        let path = &outcome.paths[0];
        assert_eq!(path.edge_count(), 2);
        assert_eq!(path.terminus().unwrap().state_id, "c");
        assert!(path.terminus().unwrap().rule.is_none());
        assert!(path.steps[0].rule.is_some());
        assert!(!outcome.truncated);
    }

    #[test]
    fn test_diamond_finds_both_routes() {
        let states = diamond();
        let outcome =
            find_paths(&states, "a", &SearchMode::ToEndStates, SearchConfig::default()).unwrap();

        // A non-global visited set must let both branches reach "d".
        assert_eq!(outcome.path_count(), 2);
        // DFS pre-order: the rule stored first explores first.
        assert_eq!(outcome.paths[0].steps[1].state_id, "b");
        assert_eq!(outcome.paths[1].steps[1].state_id, "c");
        assert!(outcome.cycles.is_empty());
    }

    #[test]
    fn test_cycle_terminates_with_no_paths() {
        let states = vec![
            State::new("a", "A").with_rule(Rule::new("r1", "x").with_target("b")),
            State::new("b", "B").with_rule(Rule::new("r2", "y").with_target("a")),
        ];
        let outcome =
            find_paths(&states, "a", &SearchMode::ToEndStates, SearchConfig::default()).unwrap();

        assert!(outcome.paths.is_empty());
        assert_eq!(outcome.cycles.len(), 1);
        assert_eq!(outcome.cycles[0].reentry_state_id, "a");
        let closing = outcome.cycles[0].steps.last().unwrap();
        assert_eq!(closing.state_id, "b");
        assert_eq!(closing.rule.as_ref().unwrap().condition, "y");
    }

    #[test]
    fn test_to_target() {
        let states = diamond();
        let mode = SearchMode::ToTarget {
            target: "d".to_string(),
        };
        let outcome = find_paths(&states, "a", &mode, SearchConfig::default()).unwrap();
        assert_eq!(outcome.path_count(), 2);

        let mode = SearchMode::ToTarget {
            target: "b".to_string(),
        };
        let outcome = find_paths(&states, "a", &mode, SearchConfig::default()).unwrap();
        assert_eq!(outcome.path_count(), 1);
        assert_eq!(outcome.paths[0].terminus().unwrap().state_id, "b");
    }

    #[test]
    fn test_via_state_constrains_routes() {
        let states = diamond();
        let mode = SearchMode::ViaState {
            via: "b".to_string(),
            target: Some("d".to_string()),
        };
        let outcome = find_paths(&states, "a", &mode, SearchConfig::default()).unwrap();

        assert_eq!(outcome.path_count(), 1);
        assert_eq!(outcome.paths[0].steps[1].state_id, "b");
    }

    #[test]
    fn test_via_state_to_any_end() {
        let states = diamond();
        let mode = SearchMode::ViaState {
            via: "c".to_string(),
            target: None,
        };
        let outcome = find_paths(&states, "a", &mode, SearchConfig::default()).unwrap();

        assert_eq!(outcome.path_count(), 1);
        assert_eq!(outcome.paths[0].steps[1].state_id, "c");
    }

    #[test]
    fn test_dead_end_start_yields_empty() {
        let states = vec![State::new("a", "A")];
        let outcome =
            find_paths(&states, "a", &SearchMode::ToEndStates, SearchConfig::default()).unwrap();
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_unknown_ids_are_errors() {
        let states = chain();
        let err = find_paths(
            &states,
            "nope",
            &SearchMode::ToEndStates,
            SearchConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::StateNotFound { .. }));

        let mode = SearchMode::ToTarget {
            target: "ghost".to_string(),
        };
        let err = find_paths(&states, "a", &mode, SearchConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::StateNotFound { .. }));
    }

    #[test]
    fn test_dangling_rules_are_skipped() {
        let states = vec![
            State::new("a", "A")
                .with_rule(Rule::new("r1", "broken").with_target("ghost"))
                .with_rule(Rule::new("r2", "ok").with_target("b")),
            State::new("b", "B"),
        ];
        let outcome =
            find_paths(&states, "a", &SearchMode::ToEndStates, SearchConfig::default()).unwrap();

        assert_eq!(outcome.path_count(), 1);
        assert_eq!(outcome.paths[0].terminus().unwrap().state_id, "b");
    }

    #[test]
    fn test_max_paths_truncates() {
        let states = diamond();
        let config = SearchConfig {
            max_paths: 1,
            ..Default::default()
        };
        let outcome = find_paths(&states, "a", &SearchMode::ToEndStates, config).unwrap();

        assert_eq!(outcome.path_count(), 1);
        assert!(outcome.truncated);
    }

    #[test]
    fn test_max_depth_truncates() {
        let states = chain();
        let config = SearchConfig {
            max_depth: 1,
            ..Default::default()
        };
        let outcome = find_paths(&states, "a", &SearchMode::ToEndStates, config).unwrap();

        assert!(outcome.paths.is_empty());
        assert!(outcome.truncated);
    }

    #[test]
    fn test_pagination_slices_cached_results() {
        let states = diamond();
        let outcome =
            find_paths(&states, "a", &SearchMode::ToEndStates, SearchConfig::default()).unwrap();

        assert_eq!(outcome.page(0, 1).len(), 1);
        assert_eq!(outcome.page(1, 1).len(), 1);
        assert_eq!(outcome.page(0, 10).len(), 2);
        assert!(outcome.page(5, 10).is_empty());
        assert_eq!(outcome.page(0, 1)[0], outcome.paths[0]);
    }
}
