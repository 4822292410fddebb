//! Structural audit of a graph snapshot.
//!
//! Issues found here are tolerated everywhere else in the workspace (the
//! differ renders dangling targets as "unknown", the path finder skips
//! them). The audit exists so an editor can surface them to the author;
//! nothing in it raises an error.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use flowgraph_core::{GraphIndex, State};

/// Category of an audit issue, for counting and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditKind {
    DanglingReference,
    MissingTarget,
    DuplicateStateId,
    BlankCondition,
    UnreachableState,
}

/// A single problem found in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuditIssue {
    /// A rule references a state id that does not exist.
    DanglingReference {
        state_id: String,
        rule_id: String,
        target: String,
    },
    /// A rule has no target at all.
    MissingTarget { state_id: String, rule_id: String },
    /// Two states share an id; lookups resolve to the first.
    DuplicateStateId { id: String },
    /// A rule's condition is blank.
    BlankCondition { state_id: String, rule_id: String },
    /// No route from any entry state reaches this state.
    UnreachableState { state_id: String },
}

impl AuditIssue {
    /// The issue's category.
    pub fn kind(&self) -> AuditKind {
        match self {
            AuditIssue::DanglingReference { .. } => AuditKind::DanglingReference,
            AuditIssue::MissingTarget { .. } => AuditKind::MissingTarget,
            AuditIssue::DuplicateStateId { .. } => AuditKind::DuplicateStateId,
            AuditIssue::BlankCondition { .. } => AuditKind::BlankCondition,
            AuditIssue::UnreachableState { .. } => AuditKind::UnreachableState,
        }
    }
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditIssue::DanglingReference {
                state_id,
                rule_id,
                target,
            } => write!(
                f,
                "rule {rule_id} of state {state_id} references unknown state {target}"
            ),
            AuditIssue::MissingTarget { state_id, rule_id } => {
                write!(f, "rule {rule_id} of state {state_id} has no target")
            }
            AuditIssue::DuplicateStateId { id } => {
                write!(f, "state id {id} is used more than once")
            }
            AuditIssue::BlankCondition { state_id, rule_id } => {
                write!(f, "rule {rule_id} of state {state_id} has a blank condition")
            }
            AuditIssue::UnreachableState { state_id } => {
                write!(f, "state {state_id} is unreachable from any entry state")
            }
        }
    }
}

/// Everything one audit pass found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphAudit {
    /// Issues in detection order.
    pub issues: Vec<AuditIssue>,
}

impl GraphAudit {
    /// True when no issues were found.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Count issues of one category.
    pub fn count_of(&self, kind: AuditKind) -> usize {
        self.issues.iter().filter(|i| i.kind() == kind).count()
    }

    /// Issues of one category.
    pub fn issues_of(&self, kind: AuditKind) -> Vec<&AuditIssue> {
        self.issues.iter().filter(|i| i.kind() == kind).collect()
    }
}

/// Inspect a snapshot for structural problems.
///
/// Entry states are those with no incoming references; when the whole graph
/// is cyclic and no such state exists, the first state is treated as the
/// entry so reachability still means something.
pub fn audit(states: &[State]) -> GraphAudit {
    let mut issues = Vec::new();

    let mut seen_ids: HashMap<&str, usize> = HashMap::new();
    for state in states {
        *seen_ids.entry(state.id.as_str()).or_insert(0) += 1;
    }
    for state in states {
        if seen_ids.get(state.id.as_str()) == Some(&1) {
            continue;
        }
        // Report each duplicated id once.
        seen_ids.insert(state.id.as_str(), 1);
        issues.push(AuditIssue::DuplicateStateId {
            id: state.id.clone(),
        });
    }

    let known: HashSet<&str> = states.iter().map(|s| s.id.as_str()).collect();
    for state in states {
        for rule in &state.rules {
            if rule.condition.trim().is_empty() {
                issues.push(AuditIssue::BlankCondition {
                    state_id: state.id.clone(),
                    rule_id: rule.id.clone(),
                });
            }
            match rule.next_state.as_deref() {
                Some(target) if !known.contains(target) => {
                    issues.push(AuditIssue::DanglingReference {
                        state_id: state.id.clone(),
                        rule_id: rule.id.clone(),
                        target: target.to_string(),
                    });
                }
                Some(_) => {}
                None => issues.push(AuditIssue::MissingTarget {
                    state_id: state.id.clone(),
                    rule_id: rule.id.clone(),
                }),
            }
        }
    }

    for idx in unreachable_states(states) {
        issues.push(AuditIssue::UnreachableState {
            state_id: states[idx].id.clone(),
        });
    }

    GraphAudit { issues }
}

fn unreachable_states(states: &[State]) -> Vec<usize> {
    if states.is_empty() {
        return Vec::new();
    }
    let index = GraphIndex::new(states);

    let mut entries: Vec<usize> = (0..index.len())
        .filter(|&i| index.incoming(i).is_empty())
        .collect();
    if entries.is_empty() {
        entries.push(0);
    }

    let mut reached = vec![false; index.len()];
    let mut queue: VecDeque<usize> = entries.into_iter().collect();
    for &e in &queue {
        reached[e] = true;
    }
    while let Some(idx) = queue.pop_front() {
        for edge in index.outgoing(idx) {
            if let Some(t) = edge.target {
                if !reached[t] {
                    reached[t] = true;
                    queue.push_back(t);
                }
            }
        }
    }

    (0..index.len()).filter(|&i| !reached[i]).collect()
}
