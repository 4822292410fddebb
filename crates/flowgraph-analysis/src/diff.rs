//! Structural comparison of two graph snapshots.
//!
//! State ids are only stable within one snapshot, so matching is tiered:
//! identical id first, then exact name, then a normalized-name fallback.
//! Rule ids regenerate on re-import and are only trusted when both carry the
//! stable-origin prefix; otherwise condition text decides, with target names
//! as a tiebreaker. Differences come back as status tags plus human-readable
//! change descriptions for the rendering layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use flowgraph_core::{Rule, State};

/// Rule ids produced by the original import tooling carry this prefix and
/// survive re-export; anything else is considered regenerated.
const STABLE_RULE_ID_PREFIX: &str = "id_";

/// Priority assumed when a rule does not set one.
const DEFAULT_PRIORITY: i64 = 50;

/// Target name shown when a reference does not resolve.
const UNKNOWN_TARGET: &str = "unknown";

/// How an entity changed between the base and compare snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeStatus {
    /// Present only in the compare snapshot.
    Added,
    /// Present only in the base snapshot.
    Removed,
    /// Matched, with differences.
    Modified,
    /// Matched, no differences.
    Unchanged,
}

impl ChangeStatus {
    /// Get a display label for the status.
    pub fn label(&self) -> &'static str {
        match self {
            ChangeStatus::Added => "Added",
            ChangeStatus::Removed => "Removed",
            ChangeStatus::Modified => "Modified",
            ChangeStatus::Unchanged => "Unchanged",
        }
    }

    /// Get a short symbol for the status.
    pub fn symbol(&self) -> &'static str {
        match self {
            ChangeStatus::Added => "+",
            ChangeStatus::Removed => "-",
            ChangeStatus::Modified => "~",
            ChangeStatus::Unchanged => "=",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which kind of entity a diff entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    State,
    Rule,
}

/// Comparison outcome for a single rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDiff {
    /// Status of the rule.
    pub status: ChangeStatus,
    /// Rule id on the side the rule exists on (base side for matches).
    pub rule_id: String,
    /// The rule's guard condition.
    pub condition: String,
    /// Resolved target name, "unknown" for dangling references.
    pub target_name: String,
    /// Human-readable change descriptions (empty when unchanged).
    pub changes: Vec<String>,
}

/// Comparison outcome for a single state and its rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    /// Status of the state.
    pub status: ChangeStatus,
    /// State id on the side the state exists on (base side for matches).
    pub state_id: String,
    /// Display name.
    pub name: String,
    /// Human-readable change descriptions (empty when unchanged).
    pub changes: Vec<String>,
    /// Per-rule outcomes.
    pub rules: Vec<RuleDiff>,
}

/// Aggregate counters, one per status per entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub added_states: usize,
    pub removed_states: usize,
    pub modified_states: usize,
    pub added_rules: usize,
    pub removed_rules: usize,
    pub modified_rules: usize,
}

impl ComparisonSummary {
    /// True when any counter is nonzero.
    pub fn has_changes(&self) -> bool {
        self.added_states
            + self.removed_states
            + self.modified_states
            + self.added_rules
            + self.removed_rules
            + self.modified_rules
            > 0
    }
}

/// Full comparison result: per-state entries plus aggregate counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphComparison {
    /// Base-side states (matched or removed) followed by added states.
    pub states: Vec<StateDiff>,
    /// Aggregate counters.
    pub summary: ComparisonSummary,
}

impl GraphComparison {
    /// True when any entity changed.
    pub fn has_changes(&self) -> bool {
        self.summary.has_changes()
    }

    /// Flatten into one entry per state and per rule, for filtering/display.
    pub fn entries(&self) -> Vec<DiffEntry> {
        let mut entries = Vec::new();
        for state in &self.states {
            entries.push(DiffEntry {
                entity: EntityKind::State,
                status: state.status,
                state_name: state.name.clone(),
                condition: None,
                target_name: None,
                changes: state.changes.clone(),
            });
            for rule in &state.rules {
                entries.push(DiffEntry {
                    entity: EntityKind::Rule,
                    status: rule.status,
                    state_name: state.name.clone(),
                    condition: Some(rule.condition.clone()),
                    target_name: Some(rule.target_name.clone()),
                    changes: rule.changes.clone(),
                });
            }
        }
        entries
    }
}

/// One row of the flattened comparison view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub entity: EntityKind,
    pub status: ChangeStatus,
    /// Name of the state (the owning state, for rule entries).
    pub state_name: String,
    /// Rule condition, `None` for state entries.
    pub condition: Option<String>,
    /// Resolved target name, `None` for state entries.
    pub target_name: Option<String>,
    /// Human-readable change descriptions.
    pub changes: Vec<String>,
}

/// Post-hoc filter over the flattened view. All present criteria must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffFilter {
    /// Keep only entries with this status.
    pub status: Option<ChangeStatus>,
    /// Keep only entries of this entity kind.
    pub entity: Option<EntityKind>,
    /// Case-insensitive substring over state name, condition, and target.
    pub query: Option<String>,
}

impl DiffFilter {
    /// Check one entry against all present criteria.
    pub fn matches(&self, entry: &DiffEntry) -> bool {
        if let Some(status) = self.status {
            if entry.status != status {
                return false;
            }
        }
        if let Some(entity) = self.entity {
            if entry.entity != entity {
                return false;
            }
        }
        if let Some(query) = &self.query {
            let needle = query.to_lowercase();
            let in_name = entry.state_name.to_lowercase().contains(&needle);
            let in_condition = entry
                .condition
                .as_ref()
                .is_some_and(|c| c.to_lowercase().contains(&needle));
            let in_target = entry
                .target_name
                .as_ref()
                .is_some_and(|t| t.to_lowercase().contains(&needle));
            if !(in_name || in_condition || in_target) {
                return false;
            }
        }
        true
    }

    /// Apply the filter to a flattened view.
    pub fn apply(&self, entries: &[DiffEntry]) -> Vec<DiffEntry> {
        entries.iter().filter(|e| self.matches(e)).cloned().collect()
    }
}

/// Case-insensitive, whitespace-collapsed form used by the weakest matching
/// tier.
fn normalized_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Find the compare-side match for a base state. Tiers are strict: an id
/// match is taken before any name heuristic, and an exact name match before
/// the normalized fallback. First unconsumed candidate per tier wins.
fn find_state_match(base: &State, compare: &[State], consumed: &[bool]) -> Option<usize> {
    let available = |i: &usize| !consumed[*i];

    if let Some(i) = (0..compare.len())
        .filter(available)
        .find(|&i| compare[i].id == base.id)
    {
        return Some(i);
    }
    if let Some(i) = (0..compare.len())
        .filter(available)
        .find(|&i| compare[i].name == base.name)
    {
        return Some(i);
    }
    let base_norm = normalized_name(&base.name);
    (0..compare.len())
        .filter(available)
        .find(|&i| normalized_name(&compare[i].name) == base_norm)
}

/// Resolved target name of a rule within its own snapshot.
fn resolved_target<'a>(rule: &Rule, snapshot: &'a [State]) -> Option<&'a str> {
    rule.next_state
        .as_deref()
        .and_then(|id| snapshot.iter().find(|s| s.id == id))
        .map(|s| s.name.as_str())
}

fn display_target(rule: &Rule, snapshot: &[State]) -> String {
    resolved_target(rule, snapshot)
        .unwrap_or(UNKNOWN_TARGET)
        .to_string()
}

/// Decide whether two rules are the same logical transition.
///
/// Identical stable-origin ids short-circuit; everything else requires equal
/// condition text (trimmed, case-insensitive) and then agreement on the
/// resolved target name. A broken reference on exactly one side is itself a
/// difference, so such rules never match; both sides broken is agreement.
fn rules_match(base: &Rule, base_states: &[State], cand: &Rule, cand_states: &[State]) -> bool {
    if base.id.starts_with(STABLE_RULE_ID_PREFIX)
        && cand.id.starts_with(STABLE_RULE_ID_PREFIX)
        && base.id == cand.id
    {
        return true;
    }

    let base_cond = base.condition.trim().to_lowercase();
    let cand_cond = cand.condition.trim().to_lowercase();
    if base_cond != cand_cond {
        return false;
    }

    match (
        resolved_target(base, base_states),
        resolved_target(cand, cand_states),
    ) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

/// Changes between two matched rules, as display strings.
fn rule_changes(base: &Rule, base_states: &[State], cand: &Rule, cand_states: &[State]) -> Vec<String> {
    let mut changes = Vec::new();

    let base_cond = base.condition.trim();
    let cand_cond = cand.condition.trim();
    if !base_cond.eq_ignore_ascii_case(cand_cond) {
        changes.push(format!("Condition changed: '{base_cond}' → '{cand_cond}'"));
    }

    let base_target = display_target(base, base_states);
    let cand_target = display_target(cand, cand_states);
    if !base_target.eq_ignore_ascii_case(&cand_target) {
        changes.push(format!("Target changed: {base_target} → {cand_target}"));
    }

    let base_priority = base.priority.unwrap_or(DEFAULT_PRIORITY);
    let cand_priority = cand.priority.unwrap_or(DEFAULT_PRIORITY);
    if base_priority != cand_priority {
        changes.push(format!("Priority changed: {base_priority} → {cand_priority}"));
    }

    let base_op = base.operation.as_deref().unwrap_or("(none)");
    let cand_op = cand.operation.as_deref().unwrap_or("(none)");
    if base_op != cand_op {
        changes.push(format!("Operation changed: {base_op} → {cand_op}"));
    }

    changes
}

fn rule_diff_for(rule: &Rule, snapshot: &[State], status: ChangeStatus) -> RuleDiff {
    RuleDiff {
        status,
        rule_id: rule.id.clone(),
        condition: rule.condition.clone(),
        target_name: display_target(rule, snapshot),
        changes: Vec::new(),
    }
}

/// Diff the rule lists of a matched state pair.
fn diff_rules(
    base: &State,
    base_states: &[State],
    cand: &State,
    cand_states: &[State],
) -> (Vec<RuleDiff>, Vec<String>) {
    let mut consumed = vec![false; cand.rules.len()];
    let mut diffs = Vec::new();

    let mut modified = 0usize;
    let mut removed = 0usize;

    for rule in &base.rules {
        let matched = (0..cand.rules.len())
            .filter(|&i| !consumed[i])
            .find(|&i| rules_match(rule, base_states, &cand.rules[i], cand_states));

        match matched {
            Some(i) => {
                consumed[i] = true;
                let changes = rule_changes(rule, base_states, &cand.rules[i], cand_states);
                let status = if changes.is_empty() {
                    ChangeStatus::Unchanged
                } else {
                    modified += 1;
                    ChangeStatus::Modified
                };
                diffs.push(RuleDiff {
                    status,
                    rule_id: rule.id.clone(),
                    condition: rule.condition.clone(),
                    target_name: display_target(rule, base_states),
                    changes,
                });
            }
            None => {
                removed += 1;
                diffs.push(rule_diff_for(rule, base_states, ChangeStatus::Removed));
            }
        }
    }

    let mut added = 0usize;
    for (i, rule) in cand.rules.iter().enumerate() {
        if !consumed[i] {
            added += 1;
            diffs.push(rule_diff_for(rule, cand_states, ChangeStatus::Added));
        }
    }

    let mut state_changes = Vec::new();
    if base.rules.len() != cand.rules.len() {
        state_changes.push(format!(
            "Rule count changed: {} → {}",
            base.rules.len(),
            cand.rules.len()
        ));
    }
    if modified > 0 {
        state_changes.push(format!("{modified} rule(s) modified"));
    }
    if added > 0 {
        state_changes.push(format!("{added} rule(s) added"));
    }
    if removed > 0 {
        state_changes.push(format!("{removed} rule(s) removed"));
    }

    (diffs, state_changes)
}

/// Compare two snapshots.
///
/// Base-side states appear first (matched or removed, in base order),
/// followed by compare-side states that matched nothing (added). Comparing a
/// snapshot against itself yields no changes.
pub fn compare(base_states: &[State], compare_states: &[State]) -> GraphComparison {
    let mut consumed = vec![false; compare_states.len()];
    let mut states = Vec::new();
    let mut summary = ComparisonSummary::default();

    for base in base_states {
        match find_state_match(base, compare_states, &consumed) {
            Some(i) => {
                consumed[i] = true;
                let cand = &compare_states[i];
                let (rules, changes) = diff_rules(base, base_states, cand, compare_states);

                for rule in &rules {
                    match rule.status {
                        ChangeStatus::Added => summary.added_rules += 1,
                        ChangeStatus::Removed => summary.removed_rules += 1,
                        ChangeStatus::Modified => summary.modified_rules += 1,
                        ChangeStatus::Unchanged => {}
                    }
                }

                let status = if changes.is_empty() {
                    ChangeStatus::Unchanged
                } else {
                    summary.modified_states += 1;
                    ChangeStatus::Modified
                };
                states.push(StateDiff {
                    status,
                    state_id: base.id.clone(),
                    name: base.name.clone(),
                    changes,
                    rules,
                });
            }
            None => {
                summary.removed_states += 1;
                summary.removed_rules += base.rules.len();
                states.push(StateDiff {
                    status: ChangeStatus::Removed,
                    state_id: base.id.clone(),
                    name: base.name.clone(),
                    changes: vec!["State removed".to_string()],
                    rules: base
                        .rules
                        .iter()
                        .map(|r| rule_diff_for(r, base_states, ChangeStatus::Removed))
                        .collect(),
                });
            }
        }
    }

    for (i, cand) in compare_states.iter().enumerate() {
        if consumed[i] {
            continue;
        }
        summary.added_states += 1;
        summary.added_rules += cand.rules.len();
        states.push(StateDiff {
            status: ChangeStatus::Added,
            state_id: cand.id.clone(),
            name: cand.name.clone(),
            changes: vec!["State added".to_string()],
            rules: cand
                .rules
                .iter()
                .map(|r| rule_diff_for(r, compare_states, ChangeStatus::Added))
                .collect(),
        });
    }

    debug!(
        states = states.len(),
        has_changes = summary.has_changes(),
        "graph_compare_complete"
    );

    GraphComparison { states, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_pair() -> Vec<State> {
        vec![
            State::new("1", "S1").with_rule(Rule::new("r1", "go").with_target("2")),
            State::new("2", "S2"),
        ]
    }

    #[test]
    fn test_self_compare_has_no_changes() {
        let states = base_pair();
        let result = compare(&states, &states);

        assert!(!result.has_changes());
        assert!(result
            .states
            .iter()
            .all(|s| s.status == ChangeStatus::Unchanged));
        assert!(result
            .states
            .iter()
            .flat_map(|s| &s.rules)
            .all(|r| r.status == ChangeStatus::Unchanged));
    }

    #[test]
    fn test_priority_change_is_modified() {
        let base = base_pair();
        let mut compare_side = base_pair();
        compare_side[0].rules[0].priority = Some(5);

        let result = compare(&base, &compare_side);

        let s1 = &result.states[0];
        assert_eq!(s1.status, ChangeStatus::Modified);
        assert_eq!(s1.rules[0].status, ChangeStatus::Modified);
        assert!(s1.rules[0]
            .changes
            .iter()
            .any(|c| c.contains("Priority changed: 50 → 5")));

        let s2 = &result.states[1];
        assert_eq!(s2.status, ChangeStatus::Unchanged);
        assert_eq!(result.summary.modified_states, 1);
        assert_eq!(result.summary.modified_rules, 1);
    }

    #[test]
    fn test_id_match_beats_name_match() {
        // Same id with a new name on one state, while another state
        // claims the old name: id equality must win.
        let base = vec![State::new("1", "Alpha")];
        let compare_side = vec![
            State::new("9", "Alpha"),
            State::new("1", "Renamed"),
        ];

        let result = compare(&base, &compare_side);

        let matched = &result.states[0];
        assert_eq!(matched.state_id, "1");
        assert_ne!(matched.status, ChangeStatus::Removed);
        // "Alpha" on the compare side is the leftover, reported as added.
        let added: Vec<_> = result
            .states
            .iter()
            .filter(|s| s.status == ChangeStatus::Added)
            .collect();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].state_id, "9");
    }

    #[test]
    fn test_normalized_name_match() {
        // Different ids; names differ only in case and spacing.
        let base = vec![State::new("1", "Wait  For Input")];
        let compare_side = vec![State::new("77", "wait for input")];

        let result = compare(&base, &compare_side);

        assert_eq!(result.states.len(), 1);
        assert_eq!(result.states[0].status, ChangeStatus::Unchanged);
    }

    #[test]
    fn test_added_and_removed_states_carry_their_rules() {
        let base = vec![
            State::new("1", "Only In Base").with_rule(Rule::new("r1", "x").with_target("1"))
        ];
        let compare_side = vec![
            State::new("2", "Only In Compare")
                .with_rule(Rule::new("r2", "y"))
                .with_rule(Rule::new("r3", "z")),
        ];

        let result = compare(&base, &compare_side);

        assert_eq!(result.summary.removed_states, 1);
        assert_eq!(result.summary.removed_rules, 1);
        assert_eq!(result.summary.added_states, 1);
        assert_eq!(result.summary.added_rules, 2);
        assert!(result.has_changes());
    }

    #[test]
    fn test_rule_count_change_description() {
        let base = vec![State::new("1", "S1")
            .with_rule(Rule::new("r1", "a"))
            .with_rule(Rule::new("r2", "b"))];
        let compare_side = vec![State::new("1", "S1")
            .with_rule(Rule::new("r1", "a"))
            .with_rule(Rule::new("r2", "b"))
            .with_rule(Rule::new("r3", "c"))];

        let result = compare(&base, &compare_side);

        let s1 = &result.states[0];
        assert!(s1.changes.contains(&"Rule count changed: 2 → 3".to_string()));
        assert!(s1.changes.contains(&"1 rule(s) added".to_string()));
    }

    #[test]
    fn test_condition_mismatch_never_matches() {
        // Same target, different condition text: must be removed + added.
        let base = vec![
            State::new("1", "S1").with_rule(Rule::new("r1", "go").with_target("2")),
            State::new("2", "S2"),
        ];
        let compare_side = vec![
            State::new("1", "S1").with_rule(Rule::new("r1b", "halt").with_target("2")),
            State::new("2", "S2"),
        ];

        let result = compare(&base, &compare_side);

        assert_eq!(result.summary.removed_rules, 1);
        assert_eq!(result.summary.added_rules, 1);
        assert_eq!(result.summary.modified_rules, 0);
    }

    #[test]
    fn test_broken_reference_on_one_side_is_a_difference() {
        let base = vec![
            State::new("1", "S1").with_rule(Rule::new("r1", "go").with_target("2")),
            State::new("2", "S2"),
        ];
        // Same condition, but the target no longer resolves.
        let compare_side = vec![
            State::new("1", "S1").with_rule(Rule::new("r1", "go").with_target("missing"))
        ];

        let result = compare(&base, &compare_side);

        let s1 = &result.states[0];
        assert_eq!(s1.rules[0].status, ChangeStatus::Removed);
        assert!(s1
            .rules
            .iter()
            .any(|r| r.status == ChangeStatus::Added && r.target_name == UNKNOWN_TARGET));
    }

    #[test]
    fn test_both_sides_dangling_still_match() {
        let base = vec![State::new("1", "S1").with_rule(Rule::new("r1", "go").with_target("x"))];
        let compare_side =
            vec![State::new("1", "S1").with_rule(Rule::new("r9", "go").with_target("y"))];

        let result = compare(&base, &compare_side);
        assert!(!result.has_changes());
    }

    #[test]
    fn test_stable_id_match_reports_condition_change() {
        // Stable-origin ids match even when the condition was edited.
        let base = vec![
            State::new("1", "S1").with_rule(Rule::new("id_42", "old text").with_target("2")),
            State::new("2", "S2"),
        ];
        let compare_side = vec![
            State::new("1", "S1").with_rule(Rule::new("id_42", "new text").with_target("2")),
            State::new("2", "S2"),
        ];

        let result = compare(&base, &compare_side);

        let rule = &result.states[0].rules[0];
        assert_eq!(rule.status, ChangeStatus::Modified);
        assert!(rule
            .changes
            .iter()
            .any(|c| c.contains("Condition changed")));
    }

    #[test]
    fn test_filtering_is_anded() {
        let base = vec![
            State::new("1", "Login").with_rule(Rule::new("r1", "ok").with_target("2")),
            State::new("2", "Home"),
        ];
        let mut compare_side = base.clone();
        compare_side[0].rules[0].priority = Some(1);
        compare_side.push(State::new("3", "Logout"));

        let result = compare(&base, &compare_side);
        let entries = result.entries();

        let by_status = DiffFilter {
            status: Some(ChangeStatus::Modified),
            ..Default::default()
        };
        assert_eq!(by_status.apply(&entries).len(), 2); // state Login + its rule

        let rules_only = DiffFilter {
            status: Some(ChangeStatus::Modified),
            entity: Some(EntityKind::Rule),
            ..Default::default()
        };
        assert_eq!(rules_only.apply(&entries).len(), 1);

        let with_query = DiffFilter {
            status: Some(ChangeStatus::Modified),
            entity: Some(EntityKind::Rule),
            query: Some("LOGIN".to_string()),
        };
        assert_eq!(with_query.apply(&entries).len(), 1);

        let no_hit = DiffFilter {
            status: Some(ChangeStatus::Modified),
            entity: Some(EntityKind::Rule),
            query: Some("logout".to_string()),
        };
        assert!(no_hit.apply(&entries).is_empty());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ChangeStatus::Added.label(), "Added");
        assert_eq!(ChangeStatus::Modified.symbol(), "~");
        assert_eq!(ChangeStatus::Unchanged.to_string(), "Unchanged");
    }
}
