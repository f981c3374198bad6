//! Per-run trigger label consistency.
//!
//! Compares the distinct labels seen in a run with the set the task
//! protocol should produce.  The result is advisory: a mismatch is attached
//! to the outcome and logged, but never fails the conversion, since
//! partial sessions are legitimate.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::task::Task;
use crate::triggers::Event;

/// Union of all labels used across the six tasks, in protocol order.
/// `events.tsv` `value` codes are 1-based positions in this list.
pub const TRIGGER_LABELS: &[&str] = &[
    "startACQ",
    "CSminus",
    "CSplusUnpaired",
    "CSplusPaired",
    "Gen1",
    "Gen2",
    "Gen3",
    "Gen4",
    "Gen5",
    "Gen6",
    "Gen7",
    "USface",
    "WarningTrial",
    "acTrgBeep",
    "acTrgScream",
];

const AUDIO_BASE: &[&str] = &[
    "startACQ", "CSminus", "CSplusUnpaired", "Gen1", "Gen2", "Gen3", "Gen4", "Gen5", "Gen6",
    "Gen7", "USface", "WarningTrial", "acTrgBeep", "acTrgScream",
];
const AUDIO_COND: &[&str] = &[
    "startACQ", "CSminus", "CSplusUnpaired", "CSplusPaired", "USface", "acTrgBeep", "acTrgScream",
];
const AUDIO_TEST: &[&str] = &[
    "startACQ", "CSminus", "CSplusUnpaired", "CSplusPaired", "Gen1", "Gen2", "Gen3", "Gen4",
    "Gen5", "Gen6", "Gen7", "USface", "acTrgBeep", "acTrgScream",
];
const VISUAL_BASE: &[&str] = &[
    "startACQ", "CSminus", "CSplusUnpaired", "Gen1", "Gen2", "Gen3", "Gen4", "Gen5", "Gen6",
    "Gen7", "USface", "WarningTrial", "acTrgScream",
];
const VISUAL_COND: &[&str] = &[
    "startACQ", "CSminus", "CSplusUnpaired", "CSplusPaired", "USface", "acTrgScream",
];
const VISUAL_TEST: &[&str] = &[
    "startACQ", "CSminus", "CSplusUnpaired", "CSplusPaired", "Gen1", "Gen2", "Gen3", "Gen4",
    "Gen5", "Gen6", "Gen7", "USface", "acTrgScream",
];

/// Labels a run of `task` is expected to contain.
pub fn expected_labels(task: Task) -> &'static [&'static str] {
    match task {
        Task::AudioBase => AUDIO_BASE,
        Task::AudioCond => AUDIO_COND,
        Task::AudioTest => AUDIO_TEST,
        Task::VisualBase => VISUAL_BASE,
        Task::VisualCond => VISUAL_COND,
        Task::VisualTest => VISUAL_TEST,
    }
}

/// 1-based code of a label in [`TRIGGER_LABELS`].
pub fn label_code(label: &str) -> Option<usize> {
    TRIGGER_LABELS.iter().position(|l| *l == label).map(|i| i + 1)
}

/// Label → occurrence count, ordered by label.
pub type LabelCounts = BTreeMap<String, usize>;

pub fn count_labels(events: &[Event]) -> LabelCounts {
    let mut counts = LabelCounts::new();
    for ev in events {
        *counts.entry(ev.label.clone()).or_insert(0) += 1;
    }
    counts
}

/// Outcome of a label-set comparison for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub task: Task,
    /// Expected labels never observed (sorted).
    pub missing_expected: Vec<String>,
    /// Observed labels outside the expected set (sorted).
    pub unexpected_observed: Vec<String>,
    pub counts: LabelCounts,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_expected.is_empty() && self.unexpected_observed.is_empty()
    }

    pub fn total_events(&self) -> usize {
        self.counts.values().sum()
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} events", self.task, self.total_events())?;
        if !self.missing_expected.is_empty() {
            write!(f, "; missing {:?}", self.missing_expected)?;
        }
        if !self.unexpected_observed.is_empty() {
            write!(f, "; unexpected {:?}", self.unexpected_observed)?;
        }
        Ok(())
    }
}

/// Compare observed label counts against the task's expected set.
/// Labels with a zero count are treated as absent.
pub fn check(task: Task, observed: &LabelCounts) -> ConsistencyReport {
    let expected: BTreeSet<&str> = expected_labels(task).iter().copied().collect();
    let present: BTreeSet<&str> = observed
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(l, _)| l.as_str())
        .collect();

    ConsistencyReport {
        task,
        missing_expected: expected.difference(&present).map(|s| s.to_string()).collect(),
        unexpected_observed: present.difference(&expected).map(|s| s.to_string()).collect(),
        counts: observed.clone(),
    }
}

/// Convenience wrapper: count then check.
pub fn check_events(task: Task, events: &[Event]) -> ConsistencyReport {
    check(task, &count_labels(events))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(labels: &[&str]) -> LabelCounts {
        labels.iter().map(|l| (l.to_string(), 1)).collect()
    }

    #[test]
    fn exact_set_is_consistent() {
        let r = check(Task::AudioCond, &counts(AUDIO_COND));
        assert!(r.is_consistent());
        assert_eq!(r.total_events(), 7);
    }

    #[test]
    fn missing_label_reported() {
        let observed: Vec<&str> = AUDIO_COND.iter().copied().filter(|l| *l != "USface").collect();
        let r = check(Task::AudioCond, &counts(&observed));
        assert_eq!(r.missing_expected, ["USface"]);
        assert!(r.unexpected_observed.is_empty());
    }

    #[test]
    fn unexpected_label_reported() {
        let mut observed = counts(VISUAL_COND);
        observed.insert("acTrgBeep".into(), 3);
        let r = check(Task::VisualCond, &observed);
        assert!(r.missing_expected.is_empty());
        assert_eq!(r.unexpected_observed, ["acTrgBeep"]);
    }

    #[test]
    fn zero_count_is_absent() {
        let mut observed = counts(AUDIO_COND);
        observed.insert("startACQ".into(), 0);
        let r = check(Task::AudioCond, &observed);
        assert_eq!(r.missing_expected, ["startACQ"]);
    }

    #[test]
    fn empty_run_misses_everything() {
        let r = check(Task::VisualBase, &LabelCounts::new());
        assert_eq!(r.missing_expected.len(), VISUAL_BASE.len());
    }

    #[test]
    fn every_task_label_has_a_code() {
        for t in Task::ALL {
            for l in expected_labels(t) {
                assert!(label_code(l).is_some(), "{l}");
            }
        }
        assert_eq!(label_code("startACQ"), Some(1));
        assert_eq!(label_code("bogus"), None);
    }
}
