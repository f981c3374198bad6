//! Event markers and per-subject trigger correction.
//!
//! Two FGCM subjects (C03, C04) were recorded with the generalisation
//! stimulus triggers in reverse order: what was logged as `Gen1` was the
//! `Gen7` stimulus, and so on.  The fix is a label permutation made of
//! disjoint swaps, so it is its own inverse and must run exactly once per
//! recording:
//!
//! ```text
//! Gen1 ↔ Gen7   Gen2 ↔ Gen6   Gen3 ↔ Gen5   Gen4 fixed
//! ```
//!
//! Rules are attached to subjects by identity through [`TriggerCorrector`],
//! so a future defective subject only needs a new table entry.
use std::collections::HashMap;

use crate::task::RunNumber;

/// Subjects recorded with reversed generalisation triggers.
pub const INVERTED_TRIGGER_SUBJECTS: &[&str] = &["C03", "C04"];

/// Swap pairs of the generalisation-gradient correction.
pub const GEN_SWAP_PAIRS: &[(&str, &str)] = &[("Gen1", "Gen7"), ("Gen2", "Gen6"), ("Gen3", "Gen5")];

/// One marker occurrence in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub label: String,
    /// Sample index from the start of the recording.
    pub onset_sample: u64,
    pub run: RunNumber,
}

impl Event {
    pub fn new(label: impl Into<String>, onset_sample: u64, run: RunNumber) -> Self {
        Self { label: label.into(), onset_sample, run }
    }
}

// ── CorrectionRule ───────────────────────────────────────────────────────

/// A symmetric label permutation built from disjoint swap pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionRule {
    name: String,
    partner: HashMap<String, String>,
}

impl CorrectionRule {
    /// Build a rule from swap pairs.  Returns `None` if a label appears in
    /// more than one pair (the permutation would not be self-inverse).
    pub fn from_swaps(name: impl Into<String>, pairs: &[(&str, &str)]) -> Option<Self> {
        let mut partner = HashMap::with_capacity(pairs.len() * 2);
        for &(a, b) in pairs {
            if a == b {
                continue;
            }
            if partner.contains_key(a) || partner.contains_key(b) {
                return None;
            }
            partner.insert(a.to_string(), b.to_string());
            partner.insert(b.to_string(), a.to_string());
        }
        Some(Self { name: name.into(), partner })
    }

    /// The FGCM generalisation swap (Gen1↔Gen7, Gen2↔Gen6, Gen3↔Gen5).
    pub fn gen_swap() -> Self {
        Self::from_swaps("gen-swap", GEN_SWAP_PAIRS).expect("GEN_SWAP_PAIRS are disjoint")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image of `label` under the permutation.
    pub fn map<'a>(&'a self, label: &'a str) -> &'a str {
        self.partner.get(label).map(String::as_str).unwrap_or(label)
    }

    /// `true` if the rule moves `label`.
    pub fn touches(&self, label: &str) -> bool {
        self.partner.contains_key(label)
    }

    /// Relabel events in place; returns how many labels changed.
    pub fn apply(&self, events: &mut [Event]) -> usize {
        let mut changed = 0;
        for ev in events.iter_mut() {
            if let Some(p) = self.partner.get(&ev.label) {
                ev.label = p.clone();
                changed += 1;
            }
        }
        changed
    }
}

// ── TriggerCorrector ─────────────────────────────────────────────────────

/// Subject id → correction rule.
#[derive(Debug, Clone, Default)]
pub struct TriggerCorrector {
    rules: Vec<CorrectionRule>,
    by_subject: HashMap<String, usize>,
}

impl TriggerCorrector {
    /// No corrections at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// FGCM policy: Gen swap for C03 and C04.
    pub fn fgcm() -> Self {
        Self::empty().with_rule(CorrectionRule::gen_swap(), INVERTED_TRIGGER_SUBJECTS)
    }

    /// Attach `rule` to each listed subject (a later rule replaces an earlier one).
    pub fn with_rule<S: AsRef<str>>(mut self, rule: CorrectionRule, subjects: &[S]) -> Self {
        let idx = self.rules.len();
        self.rules.push(rule);
        for s in subjects {
            self.by_subject.insert(s.as_ref().to_string(), idx);
        }
        self
    }

    pub fn rule_for(&self, subject: &str) -> Option<&CorrectionRule> {
        self.by_subject.get(subject).map(|&i| &self.rules[i])
    }

    pub fn is_affected(&self, subject: &str) -> bool {
        self.by_subject.contains_key(subject)
    }

    /// Apply the subject's rule, if any.  Unaffected subjects get their
    /// events back untouched.
    pub fn correct(&self, subject: &str, mut events: Vec<Event>) -> Vec<Event> {
        if let Some(rule) = self.rule_for(subject) {
            let changed = rule.apply(&mut events);
            tracing::debug!(subject, rule = rule.name(), changed, "trigger labels corrected");
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> RunNumber {
        RunNumber::new(3).unwrap()
    }

    fn gens() -> Vec<Event> {
        (1..=7).map(|i| Event::new(format!("Gen{i}"), i * 100, run())).collect()
    }

    fn labels(evs: &[Event]) -> Vec<&str> {
        evs.iter().map(|e| e.label.as_str()).collect()
    }

    #[test]
    fn affected_subject_gets_reversed_gen_labels() {
        let c = TriggerCorrector::fgcm();
        let out = c.correct("C03", gens());
        assert_eq!(labels(&out), ["Gen7", "Gen6", "Gen5", "Gen4", "Gen3", "Gen2", "Gen1"]);
        let onsets: Vec<u64> = out.iter().map(|e| e.onset_sample).collect();
        assert_eq!(onsets, [100, 200, 300, 400, 500, 600, 700]);
    }

    #[test]
    fn correction_twice_restores_original() {
        let c = TriggerCorrector::fgcm();
        let once = c.correct("C04", gens());
        let twice = c.correct("C04", once);
        assert_eq!(twice, gens());
    }

    #[test]
    fn unaffected_subject_is_identity() {
        let c = TriggerCorrector::fgcm();
        let mut input = gens();
        input.push(Event::new("CSminus", 900, run()));
        assert_eq!(c.correct("C01", input.clone()), input);
        assert_eq!(c.correct("C33", input.clone()), input);
    }

    #[test]
    fn non_gen_labels_pass_through() {
        let c = TriggerCorrector::fgcm();
        let input = vec![Event::new("startACQ", 0, run()), Event::new("USface", 10, run())];
        assert_eq!(c.correct("C03", input.clone()), input);
    }

    #[test]
    fn overlapping_pairs_are_rejected() {
        assert!(CorrectionRule::from_swaps("bad", &[("A", "B"), ("B", "C")]).is_none());
        let ok = CorrectionRule::from_swaps("gen", GEN_SWAP_PAIRS).unwrap();
        assert_eq!(ok.map("Gen2"), "Gen6");
        assert_eq!(ok.map("Gen4"), "Gen4");
        assert!(!ok.touches("Gen4"));
    }

    #[test]
    fn gen_swap_is_the_validated_pair_table() {
        let rule = CorrectionRule::gen_swap();
        assert_eq!(rule.name(), "gen-swap");
        let moved = (1..=7).filter(|i| rule.touches(&format!("Gen{i}"))).count();
        assert_eq!(moved, 6);
        assert_eq!(rule.map("Gen1"), "Gen7");
        assert_eq!(rule.map("Gen5"), "Gen3");
    }

    #[test]
    fn custom_rule_for_new_subject() {
        let rule = CorrectionRule::from_swaps("cs", &[("CSplusPaired", "CSplusUnpaired")]).unwrap();
        let c = TriggerCorrector::fgcm().with_rule(rule, &["C10"]);
        let out = c.correct("C10", vec![Event::new("CSplusPaired", 5, run())]);
        assert_eq!(out[0].label, "CSplusUnpaired");
        assert!(c.is_affected("C03"));
    }
}
