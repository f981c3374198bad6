//! Task enumeration and the A/B run randomisation table.
//!
//! Each subject recorded six runs.  Group A did the auditory block first,
//! group B the visual block first:
//!
//! ```text
//! run   group A        group B
//! 01    audio_base     visual_base
//! 02    audio_cond     visual_cond
//! 03    audio_test     visual_test
//! 04    visual_base    audio_base
//! 05    visual_cond    audio_cond
//! 06    visual_test    audio_test
//! ```
//!
//! Irregular subjects would get explicit entries here.
use std::fmt;
use std::str::FromStr;

use crate::error::ConvertError;
use crate::roster::Group;

// ── Task ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    AudioBase,
    AudioCond,
    AudioTest,
    VisualBase,
    VisualCond,
    VisualTest,
}

impl Task {
    /// All tasks in canonical order.
    pub const ALL: [Task; 6] = [
        Task::AudioBase,
        Task::AudioCond,
        Task::AudioTest,
        Task::VisualBase,
        Task::VisualCond,
        Task::VisualTest,
    ];

    /// Study name, e.g. `audio_test`.
    pub fn name(self) -> &'static str {
        match self {
            Task::AudioBase => "audio_base",
            Task::AudioCond => "audio_cond",
            Task::AudioTest => "audio_test",
            Task::VisualBase => "visual_base",
            Task::VisualCond => "visual_cond",
            Task::VisualTest => "visual_test",
        }
    }

    /// BIDS `task-` label: the study name without underscores.
    pub fn bids_name(self) -> String {
        self.name().replace('_', "")
    }

    pub fn is_auditory(self) -> bool {
        matches!(self, Task::AudioBase | Task::AudioCond | Task::AudioTest)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Task {
    type Err = ConvertError;

    /// Accepts the study name (`audio_test`) or the BIDS label (`audiotest`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Task::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s || t.bids_name() == s)
            .ok_or_else(|| ConvertError::InvalidTask(s.to_string()))
    }
}

// ── RunNumber ────────────────────────────────────────────────────────────

/// Source run slot, 1–6; displayed as two digits (`03`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunNumber(u8);

impl RunNumber {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 6;

    pub fn new(n: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&n).then_some(RunNumber(n))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for RunNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

// ── Resolver ─────────────────────────────────────────────────────────────

/// `(task, group)` → source run.  Total over the declared domain.
pub fn resolve_run(task: Task, group: Group) -> RunNumber {
    let n = match (task, group) {
        (Task::AudioBase, Group::A) => 1,
        (Task::AudioCond, Group::A) => 2,
        (Task::AudioTest, Group::A) => 3,
        (Task::VisualBase, Group::A) => 4,
        (Task::VisualCond, Group::A) => 5,
        (Task::VisualTest, Group::A) => 6,
        (Task::VisualBase, Group::B) => 1,
        (Task::VisualCond, Group::B) => 2,
        (Task::VisualTest, Group::B) => 3,
        (Task::AudioBase, Group::B) => 4,
        (Task::AudioCond, Group::B) => 5,
        (Task::AudioTest, Group::B) => 6,
    };
    RunNumber(n)
}

/// String-keyed variant for callers holding raw task names.
pub fn resolve_run_by_name(task: &str, group: Group) -> Result<RunNumber, ConvertError> {
    Ok(resolve_run(task.parse()?, group))
}

/// Inverse lookup: which task a group recorded in a given run slot.
/// `None` if no task of that group maps to `run`.
pub fn task_for_run(group: Group, run: RunNumber) -> Option<Task> {
    Task::ALL.iter().copied().find(|&t| resolve_run(t, group) == run)
}
