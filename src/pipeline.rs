//! Batch orchestration over the subject × task matrix.
//!
//! Each (subject, task) unit moves through
//!
//! ```text
//! pending ─┬─► skipped-not-in-roster
//!          ├─► skipped-existing            (resume, only with skip_existing)
//!          └─► in-progress ─┬─► converted  (sink confirmed, consistency checked)
//!                           └─► failed     (reason recorded, batch continues)
//! ```
//!
//! I/O is delegated to a [`RecordingSource`] and a [`RecordingSink`], so the
//! whole state machine can be driven from memory in tests.
use std::fmt;
use std::path::{Path, PathBuf};

use crate::channels::{classify_all, ChannelEntry};
use crate::consistency::{check_events, ConsistencyReport};
use crate::ctf::{find_run, open_run, CtfRun};
use crate::error::Result;
use crate::roster::{Roster, Subject};
use crate::task::{resolve_run, RunNumber, Task};
use crate::triggers::{Event, TriggerCorrector};

// ── Collaborators ────────────────────────────────────────────────────────

/// Loads one run's header and event markers.
pub trait RecordingSource {
    fn load_run(&self, subject: &Subject, run: RunNumber) -> Result<CtfRun>;
}

/// Persists prepared recordings and the dataset-level files.
pub trait RecordingSink {
    /// Complete output for this unit already exists.
    fn exists(&self, subject: &Subject, task: Task) -> bool;

    /// Persist one unit; returns the files written.
    fn write(&mut self, run: &PreparedRun) -> Result<Vec<PathBuf>>;

    /// Called once after the loop with the lab codes (`C03`) that converted,
    /// whatever id form the caller passed in.
    fn finalize(&mut self, roster: &Roster, converted: &[String]) -> Result<()>;
}

/// Reads `.ds` runs from the raw CTF tree.
#[derive(Debug, Clone)]
pub struct CtfSource {
    raw_root: PathBuf,
}

impl CtfSource {
    pub fn new(raw_root: impl Into<PathBuf>) -> Self {
        Self { raw_root: raw_root.into() }
    }

    pub fn raw_root(&self) -> &Path {
        &self.raw_root
    }
}

impl RecordingSource for CtfSource {
    fn load_run(&self, subject: &Subject, run: RunNumber) -> Result<CtfRun> {
        let ds = find_run(&self.raw_root, &subject.source_id, run)?;
        tracing::debug!(subject = %subject.source_id, %run, ds = %ds.display(), "opening run");
        open_run(&ds, run)
    }
}

// ── Per-unit data ────────────────────────────────────────────────────────

/// A run after correction, classification and checking; what the sink writes.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub subject: Subject,
    pub task: Task,
    pub source: CtfRun,
    /// Channel roles in header order.
    pub channels: Vec<ChannelEntry>,
    /// Events after trigger correction.
    pub events: Vec<Event>,
    pub consistency: ConsistencyReport,
    /// Number of labels rewritten by the trigger corrector.
    pub relabelled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeStatus {
    Converted,
    SkippedNotInRoster,
    SkippedExisting,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Converted => "converted",
            OutcomeStatus::SkippedNotInRoster => "skipped-not-in-roster",
            OutcomeStatus::SkippedExisting => "skipped-existing",
            OutcomeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one unit of work.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    /// Subject id as requested.
    pub subject: String,
    /// Task name as requested.
    pub task: String,
    pub standard_id: Option<String>,
    pub run: Option<RunNumber>,
    pub status: OutcomeStatus,
    pub reason: Option<String>,
    pub consistency: Option<ConsistencyReport>,
    pub written: Vec<PathBuf>,
    pub dry_run: bool,
}

impl ConversionOutcome {
    fn new(subject: &str, task: &str, status: OutcomeStatus) -> Self {
        Self {
            subject: subject.to_string(),
            task: task.to_string(),
            standard_id: None,
            run: None,
            status,
            reason: None,
            consistency: None,
            written: Vec::new(),
            dry_run: false,
        }
    }

    pub fn is_converted(&self) -> bool {
        self.status == OutcomeStatus::Converted
    }

    /// Converted, but with a label-set mismatch to review.
    pub fn has_warning(&self) -> bool {
        self.consistency.as_ref().is_some_and(|c| !c.is_consistent())
    }
}

impl fmt::Display for ConversionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<22} {} {}", self.status.as_str(), self.subject, self.task)?;
        if let (Some(id), Some(run)) = (&self.standard_id, self.run) {
            write!(f, " (sub-{id}, run {run})")?;
        }
        if self.dry_run {
            f.write_str(" [dry run]")?;
        }
        if let Some(r) = &self.reason {
            write!(f, ": {r}")?;
        }
        Ok(())
    }
}

// ── Batch report ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ConversionOutcome>,
    /// Failure writing the dataset-level files, if any.
    pub finalize_error: Option<String>,
}

impl BatchReport {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn converted(&self) -> usize {
        self.count(OutcomeStatus::Converted)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::SkippedNotInRoster) + self.count(OutcomeStatus::SkippedExisting)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    /// Converted units whose label set did not match the task.
    pub fn warnings(&self) -> impl Iterator<Item = &ConversionOutcome> {
        self.outcomes.iter().filter(|o| o.has_warning())
    }

    pub fn find(&self, subject: &str, task: &str) -> Option<&ConversionOutcome> {
        self.outcomes.iter().find(|o| o.subject == subject && o.task == task)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} units: {} converted, {} skipped, {} failed",
            self.outcomes.len(),
            self.converted(),
            self.skipped(),
            self.failed()
        )?;
        for o in &self.outcomes {
            writeln!(f, "  {o}")?;
        }
        let warnings: Vec<&ConversionOutcome> = self.warnings().collect();
        if !warnings.is_empty() {
            writeln!(f, "consistency warnings:")?;
            for o in warnings {
                if let Some(c) = &o.consistency {
                    writeln!(f, "  {} {}: {c}", o.subject, o.task)?;
                }
            }
        }
        if let Some(e) = &self.finalize_error {
            writeln!(f, "dataset files: {e}")?;
        }
        Ok(())
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Sequential converter over a fixed roster.
pub struct Converter<'a, S, W> {
    roster: &'a Roster,
    corrector: TriggerCorrector,
    source: S,
    sink: W,
    dry_run: bool,
    skip_existing: bool,
}

impl<'a, S: RecordingSource, W: RecordingSink> Converter<'a, S, W> {
    /// Converter with the study's trigger corrections.
    pub fn new(roster: &'a Roster, source: S, sink: W) -> Self {
        Self {
            roster,
            corrector: TriggerCorrector::fgcm(),
            source,
            sink,
            dry_run: false,
            skip_existing: false,
        }
    }

    pub fn with_corrector(mut self, corrector: TriggerCorrector) -> Self {
        self.corrector = corrector;
        self
    }

    /// Run every step except the sink write.
    pub fn dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    /// Skip units whose output the sink reports as present.
    pub fn skip_existing(mut self, on: bool) -> Self {
        self.skip_existing = on;
        self
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    /// Whether this unit's output is already in the sink.
    pub fn is_converted(&self, subject_id: &str, task: Task) -> bool {
        self.roster
            .normalize_source_id(subject_id)
            .and_then(|id| self.roster.get(id))
            .is_ok_and(|s| self.sink.exists(s, task))
    }

    /// Load, correct, classify and check one run.
    pub fn prepare(&self, subject: &Subject, task: Task) -> Result<PreparedRun> {
        let run = resolve_run(task, subject.group);
        let source = self.source.load_run(subject, run)?;

        let before = source.events.clone();
        let events = self.corrector.correct(&subject.source_id, before);
        let relabelled = events
            .iter()
            .zip(&source.events)
            .filter(|(a, b)| a.label != b.label)
            .count();

        let channels = classify_all(&source.header.channel_names());
        let consistency = check_events(task, &events);

        Ok(PreparedRun {
            subject: subject.clone(),
            task,
            source,
            channels,
            events,
            consistency,
            relabelled,
        })
    }

    /// Convert one (subject, task) unit.  Never returns an error: every
    /// failure becomes a `failed` outcome.
    pub fn convert_unit(&mut self, subject_id: &str, task_name: &str) -> ConversionOutcome {
        let roster = self.roster;
        let Ok(subject) = roster
            .normalize_source_id(subject_id)
            .and_then(|id| roster.get(id))
        else {
            tracing::info!(subject = subject_id, task = task_name, "not in roster, skipped");
            return ConversionOutcome::new(subject_id, task_name, OutcomeStatus::SkippedNotInRoster);
        };

        let mut outcome = ConversionOutcome::new(subject_id, task_name, OutcomeStatus::Failed);
        outcome.standard_id = Some(subject.standard_id.clone());
        outcome.dry_run = self.dry_run;

        let task: Task = match task_name.parse() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(subject = subject_id, task = task_name, "{e}");
                outcome.reason = Some(e.to_string());
                return outcome;
            }
        };
        outcome.run = Some(resolve_run(task, subject.group));

        if self.skip_existing && self.sink.exists(subject, task) {
            tracing::info!(subject = %subject.source_id, %task, "output exists, skipped");
            outcome.status = OutcomeStatus::SkippedExisting;
            return outcome;
        }

        let prepared = match self.prepare(subject, task) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(subject = %subject.source_id, %task, "failed: {e}");
                outcome.reason = Some(e.to_string());
                return outcome;
            }
        };

        if !prepared.consistency.is_consistent() {
            tracing::warn!(
                subject = %subject.source_id,
                %task,
                "label set mismatch: {}",
                prepared.consistency
            );
        }
        outcome.consistency = Some(prepared.consistency.clone());

        if !self.dry_run {
            match self.sink.write(&prepared) {
                Ok(written) => outcome.written = written,
                Err(e) => {
                    tracing::warn!(subject = %subject.source_id, %task, "write failed: {e}");
                    outcome.reason = Some(e.to_string());
                    return outcome;
                }
            }
        }

        tracing::info!(
            subject = %subject.source_id,
            bids = %subject.bids_label(),
            %task,
            run = %prepared.source.run,
            events = prepared.events.len(),
            relabelled = prepared.relabelled,
            dry_run = self.dry_run,
            "converted"
        );
        outcome.status = OutcomeStatus::Converted;
        outcome
    }

    /// Convert every subject × task pair, subjects outermost, then write the
    /// dataset-level files (skipped in dry run).
    pub fn run_batch<I, T>(&mut self, subjects: &[I], tasks: &[T]) -> BatchReport
    where
        I: AsRef<str>,
        T: AsRef<str>,
    {
        let mut report = BatchReport::default();
        for sid in subjects {
            for task in tasks {
                report.outcomes.push(self.convert_unit(sid.as_ref(), task.as_ref()));
            }
        }

        if !self.dry_run {
            let mut converted: Vec<String> = Vec::new();
            for o in report.outcomes.iter().filter(|o| o.is_converted()) {
                let Ok(id) = self.roster.normalize_source_id(&o.subject) else { continue };
                if !converted.iter().any(|c| c == id) {
                    converted.push(id.to_string());
                }
            }
            if let Err(e) = self.sink.finalize(self.roster, &converted) {
                tracing::error!("writing dataset files failed: {e}");
                report.finalize_error = Some(e.to_string());
            }
        }

        tracing::info!(
            converted = report.converted(),
            skipped = report.skipped(),
            failed = report.failed(),
            warnings = report.warnings().count(),
            "batch done"
        );
        report
    }
}
