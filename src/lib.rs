//! # ctf2bids: CTF MEG to BIDS conversion
//!
//! `ctf2bids` converts a multi-subject, multi-run CTF MEG study into a
//! [BIDS](https://bids.neuroimaging.io) dataset.  Subjects get positional
//! standard ids, each task is located through the A/B counterbalancing
//! table, known trigger-label defects are corrected, auxiliary channels are
//! classified, and every run's label set is checked against its task before
//! it is written.
//!
//! ## Pipeline overview
//!
//! ```text
//! roster.csv ─► Roster (C03 ↔ 003, group)
//!   │
//!   for subject × task:
//!   ├─ task::resolve_run()        (task, group) → run 01–06
//!   ├─ ctf::find_run/open_run     {raw}/C03/C03-1/*_NN.ds → res4 + markers
//!   ├─ TriggerCorrector           Gen1↔Gen7, Gen2↔Gen6, Gen3↔Gen5 for C03/C04
//!   ├─ channels::classify_all     ECG / eyegaze / pupil / stim / unclassified
//!   ├─ consistency::check         expected vs. observed labels (advisory)
//!   └─ BidsWriter                 sub-003/meg/sub-003_task-audiotest_*
//!        │
//!        └─► BatchReport           converted / skipped / failed + warnings
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use ctf2bids::{convert, ConversionConfig, RosterSchema, Task};
//!
//! let cfg = ConversionConfig {
//!     raw_root:  "/data/FGCM_MEG_RAW".into(),
//!     bids_root: "/data/FGCM_BIDS".into(),
//!     dry_run:   true,
//!     ..ConversionConfig::default()
//! };
//! let report = convert(&cfg, &RosterSchema::default(), &["C03"], &Task::ALL).unwrap();
//! print!("{report}");
//! ```
//!
//! ## Running individual steps
//!
//! Every step is a plain function or value type and can be used alone:
//!
//! ```
//! use ctf2bids::{classify, resolve_run, ChannelRole, Event, Group, RunNumber, Task, TriggerCorrector};
//!
//! assert_eq!(resolve_run(Task::AudioTest, Group::B).get(), 6);
//! assert_eq!(classify("UADC007-4408"), ChannelRole::Pupil);
//!
//! let run = RunNumber::new(3).unwrap();
//! let fixed = TriggerCorrector::fgcm().correct("C03", vec![Event::new("Gen1", 0, run)]);
//! assert_eq!(fixed[0].label, "Gen7");
//! ```

pub mod bids;
pub mod channels;
pub mod config;
pub mod consistency;
pub mod ctf;
pub mod error;
pub mod headshape;
pub mod pipeline;
pub mod roster;
pub mod task;
pub mod triggers;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{ConversionConfig, RosterSchema};

// error
pub use error::{ConvertError, Result};

// roster
pub use roster::{Group, Roster, Subject};

// task
pub use task::{resolve_run, task_for_run, RunNumber, Task};

// channels
pub use channels::{classify, classify_all, ChannelEntry, ChannelRole};

// triggers
pub use triggers::{CorrectionRule, Event, TriggerCorrector};

// consistency
pub use consistency::{check, check_events, count_labels, ConsistencyReport, LabelCounts};

// pipeline
pub use pipeline::{
    BatchReport, ConversionOutcome, Converter, CtfSource, OutcomeStatus, PreparedRun,
    RecordingSink, RecordingSource,
};

// bids
pub use bids::{BidsPath, BidsWriter};

// headshape
pub use headshape::{attach_headshapes, HeadshapeOptions, HeadshapeReport};

/// Convert `subjects` × `tasks` with the filesystem source and BIDS writer.
///
/// Loads the roster from [`ConversionConfig::roster_path`], then runs the
/// batch.  Only configuration problems (unreadable or invalid roster)
/// return `Err`; every per-unit failure is recorded in the report.
///
/// `subjects` may be lab codes (`C03`) or standard ids (`003`); pass the
/// roster's own list to convert everyone.
pub fn convert<S: AsRef<str>>(
    cfg: &ConversionConfig,
    schema: &RosterSchema,
    subjects: &[S],
    tasks: &[Task],
) -> Result<BatchReport> {
    let roster = Roster::load(&cfg.roster_path, schema)?;
    tracing::info!(path = %cfg.roster_path.display(), subjects = roster.len(), "roster loaded");
    Ok(convert_with_roster(cfg, &roster, subjects, tasks))
}

/// Same as [`convert`] with an already loaded roster.
pub fn convert_with_roster<S: AsRef<str>>(
    cfg: &ConversionConfig,
    roster: &Roster,
    subjects: &[S],
    tasks: &[Task],
) -> BatchReport {
    let task_names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
    let mut conv = Converter::new(roster, CtfSource::new(&cfg.raw_root), BidsWriter::new(cfg))
        .dry_run(cfg.dry_run)
        .skip_existing(cfg.skip_existing);
    conv.run_batch(subjects, &task_names)
}
