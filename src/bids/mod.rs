//! BIDS output: file naming, sidecars and dataset-level files.
//!
//! ```text
//! {root}/
//! ├── dataset_description.json
//! ├── participants.tsv
//! ├── participants.json
//! └── sub-003/meg/
//!     ├── sub-003_coordsystem.json
//!     ├── sub-003_task-audiotest_meg.ds/
//!     ├── sub-003_task-audiotest_meg.json
//!     ├── sub-003_task-audiotest_channels.tsv
//!     └── sub-003_task-audiotest_events.tsv
//! ```
pub mod dataset;
pub mod sidecar;
pub mod writer;

use std::path::{Path, PathBuf};

use crate::task::Task;

pub use dataset::{
    participants_tsv, update_participants_json, write_dataset_description, write_participants, DatasetDescription,
};
pub use sidecar::{bids_channel_type, channels_tsv, events_tsv, CoordSystemJson, MegJson};
pub use writer::BidsWriter;

pub const BIDS_VERSION: &str = "1.8.0";

pub const SUFFIX_MEG_DS: &str = "meg.ds";
pub const SUFFIX_MEG_JSON: &str = "meg.json";
pub const SUFFIX_CHANNELS: &str = "channels.tsv";
pub const SUFFIX_EVENTS: &str = "events.tsv";

/// Location of one subject/task recording inside a BIDS root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsPath {
    pub root: PathBuf,
    /// Standard id without the `sub-` prefix.
    pub subject: String,
    pub task: Task,
}

impl BidsPath {
    pub fn new(root: impl Into<PathBuf>, subject: impl Into<String>, task: Task) -> Self {
        Self { root: root.into(), subject: subject.into(), task }
    }

    pub fn subject_dir(&self) -> PathBuf {
        self.root.join(format!("sub-{}", self.subject))
    }

    pub fn meg_dir(&self) -> PathBuf {
        self.subject_dir().join("meg")
    }

    /// `sub-003_task-audiotest`
    pub fn basename(&self) -> String {
        format!("sub-{}_task-{}", self.subject, self.task.bids_name())
    }

    /// `{meg_dir}/sub-003_task-audiotest_{suffix}`
    pub fn file(&self, suffix: &str) -> PathBuf {
        self.meg_dir().join(format!("{}_{suffix}", self.basename()))
    }

    pub fn coordsystem(&self) -> PathBuf {
        self.meg_dir().join(format!("sub-{}_coordsystem.json", self.subject))
    }

    /// Path relative to the BIDS root, `/`-separated, for manifests.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}
