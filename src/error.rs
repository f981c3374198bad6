//! Error taxonomy for the conversion pipeline.
//!
//! Every per-unit failure is one of these variants; the orchestrator turns
//! them into a `failed` outcome with the rendered message as the reason.
//! Only [`ConvertError::Roster`] and [`ConvertError::Config`] may abort a
//! whole batch.
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Error, Debug)]
pub enum ConvertError {
    /// Subject id not present in the roster.
    #[error("unknown subject '{0}': not in roster")]
    UnknownSubject(String),

    /// Task name outside the fixed six-task enumeration.
    #[error("invalid task '{0}'")]
    InvalidTask(String),

    /// Expected run recording is absent on disk.
    #[error("missing run data for {subject} run {run} in {}: {detail}", .dir.display())]
    MissingRunData {
        subject: String,
        run: String,
        dir: PathBuf,
        detail: String,
    },

    /// More than one `.ds` directory claims the same run number.
    #[error("multiple recordings for {subject} run {run}: {}", .candidates.join(", "))]
    AmbiguousRunData {
        subject: String,
        run: String,
        candidates: Vec<String>,
    },

    /// Malformed `MarkerFile.mrk`.
    #[error("marker parse error in {} (line {line}): {reason}", .path.display())]
    MarkerParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Malformed or truncated `.res4` header.
    #[error("bad CTF header {}: {reason}", .path.display())]
    Header { path: PathBuf, reason: String },

    /// Output already present and overwrite is disabled.
    #[error("output already exists: {} (use --overwrite)", .0.display())]
    OutputExists(PathBuf),

    /// Roster unreadable or inconsistent (configuration-level).
    #[error("roster error: {0}")]
    Roster(String),

    /// Bad paths or options given to the batch (configuration-level).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io { path: path.into(), source }
    }

    /// `true` for errors that must abort the whole batch rather than a single unit.
    pub fn is_configuration_level(&self) -> bool {
        matches!(self, ConvertError::Roster(_) | ConvertError::Config(_))
    }
}
