//! Locating and opening CTF `.ds` run directories.
//!
//! Raw layout: `{raw_root}/{sid}/{sid}-1/<anything>_NN.ds`, one directory
//! per run.  Only the trailing `_NN` is interpreted; the rest of the name
//! is ignored.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ConvertError, Result};
use crate::task::RunNumber;
use crate::triggers::Event;

use super::markers::{marker_path, MarkerFile, TrialTiming};
use super::res4::Res4Header;

fn run_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_(\d+)\.ds$").expect("static run-suffix regex"))
}

/// `{raw_root}/{sid}/{sid}-1`
pub fn subject_session_dir(raw_root: &Path, source_id: &str) -> PathBuf {
    raw_root.join(source_id).join(format!("{source_id}-1"))
}

/// Run number encoded in a `.ds` directory name, if any.
pub fn run_number_of(name: &str) -> Option<u32> {
    run_suffix()
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// All `.ds` entries of a session directory grouped by run number.
pub fn list_runs(dir: &Path) -> Result<BTreeMap<u32, Vec<PathBuf>>> {
    let mut runs: BTreeMap<u32, Vec<PathBuf>> = BTreeMap::new();
    let entries = std::fs::read_dir(dir).map_err(|e| ConvertError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ConvertError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(n) = run_number_of(&name) {
            runs.entry(n).or_default().push(entry.path());
        }
    }
    for paths in runs.values_mut() {
        paths.sort();
    }
    Ok(runs)
}

/// Find the `.ds` directory holding `run` for a subject.
pub fn find_run(raw_root: &Path, source_id: &str, run: RunNumber) -> Result<PathBuf> {
    let dir = subject_session_dir(raw_root, source_id);
    let missing = |detail: String| ConvertError::MissingRunData {
        subject: source_id.to_string(),
        run: run.to_string(),
        dir: dir.clone(),
        detail,
    };
    if !dir.is_dir() {
        return Err(missing("subject directory not found".into()));
    }

    let mut runs = list_runs(&dir)?;
    if runs.is_empty() {
        return Err(missing("no .ds recordings".into()));
    }
    let key = run.get() as u32;
    match runs.remove(&key) {
        Some(mut paths) if paths.len() == 1 => Ok(paths.remove(0)),
        Some(paths) if paths.len() > 1 => Err(ConvertError::AmbiguousRunData {
            subject: source_id.to_string(),
            run: run.to_string(),
            candidates: file_names(&paths),
        }),
        _ => {
            let available: Vec<PathBuf> = runs.into_values().flatten().collect();
            Err(missing(format!(
                "no recording for this run; available: {}",
                file_names(&available).join(", ")
            )))
        }
    }
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

/// `<stem>.res4` inside a `.ds`, falling back to the only `.res4` present.
pub fn res4_path(ds: &Path) -> Result<PathBuf> {
    let stem = ds
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let direct = ds.join(format!("{stem}.res4"));
    if direct.is_file() {
        return Ok(direct);
    }
    let entries = std::fs::read_dir(ds).map_err(|e| ConvertError::io(ds, e))?;
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|x| x == "res4"))
        .collect();
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(ConvertError::Header { path: ds.to_path_buf(), reason: "no .res4 file in dataset".into() }),
        n => Err(ConvertError::Header { path: ds.to_path_buf(), reason: format!("{n} .res4 files in dataset") }),
    }
}

/// A run opened from disk: header, markers and the events they produce.
#[derive(Debug, Clone)]
pub struct CtfRun {
    pub path: PathBuf,
    pub run: RunNumber,
    pub header: Res4Header,
    pub markers: MarkerFile,
    pub events: Vec<Event>,
}

impl CtfRun {
    pub fn timing(&self) -> TrialTiming {
        TrialTiming::from(&self.header)
    }
}

/// Read header and markers of one `.ds`.  A dataset without a marker file
/// yields zero events.
pub fn open_run(ds: &Path, run: RunNumber) -> Result<CtfRun> {
    let header = Res4Header::read(&res4_path(ds)?)?;
    let mrk = marker_path(ds);
    let markers = if mrk.is_file() {
        MarkerFile::read(&mrk)?
    } else {
        tracing::debug!(path = %ds.display(), "no marker file");
        MarkerFile::default()
    };
    let events = markers.events(&TrialTiming::from(&header), run, &mrk)?;
    Ok(CtfRun { path: ds.to_path_buf(), run, header, markers, events })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_suffix_parsing() {
        assert_eq!(run_number_of("C03_FGCM_20190412_03.ds"), Some(3));
        assert_eq!(run_number_of("x_6.ds"), Some(6));
        assert_eq!(run_number_of("C03_FGCM.ds"), None);
        assert_eq!(run_number_of("C03_03.ds.bak"), None);
    }

    #[test]
    fn session_dir_layout() {
        let p = subject_session_dir(Path::new("/raw"), "C03");
        assert_eq!(p, Path::new("/raw/C03/C03-1"));
    }
}
