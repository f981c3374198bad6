//! Filesystem [`RecordingSink`] producing a BIDS tree.
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::ConversionConfig;
use crate::ctf::{anonymize_ds, marker_path, MarkerFile, MARKER_FILE_NAME};
use crate::error::{ConvertError, Result};
use crate::pipeline::{PreparedRun, RecordingSink};
use crate::roster::{Roster, Subject};
use crate::task::Task;

use super::dataset::{write_dataset_description, write_json, write_participants, DatasetDescription};
use super::sidecar::{channels_tsv, events_tsv, CoordSystemJson, MegJson};
use super::{BidsPath, SUFFIX_CHANNELS, SUFFIX_EVENTS, SUFFIX_MEG_DS, SUFFIX_MEG_JSON};

/// Files that make up one converted unit.  A unit counts as written only
/// when all of them are present.
pub const UNIT_SUFFIXES: [&str; 4] = [SUFFIX_MEG_DS, SUFFIX_CHANNELS, SUFFIX_EVENTS, SUFFIX_MEG_JSON];

#[derive(Debug, Clone)]
pub struct BidsWriter {
    root: PathBuf,
    line_freq: f64,
    overwrite: bool,
    days_back: Option<u32>,
    description: DatasetDescription,
}

impl BidsWriter {
    pub fn new(cfg: &ConversionConfig) -> Self {
        Self {
            root: cfg.bids_root.clone(),
            line_freq: cfg.line_freq,
            overwrite: cfg.overwrite,
            days_back: cfg.days_back,
            description: DatasetDescription::from_config(cfg),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, subject: &Subject, task: Task) -> BidsPath {
        BidsPath::new(&self.root, subject.standard_id.clone(), task)
    }

    fn write_file(path: &Path, contents: &str) -> Result<()> {
        std::fs::write(path, contents).map_err(|e| ConvertError::io(path, e))
    }

    /// Write every file of one unit, recording each path in `written` as it
    /// lands so a failure can be rolled back.
    fn write_unit(&self, run: &PreparedRun, bp: &BidsPath, written: &mut Vec<PathBuf>) -> Result<()> {
        let ds = bp.file(SUFFIX_MEG_DS);
        written.push(ds.clone());
        copy_ds(&run.source.path, &ds)?;

        if let Some(days_back) = self.days_back {
            let applied = anonymize_ds(&ds, days_back)?;
            tracing::debug!(unit = %bp.basename(), ?applied, "measurement date shifted");
        }

        // Corrected labels replace the raw marker file inside the copy.
        if !run.events.is_empty() || !run.source.markers.classes.is_empty() {
            let mrk = MarkerFile::from_events(&run.events, &run.source.timing(), &run.source.markers);
            mrk.write(&marker_path(&ds))?;
        }

        let header = &run.source.header;
        let channels = bp.file(SUFFIX_CHANNELS);
        Self::write_file(&channels, &channels_tsv(header, &run.channels))?;
        written.push(channels);

        let events = bp.file(SUFFIX_EVENTS);
        Self::write_file(&events, &events_tsv(&run.events, header.sfreq))?;
        written.push(events);

        let meg_json = bp.file(SUFFIX_MEG_JSON);
        let sidecar = MegJson::new(run.task, header, &run.channels, self.line_freq);
        write_json(&meg_json, &serde_json::to_value(&sidecar)?)?;
        written.push(meg_json);

        // Shared by all tasks of a subject; headshape attachment edits it later.
        let coords = bp.coordsystem();
        if !coords.exists() {
            write_json(&coords, &serde_json::to_value(CoordSystemJson::default())?)?;
            written.push(coords);
        }
        Ok(())
    }
}

/// Remove what a failed unit left behind.
fn discard(paths: &[PathBuf]) {
    for p in paths {
        let res = if p.is_dir() { std::fs::remove_dir_all(p) } else { std::fs::remove_file(p) };
        match res {
            Ok(()) => tracing::debug!(path = %p.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %p.display(), "could not remove partial output: {e}"),
        }
    }
}

impl RecordingSink for BidsWriter {
    fn exists(&self, subject: &Subject, task: Task) -> bool {
        let bp = self.path_for(subject, task);
        UNIT_SUFFIXES.iter().all(|&s| {
            let p = bp.file(s);
            if s == SUFFIX_MEG_DS { p.is_dir() } else { p.is_file() }
        })
    }

    fn write(&mut self, run: &PreparedRun) -> Result<Vec<PathBuf>> {
        let bp = self.path_for(&run.subject, run.task);
        let meg_dir = bp.meg_dir();
        std::fs::create_dir_all(&meg_dir).map_err(|e| ConvertError::io(&meg_dir, e))?;

        let ds = bp.file(SUFFIX_MEG_DS);
        if ds.exists() {
            if self.exists(&run.subject, run.task) && !self.overwrite {
                return Err(ConvertError::OutputExists(ds));
            }
            tracing::debug!(path = %ds.display(), "replacing previous output");
            std::fs::remove_dir_all(&ds).map_err(|e| ConvertError::io(&ds, e))?;
        }

        let mut written = Vec::new();
        if let Err(e) = self.write_unit(run, &bp, &mut written) {
            discard(&written);
            return Err(e);
        }
        tracing::debug!(unit = %bp.basename(), files = written.len(), "bids unit written");
        Ok(written)
    }

    fn finalize(&mut self, roster: &Roster, converted: &[String]) -> Result<()> {
        write_dataset_description(&self.root, &self.description)?;
        write_participants(&self.root, roster)?;
        tracing::info!(
            root = %self.root.display(),
            participants = roster.len(),
            converted = converted.len(),
            "dataset files written"
        );
        Ok(())
    }
}

/// Recursive copy of a `.ds` directory.  Files named after the source
/// dataset (`<stem>.res4`, `<stem>.meg4`, …) are renamed to the target stem
/// so CTF readers still find them.
pub fn copy_ds(src: &Path, dst: &Path) -> Result<()> {
    let src_stem = stem_of(src);
    let dst_stem = stem_of(dst);

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            ConvertError::io(path, e.into())
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let mut target = dst.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| ConvertError::io(&target, e))?;
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name != MARKER_FILE_NAME {
            if let Some(ext) = name.strip_prefix(src_stem.as_str()).and_then(|r| r.strip_prefix('.')) {
                target.set_file_name(format!("{dst_stem}.{ext}"));
            }
        }
        std::fs::copy(entry.path(), &target).map_err(|e| ConvertError::io(entry.path(), e))?;
    }
    Ok(())
}

fn stem_of(ds: &Path) -> String {
    ds.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_renames_dataset_files() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("C03_FGCM_03.ds");
        std::fs::create_dir_all(src.join("hz.ds")).unwrap();
        std::fs::write(src.join("C03_FGCM_03.res4"), b"r").unwrap();
        std::fs::write(src.join("C03_FGCM_03.meg4"), b"m").unwrap();
        std::fs::write(src.join("MarkerFile.mrk"), b"k").unwrap();
        std::fs::write(src.join("hz.ds").join("hz.res4"), b"h").unwrap();

        let dst = tmp.path().join("sub-003_task-audiotest_meg.ds");
        copy_ds(&src, &dst).unwrap();
        assert!(dst.join("sub-003_task-audiotest_meg.res4").is_file());
        assert!(dst.join("sub-003_task-audiotest_meg.meg4").is_file());
        assert!(dst.join("MarkerFile.mrk").is_file());
        assert!(dst.join("hz.ds").join("hz.res4").is_file());
    }
}
