//! Attach Polhemus `.pos` headshape digitisations to a converted dataset.
//!
//! Runs after conversion.  For each subject the roster's `ibbid` column
//! names the `.pos` file; it is copied into every `meg/` directory of the
//! subject and the JSON sidecars there are updated to reference it.
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::Value;
use walkdir::WalkDir;

use crate::bids::dataset::{read_json, write_json};
use crate::error::{ConvertError, Result};
use crate::roster::Roster;

/// Roster column holding the Polhemus file prefix.
pub const IBBID_COLUMN: &str = "ibbid";

const ACQ_LABEL: &str = "HEAD";
const COORDINATE_SYSTEM: &str = "CTF";

/// Median absolute coordinate at or below which points are taken as cm.
const CM_MEDIAN_LIMIT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosUnits {
    Cm,
    Mm,
}

impl PosUnits {
    pub fn as_str(self) -> &'static str {
        match self {
            PosUnits::Cm => "cm",
            PosUnits::Mm => "mm",
        }
    }
}

impl fmt::Display for PosUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HeadshapeOptions {
    /// Prefer files without "face" in the name when both exist.
    pub prefer_non_face: bool,
    pub dry_run: bool,
}

impl Default for HeadshapeOptions {
    fn default() -> Self {
        Self { prefer_non_face: true, dry_run: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadshapeUpdate {
    pub subject: String,
    pub pos_file: String,
    pub units: PosUnits,
    pub targets: Vec<PathBuf>,
}

/// Per-subject results; failures never abort the pass.
#[derive(Debug, Clone, Default)]
pub struct HeadshapeReport {
    pub updated: Vec<HeadshapeUpdate>,
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

impl fmt::Display for HeadshapeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "headshape: {} updated, {} skipped, {} failed",
            self.updated.len(),
            self.skipped.len(),
            self.failed.len()
        )?;
        for u in &self.updated {
            writeln!(f, "  updated {}: {} ({})", u.subject, u.pos_file, u.units)?;
        }
        for (s, r) in &self.skipped {
            writeln!(f, "  skipped {s}: {r}")?;
        }
        for (s, r) in &self.failed {
            writeln!(f, "  failed  {s}: {r}")?;
        }
        Ok(())
    }
}

// ── File selection and parsing ───────────────────────────────────────────

/// `{ibbid}*.pos` in `pos_root`, newest first among the preferred names.
pub fn select_pos_file(ibbid: &str, pos_root: &Path, prefer_non_face: bool) -> Option<PathBuf> {
    if ibbid.is_empty() {
        return None;
    }
    let mut candidates: Vec<(PathBuf, SystemTime)> = WalkDir::new(pos_root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            name.starts_with(ibbid) && name.ends_with(".pos")
        })
        .map(|e| {
            let mtime = e
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (e.into_path(), mtime)
        })
        .collect();

    if prefer_non_face {
        let is_face = |p: &Path| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().to_lowercase().contains("face"))
        };
        if candidates.iter().any(|(p, _)| !is_face(p)) {
            candidates.retain(|(p, _)| !is_face(p));
        }
    }
    // Sorting by name first makes mtime ties deterministic.
    candidates.sort();
    candidates
        .into_iter()
        .max_by_key(|(_, t)| *t)
        .map(|(p, _)| p)
}

/// Last three numeric tokens of each line as xyz; shorter lines are ignored.
pub fn parse_pos_points(text: &str) -> Vec<[f64; 3]> {
    text.lines()
        .filter_map(|line| {
            let nums: Vec<f64> = line.split_whitespace().filter_map(|t| t.parse().ok()).collect();
            match nums.as_slice() {
                [.., x, y, z] => Some([*x, *y, *z]),
                _ => None,
            }
        })
        .collect()
}

/// Units from the median absolute coordinate; `None` for no points.
pub fn infer_units(points: &[[f64; 3]]) -> Option<PosUnits> {
    let mut mags: Vec<f64> = points.iter().flatten().map(|v| v.abs()).collect();
    if mags.is_empty() {
        return None;
    }
    mags.sort_by(|a, b| a.total_cmp(b));
    let n = mags.len();
    let median = if n % 2 == 1 { mags[n / 2] } else { (mags[n / 2 - 1] + mags[n / 2]) / 2.0 };
    Some(if median <= CM_MEDIAN_LIMIT { PosUnits::Cm } else { PosUnits::Mm })
}

// ── BIDS side ────────────────────────────────────────────────────────────

/// `meg/` directories of a subject: under each `ses-*` when sessions
/// exist, else the subject's own `meg/`.
pub fn collect_meg_dirs(bids_root: &Path, standard_id: &str) -> Vec<PathBuf> {
    let subject_dir = bids_root.join(format!("sub-{standard_id}"));
    let mut sessions: Vec<PathBuf> = WalkDir::new(&subject_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with("ses-"))
        .map(|e| e.into_path())
        .collect();
    sessions.sort();

    if !sessions.is_empty() {
        return sessions
            .into_iter()
            .map(|s| s.join("meg"))
            .filter(|m| m.is_dir())
            .collect();
    }
    let meg = subject_dir.join("meg");
    if meg.is_dir() {
        vec![meg]
    } else {
        Vec::new()
    }
}

/// Session label of a `ses-*/meg` directory, without the prefix.
pub fn session_of(meg_dir: &Path) -> Option<String> {
    let parent = meg_dir.parent()?.file_name()?.to_string_lossy();
    parent.strip_prefix("ses-").map(str::to_string)
}

/// `sub-001[_ses-01]_acq-HEAD_headshape.pos`
pub fn headshape_file_name(standard_id: &str, session: Option<&str>) -> String {
    let mut parts = vec![format!("sub-{standard_id}")];
    if let Some(s) = session {
        parts.push(format!("ses-{s}"));
    }
    parts.push(format!("acq-{ACQ_LABEL}"));
    parts.join("_") + "_headshape.pos"
}

fn files_ending(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name().to_string_lossy().ends_with(suffix))
        .map(|e| e.into_path())
        .collect();
    out.sort();
    out
}

fn update_json(path: &Path, edit: impl FnOnce(&mut serde_json::Map<String, Value>)) -> Result<()> {
    let mut doc = match read_json(path)? {
        Value::Object(m) => m,
        _ => serde_json::Map::new(),
    };
    edit(&mut doc);
    write_json(path, &Value::Object(doc))
}

fn attach_one(
    roster: &Roster,
    subject_id: &str,
    bids_root: &Path,
    pos_root: &Path,
    opts: &HeadshapeOptions,
    report: &mut HeadshapeReport,
) -> Result<()> {
    let subject = roster.get(roster.normalize_source_id(subject_id)?)?;
    let label = subject_id.to_string();

    let Some(ibbid) = subject.attribute(IBBID_COLUMN) else {
        report.failed.push((label, "missing ibbid".into()));
        return Ok(());
    };
    let Some(pos) = select_pos_file(ibbid, pos_root, opts.prefer_non_face) else {
        report.failed.push((label, format!("no .pos file for {ibbid}")));
        return Ok(());
    };
    let text = std::fs::read_to_string(&pos).map_err(|e| ConvertError::io(&pos, e))?;
    let Some(units) = infer_units(&parse_pos_points(&text)) else {
        report.failed.push((label, format!("no coordinate points in {}", pos.display())));
        return Ok(());
    };

    let meg_dirs = collect_meg_dirs(bids_root, &subject.standard_id);
    if meg_dirs.is_empty() {
        report.failed.push((label, "no MEG directory found".into()));
        return Ok(());
    }

    let mut targets = Vec::new();
    for meg_dir in &meg_dirs {
        let name = headshape_file_name(&subject.standard_id, session_of(meg_dir).as_deref());
        let dest = meg_dir.join(&name);

        let coords = files_ending(meg_dir, "_coordsystem.json");
        if coords.is_empty() {
            report.skipped.push((label.clone(), format!("no coordsystem JSON in {}", meg_dir.display())));
        }
        let megs = files_ending(meg_dir, "_meg.json");

        if opts.dry_run {
            tracing::info!(subject = %subject.source_id, from = %pos.display(), to = %dest.display(), "would copy headshape");
        } else {
            std::fs::copy(&pos, &dest).map_err(|e| ConvertError::io(&dest, e))?;
            for c in &coords {
                update_json(c, |doc| {
                    doc.insert("DigitizedHeadPoints".into(), Value::from(name.as_str()));
                    doc.insert("DigitizedHeadPointsCoordinateSystem".into(), Value::from(COORDINATE_SYSTEM));
                    doc.insert("DigitizedHeadPointsCoordinateUnits".into(), Value::from(units.as_str()));
                })?;
            }
            for m in &megs {
                update_json(m, |doc| {
                    doc.insert("DigitizedHeadPoints".into(), Value::Bool(true));
                })?;
            }
        }
        targets.push(dest);
    }

    report.updated.push(HeadshapeUpdate {
        subject: label,
        pos_file: pos
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        units,
        targets,
    });
    Ok(())
}

/// Attach headshapes for `subjects` (lab codes or standard ids).
///
/// Fails only when `pos_root` is missing or the roster has no `ibbid`
/// column; everything per-subject lands in the report.
pub fn attach_headshapes<S: AsRef<str>>(
    roster: &Roster,
    subjects: &[S],
    bids_root: &Path,
    pos_root: &Path,
    opts: &HeadshapeOptions,
) -> Result<HeadshapeReport> {
    if !pos_root.is_dir() {
        return Err(ConvertError::Config(format!(
            "Polhemus directory not found: {}",
            pos_root.display()
        )));
    }
    if !roster.columns().iter().any(|c| c == IBBID_COLUMN) {
        return Err(ConvertError::Config(format!("roster has no '{IBBID_COLUMN}' column")));
    }

    let mut report = HeadshapeReport::default();
    for sid in subjects {
        let sid = sid.as_ref();
        if let Err(e) = attach_one(roster, sid, bids_root, pos_root, opts, &mut report) {
            tracing::warn!(subject = sid, "headshape failed: {e}");
            report.failed.push((sid.to_string(), e.to_string()));
        }
    }
    tracing::info!(
        updated = report.updated.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        dry_run = opts.dry_run,
        "headshape pass done"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_take_last_three_numbers() {
        let pts = parse_pos_points("12\n1 nasion 0.5 9.1 -2.0\nlpa 7.0 1.0 0.0\n\nbad 1 2\n");
        assert_eq!(pts, vec![[0.5, 9.1, -2.0], [7.0, 1.0, 0.0]]);
    }

    #[test]
    fn units_from_median() {
        assert_eq!(infer_units(&[[1.0, -8.0, 10.0], [3.0, 2.0, 9.0]]), Some(PosUnits::Cm));
        assert_eq!(infer_units(&[[10.0, -80.0, 100.0], [30.0, 75.0, 90.0]]), Some(PosUnits::Mm));
        assert_eq!(infer_units(&[]), None);
    }

    #[test]
    fn headshape_names() {
        assert_eq!(headshape_file_name("001", None), "sub-001_acq-HEAD_headshape.pos");
        assert_eq!(headshape_file_name("001", Some("01")), "sub-001_ses-01_acq-HEAD_headshape.pos");
        assert_eq!(session_of(Path::new("/b/sub-001/ses-02/meg")).as_deref(), Some("02"));
        assert_eq!(session_of(Path::new("/b/sub-001/meg")), None);
    }

    #[test]
    fn selection_prefers_non_face() {
        let dir = tempfile::tempdir().unwrap();
        for n in ["A3120_face.pos", "A3120_head.pos", "A3121.pos", "A3120.txt"] {
            std::fs::write(dir.path().join(n), "1 2 3\n").unwrap();
        }
        let p = select_pos_file("A3120", dir.path(), true).unwrap();
        assert_eq!(p.file_name().unwrap(), "A3120_head.pos");
        assert!(select_pos_file("A9999", dir.path(), true).is_none());
        assert!(select_pos_file("", dir.path(), true).is_none());
    }
}
