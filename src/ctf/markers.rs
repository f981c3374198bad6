//! CTF `MarkerFile.mrk` reader and writer.
//!
//! The marker file is a line-oriented text format: a key line ending in
//! `:` followed by its value on the next line.  Each marker class starts at
//! `CLASSGROUPID:` and ends with a `LIST OF SAMPLES:` table of
//! `trial  time-from-sync-point` rows.
//!
//! ```text
//! CLASSGROUPID:
//! 3
//! NAME:
//! Gen1
//! …
//! NUMBER OF SAMPLES:
//! 2
//! LIST OF SAMPLES:
//! TRIAL NUMBER		TIME FROM SYNC POINT (in seconds)
//!                   +0				     +12.5000000000
//!                   +0				     +48.1250000000
//! ```
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{ConvertError, Result};
use crate::task::RunNumber;
use crate::triggers::Event;

use super::res4::Res4Header;

pub const MARKER_FILE_NAME: &str = "MarkerFile.mrk";

const DEFAULT_CLASS_GROUP: i32 = 3;
const DEFAULT_COLOR: &str = "blue";

/// One marker occurrence: trial index and seconds from that trial's sync point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerSample {
    pub trial: u32,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerClass {
    pub group_id: i32,
    pub name: String,
    pub comment: String,
    pub color: String,
    pub editable: bool,
    pub class_id: i32,
    pub samples: Vec<MarkerSample>,
}

impl MarkerClass {
    fn new(group_id: i32) -> Self {
        Self {
            group_id,
            name: String::new(),
            comment: String::new(),
            color: DEFAULT_COLOR.to_string(),
            editable: true,
            class_id: 0,
            samples: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkerFile {
    pub dataset_path: String,
    pub classes: Vec<MarkerClass>,
}

/// Sample geometry of a run, taken from the res4 header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialTiming {
    pub sfreq: f64,
    pub samples_per_trial: u32,
    pub pre_trigger: u32,
}

impl From<&Res4Header> for TrialTiming {
    fn from(h: &Res4Header) -> Self {
        Self {
            sfreq: h.sfreq,
            samples_per_trial: h.samples_per_trial,
            pre_trigger: h.pre_trigger,
        }
    }
}

impl TrialTiming {
    /// Absolute sample index of a marker; `None` if it falls before the recording.
    pub fn onset_sample(&self, s: MarkerSample) -> Option<u64> {
        let within = self.pre_trigger as i64 + (s.time * self.sfreq).round() as i64;
        let abs = s.trial as i64 * self.samples_per_trial as i64 + within;
        u64::try_from(abs).ok()
    }

    /// Inverse of [`TrialTiming::onset_sample`].
    pub fn marker_sample(&self, onset: u64) -> MarkerSample {
        let spt = self.samples_per_trial.max(1) as u64;
        let trial = (onset / spt) as u32;
        let within = (onset % spt) as i64 - self.pre_trigger as i64;
        MarkerSample { trial, time: within as f64 / self.sfreq }
    }
}

impl MarkerFile {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let err = |line: usize, reason: String| ConvertError::MarkerParse {
            path: path.to_path_buf(),
            line: line + 1,
            reason,
        };

        let mut out = MarkerFile::default();
        let mut declared: Option<usize> = None;
        // Declared NUMBER OF SAMPLES per class, checked when the list is read.
        let mut expected_samples: Vec<usize> = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let key = lines[i].trim();
            if key.is_empty() || !key.ends_with(':') {
                i += 1;
                continue;
            }
            let value = lines.get(i + 1).map(|v| v.trim()).unwrap_or("");
            match key {
                "PATH OF DATASET:" => out.dataset_path = value.to_string(),
                "NUMBER OF MARKERS:" => {
                    declared = Some(value.parse().map_err(|_| err(i + 1, format!("bad marker count '{value}'")))?);
                }
                "CLASSGROUPID:" => {
                    let g = value.parse().map_err(|_| err(i + 1, format!("bad class group '{value}'")))?;
                    out.classes.push(MarkerClass::new(g));
                    expected_samples.push(0);
                }
                "LIST OF SAMPLES:" => {
                    let (Some(class), Some(&n)) = (out.classes.last_mut(), expected_samples.last()) else {
                        return Err(err(i, "LIST OF SAMPLES outside a marker class".into()));
                    };
                    i = parse_sample_list(&lines, i + 1, class, n, &err)?;
                    continue;
                }
                _ => {
                    let (Some(class), Some(n_expected)) = (out.classes.last_mut(), expected_samples.last_mut())
                    else {
                        // Unknown top-level key; skip it with its value.
                        i += 2;
                        continue;
                    };
                    match key {
                        "NAME:" => class.name = value.to_string(),
                        "COMMENT:" => class.comment = value.to_string(),
                        "COLOR:" => class.color = value.to_string(),
                        "EDITABLE:" => class.editable = value.eq_ignore_ascii_case("yes"),
                        "CLASSID:" => {
                            class.class_id =
                                value.parse().map_err(|_| err(i + 1, format!("bad class id '{value}'")))?;
                        }
                        "NUMBER OF SAMPLES:" => {
                            *n_expected = value
                                .parse()
                                .map_err(|_| err(i + 1, format!("bad sample count '{value}'")))?;
                        }
                        _ => {}
                    }
                }
            }
            i += 2;
        }

        for (k, c) in out.classes.iter().enumerate() {
            if c.name.is_empty() {
                return Err(err(lines.len(), format!("marker class {k} has no NAME")));
            }
        }
        if let Some(n) = declared {
            if n != out.classes.len() {
                return Err(err(
                    lines.len(),
                    format!("declared {n} marker classes, found {}", out.classes.len()),
                ));
            }
        }
        Ok(out)
    }

    /// Render in the layout CTF tools write.
    pub fn render(&self) -> String {
        let mut s = String::new();
        let _ = write!(s, "PATH OF DATASET:\n{}\n\n\n", self.dataset_path);
        let _ = write!(s, "NUMBER OF MARKERS:\n{}\n\n\n", self.classes.len());
        for c in &self.classes {
            let _ = write!(
                s,
                "CLASSGROUPID:\n{}\nNAME:\n{}\nCOMMENT:\n{}\nCOLOR:\n{}\nEDITABLE:\n{}\nCLASSID:\n{}\n",
                c.group_id,
                c.name,
                c.comment,
                c.color,
                if c.editable { "Yes" } else { "No" },
                c.class_id,
            );
            let _ = write!(s, "NUMBER OF SAMPLES:\n{}\nLIST OF SAMPLES:\n", c.samples.len());
            s.push_str("TRIAL NUMBER\t\tTIME FROM SYNC POINT (in seconds)\n");
            for m in &c.samples {
                let _ = writeln!(s, "{:>18}\t\t\t\t{:>+22.10}", format!("{:+}", m.trial), m.time);
            }
            s.push_str("\n\n");
        }
        s
    }

    /// Flatten into onset-sorted events.
    pub fn events(&self, timing: &TrialTiming, run: RunNumber, path: &Path) -> Result<Vec<Event>> {
        let mut events = Vec::with_capacity(self.classes.iter().map(|c| c.samples.len()).sum());
        for c in &self.classes {
            for &s in &c.samples {
                let onset = timing.onset_sample(s).ok_or_else(|| ConvertError::MarkerParse {
                    path: path.to_path_buf(),
                    line: 0,
                    reason: format!("marker {} at trial {} t={} precedes recording start", c.name, s.trial, s.time),
                })?;
                events.push(Event::new(c.name.clone(), onset, run));
            }
        }
        events.sort_by(|a, b| a.onset_sample.cmp(&b.onset_sample).then_with(|| a.label.cmp(&b.label)));
        Ok(events)
    }

    /// Rebuild a marker file from (possibly relabelled) events.
    ///
    /// Class metadata (group, colour, id, comment) is taken from the class
    /// of the same name in `template`; classes keep the template's order,
    /// labels unknown to the template are appended.
    pub fn from_events(events: &[Event], timing: &TrialTiming, template: &MarkerFile) -> MarkerFile {
        let mut classes: Vec<MarkerClass> = template
            .classes
            .iter()
            .map(|c| MarkerClass { samples: Vec::new(), ..c.clone() })
            .collect();
        let mut next_id = classes.iter().map(|c| c.class_id).max().unwrap_or(0) + 1;

        for ev in events {
            let idx = match classes.iter().position(|c| c.name == ev.label) {
                Some(i) => i,
                None => {
                    let mut c = MarkerClass::new(DEFAULT_CLASS_GROUP);
                    c.name = ev.label.clone();
                    c.class_id = next_id;
                    next_id += 1;
                    classes.push(c);
                    classes.len() - 1
                }
            };
            classes[idx].samples.push(timing.marker_sample(ev.onset_sample));
        }

        MarkerFile { dataset_path: template.dataset_path.clone(), classes }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render()).map_err(|e| ConvertError::io(path, e))
    }
}

/// Marker path inside a `.ds` directory.
pub fn marker_path(ds: &Path) -> PathBuf {
    ds.join(MARKER_FILE_NAME)
}

fn parse_sample_list<F>(
    lines: &[&str],
    mut i: usize,
    class: &mut MarkerClass,
    expected: usize,
    err: &F,
) -> Result<usize>
where
    F: Fn(usize, String) -> ConvertError,
{
    if lines.get(i).is_some_and(|l| l.trim_start().starts_with("TRIAL")) {
        i += 1;
    }
    class.samples = Vec::with_capacity(expected);
    while class.samples.len() < expected {
        let Some(row) = lines.get(i) else {
            return Err(err(
                i,
                format!("{}: expected {expected} samples, found {}", class.name, class.samples.len()),
            ));
        };
        let mut cols = row.split_whitespace();
        let (Some(t), Some(x)) = (cols.next(), cols.next()) else {
            return Err(err(i, format!("{}: malformed sample row '{}'", class.name, row.trim())));
        };
        let trial: u32 = t
            .parse()
            .map_err(|_| err(i, format!("{}: bad trial number '{t}'", class.name)))?;
        let time: f64 = x
            .parse()
            .map_err(|_| err(i, format!("{}: bad sample time '{x}'", class.name)))?;
        class.samples.push(MarkerSample { trial, time });
        i += 1;
    }
    Ok(i)
}
