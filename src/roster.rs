//! Subject roster and identity mapping.
//!
//! The roster is the only source of truth for which subjects may be
//! converted.  A subject's standard id is its 1-based position in the
//! roster's declared row order, zero-padded to three digits, so an id can
//! be resolved before any recording is touched.
//!
//! ```text
//! megid  group  age  sex        C01 → 001 (A)
//! C01    A      24   F          C02 → 002 (B)
//! C02    B      31   M          C03 → 003 (A)
//! C03    A      27   F
//! ```
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use crate::config::RosterSchema;
use crate::error::{ConvertError, Result};

/// Fallback numeric randomisation column (`0` → A).
const RANDVAL_COLUMN: &str = "randval";

// ── Group ────────────────────────────────────────────────────────────────

/// A/B randomisation group; decides which run number holds which task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {
    A,
    B,
}

impl Group {
    pub const ALL: [Group; 2] = [Group::A, Group::B];

    pub fn as_str(self) -> &'static str {
        match self {
            Group::A => "A",
            Group::B => "B",
        }
    }

    /// Parse a roster cell; accepts `A`/`B` in either case.
    pub fn parse(cell: &str) -> Option<Group> {
        match cell.trim() {
            "A" | "a" => Some(Group::A),
            "B" | "b" => Some(Group::B),
            _ => None,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Subject ──────────────────────────────────────────────────────────────

/// One roster row.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    /// Lab code, e.g. `C03`.
    pub source_id: String,
    /// Zero-padded position, e.g. `003`.
    pub standard_id: String,
    pub group: Group,
    /// Remaining roster columns (age, sex, ibbid, …), keyed by header name.
    pub attributes: BTreeMap<String, String>,
}

impl Subject {
    /// BIDS entity label: `sub-003`.
    pub fn bids_label(&self) -> String {
        format!("sub-{}", self.standard_id)
    }

    /// Non-empty attribute value for a roster column.
    pub fn attribute(&self, column: &str) -> Option<&str> {
        self.attributes
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
    }
}

/// Format a 1-based roster position as a standard id.
pub fn format_standard_id(position: usize) -> String {
    format!("{position:03}")
}

// ── Roster ───────────────────────────────────────────────────────────────

/// Immutable bijection between lab codes and standard ids.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    subjects: Vec<Subject>,
    by_source: HashMap<String, usize>,
    columns: Vec<String>,
}

impl Roster {
    /// Read and parse a roster file.
    ///
    /// Any failure here is configuration-level: the batch cannot start.
    pub fn load<P: AsRef<Path>>(path: P, schema: &RosterSchema) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Roster(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text, schema)
    }

    /// Parse roster text.  The delimiter is a tab when the header line
    /// contains one, a comma otherwise.
    pub fn parse(text: &str, schema: &RosterSchema) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header_line) = lines
            .next()
            .ok_or_else(|| ConvertError::Roster("roster is empty".into()))?;
        let delim = if header_line.contains('\t') { '\t' } else { ',' };
        let columns: Vec<String> = split_row(header_line, delim);

        let id_idx = column_index(&columns, &schema.id_column).ok_or_else(|| {
            ConvertError::Roster(format!("missing required column '{}'", schema.id_column))
        })?;
        let group_idx = column_index(&columns, &schema.group_column);
        let randval_idx = column_index(&columns, RANDVAL_COLUMN);
        if group_idx.is_none() && randval_idx.is_none() {
            return Err(ConvertError::Roster(format!(
                "missing group column '{}' (or '{RANDVAL_COLUMN}')",
                schema.group_column
            )));
        }

        let mut entries = Vec::new();
        for (line_no, line) in lines {
            let cells = split_row(line, delim);
            let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");

            let source_id = cell(id_idx).to_string();
            if source_id.is_empty() {
                tracing::debug!(line = line_no + 1, "roster row without id skipped");
                continue;
            }

            let group = match group_idx {
                Some(i) => Group::parse(cell(i)),
                None => randval_idx.and_then(|i| parse_randval(cell(i))),
            }
            .ok_or_else(|| {
                ConvertError::Roster(format!(
                    "line {}: subject {source_id} has no valid A/B group",
                    line_no + 1
                ))
            })?;

            let attributes = columns
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != id_idx && Some(*i) != group_idx)
                .map(|(i, name)| (name.clone(), cell(i).to_string()))
                .collect();
            entries.push((source_id, group, attributes));
        }

        let mut roster = Self::build(entries)?;
        roster.columns = columns;
        Ok(roster)
    }

    /// Build a roster directly from `(sourceId, group)` pairs in declared order.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Group)>,
        S: Into<String>,
    {
        Self::build(
            entries
                .into_iter()
                .map(|(id, g)| (id.into(), g, BTreeMap::new()))
                .collect(),
        )
    }

    fn build(entries: Vec<(String, Group, BTreeMap<String, String>)>) -> Result<Self> {
        let mut subjects = Vec::with_capacity(entries.len());
        let mut by_source = HashMap::with_capacity(entries.len());
        for (idx, (source_id, group, attributes)) in entries.into_iter().enumerate() {
            if by_source.insert(source_id.clone(), idx).is_some() {
                return Err(ConvertError::Roster(format!("duplicate subject id '{source_id}'")));
            }
            subjects.push(Subject {
                standard_id: format_standard_id(idx + 1),
                source_id,
                group,
                attributes,
            });
        }
        Ok(Self { subjects, by_source, columns: Vec::new() })
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Subjects in declared order.
    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    /// Header names as read from the roster file (empty for [`Roster::from_entries`]).
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.by_source.contains_key(source_id)
    }

    pub fn get(&self, source_id: &str) -> Result<&Subject> {
        self.by_source
            .get(source_id)
            .map(|&i| &self.subjects[i])
            .ok_or_else(|| ConvertError::UnknownSubject(source_id.to_string()))
    }

    /// `C03` → `003`.
    pub fn to_standard_id(&self, source_id: &str) -> Result<&str> {
        self.get(source_id).map(|s| s.standard_id.as_str())
    }

    /// `003`, `3` or `sub-003` → `C03`.
    pub fn to_source_id(&self, standard_id: &str) -> Result<&str> {
        let unknown = || ConvertError::UnknownSubject(standard_id.to_string());
        let digits = standard_id.trim().trim_start_matches("sub-");
        let position: usize = digits.parse().map_err(|_| unknown())?;
        position
            .checked_sub(1)
            .and_then(|i| self.subjects.get(i))
            .map(|s| s.source_id.as_str())
            .ok_or_else(unknown)
    }

    pub fn group_of(&self, source_id: &str) -> Result<Group> {
        self.get(source_id).map(|s| s.group)
    }

    /// Accept either a lab code or a standard id and return the lab code.
    pub fn normalize_source_id<'a>(&'a self, id: &'a str) -> Result<&'a str> {
        let id = id.trim();
        if self.contains(id) {
            return Ok(id);
        }
        let digits = id.trim_start_matches("sub-");
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return self.to_source_id(digits);
        }
        Err(ConvertError::UnknownSubject(id.to_string()))
    }
}

fn split_row(line: &str, delim: char) -> Vec<String> {
    line.split(delim)
        .map(|c| c.trim().trim_matches('"').to_string())
        .collect()
}

fn column_index(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c == name)
}

fn parse_randval(cell: &str) -> Option<Group> {
    let v: f64 = cell.trim().parse().ok()?;
    Some(if v == 0.0 { Group::A } else { Group::B })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = "megid\tgroup\tage\tsex\tibbid\n\
                          C01\tA\t24\tF\tA3120\n\
                          C02\tB\t31\tM\tA3121\n\
                          C03\tA\t27\tF\tA3122\n";

    #[test]
    fn positional_ids_follow_declared_order() {
        let r = Roster::parse(ROSTER, &RosterSchema::default()).unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.to_standard_id("C03").unwrap(), "003");
        assert_eq!(r.to_source_id("002").unwrap(), "C02");
        assert_eq!(r.to_source_id("sub-001").unwrap(), "C01");
        assert_eq!(r.group_of("C02").unwrap(), Group::B);
    }

    #[test]
    fn attributes_keep_extra_columns() {
        let r = Roster::parse(ROSTER, &RosterSchema::default()).unwrap();
        let s = r.get("C03").unwrap();
        assert_eq!(s.attribute("ibbid"), Some("A3122"));
        assert_eq!(s.attribute("age"), Some("27"));
        assert_eq!(s.attribute("group"), None);
        assert_eq!(s.bids_label(), "sub-003");
    }

    #[test]
    fn comma_delimited_with_randval() {
        let text = "megid,randval\nC01,0\nC02,1\n";
        let r = Roster::parse(text, &RosterSchema::default()).unwrap();
        assert_eq!(r.group_of("C01").unwrap(), Group::A);
        assert_eq!(r.group_of("C02").unwrap(), Group::B);
    }

    #[test]
    fn unknown_subject_is_an_error() {
        let r = Roster::parse(ROSTER, &RosterSchema::default()).unwrap();
        assert!(matches!(r.to_standard_id("C99"), Err(ConvertError::UnknownSubject(_))));
        assert!(matches!(r.to_source_id("000"), Err(ConvertError::UnknownSubject(_))));
        assert!(matches!(r.to_source_id("004"), Err(ConvertError::UnknownSubject(_))));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = Roster::from_entries([("C01", Group::A), ("C01", Group::B)]).unwrap_err();
        assert!(err.is_configuration_level());
    }

    #[test]
    fn missing_group_column_is_configuration_error() {
        let err = Roster::parse("megid\tage\nC01\t20\n", &RosterSchema::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Roster(_)));
    }

    #[test]
    fn invalid_group_value_is_rejected() {
        let err = Roster::parse("megid\tgroup\nC01\tX\n", &RosterSchema::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Roster(_)));
    }

    #[test]
    fn normalize_accepts_both_forms() {
        let r = Roster::parse(ROSTER, &RosterSchema::default()).unwrap();
        assert_eq!(r.normalize_source_id("C02").unwrap(), "C02");
        assert_eq!(r.normalize_source_id("sub-002").unwrap(), "C02");
        assert_eq!(r.normalize_source_id("2").unwrap(), "C02");
        assert!(r.normalize_source_id("X1").is_err());
    }
}
