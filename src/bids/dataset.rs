//! Dataset-level files: `dataset_description.json`, `participants.tsv`,
//! `participants.json`.
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::ConversionConfig;
use crate::error::{ConvertError, Result};
use crate::roster::Roster;

use super::BIDS_VERSION;

/// Optional roster columns copied into `participants.tsv` when present.
const PARTICIPANT_COLUMNS: &[&str] = &["age", "sex"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetDescription {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    #[serde(rename = "DatasetType")]
    pub dataset_type: String,
    #[serde(rename = "License")]
    pub license: String,
    #[serde(rename = "Authors")]
    pub authors: Vec<String>,
}

impl DatasetDescription {
    pub fn from_config(cfg: &ConversionConfig) -> Self {
        Self {
            name: cfg.dataset_name.clone(),
            bids_version: BIDS_VERSION.to_string(),
            dataset_type: "raw".to_string(),
            license: cfg.license.clone(),
            authors: cfg.authors.clone(),
        }
    }
}

/// Write `dataset_description.json` at the BIDS root.
pub fn write_dataset_description(root: &Path, desc: &DatasetDescription) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|e| ConvertError::io(root, e))?;
    let path = root.join("dataset_description.json");
    write_json(&path, &serde_json::to_value(desc)?)
}

/// Render `participants.tsv` for the whole roster, in declared order.
pub fn participants_tsv(roster: &Roster) -> String {
    let extra: Vec<&str> = PARTICIPANT_COLUMNS
        .iter()
        .copied()
        .filter(|c| roster.columns().iter().any(|h| h == c))
        .collect();

    let mut header = vec!["participant_id", "source_id", "group"];
    header.extend(&extra);
    let mut out = header.join("\t");
    out.push('\n');

    for s in roster.subjects() {
        let mut row = vec![s.bids_label(), s.source_id.clone(), s.group.to_string()];
        row.extend(extra.iter().map(|c| s.attribute(c).unwrap_or("n/a").to_string()));
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

/// Write `participants.tsv` and merge column descriptions into
/// `participants.json`.
pub fn write_participants(root: &Path, roster: &Roster) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|e| ConvertError::io(root, e))?;
    let tsv = root.join("participants.tsv");
    std::fs::write(&tsv, participants_tsv(roster)).map_err(|e| ConvertError::io(&tsv, e))?;
    update_participants_json(root)
}

/// Add `source_id` and `group` descriptions to `participants.json`,
/// keeping any keys already there.
pub fn update_participants_json(root: &Path) -> Result<()> {
    let path = root.join("participants.json");
    let mut doc: Map<String, Value> = if path.is_file() {
        let text = std::fs::read_to_string(&path).map_err(|e| ConvertError::io(&path, e))?;
        match serde_json::from_str(&text)? {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    } else {
        Map::new()
    };

    doc.entry("participant_id")
        .or_insert_with(|| json!({ "Description": "Unique participant identifier" }));
    doc.entry("source_id")
        .or_insert_with(|| json!({ "Description": "Original lab subject code (MEG id)" }));
    doc.entry("group").or_insert_with(|| {
        json!({
            "Description": "Counterbalancing group; sets the run order of the six tasks",
            "Levels": { "A": "auditory tasks first", "B": "visual tasks first" }
        })
    });

    write_json(&path, &Value::Object(doc))
}

pub(crate) fn write_json(path: &Path, value: &Value) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    std::fs::write(path, text).map_err(|e| ConvertError::io(path, e))
}

pub(crate) fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RosterSchema;

    #[test]
    fn participants_lists_roster_with_optional_columns() {
        let r = Roster::parse(
            "megid,group,age,sex\nC01,A,24,F\nC02,B,nan,M\n",
            &RosterSchema::default(),
        )
        .unwrap();
        let tsv = participants_tsv(&r);
        let rows: Vec<&str> = tsv.lines().collect();
        assert_eq!(rows[0], "participant_id\tsource_id\tgroup\tage\tsex");
        assert_eq!(rows[1], "sub-001\tC01\tA\t24\tF");
        assert_eq!(rows[2], "sub-002\tC02\tB\tn/a\tM");
    }

    #[test]
    fn participants_json_merge_keeps_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("participants.json"),
            r#"{"age": {"Description": "years"}, "source_id": {"Description": "curated"}}"#,
        )
        .unwrap();
        update_participants_json(dir.path()).unwrap();
        let v = read_json(&dir.path().join("participants.json")).unwrap();
        assert_eq!(v["age"]["Description"], "years");
        assert_eq!(v["source_id"]["Description"], "curated");
        assert!(v.get("group").is_some());
        assert!(v.get("participant_id").is_some());
    }

    #[test]
    fn participants_json_created_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        update_participants_json(dir.path()).unwrap();
        let v = read_json(&dir.path().join("participants.json")).unwrap();
        assert_eq!(v["source_id"]["Description"], "Original lab subject code (MEG id)");
    }

    #[test]
    fn description_from_config() {
        let d = DatasetDescription::from_config(&ConversionConfig::default());
        assert_eq!(d.bids_version, BIDS_VERSION);
        assert_eq!(d.dataset_type, "raw");
        let v = serde_json::to_value(&d).unwrap();
        assert!(v["Authors"].as_array().is_some_and(|a| a.len() == 3));
    }
}
