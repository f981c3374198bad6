//! Conversion configuration.
//!
//! [`ConversionConfig`] holds every path and dataset-level constant the
//! batch needs.  All fields have defaults matching the FGCM study layout, so
//! callers usually override only the roots.

use std::path::PathBuf;

/// Root of the lab drive that holds raw data, roster and headshape files.
pub const DEFAULT_DATA_ROOT: &str = "/media/bianco/LaCie/DATA/DFGT";

/// Days the measurement date is moved back when anonymising (about ten years).
pub const DEFAULT_DAYS_BACK: u32 = 365 * 10;

/// Study authors listed in `dataset_description.json`.
pub const FGCM_AUTHORS: &[&str] = &["Riccardo Bianco", "Alejandro Espino", "Markus junghoefer"];

/// Configuration for a conversion batch.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use ctf2bids::ConversionConfig;
///
/// let cfg = ConversionConfig {
///     bids_root: "/tmp/bids".into(),
///     dry_run:   true,
///     ..ConversionConfig::default()
/// };
/// assert_eq!(cfg.line_freq, 50.0);
/// ```
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Raw CTF tree: `{raw_root}/{sourceId}/{sourceId}-1/*.ds`.
    ///
    /// Default: `{DATA_ROOT}/FGCM_MEG_RAW`.
    pub raw_root: PathBuf,

    /// BIDS output root.
    ///
    /// Default: `{DATA_ROOT}/FGCM_BIDS`.
    pub bids_root: PathBuf,

    /// Subject roster (tab- or comma-delimited).
    ///
    /// Default: `FGCM_Demographics.csv` in the working directory.
    pub roster_path: PathBuf,

    /// Directory of Polhemus `.pos` headshape files.
    ///
    /// Default: `{DATA_ROOT}/FGCM_POS`.
    pub pos_root: PathBuf,

    /// Power line frequency written to `*_meg.json`.
    ///
    /// Default: `50.0` Hz (Europe).
    pub line_freq: f64,

    /// `Name` in `dataset_description.json`.
    pub dataset_name: String,

    /// `Authors` in `dataset_description.json`.
    pub authors: Vec<String>,

    /// `License` in `dataset_description.json`.
    ///
    /// Default: `"CC-BY-4.0"`.
    pub license: String,

    /// Replace existing `meg.ds` output instead of failing the unit.
    pub overwrite: bool,

    /// Run every step except the final write.
    pub dry_run: bool,

    /// Skip units whose output already exists (resume an interrupted batch).
    pub skip_existing: bool,

    /// Shift the acquisition date of each copied dataset back by this many
    /// days; `None` keeps the real date.
    ///
    /// Default: `Some(DEFAULT_DAYS_BACK)`.
    pub days_back: Option<u32>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        let data_root = PathBuf::from(DEFAULT_DATA_ROOT);
        Self {
            raw_root: data_root.join("FGCM_MEG_RAW"),
            bids_root: data_root.join("FGCM_BIDS"),
            roster_path: PathBuf::from("FGCM_Demographics.csv"),
            pos_root: data_root.join("FGCM_POS"),
            line_freq: 50.0,
            dataset_name: "FearGenCrossMod (FGCM)".to_string(),
            authors: FGCM_AUTHORS.iter().map(|s| s.to_string()).collect(),
            license: "CC-BY-4.0".to_string(),
            overwrite: false,
            dry_run: false,
            skip_existing: false,
            days_back: Some(DEFAULT_DAYS_BACK),
        }
    }
}

/// Names of the roster columns the pipeline consumes.
///
/// The roster schema is external; only these two columns are required.
#[derive(Debug, Clone)]
pub struct RosterSchema {
    /// Recording identifier column (lab subject code, e.g. `C03`).
    ///
    /// Default: `"megid"`.
    pub id_column: String,

    /// A/B randomisation column.  When absent, a numeric `randval`
    /// column is used instead (`0` → A, anything else → B).
    ///
    /// Default: `"group"`.
    pub group_column: String,
}

impl Default for RosterSchema {
    fn default() -> Self {
        Self {
            id_column: "megid".to_string(),
            group_column: "group".to_string(),
        }
    }
}
