//! CTF MEG dataset reader.
//!
//! A CTF recording is a `.ds` directory.  The converter needs only its
//! `.res4` resource header (channel names, sensor classes, sampling) and its
//! `MarkerFile.mrk` (event labels); the `.meg4` sample data is copied
//! verbatim by the BIDS writer and never decoded here.  [`anonymize`]
//! shifts the acquisition date of a copied dataset.
//!
//! # Quick start
//! ```no_run
//! use ctf2bids::ctf::{find_run, open_run};
//! use ctf2bids::RunNumber;
//! use std::path::Path;
//!
//! let run = RunNumber::new(3).unwrap();
//! let ds  = find_run(Path::new("/data/FGCM_MEG_RAW"), "C03", run).unwrap();
//! let rec = open_run(&ds, run).unwrap();
//! println!("{} channels @ {} Hz, {} events",
//!     rec.header.channels.len(), rec.header.sfreq, rec.events.len());
//! ```
pub mod anonymize;
pub mod dataset;
pub mod markers;
pub mod res4;

pub use anonymize::anonymize_ds;
pub use dataset::{find_run, list_runs, open_run, res4_path, run_number_of, subject_session_dir, CtfRun};
pub use markers::{marker_path, MarkerClass, MarkerFile, MarkerSample, TrialTiming, MARKER_FILE_NAME};
pub use res4::{CtfChannel, CtfFilter, FilterClass, Res4Header, SensorClass};
