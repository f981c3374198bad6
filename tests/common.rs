/// Shared helpers: synthetic CTF datasets and rosters in a temp tree.
use std::path::{Path, PathBuf};

use ctf2bids::consistency::expected_labels;
use ctf2bids::ctf::{CtfChannel, CtfFilter, FilterClass, MarkerClass, MarkerFile, MarkerSample, Res4Header, SensorClass};
use ctf2bids::Task;
use tempfile::TempDir;

pub const SFREQ: f64 = 1200.0;

/// Group A: C01, C03.  Group B: C02, C04.
pub const ROSTER: &str = "megid\tgroup\tage\tsex\tibbid\n\
                          C01\tA\t24\tF\tA3120\n\
                          C02\tB\t31\tM\tA3121\n\
                          C03\tA\t27\tF\tA3122\n\
                          C04\tB\tnan\tM\tA3123\n";

#[allow(unused)]
pub const CHANNELS: &[(&str, SensorClass)] = &[
    ("BG1-4408", SensorClass::RefMagnetometer),
    ("MLC11-4408", SensorClass::MegGradiometer),
    ("MRC11-4408", SensorClass::MegGradiometer),
    ("ECG", SensorClass::Adc),
    ("UADC005-4408", SensorClass::Adc),
    ("UADC006-4408", SensorClass::Adc),
    ("UADC007-4408", SensorClass::Adc),
    ("UADC001-4408", SensorClass::Adc),
    ("UPPT001", SensorClass::Stim),
    ("UPPT002", SensorClass::Stim),
    ("HLC0011", SensorClass::HeadLocalization),
];

pub fn header() -> Res4Header {
    Res4Header {
        data_time: "10:15:30".into(),
        data_date: "12/04/2019".into(),
        samples_per_trial: 12_000,
        n_trials: 1,
        sfreq: SFREQ,
        epoch_time: 10.0,
        pre_trigger: 0,
        run_description: "FGCM".into(),
        filters: vec![CtfFilter { freq: 300.0, class: FilterClass::Lowpass, kind: 2, params: vec![] }],
        channels: CHANNELS
            .iter()
            .map(|&(name, sensor)| CtfChannel { name: name.into(), sensor })
            .collect(),
    }
}

/// One marker class per label, each with a single occurrence; the k-th
/// label sits at `0.5 * (k + 1)` seconds.
pub fn markers(labels: &[&str]) -> MarkerFile {
    MarkerFile {
        dataset_path: "/raw/fixture.ds".into(),
        classes: labels
            .iter()
            .enumerate()
            .map(|(k, l)| MarkerClass {
                group_id: 3,
                name: l.to_string(),
                comment: String::new(),
                color: "red".into(),
                editable: true,
                class_id: k as i32 + 1,
                samples: vec![MarkerSample { trial: 0, time: 0.5 * (k + 1) as f64 }],
            })
            .collect(),
    }
}

/// Write `<dir>/<name>.ds` with res4, a dummy meg4 and (optionally) markers.
pub fn write_ds(dir: &Path, name: &str, header: &Res4Header, markers: Option<&MarkerFile>) -> PathBuf {
    let ds = dir.join(format!("{name}.ds"));
    std::fs::create_dir_all(&ds).unwrap();
    std::fs::write(ds.join(format!("{name}.res4")), header.to_bytes()).unwrap();
    std::fs::write(ds.join(format!("{name}.meg4")), b"MEG41CP\0").unwrap();
    if let Some(m) = markers {
        m.write(&ds.join("MarkerFile.mrk")).unwrap();
    }
    ds
}

/// Temp tree with `raw/`, `bids/`, `pos/` and a roster file.
pub struct Study {
    pub tmp: TempDir,
    pub raw: PathBuf,
    pub bids: PathBuf,
    pub pos: PathBuf,
    pub roster: PathBuf,
}

#[allow(unused)]
impl Study {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        let bids = tmp.path().join("bids");
        let pos = tmp.path().join("pos");
        for d in [&raw, &bids, &pos] {
            std::fs::create_dir_all(d).unwrap();
        }
        let roster = tmp.path().join("roster.tsv");
        std::fs::write(&roster, ROSTER).unwrap();
        Self { tmp, raw, bids, pos, roster }
    }

    /// Raw run `NN` for a subject with the given labels.
    pub fn add_run(&self, sid: &str, run: u8, labels: &[&str]) -> PathBuf {
        let session = self.raw.join(sid).join(format!("{sid}-1"));
        std::fs::create_dir_all(&session).unwrap();
        write_ds(&session, &format!("{sid}_FGCM_20190412_{run:02}"), &header(), Some(&markers(labels)))
    }

    /// Raw run carrying exactly the labels its task expects.
    pub fn add_task_run(&self, sid: &str, run: u8, task: Task) -> PathBuf {
        self.add_run(sid, run, expected_labels(task))
    }

    pub fn config(&self) -> ctf2bids::ConversionConfig {
        ctf2bids::ConversionConfig {
            raw_root: self.raw.clone(),
            bids_root: self.bids.clone(),
            roster_path: self.roster.clone(),
            pos_root: self.pos.clone(),
            ..ctf2bids::ConversionConfig::default()
        }
    }
}

#[allow(unused)]
pub fn read_tsv(path: &Path) -> Vec<Vec<String>> {
    std::fs::read_to_string(path)
        .unwrap_or_else(|_| panic!("missing {}", path.display()))
        .lines()
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect()
}

#[allow(unused)]
pub fn read_json(path: &Path) -> serde_json::Value {
    let text = std::fs::read_to_string(path).unwrap_or_else(|_| panic!("missing {}", path.display()));
    serde_json::from_str(&text).unwrap()
}
