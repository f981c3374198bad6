mod common;
use common::{read_json, read_tsv, Study};
use ctf2bids::headshape::{attach_headshapes, HeadshapeOptions, PosUnits};
use ctf2bids::{convert, ConversionConfig, Roster, RosterSchema, Task};

const POS: &str = "3
1 nasion  0.0 9.5 0.0
2 lpa    -7.1 0.0 0.0
3 rpa     7.2 0.1 0.0
";

fn converted_study() -> Study {
    let study = Study::new();
    study.add_task_run("C01", 1, Task::AudioBase);
    study.add_task_run("C01", 2, Task::AudioCond);
    study.add_task_run("C02", 4, Task::AudioBase);
    let report = convert(&study.config(), &RosterSchema::default(), &["C01", "C02"], &[Task::AudioBase, Task::AudioCond]).unwrap();
    assert_eq!(report.converted(), 3, "{report}");
    study
}

fn roster(study: &Study) -> Roster {
    Roster::load(&study.roster, &RosterSchema::default()).unwrap()
}

#[test]
fn dataset_level_files() {
    let study = converted_study();

    let desc = read_json(&study.bids.join("dataset_description.json"));
    assert_eq!(desc["BIDSVersion"], "1.8.0");
    assert_eq!(desc["DatasetType"], "raw");
    assert_eq!(desc["Name"], ConversionConfig::default().dataset_name);

    let rows = read_tsv(&study.bids.join("participants.tsv"));
    assert_eq!(rows[0], ["participant_id", "source_id", "group", "age", "sex"]);
    assert_eq!(rows[4], ["sub-004", "C04", "B", "n/a", "M"]);

    let pj = read_json(&study.bids.join("participants.json"));
    assert!(pj["source_id"]["Description"].is_string());
}

#[test]
fn events_and_channels_sidecars() {
    let study = converted_study();
    let meg = study.bids.join("sub-002/meg");

    let events = read_tsv(&meg.join("sub-002_task-audiobase_events.tsv"));
    assert_eq!(events.len(), 1 + 14);
    assert_eq!(events[1][..4], ["0.500000", "0.0", "startACQ", "1"]);

    let channels = read_tsv(&meg.join("sub-002_task-audiobase_channels.tsv"));
    assert_eq!(channels[0].len(), 8);
    assert!(channels[1..].iter().all(|r| r[7] == "good"));
    assert!(channels[1..].iter().all(|r| r[4] == "300"));

    let sidecar = read_json(&meg.join("sub-002_task-audiobase_meg.json"));
    assert_eq!(sidecar["PowerLineFrequency"], 50.0);
    assert_eq!(sidecar["RecordingType"], "continuous");
    assert_eq!(sidecar["DigitizedHeadPoints"], false);
}

#[test]
fn headshape_attached_to_every_meg_dir() {
    let study = converted_study();
    std::fs::write(study.pos.join("A3120_face.pos"), POS).unwrap();
    std::fs::write(study.pos.join("A3120.pos"), POS).unwrap();

    let r = roster(&study);
    let report = attach_headshapes(&r, &["C01", "002", "C03"], &study.bids, &study.pos, &HeadshapeOptions::default()).unwrap();

    assert_eq!(report.updated.len(), 1, "{report}");
    assert_eq!(report.updated[0].pos_file, "A3120.pos");
    assert_eq!(report.updated[0].units, PosUnits::Cm);
    // C02 (A3121) has no .pos file; C03 has no converted output.
    assert_eq!(report.failed.len(), 2);

    let meg = study.bids.join("sub-001/meg");
    assert!(meg.join("sub-001_acq-HEAD_headshape.pos").is_file());
    let coords = read_json(&meg.join("sub-001_coordsystem.json"));
    assert_eq!(coords["DigitizedHeadPoints"], "sub-001_acq-HEAD_headshape.pos");
    assert_eq!(coords["DigitizedHeadPointsCoordinateUnits"], "cm");
    assert_eq!(coords["MEGCoordinateSystem"], "CTF");
    for task in ["audiobase", "audiocond"] {
        let j = read_json(&meg.join(format!("sub-001_task-{task}_meg.json")));
        assert_eq!(j["DigitizedHeadPoints"], true);
    }
}

#[test]
fn headshape_dry_run_and_missing_root() {
    let study = converted_study();
    std::fs::write(study.pos.join("A3120.pos"), POS).unwrap();
    let r = roster(&study);

    let opts = HeadshapeOptions { dry_run: true, ..HeadshapeOptions::default() };
    let report = attach_headshapes(&r, &["C01"], &study.bids, &study.pos, &opts).unwrap();
    assert_eq!(report.updated.len(), 1);
    assert!(!study.bids.join("sub-001/meg/sub-001_acq-HEAD_headshape.pos").exists());

    let missing = study.tmp.path().join("no-pos");
    let err = attach_headshapes(&r, &["C01"], &study.bids, &missing, &opts).unwrap_err();
    assert!(err.is_configuration_level());
}
