//! Per-recording sidecars: `channels.tsv`, `events.tsv`, `meg.json`,
//! `coordsystem.json`.
use serde::Serialize;

use crate::channels::{ChannelEntry, ChannelRole};
use crate::consistency::label_code;
use crate::ctf::{Res4Header, SensorClass};
use crate::task::Task;
use crate::triggers::Event;

// ── channels.tsv ─────────────────────────────────────────────────────────

/// BIDS channel type.  A classified role wins; otherwise the CTF sensor
/// class decides.  CTF axial gradiometers and all reference sensors are
/// reported as axial gradiometers.
pub fn bids_channel_type(role: ChannelRole, sensor: SensorClass) -> &'static str {
    match role {
        ChannelRole::Ecg => "ECG",
        ChannelRole::Eyegaze => "EYEGAZE",
        ChannelRole::Pupil => "PUPIL",
        ChannelRole::Stim => "TRIG",
        ChannelRole::Unclassified => match sensor {
            SensorClass::MegGradiometer => "MEGGRADAXIAL",
            s if s.is_reference() => "MEGREFGRADAXIAL",
            SensorClass::Eeg => "EEG",
            SensorClass::Stim => "TRIG",
            SensorClass::HeadLocalization => "HLU",
            _ => "MISC",
        },
    }
}

fn units_of(bids_type: &str) -> &'static str {
    match bids_type {
        "MEGGRADAXIAL" | "MEGREFGRADAXIAL" => "T",
        "TRIG" => "n/a",
        "HLU" => "m",
        _ => "V",
    }
}

fn description_of(bids_type: &str) -> &'static str {
    match bids_type {
        "MEGGRADAXIAL" => "Axial Gradiometer",
        "MEGREFGRADAXIAL" => "Axial Gradiometer Reference",
        "ECG" => "ElectroCardioGram",
        "EYEGAZE" => "Eye Gaze",
        "PUPIL" => "Pupil Size",
        "TRIG" => "Trigger",
        "EEG" => "ElectroEncephaloGram",
        "HLU" => "Head Localization Unit",
        _ => "Miscellaneous",
    }
}

/// Render `channels.tsv`.  `channels` must be in header order.
pub fn channels_tsv(header: &Res4Header, channels: &[ChannelEntry]) -> String {
    let low = header.highpass().unwrap_or(0.0);
    let high = header.lowpass().unwrap_or(header.sfreq / 2.0);
    let mut out = String::from(
        "name\ttype\tunits\tlow_cutoff\thigh_cutoff\tdescription\tsampling_frequency\tstatus\n",
    );
    for (entry, ch) in channels.iter().zip(&header.channels) {
        let ty = bids_channel_type(entry.role, ch.sensor);
        out.push_str(&format!(
            "{}\t{ty}\t{}\t{low}\t{high}\t{}\t{}\tgood\n",
            entry.name,
            units_of(ty),
            description_of(ty),
            header.sfreq,
        ));
    }
    out
}

// ── events.tsv ───────────────────────────────────────────────────────────

/// Render `events.tsv` from (corrected) events.
pub fn events_tsv(events: &[Event], sfreq: f64) -> String {
    let mut out = String::from("onset\tduration\ttrial_type\tvalue\tsample\n");
    for ev in events {
        let value = label_code(&ev.label)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!(
            "{:.6}\t0.0\t{}\t{value}\t{}\n",
            ev.onset_sample as f64 / sfreq,
            ev.label,
            ev.onset_sample,
        ));
    }
    out
}

// ── meg.json ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MegJson {
    #[serde(rename = "TaskName")]
    pub task_name: String,
    #[serde(rename = "Manufacturer")]
    pub manufacturer: String,
    #[serde(rename = "SamplingFrequency")]
    pub sampling_frequency: f64,
    #[serde(rename = "PowerLineFrequency")]
    pub power_line_frequency: f64,
    #[serde(rename = "DewarPosition")]
    pub dewar_position: String,
    #[serde(rename = "SoftwareFilters")]
    pub software_filters: String,
    #[serde(rename = "DigitizedLandmarks")]
    pub digitized_landmarks: bool,
    #[serde(rename = "DigitizedHeadPoints")]
    pub digitized_head_points: bool,
    #[serde(rename = "MEGChannelCount")]
    pub meg_channel_count: usize,
    #[serde(rename = "MEGREFChannelCount")]
    pub megref_channel_count: usize,
    #[serde(rename = "EEGChannelCount")]
    pub eeg_channel_count: usize,
    #[serde(rename = "ECGChannelCount")]
    pub ecg_channel_count: usize,
    #[serde(rename = "EOGChannelCount")]
    pub eog_channel_count: usize,
    #[serde(rename = "EMGChannelCount")]
    pub emg_channel_count: usize,
    #[serde(rename = "MiscChannelCount")]
    pub misc_channel_count: usize,
    #[serde(rename = "TriggerChannelCount")]
    pub trigger_channel_count: usize,
    #[serde(rename = "RecordingDuration")]
    pub recording_duration: f64,
    #[serde(rename = "RecordingType")]
    pub recording_type: String,
    #[serde(rename = "EpochLength", skip_serializing_if = "Option::is_none")]
    pub epoch_length: Option<f64>,
    #[serde(rename = "ContinuousHeadLocalization")]
    pub continuous_head_localization: bool,
}

impl MegJson {
    pub fn new(task: Task, header: &Res4Header, channels: &[ChannelEntry], line_freq: f64) -> Self {
        let types: Vec<&str> = channels
            .iter()
            .zip(&header.channels)
            .map(|(e, c)| bids_channel_type(e.role, c.sensor))
            .collect();
        let count = |t: &str| types.iter().filter(|&&x| x == t).count();
        let epoched = header.n_trials > 1;

        Self {
            task_name: task.bids_name(),
            manufacturer: "CTF".to_string(),
            sampling_frequency: header.sfreq,
            power_line_frequency: line_freq,
            dewar_position: "n/a".to_string(),
            software_filters: "n/a".to_string(),
            digitized_landmarks: false,
            digitized_head_points: false,
            meg_channel_count: count("MEGGRADAXIAL"),
            megref_channel_count: count("MEGREFGRADAXIAL"),
            eeg_channel_count: count("EEG"),
            ecg_channel_count: count("ECG"),
            eog_channel_count: 0,
            emg_channel_count: 0,
            misc_channel_count: count("MISC") + count("EYEGAZE") + count("PUPIL"),
            trigger_channel_count: count("TRIG"),
            recording_duration: header.duration_secs(),
            recording_type: if epoched { "epoched" } else { "continuous" }.to_string(),
            epoch_length: epoched.then(|| header.samples_per_trial as f64 / header.sfreq),
            continuous_head_localization: count("HLU") > 0,
        }
    }
}

// ── coordsystem.json ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CoordSystemJson {
    #[serde(rename = "MEGCoordinateSystem")]
    pub meg_coordinate_system: String,
    #[serde(rename = "MEGCoordinateUnits")]
    pub meg_coordinate_units: String,
    #[serde(rename = "MEGCoordinateSystemDescription")]
    pub meg_coordinate_system_description: String,
}

impl Default for CoordSystemJson {
    fn default() -> Self {
        Self {
            meg_coordinate_system: "CTF".to_string(),
            meg_coordinate_units: "cm".to_string(),
            meg_coordinate_system_description: "CTF head coordinates: origin midway between the \
                pre-auricular points, x towards the nasion, z up"
                .to_string(),
        }
    }
}
