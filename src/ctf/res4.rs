//! CTF `.res4` resource header.
//!
//! Only the fields the converter needs are decoded.  All values are
//! big-endian; offsets are absolute from the start of the file:
//!
//! ```text
//!    0  magic            8 × u8   "MEG41RS\0" / "MEG42RS\0"
//!  778  data time        255 × u8 acquisition start, e.g. "10:15:30"
//! 1033  data date        255 × u8 acquisition date, e.g. "12/04/2019"
//! 1288  samples/trial    i32
//! 1292  channel count    i16
//! 1296  sampling rate    f64      Hz
//! 1304  epoch time       f64      s
//! 1312  trial count      i16
//! 1316  pre-trigger      i32      samples
//! 1836  run-desc length  i32
//! 1844  run description  rdlen × u8
//!       filter count     i16
//!       filters          { freq f64, class i32, type i32, npar i16, npar × f64 }
//!       channel names    nchan × 32 u8 (null-padded)
//!       sensor records   nchan × 1328 u8, first i16 = sensor class
//! ```
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{ConvertError, Result};

pub const OFF_DATA_TIME: usize = 778;
pub const OFF_DATA_DATE: usize = 1033;
pub const DATE_FIELD_LEN: usize = 255;
pub const OFF_SAMPLES_PER_TRIAL: usize = 1288;
pub const OFF_N_CHANNELS: usize = 1292;
pub const OFF_SFREQ: usize = 1296;
pub const OFF_EPOCH_TIME: usize = 1304;
pub const OFF_N_TRIALS: usize = 1312;
pub const OFF_PRE_TRIGGER: usize = 1316;
pub const OFF_RUN_DESC_LEN: usize = 1836;
pub const OFF_RUN_DESC: usize = 1844;

pub const CHANNEL_NAME_LEN: usize = 32;
pub const SENSOR_RECORD_LEN: usize = 1328;

const MAGIC_PREFIX: &[u8] = b"MEG4";
const MAGIC: &[u8; 8] = b"MEG42RS\0";

/// Date layouts seen in `data_date`, tried in order.
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%b-%Y", "%Y/%m/%d", "%Y-%m-%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

// ── Sensor class ─────────────────────────────────────────────────────────

/// CTF sensor type index (`sensorTypeIndex` in the sensor record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorClass {
    RefMagnetometer,
    RefGradiometer,
    MegGradiometer,
    Eeg,
    Adc,
    Stim,
    HeadLocalization,
    Other(i16),
}

impl SensorClass {
    pub fn from_index(i: i16) -> Self {
        match i {
            0 => SensorClass::RefMagnetometer,
            1 => SensorClass::RefGradiometer,
            5 => SensorClass::MegGradiometer,
            9 => SensorClass::Eeg,
            10 => SensorClass::Adc,
            11 => SensorClass::Stim,
            13 => SensorClass::HeadLocalization,
            other => SensorClass::Other(other),
        }
    }

    pub fn index(self) -> i16 {
        match self {
            SensorClass::RefMagnetometer => 0,
            SensorClass::RefGradiometer => 1,
            SensorClass::MegGradiometer => 5,
            SensorClass::Eeg => 9,
            SensorClass::Adc => 10,
            SensorClass::Stim => 11,
            SensorClass::HeadLocalization => 13,
            SensorClass::Other(i) => i,
        }
    }

    pub fn is_reference(self) -> bool {
        matches!(self, SensorClass::RefMagnetometer | SensorClass::RefGradiometer)
    }
}

// ── Filters ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterClass {
    Lowpass,
    Highpass,
    Notch,
    Other(i32),
}

impl FilterClass {
    fn from_code(c: i32) -> Self {
        match c {
            1 => FilterClass::Lowpass,
            2 => FilterClass::Highpass,
            3 => FilterClass::Notch,
            other => FilterClass::Other(other),
        }
    }

    fn code(self) -> i32 {
        match self {
            FilterClass::Lowpass => 1,
            FilterClass::Highpass => 2,
            FilterClass::Notch => 3,
            FilterClass::Other(c) => c,
        }
    }
}

/// Hardware filter applied during acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct CtfFilter {
    pub freq: f64,
    pub class: FilterClass,
    pub kind: i32,
    pub params: Vec<f64>,
}

// ── Header ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CtfChannel {
    pub name: String,
    pub sensor: SensorClass,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Res4Header {
    /// Acquisition start time, as stored.
    pub data_time: String,
    /// Acquisition date, as stored.
    pub data_date: String,
    pub samples_per_trial: u32,
    pub n_trials: u16,
    pub sfreq: f64,
    pub epoch_time: f64,
    pub pre_trigger: u32,
    pub run_description: String,
    pub filters: Vec<CtfFilter>,
    pub channels: Vec<CtfChannel>,
}

impl Res4Header {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
        Self::parse(&bytes, path)
    }

    /// Decode a header from raw bytes; `path` is only used in error messages.
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self> {
        let bad = |reason: String| ConvertError::Header { path: path.to_path_buf(), reason };
        let mut r = BeReader { bytes, pos: 0 };

        if !bytes.starts_with(MAGIC_PREFIX) {
            return Err(bad("not a CTF res4 file (bad magic)".into()));
        }

        r.pos = OFF_DATA_TIME;
        let data_time = r.string(DATE_FIELD_LEN).ok_or_else(|| bad("truncated before data time".into()))?;
        r.pos = OFF_DATA_DATE;
        let data_date = r.string(DATE_FIELD_LEN).ok_or_else(|| bad("truncated before data date".into()))?;

        r.pos = OFF_SAMPLES_PER_TRIAL;
        let samples_per_trial = r.i32().ok_or_else(|| bad("truncated before sample count".into()))?;
        let n_chan = r.i16().ok_or_else(|| bad("truncated before channel count".into()))?;
        r.pos = OFF_SFREQ;
        let sfreq = r.f64().ok_or_else(|| bad("truncated before sampling rate".into()))?;
        let epoch_time = r.f64().ok_or_else(|| bad("truncated before epoch time".into()))?;
        let n_trials = r.i16().ok_or_else(|| bad("truncated before trial count".into()))?;
        r.pos = OFF_PRE_TRIGGER;
        let pre_trigger = r.i32().ok_or_else(|| bad("truncated before pre-trigger".into()))?;

        if samples_per_trial < 0 || n_chan < 0 || n_trials < 0 || pre_trigger < 0 {
            return Err(bad("negative count in run setup".into()));
        }
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(bad(format!("invalid sampling rate {sfreq}")));
        }

        r.pos = OFF_RUN_DESC_LEN;
        let rdlen = r.i32().filter(|&n| n >= 0).ok_or_else(|| bad("bad run description length".into()))?;
        r.pos = OFF_RUN_DESC;
        let run_description = r
            .string(rdlen as usize)
            .ok_or_else(|| bad("truncated run description".into()))?;

        let n_filt = r.i16().filter(|&n| n >= 0).ok_or_else(|| bad("bad filter count".into()))?;
        let mut filters = Vec::with_capacity(n_filt as usize);
        for i in 0..n_filt {
            let truncated = || bad(format!("truncated filter record {i}"));
            let freq = r.f64().ok_or_else(truncated)?;
            let class = FilterClass::from_code(r.i32().ok_or_else(truncated)?);
            let kind = r.i32().ok_or_else(truncated)?;
            let n_par = r.i16().filter(|&n| n >= 0).ok_or_else(truncated)?;
            let params = (0..n_par).map(|_| r.f64()).collect::<Option<Vec<_>>>().ok_or_else(truncated)?;
            filters.push(CtfFilter { freq, class, kind, params });
        }

        let n_chan = n_chan as usize;
        let mut names = Vec::with_capacity(n_chan);
        for i in 0..n_chan {
            names.push(
                r.string(CHANNEL_NAME_LEN)
                    .ok_or_else(|| bad(format!("truncated channel name {i} of {n_chan}")))?,
            );
        }

        // Sensor records are optional for our purposes; a file cut short
        // after the names leaves the remaining classes unknown.
        let records_start = r.pos;
        let channels = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let mut rec = BeReader { bytes, pos: records_start + i * SENSOR_RECORD_LEN };
                let sensor = rec.i16().map(SensorClass::from_index).unwrap_or(SensorClass::Other(-1));
                CtfChannel { name, sensor }
            })
            .collect();

        Ok(Res4Header {
            data_time,
            data_date,
            samples_per_trial: samples_per_trial as u32,
            n_trials: n_trials as u16,
            sfreq,
            epoch_time,
            pre_trigger: pre_trigger as u32,
            run_description,
            filters,
            channels,
        })
    }

    /// Encode the decoded fields back into the res4 layout (unused regions zeroed).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; OFF_RUN_DESC];
        out[..MAGIC.len()].copy_from_slice(MAGIC);
        put_field(&mut out, OFF_DATA_TIME, &self.data_time);
        put_field(&mut out, OFF_DATA_DATE, &self.data_date);
        put(&mut out, OFF_SAMPLES_PER_TRIAL, &(self.samples_per_trial as i32).to_be_bytes());
        put(&mut out, OFF_N_CHANNELS, &(self.channels.len() as i16).to_be_bytes());
        put(&mut out, OFF_SFREQ, &self.sfreq.to_be_bytes());
        put(&mut out, OFF_EPOCH_TIME, &self.epoch_time.to_be_bytes());
        put(&mut out, OFF_N_TRIALS, &(self.n_trials as i16).to_be_bytes());
        put(&mut out, OFF_PRE_TRIGGER, &(self.pre_trigger as i32).to_be_bytes());
        let desc = self.run_description.as_bytes();
        put(&mut out, OFF_RUN_DESC_LEN, &(desc.len() as i32).to_be_bytes());
        out.extend_from_slice(desc);

        out.extend_from_slice(&(self.filters.len() as i16).to_be_bytes());
        for f in &self.filters {
            out.extend_from_slice(&f.freq.to_be_bytes());
            out.extend_from_slice(&f.class.code().to_be_bytes());
            out.extend_from_slice(&f.kind.to_be_bytes());
            out.extend_from_slice(&(f.params.len() as i16).to_be_bytes());
            for p in &f.params {
                out.extend_from_slice(&p.to_be_bytes());
            }
        }

        for ch in &self.channels {
            let mut name = [0u8; CHANNEL_NAME_LEN];
            let n = ch.name.len().min(CHANNEL_NAME_LEN - 1);
            name[..n].copy_from_slice(&ch.name.as_bytes()[..n]);
            out.extend_from_slice(&name);
        }
        for ch in &self.channels {
            let mut rec = [0u8; SENSOR_RECORD_LEN];
            rec[..2].copy_from_slice(&ch.sensor.index().to_be_bytes());
            out.extend_from_slice(&rec);
        }
        out
    }

    /// Total samples across all trials.
    pub fn n_samples(&self) -> u64 {
        self.samples_per_trial as u64 * self.n_trials.max(1) as u64
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_samples() as f64 / self.sfreq
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// Hardware low-pass corner (`high_cutoff` in BIDS terms).
    pub fn lowpass(&self) -> Option<f64> {
        self.filter_freq(FilterClass::Lowpass)
    }

    /// Hardware high-pass corner (`low_cutoff` in BIDS terms).
    pub fn highpass(&self) -> Option<f64> {
        self.filter_freq(FilterClass::Highpass)
    }

    fn filter_freq(&self, class: FilterClass) -> Option<f64> {
        self.filters.iter().find(|f| f.class == class).map(|f| f.freq)
    }

    /// Acquisition start from `data_date` + `data_time`.  `None` if the date
    /// does not parse; an unreadable time counts as midnight.
    pub fn measurement_date(&self) -> Option<NaiveDateTime> {
        let (date, _) = parse_date(&self.data_date)?;
        match parse_time(&self.data_time) {
            Some((time, _)) => Some(date.and_time(time)),
            None => date.and_hms_opt(0, 0, 0),
        }
    }

    /// Store `when` back into both fields, keeping the layouts they had.
    pub fn set_measurement_date(&mut self, when: NaiveDateTime) {
        let date_fmt = parse_date(&self.data_date).map_or(DATE_FORMATS[0], |(_, f)| f);
        let time_fmt = parse_time(&self.data_time).map_or(TIME_FORMATS[0], |(_, f)| f);
        self.data_date = when.date().format(date_fmt).to_string();
        self.data_time = when.time().format(time_fmt).to_string();
    }

    /// Rewrite only the two date fields of an existing res4 file; every
    /// other byte is left as it is.
    pub fn write_date_fields(&self, path: &Path) -> Result<()> {
        let mut bytes = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
        if !bytes.starts_with(MAGIC_PREFIX) || bytes.len() < OFF_DATA_DATE + DATE_FIELD_LEN {
            return Err(ConvertError::Header {
                path: path.to_path_buf(),
                reason: "not a CTF res4 file (bad magic or too short)".into(),
            });
        }
        put_field(&mut bytes, OFF_DATA_TIME, &self.data_time);
        put_field(&mut bytes, OFF_DATA_DATE, &self.data_date);
        std::fs::write(path, bytes).map_err(|e| ConvertError::io(path, e))
    }
}

fn parse_date(s: &str) -> Option<(NaiveDate, &'static str)> {
    DATE_FORMATS
        .iter()
        .find_map(|&f| NaiveDate::parse_from_str(s.trim(), f).ok().map(|d| (d, f)))
}

fn parse_time(s: &str) -> Option<(NaiveTime, &'static str)> {
    TIME_FORMATS
        .iter()
        .find_map(|&f| NaiveTime::parse_from_str(s.trim(), f).ok().map(|t| (t, f)))
}

fn put(buf: &mut [u8], off: usize, src: &[u8]) {
    buf[off..off + src.len()].copy_from_slice(src);
}

/// NUL-padded fixed-width text field; always leaves a terminating NUL.
fn put_field(buf: &mut [u8], off: usize, text: &str) {
    let field = &mut buf[off..off + DATE_FIELD_LEN];
    field.fill(0);
    let n = text.len().min(DATE_FIELD_LEN - 1);
    field[..n].copy_from_slice(&text.as_bytes()[..n]);
}

/// Bounds-checked big-endian cursor.
struct BeReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl BeReader<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let chunk = self.bytes.get(self.pos..self.pos + N)?;
        self.pos += N;
        chunk.try_into().ok()
    }

    fn i16(&mut self) -> Option<i16> {
        self.take::<2>().map(i16::from_be_bytes)
    }

    fn i32(&mut self) -> Option<i32> {
        self.take::<4>().map(i32::from_be_bytes)
    }

    fn f64(&mut self) -> Option<f64> {
        self.take::<8>().map(f64::from_be_bytes)
    }

    /// Fixed-width Latin-1 string, cut at the first NUL and trimmed.
    fn string(&mut self, len: usize) -> Option<String> {
        let raw = self.bytes.get(self.pos..self.pos + len)?;
        self.pos += len;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(len);
        Some(raw[..end].iter().map(|&b| b as char).collect::<String>().trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Res4Header {
        Res4Header {
            data_time: "10:15:30".into(),
            data_date: "12/04/2019".into(),
            samples_per_trial: 1200,
            n_trials: 1,
            sfreq: 1200.0,
            epoch_time: 1.0,
            pre_trigger: 0,
            run_description: "FGCM audio".into(),
            filters: vec![
                CtfFilter { freq: 300.0, class: FilterClass::Lowpass, kind: 2, params: vec![] },
                CtfFilter { freq: 50.0, class: FilterClass::Notch, kind: 2, params: vec![1.0] },
            ],
            channels: vec![
                CtfChannel { name: "UPPT001".into(), sensor: SensorClass::Stim },
                CtfChannel { name: "MLC11-4408".into(), sensor: SensorClass::MegGradiometer },
                CtfChannel { name: "BG1-4408".into(), sensor: SensorClass::RefMagnetometer },
            ],
        }
    }

    #[test]
    fn encode_then_parse() {
        let h = header();
        let parsed = Res4Header::parse(&h.to_bytes(), Path::new("x.res4")).unwrap();
        assert_eq!(parsed, h);
        assert_eq!(parsed.lowpass(), Some(300.0));
        assert_eq!(parsed.highpass(), None);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut b = header().to_bytes();
        b[0] = b'X';
        assert!(matches!(Res4Header::parse(&b, Path::new("x")), Err(ConvertError::Header { .. })));
    }

    #[test]
    fn truncated_names_rejected() {
        let b = header().to_bytes();
        // desc(10) + nfilt(2) + two filter records (18 + 26) + one name
        let cut = OFF_RUN_DESC + 10 + 2 + 18 + 26 + CHANNEL_NAME_LEN;
        assert!(Res4Header::parse(&b[..cut], Path::new("x")).is_err());
    }

    #[test]
    fn missing_sensor_records_leave_class_unknown() {
        let h = header();
        let b = h.to_bytes();
        let cut = b.len() - 3 * SENSOR_RECORD_LEN;
        let parsed = Res4Header::parse(&b[..cut], Path::new("x")).unwrap();
        assert_eq!(parsed.channel_names(), ["UPPT001", "MLC11-4408", "BG1-4408"]);
        assert!(parsed.channels.iter().all(|c| c.sensor == SensorClass::Other(-1)));
    }

    #[test]
    fn measurement_date_keeps_its_layout() {
        let mut h = header();
        let when = h.measurement_date().unwrap();
        assert_eq!(when.to_string(), "2019-04-12 10:15:30");

        h.set_measurement_date(when - chrono::Duration::days(1));
        assert_eq!(h.data_date, "11/04/2019");
        assert_eq!(h.data_time, "10:15:30");

        h.data_date = "12-Apr-2019".into();
        h.data_time = "09:05".into();
        h.set_measurement_date(h.measurement_date().unwrap() - chrono::Duration::days(365));
        assert_eq!(h.data_date, "12-Apr-2018");
        assert_eq!(h.data_time, "09:05");

        h.data_date = "unknown".into();
        assert!(h.measurement_date().is_none());
    }

    #[test]
    fn date_fields_patched_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.res4");
        let mut bytes = header().to_bytes();
        bytes.extend_from_slice(b"TRAILER");
        std::fs::write(&path, &bytes).unwrap();

        let mut h = header();
        h.data_date = "01/01/2009".into();
        h.write_date_fields(&path).unwrap();

        let patched = std::fs::read(&path).unwrap();
        assert_eq!(patched.len(), bytes.len());
        assert!(patched.ends_with(b"TRAILER"));
        let parsed = Res4Header::parse(&patched, &path).unwrap();
        assert_eq!(parsed.data_date, "01/01/2009");
        assert_eq!(parsed.data_time, "10:15:30");
    }

    #[test]
    fn duration_uses_all_trials() {
        let mut h = header();
        h.n_trials = 3;
        assert_eq!(h.n_samples(), 3600);
        assert!((h.duration_secs() - 3.0).abs() < 1e-12);
    }
}
