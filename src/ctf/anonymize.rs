//! Measurement-date anonymisation for copied `.ds` datasets.
//!
//! The acquisition date in the res4 header is moved back by a whole number
//! of days.  The shift is clamped so the result never falls before the
//! earliest instant a signed 32-bit Unix timestamp can hold
//! (1901-12-13 20:45:52 UTC).
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime};

use crate::error::Result;

use super::dataset::res4_path;
use super::res4::Res4Header;

/// Earliest measurement date representable as an `i32` timestamp.
pub fn int32_floor() -> NaiveDateTime {
    DateTime::from_timestamp(i32::MIN as i64, 0)
        .map(|d| d.naive_utc())
        .unwrap_or(NaiveDateTime::MIN)
}

/// Largest shift not exceeding `days_back` that keeps `measured` at or
/// after [`int32_floor`].
pub fn clamp_days_back(measured: NaiveDateTime, days_back: u32) -> u32 {
    let max = (measured - int32_floor()).num_days().max(0);
    (days_back as i64).min(max) as u32
}

/// Shift the measurement date in `header` back by up to `days_back` days.
/// Returns the shift actually applied, or `None` when the header carries no
/// readable date (both fields are then cleared).
pub fn shift_header(header: &mut Res4Header, days_back: u32) -> Option<u32> {
    let Some(measured) = header.measurement_date() else {
        header.data_date.clear();
        header.data_time.clear();
        return None;
    };
    let days = clamp_days_back(measured, days_back);
    if days < days_back {
        tracing::warn!(requested = days_back, applied = days, "days_back too large for measurement date, clamped");
    }
    header.set_measurement_date(measured - Duration::days(days as i64));
    Some(days)
}

/// Anonymise the res4 header inside the dataset at `ds` in place.
pub fn anonymize_ds(ds: &Path, days_back: u32) -> Result<Option<u32>> {
    let path = res4_path(ds)?;
    let mut header = Res4Header::read(&path)?;
    let applied = shift_header(&mut header, days_back);
    if applied.is_none() {
        tracing::warn!(path = %path.display(), "unreadable measurement date, cleared");
    }
    header.write_date_fields(&path)?;
    Ok(applied)
}
