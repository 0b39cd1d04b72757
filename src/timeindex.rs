use std::fmt;

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use chrono_tz::Tz;

use crate::error::GridVectorError;
use crate::metadata::TimeVectorMetadata;

/// The time axis of one vector. Exactly one variant is produced per vector;
/// the choice is driven by the metadata, never by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeIndex {
    /// Axis defined by start + step duration + count.
    FixedFrequency {
        start: NaiveDateTime,
        period_duration: Duration,
        num_periods: usize,
        is_52_week_years: bool,
        extrapolate_first_point: bool,
        extrapolate_last_point: bool,
    },
    /// Axis defined by the literal observed timestamps in the source.
    List {
        datetimes: Vec<NaiveDateTime>,
        timezone: Option<Tz>,
        is_52_week_years: bool,
        extrapolate_first_point: bool,
        extrapolate_last_point: bool,
    },
}

impl fmt::Display for TimeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeIndex::FixedFrequency {
                start,
                period_duration,
                num_periods,
                ..
            } => write!(
                f,
                "FixedFrequencyTimeIndex(start={start}, period_duration={period_duration}, num_periods={num_periods})"
            ),
            TimeIndex::List { datetimes, timezone, .. } => write!(
                f,
                "ListTimeIndex(len={}, timezone={})",
                datetimes.len(),
                timezone.map_or_else(|| "None".to_string(), |tz| tz.to_string())
            ),
        }
    }
}

impl TimeIndex {
    /// Number of periods spanned by the axis. A list index of `n` points
    /// describes `n - 1` periods (open interval).
    pub fn num_periods(&self) -> usize {
        match self {
            TimeIndex::FixedFrequency { num_periods, .. } => *num_periods,
            TimeIndex::List { datetimes, .. } => datetimes.len().saturating_sub(1),
        }
    }

    pub fn is_52_week_years(&self) -> bool {
        match self {
            TimeIndex::FixedFrequency { is_52_week_years, .. }
            | TimeIndex::List { is_52_week_years, .. } => *is_52_week_years,
        }
    }

    /// Whether the axis is classified as covering whole years.
    ///
    /// Fixed 52-week axes qualify when the total span is a positive multiple
    /// of 52 weeks. Fixed calendar axes qualify when they run from one
    /// Jan 1 midnight to another. List axes qualify when the first point is a
    /// Jan 1 midnight and the last point plus one trailing step lands on a
    /// later Jan 1 midnight.
    pub fn is_whole_years(&self) -> bool {
        match self {
            TimeIndex::FixedFrequency {
                start,
                period_duration,
                num_periods,
                is_52_week_years,
                ..
            } => {
                let Some(total) = period_duration.checked_mul(*num_periods as i32) else {
                    return false;
                };
                if total <= Duration::zero() {
                    return false;
                }
                if *is_52_week_years {
                    let year = Duration::weeks(52);
                    return total.num_seconds() % year.num_seconds() == 0;
                }
                is_year_start(start) && is_year_start(&(*start + total))
            }
            TimeIndex::List { datetimes, .. } => {
                if datetimes.len() < 2 {
                    return false;
                }
                let first = datetimes[0];
                let last = datetimes[datetimes.len() - 1];
                let step = last - datetimes[datetimes.len() - 2];
                is_year_start(&first) && is_year_start(&(last + step)) && last + step > first
            }
        }
    }
}

fn is_year_start(dt: &NaiveDateTime) -> bool {
    dt.month() == 1
        && dt.day() == 1
        && dt.hour() == 0
        && dt.minute() == 0
        && dt.second() == 0
        && dt.nanosecond() == 0
}

/// Construct the time index for one vector from its cast metadata.
///
/// `Start`, `Frequency` and `NumPoints` all present routes to a fixed
/// frequency axis; any of the three missing routes to a list axis built from
/// the literal datetimes read from the source. Partial specification is a
/// routing signal, not an error.
pub fn build_index(
    loader: &str,
    meta: &TimeVectorMetadata,
    fallback_datetimes: Option<&[NaiveDateTime]>,
) -> Result<TimeIndex, GridVectorError> {
    let is_52_week_years = meta.is_52_week_years.unwrap_or(false);
    let extrapolate_first_point = meta.extrapolate_first_point.unwrap_or(false);
    let extrapolate_last_point = meta.extrapolate_last_point.unwrap_or(false);

    if let (Some(start), Some(period_duration), Some(num_periods)) =
        (meta.start, meta.frequency, meta.num_points)
    {
        return Ok(TimeIndex::FixedFrequency {
            start,
            period_duration,
            num_periods,
            is_52_week_years,
            extrapolate_first_point,
            extrapolate_last_point,
        });
    }

    let datetimes = fallback_datetimes.ok_or_else(|| GridVectorError::MissingFallbackDatetimes {
        loader: loader.to_string(),
    })?;
    Ok(TimeIndex::List {
        datetimes: datetimes.to_vec(),
        timezone: meta.timezone,
        is_52_week_years,
        extrapolate_first_point,
        extrapolate_last_point,
    })
}
