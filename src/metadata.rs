use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use camino::Utf8Path;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GridVectorError;

/// Recognized time-vector metadata keys, spelled as they appear in source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetaKey {
    IdColumnName,
    IsMaxLevel,
    IsZeroOneProfile,
    Is52WeekYears,
    ExtrapolateFirstPoint,
    ExtrapolateLastPoint,
    IsRotating,
    IsMeanOne,
    RefPeriodStartYear,
    RefPeriodNumYears,
    NumPoints,
    Start,
    Frequency,
    TimeZone,
    Unit,
    Currency,
}

impl MetaKey {
    pub const ALL: [MetaKey; 16] = [
        MetaKey::IdColumnName,
        MetaKey::IsMaxLevel,
        MetaKey::IsZeroOneProfile,
        MetaKey::Is52WeekYears,
        MetaKey::ExtrapolateFirstPoint,
        MetaKey::ExtrapolateLastPoint,
        MetaKey::IsRotating,
        MetaKey::IsMeanOne,
        MetaKey::RefPeriodStartYear,
        MetaKey::RefPeriodNumYears,
        MetaKey::NumPoints,
        MetaKey::Start,
        MetaKey::Frequency,
        MetaKey::TimeZone,
        MetaKey::Unit,
        MetaKey::Currency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetaKey::IdColumnName => "IdColumnName",
            MetaKey::IsMaxLevel => "IsMaxLevel",
            MetaKey::IsZeroOneProfile => "IsZeroOneProfile",
            MetaKey::Is52WeekYears => "Is52WeekYears",
            MetaKey::ExtrapolateFirstPoint => "ExtrapolateFirstPoint",
            MetaKey::ExtrapolateLastPoint => "ExtrapolateLastPoint",
            MetaKey::IsRotating => "IsRotating",
            MetaKey::IsMeanOne => "IsMeanOne",
            MetaKey::RefPeriodStartYear => "RefPeriodStartYear",
            MetaKey::RefPeriodNumYears => "RefPeriodNumYears",
            MetaKey::NumPoints => "NumPoints",
            MetaKey::Start => "Start",
            MetaKey::Frequency => "Frequency",
            MetaKey::TimeZone => "TimeZone",
            MetaKey::Unit => "Unit",
            MetaKey::Currency => "Currency",
        }
    }

    /// Keys that may be entirely absent from a source file. `TimeZone` must be
    /// present even though its value may cast to `None`.
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            MetaKey::IdColumnName | MetaKey::Frequency | MetaKey::NumPoints | MetaKey::Start
        )
    }
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw metadata value as it arrives from one of the storage formats, before
/// being cast to its canonical type.
#[derive(Debug, Clone, PartialEq)]
pub enum RawMeta {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    Duration(Duration),
    Null,
}

impl RawMeta {
    fn as_text(&self) -> Option<String> {
        match self {
            RawMeta::Text(text) => Some(text.clone()),
            RawMeta::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    /// `None`, `b"None"`, `"null"` and empty text all mean "value not set".
    fn is_nullish(&self) -> bool {
        match self {
            RawMeta::Null => true,
            RawMeta::Text(_) | RawMeta::Bytes(_) => {
                let text = self.as_text().unwrap_or_default();
                let trimmed = text.trim().to_lowercase();
                trimmed.is_empty() || trimmed == "none" || trimmed == "null" || trimmed == "nan"
            }
            _ => false,
        }
    }
}

/// Canonical, typed metadata for one time vector. Every field is optional at
/// this level; which keys must have been present in the source is enforced by
/// [`process_meta`], not here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeVectorMetadata {
    pub id_column_name: Option<String>,
    pub is_max_level: Option<bool>,
    pub is_zero_one_profile: Option<bool>,
    pub is_52_week_years: Option<bool>,
    pub extrapolate_first_point: Option<bool>,
    pub extrapolate_last_point: Option<bool>,
    pub is_rotating: Option<bool>,
    pub is_mean_one: Option<bool>,
    pub ref_period_start_year: Option<i64>,
    pub ref_period_num_years: Option<i64>,
    pub num_points: Option<usize>,
    pub start: Option<NaiveDateTime>,
    pub frequency: Option<Duration>,
    pub timezone: Option<Tz>,
    pub unit: Option<String>,
    pub currency: Option<String>,
    /// Unrecognized keys, decoded to text and passed through untouched for the
    /// population layer.
    pub extra: BTreeMap<String, String>,
}

/// Cast a raw key/value mapping into typed metadata.
///
/// Recognized keys absent from `raw` are reported in the missing set. A key
/// that is present but cannot be coerced degrades to `None` instead of
/// failing; only required-key absence is treated as an error, by the caller.
pub fn cast_meta(raw: &BTreeMap<String, RawMeta>) -> (TimeVectorMetadata, BTreeSet<MetaKey>) {
    let mut meta = TimeVectorMetadata::default();
    let mut missing = BTreeSet::new();

    for key in MetaKey::ALL {
        let Some(value) = raw.get(key.as_str()) else {
            missing.insert(key);
            continue;
        };
        match key {
            MetaKey::IdColumnName => meta.id_column_name = cast_string(key, value),
            MetaKey::IsMaxLevel => meta.is_max_level = cast_bool(key, value),
            MetaKey::IsZeroOneProfile => meta.is_zero_one_profile = cast_bool(key, value),
            MetaKey::Is52WeekYears => meta.is_52_week_years = cast_bool(key, value),
            MetaKey::ExtrapolateFirstPoint => meta.extrapolate_first_point = cast_bool(key, value),
            MetaKey::ExtrapolateLastPoint => meta.extrapolate_last_point = cast_bool(key, value),
            MetaKey::IsRotating => meta.is_rotating = cast_bool(key, value),
            MetaKey::IsMeanOne => meta.is_mean_one = cast_bool(key, value),
            MetaKey::RefPeriodStartYear => meta.ref_period_start_year = cast_int(key, value),
            MetaKey::RefPeriodNumYears => meta.ref_period_num_years = cast_int(key, value),
            MetaKey::NumPoints => {
                meta.num_points = cast_int(key, value).and_then(|n| usize::try_from(n).ok());
            }
            MetaKey::Start => meta.start = cast_datetime(key, value),
            MetaKey::Frequency => meta.frequency = cast_duration(key, value),
            MetaKey::TimeZone => meta.timezone = cast_timezone(key, value),
            MetaKey::Unit => meta.unit = cast_string(key, value),
            MetaKey::Currency => meta.currency = cast_string(key, value),
        }
    }

    let recognized: BTreeSet<&str> = MetaKey::ALL.iter().map(|key| key.as_str()).collect();
    for (key, value) in raw {
        if !recognized.contains(key.as_str()) && !value.is_nullish() {
            meta.extra.insert(key.clone(), render_text(value));
        }
    }

    (meta, missing)
}

/// Cast raw metadata and enforce the required-key set, failing with a
/// loader-identifying error when a non-optional key is absent.
pub fn process_meta(
    loader: &str,
    source_file: &Utf8Path,
    raw: &BTreeMap<String, RawMeta>,
) -> Result<TimeVectorMetadata, GridVectorError> {
    let (meta, missing) = cast_meta(raw);
    let required_missing: Vec<&str> = missing
        .iter()
        .filter(|key| !key.is_optional())
        .map(|key| key.as_str())
        .collect();

    if !required_missing.is_empty() {
        return Err(GridVectorError::MissingMetadataKeys {
            loader: loader.to_string(),
            keys: format!("{{{}}}", required_missing.join(", ")),
            source_file: source_file.to_owned(),
            metadata: format!("{meta:?}"),
        });
    }
    Ok(meta)
}

/// The historical year span a profile or statistic is normalized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePeriod {
    pub start_year: i64,
    pub num_years: i64,
}

/// Extract the reference period from cast metadata. Both fields must be set,
/// or neither; presence is decided by the `Option`, so a start year of 0 with
/// a set num-years is a valid period.
pub fn reference_period_from(
    loader: &str,
    meta: &TimeVectorMetadata,
) -> Result<Option<ReferencePeriod>, GridVectorError> {
    match (meta.ref_period_start_year, meta.ref_period_num_years) {
        (Some(start_year), Some(num_years)) => Ok(Some(ReferencePeriod {
            start_year,
            num_years,
        })),
        (None, None) => Ok(None),
        _ => Err(GridVectorError::InvalidReferencePeriod {
            loader: loader.to_string(),
        }),
    }
}

fn render_text(value: &RawMeta) -> String {
    match value {
        RawMeta::Bool(true) => "True".to_string(),
        RawMeta::Bool(false) => "False".to_string(),
        RawMeta::Int(n) => n.to_string(),
        RawMeta::Float(x) => x.to_string(),
        RawMeta::Text(text) => text.clone(),
        RawMeta::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        RawMeta::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        RawMeta::Duration(d) => format!("{}s", d.num_seconds()),
        RawMeta::Null => String::new(),
    }
}

fn degrade<T>(key: MetaKey, value: &RawMeta) -> Option<T> {
    warn!(key = key.as_str(), ?value, "could not coerce metadata value, degrading to None");
    None
}

fn cast_bool(key: MetaKey, value: &RawMeta) -> Option<bool> {
    if value.is_nullish() {
        return None;
    }
    match value {
        RawMeta::Bool(b) => Some(*b),
        RawMeta::Int(0) => Some(false),
        RawMeta::Int(1) => Some(true),
        RawMeta::Float(x) if *x == 0.0 => Some(false),
        RawMeta::Float(x) if *x == 1.0 => Some(true),
        RawMeta::Text(_) | RawMeta::Bytes(_) => {
            let text = value.as_text()?;
            match text.trim().to_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => degrade(key, value),
            }
        }
        _ => degrade(key, value),
    }
}

fn cast_int(key: MetaKey, value: &RawMeta) -> Option<i64> {
    if value.is_nullish() {
        return None;
    }
    match value {
        RawMeta::Int(n) => Some(*n),
        RawMeta::Bool(b) => Some(i64::from(*b)),
        RawMeta::Float(x) if x.fract() == 0.0 => Some(*x as i64),
        RawMeta::Text(_) | RawMeta::Bytes(_) => {
            let text = value.as_text()?;
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|x| x.fract() == 0.0)
                        .map(|x| x as i64)
                })
                .or_else(|| degrade(key, value))
        }
        _ => degrade(key, value),
    }
}

fn cast_string(key: MetaKey, value: &RawMeta) -> Option<String> {
    let _ = key;
    if value.is_nullish() {
        return None;
    }
    Some(render_text(value))
}

fn cast_datetime(key: MetaKey, value: &RawMeta) -> Option<NaiveDateTime> {
    if value.is_nullish() {
        return None;
    }
    match value {
        RawMeta::DateTime(dt) => Some(*dt),
        RawMeta::Text(_) | RawMeta::Bytes(_) => {
            let text = value.as_text()?;
            parse_datetime_text(text.trim()).or_else(|| degrade(key, value))
        }
        _ => degrade(key, value),
    }
}

pub(crate) fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    // chrono rejects an hour without minutes, so pad the hour-only form
    let padded = format!("{text}:00");
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&padded, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn cast_duration(key: MetaKey, value: &RawMeta) -> Option<Duration> {
    if value.is_nullish() {
        return None;
    }
    match value {
        RawMeta::Duration(d) => Some(*d),
        RawMeta::Int(seconds) => Some(Duration::seconds(*seconds)),
        RawMeta::Float(seconds) => Some(Duration::seconds(*seconds as i64)),
        RawMeta::Text(_) | RawMeta::Bytes(_) => {
            let text = value.as_text()?;
            parse_duration_text(text.trim()).or_else(|| degrade(key, value))
        }
        _ => degrade(key, value),
    }
}

/// Parse durations such as `"1h"`, `"30min"`, `"15s"`, `"7d"`, `"52w"` or a
/// bare number of seconds.
pub(crate) fn parse_duration_text(text: &str) -> Option<Duration> {
    let lowered = text.to_lowercase();
    let trimmed = lowered.trim();
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Some(Duration::seconds(seconds));
    }
    let split = trimmed.find(|ch: char| ch.is_ascii_alphabetic())?;
    let (number, unit) = trimmed.split_at(split);
    let amount = number.trim().parse::<i64>().ok()?;
    match unit.trim() {
        "w" | "week" | "weeks" => Some(Duration::weeks(amount)),
        "d" | "day" | "days" => Some(Duration::days(amount)),
        "h" | "hour" | "hours" => Some(Duration::hours(amount)),
        "m" | "min" | "minute" | "minutes" => Some(Duration::minutes(amount)),
        "s" | "sec" | "second" | "seconds" => Some(Duration::seconds(amount)),
        _ => None,
    }
}

fn cast_timezone(key: MetaKey, value: &RawMeta) -> Option<Tz> {
    if value.is_nullish() {
        return None;
    }
    let text = value.as_text()?;
    Tz::from_str(text.trim()).ok().or_else(|| degrade(key, value))
}
