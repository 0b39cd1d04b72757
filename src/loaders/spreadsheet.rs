use std::collections::BTreeMap;
use std::fmt;

use calamine::{Data, Reader, Xlsx, open_workbook};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use tracing::debug;

use crate::error::GridVectorError;
use crate::loader::{TimeVectorLoader, resolve_source};
use crate::metadata::{RawMeta, TimeVectorMetadata, parse_datetime_text, process_meta};
use crate::timeindex::{TimeIndex, build_index};

pub const DATA_SHEET: &str = "Data";
pub const METADATA_SHEET: &str = "Metadata";
pub const DATETIME_COLUMN: &str = "DateTime";

/// Loader for time vectors stored in a spreadsheet workbook.
///
/// The `Data` sheet holds either a vertical layout (one `DateTime` column
/// plus one column per vector id) or a horizontal one (one row per vector id,
/// one column per year/period label). Horizontal sheets are transposed into
/// the vertical shape before caching.
pub struct SpreadsheetTimeVectorLoader {
    source: Utf8PathBuf,
    relative_loc: Option<Utf8PathBuf>,
    require_whole_years: bool,
    data: Option<ParsedSheet>,
    meta: Option<TimeVectorMetadata>,
}

#[derive(Debug, Clone)]
struct ParsedSheet {
    datetimes: Vec<NaiveDateTime>,
    columns: Vec<(String, Vec<f64>)>,
}

impl fmt::Display for SpreadsheetTimeVectorLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpreadsheetTimeVectorLoader({})", self.path())
    }
}

impl SpreadsheetTimeVectorLoader {
    pub fn new(
        source: &Utf8Path,
        relative_loc: Option<&Utf8Path>,
        require_whole_years: bool,
    ) -> Self {
        Self {
            source: source.to_owned(),
            relative_loc: relative_loc.map(Utf8Path::to_owned),
            require_whole_years,
            data: None,
            meta: None,
        }
    }

    pub fn path(&self) -> Utf8PathBuf {
        resolve_source(&self.source, self.relative_loc.as_deref())
    }

    fn read_error(&self, message: impl fmt::Display) -> GridVectorError {
        GridVectorError::SpreadsheetRead {
            loader: self.to_string(),
            message: message.to_string(),
        }
    }

    fn ensure_data(&mut self) -> Result<&ParsedSheet, GridVectorError> {
        if self.data.is_none() {
            let parsed = self.read_data_sheet()?;
            debug!(path = %self.path(), vectors = parsed.columns.len(), "cached spreadsheet payload");
            self.data = Some(parsed);
        }
        Ok(self.data.as_ref().expect("cache populated above"))
    }

    fn read_data_sheet(&self) -> Result<ParsedSheet, GridVectorError> {
        let path = self.path();
        let mut workbook: Xlsx<_> =
            open_workbook(path.as_std_path()).map_err(|err| self.read_error(err))?;
        let range = workbook
            .worksheet_range(DATA_SHEET)
            .map_err(|err| self.read_error(err))?;

        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            return Err(self.read_error(format!("sheet '{DATA_SHEET}' is empty")));
        };

        if is_horizontal_format(header) {
            self.parse_horizontal(header, rows)
        } else {
            self.parse_vertical(header, rows)
        }
    }

    fn parse_vertical<'a>(
        &self,
        header: &[Data],
        rows: impl Iterator<Item = &'a [Data]>,
    ) -> Result<ParsedSheet, GridVectorError> {
        let names: Vec<String> = header.iter().map(cell_to_label).collect();
        let Some(datetime_col) = names.iter().position(|name| name == DATETIME_COLUMN) else {
            return Err(GridVectorError::MissingDatetimeColumn {
                loader: self.to_string(),
                column: DATETIME_COLUMN.to_string(),
                source_file: self.path(),
            });
        };

        let mut datetimes = Vec::new();
        let mut columns: Vec<(String, Vec<f64>)> = names
            .iter()
            .enumerate()
            .filter(|(position, _)| *position != datetime_col)
            .map(|(_, name)| (name.clone(), Vec::new()))
            .collect();

        for row in rows {
            let cell = row.get(datetime_col).unwrap_or(&Data::Empty);
            datetimes.push(self.cell_to_datetime(cell)?);
            let mut column = 0;
            for (position, value) in row.iter().enumerate() {
                if position == datetime_col {
                    continue;
                }
                if let Some((_, values)) = columns.get_mut(column) {
                    values.push(cell_to_f64(value));
                }
                column += 1;
            }
        }

        Ok(ParsedSheet { datetimes, columns })
    }

    /// Transpose a horizontal sheet into the vertical shape: each row's id
    /// becomes a column name and the year/period labels of the header become
    /// the datetime column.
    fn parse_horizontal<'a>(
        &self,
        header: &[Data],
        rows: impl Iterator<Item = &'a [Data]>,
    ) -> Result<ParsedSheet, GridVectorError> {
        let labels: Vec<String> = header.iter().skip(1).map(cell_to_label).collect();
        let datetimes = self.to_iso_datetimes(&labels)?;

        let mut columns = Vec::new();
        for row in rows {
            let Some(id_cell) = row.first() else {
                continue;
            };
            let vector_id = cell_to_label(id_cell);
            if vector_id.is_empty() {
                continue;
            }
            let mut values: Vec<f64> = row.iter().skip(1).map(cell_to_f64).collect();
            values.resize(datetimes.len(), f64::NAN);
            columns.push((vector_id, values));
        }

        Ok(ParsedSheet { datetimes, columns })
    }

    /// Normalize year/period labels into datetimes. Accepts bare calendar
    /// years, year-month, year-month-day and increasingly precise date-time
    /// strings. A bare calendar year Y resolves to the Monday of ISO week 1
    /// of year Y (2025 becomes 2024-12-30 00:00:00); the exact convention is
    /// load-bearing for year-start alignment and must not drift to Jan 1.
    pub fn to_iso_datetimes(&self, labels: &[String]) -> Result<Vec<NaiveDateTime>, GridVectorError> {
        labels
            .iter()
            .map(|label| {
                parse_period_label(label).ok_or_else(|| GridVectorError::DatetimeParse {
                    loader: self.to_string(),
                    value: label.clone(),
                })
            })
            .collect()
    }

    fn cell_to_datetime(&self, cell: &Data) -> Result<NaiveDateTime, GridVectorError> {
        let parsed = match cell {
            Data::DateTime(dt) => dt.as_datetime(),
            Data::DateTimeIso(text) | Data::String(text) => parse_datetime_text(text.trim()),
            _ => None,
        };
        parsed.ok_or_else(|| GridVectorError::DatetimeParse {
            loader: self.to_string(),
            value: cell.to_string(),
        })
    }

    fn ensure_meta(&mut self) -> Result<&TimeVectorMetadata, GridVectorError> {
        if self.meta.is_none() {
            let raw = self.read_metadata_sheet()?;
            let meta = process_meta(&self.to_string(), &self.path(), &raw)?;
            self.meta = Some(meta);
        }
        Ok(self.meta.as_ref().expect("cache populated above"))
    }

    fn read_metadata_sheet(&self) -> Result<BTreeMap<String, RawMeta>, GridVectorError> {
        let path = self.path();
        let mut workbook: Xlsx<_> =
            open_workbook(path.as_std_path()).map_err(|err| self.read_error(err))?;
        let range = workbook
            .worksheet_range(METADATA_SHEET)
            .map_err(|err| self.read_error(err))?;

        let mut raw = BTreeMap::new();
        for row in range.rows() {
            let Some(key_cell) = row.first() else {
                continue;
            };
            let key = cell_to_label(key_cell);
            if key.is_empty() {
                continue;
            }
            let value = row.get(1).map_or(RawMeta::Null, cell_to_raw);
            raw.insert(key, value);
        }
        Ok(raw)
    }
}

/// Normalize one year/period label. Accepts bare calendar years, year-month,
/// year-month-day and increasingly precise date-time strings.
fn parse_period_label(label: &str) -> Option<NaiveDateTime> {
    let trimmed = label.trim();
    if let Ok(year) = trimmed.parse::<i32>() {
        return NaiveDate::from_isoywd_opt(year, 1, Weekday::Mon)
            .and_then(|date| date.and_hms_opt(0, 0, 0));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d") {
        // year-month label, e.g. "2025-10"
        if trimmed.len() == 7 {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    parse_datetime_text(trimmed)
}

/// A sheet carrying a `DateTime` header is always vertical. Otherwise any
/// non-first header cell that is numeric or reads as a year/period label marks
/// the sheet as horizontal.
fn is_horizontal_format(header: &[Data]) -> bool {
    let has_datetime_header = header
        .iter()
        .any(|cell| matches!(cell, Data::String(text) if text.trim() == DATETIME_COLUMN));
    if has_datetime_header {
        return false;
    }
    header.iter().skip(1).any(|cell| match cell {
        Data::Float(_) | Data::Int(_) => true,
        Data::String(text) => parse_period_label(text).is_some(),
        _ => false,
    })
}

fn cell_to_label(cell: &Data) -> String {
    match cell {
        Data::String(text) => text.trim().to_string(),
        Data::Float(x) if x.fract() == 0.0 => format!("{}", *x as i64),
        Data::Int(n) => n.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_to_f64(cell: &Data) -> f64 {
    match cell {
        Data::Float(x) => *x,
        Data::Int(n) => *n as f64,
        Data::String(text) => text.trim().parse().unwrap_or(f64::NAN),
        Data::Bool(b) => f64::from(*b),
        _ => f64::NAN,
    }
}

fn cell_to_raw(cell: &Data) -> RawMeta {
    match cell {
        Data::Bool(b) => RawMeta::Bool(*b),
        Data::Int(n) => RawMeta::Int(*n),
        Data::Float(x) => RawMeta::Float(*x),
        Data::String(text) => RawMeta::Text(text.clone()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or(RawMeta::Null, RawMeta::DateTime),
        Data::DateTimeIso(text) | Data::DurationIso(text) => RawMeta::Text(text.clone()),
        Data::Empty | Data::Error(_) => RawMeta::Null,
    }
}

impl TimeVectorLoader for SpreadsheetTimeVectorLoader {
    fn source(&self) -> &Utf8Path {
        &self.source
    }

    fn require_whole_years(&self) -> bool {
        self.require_whole_years
    }

    fn vector_ids(&mut self) -> Result<Vec<String>, GridVectorError> {
        let parsed = self.ensure_data()?;
        Ok(parsed.columns.iter().map(|(name, _)| name.clone()).collect())
    }

    fn values(&mut self, vector_id: &str) -> Result<Vec<f64>, GridVectorError> {
        let parsed = self.ensure_data()?;
        match parsed.columns.iter().find(|(name, _)| name == vector_id) {
            Some((_, values)) => Ok(values.clone()),
            None => Err(GridVectorError::VectorNotFound {
                loader: self.to_string(),
                vector_id: vector_id.to_string(),
                source_file: self.path(),
            }),
        }
    }

    fn index(&mut self, vector_id: &str) -> Result<TimeIndex, GridVectorError> {
        let meta = self.metadata(vector_id)?;
        let datetimes = self.ensure_data()?.datetimes.clone();
        build_index(&self.to_string(), &meta, Some(&datetimes))
    }

    fn metadata(&mut self, _vector_id: &str) -> Result<TimeVectorMetadata, GridVectorError> {
        // metadata is file-level in this format, so the id is irrelevant
        Ok(self.ensure_meta()?.clone())
    }
}
