use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;

use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::array::{
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use crate::error::GridVectorError;
use crate::loader::{TimeVectorLoader, resolve_source};
use crate::loaders::spreadsheet::DATETIME_COLUMN;
use crate::metadata::{RawMeta, TimeVectorMetadata, parse_datetime_text, process_meta};
use crate::timeindex::{TimeIndex, build_index};

/// Loader for time vectors stored as named arrays in a columnar file.
///
/// A shared `DateTime` column provides the literal time axis when the footer
/// metadata declares no explicit frequency. Per-file metadata travels as text
/// in the footer's key/value pairs.
pub struct ColumnarTimeVectorLoader {
    source: Utf8PathBuf,
    relative_loc: Option<Utf8PathBuf>,
    require_whole_years: bool,
    data: Option<ParsedTable>,
    meta: Option<TimeVectorMetadata>,
}

#[derive(Debug, Clone)]
struct ParsedTable {
    datetimes: Vec<NaiveDateTime>,
    columns: Vec<(String, Vec<f64>)>,
}

impl fmt::Display for ColumnarTimeVectorLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColumnarTimeVectorLoader({})", self.path())
    }
}

impl ColumnarTimeVectorLoader {
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
        GridVectorError::ColumnarRead {
            loader: self.to_string(),
            message: message.to_string(),
        }
    }

    fn ensure_data(&mut self) -> Result<&ParsedTable, GridVectorError> {
        if self.data.is_none() {
            let parsed = self.read_table()?;
            debug!(path = %self.path(), vectors = parsed.columns.len(), "cached columnar payload");
            self.data = Some(parsed);
        }
        Ok(self.data.as_ref().expect("cache populated above"))
    }

    fn read_table(&self) -> Result<ParsedTable, GridVectorError> {
        let path = self.path();
        let file = File::open(path.as_std_path()).map_err(|err| self.read_error(err))?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|err| self.read_error(err))?;
        let reader = builder.build().map_err(|err| self.read_error(err))?;

        let mut datetimes = Vec::new();
        let mut columns: Vec<(String, Vec<f64>)> = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|err| self.read_error(err))?;
            self.append_batch(&batch, &mut datetimes, &mut columns)?;
        }

        if datetimes.is_empty() && columns.iter().all(|(_, values)| values.is_empty()) {
            return Err(self.read_error("file holds no rows"));
        }
        Ok(ParsedTable { datetimes, columns })
    }

    fn append_batch(
        &self,
        batch: &RecordBatch,
        datetimes: &mut Vec<NaiveDateTime>,
        columns: &mut Vec<(String, Vec<f64>)>,
    ) -> Result<(), GridVectorError> {
        for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
            if field.name() == DATETIME_COLUMN {
                datetimes.extend(self.datetime_column(field.name(), array.as_ref())?);
                continue;
            }
            let values = self.numeric_column(field.name(), array.as_ref())?;
            match columns.iter_mut().find(|(name, _)| name == field.name()) {
                Some((_, existing)) => existing.extend(values),
                None => columns.push((field.name().clone(), values)),
            }
        }
        Ok(())
    }

    fn numeric_column(
        &self,
        name: &str,
        array: &dyn Array,
    ) -> Result<Vec<f64>, GridVectorError> {
        if let Some(floats) = array.as_any().downcast_ref::<Float64Array>() {
            return Ok((0..floats.len())
                .map(|row| if floats.is_null(row) { f64::NAN } else { floats.value(row) })
                .collect());
        }
        if let Some(ints) = array.as_any().downcast_ref::<Int64Array>() {
            return Ok((0..ints.len())
                .map(|row| if ints.is_null(row) { f64::NAN } else { ints.value(row) as f64 })
                .collect());
        }
        Err(self.read_error(format!(
            "column '{name}' has unsupported type {}",
            array.data_type()
        )))
    }

    fn datetime_column(
        &self,
        name: &str,
        array: &dyn Array,
    ) -> Result<Vec<NaiveDateTime>, GridVectorError> {
        let bad_row = |row: usize| self.read_error(format!("column '{name}' row {row} is not a valid timestamp"));
        match array.data_type() {
            DataType::Timestamp(TimeUnit::Second, _) => {
                let values = array
                    .as_any()
                    .downcast_ref::<TimestampSecondArray>()
                    .ok_or_else(|| bad_row(0))?;
                (0..values.len())
                    .map(|row| {
                        if values.is_null(row) {
                            return Err(bad_row(row));
                        }
                        DateTime::from_timestamp(values.value(row), 0)
                            .map(|dt| dt.naive_utc())
                            .ok_or_else(|| bad_row(row))
                    })
                    .collect()
            }
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                let values = array
                    .as_any()
                    .downcast_ref::<TimestampMillisecondArray>()
                    .ok_or_else(|| bad_row(0))?;
                (0..values.len())
                    .map(|row| {
                        if values.is_null(row) {
                            return Err(bad_row(row));
                        }
                        DateTime::from_timestamp_millis(values.value(row))
                            .map(|dt| dt.naive_utc())
                            .ok_or_else(|| bad_row(row))
                    })
                    .collect()
            }
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                let values = array
                    .as_any()
                    .downcast_ref::<TimestampMicrosecondArray>()
                    .ok_or_else(|| bad_row(0))?;
                (0..values.len())
                    .map(|row| {
                        if values.is_null(row) {
                            return Err(bad_row(row));
                        }
                        DateTime::from_timestamp_micros(values.value(row))
                            .map(|dt| dt.naive_utc())
                            .ok_or_else(|| bad_row(row))
                    })
                    .collect()
            }
            DataType::Timestamp(TimeUnit::Nanosecond, _) => {
                let values = array
                    .as_any()
                    .downcast_ref::<TimestampNanosecondArray>()
                    .ok_or_else(|| bad_row(0))?;
                (0..values.len())
                    .map(|row| {
                        if values.is_null(row) {
                            return Err(bad_row(row));
                        }
                        Ok(DateTime::from_timestamp_nanos(values.value(row)).naive_utc())
                    })
                    .collect()
            }
            DataType::Utf8 => {
                let values =
                    array.as_any().downcast_ref::<StringArray>().ok_or_else(|| bad_row(0))?;
                (0..values.len())
                    .map(|row| {
                        if values.is_null(row) {
                            return Err(bad_row(row));
                        }
                        parse_datetime_text(values.value(row).trim()).ok_or_else(|| bad_row(row))
                    })
                    .collect()
            }
            other => Err(self.read_error(format!(
                "column '{name}' has unsupported datetime type {other}"
            ))),
        }
    }

    fn ensure_meta(&mut self) -> Result<&TimeVectorMetadata, GridVectorError> {
        if self.meta.is_none() {
            let raw = self.read_footer_metadata()?;
            let meta = process_meta(&self.to_string(), &self.path(), &raw)?;
            self.meta = Some(meta);
        }
        Ok(self.meta.as_ref().expect("cache populated above"))
    }

    fn read_footer_metadata(&self) -> Result<BTreeMap<String, RawMeta>, GridVectorError> {
        let path = self.path();
        let file = File::open(path.as_std_path()).map_err(|err| self.read_error(err))?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|err| self.read_error(err))?;

        let mut raw = BTreeMap::new();
        if let Some(pairs) = builder.metadata().file_metadata().key_value_metadata() {
            for pair in pairs {
                let value = pair
                    .value
                    .as_ref()
                    .map_or(RawMeta::Null, |text| RawMeta::Text(text.clone()));
                raw.insert(pair.key.clone(), value);
            }
        }
        Ok(raw)
    }
}

impl TimeVectorLoader for ColumnarTimeVectorLoader {
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
        let fallback = if datetimes.is_empty() { None } else { Some(datetimes.as_slice()) };
        build_index(&self.to_string(), &meta, fallback)
    }

    fn metadata(&mut self, _vector_id: &str) -> Result<TimeVectorMetadata, GridVectorError> {
        // metadata is file-level in this format, so the id is irrelevant
        Ok(self.ensure_meta()?.clone())
    }
}
