use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::GridVectorError;
use crate::loaders::columnar::ColumnarTimeVectorLoader;
use crate::loaders::container::ContainerTimeVectorLoader;
use crate::loaders::spreadsheet::SpreadsheetTimeVectorLoader;
use crate::metadata::{ReferencePeriod, TimeVectorMetadata, reference_period_from};
use crate::timeindex::TimeIndex;
use crate::validate::{ValidationReport, validate_vector};

/// Common capability set of the three format loaders.
///
/// Each loader owns its cache exclusively and is single-threaded by design;
/// methods take `&mut self` so the first access can populate the cache.
/// `Display` is part of the contract because every error message names the
/// loader it came from.
pub trait TimeVectorLoader: fmt::Display {
    fn source(&self) -> &Utf8Path;
    fn require_whole_years(&self) -> bool;

    /// All vector ids exposed by the backing file.
    fn vector_ids(&mut self) -> Result<Vec<String>, GridVectorError>;

    /// Numeric values of one vector, parsing and caching the whole file on
    /// first call.
    fn values(&mut self, vector_id: &str) -> Result<Vec<f64>, GridVectorError>;

    /// Time axis of one vector, built from its resolved metadata and, where
    /// the metadata is incomplete, its literal datetime sequence.
    fn index(&mut self, vector_id: &str) -> Result<TimeIndex, GridVectorError>;

    /// Cast metadata of one vector.
    fn metadata(&mut self, vector_id: &str) -> Result<TimeVectorMetadata, GridVectorError>;

    fn is_max_level(&mut self, vector_id: &str) -> Result<Option<bool>, GridVectorError> {
        Ok(self.metadata(vector_id)?.is_max_level)
    }

    fn is_zero_one_profile(&mut self, vector_id: &str) -> Result<Option<bool>, GridVectorError> {
        Ok(self.metadata(vector_id)?.is_zero_one_profile)
    }

    fn unit(&mut self, vector_id: &str) -> Result<Option<String>, GridVectorError> {
        Ok(self.metadata(vector_id)?.unit)
    }

    fn currency(&mut self, vector_id: &str) -> Result<Option<String>, GridVectorError> {
        Ok(self.metadata(vector_id)?.currency)
    }

    fn reference_period(
        &mut self,
        vector_id: &str,
    ) -> Result<Option<ReferencePeriod>, GridVectorError> {
        let meta = self.metadata(vector_id)?;
        reference_period_from(&self.to_string(), &meta)
    }

    /// Validate every vector in the file and raise exactly one composite
    /// error listing all distinct problems, never one error per vector.
    fn validate_vectors(&mut self) -> Result<(), GridVectorError> {
        let mut report = ValidationReport::new();
        for vector_id in self.vector_ids()? {
            let index = self.index(&vector_id)?;
            let values = self.values(&vector_id)?;
            report.extend(validate_vector(
                &vector_id,
                &index,
                &values,
                self.require_whole_years(),
            ));
        }
        report.finish(&self.to_string())
    }
}

/// Join a source directory and an optional relative location into the full
/// path of the backing file.
pub(crate) fn resolve_source(source: &Utf8Path, relative_loc: Option<&Utf8Path>) -> Utf8PathBuf {
    match relative_loc {
        Some(relative) => source.join(relative),
        None => source.to_owned(),
    }
}

/// Open the loader matching the file's extension.
pub fn open_time_vector_loader(
    source: &Utf8Path,
    relative_loc: Option<&Utf8Path>,
    require_whole_years: bool,
) -> Result<Box<dyn TimeVectorLoader>, GridVectorError> {
    let path = resolve_source(source, relative_loc);
    match path.extension() {
        Some("xlsx") => Ok(Box::new(SpreadsheetTimeVectorLoader::new(
            source,
            relative_loc,
            require_whole_years,
        ))),
        Some("parquet") => Ok(Box::new(ColumnarTimeVectorLoader::new(
            source,
            relative_loc,
            require_whole_years,
        ))),
        Some("json") => Ok(Box::new(ContainerTimeVectorLoader::new(
            source,
            relative_loc,
            require_whole_years,
        ))),
        _ => Err(GridVectorError::UnsupportedFileType(path)),
    }
}
