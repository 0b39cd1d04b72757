use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GridVectorError {
    #[error(
        "{loader} could not find keys: {keys} in metadata of file {source_file}. \
         Metadata: {metadata}"
    )]
    MissingMetadataKeys {
        loader: String,
        keys: String,
        source_file: Utf8PathBuf,
        metadata: String,
    },

    #[error(
        "{loader}: Both RefPeriodStartYear and RefPeriodNumYears must be provided for a valid \
         reference period. Alternatively, both must be None for undefined reference period."
    )]
    InvalidReferencePeriod { loader: String },

    #[error("unsupported source filetype: {0}")]
    UnsupportedFileType(Utf8PathBuf),

    #[error("File id '{0}' not found in database folder map.")]
    UnknownFileId(String),

    #[error("The database folder {0} does not exist.")]
    MissingDatabaseFolder(Utf8PathBuf),

    #[error(
        "Found multiple files with ID {file_id} (with different extensions: {extensions}) in \
         database folder {folder}. File names must be unique."
    )]
    AmbiguousFileId {
        file_id: String,
        extensions: String,
        folder: Utf8PathBuf,
    },

    #[error("file id '{0}' not found in any root of the database hierarchy")]
    FileNotFoundInHierarchy(String),

    #[error("Working copy of database hierarchy already exists. Cannot edit the working copy: {0}")]
    WorkingCopyExists(Utf8PathBuf),

    #[error("{loader}: vector '{vector_id}' not found in {source_file}")]
    VectorNotFound {
        loader: String,
        vector_id: String,
        source_file: Utf8PathBuf,
    },

    #[error(
        "{loader} expected '{vector_id}' in {kind} '{field}' but '{vector_id}' was not found in \
         '{field}' group."
    )]
    MissingVectorInGroup {
        loader: String,
        field: String,
        vector_id: String,
        kind: String,
    },

    #[error(
        "{loader} expected '{vector_id}' in {kind} '{field}' or a fallback {kind} \
         'common_{field}' in container file but '{vector_id}' was not found in '{field}' group, \
         and fallback {kind} 'common_{field}' not found in file."
    )]
    MissingVectorAndFallback {
        loader: String,
        field: String,
        vector_id: String,
        kind: String,
    },

    #[error(
        "{loader} expected '{vector_id}' in {kind} '{field}' but '{field}' was not found in file."
    )]
    MissingContainerField {
        loader: String,
        field: String,
        vector_id: String,
        kind: String,
    },

    #[error(
        "{loader} expected '{vector_id}' in {kind} '{field}' or a fallback {kind} \
         'common_{field}' in container file but '{field}' was not found in file, and fallback \
         {kind} 'common_{field}' not found in file."
    )]
    MissingContainerFieldAndFallback {
        loader: String,
        field: String,
        vector_id: String,
        kind: String,
    },

    #[error(
        "Loader {loader} could not convert value '{value}' to datetime format. Check formatting, \
         for example number of spaces."
    )]
    DatetimeParse { loader: String, value: String },

    #[error("{loader}: no datetime column '{column}' found in {source_file}")]
    MissingDatetimeColumn {
        loader: String,
        column: String,
        source_file: Utf8PathBuf,
    },

    #[error(
        "{loader}: metadata routes to a list time index but no literal datetimes are available"
    )]
    MissingFallbackDatetimes { loader: String },

    #[error("{loader}: spreadsheet read failed: {message}")]
    SpreadsheetRead { loader: String, message: String },

    #[error("{loader}: columnar read failed: {message}")]
    ColumnarRead { loader: String, message: String },

    #[error("{loader}: container read failed: {message}")]
    ContainerRead { loader: String, message: String },

    #[error("Found errors in {loader}:{problems}")]
    Validation { loader: String, problems: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
