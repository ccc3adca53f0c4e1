//! Error types for the catalog and API sources.

use fontwatch_core::SourceError;

/// Errors raised while loading the CSV catalog.
#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    /// A required column header is absent.
    #[error("a column for \"{0}\" is missing")]
    MissingColumn(&'static str),

    /// Two headers map to the same field.
    #[error("column {index} (\"{header}\") maps to field \"{field}\" which already exists")]
    DuplicateColumn {
        field: &'static str,
        header: String,
        index: usize,
    },

    /// The sheet has no header row.
    #[error("the catalog sheet is empty")]
    Empty,

    /// The sheet is not valid CSV.
    #[error("CSV parse error: {0}")]
    Parse(#[from] csv::Error),

    /// Downloading the sheet failed.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Errors raised while fetching a document over http(s) or from a file url.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("don't know how to handle url \"{0}\"; it should start with \"http://\", \"https://\" or \"file://\"")]
    UnsupportedUrl(String),

    #[error("HTTP {status} returned from GET {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("reading {path} failed: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the web fonts API source.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("family \"{0}\" appears more than once in the API data")]
    DuplicateFamily(String),

    #[error("invalid API data: {0}")]
    InvalidData(#[from] serde_json::Error),

    #[error("unknown variant \"{variant}\" for family \"{family}\"")]
    UnknownVariant { family: String, variant: String },

    #[error(transparent)]
    Download(#[from] DownloadError),
}

impl DownloadError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<DownloadError> for SourceError {
    fn from(err: DownloadError) -> Self {
        if err.is_transient() {
            SourceError::transport(err.to_string())
        } else {
            SourceError::validation(err.to_string())
        }
    }
}

impl From<CsvError> for SourceError {
    fn from(err: CsvError) -> Self {
        match err {
            CsvError::Download(e) => e.into(),
            other => SourceError::validation(other.to_string()),
        }
    }
}

impl From<ApiError> for SourceError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Download(e) => e.into(),
            other => SourceError::validation(other.to_string()),
        }
    }
}
