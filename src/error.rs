use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Split;

#[derive(Debug, Error, Diagnostic)]
pub enum PsstError {
    #[error("version {version_id} not found (known versions: {known})")]
    VersionNotFound { version_id: String, known: String },

    #[error("no dataset versions available")]
    EmptyLedger,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("could not reach {url}: {message}")]
    Connectivity { url: String, message: String },

    #[error("authentication rejected for {url}")]
    #[diagnostic(help("check the username and password stored in the psstdata settings file"))]
    Unauthorized { url: String },

    #[error("{url} returned status {status}: {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("split directory already exists: {0}")]
    AlreadyExists(Utf8PathBuf),

    #[error("couldn't connect to data server, and no data found in {cache_root}")]
    Unavailable {
        cache_root: Utf8PathBuf,
        #[source]
        source: Box<PsstError>,
    },

    #[error("failed to download split `{split}` of version {version_id}")]
    SplitDownload {
        version_id: String,
        split: Split,
        #[source]
        source: Box<PsstError>,
    },

    #[error("version {0} is not bound to a local directory")]
    DetachedVersion(String),

    #[error("invalid version id: {0}")]
    InvalidVersionId(String),

    #[error("invalid split: {0}")]
    InvalidSplit(String),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("failed to parse version manifest: {0}")]
    ManifestParse(String),

    #[error("archive for split `{split}` has no top-level `{split}/` directory")]
    ArchiveLayout { split: Split },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("credential prompt failed: {0}")]
    Prompt(String),

    #[error("unable to resolve settings directory")]
    SettingsPath,

    #[error("failed to read {path}: {message}")]
    Tsv { path: Utf8PathBuf, message: String },

    #[error("data for split `{0}` is not available")]
    DataUnavailable(Split),

    #[error("{first}/{second} have overlapping sessions")]
    OverlappingSessions { first: Split, second: Split },

    #[error("could not classify AQ score into severity: {0}")]
    InvalidSeverityScore(String),
}

impl PsstError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, PsstError::Connectivity { .. })
    }

    pub fn is_http_status(&self) -> bool {
        matches!(self, PsstError::HttpStatus { .. })
    }
}
