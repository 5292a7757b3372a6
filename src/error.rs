use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors surfaced by the pipeline. Everything else is absorbed at the
/// dataset-parser boundary and reported through the diagnostics sink.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no {family} archive could be downloaded and parsed")]
    TotalFailure { family: &'static str },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single URL could not be fetched. Never fatal on its own.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Locating or reading a CSV entry inside an archive failed.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no entry matching {pattern:?} inside {archive}")]
    NoMatch { pattern: String, archive: PathBuf },

    #[error("cannot open {archive}: {source}")]
    Io {
        archive: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt archive {archive}: {source}")]
    Zip {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("CSV parse error in {entry} at record {record}: {source}")]
    Csv {
        entry: String,
        record: usize,
        #[source]
        source: csv::Error,
    },

    #[error("cannot read spreadsheet {path}: {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("spreadsheet {path} has no sheet with a header row")]
    EmptySheet { path: PathBuf },
}

/// Source headers could not be projected onto the canonical schema.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{table}: required column {canonical} not found (looked for {candidates:?})")]
    MissingColumn {
        table: &'static str,
        canonical: &'static str,
        candidates: &'static [&'static str],
    },
}

/// Extraction and mapping failures share the per-table-kind skip policy.
#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// A warehouse load did not complete.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request to the warehouse failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("warehouse answered with HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("load job {job_id} failed: {message}")]
    Job { job_id: String, message: String },
}
