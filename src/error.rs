use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot read report file {}: {source}", .path.display())]
    ReportFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },

    /// The report lacks one of the markers that delimit the process list.
    #[error("malformed report: {0}")]
    MissingSection(&'static str),

    #[error("malformed process row {line:?}: {reason}")]
    MalformedRow { line: String, reason: String },

    #[error("unexpected process table output: {0}")]
    ProcessTable(String),

    #[error("logger setup failed: {0}")]
    Logger(#[from] flexi_logger::FlexiLoggerError),
}

impl Error {
    pub fn malformed_row(line: &str, reason: impl Into<String>) -> Self {
        Error::MalformedRow {
            line: line.trim_end().to_string(),
            reason: reason.into(),
        }
    }
}
