use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinates::CoordinateError;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// Backend could not be opened: missing credentials, missing runtime,
    /// unreadable or corrupt source.
    #[error("backend initialization failed: {0}")]
    BackendInit(String),
    #[error("unsupported source {}: {reason}", path.display())]
    UnsupportedSource { path: PathBuf, reason: String },
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
    #[error("page {page}: {message}")]
    PageExtraction { page: usize, message: String },
    /// The worker pool itself could not be started.
    #[error("executor error: {0}")]
    Executor(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub fn page(page: usize, message: impl Into<String>) -> Self {
        Self::PageExtraction {
            page,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BackendInit(_) => ErrorKind::BackendInit,
            Self::UnsupportedSource { .. } => ErrorKind::UnsupportedSource,
            Self::Coordinate(CoordinateError::MissingResolution { .. }) => {
                ErrorKind::MissingResolution
            }
            Self::Coordinate(CoordinateError::MissingPageDimensions) => {
                ErrorKind::MissingPageDimensions
            }
            Self::PageExtraction { .. } | Self::Executor(_) | Self::Io(_) => {
                ErrorKind::PageExtraction
            }
        }
    }

    /// Turn this error into the descriptor recorded for a failed page.
    pub fn into_page_error(self, page: usize) -> PageError {
        let kind = self.kind();
        let message = match self {
            Self::PageExtraction { message, .. } => message,
            other => other.to_string(),
        };
        PageError {
            page,
            kind,
            message,
        }
    }
}

/// Serializable discriminant of [`ExtractError`], carried per failed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BackendInit,
    UnsupportedSource,
    MissingResolution,
    MissingPageDimensions,
    PageExtraction,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BackendInit => "backend_init",
            Self::UnsupportedSource => "unsupported_source",
            Self::MissingResolution => "missing_resolution",
            Self::MissingPageDimensions => "missing_page_dimensions",
            Self::PageExtraction => "page_extraction",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why a single page failed. Carries no partial page data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageError {
    pub page: usize,
    pub kind: ErrorKind,
    pub message: String,
}

impl PageError {
    pub fn new(page: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            page,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} ({}): {}", self.page, self.kind, self.message)
    }
}
