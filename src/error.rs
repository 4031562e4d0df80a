use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Stage;

pub type Result<T, E = CrawlError> = std::result::Result<T, E>;

/// Errors raised by the fetch, extract and export stages.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("could not start browser session at {endpoint}: {reason}")]
    Session { endpoint: String, reason: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("refusing to export {filename}: column lengths differ ({})", describe_lengths(.lengths))]
    LengthMismatch {
        filename: PathBuf,
        lengths: Vec<(&'static str, usize)>,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{} is held by another run; if no crawler is running, delete {} and retry", .path.display(), .path.display())]
    Locked { path: PathBuf },

    #[error("pipeline cannot go from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },
}

/// Why a markup file or a single listing card could not be turned into records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no listing cards found")]
    NoListings,

    #[error("listing card has no {field}")]
    MissingField { field: &'static str },

    #[error("unreadable final price {text:?}")]
    InvalidPrice { text: String },
}

impl CrawlError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CrawlError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        CrawlError::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn fetch(url: &str, reason: impl fmt::Display) -> Self {
        CrawlError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn describe_lengths(lengths: &[(&'static str, usize)]) -> String {
    lengths
        .iter()
        .map(|(column, len)| format!("{}={}", column, len))
        .collect::<Vec<_>>()
        .join(", ")
}
