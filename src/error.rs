use std::io;

use thiserror::Error;

use crate::store::StoreError;
use crate::timer::TimerError;

pub type Result<T> = std::result::Result<T, AppError>;

/// Input problems surfaced to the user straight away and never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} is required.")]
    MissingField(&'static str),
    #[error("Hourly rate must be a positive number.")]
    NonPositiveRate,
    #[error("Budget must be a positive number.")]
    NonPositiveBudget,
    #[error("End time must be after start time.")]
    EndNotAfterStart,
    #[error("Duration must be greater than zero.")]
    NonPositiveDuration,
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("Invalid date '{0}'. Use YYYY-MM-DD.")]
    InvalidDate(String),
    #[error("Invalid time '{0}'. Use HH:MM.")]
    InvalidTime(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{kind} not found: {reference}")]
    NotFound {
        kind: &'static str,
        reference: String,
    },
    #[error("Cancelled: {0} was not confirmed.")]
    NotConfirmed(String),
    #[error("Partial failure: {completed} of {requested} changes applied before: {source}")]
    Partial {
        completed: usize,
        requested: usize,
        #[source]
        source: Box<AppError>,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn not_found(kind: &'static str, reference: impl ToString) -> Self {
        AppError::NotFound {
            kind,
            reference: reference.to_string(),
        }
    }

    /// Wraps the failure of step `completed + 1` of a multi-step write. Earlier
    /// steps stay applied.
    pub fn partial(completed: usize, requested: usize, source: impl Into<AppError>) -> Self {
        let source = source.into();
        tracing::warn!(completed, requested, error = %source, "multi-step write stopped part way");
        AppError::Partial {
            completed,
            requested,
            source: Box::new(source),
        }
    }
}
