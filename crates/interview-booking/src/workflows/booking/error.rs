use std::fmt;

use super::domain::{BookingId, ProjectionSide};
use super::repository::{ExternalServiceError, StoreError};

/// Entity a `NotFound` failure refers to, so callers can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingEntity {
    Candidate(String),
    Interviewer(String),
    Slot(String),
    Booking(String),
}

impl fmt::Display for MissingEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingEntity::Candidate(id) => write!(f, "candidate {id} not found"),
            MissingEntity::Interviewer(id) => write!(f, "interviewer {id} not found"),
            MissingEntity::Slot(id) => write!(f, "availability slot {id} not found"),
            MissingEntity::Booking(id) => write!(f, "booking {id} not found"),
        }
    }
}

/// Error raised by the booking workflow.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(MissingEntity),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(
        "booking {booking_id} could not be written to the {side} projection after {attempts} attempt(s)"
    )]
    Consistency {
        booking_id: BookingId,
        side: ProjectionSide,
        attempts: u32,
    },
    #[error(transparent)]
    ExternalService(#[from] ExternalServiceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Consistency and storage failures are worth retrying; the rest are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::Consistency { .. }
                | BookingError::Store(_)
                | BookingError::ExternalService(_)
        )
    }
}
