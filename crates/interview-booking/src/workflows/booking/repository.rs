use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    AvailabilitySlot, BookingId, BookingPatch, BookingProjection, CandidateId, CandidateProfile,
    InterviewerId, InterviewerProfile, ProjectionSide, SlotId, TimeRange,
};

/// Error enumeration for storage failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of the meeting-link provider or the notification channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExternalServiceError {
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },
    #[error("{service} did not answer within {timeout:?}")]
    Timeout {
        service: &'static str,
        timeout: Duration,
    },
}

/// Read access to the candidate and interviewer records owned elsewhere.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn candidate(&self, id: &CandidateId) -> Result<Option<CandidateProfile>, StoreError>;
    async fn interviewer(
        &self,
        id: &InterviewerId,
    ) -> Result<Option<InterviewerProfile>, StoreError>;
    /// Every interviewer on file, ordered by id.
    async fn interviewers(&self) -> Result<Vec<InterviewerProfile>, StoreError>;
}

/// Outcome of removing a slot, keeping "no such slot" apart from "no such interviewer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRemoval {
    Removed,
    SlotMissing,
    OwnerMissing,
}

/// Interviewer slot sets. `merge` must be a set-union keyed by date and range
/// so concurrent adds commute; removal matches by id only.
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    /// Returns the full slot collection after the merge, `None` when the interviewer is unknown.
    async fn merge(
        &self,
        interviewer: &InterviewerId,
        slots: Vec<AvailabilitySlot>,
    ) -> Result<Option<Vec<AvailabilitySlot>>, StoreError>;
    async fn remove(
        &self,
        interviewer: &InterviewerId,
        slot: &SlotId,
    ) -> Result<SlotRemoval, StoreError>;
    async fn slots(
        &self,
        interviewer: &InterviewerId,
    ) -> Result<Option<Vec<AvailabilitySlot>>, StoreError>;
}

/// Result of inserting one projection into its owning document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A copy with the same id is already present; inserts are idempotent.
    AlreadyPresent,
    OwnerMissing,
    /// Candidate side only: an active booking already holds that date.
    DateTaken,
}

/// Storage for the two denormalized booking copies. Each call is atomic within
/// the one owning document it touches and nothing stronger is assumed.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    async fn insert(
        &self,
        side: ProjectionSide,
        booking: BookingProjection,
    ) -> Result<InsertOutcome, StoreError>;

    /// Applies `patch` where the booking id matches and `patch.matches` holds;
    /// returns how many copies matched (0 or 1).
    async fn update(
        &self,
        side: ProjectionSide,
        booking: &BookingId,
        patch: &BookingPatch,
    ) -> Result<u64, StoreError>;

    /// Drops the copy with this id from its owning document; returns how many
    /// copies were removed (0 or 1). Only used to undo a half-written insert.
    async fn remove(&self, side: ProjectionSide, booking: &BookingId) -> Result<u64, StoreError>;

    async fn find(
        &self,
        side: ProjectionSide,
        booking: &BookingId,
    ) -> Result<Option<BookingProjection>, StoreError>;

    /// `None` when the owning candidate/interviewer document does not exist.
    async fn list_for_owner(
        &self,
        side: ProjectionSide,
        owner: &str,
    ) -> Result<Option<Vec<BookingProjection>>, StoreError>;

    async fn scan(&self, side: ProjectionSide) -> Result<Vec<BookingProjection>, StoreError>;
}

/// Data handed to the meeting-link provider when a booking is approved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingContext {
    pub booking_id: BookingId,
    pub summary: String,
    pub date: NaiveDate,
    pub time_range: TimeRange,
}

#[async_trait]
pub trait MeetingLinkProvider: Send + Sync {
    async fn issue(&self, context: &MeetingContext) -> Result<String, ExternalServiceError>;
}

/// Rendered message ready for the outbound channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Outbound notification hook (e-mail or similar). No delivery guarantee.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ExternalServiceError>;
}

/// Bounds a storage call so a stalled backend surfaces as `StoreError::Timeout`.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
