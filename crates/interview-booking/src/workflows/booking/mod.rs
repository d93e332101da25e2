//! Interview booking workflow: interviewer availability, booking requests,
//! the approval/cancellation state machine, the two denormalized booking
//! projections and the confirmations sent on approval.

pub mod availability;
pub mod coordinator;
pub mod domain;
pub mod engine;
pub mod error;
pub mod memory;
pub mod notifications;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use availability::AvailabilityStore;
pub use coordinator::{
    CoordinationError, DualRecordCoordinator, ProjectionPair, ReconcileMode, ReconciliationReport,
    RetryPolicy,
};
pub use domain::{
    Actor, ActorRole, AvailabilitySlot, BookingId, BookingPatch, BookingProjection,
    BookingStatus, CandidateId, CandidateProfile, InterviewRequestView, InterviewerId,
    InterviewerListing, InterviewerProfile, ProjectionSide, ScheduledInterviewView, SlotId,
    SlotInput, TimeRange,
};
pub use engine::{BookingRequestEngine, BookingRequestInput, EnginePolicy, TransitionOutcome};
pub use error::{BookingError, MissingEntity};
pub use memory::{DirectorySeed, InMemoryBookingStore, SeedError};
pub use notifications::{ApprovalNotice, DeliveryReport, NotificationDispatcher, Recipient};
pub use repository::{
    AvailabilityRepository, ExternalServiceError, InsertOutcome, MeetingContext,
    MeetingLinkProvider, NotificationChannel, OutboundMessage, ProfileDirectory, ProjectionStore,
    SlotRemoval, StoreError,
};
pub use router::{booking_router, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
pub use service::{BookingCollaborators, BookingService};
