use std::sync::Arc;

use super::availability::AvailabilityStore;
use super::coordinator::{DualRecordCoordinator, ReconcileMode, ReconciliationReport, RetryPolicy};
use super::domain::{
    Actor, AvailabilitySlot, BookingId, BookingProjection, InterviewRequestView,
    InterviewerListing, ScheduledInterviewView, SlotId, SlotInput,
};
use super::engine::{BookingRequestEngine, BookingRequestInput, EnginePolicy, TransitionOutcome};
use super::error::BookingError;
use super::memory::InMemoryBookingStore;
use super::notifications::{ApprovalNotice, DispatchTimeouts, NotificationDispatcher};
use super::repository::{
    AvailabilityRepository, MeetingLinkProvider, NotificationChannel, ProfileDirectory,
    ProjectionStore, StoreError,
};
use crate::config::BookingConfig;

/// External collaborators the booking workflow is wired against.
#[derive(Clone)]
pub struct BookingCollaborators {
    pub directory: Arc<dyn ProfileDirectory>,
    pub availability: Arc<dyn AvailabilityRepository>,
    pub projections: Arc<dyn ProjectionStore>,
    pub links: Arc<dyn MeetingLinkProvider>,
    pub channel: Arc<dyn NotificationChannel>,
}

impl BookingCollaborators {
    /// Uses one in-memory store for the directory, availability and projections.
    pub fn in_memory(
        store: InMemoryBookingStore,
        links: Arc<dyn MeetingLinkProvider>,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        let store = Arc::new(store);
        Self {
            directory: store.clone(),
            availability: store.clone(),
            projections: store,
            links,
            channel,
        }
    }
}

/// Service composing availability, booking engine, dual-write coordinator
/// and notification dispatcher behind the operations the HTTP layer exposes.
pub struct BookingService {
    availability: Arc<AvailabilityStore>,
    engine: BookingRequestEngine,
    coordinator: Arc<DualRecordCoordinator>,
}

impl BookingService {
    pub fn new(collaborators: BookingCollaborators, config: &BookingConfig) -> Self {
        let BookingCollaborators {
            directory,
            availability,
            projections,
            links,
            channel,
        } = collaborators;

        let availability = Arc::new(AvailabilityStore::new(availability, config.store_timeout));
        let coordinator = Arc::new(DualRecordCoordinator::new(
            projections,
            directory.clone(),
            RetryPolicy {
                attempts: config.dual_write_attempts,
                initial_backoff: config.dual_write_backoff,
            },
            config.store_timeout,
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            directory.clone(),
            coordinator.clone(),
            links,
            channel,
            DispatchTimeouts {
                store: config.store_timeout,
                link: config.link_timeout,
                notify: config.notify_timeout,
            },
        ));
        let engine = BookingRequestEngine::new(
            directory,
            availability.clone(),
            coordinator.clone(),
            dispatcher,
            EnginePolicy {
                enforce_availability: config.enforce_availability,
                consume_slot_on_approval: config.consume_slot_on_approval,
                store_timeout: config.store_timeout,
            },
        );

        Self {
            availability,
            engine,
            coordinator,
        }
    }

    pub async fn add_availability(
        &self,
        actor: &Actor,
        slots: Vec<SlotInput>,
    ) -> Result<Vec<AvailabilitySlot>, BookingError> {
        self.availability.add_slots(actor, slots).await
    }

    pub async fn delete_availability(
        &self,
        actor: &Actor,
        slot: &SlotId,
    ) -> Result<(), BookingError> {
        self.availability.delete_slot(actor, slot).await
    }

    pub async fn availability(&self, actor: &Actor) -> Result<Vec<AvailabilitySlot>, BookingError> {
        self.availability.get_slots(actor).await
    }

    pub async fn interviewers(
        &self,
        actor: &Actor,
    ) -> Result<Vec<InterviewerListing>, BookingError> {
        self.engine.list_interviewers(actor).await
    }

    pub async fn schedule(
        &self,
        actor: &Actor,
        input: BookingRequestInput,
    ) -> Result<Vec<BookingProjection>, BookingError> {
        self.engine.create_booking(actor, input).await
    }

    pub async fn my_interviews(
        &self,
        actor: &Actor,
    ) -> Result<Vec<ScheduledInterviewView>, BookingError> {
        self.engine.my_interviews(actor).await
    }

    pub async fn interview_requests(
        &self,
        actor: &Actor,
    ) -> Result<Vec<InterviewRequestView>, BookingError> {
        self.engine.list_requests(actor).await
    }

    pub async fn update_interview_request(
        &self,
        actor: &Actor,
        booking: &BookingId,
        status: &str,
    ) -> Result<TransitionOutcome, BookingError> {
        self.engine.transition(actor, booking, status).await
    }

    pub async fn resend_confirmation(
        &self,
        actor: &Actor,
        booking: &BookingId,
    ) -> Result<ApprovalNotice, BookingError> {
        self.engine.retry_notification(actor, booking).await
    }

    pub async fn reconcile(&self, mode: ReconcileMode) -> Result<ReconciliationReport, StoreError> {
        self.coordinator.reconcile(mode).await
    }

    pub fn coordinator(&self) -> Arc<DualRecordCoordinator> {
        self.coordinator.clone()
    }
}
