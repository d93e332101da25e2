use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::config::BookingConfig;
use crate::workflows::booking::domain::{
    Actor, BookingId, BookingPatch, BookingProjection, CandidateId, CandidateProfile,
    InterviewerId, InterviewerProfile, ProjectionSide, SlotInput,
};
use crate::workflows::booking::engine::BookingRequestInput;
use crate::workflows::booking::memory::{DirectorySeed, InMemoryBookingStore};
use crate::workflows::booking::repository::{
    ExternalServiceError, InsertOutcome, MeetingContext, MeetingLinkProvider, NotificationChannel,
    OutboundMessage, ProjectionStore, StoreError,
};
use crate::workflows::booking::service::{BookingCollaborators, BookingService};

pub(super) const DATE: &str = "2025-03-10";

pub(super) fn candidate() -> Actor {
    Actor::candidate("c-1")
}

pub(super) fn interviewer() -> Actor {
    Actor::interviewer("i-1")
}

pub(super) fn seed() -> DirectorySeed {
    DirectorySeed {
        candidates: vec![
            CandidateProfile {
                id: CandidateId("c-1".to_string()),
                first_name: "Asha".to_string(),
                last_name: "Rao".to_string(),
                email: "asha@example.com".to_string(),
                job_title: Some("Backend Engineer".to_string()),
                profile_photo: Some("https://cdn.example.com/asha.png".to_string()),
            },
            CandidateProfile {
                id: CandidateId("c-2".to_string()),
                first_name: "Kofi".to_string(),
                last_name: "Mensah".to_string(),
                email: "kofi@example.com".to_string(),
                job_title: None,
                profile_photo: None,
            },
        ],
        interviewers: vec![
            InterviewerProfile {
                id: InterviewerId("i-1".to_string()),
                first_name: "Ben".to_string(),
                last_name: Some("Ortiz".to_string()),
                email: "ben@example.com".to_string(),
                job_title: Some("Staff Engineer".to_string()),
                profile_photo: None,
                experience: Some("12 years".to_string()),
                price: Some(50.0),
            },
            InterviewerProfile {
                id: InterviewerId("i-2".to_string()),
                first_name: "Dana".to_string(),
                last_name: None,
                email: "dana@example.com".to_string(),
                job_title: None,
                profile_photo: None,
                experience: None,
                price: None,
            },
        ],
        ..DirectorySeed::default()
    }
}

pub(super) fn booking_config() -> BookingConfig {
    BookingConfig {
        store_timeout: Duration::from_millis(500),
        link_timeout: Duration::from_millis(50),
        notify_timeout: Duration::from_millis(200),
        dual_write_attempts: 3,
        dual_write_backoff: Duration::from_millis(1),
        reconcile_interval: None,
        ..BookingConfig::default()
    }
}

pub(super) fn slot(date: &str, from: &str, to: &str) -> SlotInput {
    SlotInput {
        date: date.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

pub(super) fn request(date: &str, from: &str, to: &str) -> BookingRequestInput {
    BookingRequestInput {
        interviewer_id: Some("i-1".to_string()),
        date: Some(date.to_string()),
        from: Some(from.to_string()),
        to: Some(to.to_string()),
        price: Some(50.0),
    }
}

/// Link provider that hands out a deterministic link and counts calls.
#[derive(Default)]
pub(super) struct RecordingLinks {
    calls: AtomicUsize,
}

impl RecordingLinks {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeetingLinkProvider for RecordingLinks {
    async fn issue(&self, context: &MeetingContext) -> Result<String, ExternalServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://meet.test/{}/{call}", context.booking_id))
    }
}

/// Link provider that never answers.
pub(super) struct StalledLinks;

#[async_trait]
impl MeetingLinkProvider for StalledLinks {
    async fn issue(&self, _context: &MeetingContext) -> Result<String, ExternalServiceError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("https://meet.test/too-late".to_string())
    }
}

/// Channel recording sent messages; addresses in `failing` are rejected.
#[derive(Default)]
pub(super) struct RecordingChannel {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: HashSet<String>,
}

impl RecordingChannel {
    pub(super) fn failing_for(address: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: HashSet::from([address.to_string()]),
        }
    }

    pub(super) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("channel lock").clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ExternalServiceError> {
        if self.failing.contains(&message.to) {
            return Err(ExternalServiceError::Unavailable {
                service: "notification channel",
                reason: format!("mailbox {} rejected the message", message.to),
            });
        }
        self.sent.lock().expect("channel lock").push(message.clone());
        Ok(())
    }
}

/// Projection store wrapper that drops a configurable number of candidate-side
/// updates and removals and interviewer-side inserts before delegating.
pub(super) struct FlakyProjections {
    inner: InMemoryBookingStore,
    candidate_update_misses: AtomicU32,
    candidate_removal_failures: AtomicU32,
    interviewer_insert_failures: AtomicU32,
}

impl FlakyProjections {
    pub(super) fn new(inner: InMemoryBookingStore) -> Self {
        Self {
            inner,
            candidate_update_misses: AtomicU32::new(0),
            candidate_removal_failures: AtomicU32::new(0),
            interviewer_insert_failures: AtomicU32::new(0),
        }
    }

    pub(super) fn miss_candidate_updates(&self, times: u32) {
        self.candidate_update_misses.store(times, Ordering::SeqCst);
    }

    pub(super) fn fail_candidate_removals(&self, times: u32) {
        self.candidate_removal_failures.store(times, Ordering::SeqCst);
    }

    pub(super) fn fail_interviewer_inserts(&self, times: u32) {
        self.interviewer_insert_failures.store(times, Ordering::SeqCst);
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ProjectionStore for FlakyProjections {
    async fn insert(
        &self,
        side: ProjectionSide,
        booking: BookingProjection,
    ) -> Result<InsertOutcome, StoreError> {
        if side == ProjectionSide::Interviewer && Self::take(&self.interviewer_insert_failures) {
            return Err(StoreError::Unavailable("interviewer document busy".to_string()));
        }
        self.inner.insert(side, booking).await
    }

    async fn update(
        &self,
        side: ProjectionSide,
        booking: &BookingId,
        patch: &BookingPatch,
    ) -> Result<u64, StoreError> {
        if side == ProjectionSide::Candidate && Self::take(&self.candidate_update_misses) {
            return Ok(0);
        }
        self.inner.update(side, booking, patch).await
    }

    async fn remove(&self, side: ProjectionSide, booking: &BookingId) -> Result<u64, StoreError> {
        if side == ProjectionSide::Candidate && Self::take(&self.candidate_removal_failures) {
            return Err(StoreError::Unavailable("candidate document busy".to_string()));
        }
        self.inner.remove(side, booking).await
    }

    async fn find(
        &self,
        side: ProjectionSide,
        booking: &BookingId,
    ) -> Result<Option<BookingProjection>, StoreError> {
        self.inner.find(side, booking).await
    }

    async fn list_for_owner(
        &self,
        side: ProjectionSide,
        owner: &str,
    ) -> Result<Option<Vec<BookingProjection>>, StoreError> {
        self.inner.list_for_owner(side, owner).await
    }

    async fn scan(&self, side: ProjectionSide) -> Result<Vec<BookingProjection>, StoreError> {
        self.inner.scan(side).await
    }
}

pub(super) struct Harness {
    pub store: InMemoryBookingStore,
    pub links: Arc<RecordingLinks>,
    pub channel: Arc<RecordingChannel>,
    pub service: Arc<BookingService>,
}

pub(super) fn harness() -> Harness {
    harness_with(RecordingChannel::default(), booking_config())
}

pub(super) fn harness_with(channel: RecordingChannel, config: BookingConfig) -> Harness {
    let store = InMemoryBookingStore::from_seed(seed());
    let links = Arc::new(RecordingLinks::default());
    let channel = Arc::new(channel);
    let service = Arc::new(BookingService::new(
        BookingCollaborators::in_memory(store.clone(), links.clone(), channel.clone()),
        &config,
    ));
    Harness {
        store,
        links,
        channel,
        service,
    }
}

/// Service whose projection store is wrapped in [`FlakyProjections`].
pub(super) fn flaky_harness(
    links: Arc<dyn MeetingLinkProvider>,
) -> (InMemoryBookingStore, Arc<FlakyProjections>, Arc<BookingService>) {
    let store = InMemoryBookingStore::from_seed(seed());
    let flaky = Arc::new(FlakyProjections::new(store.clone()));
    let shared = Arc::new(store.clone());
    let service = Arc::new(BookingService::new(
        BookingCollaborators {
            directory: shared.clone(),
            availability: shared,
            projections: flaky.clone(),
            links,
            channel: Arc::new(RecordingChannel::default()),
        },
        &booking_config(),
    ));
    (store, flaky, service)
}

/// Publishes the 09:00-10:00 slot and books it for `c-1`, returning the booking id.
pub(super) async fn requested_booking(service: &BookingService) -> BookingId {
    service
        .add_availability(&interviewer(), vec![slot(DATE, "09:00", "10:00")])
        .await
        .expect("slot added");
    let bookings = service
        .schedule(&candidate(), request(DATE, "09:00", "10:00"))
        .await
        .expect("booking created");
    bookings
        .into_iter()
        .next()
        .expect("candidate has one booking")
        .id
}

/// Books the standard slot, then drops the interviewer copy so only the
/// candidate copy remains.
pub(super) async fn candidate_only_booking(
    store: &InMemoryBookingStore,
    service: &BookingService,
) -> BookingId {
    let booking = requested_booking(service).await;
    let removed = store
        .remove(ProjectionSide::Interviewer, &booking)
        .await
        .expect("remove succeeds");
    assert_eq!(removed, 1);
    booking
}

pub(super) async fn both_copies(
    store: &InMemoryBookingStore,
    booking: &BookingId,
) -> (BookingProjection, BookingProjection) {
    let candidate = store
        .find(ProjectionSide::Candidate, booking)
        .await
        .expect("find succeeds")
        .expect("candidate copy present");
    let interviewer = store
        .find(ProjectionSide::Interviewer, booking)
        .await
        .expect("find succeeds")
        .expect("interviewer copy present");
    (candidate, interviewer)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
