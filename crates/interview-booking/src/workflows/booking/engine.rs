use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::availability::AvailabilityStore;
use super::coordinator::DualRecordCoordinator;
use super::domain::{
    parse_clock, parse_date, Actor, ActorRole, BookingId, BookingPatch, BookingProjection,
    BookingStatus, CandidateId, InterviewRequestView, InterviewerId, InterviewerListing,
    ProjectionSide, ScheduledInterviewView, SlotKey, TimeRange, DEFAULT_POSITION,
    UNKNOWN_CANDIDATE, UNKNOWN_INTERVIEWER,
};
use super::error::{BookingError, MissingEntity};
use super::notifications::{ApprovalNotice, NotificationDispatcher};
use super::repository::{bounded, ProfileDirectory};

/// Booking request payload as received from a candidate. Every field is
/// optional at the wire level so missing values surface as validation errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequestInput {
    #[serde(default)]
    pub interviewer_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnginePolicy {
    /// Require a matching availability slot when a booking is created.
    pub enforce_availability: bool,
    /// Remove the matching slot once a booking is approved.
    pub consume_slot_on_approval: bool,
    pub store_timeout: Duration,
}

/// Result of an approval or cancellation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub booking: BookingProjection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<ApprovalNotice>,
}

/// Creates booking requests and drives them from `Requested` to a terminal status.
pub struct BookingRequestEngine {
    directory: Arc<dyn ProfileDirectory>,
    availability: Arc<AvailabilityStore>,
    coordinator: Arc<DualRecordCoordinator>,
    dispatcher: Arc<NotificationDispatcher>,
    policy: EnginePolicy,
}

struct ValidatedRequest {
    interviewer: InterviewerId,
    date: chrono::NaiveDate,
    range: Option<TimeRange>,
    price: f64,
}

impl BookingRequestEngine {
    pub fn new(
        directory: Arc<dyn ProfileDirectory>,
        availability: Arc<AvailabilityStore>,
        coordinator: Arc<DualRecordCoordinator>,
        dispatcher: Arc<NotificationDispatcher>,
        policy: EnginePolicy,
    ) -> Self {
        Self {
            directory,
            availability,
            coordinator,
            dispatcher,
            policy,
        }
    }

    /// Records a new `Requested` booking in both projections and returns the
    /// candidate's full booking collection.
    pub async fn create_booking(
        &self,
        actor: &Actor,
        input: BookingRequestInput,
    ) -> Result<Vec<BookingProjection>, BookingError> {
        let candidate_id = require_role(actor, ActorRole::Candidate)
            .map(|id| CandidateId(id.to_string()))?;
        let request = validate(input)?;

        let candidate = bounded(self.policy.store_timeout, self.directory.candidate(&candidate_id))
            .await?
            .ok_or_else(|| BookingError::NotFound(MissingEntity::Candidate(candidate_id.0.clone())))?;

        let existing = self.candidate_bookings(&candidate_id).await?;
        if existing
            .iter()
            .any(|booking| booking.date == request.date && booking.status.is_active())
        {
            return Err(BookingError::conflict(format!(
                "an active booking already exists on {}",
                request.date
            )));
        }

        bounded(
            self.policy.store_timeout,
            self.directory.interviewer(&request.interviewer),
        )
        .await?
        .ok_or_else(|| {
            BookingError::NotFound(MissingEntity::Interviewer(request.interviewer.0.clone()))
        })?;

        let time_range = self.resolve_time_range(&request).await?;

        let candidate_copy = BookingProjection {
            id: BookingId::generate(),
            candidate_id: candidate_id.clone(),
            interviewer_id: request.interviewer.clone(),
            candidate_name: None,
            position: None,
            date: request.date,
            time_range,
            price: request.price,
            status: BookingStatus::Requested,
            meeting_link: None,
        };
        let interviewer_copy = BookingProjection {
            candidate_name: Some(candidate.display_name()),
            position: Some(candidate.position()),
            ..candidate_copy.clone()
        };
        let booking_id = candidate_copy.id.clone();

        self.coordinator
            .insert(candidate_copy, interviewer_copy)
            .await?;

        info!(
            booking_id = %booking_id,
            candidate_id = %candidate_id,
            interviewer_id = %request.interviewer,
            date = %request.date,
            time = %time_range,
            "booking requested"
        );

        self.candidate_bookings(&candidate_id).await
    }

    /// Interviewer's requests joined with candidate display data. A candidate
    /// that can no longer be loaded renders as a placeholder.
    pub async fn list_requests(
        &self,
        actor: &Actor,
    ) -> Result<Vec<InterviewRequestView>, BookingError> {
        let interviewer = require_role(actor, ActorRole::Interviewer)?;
        let requests = bounded(
            self.policy.store_timeout,
            self.coordinator
                .store()
                .list_for_owner(ProjectionSide::Interviewer, interviewer),
        )
        .await?
        .ok_or_else(|| BookingError::NotFound(MissingEntity::Interviewer(interviewer.to_string())))?;

        let mut views = Vec::with_capacity(requests.len());
        for request in requests {
            let candidate = match bounded(
                self.policy.store_timeout,
                self.directory.candidate(&request.candidate_id),
            )
            .await
            {
                Ok(found) => found,
                Err(err) => {
                    warn!(booking_id = %request.id, error = %err, "candidate lookup failed; rendering placeholder");
                    None
                }
            };

            views.push(InterviewRequestView {
                candidate_name: candidate
                    .as_ref()
                    .map(|profile| profile.display_name())
                    .unwrap_or_else(|| UNKNOWN_CANDIDATE.to_string()),
                candidate_photo: candidate.and_then(|profile| profile.profile_photo),
                position: request
                    .position
                    .clone()
                    .unwrap_or_else(|| DEFAULT_POSITION.to_string()),
                date: request.date.format("%d/%m/%Y").to_string(),
                day: request.date.format("%A").to_string(),
                time: request.time_range.to_string(),
                id: request.id,
                candidate_id: request.candidate_id,
                price: request.price,
                status: request.status,
                meeting_link: request.meeting_link,
            });
        }
        Ok(views)
    }

    /// Interviewers a candidate can book, each with their current slots.
    pub async fn list_interviewers(
        &self,
        actor: &Actor,
    ) -> Result<Vec<InterviewerListing>, BookingError> {
        require_role(actor, ActorRole::Candidate)?;
        let profiles = bounded(self.policy.store_timeout, self.directory.interviewers()).await?;

        let mut listings = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let availability = match self.availability.slots_of(&profile.id).await {
                Ok(slots) => slots,
                Err(BookingError::NotFound(_)) => Vec::new(),
                Err(err) => return Err(err),
            };
            listings.push(InterviewerListing {
                name: profile.display_name(),
                id: profile.id,
                job_title: profile.job_title,
                experience: profile.experience,
                price: profile.price,
                profile_photo: profile.profile_photo,
                availability,
            });
        }
        Ok(listings)
    }

    /// Candidate's bookings joined with interviewer display data.
    pub async fn my_interviews(
        &self,
        actor: &Actor,
    ) -> Result<Vec<ScheduledInterviewView>, BookingError> {
        let candidate = require_role(actor, ActorRole::Candidate)
            .map(|id| CandidateId(id.to_string()))?;
        let bookings = self.candidate_bookings(&candidate).await?;

        let mut views = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let interviewer = match bounded(
                self.policy.store_timeout,
                self.directory.interviewer(&booking.interviewer_id),
            )
            .await
            {
                Ok(found) => found,
                Err(err) => {
                    warn!(booking_id = %booking.id, error = %err, "interviewer lookup failed; rendering placeholder");
                    None
                }
            };

            views.push(ScheduledInterviewView {
                interviewer_name: interviewer
                    .as_ref()
                    .map(|profile| profile.display_name())
                    .unwrap_or_else(|| UNKNOWN_INTERVIEWER.to_string()),
                interviewer_job_title: interviewer
                    .as_ref()
                    .and_then(|profile| profile.job_title.clone()),
                interviewer_photo: interviewer.and_then(|profile| profile.profile_photo),
                id: booking.id,
                interviewer_id: booking.interviewer_id,
                date: booking.date,
                time_range: booking.time_range,
                price: booking.price,
                status: booking.status,
                meeting_link: booking.meeting_link,
            });
        }
        Ok(views)
    }

    /// Moves a booking to `Approved` or `Cancelled` in both projections.
    /// Re-approving is idempotent and reuses the stored meeting link;
    /// anything after `Cancelled` is a conflict.
    pub async fn transition(
        &self,
        actor: &Actor,
        booking_id: &BookingId,
        status: &str,
    ) -> Result<TransitionOutcome, BookingError> {
        let interviewer = require_role(actor, ActorRole::Interviewer)?;
        let target = match BookingStatus::parse(status) {
            Some(status @ (BookingStatus::Approved | BookingStatus::Cancelled)) => status,
            _ => {
                return Err(BookingError::validation(format!(
                    "status must be Approved or Cancelled, got '{status}'"
                )))
            }
        };

        let current = self.authoritative_copy(booking_id).await?;
        if current.interviewer_id.0 != interviewer {
            return Err(BookingError::Forbidden(format!(
                "booking {booking_id} belongs to another interviewer"
            )));
        }
        if !current.status.permits(target) {
            return Err(BookingError::conflict(format!(
                "booking {booking_id} is {} and cannot become {target}",
                current.status
            )));
        }

        let mut booking = self
            .coordinator
            .apply(booking_id, &BookingPatch::status(target))
            .await?;
        info!(
            booking_id = %booking_id,
            from = %current.status,
            to = %target,
            "booking transitioned"
        );

        if target != BookingStatus::Approved {
            return Ok(TransitionOutcome {
                booking,
                notice: None,
            });
        }

        if current.status == BookingStatus::Requested && self.policy.consume_slot_on_approval {
            self.consume_slot(&booking).await;
        }

        let notice = match self.dispatcher.notify_approval(booking_id).await {
            Ok(notice) => Some(notice),
            Err(err @ (BookingError::Consistency { .. } | BookingError::Store(_))) => {
                return Err(err)
            }
            Err(err) => {
                warn!(booking_id = %booking_id, error = %err, "approval recorded but confirmation skipped");
                None
            }
        };

        if let Some(link) = notice.as_ref().and_then(|notice| notice.meeting_link.clone()) {
            booking.meeting_link = Some(link);
        }
        Ok(TransitionOutcome { booking, notice })
    }

    /// Re-runs link issuance and confirmations for an approved booking.
    pub async fn retry_notification(
        &self,
        actor: &Actor,
        booking_id: &BookingId,
    ) -> Result<ApprovalNotice, BookingError> {
        let interviewer = require_role(actor, ActorRole::Interviewer)?;
        let current = self.authoritative_copy(booking_id).await?;
        if current.interviewer_id.0 != interviewer {
            return Err(BookingError::Forbidden(format!(
                "booking {booking_id} belongs to another interviewer"
            )));
        }
        self.dispatcher.notify_approval(booking_id).await
    }

    /// Interviewer-side copy of the booking, restoring it from the candidate
    /// copy when an earlier dual write left it missing.
    async fn authoritative_copy(
        &self,
        booking_id: &BookingId,
    ) -> Result<BookingProjection, BookingError> {
        let pair = self.coordinator.load(booking_id).await?;
        match (pair.interviewer, pair.candidate) {
            (Some(copy), _) => Ok(copy),
            (None, Some(orphan)) => {
                self.coordinator
                    .restore(ProjectionSide::Interviewer, orphan.clone())
                    .await?;
                Ok(orphan)
            }
            (None, None) => Err(BookingError::NotFound(MissingEntity::Booking(
                booking_id.0.clone(),
            ))),
        }
    }

    async fn candidate_bookings(
        &self,
        candidate: &CandidateId,
    ) -> Result<Vec<BookingProjection>, BookingError> {
        bounded(
            self.policy.store_timeout,
            self.coordinator
                .store()
                .list_for_owner(ProjectionSide::Candidate, &candidate.0),
        )
        .await?
        .ok_or_else(|| BookingError::NotFound(MissingEntity::Candidate(candidate.0.clone())))
    }

    async fn resolve_time_range(&self, request: &ValidatedRequest) -> Result<TimeRange, BookingError> {
        if !self.policy.enforce_availability {
            return request.range.ok_or_else(|| {
                BookingError::validation("from and to are required when availability is not enforced")
            });
        }

        let slots = self.availability.slots_of(&request.interviewer).await?;
        slots
            .iter()
            .filter(|slot| slot.date == request.date)
            .map(|slot| slot.time_range())
            .find(|range| request.range.map_or(true, |wanted| wanted == *range))
            .ok_or_else(|| {
                BookingError::conflict(format!(
                    "interviewer {} has no matching availability on {}",
                    request.interviewer, request.date
                ))
            })
    }

    async fn consume_slot(&self, booking: &BookingProjection) {
        let key = SlotKey {
            date: booking.date,
            from: booking.time_range.from,
            to: booking.time_range.to,
        };
        match self.availability.consume(&booking.interviewer_id, key).await {
            Ok(true) => info!(booking_id = %booking.id, "availability slot consumed by approval"),
            Ok(false) => {}
            Err(err) => {
                warn!(booking_id = %booking.id, error = %err, "availability slot not consumed")
            }
        }
    }
}

fn require_role(actor: &Actor, role: ActorRole) -> Result<&str, BookingError> {
    if actor.role == role {
        Ok(actor.id.as_str())
    } else {
        Err(BookingError::Forbidden(format!(
            "operation requires the {} role",
            role.label()
        )))
    }
}

fn validate(input: BookingRequestInput) -> Result<ValidatedRequest, BookingError> {
    let interviewer = input
        .interviewer_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BookingError::validation("interviewerId is required"))?;
    let raw_date = input
        .date
        .ok_or_else(|| BookingError::validation("date is required"))?;
    let date = parse_date(&raw_date)
        .ok_or_else(|| BookingError::validation(format!("invalid date '{raw_date}'")))?;
    let price = input
        .price
        .ok_or_else(|| BookingError::validation("price is required"))?;
    if !price.is_finite() || price < 0.0 {
        return Err(BookingError::validation("price must be a non-negative number"));
    }

    let range = match (input.from, input.to) {
        (None, None) => None,
        (Some(from), Some(to)) => {
            let start = parse_clock(&from)
                .ok_or_else(|| BookingError::validation(format!("invalid start time '{from}'")))?;
            let end = parse_clock(&to)
                .ok_or_else(|| BookingError::validation(format!("invalid end time '{to}'")))?;
            Some(TimeRange::new(start, end).ok_or_else(|| {
                BookingError::validation("start time must be before end time")
            })?)
        }
        _ => {
            return Err(BookingError::validation(
                "from and to must be supplied together",
            ))
        }
    };

    Ok(ValidatedRequest {
        interviewer: InterviewerId(interviewer),
        date,
        range,
        price,
    })
}
