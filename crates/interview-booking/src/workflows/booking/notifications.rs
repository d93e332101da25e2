use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::coordinator::{CoordinationError, DualRecordCoordinator};
use super::domain::{
    long_date, BookingId, BookingPatch, BookingProjection, BookingStatus, CandidateProfile,
    InterviewerProfile, ProjectionSide, DEFAULT_POSITION,
};
use super::error::{BookingError, MissingEntity};
use super::repository::{
    bounded, ExternalServiceError, MeetingContext, MeetingLinkProvider, NotificationChannel,
    OutboundMessage, ProfileDirectory,
};

/// Which party a confirmation message was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Interviewer,
    Candidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub recipient: Recipient,
    pub address: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one `notify_approval` run. A missing link means the provider
/// did not answer in time and the run should be retried later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalNotice {
    pub booking_id: BookingId,
    pub meeting_link: Option<String>,
    pub deliveries: Vec<DeliveryReport>,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchTimeouts {
    pub store: Duration,
    pub link: Duration,
    pub notify: Duration,
}

/// Issues (or reuses) the meeting link for an approved booking and sends
/// confirmations to both parties. Sends are best effort: failures are logged
/// per recipient and never undo the approval.
pub struct NotificationDispatcher {
    directory: Arc<dyn ProfileDirectory>,
    coordinator: Arc<DualRecordCoordinator>,
    links: Arc<dyn MeetingLinkProvider>,
    channel: Arc<dyn NotificationChannel>,
    timeouts: DispatchTimeouts,
}

impl NotificationDispatcher {
    pub fn new(
        directory: Arc<dyn ProfileDirectory>,
        coordinator: Arc<DualRecordCoordinator>,
        links: Arc<dyn MeetingLinkProvider>,
        channel: Arc<dyn NotificationChannel>,
        timeouts: DispatchTimeouts,
    ) -> Self {
        Self {
            directory,
            coordinator,
            links,
            channel,
            timeouts,
        }
    }

    pub async fn notify_approval(&self, booking_id: &BookingId) -> Result<ApprovalNotice, BookingError> {
        let booking = bounded(
            self.timeouts.store,
            self.coordinator
                .store()
                .find(ProjectionSide::Interviewer, booking_id),
        )
        .await?
        .ok_or_else(|| BookingError::NotFound(MissingEntity::Booking(booking_id.0.clone())))?;

        if booking.status != BookingStatus::Approved {
            return Err(BookingError::conflict(format!(
                "booking {booking_id} is {} and has nothing to confirm",
                booking.status
            )));
        }

        let interviewer = bounded(
            self.timeouts.store,
            self.directory.interviewer(&booking.interviewer_id),
        )
        .await?
        .ok_or_else(|| {
            BookingError::NotFound(MissingEntity::Interviewer(booking.interviewer_id.0.clone()))
        })?;
        let candidate = bounded(
            self.timeouts.store,
            self.directory.candidate(&booking.candidate_id),
        )
        .await?
        .ok_or_else(|| {
            BookingError::NotFound(MissingEntity::Candidate(booking.candidate_id.0.clone()))
        })?;

        let Some(link) = self.resolve_link(&booking, &candidate).await? else {
            return Ok(ApprovalNotice {
                booking_id: booking.id,
                meeting_link: None,
                deliveries: Vec::new(),
            });
        };

        let messages = [
            (
                Recipient::Interviewer,
                interviewer_message(&booking, &interviewer, &candidate, &link),
            ),
            (
                Recipient::Candidate,
                candidate_message(&booking, &interviewer, &candidate, &link),
            ),
        ];

        let mut deliveries = Vec::with_capacity(messages.len());
        for (recipient, message) in messages {
            deliveries.push(self.deliver(&booking.id, recipient, message).await);
        }

        Ok(ApprovalNotice {
            booking_id: booking.id,
            meeting_link: Some(link),
            deliveries,
        })
    }

    /// Reuses the stored link or issues and persists a new one. `Ok(None)`
    /// means the provider failed or stalled; the approval stands regardless.
    async fn resolve_link(
        &self,
        booking: &BookingProjection,
        candidate: &CandidateProfile,
    ) -> Result<Option<String>, BookingError> {
        if let Some(link) = &booking.meeting_link {
            self.coordinator
                .apply(&booking.id, &BookingPatch::meeting_link(link.clone()))
                .await?;
            return Ok(Some(link.clone()));
        }

        let context = MeetingContext {
            booking_id: booking.id.clone(),
            summary: format!(
                "{} interview with {}",
                booking.position.as_deref().unwrap_or(DEFAULT_POSITION),
                candidate.display_name()
            ),
            date: booking.date,
            time_range: booking.time_range,
        };

        let issued = match tokio::time::timeout(self.timeouts.link, self.links.issue(&context)).await
        {
            Ok(Ok(link)) => link,
            Ok(Err(err)) => {
                warn!(booking_id = %booking.id, error = %err, "meeting link provider failed; approval kept without link");
                return Ok(None);
            }
            Err(_) => {
                let err = ExternalServiceError::Timeout {
                    service: "meeting link provider",
                    timeout: self.timeouts.link,
                };
                warn!(booking_id = %booking.id, error = %err, "meeting link provider stalled; approval kept without link");
                return Ok(None);
            }
        };

        match self
            .coordinator
            .apply(&booking.id, &BookingPatch::meeting_link(issued.clone()))
            .await
        {
            Ok(stored) => {
                let link = stored.meeting_link.unwrap_or(issued);
                info!(booking_id = %booking.id, "meeting link issued");
                Ok(Some(link))
            }
            // A concurrent approval stored its link first; converge on that one.
            Err(CoordinationError::Rejected {
                current: Some(current),
                ..
            }) if current.meeting_link.is_some() => {
                let winner = current.meeting_link.unwrap_or_default();
                self.coordinator
                    .apply(&booking.id, &BookingPatch::meeting_link(winner.clone()))
                    .await?;
                Ok(Some(winner))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn deliver(
        &self,
        booking_id: &BookingId,
        recipient: Recipient,
        message: OutboundMessage,
    ) -> DeliveryReport {
        let outcome = match tokio::time::timeout(self.timeouts.notify, self.channel.send(&message))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ExternalServiceError::Timeout {
                service: "notification channel",
                timeout: self.timeouts.notify,
            }),
        };

        match outcome {
            Ok(()) => DeliveryReport {
                recipient,
                address: message.to,
                delivered: true,
                error: None,
            },
            Err(err) => {
                warn!(
                    booking_id = %booking_id,
                    recipient = ?recipient,
                    address = %message.to,
                    error = %err,
                    "approval notification not delivered"
                );
                DeliveryReport {
                    recipient,
                    address: message.to,
                    delivered: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

pub(crate) fn interviewer_message(
    booking: &BookingProjection,
    interviewer: &InterviewerProfile,
    candidate: &CandidateProfile,
    link: &str,
) -> OutboundMessage {
    let position = booking.position.as_deref().unwrap_or(DEFAULT_POSITION);
    let candidate_name = candidate.display_name();
    OutboundMessage {
        to: interviewer.email.clone(),
        subject: format!("Interview Scheduled for {candidate_name} - {position}"),
        html_body: render_confirmation(
            &interviewer.display_name(),
            &format!(
                "Your interview with <strong>{}</strong> for <strong>{}</strong> is confirmed.",
                escape(&candidate_name),
                escape(position)
            ),
            booking,
            link,
        ),
    }
}

pub(crate) fn candidate_message(
    booking: &BookingProjection,
    interviewer: &InterviewerProfile,
    candidate: &CandidateProfile,
    link: &str,
) -> OutboundMessage {
    let position = booking.position.as_deref().unwrap_or(DEFAULT_POSITION);
    OutboundMessage {
        to: candidate.email.clone(),
        subject: format!("Your Interview for {position} - {}", long_date(booking.date)),
        html_body: render_confirmation(
            &candidate.display_name(),
            &format!(
                "Your interview with <strong>{}</strong> is confirmed.",
                escape(&interviewer.display_name())
            ),
            booking,
            link,
        ),
    }
}

fn render_confirmation(
    greeting_name: &str,
    headline: &str,
    booking: &BookingProjection,
    link: &str,
) -> String {
    let link = escape(link);
    let mut html = String::new();
    let _ = writeln!(html, "<p>Dear {},</p>", escape(greeting_name));
    let _ = writeln!(html, "<p>{headline}</p>");
    let _ = writeln!(
        html,
        "<p><strong>Date:</strong> {}</p>",
        long_date(booking.date)
    );
    let _ = writeln!(
        html,
        "<p><strong>Time:</strong> {} GMT</p>",
        booking.time_range
    );
    let _ = writeln!(
        html,
        "<p>Join the meeting at: <a href=\"{link}\">{link}</a></p>"
    );
    html
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
