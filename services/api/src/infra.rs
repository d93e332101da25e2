use async_trait::async_trait;
use chrono::NaiveDate;
use interview_booking::config::{AppConfig, BookingConfig};
use interview_booking::error::AppError;
use interview_booking::workflows::booking::{
    BookingCollaborators, BookingService, ExternalServiceError, InMemoryBookingStore,
    MeetingContext, MeetingLinkProvider, NotificationChannel, OutboundMessage,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Issues links of the form `{base}/{abc-defg-hij}` derived from the booking id,
/// so the same booking always maps to the same meeting room.
#[derive(Debug, Clone)]
pub(crate) struct ConfiguredMeetingLinkProvider {
    base_url: String,
}

impl ConfiguredMeetingLinkProvider {
    pub(crate) fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MeetingLinkProvider for ConfiguredMeetingLinkProvider {
    async fn issue(&self, context: &MeetingContext) -> Result<String, ExternalServiceError> {
        let code = meeting_code(&context.booking_id.0).ok_or_else(|| {
            ExternalServiceError::Unavailable {
                service: "meeting link provider",
                reason: format!("booking id '{}' cannot seed a room code", context.booking_id),
            }
        })?;
        Ok(format!("{}/{code}", self.base_url.trim_end_matches('/')))
    }
}

fn meeting_code(seed: &str) -> Option<String> {
    let letters: Vec<char> = seed
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| {
            let offset = ch.to_digit(36).unwrap_or(0) % 26;
            char::from(b'a' + offset as u8)
        })
        .take(10)
        .collect();
    if letters.len() < 10 {
        return None;
    }
    let code: String = letters.iter().collect();
    Some(format!("{}-{}-{}", &code[..3], &code[3..7], &code[7..]))
}

/// Writes confirmations to the log instead of a mail server.
#[derive(Debug, Clone, Default)]
pub(crate) struct TracingNotificationChannel;

#[async_trait]
impl NotificationChannel for TracingNotificationChannel {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ExternalServiceError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            bytes = message.html_body.len(),
            "confirmation dispatched"
        );
        Ok(())
    }
}

pub(crate) fn load_store(config: &AppConfig) -> Result<InMemoryBookingStore, AppError> {
    match &config.directory_seed {
        Some(path) => {
            let store = InMemoryBookingStore::from_path(path)?;
            info!(seed = %path.display(), "profile directory seeded");
            Ok(store)
        }
        None => Ok(InMemoryBookingStore::default()),
    }
}

pub(crate) fn build_service(
    store: InMemoryBookingStore,
    config: &BookingConfig,
) -> Arc<BookingService> {
    let links = Arc::new(ConfiguredMeetingLinkProvider::new(
        config.meeting_link_base_url.clone(),
    ));
    Arc::new(BookingService::new(
        BookingCollaborators::in_memory(store, links, Arc::new(TracingNotificationChannel)),
        config,
    ))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    interview_booking::workflows::booking::domain::parse_date(raw)
        .ok_or_else(|| format!("failed to parse '{raw}' as YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_booking::workflows::booking::{BookingId, TimeRange};

    fn context(id: &str) -> MeetingContext {
        MeetingContext {
            booking_id: BookingId(id.to_string()),
            summary: "Interview".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date"),
            time_range: TimeRange::parse("09:00 - 10:00").expect("valid range"),
        }
    }

    #[tokio::test]
    async fn links_are_stable_per_booking() {
        let provider = ConfiguredMeetingLinkProvider::new("https://meet.example.com/");
        let id = "6f1c2a9e-41d2-4b8e-9a77-0c3f5e2d1b88";
        let first = provider.issue(&context(id)).await.expect("link");
        let second = provider.issue(&context(id)).await.expect("link");
        assert_eq!(first, second);
        assert!(first.starts_with("https://meet.example.com/"));
        let code = first.trim_start_matches("https://meet.example.com/");
        assert_eq!(code.len(), 12);
        assert_eq!(code.matches('-').count(), 2);
    }

    #[tokio::test]
    async fn short_ids_are_refused() {
        let provider = ConfiguredMeetingLinkProvider::new("https://meet.example.com");
        assert!(provider.issue(&context("b-1")).await.is_err());
    }

    #[test]
    fn parse_date_reports_input() {
        assert!(parse_date("2025-03-10").is_ok());
        let err = parse_date("March 10").expect_err("invalid date");
        assert!(err.contains("March 10"));
    }
}
