use crate::infra::{load_store, ConfiguredMeetingLinkProvider};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use clap::Args;
use interview_booking::config::{AppConfig, BookingConfig};
use interview_booking::error::AppError;
use interview_booking::telemetry;
use interview_booking::workflows::booking::{
    Actor, ApprovalNotice, BookingCollaborators, BookingError, BookingRequestInput,
    BookingService, CandidateId, CandidateProfile, DirectorySeed, ExternalServiceError,
    InMemoryBookingStore, InterviewerId, InterviewerProfile, NotificationChannel,
    OutboundMessage, ProjectionSide, ProjectionStore, ReconcileMode, ReconciliationReport,
    SlotInput,
};
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_CANDIDATE: &str = "cand-demo";
const DEMO_INTERVIEWER: &str = "int-demo";
const INTERVIEWER_EMAIL: &str = "priya.natarajan@example.com";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Interview date (YYYY-MM-DD). Defaults to tomorrow.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Price quoted by the candidate.
    #[arg(long, default_value_t = 50.0)]
    pub(crate) price: f64,
    /// Make the interviewer's confirmation e-mail fail to show best-effort delivery.
    #[arg(long)]
    pub(crate) fail_interviewer_mail: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ReconcileArgs {
    /// Snapshot to reconcile. Defaults to APP_DIRECTORY_SEED.
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
}

/// Prints outgoing mail instead of sending it; can reject one address.
struct ConsoleOutbox {
    reject: Option<String>,
}

#[async_trait]
impl NotificationChannel for ConsoleOutbox {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ExternalServiceError> {
        if self.reject.as_deref() == Some(message.to.as_str()) {
            return Err(ExternalServiceError::Unavailable {
                service: "demo outbox",
                reason: format!("{} bounced", message.to),
            });
        }
        println!("  mail to {} | {}", message.to, message.subject);
        Ok(())
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        date,
        price,
        fail_interviewer_mail,
    } = args;
    let date = date.unwrap_or_else(|| Local::now().date_naive() + chrono::Duration::days(1));
    let date_label = date.format("%Y-%m-%d").to_string();

    let config = BookingConfig::default();
    let store = InMemoryBookingStore::from_seed(demo_seed());
    let outbox = ConsoleOutbox {
        reject: fail_interviewer_mail.then(|| INTERVIEWER_EMAIL.to_string()),
    };
    let service = BookingService::new(
        BookingCollaborators::in_memory(
            store.clone(),
            Arc::new(ConfiguredMeetingLinkProvider::new(
                config.meeting_link_base_url.clone(),
            )),
            Arc::new(outbox),
        ),
        &config,
    );

    let candidate = Actor::candidate(DEMO_CANDIDATE);
    let interviewer = Actor::interviewer(DEMO_INTERVIEWER);
    let slot = SlotInput {
        date: date_label.clone(),
        from: "09:00".to_string(),
        to: "10:00".to_string(),
    };

    println!("Interview booking demo for {date_label}");

    service
        .add_availability(&interviewer, vec![slot.clone()])
        .await?;
    let slots = service.add_availability(&interviewer, vec![slot]).await?;
    println!(
        "\n1. Interviewer published the same slot twice; {} slot(s) on file",
        slots.len()
    );
    for slot in &slots {
        println!("  {} {} ({})", slot.date, slot.time_range(), slot.id);
    }
    for listing in service.interviewers(&candidate).await? {
        println!(
            "  candidate sees {} at {} with {} open slot(s)",
            listing.name,
            listing
                .price
                .map_or_else(|| "no listed price".to_string(), |price| format!("{price:.2}")),
            listing.availability.len()
        );
    }

    let request = BookingRequestInput {
        interviewer_id: Some(DEMO_INTERVIEWER.to_string()),
        date: Some(date_label.clone()),
        from: Some("09:00".to_string()),
        to: Some("10:00".to_string()),
        price: Some(price),
    };
    let bookings = service.schedule(&candidate, request.clone()).await?;
    let Some(booking) = bookings.first() else {
        return Err(AppError::Workflow(BookingError::Validation(
            "demo booking was not recorded".to_string(),
        )));
    };
    let booking_id = booking.id.clone();
    println!(
        "\n2. Candidate requested {} at {} for {:.2}: {}",
        booking.date, booking.time_range, booking.price, booking.status
    );

    println!("\n3. Interviewer inbox");
    for row in service.interview_requests(&interviewer).await? {
        println!(
            "  {} | {} {} {} | {} | {}",
            row.candidate_name, row.day, row.date, row.time, row.position, row.status
        );
    }

    println!("\n4. Interviewer approves");
    let approved = service
        .update_interview_request(&interviewer, &booking_id, "Approved")
        .await?;
    println!(
        "  status {} | link {}",
        approved.booking.status,
        approved.booking.meeting_link.as_deref().unwrap_or("(pending)")
    );
    if let Some(notice) = &approved.notice {
        render_notice(notice);
    }

    let again = service
        .update_interview_request(&interviewer, &booking_id, "Approved")
        .await?;
    println!(
        "\n5. Approval retried; link unchanged: {}",
        again.booking.meeting_link == approved.booking.meeting_link
    );

    print!("\n6. Candidate books the same date again: ");
    match service.schedule(&candidate, request).await {
        Err(BookingError::Conflict(reason)) => println!("rejected ({reason})"),
        Err(other) => return Err(other.into()),
        Ok(_) => println!("unexpectedly accepted"),
    }

    let candidate_copy = store
        .find(ProjectionSide::Candidate, &booking_id)
        .await?;
    let interviewer_copy = store
        .find(ProjectionSide::Interviewer, &booking_id)
        .await?;
    let consistent = match (&candidate_copy, &interviewer_copy) {
        (Some(left), Some(right)) => left.agrees_with(right),
        _ => false,
    };
    println!("\n7. Candidate and interviewer copies agree: {consistent}");

    let report = service.reconcile(ReconcileMode::Snapshot).await?;
    render_report(&report);
    Ok(())
}

pub(crate) async fn run_reconcile(args: ReconcileArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if let Some(seed) = args.seed {
        config.directory_seed = Some(seed);
    }
    telemetry::init(&config.telemetry)?;

    let store = load_store(&config)?;
    let service = crate::infra::build_service(store, &config.booking);
    let report = service.reconcile(ReconcileMode::Snapshot).await?;
    render_report(&report);
    Ok(())
}

fn render_notice(notice: &ApprovalNotice) {
    for report in &notice.deliveries {
        match &report.error {
            None => println!("  delivered to {:?} <{}>", report.recipient, report.address),
            Some(error) => println!(
                "  NOT delivered to {:?} <{}>: {error}",
                report.recipient, report.address
            ),
        }
    }
}

fn render_report(report: &ReconciliationReport) {
    println!("\nReconciliation");
    println!("  scanned      {}", report.scanned);
    println!("  repaired     {}", report.repaired.len());
    println!("  restored     {}", report.restored.len());
    println!("  deferred     {}", report.deferred.len());
    println!("  unrepairable {}", report.unrepairable.len());
    for id in &report.unrepairable {
        println!("    - {id}");
    }
}

fn demo_seed() -> DirectorySeed {
    DirectorySeed {
        candidates: vec![CandidateProfile {
            id: CandidateId(DEMO_CANDIDATE.to_string()),
            first_name: "Jonas".to_string(),
            last_name: "Eriksen".to_string(),
            email: "jonas.eriksen@example.com".to_string(),
            job_title: Some("Platform Engineer".to_string()),
            profile_photo: None,
        }],
        interviewers: vec![InterviewerProfile {
            id: InterviewerId(DEMO_INTERVIEWER.to_string()),
            first_name: "Priya".to_string(),
            last_name: Some("Natarajan".to_string()),
            email: INTERVIEWER_EMAIL.to_string(),
            job_title: Some("Engineering Manager".to_string()),
            profile_photo: None,
            experience: Some("9 years".to_string()),
            price: Some(50.0),
        }],
        ..DirectorySeed::default()
    }
}
