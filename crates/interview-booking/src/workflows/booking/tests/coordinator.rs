use std::sync::Arc;

use super::common::*;

use crate::workflows::booking::coordinator::ReconcileMode;
use crate::workflows::booking::domain::{BookingPatch, BookingStatus, CandidateId, ProjectionSide};
use crate::workflows::booking::error::BookingError;
use crate::workflows::booking::repository::ProjectionStore;

#[tokio::test]
async fn transient_miss_on_candidate_copy_is_retried() {
    let (store, flaky, service) = flaky_harness(Arc::new(RecordingLinks::default()));
    let booking = requested_booking(&service).await;
    flaky.miss_candidate_updates(2);

    service
        .update_interview_request(&interviewer(), &booking, "Cancelled")
        .await
        .expect("third attempt lands");

    let (candidate_copy, interviewer_copy) = both_copies(&store, &booking).await;
    assert_eq!(candidate_copy.status, BookingStatus::Cancelled);
    assert!(candidate_copy.agrees_with(&interviewer_copy));
}

#[tokio::test]
async fn persistent_miss_surfaces_consistency_error() {
    let (store, flaky, service) = flaky_harness(Arc::new(RecordingLinks::default()));
    let booking = requested_booking(&service).await;
    flaky.miss_candidate_updates(u32::MAX);

    let result = service
        .update_interview_request(&interviewer(), &booking, "Approved")
        .await;
    match result {
        Err(err @ BookingError::Consistency { .. }) => {
            assert!(err.is_retryable());
            if let BookingError::Consistency { side, attempts, .. } = err {
                assert_eq!(side, ProjectionSide::Candidate);
                assert_eq!(attempts, 3);
            }
        }
        other => panic!("expected consistency error, got {other:?}"),
    }

    let (candidate_copy, interviewer_copy) = both_copies(&store, &booking).await;
    assert_eq!(interviewer_copy.status, BookingStatus::Approved);
    assert_eq!(candidate_copy.status, BookingStatus::Requested);
}

#[tokio::test]
async fn retrying_the_approval_converges_both_copies() {
    let (store, flaky, service) = flaky_harness(Arc::new(RecordingLinks::default()));
    let booking = requested_booking(&service).await;
    flaky.miss_candidate_updates(u32::MAX);
    let _ = service
        .update_interview_request(&interviewer(), &booking, "Approved")
        .await;
    flaky.miss_candidate_updates(0);

    let outcome = service
        .update_interview_request(&interviewer(), &booking, "Approved")
        .await
        .expect("retry succeeds");
    assert!(outcome.booking.meeting_link.is_some());

    let (candidate_copy, interviewer_copy) = both_copies(&store, &booking).await;
    assert!(candidate_copy.agrees_with(&interviewer_copy));
}

#[tokio::test]
async fn reconcile_repairs_drifted_candidate_copy() {
    let (store, flaky, service) = flaky_harness(Arc::new(RecordingLinks::default()));
    let booking = requested_booking(&service).await;
    flaky.miss_candidate_updates(u32::MAX);
    let _ = service
        .update_interview_request(&interviewer(), &booking, "Approved")
        .await;
    flaky.miss_candidate_updates(0);

    let report = service.reconcile(ReconcileMode::Live).await.expect("reconcile");
    assert_eq!(report.scanned, 1);
    assert_eq!(report.repaired, vec![booking.clone()]);

    let (candidate_copy, interviewer_copy) = both_copies(&store, &booking).await;
    assert_eq!(candidate_copy.status, BookingStatus::Approved);
    assert!(candidate_copy.agrees_with(&interviewer_copy));

    let again = service.reconcile(ReconcileMode::Live).await.expect("second pass");
    assert!(again.is_clean());
}

#[tokio::test]
async fn live_reconcile_waits_a_pass_before_restoring_an_interviewer_copy() {
    let Harness { store, service, .. } = harness();
    let booking = candidate_only_booking(&store, &service).await;

    let first = service.reconcile(ReconcileMode::Live).await.expect("first pass");
    assert_eq!(first.deferred, vec![booking.clone()]);
    assert!(first.restored.is_empty());
    assert!(store
        .find(ProjectionSide::Interviewer, &booking)
        .await
        .expect("find")
        .is_none());

    let second = service.reconcile(ReconcileMode::Live).await.expect("second pass");
    assert_eq!(second.restored, vec![booking.clone()]);
    assert!(second.deferred.is_empty());

    let (candidate_copy, interviewer_copy) = both_copies(&store, &booking).await;
    assert!(candidate_copy.agrees_with(&interviewer_copy));
    assert_eq!(interviewer_copy.candidate_name.as_deref(), Some("Asha Rao"));
    assert_eq!(interviewer_copy.position.as_deref(), Some("Backend Engineer"));

    let views = service
        .interview_requests(&interviewer())
        .await
        .expect("list");
    assert_eq!(views[0].position, "Backend Engineer");
}

#[tokio::test]
async fn orphan_that_heals_between_passes_is_not_restored() {
    let Harness { store, service, .. } = harness();
    let booking = candidate_only_booking(&store, &service).await;

    let first = service.reconcile(ReconcileMode::Live).await.expect("first pass");
    assert_eq!(first.deferred, vec![booking.clone()]);

    let mut late_copy = store
        .find(ProjectionSide::Candidate, &booking)
        .await
        .expect("find")
        .expect("candidate copy");
    late_copy.candidate_name = Some("Asha Rao".to_string());
    late_copy.position = Some("Backend Engineer".to_string());
    store
        .insert(ProjectionSide::Interviewer, late_copy)
        .await
        .expect("late interviewer write");

    let second = service.reconcile(ReconcileMode::Live).await.expect("second pass");
    assert!(second.is_clean(), "{second:?}");
}

#[tokio::test]
async fn snapshot_reconcile_restores_orphans_in_one_pass() {
    let Harness { store, service, .. } = harness();
    let booking = candidate_only_booking(&store, &service).await;

    let report = service
        .reconcile(ReconcileMode::Snapshot)
        .await
        .expect("reconcile");
    assert_eq!(report.restored, vec![booking.clone()]);
    assert!(report.deferred.is_empty());

    let (_, interviewer_copy) = both_copies(&store, &booking).await;
    assert_eq!(interviewer_copy.candidate_name.as_deref(), Some("Asha Rao"));
    assert_eq!(interviewer_copy.position.as_deref(), Some("Backend Engineer"));
}

#[tokio::test]
async fn failed_create_is_withdrawn_and_can_be_retried() {
    let (store, flaky, service) = flaky_harness(Arc::new(RecordingLinks::default()));
    service
        .add_availability(&interviewer(), vec![slot(DATE, "09:00", "10:00")])
        .await
        .expect("slot");
    flaky.fail_interviewer_inserts(u32::MAX);

    match service
        .schedule(&candidate(), request(DATE, "09:00", "10:00"))
        .await
    {
        Err(err @ BookingError::Consistency { .. }) => assert!(err.is_retryable()),
        other => panic!("expected consistency error, got {other:?}"),
    }
    assert!(store
        .scan(ProjectionSide::Candidate)
        .await
        .expect("scan")
        .is_empty());
    flaky.fail_interviewer_inserts(0);

    let bookings = service
        .schedule(&candidate(), request(DATE, "09:00", "10:00"))
        .await
        .expect("retry books the date");
    assert_eq!(bookings.len(), 1);
    let (candidate_copy, interviewer_copy) = both_copies(&store, &bookings[0].id).await;
    assert!(candidate_copy.agrees_with(&interviewer_copy));
}

#[tokio::test]
async fn unwithdrawn_candidate_copy_is_left_for_reconciliation() {
    let (store, flaky, service) = flaky_harness(Arc::new(RecordingLinks::default()));
    service
        .add_availability(&interviewer(), vec![slot(DATE, "09:00", "10:00")])
        .await
        .expect("slot");
    flaky.fail_interviewer_inserts(u32::MAX);
    flaky.fail_candidate_removals(1);

    let result = service
        .schedule(&candidate(), request(DATE, "09:00", "10:00"))
        .await;
    assert!(matches!(result, Err(BookingError::Consistency { .. })));
    flaky.fail_interviewer_inserts(0);

    let orphans = store.scan(ProjectionSide::Candidate).await.expect("scan");
    assert_eq!(orphans.len(), 1);

    let report = service
        .reconcile(ReconcileMode::Snapshot)
        .await
        .expect("reconcile");
    assert_eq!(report.restored, vec![orphans[0].id.clone()]);
    let (candidate_copy, interviewer_copy) = both_copies(&store, &orphans[0].id).await;
    assert!(candidate_copy.agrees_with(&interviewer_copy));
}

#[tokio::test]
async fn candidate_link_missing_on_interviewer_side_is_unrepairable() {
    let Harness { store, service, .. } = harness();
    let booking = requested_booking(&service).await;
    store
        .update(
            ProjectionSide::Candidate,
            &booking,
            &BookingPatch::meeting_link("https://meet.test/stray"),
        )
        .await
        .expect("update");

    let report = service.reconcile(ReconcileMode::Live).await.expect("reconcile");
    assert!(report.repaired.is_empty());
    assert_eq!(report.unrepairable, vec![booking]);
}

#[tokio::test]
async fn reconcile_reports_copies_without_an_owner() {
    let Harness { store, service, .. } = harness();
    let booking = requested_booking(&service).await;
    assert!(store
        .remove_candidate(&CandidateId("c-1".to_string()))
        .expect("remove"));

    let report = service.reconcile(ReconcileMode::Live).await.expect("reconcile");
    assert_eq!(report.unrepairable, vec![booking.clone()]);
    assert!(store
        .find(ProjectionSide::Interviewer, &booking)
        .await
        .expect("find")
        .is_some());
}
