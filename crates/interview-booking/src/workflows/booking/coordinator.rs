use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::domain::{BookingId, BookingPatch, BookingProjection, ProjectionSide};
use super::error::{BookingError, MissingEntity};
use super::repository::{bounded, InsertOutcome, ProfileDirectory, ProjectionStore, StoreError};

/// Bounded retry applied to the second projection write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(25),
        }
    }
}

/// Failure of a dual write.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// The first write matched nothing; `current` is what the store holds now.
    #[error("booking {booking_id} was not updated on the {side} projection")]
    Rejected {
        booking_id: BookingId,
        side: ProjectionSide,
        current: Option<Box<BookingProjection>>,
    },
    /// The first insert was refused by its owning document.
    #[error("booking {booking_id} was refused by the {side} projection: {outcome:?}")]
    Refused {
        booking_id: BookingId,
        side: ProjectionSide,
        owner: String,
        outcome: InsertOutcome,
    },
    #[error("booking {booking_id} could not be written to the {side} projection after {attempts} attempt(s)")]
    Consistency {
        booking_id: BookingId,
        side: ProjectionSide,
        attempts: u32,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CoordinationError> for BookingError {
    fn from(value: CoordinationError) -> Self {
        match value {
            CoordinationError::Rejected {
                booking_id,
                current: None,
                ..
            } => BookingError::NotFound(MissingEntity::Booking(booking_id.0)),
            CoordinationError::Rejected {
                booking_id,
                current: Some(current),
                ..
            } => BookingError::Conflict(format!(
                "booking {booking_id} is {} and cannot take this change",
                current.status
            )),
            CoordinationError::Refused {
                side,
                owner,
                outcome: InsertOutcome::OwnerMissing,
                ..
            } => match side {
                ProjectionSide::Candidate => BookingError::NotFound(MissingEntity::Candidate(owner)),
                ProjectionSide::Interviewer => {
                    BookingError::NotFound(MissingEntity::Interviewer(owner))
                }
            },
            CoordinationError::Refused {
                booking_id, side, ..
            } => BookingError::Conflict(format!(
                "booking {booking_id} conflicts with an active booking on the {side} side"
            )),
            CoordinationError::Consistency {
                booking_id,
                side,
                attempts,
            } => BookingError::Consistency {
                booking_id,
                side,
                attempts,
            },
            CoordinationError::Store(err) => BookingError::Store(err),
        }
    }
}

/// Both stored copies of a booking as currently persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionPair {
    pub candidate: Option<BookingProjection>,
    pub interviewer: Option<BookingProjection>,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub scanned: usize,
    /// Candidate copies whose status or link were brought in line.
    pub repaired: Vec<BookingId>,
    /// Copies that were missing on one side and re-inserted from the other.
    pub restored: Vec<BookingId>,
    /// Candidate-only copies seen for the first time; restored on the next
    /// live pass if the interviewer copy still has not appeared.
    pub deferred: Vec<BookingId>,
    pub unrepairable: Vec<BookingId>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty()
            && self.restored.is_empty()
            && self.deferred.is_empty()
            && self.unrepairable.is_empty()
    }
}

/// How a reconciliation pass treats a candidate copy with no interviewer copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Writers may be in flight, so such a copy is only restored once it has
    /// been seen orphaned on two consecutive passes.
    Live,
    /// Nothing else writes to the store (an offline snapshot); orphans are
    /// restored on the first pass.
    Snapshot,
}

/// Keeps the candidate-side and interviewer-side copies of a booking in step.
///
/// Inserts go candidate side first, because that document enforces the
/// one-active-booking-per-date rule. Updates go interviewer side first, since
/// that copy is authoritative for status and timing. In both cases the second
/// write is retried with backoff and a persistent miss surfaces as
/// [`CoordinationError::Consistency`], never as a silent success. A create
/// whose interviewer copy never lands is withdrawn from both sides.
pub struct DualRecordCoordinator {
    store: Arc<dyn ProjectionStore>,
    directory: Arc<dyn ProfileDirectory>,
    retry: RetryPolicy,
    store_timeout: Duration,
    pending_orphans: Mutex<HashSet<BookingId>>,
}

impl DualRecordCoordinator {
    pub fn new(
        store: Arc<dyn ProjectionStore>,
        directory: Arc<dyn ProfileDirectory>,
        retry: RetryPolicy,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            retry: RetryPolicy {
                attempts: retry.attempts.max(1),
                ..retry
            },
            store_timeout,
            pending_orphans: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ProjectionStore> {
        &self.store
    }

    pub async fn load(&self, booking: &BookingId) -> Result<ProjectionPair, StoreError> {
        let interviewer = bounded(
            self.store_timeout,
            self.store.find(ProjectionSide::Interviewer, booking),
        )
        .await?;
        let candidate = bounded(
            self.store_timeout,
            self.store.find(ProjectionSide::Candidate, booking),
        )
        .await?;
        Ok(ProjectionPair {
            candidate,
            interviewer,
        })
    }

    /// Writes a new booking into both owning documents.
    pub async fn insert(
        &self,
        candidate_copy: BookingProjection,
        interviewer_copy: BookingProjection,
    ) -> Result<(), CoordinationError> {
        let booking_id = candidate_copy.id.clone();
        let owner = candidate_copy.candidate_id.0.clone();
        let outcome = bounded(
            self.store_timeout,
            self.store.insert(ProjectionSide::Candidate, candidate_copy),
        )
        .await?;
        if !matches!(outcome, InsertOutcome::Inserted | InsertOutcome::AlreadyPresent) {
            return Err(CoordinationError::Refused {
                booking_id,
                side: ProjectionSide::Candidate,
                owner,
                outcome,
            });
        }

        let written = self
            .insert_secondary(ProjectionSide::Interviewer, interviewer_copy)
            .await;
        if written.is_err() {
            self.withdraw(&booking_id).await;
        }
        written
    }

    /// Removes a half-written booking, interviewer side first so no
    /// interviewer-only copy is ever left behind. Whatever cannot be removed
    /// stays for reconciliation.
    async fn withdraw(&self, booking: &BookingId) {
        for side in [ProjectionSide::Interviewer, ProjectionSide::Candidate] {
            match bounded(self.store_timeout, self.store.remove(side, booking)).await {
                Ok(removed) => {
                    info!(booking_id = %booking, %side, removed, "half-written booking withdrawn")
                }
                Err(err) => {
                    error!(booking_id = %booking, %side, error = %err, "half-written booking could not be withdrawn")
                }
            }
        }
    }

    /// Applies `patch` to both copies of `booking` and returns the
    /// interviewer-side copy as stored afterwards.
    pub async fn apply(
        &self,
        booking: &BookingId,
        patch: &BookingPatch,
    ) -> Result<BookingProjection, CoordinationError> {
        let matched = bounded(
            self.store_timeout,
            self.store.update(ProjectionSide::Interviewer, booking, patch),
        )
        .await?;

        if matched == 0 {
            let current = bounded(
                self.store_timeout,
                self.store.find(ProjectionSide::Interviewer, booking),
            )
            .await?;
            return Err(CoordinationError::Rejected {
                booking_id: booking.clone(),
                side: ProjectionSide::Interviewer,
                current: current.map(Box::new),
            });
        }
        if matched > 1 {
            warn!(booking_id = %booking, matched, "booking id matched more than one interviewer copy");
        }

        self.update_secondary(booking, patch).await?;

        bounded(
            self.store_timeout,
            self.store.find(ProjectionSide::Interviewer, booking),
        )
        .await?
        .ok_or_else(|| CoordinationError::Rejected {
            booking_id: booking.clone(),
            side: ProjectionSide::Interviewer,
            current: None,
        })
    }

    /// Re-inserts a copy that is missing on `side`, using the surviving copy.
    pub async fn restore(
        &self,
        side: ProjectionSide,
        copy: BookingProjection,
    ) -> Result<(), CoordinationError> {
        warn!(booking_id = %copy.id, %side, "restoring missing booking projection");
        let copy = self.shaped_for(side, copy).await?;
        self.insert_secondary(side, copy).await
    }

    /// Turns the surviving copy into the one `side` stores. Only the
    /// interviewer copy carries the candidate's name and position, which are
    /// looked up again when the source copy lacks them.
    async fn shaped_for(
        &self,
        side: ProjectionSide,
        mut copy: BookingProjection,
    ) -> Result<BookingProjection, StoreError> {
        match side {
            ProjectionSide::Candidate => {
                copy.candidate_name = None;
                copy.position = None;
            }
            ProjectionSide::Interviewer => {
                if copy.candidate_name.is_none() || copy.position.is_none() {
                    match bounded(self.store_timeout, self.directory.candidate(&copy.candidate_id))
                        .await?
                    {
                        Some(profile) => {
                            copy.candidate_name = Some(profile.display_name());
                            copy.position = Some(profile.position());
                        }
                        None => warn!(
                            booking_id = %copy.id,
                            candidate_id = %copy.candidate_id,
                            "candidate profile missing; restored copy has no display fields"
                        ),
                    }
                }
            }
        }
        Ok(copy)
    }

    async fn insert_secondary(
        &self,
        side: ProjectionSide,
        copy: BookingProjection,
    ) -> Result<(), CoordinationError> {
        let booking_id = copy.id.clone();
        let mut delay = self.retry.initial_backoff;

        for attempt in 1..=self.retry.attempts {
            match bounded(self.store_timeout, self.store.insert(side, copy.clone())).await {
                Ok(InsertOutcome::Inserted | InsertOutcome::AlreadyPresent) => return Ok(()),
                Ok(outcome) => {
                    warn!(booking_id = %booking_id, %side, attempt, ?outcome, "second projection insert did not apply");
                }
                Err(err) => {
                    warn!(booking_id = %booking_id, %side, attempt, error = %err, "second projection insert failed");
                }
            }
            if attempt < self.retry.attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        error!(
            booking_id = %booking_id,
            %side,
            attempts = self.retry.attempts,
            "booking projections out of sync; left for reconciliation"
        );
        Err(CoordinationError::Consistency {
            booking_id,
            side,
            attempts: self.retry.attempts,
        })
    }

    async fn update_secondary(
        &self,
        booking: &BookingId,
        patch: &BookingPatch,
    ) -> Result<(), CoordinationError> {
        let side = ProjectionSide::Candidate;
        let mut delay = self.retry.initial_backoff;

        for attempt in 1..=self.retry.attempts {
            match bounded(self.store_timeout, self.store.update(side, booking, patch)).await {
                Ok(0) => {
                    warn!(booking_id = %booking, %side, attempt, "second projection update matched nothing");
                }
                Ok(_) => return Ok(()),
                Err(err) => {
                    warn!(booking_id = %booking, %side, attempt, error = %err, "second projection update failed");
                }
            }
            if attempt < self.retry.attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        error!(
            booking_id = %booking,
            %side,
            attempts = self.retry.attempts,
            "booking projections out of sync; left for reconciliation"
        );
        Err(CoordinationError::Consistency {
            booking_id: booking.clone(),
            side,
            attempts: self.retry.attempts,
        })
    }

    /// One reconciliation pass over every stored booking. The interviewer copy
    /// wins on status and link; a copy missing on either side is re-inserted,
    /// subject to `mode` for candidate-only copies.
    pub async fn reconcile(&self, mode: ReconcileMode) -> Result<ReconciliationReport, StoreError> {
        // Creates write the candidate copy first, so scanning the interviewer
        // side first never sees a copy whose candidate twin is still unwritten.
        let interviewer_side: BTreeMap<BookingId, BookingProjection> = bounded(
            self.store_timeout,
            self.store.scan(ProjectionSide::Interviewer),
        )
        .await?
        .into_iter()
        .map(|copy| (copy.id.clone(), copy))
        .collect();
        let mut candidate_side: BTreeMap<BookingId, BookingProjection> =
            bounded(self.store_timeout, self.store.scan(ProjectionSide::Candidate))
                .await?
                .into_iter()
                .map(|copy| (copy.id.clone(), copy))
                .collect();

        let mut report = ReconciliationReport::default();

        for (id, authoritative) in &interviewer_side {
            report.scanned += 1;
            match candidate_side.remove(id) {
                Some(copy) if copy.agrees_with(authoritative) => {}
                Some(_) => {
                    let patch = BookingPatch {
                        status: Some(authoritative.status),
                        meeting_link: authoritative.meeting_link.clone(),
                    };
                    let matched = bounded(
                        self.store_timeout,
                        self.store.update(ProjectionSide::Candidate, id, &patch),
                    )
                    .await?;
                    // A stored link is never cleared, so a candidate copy holding
                    // a link the interviewer copy lacks still disagrees here.
                    let settled = matched > 0
                        && bounded(
                            self.store_timeout,
                            self.store.find(ProjectionSide::Candidate, id),
                        )
                        .await?
                        .is_some_and(|copy| copy.agrees_with(authoritative));
                    if settled {
                        report.repaired.push(id.clone());
                    } else {
                        report.unrepairable.push(id.clone());
                    }
                }
                None => {
                    let copy = self
                        .shaped_for(ProjectionSide::Candidate, authoritative.clone())
                        .await?;
                    match bounded(
                        self.store_timeout,
                        self.store.insert(ProjectionSide::Candidate, copy),
                    )
                    .await?
                    {
                        InsertOutcome::Inserted | InsertOutcome::AlreadyPresent => {
                            report.restored.push(id.clone())
                        }
                        _ => report.unrepairable.push(id.clone()),
                    }
                }
            }
        }

        let mut pending = self.pending_orphans.lock().await;
        let seen_before = std::mem::take(&mut *pending);
        for (id, orphan) in candidate_side {
            report.scanned += 1;
            if mode == ReconcileMode::Live && !seen_before.contains(&id) {
                pending.insert(id.clone());
                report.deferred.push(id);
                continue;
            }
            let copy = self.shaped_for(ProjectionSide::Interviewer, orphan).await?;
            match bounded(
                self.store_timeout,
                self.store.insert(ProjectionSide::Interviewer, copy),
            )
            .await?
            {
                InsertOutcome::Inserted | InsertOutcome::AlreadyPresent => report.restored.push(id),
                _ => report.unrepairable.push(id),
            }
        }
        drop(pending);

        if report.is_clean() {
            info!(scanned = report.scanned, "booking projections consistent");
        } else {
            warn!(
                scanned = report.scanned,
                repaired = report.repaired.len(),
                restored = report.restored.len(),
                deferred = report.deferred.len(),
                unrepairable = report.unrepairable.len(),
                "booking projections reconciled"
            );
            for id in &report.unrepairable {
                error!(booking_id = %id, "booking projections could not be reconciled");
            }
        }

        Ok(report)
    }

    /// Runs live [`Self::reconcile`] passes every `every` until the task is aborted.
    pub fn spawn_reconciler(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = self.reconcile(ReconcileMode::Live).await {
                    error!(error = %err, "reconciliation pass failed");
                }
            }
        })
    }
}
