use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::domain::{
    parse_clock, parse_date, Actor, ActorRole, AvailabilitySlot, InterviewerId, SlotId, SlotInput,
    SlotKey,
};
use super::error::{BookingError, MissingEntity};
use super::repository::{bounded, AvailabilityRepository, SlotRemoval};

/// Owns each interviewer's bookable slots. Adds are set-unions keyed by
/// date and range, so a repeated add is a no-op and concurrent adds commute.
pub struct AvailabilityStore {
    repository: Arc<dyn AvailabilityRepository>,
    store_timeout: Duration,
}

impl AvailabilityStore {
    pub fn new(repository: Arc<dyn AvailabilityRepository>, store_timeout: Duration) -> Self {
        Self {
            repository,
            store_timeout,
        }
    }

    /// Validates and merges `slots`, returning the interviewer's full collection.
    pub async fn add_slots(
        &self,
        actor: &Actor,
        slots: Vec<SlotInput>,
    ) -> Result<Vec<AvailabilitySlot>, BookingError> {
        let interviewer = interviewer_of(actor)?;
        let normalized = normalize(slots)?;
        let requested = normalized.len();

        let stored = bounded(
            self.store_timeout,
            self.repository.merge(&interviewer, normalized),
        )
        .await?
        .ok_or_else(|| BookingError::NotFound(MissingEntity::Interviewer(interviewer.0.clone())))?;

        info!(interviewer_id = %interviewer, requested, total = stored.len(), "availability merged");
        Ok(stored)
    }

    pub async fn delete_slot(&self, actor: &Actor, slot: &SlotId) -> Result<(), BookingError> {
        let interviewer = interviewer_of(actor)?;
        match bounded(
            self.store_timeout,
            self.repository.remove(&interviewer, slot),
        )
        .await?
        {
            SlotRemoval::Removed => {
                info!(interviewer_id = %interviewer, slot_id = %slot, "availability slot removed");
                Ok(())
            }
            SlotRemoval::SlotMissing => Err(BookingError::NotFound(MissingEntity::Slot(
                slot.0.clone(),
            ))),
            SlotRemoval::OwnerMissing => Err(BookingError::NotFound(MissingEntity::Interviewer(
                interviewer.0,
            ))),
        }
    }

    pub async fn get_slots(&self, actor: &Actor) -> Result<Vec<AvailabilitySlot>, BookingError> {
        let interviewer = interviewer_of(actor)?;
        self.slots_of(&interviewer).await
    }

    /// Slot lookup used by the booking engine; does not require an interviewer actor.
    pub(crate) async fn slots_of(
        &self,
        interviewer: &InterviewerId,
    ) -> Result<Vec<AvailabilitySlot>, BookingError> {
        bounded(self.store_timeout, self.repository.slots(interviewer))
            .await?
            .ok_or_else(|| BookingError::NotFound(MissingEntity::Interviewer(interviewer.0.clone())))
    }

    /// Removes the slot with exactly this key, if present. Returns whether one was removed.
    pub(crate) async fn consume(
        &self,
        interviewer: &InterviewerId,
        key: SlotKey,
    ) -> Result<bool, BookingError> {
        let slots = self.slots_of(interviewer).await?;
        let Some(slot) = slots.into_iter().find(|slot| slot.key() == key) else {
            return Ok(false);
        };
        let removal = bounded(
            self.store_timeout,
            self.repository.remove(interviewer, &slot.id),
        )
        .await?;
        Ok(removal == SlotRemoval::Removed)
    }
}

fn interviewer_of(actor: &Actor) -> Result<InterviewerId, BookingError> {
    match actor.role {
        ActorRole::Interviewer => Ok(InterviewerId(actor.id.clone())),
        ActorRole::Candidate => Err(BookingError::Forbidden(
            "availability is managed by interviewers only".to_string(),
        )),
    }
}

fn normalize(slots: Vec<SlotInput>) -> Result<Vec<AvailabilitySlot>, BookingError> {
    if slots.is_empty() {
        return Err(BookingError::validation(
            "at least one availability slot is required",
        ));
    }

    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(slots.len());
    for (index, input) in slots.into_iter().enumerate() {
        let date = parse_date(&input.date).ok_or_else(|| {
            BookingError::validation(format!("slot {index}: invalid date '{}'", input.date))
        })?;
        let from = parse_clock(&input.from).ok_or_else(|| {
            BookingError::validation(format!("slot {index}: invalid start time '{}'", input.from))
        })?;
        let to = parse_clock(&input.to).ok_or_else(|| {
            BookingError::validation(format!("slot {index}: invalid end time '{}'", input.to))
        })?;
        if from >= to {
            return Err(BookingError::validation(format!(
                "slot {index}: start time must be before end time"
            )));
        }

        let slot = AvailabilitySlot {
            id: SlotId::generate(),
            date,
            from,
            to,
        };
        if seen.insert(slot.key()) {
            normalized.push(slot);
        }
    }
    Ok(normalized)
}
