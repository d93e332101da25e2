use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::domain::{
    AvailabilitySlot, BookingId, BookingPatch, BookingProjection, CandidateId, CandidateProfile,
    InterviewerId, InterviewerProfile, ProjectionSide, SlotId,
};
use super::repository::{
    AvailabilityRepository, InsertOutcome, ProfileDirectory, ProjectionStore, SlotRemoval,
    StoreError,
};

/// Snapshot loaded at start-up: profiles plus, optionally, booking copies
/// exported from each side's documents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySeed {
    #[serde(default)]
    pub candidates: Vec<CandidateProfile>,
    #[serde(default)]
    pub interviewers: Vec<InterviewerProfile>,
    #[serde(default)]
    pub scheduled_interviews: Vec<BookingProjection>,
    #[serde(default)]
    pub interview_requests: Vec<BookingProjection>,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("unable to read directory seed: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory seed is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct CandidateDocument {
    profile: CandidateProfile,
    scheduled_interviews: Vec<BookingProjection>,
}

#[derive(Debug, Clone)]
struct InterviewerDocument {
    profile: InterviewerProfile,
    availability: Vec<AvailabilitySlot>,
    interview_requests: Vec<BookingProjection>,
}

#[derive(Debug, Default)]
struct Documents {
    candidates: HashMap<CandidateId, CandidateDocument>,
    interviewers: HashMap<InterviewerId, InterviewerDocument>,
}

impl Documents {
    fn bookings(&self, side: ProjectionSide) -> Box<dyn Iterator<Item = &BookingProjection> + '_> {
        match side {
            ProjectionSide::Candidate => Box::new(
                self.candidates
                    .values()
                    .flat_map(|doc| doc.scheduled_interviews.iter()),
            ),
            ProjectionSide::Interviewer => Box::new(
                self.interviewers
                    .values()
                    .flat_map(|doc| doc.interview_requests.iter()),
            ),
        }
    }

    fn bookings_mut(
        &mut self,
        side: ProjectionSide,
    ) -> Box<dyn Iterator<Item = &mut BookingProjection> + '_> {
        match side {
            ProjectionSide::Candidate => Box::new(
                self.candidates
                    .values_mut()
                    .flat_map(|doc| doc.scheduled_interviews.iter_mut()),
            ),
            ProjectionSide::Interviewer => Box::new(
                self.interviewers
                    .values_mut()
                    .flat_map(|doc| doc.interview_requests.iter_mut()),
            ),
        }
    }
}

/// Document-shaped store holding candidates (with their scheduled interviews)
/// and interviewers (with availability and interview requests). Every call
/// takes the lock once, which gives the same per-document atomicity a
/// document database offers and nothing more across calls.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBookingStore {
    documents: Arc<Mutex<Documents>>,
}

impl InMemoryBookingStore {
    pub fn from_seed(seed: DirectorySeed) -> Self {
        let mut documents = Documents::default();
        for profile in seed.candidates {
            documents.candidates.insert(
                profile.id.clone(),
                CandidateDocument {
                    profile,
                    scheduled_interviews: Vec::new(),
                },
            );
        }
        for profile in seed.interviewers {
            documents.interviewers.insert(
                profile.id.clone(),
                InterviewerDocument {
                    profile,
                    availability: Vec::new(),
                    interview_requests: Vec::new(),
                },
            );
        }
        for booking in seed.scheduled_interviews {
            match documents.candidates.get_mut(&booking.candidate_id) {
                Some(doc) => doc.scheduled_interviews.push(booking),
                None => warn!(booking_id = %booking.id, "seeded booking has no candidate document"),
            }
        }
        for booking in seed.interview_requests {
            match documents.interviewers.get_mut(&booking.interviewer_id) {
                Some(doc) => doc.interview_requests.push(booking),
                None => warn!(booking_id = %booking.id, "seeded booking has no interviewer document"),
            }
        }
        Self {
            documents: Arc::new(Mutex::new(documents)),
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SeedError> {
        let seed: DirectorySeed = serde_json::from_reader(reader)?;
        Ok(Self::from_seed(seed))
    }

    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, SeedError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Deletes a candidate document together with its embedded bookings.
    pub fn remove_candidate(&self, id: &CandidateId) -> Result<bool, StoreError> {
        let mut documents = self.lock()?;
        Ok(documents.candidates.remove(id).is_some())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Documents>, StoreError> {
        self.documents
            .lock()
            .map_err(|_| StoreError::Unavailable("document lock poisoned".to_string()))
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryBookingStore {
    async fn candidate(&self, id: &CandidateId) -> Result<Option<CandidateProfile>, StoreError> {
        let documents = self.lock()?;
        Ok(documents.candidates.get(id).map(|doc| doc.profile.clone()))
    }

    async fn interviewer(
        &self,
        id: &InterviewerId,
    ) -> Result<Option<InterviewerProfile>, StoreError> {
        let documents = self.lock()?;
        Ok(documents.interviewers.get(id).map(|doc| doc.profile.clone()))
    }

    async fn interviewers(&self) -> Result<Vec<InterviewerProfile>, StoreError> {
        let documents = self.lock()?;
        let mut all: Vec<InterviewerProfile> = documents
            .interviewers
            .values()
            .map(|doc| doc.profile.clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

#[async_trait]
impl AvailabilityRepository for InMemoryBookingStore {
    async fn merge(
        &self,
        interviewer: &InterviewerId,
        slots: Vec<AvailabilitySlot>,
    ) -> Result<Option<Vec<AvailabilitySlot>>, StoreError> {
        let mut documents = self.lock()?;
        let Some(doc) = documents.interviewers.get_mut(interviewer) else {
            return Ok(None);
        };
        for slot in slots {
            if !doc
                .availability
                .iter()
                .any(|existing| existing.key() == slot.key())
            {
                doc.availability.push(slot);
            }
        }
        Ok(Some(doc.availability.clone()))
    }

    async fn remove(
        &self,
        interviewer: &InterviewerId,
        slot: &SlotId,
    ) -> Result<SlotRemoval, StoreError> {
        let mut documents = self.lock()?;
        let Some(doc) = documents.interviewers.get_mut(interviewer) else {
            return Ok(SlotRemoval::OwnerMissing);
        };
        let before = doc.availability.len();
        doc.availability.retain(|existing| &existing.id != slot);
        Ok(if doc.availability.len() < before {
            SlotRemoval::Removed
        } else {
            SlotRemoval::SlotMissing
        })
    }

    async fn slots(
        &self,
        interviewer: &InterviewerId,
    ) -> Result<Option<Vec<AvailabilitySlot>>, StoreError> {
        let documents = self.lock()?;
        Ok(documents
            .interviewers
            .get(interviewer)
            .map(|doc| doc.availability.clone()))
    }
}

#[async_trait]
impl ProjectionStore for InMemoryBookingStore {
    async fn insert(
        &self,
        side: ProjectionSide,
        booking: BookingProjection,
    ) -> Result<InsertOutcome, StoreError> {
        let mut documents = self.lock()?;
        match side {
            ProjectionSide::Candidate => {
                let Some(doc) = documents.candidates.get_mut(&booking.candidate_id) else {
                    return Ok(InsertOutcome::OwnerMissing);
                };
                if doc.scheduled_interviews.iter().any(|b| b.id == booking.id) {
                    return Ok(InsertOutcome::AlreadyPresent);
                }
                let taken = doc
                    .scheduled_interviews
                    .iter()
                    .any(|b| b.date == booking.date && b.status.is_active());
                if taken && booking.status.is_active() {
                    return Ok(InsertOutcome::DateTaken);
                }
                doc.scheduled_interviews.push(booking);
            }
            ProjectionSide::Interviewer => {
                let Some(doc) = documents.interviewers.get_mut(&booking.interviewer_id) else {
                    return Ok(InsertOutcome::OwnerMissing);
                };
                if doc.interview_requests.iter().any(|b| b.id == booking.id) {
                    return Ok(InsertOutcome::AlreadyPresent);
                }
                doc.interview_requests.push(booking);
            }
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn update(
        &self,
        side: ProjectionSide,
        booking: &BookingId,
        patch: &BookingPatch,
    ) -> Result<u64, StoreError> {
        let mut documents = self.lock()?;
        let mut matched = 0;
        for current in documents.bookings_mut(side) {
            if &current.id == booking && patch.matches(current) {
                patch.apply_to(current);
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn remove(&self, side: ProjectionSide, booking: &BookingId) -> Result<u64, StoreError> {
        let mut documents = self.lock()?;
        let mut removed = 0;
        match side {
            ProjectionSide::Candidate => {
                for doc in documents.candidates.values_mut() {
                    let before = doc.scheduled_interviews.len();
                    doc.scheduled_interviews.retain(|b| &b.id != booking);
                    removed += (before - doc.scheduled_interviews.len()) as u64;
                }
            }
            ProjectionSide::Interviewer => {
                for doc in documents.interviewers.values_mut() {
                    let before = doc.interview_requests.len();
                    doc.interview_requests.retain(|b| &b.id != booking);
                    removed += (before - doc.interview_requests.len()) as u64;
                }
            }
        }
        Ok(removed)
    }

    async fn find(
        &self,
        side: ProjectionSide,
        booking: &BookingId,
    ) -> Result<Option<BookingProjection>, StoreError> {
        let documents = self.lock()?;
        let found = documents.bookings(side).find(|b| &b.id == booking).cloned();
        Ok(found)
    }

    async fn list_for_owner(
        &self,
        side: ProjectionSide,
        owner: &str,
    ) -> Result<Option<Vec<BookingProjection>>, StoreError> {
        let documents = self.lock()?;
        Ok(match side {
            ProjectionSide::Candidate => documents
                .candidates
                .get(&CandidateId(owner.to_string()))
                .map(|doc| doc.scheduled_interviews.clone()),
            ProjectionSide::Interviewer => documents
                .interviewers
                .get(&InterviewerId(owner.to_string()))
                .map(|doc| doc.interview_requests.clone()),
        })
    }

    async fn scan(&self, side: ProjectionSide) -> Result<Vec<BookingProjection>, StoreError> {
        let documents = self.lock()?;
        let mut all: Vec<BookingProjection> = documents.bookings(side).cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"{
        "candidates": [
            {"id": "c-1", "firstName": "Asha", "lastName": "Rao", "email": "asha@example.com"}
        ],
        "interviewers": [
            {"id": "i-1", "firstName": "Ben", "email": "ben@example.com", "jobTitle": "Staff Engineer"}
        ]
    }"#;

    #[tokio::test]
    async fn seed_populates_directory() {
        let store = InMemoryBookingStore::from_reader(SEED.as_bytes()).expect("seed parses");
        let candidate = store
            .candidate(&CandidateId("c-1".to_string()))
            .await
            .expect("lookup succeeds")
            .expect("candidate present");
        assert_eq!(candidate.display_name(), "Asha Rao");
        let interviewer = store
            .interviewer(&InterviewerId("i-1".to_string()))
            .await
            .expect("lookup succeeds")
            .expect("interviewer present");
        assert_eq!(interviewer.display_name(), "Ben");
        assert!(store
            .list_for_owner(ProjectionSide::Interviewer, "i-1")
            .await
            .expect("list succeeds")
            .expect("document exists")
            .is_empty());
    }

    #[tokio::test]
    async fn seeded_bookings_land_in_owner_documents() {
        let seed = r#"{
            "candidates": [
                {"id": "c-1", "firstName": "Asha", "lastName": "Rao", "email": "asha@example.com"}
            ],
            "interviewers": [
                {"id": "i-1", "firstName": "Ben", "email": "ben@example.com"}
            ],
            "scheduledInterviews": [
                {"id": "b-1", "candidateRef": "c-1", "interviewerRef": "i-1", "date": "2025-03-10",
                 "timeRange": "09:00 - 10:00", "price": 50.0, "status": "Requested", "meetingLink": null}
            ],
            "interviewRequests": [
                {"id": "b-1", "candidateRef": "c-1", "interviewerRef": "i-1", "date": "2025-03-10",
                 "timeRange": "09:00 - 10:00", "price": 50.0, "status": "Approved", "meetingLink": null},
                {"id": "b-2", "candidateRef": "c-1", "interviewerRef": "i-404", "date": "2025-03-11",
                 "timeRange": "09:00 - 10:00", "price": 50.0, "status": "Requested", "meetingLink": null}
            ]
        }"#;
        let store = InMemoryBookingStore::from_reader(seed.as_bytes()).expect("seed parses");
        let booking = BookingId("b-1".to_string());

        let candidate_copy = store
            .find(ProjectionSide::Candidate, &booking)
            .await
            .expect("find")
            .expect("candidate copy");
        let interviewer_copy = store
            .find(ProjectionSide::Interviewer, &booking)
            .await
            .expect("find")
            .expect("interviewer copy");
        assert!(!candidate_copy.agrees_with(&interviewer_copy));
        assert_eq!(
            store
                .scan(ProjectionSide::Interviewer)
                .await
                .expect("scan")
                .len(),
            1,
            "booking without an owner document is dropped"
        );
    }

    #[tokio::test]
    async fn remove_drops_only_the_named_copy() {
        let seed = r#"{
            "candidates": [
                {"id": "c-1", "firstName": "Asha", "lastName": "Rao", "email": "asha@example.com"}
            ],
            "interviewers": [
                {"id": "i-2", "firstName": "Dana", "email": "dana@example.com"},
                {"id": "i-1", "firstName": "Ben", "email": "ben@example.com", "price": 40.0}
            ],
            "scheduledInterviews": [
                {"id": "b-1", "candidateRef": "c-1", "interviewerRef": "i-1", "date": "2025-03-10",
                 "timeRange": "09:00 - 10:00", "price": 50.0, "status": "Requested", "meetingLink": null},
                {"id": "b-2", "candidateRef": "c-1", "interviewerRef": "i-1", "date": "2025-03-11",
                 "timeRange": "09:00 - 10:00", "price": 50.0, "status": "Requested", "meetingLink": null}
            ]
        }"#;
        let store = InMemoryBookingStore::from_reader(seed.as_bytes()).expect("seed parses");

        let removed = ProjectionStore::remove(&store, ProjectionSide::Candidate, &BookingId("b-1".to_string()))
            .await
            .expect("remove");
        assert_eq!(removed, 1);
        let left = store.scan(ProjectionSide::Candidate).await.expect("scan");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, BookingId("b-2".to_string()));
        assert_eq!(
            ProjectionStore::remove(&store, ProjectionSide::Interviewer, &BookingId("b-2".to_string()))
                .await
                .expect("remove"),
            0
        );

        let interviewers = store.interviewers().await.expect("interviewers");
        let ids: Vec<&str> = interviewers.iter().map(|p| p.id.0.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-2"]);
        assert_eq!(interviewers[0].price, Some(40.0));
    }

    #[test]
    fn malformed_seed_is_reported() {
        match InMemoryBookingStore::from_reader("{\"candidates\": 3}".as_bytes()) {
            Err(SeedError::Parse(_)) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
