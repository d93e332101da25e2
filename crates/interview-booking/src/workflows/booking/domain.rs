use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier wrapper for candidate records in the profile directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub String);

/// Identifier wrapper for interviewer records in the profile directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterviewerId(pub String);

/// Identity shared by both stored copies of one booking request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub String);

impl BookingId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl SlotId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for InterviewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role attached to an authenticated caller by the upstream auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Candidate,
    Interviewer,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::Candidate => "candidate",
            ActorRole::Interviewer => "interviewer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "candidate" => Some(Self::Candidate),
            "interviewer" => Some(Self::Interviewer),
            _ => None,
        }
    }
}

/// Verified caller identity handed to every workflow operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn candidate(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Candidate,
        }
    }

    pub fn interviewer(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Interviewer,
        }
    }
}

/// Directory entry for a candidate; only the fields the booking flow reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProfile {
    pub id: CandidateId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub profile_photo: Option<String>,
}

impl CandidateProfile {
    pub fn display_name(&self) -> String {
        join_name(&self.first_name, Some(&self.last_name))
    }

    /// Position shown on the interviewer's side; falls back to [`DEFAULT_POSITION`].
    pub fn position(&self) -> String {
        self.job_title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_POSITION)
            .to_string()
    }
}

/// Directory entry for an interviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewerProfile {
    pub id: InterviewerId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub profile_photo: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    /// Asking price per interview, shown to candidates before they book.
    #[serde(default)]
    pub price: Option<f64>,
}

impl InterviewerProfile {
    pub fn display_name(&self) -> String {
        join_name(&self.first_name, self.last_name.as_deref())
    }
}

fn join_name(first: &str, last: Option<&str>) -> String {
    match last.map(str::trim).filter(|last| !last.is_empty()) {
        Some(last) => format!("{} {}", first.trim(), last),
        None => first.trim().to_string(),
    }
}

/// Raw slot payload as submitted by an interviewer, validated by the availability store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInput {
    pub date: String,
    pub from: String,
    pub to: String,
}

/// Set-membership key of a slot; two slots with the same key are the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub from: NaiveTime,
    pub to: NaiveTime,
}

/// A single bookable date and time range owned by one interviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: SlotId,
    pub date: NaiveDate,
    #[serde(rename = "fromTime", with = "clock")]
    pub from: NaiveTime,
    #[serde(rename = "toTime", with = "clock")]
    pub to: NaiveTime,
}

impl AvailabilitySlot {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            date: self.date,
            from: self.from,
            to: self.to,
        }
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange {
            from: self.from,
            to: self.to,
        }
    }
}

/// Interview window rendered and persisted as `"HH:MM - HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub from: NaiveTime,
    pub to: NaiveTime,
}

impl TimeRange {
    pub fn new(from: NaiveTime, to: NaiveTime) -> Option<Self> {
        (from < to).then_some(Self { from, to })
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (from, to) = raw.split_once('-')?;
        Self::new(parse_clock(from)?, parse_clock(to)?)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.from.format("%H:%M"),
            self.to.format("%H:%M")
        )
    }
}

impl Serialize for TimeRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TimeRange::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time range '{raw}'")))
    }
}

/// Lifecycle of a booking request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Requested,
    Approved,
    Cancelled,
}

impl BookingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BookingStatus::Requested => "Requested",
            BookingStatus::Approved => "Approved",
            BookingStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Requested" => Some(Self::Requested),
            "Approved" => Some(Self::Approved),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Non-cancelled bookings count against the one-booking-per-date rule.
    pub const fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    /// Whether a projection currently in `self` may be moved to `next`.
    /// Re-applying `Approved` is allowed so retried approvals converge.
    pub const fn permits(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Requested, BookingStatus::Approved)
                | (BookingStatus::Requested, BookingStatus::Cancelled)
                | (BookingStatus::Approved, BookingStatus::Approved)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which denormalized copy of a booking a store call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionSide {
    Candidate,
    Interviewer,
}

impl ProjectionSide {
    pub const fn label(self) -> &'static str {
        match self {
            ProjectionSide::Candidate => "candidate",
            ProjectionSide::Interviewer => "interviewer",
        }
    }
}

impl fmt::Display for ProjectionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One stored copy of a booking request. The candidate copy lives under the
/// candidate document, the interviewer copy under the interviewer document and
/// additionally carries the denormalized display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingProjection {
    pub id: BookingId,
    #[serde(rename = "candidateRef")]
    pub candidate_id: CandidateId,
    #[serde(rename = "interviewerRef")]
    pub interviewer_id: InterviewerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    pub date: NaiveDate,
    pub time_range: TimeRange,
    pub price: f64,
    pub status: BookingStatus,
    pub meeting_link: Option<String>,
}

impl BookingProjection {
    pub fn owner(&self, side: ProjectionSide) -> &str {
        match side {
            ProjectionSide::Candidate => &self.candidate_id.0,
            ProjectionSide::Interviewer => &self.interviewer_id.0,
        }
    }

    /// Fields that must agree across both copies.
    pub fn agrees_with(&self, other: &BookingProjection) -> bool {
        self.id == other.id && self.status == other.status && self.meeting_link == other.meeting_link
    }
}

/// Field change applied to both projections of a booking. Application is
/// idempotent: a patch that already holds is still a match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub status: Option<BookingStatus>,
    pub meeting_link: Option<String>,
}

impl BookingPatch {
    pub fn status(status: BookingStatus) -> Self {
        Self {
            status: Some(status),
            meeting_link: None,
        }
    }

    pub fn meeting_link(link: impl Into<String>) -> Self {
        Self {
            status: None,
            meeting_link: Some(link.into()),
        }
    }

    /// Match predicate evaluated by stores inside their atomic update.
    pub fn matches(&self, current: &BookingProjection) -> bool {
        let status_ok = match self.status {
            Some(next) => current.status == next || current.status.permits(next),
            None => true,
        };
        let link_ok = match (&self.meeting_link, &current.meeting_link) {
            (Some(wanted), Some(stored)) => wanted == stored,
            _ => true,
        };
        status_ok && link_ok
    }

    pub fn apply_to(&self, target: &mut BookingProjection) {
        if let Some(status) = self.status {
            target.status = status;
        }
        if target.meeting_link.is_none() {
            if let Some(link) = &self.meeting_link {
                target.meeting_link = Some(link.clone());
            }
        }
    }
}

/// Interviewer-facing listing row joined with candidate display data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRequestView {
    pub id: BookingId,
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub candidate_photo: Option<String>,
    pub position: String,
    pub date: String,
    pub day: String,
    pub time: String,
    pub price: f64,
    pub status: BookingStatus,
    pub meeting_link: Option<String>,
}

/// Candidate-facing listing row joined with interviewer display data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledInterviewView {
    pub id: BookingId,
    pub interviewer_id: InterviewerId,
    pub interviewer_name: String,
    pub interviewer_job_title: Option<String>,
    pub interviewer_photo: Option<String>,
    pub date: NaiveDate,
    pub time_range: TimeRange,
    pub price: f64,
    pub status: BookingStatus,
    pub meeting_link: Option<String>,
}

/// Interviewer card offered to candidates, with the slots they can book.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewerListing {
    pub id: InterviewerId,
    pub name: String,
    pub job_title: Option<String>,
    pub experience: Option<String>,
    pub price: Option<f64>,
    pub profile_photo: Option<String>,
    pub availability: Vec<AvailabilitySlot>,
}

pub const UNKNOWN_CANDIDATE: &str = "Unknown candidate";
pub const UNKNOWN_INTERVIEWER: &str = "Unknown interviewer";
pub const DEFAULT_POSITION: &str = "Interview";

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (the date part is kept).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|ts| ts.date_naive()))
}

/// Accepts `HH:MM` or `HH:MM:SS`; seconds are dropped.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
        .and_then(|time| time.with_second(0))
        .and_then(|time| time.with_nanosecond(0))
}

/// `"Monday, 10 March 2025"`
pub fn long_date(date: NaiveDate) -> String {
    date.format("%A, %-d %B %Y").to_string()
}

mod clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_clock(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time '{raw}'")))
    }
}
