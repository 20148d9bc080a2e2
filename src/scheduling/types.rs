use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

/// Waitlist urgency. Higher values are offered slots first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl Priority {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn value(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Urgent => "URGENT",
            Priority::High => "HIGH",
            Priority::Normal => "NORMAL",
            Priority::Low => "LOW",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    Waiting,
    Offered,
    Booked,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitlistAction {
    Offer,
    Book,
    Decline,
    ExpireOffer,
    Reprioritize,
    Remove,
}

impl WaitlistStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WaitlistStatus::Waiting => "waiting",
            WaitlistStatus::Offered => "offered",
            WaitlistStatus::Booked => "booked",
            WaitlistStatus::Removed => "removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(WaitlistStatus::Waiting),
            "offered" => Some(WaitlistStatus::Offered),
            "booked" => Some(WaitlistStatus::Booked),
            "removed" => Some(WaitlistStatus::Removed),
            _ => None,
        }
    }

    /// Still on the active waitlist.
    pub fn is_active(self) -> bool {
        matches!(self, WaitlistStatus::Waiting | WaitlistStatus::Offered)
    }

    pub fn apply(self, action: WaitlistAction) -> WorkflowResult<WaitlistStatus> {
        use WaitlistAction::*;
        use WaitlistStatus::*;

        let next = match (self, action) {
            (Waiting | Offered, Offer) => Offered,
            (Offered, Book) => Booked,
            (Offered, Decline | ExpireOffer) => Waiting,
            (Waiting | Offered, Reprioritize) => self,
            (Waiting | Offered, Remove) => Removed,
            _ => {
                return Err(WorkflowError::invalid_transition(
                    "waitlist entry",
                    self,
                    action,
                ))
            }
        };
        Ok(next)
    }
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WaitlistStatus::Waiting => "Waiting",
            WaitlistStatus::Offered => "Offered",
            WaitlistStatus::Booked => "Booked",
            WaitlistStatus::Removed => "Removed",
        };
        write!(f, "{}", label)
    }
}

impl fmt::Display for WaitlistAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WaitlistAction::Offer => "offer a slot",
            WaitlistAction::Book => "book",
            WaitlistAction::Decline => "decline",
            WaitlistAction::ExpireOffer => "expire offer",
            WaitlistAction::Reprioritize => "change priority",
            WaitlistAction::Remove => "remove",
        };
        write!(f, "{}", label)
    }
}

/// A clinician's time range. Ranges are half-open: `[start_time, end_time)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppointmentSlot {
    pub clinician_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl AppointmentSlot {
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.clinician_id.is_nil() {
            return Err(WorkflowError::validation("slot clinician_id is required"));
        }
        if self.end_time <= self.start_time {
            return Err(WorkflowError::validation(format!(
                "slot must end after it starts ({} .. {})",
                self.start_time, self.end_time
            )));
        }
        Ok(())
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }
}

/// What a waitlisted client will accept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistCriteria {
    #[serde(default)]
    pub appointment_type: Option<String>,
    /// Empty means any day.
    #[serde(default)]
    pub preferred_days: Vec<Weekday>,
    #[serde(default)]
    pub earliest_time: Option<NaiveTime>,
    #[serde(default)]
    pub latest_time: Option<NaiveTime>,
}

impl WaitlistCriteria {
    pub fn validate(&self) -> WorkflowResult<()> {
        if let (Some(earliest), Some(latest)) = (self.earliest_time, self.latest_time) {
            if latest <= earliest {
                return Err(WorkflowError::validation(
                    "latest_time must be after earliest_time",
                ));
            }
        }
        Ok(())
    }

    /// Day and time-of-day fit, evaluated on the slot's UTC times.
    pub fn accepts(&self, slot: &AppointmentSlot) -> bool {
        if !self.preferred_days.is_empty()
            && !self.preferred_days.contains(&slot.start_time.weekday())
        {
            return false;
        }
        if let Some(earliest) = self.earliest_time {
            if slot.start_time.time() < earliest {
                return false;
            }
        }
        if let Some(latest) = self.latest_time {
            if slot.end_time.time() > latest {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub client_id: Uuid,
    /// Preferred clinician, if any
    pub clinician_id: Option<Uuid>,
    pub criteria: WaitlistCriteria,
    pub priority: Priority,
    pub status: WaitlistStatus,
    pub offered_slot: Option<AppointmentSlot>,
    pub offered_at: Option<DateTime<Utc>>,
    pub offer_expires_at: Option<DateTime<Utc>>,
    pub appointment_id: Option<Uuid>,
    pub removal_reason: Option<String>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub row_version: i64,
}

impl WaitlistEntry {
    pub fn offer_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == WaitlistStatus::Offered
            && self.offer_expires_at.map(|at| at <= now).unwrap_or(true)
    }

    pub(crate) fn clear_offer(&mut self) {
        self.offered_slot = None;
        self.offered_at = None;
        self.offer_expires_at = None;
    }

    /// Whether this entry is a candidate for `slot`.
    pub fn fits(&self, slot: &AppointmentSlot) -> bool {
        self.clinician_id
            .map(|preferred| preferred == slot.clinician_id)
            .unwrap_or(true)
            && self.criteria.accepts(slot)
    }
}

/// Input for `add_to_waitlist`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWaitlistEntry {
    pub client_id: Uuid,
    #[serde(default)]
    pub clinician_id: Option<Uuid>,
    #[serde(default)]
    pub criteria: WaitlistCriteria,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppointmentAction {
    Confirm,
    Complete,
    Cancel,
    MarkNoShow,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "no_show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }

    /// Occupies its slot.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed | AppointmentStatus::Completed
        )
    }

    pub fn apply(self, action: AppointmentAction) -> WorkflowResult<AppointmentStatus> {
        use AppointmentAction::*;
        use AppointmentStatus::*;

        let next = match (self, action) {
            (Scheduled, Confirm) => Confirmed,
            (Confirmed, Complete) => Completed,
            (Scheduled | Confirmed, Cancel) => Cancelled,
            (Scheduled | Confirmed, MarkNoShow) => NoShow,
            _ => {
                return Err(WorkflowError::invalid_transition(
                    "appointment",
                    self,
                    action,
                ))
            }
        };
        Ok(next)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AppointmentStatus::Scheduled => "Scheduled",
            AppointmentStatus::Confirmed => "Confirmed",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::Cancelled => "Cancelled",
            AppointmentStatus::NoShow => "NoShow",
        };
        write!(f, "{}", label)
    }
}

impl fmt::Display for AppointmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AppointmentAction::Confirm => "confirm",
            AppointmentAction::Complete => "complete",
            AppointmentAction::Cancel => "cancel",
            AppointmentAction::MarkNoShow => "mark no-show",
        };
        write!(f, "{}", label)
    }
}

/// Externally computed no-show prediction, stored as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoShowRisk {
    pub score: f64,
    pub level: String,
    #[serde(default)]
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub clinician_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub appointment_type: String,
    pub status: AppointmentStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmation_method: Option<String>,
    pub cancellation_reason: Option<String>,
    pub no_show_risk_score: Option<f64>,
    pub no_show_risk_level: Option<String>,
    pub no_show_risk_factors: Vec<String>,
    pub waitlist_entry_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub row_version: i64,
}

impl Appointment {
    pub fn new(
        client_id: Uuid,
        slot: AppointmentSlot,
        appointment_type: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            clinician_id: slot.clinician_id,
            start_time: slot.start_time,
            end_time: slot.end_time,
            appointment_type: appointment_type.into(),
            status: AppointmentStatus::Scheduled,
            confirmed_at: None,
            confirmation_method: None,
            cancellation_reason: None,
            no_show_risk_score: None,
            no_show_risk_level: None,
            no_show_risk_factors: Vec::new(),
            waitlist_entry_id: None,
            created_at: now,
            updated_at: now,
            row_version: 0,
        }
    }

    pub fn slot(&self) -> AppointmentSlot {
        AppointmentSlot {
            clinician_id: self.clinician_id,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    pub fn with_risk(mut self, risk: Option<NoShowRisk>) -> Self {
        if let Some(risk) = risk {
            self.no_show_risk_score = Some(risk.score);
            self.no_show_risk_level = Some(risk.level);
            self.no_show_risk_factors = risk.factors;
        }
        self
    }
}

/// Input for `schedule_appointment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub client_id: Uuid,
    pub slot: AppointmentSlot,
    pub appointment_type: String,
    #[serde(default)]
    pub no_show_risk: Option<NoShowRisk>,
}
