use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::{company::CompanyId, employee::EmployeeId};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    sqlx::Type,
    ToSchema,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct EventId(pub u64);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EventKind {
    In,
    Out,
}

impl EventKind {
    pub fn opposite(self) -> Self {
        match self {
            EventKind::In => EventKind::Out,
            EventKind::Out => EventKind::In,
        }
    }
}

/// A single clock-in or clock-out fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "id": 10,
        "company_id": 1,
        "employee_id": 3,
        "kind": "IN",
        "activity": "packing",
        "occurred_at": "2026-03-02T12:00:00Z"
    })
)]
pub struct AttendanceEvent {
    #[schema(value_type = u64, example = 10)]
    pub id: EventId,

    #[schema(value_type = u64, example = 1)]
    pub company_id: CompanyId,

    #[schema(value_type = u64, example = 3)]
    pub employee_id: EmployeeId,

    pub kind: EventKind,

    /// Only present on IN events
    #[schema(example = "packing", nullable = true)]
    pub activity: Option<String>,

    #[schema(value_type = String, format = "date-time")]
    pub occurred_at: DateTime<Utc>,
}

/// Raw `attendance_events` row; `kind` is stored as text.
#[derive(Debug, sqlx::FromRow)]
pub struct EventRow {
    pub id: EventId,
    pub company_id: CompanyId,
    pub employee_id: EmployeeId,
    pub kind: String,
    pub activity: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for AttendanceEvent {
    type Error = strum::ParseError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(AttendanceEvent {
            id: row.id,
            company_id: row.company_id,
            employee_id: row.employee_id,
            kind: row.kind.parse()?,
            activity: row.activity,
            occurred_at: row.occurred_at,
        })
    }
}

/// An event that passed input validation and is waiting for admission.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub company_id: CompanyId,
    pub employee_id: EmployeeId,
    pub kind: EventKind,
    pub activity: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl NewEvent {
    pub fn into_event(self, id: EventId) -> AttendanceEvent {
        AttendanceEvent {
            id,
            company_id: self.company_id,
            employee_id: self.employee_id,
            kind: self.kind,
            activity: self.activity,
            occurred_at: self.occurred_at,
        }
    }
}

/// Administrative correction of a stored event. Applied as-is, without
/// sequence validation.
#[derive(Debug, Clone)]
pub struct EventPatch {
    pub kind: EventKind,
    pub activity: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
