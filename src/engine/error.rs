use std::fmt;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::attendance::{AttendanceEvent, EventId, EventKind};
use crate::store::StoreError;

/// Which side of the candidate the conflicting event sits on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Neighbor {
    Predecessor,
    Successor,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    /// OUT with nothing open before it
    NoOpenSession,
    /// IN while an earlier IN is still open
    SessionAlreadyOpen,
    /// OUT right after another OUT
    ConsecutiveOut,
    /// The next recorded event has the same kind as the candidate
    ConflictsWithLater,
    /// Another event already sits on the exact same instant
    SameInstant,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, ToSchema)]
pub struct Conflict {
    pub neighbor: Neighbor,
    #[schema(value_type = u64)]
    pub event_id: EventId,
    pub kind: EventKind,
    #[schema(value_type = String, format = "date-time")]
    pub occurred_at: DateTime<Utc>,
}

impl Conflict {
    pub fn new(neighbor: Neighbor, event: &AttendanceEvent) -> Self {
        Conflict {
            neighbor,
            event_id: event.id,
            kind: event.kind,
            occurred_at: event.occurred_at,
        }
    }
}

/// A candidate event that would break IN/OUT alternation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, ToSchema)]
pub struct SequenceViolation {
    pub attempted: EventKind,
    pub reason: ViolationReason,
    /// Absent only when there is no prior event at all
    pub conflict: Option<Conflict>,
}

impl fmt::Display for SequenceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = self
            .conflict
            .as_ref()
            .map(|c| c.occurred_at.to_rfc3339())
            .unwrap_or_default();
        match self.reason {
            ViolationReason::NoOpenSession => write!(f, "cannot record OUT without a prior IN"),
            ViolationReason::SessionAlreadyOpen => {
                write!(f, "employee already has an open session since {}", at)
            }
            ViolationReason::ConsecutiveOut => {
                write!(f, "cannot log two consecutive OUTs (previous OUT at {})", at)
            }
            ViolationReason::ConflictsWithLater => write!(
                f,
                "{} would be followed by another {} at {}",
                self.attempted, self.attempted, at
            ),
            ViolationReason::SameInstant => {
                write!(f, "another event is already recorded at {}", at)
            }
        }
    }
}

#[derive(Debug, Display)]
pub enum AttendanceError {
    #[display(fmt = "invalid input: {}", _0)]
    InvalidInput(String),

    #[display(fmt = "{}", _0)]
    SequenceViolation(SequenceViolation),

    #[display(fmt = "timestamp {} is in the future (now {})", submitted, now)]
    FutureTimestamp {
        submitted: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Referenced entity is outside the caller's company. Rendered as
    /// not-found.
    #[display(fmt = "not found")]
    TenantMismatch,

    #[display(fmt = "store error: {}", _0)]
    Store(StoreError),
}

impl std::error::Error for AttendanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttendanceError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for AttendanceError {
    fn from(e: StoreError) -> Self {
        AttendanceError::Store(e)
    }
}

impl From<SequenceViolation> for AttendanceError {
    fn from(v: SequenceViolation) -> Self {
        AttendanceError::SequenceViolation(v)
    }
}

impl AttendanceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AttendanceError::InvalidInput(msg.into())
    }
}
