//! IN/OUT alternation rules.
//!
//! A candidate is checked against its chronological neighbors, never against
//! the last inserted row: back-dated corrections must land between the right
//! events.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::engine::clock::Clock;
use crate::engine::error::{AttendanceError, Conflict, Neighbor, SequenceViolation, ViolationReason};
use crate::engine::tenant;
use crate::model::{
    attendance::{AttendanceEvent, EventKind, NewEvent},
    company::CompanyId,
    employee::EmployeeId,
};
use crate::store::EventStore;

/// Events immediately around a candidate timestamp.
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    /// Latest event strictly before the candidate
    pub predecessor: Option<AttendanceEvent>,
    /// Earliest event at or after the candidate
    pub successor: Option<AttendanceEvent>,
}

pub fn check_neighbors(
    kind: EventKind,
    at: DateTime<Utc>,
    neighbors: &Neighbors,
) -> Result<(), SequenceViolation> {
    let violation = |reason, conflict| SequenceViolation {
        attempted: kind,
        reason,
        conflict,
    };

    match (&neighbors.predecessor, kind) {
        (None, EventKind::Out) => return Err(violation(ViolationReason::NoOpenSession, None)),
        (Some(prev), EventKind::In) if prev.kind == EventKind::In => {
            return Err(violation(
                ViolationReason::SessionAlreadyOpen,
                Some(Conflict::new(Neighbor::Predecessor, prev)),
            ));
        }
        (Some(prev), EventKind::Out) if prev.kind == EventKind::Out => {
            return Err(violation(
                ViolationReason::ConsecutiveOut,
                Some(Conflict::new(Neighbor::Predecessor, prev)),
            ));
        }
        _ => {}
    }

    if let Some(next) = &neighbors.successor {
        if next.occurred_at == at {
            return Err(violation(
                ViolationReason::SameInstant,
                Some(Conflict::new(Neighbor::Successor, next)),
            ));
        }
        if next.kind == kind {
            return Err(violation(
                ViolationReason::ConflictsWithLater,
                Some(Conflict::new(Neighbor::Successor, next)),
            ));
        }
    }

    Ok(())
}

/// Trim the activity and enforce it on IN; OUT never carries one.
pub fn normalize_activity(
    kind: EventKind,
    activity: Option<String>,
) -> Result<Option<String>, AttendanceError> {
    match kind {
        EventKind::Out => Ok(None),
        EventKind::In => match activity.map(|a| a.trim().to_string()) {
            Some(a) if !a.is_empty() => Ok(Some(a)),
            _ => Err(AttendanceError::invalid("activity is required for IN")),
        },
    }
}

/// Instants are stored as DATETIME(3); checks must see what will be stored.
pub fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::milliseconds(1)).unwrap_or(at)
}

pub fn parse_kind(raw: &str) -> Result<EventKind, AttendanceError> {
    raw.trim()
        .to_uppercase()
        .parse()
        .map_err(|_| AttendanceError::invalid(format!("unknown event kind '{}'", raw)))
}

/// Validate a candidate and append it if it keeps the employee's sequence
/// alternating.
pub async fn validate_and_admit(
    store: &dyn EventStore,
    clock: &dyn Clock,
    company: CompanyId,
    employee: EmployeeId,
    kind: EventKind,
    occurred_at: DateTime<Utc>,
    activity: Option<String>,
) -> Result<AttendanceEvent, AttendanceError> {
    let activity = normalize_activity(kind, activity)?;
    let occurred_at = stored_precision(occurred_at);

    let now = clock.now();
    if occurred_at > now {
        return Err(AttendanceError::FutureTimestamp {
            submitted: occurred_at,
            now,
        });
    }

    let target = tenant::employee_in(store, company, employee).await?;
    if !target.active {
        return Err(AttendanceError::invalid(format!(
            "employee {} is inactive",
            employee
        )));
    }

    let candidate = NewEvent {
        company_id: company,
        employee_id: employee,
        kind,
        activity,
        occurred_at,
    };

    debug!(%company, %employee, %kind, %occurred_at, "Admitting attendance event");

    let check = move |n: &Neighbors| check_neighbors(kind, occurred_at, n);
    let event = store.admit(candidate, &check).await?;

    info!(
        %company,
        %employee,
        event_id = %event.id,
        kind = %event.kind,
        "Attendance event admitted"
    );

    Ok(event)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClockState {
    /// Kind the employee may record right now
    pub next_kind: EventKind,
    pub last_event: Option<AttendanceEvent>,
}

/// What the employee may record at the current instant.
pub async fn next_allowed_kind(
    store: &dyn EventStore,
    company: CompanyId,
    employee: EmployeeId,
) -> Result<ClockState, AttendanceError> {
    tenant::employee_in(store, company, employee).await?;
    let last_event = store.latest_event(company, employee).await?;
    let next_kind = match &last_event {
        Some(last) => last.kind.opposite(),
        None => EventKind::In,
    };
    Ok(ClockState {
        next_kind,
        last_event,
    })
}
