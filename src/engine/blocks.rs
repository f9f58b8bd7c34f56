//! Folds IN/OUT events into work blocks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::engine::clock::TimeRange;
use crate::engine::error::AttendanceError;
use crate::engine::tenant;
use crate::model::{
    attendance::{AttendanceEvent, EventId, EventKind},
    company::CompanyId,
    employee::EmployeeId,
};
use crate::store::{EventFilter, EventStore};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockStatus {
    Open,
    Closed,
}

/// One IN paired with at most one following OUT.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, ToSchema)]
pub struct WorkBlock {
    #[schema(value_type = u64)]
    pub employee_id: EmployeeId,
    #[schema(value_type = u64)]
    pub in_event: EventId,
    #[schema(value_type = Option<u64>, nullable = true)]
    pub out_event: Option<EventId>,
    #[schema(value_type = String, format = "date-time")]
    pub start: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub end: Option<DateTime<Utc>>,
    /// Whole seconds; always 0 while open
    pub elapsed_seconds: i64,
    #[schema(example = "08:30")]
    pub elapsed: String,
    pub activity: Option<String>,
    pub status: BlockStatus,
}

/// Data that could not be paired, typically left behind by manual edits.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anomaly {
    /// An IN replaced by a later IN before any OUT closed it
    StaleIn {
        #[schema(value_type = u64)]
        event_id: EventId,
    },
    /// An OUT with no open block to close
    OrphanOut {
        #[schema(value_type = u64)]
        event_id: EventId,
    },
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, ToSchema)]
pub struct Reconstruction {
    pub blocks: Vec<WorkBlock>,
    pub anomalies: Vec<Anomaly>,
}

impl Reconstruction {
    /// Sum of CLOSED blocks.
    pub fn closed_seconds(&self) -> i64 {
        self.blocks
            .iter()
            .filter(|b| b.status == BlockStatus::Closed)
            .map(|b| b.elapsed_seconds)
            .sum()
    }

    pub fn open_block(&self) -> Option<&WorkBlock> {
        self.blocks
            .last()
            .filter(|b| b.status == BlockStatus::Open)
    }

    pub fn closed_blocks(&self) -> impl Iterator<Item = &WorkBlock> {
        self.blocks.iter().filter(|b| b.status == BlockStatus::Closed)
    }

    /// Log anomalies so they show up next to the request that found them.
    pub fn report_anomalies(&self, company: CompanyId) {
        for anomaly in &self.anomalies {
            match anomaly {
                Anomaly::StaleIn { event_id } => {
                    warn!(%company, %event_id, "IN without OUT replaced by a later IN")
                }
                Anomaly::OrphanOut { event_id } => {
                    warn!(%company, %event_id, "OUT without a matching IN ignored")
                }
            }
        }
    }
}

/// `HH:MM` with seconds truncated. Hours are not wrapped at 24.
pub fn format_hhmm(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

struct OpenBlock<'a> {
    start: &'a AttendanceEvent,
}

/// Reconstruct blocks for a single employee's events. Input order does not
/// matter; events are processed by `(occurred_at, id)`.
pub fn reconstruct(events: &[AttendanceEvent]) -> Reconstruction {
    let mut ordered: Vec<&AttendanceEvent> = events.iter().collect();
    ordered.sort_by_key(|e| (e.occurred_at, e.id));

    let mut out = Reconstruction::default();
    let mut open: Option<OpenBlock<'_>> = None;

    for event in ordered {
        match event.kind {
            EventKind::In => {
                if let Some(stale) = open.take() {
                    out.anomalies.push(Anomaly::StaleIn {
                        event_id: stale.start.id,
                    });
                }
                open = Some(OpenBlock { start: event });
            }
            EventKind::Out => match open.take() {
                Some(block) => {
                    let elapsed = (event.occurred_at - block.start.occurred_at).num_seconds();
                    out.blocks.push(WorkBlock {
                        employee_id: block.start.employee_id,
                        in_event: block.start.id,
                        out_event: Some(event.id),
                        start: block.start.occurred_at,
                        end: Some(event.occurred_at),
                        elapsed_seconds: elapsed,
                        elapsed: format_hhmm(elapsed),
                        activity: block.start.activity.clone(),
                        status: BlockStatus::Closed,
                    });
                }
                None => out.anomalies.push(Anomaly::OrphanOut { event_id: event.id }),
            },
        }
    }

    if let Some(block) = open {
        out.blocks.push(WorkBlock {
            employee_id: block.start.employee_id,
            in_event: block.start.id,
            out_event: None,
            start: block.start.occurred_at,
            end: None,
            elapsed_seconds: 0,
            elapsed: format_hhmm(0),
            activity: block.start.activity.clone(),
            status: BlockStatus::Open,
        });
    }

    out
}

/// Group mixed events by employee, then reconstruct each group.
pub fn reconstruct_by_employee(events: &[AttendanceEvent]) -> BTreeMap<EmployeeId, Reconstruction> {
    let mut grouped: BTreeMap<EmployeeId, Vec<AttendanceEvent>> = BTreeMap::new();
    for event in events {
        grouped.entry(event.employee_id).or_default().push(event.clone());
    }
    grouped
        .into_iter()
        .map(|(employee, events)| (employee, reconstruct(&events)))
        .collect()
}

/// Blocks of one employee inside `range`.
pub async fn reconstruct_blocks(
    store: &dyn EventStore,
    company: CompanyId,
    employee: EmployeeId,
    range: TimeRange,
) -> Result<Reconstruction, AttendanceError> {
    tenant::employee_in(store, company, employee).await?;
    let events = store
        .events(company, &EventFilter::for_employee(employee, range))
        .await?;
    let reconstruction = reconstruct(&events);
    reconstruction.report_anomalies(company);
    Ok(reconstruction)
}
