//! Day and month aggregation on top of block reconstruction.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::blocks::{format_hhmm, reconstruct, reconstruct_by_employee, Reconstruction, WorkBlock};
use crate::engine::clock::{ReportZone, TimeRange};
use crate::engine::error::AttendanceError;
use crate::engine::tenant;
use crate::model::{
    attendance::{AttendanceEvent, EventKind},
    company::CompanyId,
    employee::{Employee, EmployeeId},
};
use crate::store::{EventFilter, EventStore};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
pub enum DailyStatus {
    #[serde(rename = "EN_CURSO")]
    InProgress,
    #[serde(rename = "FINALIZADO")]
    Finished,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodStatus {
    Closed,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailyEntry {
    #[schema(value_type = u64)]
    pub employee_id: EmployeeId,
    pub last_name: String,
    pub first_name: String,
    pub elapsed_seconds: i64,
    #[schema(example = "03:00")]
    pub elapsed: String,
    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub first_in: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub last_out: Option<DateTime<Utc>>,
    /// Activity of the first block of the day
    pub activity: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub open_since: Option<DateTime<Utc>>,
    pub open_activity: Option<String>,
    pub status: DailyStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailySummary {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub entries: Vec<DailyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailyBlock {
    pub employee_name: String,
    #[serde(flatten)]
    pub block: WorkBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PeriodSummary {
    #[schema(value_type = u64)]
    pub employee_id: EmployeeId,
    pub last_name: String,
    pub first_name: String,
    pub elapsed_seconds: i64,
    #[schema(example = "160:30")]
    pub elapsed: String,
    pub days_worked: usize,
    pub status: PeriodStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub entries: Vec<PeriodSummary>,
}

/// A block inside a month, tagged with its local date and position in it.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MonthBlock {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    /// 1-based index among the blocks that started on `date`
    pub index_in_day: u32,
    #[serde(flatten)]
    pub block: WorkBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MonthlyDetail {
    pub employee: Employee,
    pub year: i32,
    pub month: u32,
    pub blocks: Vec<MonthBlock>,
    pub elapsed_seconds: i64,
    pub elapsed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HoursPoint {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(example = "02/03")]
    pub label: String,
    #[schema(example = 7.25)]
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Dashboard {
    pub active_employees: u64,
    pub events_today: u64,
    pub currently_active: u64,
    pub month_total_seconds: i64,
    #[schema(example = "312:45")]
    pub month_total: String,
    pub hours_per_day: Vec<HoursPoint>,
}

fn by_name(employees: &[Employee]) -> Vec<&Employee> {
    let mut sorted: Vec<&Employee> = employees.iter().collect();
    sorted.sort_by(|a, b| {
        (a.last_name.as_str(), a.first_name.as_str(), a.id)
            .cmp(&(b.last_name.as_str(), b.first_name.as_str(), b.id))
    });
    sorted
}

fn daily_entry(employee: &Employee, r: &Reconstruction) -> DailyEntry {
    let elapsed_seconds = r.closed_seconds();
    let open = r.open_block();
    DailyEntry {
        employee_id: employee.id,
        last_name: employee.last_name.clone(),
        first_name: employee.first_name.clone(),
        elapsed_seconds,
        elapsed: format_hhmm(elapsed_seconds),
        first_in: r.blocks.first().map(|b| b.start),
        last_out: r.closed_blocks().last().and_then(|b| b.end),
        activity: r.blocks.first().and_then(|b| b.activity.clone()),
        open_since: open.map(|b| b.start),
        open_activity: open.and_then(|b| b.activity.clone()),
        status: if open.is_some() {
            DailyStatus::InProgress
        } else {
            DailyStatus::Finished
        },
    }
}

/// Per-employee summary of one day's events. Employees without events are
/// left out; results are ordered by name.
pub fn summarize_day(employees: &[Employee], events: &[AttendanceEvent]) -> Vec<DailyEntry> {
    let reconstructed = reconstruct_by_employee(events);
    by_name(employees)
        .into_iter()
        .filter_map(|emp| reconstructed.get(&emp.id).map(|r| daily_entry(emp, r)))
        .collect()
}

pub fn blocks_of_day(employees: &[Employee], events: &[AttendanceEvent]) -> Vec<DailyBlock> {
    let reconstructed = reconstruct_by_employee(events);
    by_name(employees)
        .into_iter()
        .filter_map(|emp| reconstructed.get(&emp.id).map(|r| (emp, r)))
        .flat_map(|(emp, r)| {
            r.blocks.iter().map(move |block| DailyBlock {
                employee_name: emp.display_name(),
                block: block.clone(),
            })
        })
        .collect()
}

/// Per-employee totals for a month. Employees whose closed blocks add up to
/// zero are omitted.
pub fn summarize_month(
    zone: &ReportZone,
    employees: &[Employee],
    events: &[AttendanceEvent],
) -> Vec<PeriodSummary> {
    let reconstructed = reconstruct_by_employee(events);

    let mut worked_days: HashMap<EmployeeId, BTreeSet<NaiveDate>> = HashMap::new();
    for event in events.iter().filter(|e| e.kind == EventKind::In) {
        worked_days
            .entry(event.employee_id)
            .or_default()
            .insert(zone.local_date(event.occurred_at));
    }

    by_name(employees)
        .into_iter()
        .filter_map(|emp| {
            let r = reconstructed.get(&emp.id)?;
            let elapsed_seconds = r.closed_seconds();
            if elapsed_seconds <= 0 {
                return None;
            }
            Some(PeriodSummary {
                employee_id: emp.id,
                last_name: emp.last_name.clone(),
                first_name: emp.first_name.clone(),
                elapsed_seconds,
                elapsed: format_hhmm(elapsed_seconds),
                days_worked: worked_days.get(&emp.id).map_or(0, BTreeSet::len),
                status: if r.open_block().is_some() {
                    PeriodStatus::Incomplete
                } else {
                    PeriodStatus::Closed
                },
            })
        })
        .collect()
}

/// Tag each block with its local start date and its index within that date.
pub fn month_blocks(zone: &ReportZone, r: &Reconstruction) -> Vec<MonthBlock> {
    let mut per_day: HashMap<NaiveDate, u32> = HashMap::new();
    r.blocks
        .iter()
        .map(|block| {
            let date = zone.local_date(block.start);
            let index = per_day.entry(date).or_insert(0);
            *index += 1;
            MonthBlock {
                date,
                index_in_day: *index,
                block: block.clone(),
            }
        })
        .collect()
}

/// Closed hours per local day, keyed by the day of the closing OUT.
pub fn hours_per_day(zone: &ReportZone, events: &[AttendanceEvent]) -> Vec<HoursPoint> {
    let mut seconds: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for r in reconstruct_by_employee(events).values() {
        for block in r.closed_blocks() {
            if let Some(end) = block.end {
                *seconds.entry(zone.local_date(end)).or_default() += block.elapsed_seconds;
            }
        }
    }
    seconds
        .into_iter()
        .map(|(date, secs)| HoursPoint {
            date,
            label: date.format("%d/%m").to_string(),
            hours: (secs as f64 / 3600.0 * 100.0).round() / 100.0,
        })
        .collect()
}

/// Employees whose chronologically latest event is an IN.
pub fn count_open(latest: &[AttendanceEvent]) -> u64 {
    latest.iter().filter(|e| e.kind == EventKind::In).count() as u64
}

pub async fn daily_summary(
    store: &dyn EventStore,
    zone: &ReportZone,
    company: CompanyId,
    date: NaiveDate,
) -> Result<DailySummary, AttendanceError> {
    let employees = store.employees(company).await?;
    let events = store
        .events(company, &EventFilter::in_range(zone.day_range(date)))
        .await?;
    Ok(DailySummary {
        date,
        entries: summarize_day(&employees, &events),
    })
}

pub async fn daily_blocks(
    store: &dyn EventStore,
    zone: &ReportZone,
    company: CompanyId,
    date: NaiveDate,
) -> Result<Vec<DailyBlock>, AttendanceError> {
    let employees = store.employees(company).await?;
    let events = store
        .events(company, &EventFilter::in_range(zone.day_range(date)))
        .await?;
    Ok(blocks_of_day(&employees, &events))
}

pub async fn monthly_summary(
    store: &dyn EventStore,
    zone: &ReportZone,
    company: CompanyId,
    year: i32,
    month: u32,
) -> Result<MonthlySummary, AttendanceError> {
    let range = zone.month_range(year, month)?;
    let employees = store.employees(company).await?;
    let events = store.events(company, &EventFilter::in_range(range)).await?;
    Ok(MonthlySummary {
        year,
        month,
        entries: summarize_month(zone, &employees, &events),
    })
}

pub async fn monthly_detail(
    store: &dyn EventStore,
    zone: &ReportZone,
    company: CompanyId,
    employee: EmployeeId,
    year: i32,
    month: u32,
) -> Result<MonthlyDetail, AttendanceError> {
    let range = zone.month_range(year, month)?;
    let found = tenant::employee_in(store, company, employee).await?;
    let events = store
        .events(company, &EventFilter::for_employee(employee, range))
        .await?;
    let r = reconstruct(&events);
    r.report_anomalies(company);
    let elapsed_seconds = r.closed_seconds();
    Ok(MonthlyDetail {
        employee: found,
        year,
        month,
        blocks: month_blocks(zone, &r),
        elapsed_seconds,
        elapsed: format_hhmm(elapsed_seconds),
    })
}

pub async fn currently_active(
    store: &dyn EventStore,
    company: CompanyId,
) -> Result<u64, AttendanceError> {
    let latest = store.latest_per_employee(company).await?;
    Ok(count_open(&latest))
}

pub async fn dashboard(
    store: &dyn EventStore,
    zone: &ReportZone,
    company: CompanyId,
    now: DateTime<Utc>,
) -> Result<Dashboard, AttendanceError> {
    let employees = store.employees(company).await?;
    let active_employees = employees.iter().filter(|e| e.active).count() as u64;

    let today = zone.day_range(zone.today(now));
    let events_today = store.count_events(company, today).await?;

    let currently_active = currently_active(store, company).await?;

    let (year, month) = zone.current_month(now);
    let month_range = zone.month_range(year, month)?;
    let so_far = TimeRange {
        start: month_range.start,
        end: now.min(month_range.end),
    };
    let month_events = if so_far.end > so_far.start {
        store.events(company, &EventFilter::in_range(so_far)).await?
    } else {
        Vec::new()
    };

    let month_total_seconds: i64 = reconstruct_by_employee(&month_events)
        .values()
        .map(Reconstruction::closed_seconds)
        .sum();

    Ok(Dashboard {
        active_employees,
        events_today,
        currently_active,
        month_total_seconds,
        month_total: format_hhmm(month_total_seconds),
        hours_per_day: hours_per_day(zone, &month_events),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::engine::blocks::BlockStatus;
    use crate::model::attendance::EventId;
    use crate::store::memory::MemoryStore;

    const ACME: CompanyId = CompanyId(1);
    const ANA: EmployeeId = EmployeeId(10);
    const LUIS: EmployeeId = EmployeeId(11);
    const ZOE: EmployeeId = EmployeeId(12);

    /// Buenos Aires local time on 2026-03-`day` (UTC-3).
    fn local(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, h, m, 0).unwrap() + chrono::Duration::hours(3)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    struct Fixture {
        store: MemoryStore,
        next: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let store = MemoryStore::default();
            store.add_company(ACME, "Acme");
            store.add_employee(ACME, ANA, "Gomez", "Ana");
            store.add_employee(ACME, LUIS, "Alvarez", "Luis");
            store.add_employee(ACME, ZOE, "Zarate", "Zoe");
            Fixture { store, next: 1 }
        }

        fn push(&mut self, employee: EmployeeId, kind: EventKind, at: DateTime<Utc>) {
            self.store.push_event(AttendanceEvent {
                id: EventId(self.next),
                company_id: ACME,
                employee_id: employee,
                kind,
                activity: (kind == EventKind::In).then(|| "packing".to_string()),
                occurred_at: at,
            });
            self.next += 1;
        }
    }

    #[actix_web::test]
    async fn open_block_keeps_the_day_in_progress() {
        let mut f = Fixture::new();
        f.push(ANA, EventKind::In, local(2, 9, 0));
        f.push(ANA, EventKind::Out, local(2, 12, 0));
        f.push(ANA, EventKind::In, local(2, 13, 0));

        let summary = daily_summary(&f.store, &ReportZone::default(), ACME, date(2))
            .await
            .unwrap();
        assert_eq!(summary.entries.len(), 1);
        let entry = &summary.entries[0];
        assert_eq!(entry.status, DailyStatus::InProgress);
        assert_eq!(entry.elapsed, "03:00");
        assert_eq!(entry.open_since, Some(local(2, 13, 0)));
        assert_eq!(entry.first_in, Some(local(2, 9, 0)));
        assert_eq!(entry.last_out, Some(local(2, 12, 0)));
    }

    #[actix_web::test]
    async fn day_boundary_is_local_midnight() {
        let mut f = Fixture::new();
        // 22:00-23:30 local on the 2nd is 01:00-02:30 UTC on the 3rd
        f.push(ANA, EventKind::In, local(2, 22, 0));
        f.push(ANA, EventKind::Out, local(2, 23, 30));

        let zone = ReportZone::default();
        let second = daily_summary(&f.store, &zone, ACME, date(2)).await.unwrap();
        assert_eq!(second.entries.len(), 1);
        assert_eq!(second.entries[0].elapsed, "01:30");
        assert_eq!(second.entries[0].status, DailyStatus::Finished);

        let third = daily_summary(&f.store, &zone, ACME, date(3)).await.unwrap();
        assert!(third.entries.is_empty());
    }

    #[actix_web::test]
    async fn daily_entries_are_sorted_by_last_name() {
        let mut f = Fixture::new();
        f.push(ANA, EventKind::In, local(2, 9, 0));
        f.push(LUIS, EventKind::In, local(2, 9, 5));

        let summary = daily_summary(&f.store, &ReportZone::default(), ACME, date(2))
            .await
            .unwrap();
        let names: Vec<&str> = summary.entries.iter().map(|e| e.last_name.as_str()).collect();
        assert_eq!(names, vec!["Alvarez", "Gomez"]);

        let blocks = daily_blocks(&f.store, &ReportZone::default(), ACME, date(2))
            .await
            .unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].employee_name, "Alvarez, Luis");
        assert!(blocks.iter().all(|b| b.block.status == BlockStatus::Open));
    }

    #[actix_web::test]
    async fn monthly_summary_omits_zero_totals() {
        let mut f = Fixture::new();
        f.push(ANA, EventKind::In, local(2, 9, 0));
        f.push(ANA, EventKind::Out, local(2, 17, 0));
        f.push(ANA, EventKind::In, local(3, 9, 0));
        f.push(ANA, EventKind::Out, local(3, 10, 30));
        f.push(ANA, EventKind::In, local(3, 11, 0));
        // Luis only has a dangling IN
        f.push(LUIS, EventKind::In, local(4, 9, 0));

        let summary = monthly_summary(&f.store, &ReportZone::default(), ACME, 2026, 3)
            .await
            .unwrap();
        assert_eq!(summary.entries.len(), 1);
        let ana = &summary.entries[0];
        assert_eq!(ana.employee_id, ANA);
        assert_eq!(ana.elapsed, "09:30");
        assert_eq!(ana.days_worked, 2);
        assert_eq!(ana.status, PeriodStatus::Incomplete);
    }

    #[actix_web::test]
    async fn monthly_summary_is_bounded_by_local_month() {
        let mut f = Fixture::new();
        // 22:00-23:00 local on Feb 28th falls in March in UTC
        f.push(ANA, EventKind::In, Utc.with_ymd_and_hms(2026, 3, 1, 1, 0, 0).unwrap());
        f.push(ANA, EventKind::Out, Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap());

        let zone = ReportZone::default();
        let march = monthly_summary(&f.store, &zone, ACME, 2026, 3).await.unwrap();
        assert!(march.entries.is_empty());
        let february = monthly_summary(&f.store, &zone, ACME, 2026, 2).await.unwrap();
        assert_eq!(february.entries[0].status, PeriodStatus::Closed);
        assert_eq!(february.entries[0].elapsed, "01:00");
    }

    #[actix_web::test]
    async fn monthly_detail_numbers_blocks_per_day() {
        let mut f = Fixture::new();
        f.push(ANA, EventKind::In, local(2, 9, 0));
        f.push(ANA, EventKind::Out, local(2, 12, 0));
        f.push(ANA, EventKind::In, local(2, 13, 0));
        f.push(ANA, EventKind::Out, local(2, 17, 0));
        f.push(ANA, EventKind::In, local(3, 9, 0));

        let detail = monthly_detail(&f.store, &ReportZone::default(), ACME, ANA, 2026, 3)
            .await
            .unwrap();
        let tags: Vec<(NaiveDate, u32)> = detail
            .blocks
            .iter()
            .map(|b| (b.date, b.index_in_day))
            .collect();
        assert_eq!(tags, vec![(date(2), 1), (date(2), 2), (date(3), 1)]);
        assert_eq!(detail.elapsed, "07:00");
    }

    #[actix_web::test]
    async fn dashboard_rolls_up_the_month() {
        let mut f = Fixture::new();
        f.push(ANA, EventKind::In, local(2, 9, 0));
        f.push(ANA, EventKind::Out, local(2, 16, 15));
        f.push(LUIS, EventKind::In, local(3, 8, 0));
        f.push(LUIS, EventKind::Out, local(3, 8, 20));
        f.push(LUIS, EventKind::In, local(3, 9, 0));
        f.store.set_employee_active(ZOE, false);

        let now = local(3, 10, 0);
        let board = dashboard(&f.store, &ReportZone::default(), ACME, now).await.unwrap();
        assert_eq!(board.active_employees, 2);
        assert_eq!(board.events_today, 3);
        assert_eq!(board.currently_active, 1);
        assert_eq!(board.month_total, "07:35");
        assert_eq!(
            board.hours_per_day,
            vec![
                HoursPoint {
                    date: date(2),
                    label: "02/03".to_string(),
                    hours: 7.25
                },
                HoursPoint {
                    date: date(3),
                    label: "03/03".to_string(),
                    hours: 0.33
                },
            ]
        );
    }

    #[test]
    fn counts_employees_whose_latest_event_is_in() {
        let latest = vec![
            AttendanceEvent {
                id: EventId(1),
                company_id: ACME,
                employee_id: ANA,
                kind: EventKind::In,
                activity: Some("packing".to_string()),
                occurred_at: local(2, 9, 0),
            },
            AttendanceEvent {
                id: EventId(2),
                company_id: ACME,
                employee_id: LUIS,
                kind: EventKind::Out,
                activity: None,
                occurred_at: local(2, 9, 0),
            },
        ];
        assert_eq!(count_open(&latest), 1);
    }
}
