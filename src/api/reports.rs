use actix_web::{HttpResponse, web};
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::auth::AuthUser,
    engine::{
        blocks,
        clock::{Clock, ReportZone, TimeRange},
        period,
    },
    error::ApiError,
    model::{employee::EmployeeId, role::Capability},
    store::EventStore,
};

/// Longest range `/reports/blocks` accepts.
const MAX_RANGE_DAYS: u64 = 366;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DayQuery {
    /// Local date, defaults to today
    #[param(value_type = Option<String>, format = "date", example = "2026-03-02")]
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MonthQuery {
    /// Defaults, together with `month`, to the previous local month
    #[param(example = 2026)]
    pub year: Option<i32>,
    #[param(example = 2)]
    pub month: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RangeQuery {
    /// First local date, inclusive
    #[param(value_type = String, format = "date", example = "2026-03-01")]
    pub from: NaiveDate,
    /// Last local date, inclusive
    #[param(value_type = String, format = "date", example = "2026-03-31")]
    pub to: NaiveDate,
}

fn day_of(query: &DayQuery, zone: &ReportZone, clock: &dyn Clock) -> NaiveDate {
    query.date.unwrap_or_else(|| zone.today(clock.now()))
}

fn month_of(
    query: &MonthQuery,
    zone: &ReportZone,
    clock: &dyn Clock,
) -> Result<(i32, u32), ApiError> {
    match (query.year, query.month) {
        (Some(year), Some(month)) => Ok((year, month)),
        (None, None) => Ok(zone.previous_month(clock.now())),
        _ => Err(ApiError::bad_request("year and month must be given together")),
    }
}

fn local_range(zone: &ReportZone, from: NaiveDate, to: NaiveDate) -> Result<TimeRange, ApiError> {
    if to < from {
        return Err(ApiError::bad_request("'to' must not be before 'from'"));
    }
    let day_after = to
        .checked_add_days(Days::new(1))
        .ok_or_else(|| ApiError::bad_request("'to' is out of range"))?;
    if (day_after - from).num_days() as u64 > MAX_RANGE_DAYS {
        return Err(ApiError::bad_request(format!(
            "range may span at most {} days",
            MAX_RANGE_DAYS
        )));
    }
    Ok(TimeRange::new(zone.start_of_day(from), zone.start_of_day(day_after))?)
}

/// Daily summary per employee
#[utoipa::path(
    get,
    path = "/api/reports/daily",
    params(DayQuery),
    responses((status = 200, description = "One entry per employee with events that day", body = DailySummary)),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn daily(
    auth: AuthUser,
    query: web::Query<DayQuery>,
    store: web::Data<dyn EventStore>,
    zone: web::Data<ReportZone>,
    clock: web::Data<dyn Clock>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ViewReports)?;
    let date = day_of(&query, &zone, clock.get_ref());
    let summary = period::daily_summary(store.get_ref(), &zone, auth.company_id, date).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Every block of the day, by employee
#[utoipa::path(
    get,
    path = "/api/reports/daily/blocks",
    params(DayQuery),
    responses((status = 200, description = "Blocks ordered by employee name, then start", body = [DailyBlock])),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn daily_blocks(
    auth: AuthUser,
    query: web::Query<DayQuery>,
    store: web::Data<dyn EventStore>,
    zone: web::Data<ReportZone>,
    clock: web::Data<dyn Clock>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ViewReports)?;
    let date = day_of(&query, &zone, clock.get_ref());
    let blocks = period::daily_blocks(store.get_ref(), &zone, auth.company_id, date).await?;
    Ok(HttpResponse::Ok().json(blocks))
}

/// One employee's blocks for a day
#[utoipa::path(
    get,
    path = "/api/reports/daily/{employee_id}",
    params(("employee_id", Path, description = "Employee ID"), DayQuery),
    responses(
        (status = 200, description = "Blocks and anomalies", body = Reconstruction),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn daily_detail(
    auth: AuthUser,
    path: web::Path<u64>,
    query: web::Query<DayQuery>,
    store: web::Data<dyn EventStore>,
    zone: web::Data<ReportZone>,
    clock: web::Data<dyn Clock>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ViewReports)?;
    let date = day_of(&query, &zone, clock.get_ref());
    let r = blocks::reconstruct_blocks(
        store.get_ref(),
        auth.company_id,
        EmployeeId(path.into_inner()),
        zone.day_range(date),
    )
    .await?;
    Ok(HttpResponse::Ok().json(r))
}

/// Monthly totals per employee
#[utoipa::path(
    get,
    path = "/api/reports/monthly",
    params(MonthQuery),
    responses(
        (status = 200, description = "Employees with time worked in the month", body = MonthlySummary),
        (status = 400, description = "Invalid month")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn monthly(
    auth: AuthUser,
    query: web::Query<MonthQuery>,
    store: web::Data<dyn EventStore>,
    zone: web::Data<ReportZone>,
    clock: web::Data<dyn Clock>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ViewReports)?;
    let (year, month) = month_of(&query, &zone, clock.get_ref())?;
    let summary =
        period::monthly_summary(store.get_ref(), &zone, auth.company_id, year, month).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// One employee's blocks across a month
#[utoipa::path(
    get,
    path = "/api/reports/monthly/{employee_id}",
    params(("employee_id", Path, description = "Employee ID"), MonthQuery),
    responses(
        (status = 200, description = "Blocks by day", body = MonthlyDetail),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn monthly_detail(
    auth: AuthUser,
    path: web::Path<u64>,
    query: web::Query<MonthQuery>,
    store: web::Data<dyn EventStore>,
    zone: web::Data<ReportZone>,
    clock: web::Data<dyn Clock>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ViewReports)?;
    let (year, month) = month_of(&query, &zone, clock.get_ref())?;
    let detail = period::monthly_detail(
        store.get_ref(),
        &zone,
        auth.company_id,
        EmployeeId(path.into_inner()),
        year,
        month,
    )
    .await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// One employee's blocks between two local dates
#[utoipa::path(
    get,
    path = "/api/reports/blocks/{employee_id}",
    params(("employee_id", Path, description = "Employee ID"), RangeQuery),
    responses(
        (status = 200, description = "Blocks and anomalies", body = Reconstruction),
        (status = 400, description = "Invalid range"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn blocks_in_range(
    auth: AuthUser,
    path: web::Path<u64>,
    query: web::Query<RangeQuery>,
    store: web::Data<dyn EventStore>,
    zone: web::Data<ReportZone>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ViewReports)?;
    let range = local_range(&zone, query.from, query.to)?;
    let r = blocks::reconstruct_blocks(
        store.get_ref(),
        auth.company_id,
        EmployeeId(path.into_inner()),
        range,
    )
    .await?;
    Ok(HttpResponse::Ok().json(r))
}
