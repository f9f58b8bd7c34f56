use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::audit_entry,
    audit::{self, AuditSink},
    auth::{auth::AuthUser, network::client_ip},
    config::Config,
    engine::{
        clock::Clock,
        error::AttendanceError,
        sequencing,
        tenant,
    },
    error::ApiError,
    model::{
        attendance::{AttendanceEvent, EventId, EventKind, EventPatch},
        audit_log::{AuditAction, AuditEntity},
        employee::EmployeeId,
        role::Capability,
    },
    store::{EventFilter, EventStore},
    utils::policy_cache::PolicyCache,
};

const LIST_LIMIT: u32 = 200;

#[derive(Deserialize, ToSchema)]
pub struct ClockInReq {
    #[schema(example = "packing")]
    pub activity: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RecordAttendanceReq {
    #[schema(value_type = u64, example = 10)]
    pub employee_id: EmployeeId,
    #[schema(example = "IN")]
    pub kind: String,
    #[schema(example = "packing")]
    pub activity: Option<String>,
    /// Defaults to now; may be in the past
    #[schema(value_type = Option<String>, format = "date-time")]
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateAttendanceReq {
    #[schema(example = "OUT")]
    pub kind: String,
    pub activity: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttendanceQuery {
    /// Only this employee's events
    pub employee_id: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListItem {
    #[serde(flatten)]
    pub event: AttendanceEvent,
    pub employee_name: Option<String>,
}

/// Reject the request unless the caller's network is allowed for the company.
async fn ensure_network(
    auth: &AuthUser,
    req: &HttpRequest,
    config: &Config,
    store: &dyn EventStore,
    policies: &PolicyCache,
) -> Result<(), ApiError> {
    let client = client_ip(req, config.trust_forwarded_for);
    if policies.permits(store, auth.company_id, client).await? {
        return Ok(());
    }
    warn!(
        company_id = %auth.company_id,
        user_id = auth.user_id,
        client = ?client,
        "Clocking refused outside the company network"
    );
    Err(ApiError::forbidden(
        "Not connected to the company's authorized network",
    ))
}

/// Self-service clock at the current instant.
#[allow(clippy::too_many_arguments)]
async fn record_own(
    kind: EventKind,
    activity: Option<String>,
    auth: AuthUser,
    req: HttpRequest,
    config: web::Data<Config>,
    store: web::Data<dyn EventStore>,
    clock: web::Data<dyn Clock>,
    policies: web::Data<PolicyCache>,
    audit_sink: web::Data<dyn AuditSink>,
) -> Result<HttpResponse, ApiError> {
    let employee = auth.own_employee()?;
    ensure_network(&auth, &req, &config, store.get_ref(), &policies).await?;

    let event = sequencing::validate_and_admit(
        store.get_ref(),
        clock.get_ref(),
        auth.company_id,
        employee,
        kind,
        clock.now(),
        activity,
    )
    .await?;

    let action = match kind {
        EventKind::In => AuditAction::ClockIn,
        EventKind::Out => AuditAction::ClockOut,
    };
    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            action,
            AuditEntity::Attendance,
            format!("{} - {}", kind, auth.email),
        ),
    )
    .await;

    Ok(HttpResponse::Created().json(event))
}

/// Last event of the caller and the kind it may record next
#[utoipa::path(
    get,
    path = "/api/clock",
    responses(
        (status = 200, description = "Clock state", body = ClockState),
        (status = 403, description = "Caller is not an employee")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock_status(
    auth: AuthUser,
    store: web::Data<dyn EventStore>,
) -> Result<HttpResponse, ApiError> {
    let employee = auth.own_employee()?;
    let state = sequencing::next_allowed_kind(store.get_ref(), auth.company_id, employee).await?;
    Ok(HttpResponse::Ok().json(state))
}

/// Clock in
#[utoipa::path(
    post,
    path = "/api/clock/in",
    request_body = ClockInReq,
    responses(
        (status = 201, description = "IN recorded", body = AttendanceEvent),
        (status = 400, description = "Missing activity"),
        (status = 403, description = "Not an employee, or outside the company network"),
        (status = 409, description = "A session is already open", body = Object, example = json!({
            "message": "employee already has an open session since 2026-03-02T12:00:00+00:00",
            "reason": "session_already_open",
            "conflict": {"neighbor": "predecessor", "event_id": 7, "kind": "IN", "occurred_at": "2026-03-02T12:00:00Z"}
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[allow(clippy::too_many_arguments)]
pub async fn clock_in(
    auth: AuthUser,
    req: HttpRequest,
    body: web::Json<ClockInReq>,
    config: web::Data<Config>,
    store: web::Data<dyn EventStore>,
    clock_source: web::Data<dyn Clock>,
    policies: web::Data<PolicyCache>,
    audit_sink: web::Data<dyn AuditSink>,
) -> Result<HttpResponse, ApiError> {
    let activity = Some(body.into_inner().activity);
    record_own(
        EventKind::In,
        activity,
        auth,
        req,
        config,
        store,
        clock_source,
        policies,
        audit_sink,
    )
    .await
}

/// Clock out
#[utoipa::path(
    post,
    path = "/api/clock/out",
    responses(
        (status = 201, description = "OUT recorded", body = AttendanceEvent),
        (status = 403, description = "Not an employee, or outside the company network"),
        (status = 409, description = "No open session")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock_out(
    auth: AuthUser,
    req: HttpRequest,
    config: web::Data<Config>,
    store: web::Data<dyn EventStore>,
    clock_source: web::Data<dyn Clock>,
    policies: web::Data<PolicyCache>,
    audit_sink: web::Data<dyn AuditSink>,
) -> Result<HttpResponse, ApiError> {
    record_own(
        EventKind::Out,
        None,
        auth,
        req,
        config,
        store,
        clock_source,
        policies,
        audit_sink,
    )
    .await
}

/// Latest attendance events of the company
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses((status = 200, description = "Newest first, at most 200", body = [AttendanceListItem])),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    query: web::Query<AttendanceQuery>,
    store: web::Data<dyn EventStore>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::RecordAny)?;

    let employees = store.employees(auth.company_id).await?;
    let events = match query.employee_id.map(EmployeeId) {
        Some(only) => {
            tenant::employee_in(store.get_ref(), auth.company_id, only).await?;
            let filter = EventFilter {
                employee: Some(only),
                range: None,
            };
            let mut events = store.events(auth.company_id, &filter).await?;
            events.reverse();
            events.truncate(LIST_LIMIT as usize);
            events
        }
        None => store.recent_events(auth.company_id, LIST_LIMIT).await?,
    };

    let items: Vec<AttendanceListItem> = events
        .into_iter()
        .map(|event| AttendanceListItem {
            employee_name: employees
                .iter()
                .find(|e| e.id == event.employee_id)
                .map(|e| e.display_name()),
            event,
        })
        .collect();

    Ok(HttpResponse::Ok().json(items))
}

/// Record attendance for any employee of the company
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = RecordAttendanceReq,
    responses(
        (status = 201, description = "Event admitted", body = AttendanceEvent),
        (status = 400, description = "Invalid kind, missing activity or future timestamp"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Would break IN/OUT alternation")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn record_attendance(
    auth: AuthUser,
    req: HttpRequest,
    body: web::Json<RecordAttendanceReq>,
    config: web::Data<Config>,
    store: web::Data<dyn EventStore>,
    clock: web::Data<dyn Clock>,
    audit_sink: web::Data<dyn AuditSink>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::RecordAny)?;
    let body = body.into_inner();
    let kind = sequencing::parse_kind(&body.kind)?;

    let event = sequencing::validate_and_admit(
        store.get_ref(),
        clock.get_ref(),
        auth.company_id,
        body.employee_id,
        kind,
        body.occurred_at.unwrap_or_else(|| clock.now()),
        body.activity,
    )
    .await?;

    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            AuditAction::Create,
            AuditEntity::Attendance,
            format!(
                "{} for employee {} at {}",
                event.kind,
                event.employee_id,
                event.occurred_at.to_rfc3339()
            ),
        ),
    )
    .await;

    Ok(HttpResponse::Created().json(event))
}

/// Correct a stored event. The sequence is not re-validated.
#[utoipa::path(
    put,
    path = "/api/attendance/{event_id}",
    params(("event_id", Path, description = "Attendance event ID")),
    request_body = UpdateAttendanceReq,
    responses(
        (status = 200, description = "Event updated", body = AttendanceEvent),
        (status = 400, description = "Invalid kind, activity or timestamp"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[allow(clippy::too_many_arguments)]
pub async fn update_attendance(
    auth: AuthUser,
    req: HttpRequest,
    path: web::Path<u64>,
    body: web::Json<UpdateAttendanceReq>,
    config: web::Data<Config>,
    store: web::Data<dyn EventStore>,
    clock: web::Data<dyn Clock>,
    audit_sink: web::Data<dyn AuditSink>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::EditAttendance)?;
    let id = EventId(path.into_inner());
    let body = body.into_inner();

    let before = tenant::event_in(store.get_ref(), auth.company_id, id).await?;

    let kind = sequencing::parse_kind(&body.kind)?;
    let activity = sequencing::normalize_activity(kind, body.activity)?;
    let occurred_at = sequencing::stored_precision(body.occurred_at);
    let now = clock.now();
    if occurred_at > now {
        return Err(AttendanceError::FutureTimestamp {
            submitted: occurred_at,
            now,
        }
        .into());
    }

    let patch = EventPatch {
        kind,
        activity,
        occurred_at,
    };
    let updated = store
        .update_event(auth.company_id, id, &patch)
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(
        company_id = %auth.company_id,
        event_id = %id,
        user_id = auth.user_id,
        "Attendance event edited"
    );

    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            AuditAction::Update,
            AuditEntity::Attendance,
            format!(
                "event {}: {} {} -> {} {}",
                id,
                before.kind,
                before.occurred_at.to_rfc3339(),
                updated.kind,
                updated.occurred_at.to_rfc3339()
            ),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(updated))
}

/// Delete a stored event
#[utoipa::path(
    delete,
    path = "/api/attendance/{event_id}",
    params(("event_id", Path, description = "Attendance event ID")),
    responses(
        (status = 200, description = "Deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn delete_attendance(
    auth: AuthUser,
    req: HttpRequest,
    path: web::Path<u64>,
    config: web::Data<Config>,
    store: web::Data<dyn EventStore>,
    audit_sink: web::Data<dyn AuditSink>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::EditAttendance)?;
    let id = EventId(path.into_inner());

    let deleted = store
        .delete_event(auth.company_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(company_id = %auth.company_id, event_id = %id, "Attendance event deleted");

    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            AuditAction::Delete,
            AuditEntity::Attendance,
            format!(
                "event {}: {} of employee {} at {}",
                id,
                deleted.kind,
                deleted.employee_id,
                deleted.occurred_at.to_rfc3339()
            ),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}
