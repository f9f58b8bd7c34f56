use actix_web::{HttpResponse, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    audit::{self, AuditSink},
    auth::auth::AuthUser,
    error::ApiError,
    model::{audit_log::AuditLog, role::Capability},
};

const AUDIT_LIMIT: u32 = 200;

#[derive(Serialize, ToSchema)]
pub struct ActionCount {
    #[schema(example = "CLOCK_IN")]
    pub action: String,
    pub count: i64,
}

#[derive(Serialize, ToSchema)]
pub struct AuditReport {
    /// Newest first
    pub entries: Vec<AuditLog>,
    pub by_action: Vec<ActionCount>,
    /// Entries this process failed to write since it started
    pub lost_entries: u64,
}

/// Recent audit trail of the caller's company
#[utoipa::path(
    get,
    path = "/api/audit",
    responses(
        (status = 200, description = "Latest audit entries", body = AuditReport),
        (status = 403, description = "Forbidden")
    ),
    tag = "Audit",
    security(("bearer_auth" = []))
)]
pub async fn list_audit(
    auth: AuthUser,
    audit_sink: web::Data<dyn AuditSink>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ViewAudit)?;

    let entries = audit_sink.recent(auth.company_id, AUDIT_LIMIT).await?;
    let by_action = audit_sink
        .count_by_action(auth.company_id)
        .await?
        .into_iter()
        .map(|(action, count)| ActionCount { action, count })
        .collect();

    Ok(HttpResponse::Ok().json(AuditReport {
        entries,
        by_action,
        lost_entries: audit::failure_count(),
    }))
}
