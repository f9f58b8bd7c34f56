pub mod attendance;
pub mod audit;
pub mod company;
pub mod dashboard;
pub mod employee;
pub mod reports;
pub mod user;

use actix_web::HttpRequest;

use crate::auth::{auth::AuthUser, network::client_ip};
use crate::config::Config;
use crate::model::audit_log::{AuditAction, AuditEntity, NewAuditEntry};

/// Audit entry for an action performed by `auth` in this request.
pub(crate) fn audit_entry(
    auth: &AuthUser,
    req: &HttpRequest,
    config: &Config,
    action: AuditAction,
    entity: AuditEntity,
    description: String,
) -> NewAuditEntry {
    NewAuditEntry {
        company_id: auth.company_id,
        user_id: auth.user_id,
        action,
        entity,
        description,
        ip: client_ip(req, config.trust_forwarded_for).map(|ip| ip.to_string()),
    }
}
