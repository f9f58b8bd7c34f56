use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::company::CompanyId;

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Toggle,
    Login,
    ClockIn,
    ClockOut,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntity {
    System,
    Attendance,
    Employee,
    User,
    Company,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct AuditLog {
    pub id: u64,
    #[schema(value_type = u64)]
    pub company_id: CompanyId,
    pub user_id: u64,
    #[schema(example = "CLOCK_IN")]
    pub action: String,
    #[schema(example = "ATTENDANCE")]
    pub entity: String,
    pub description: Option<String>,
    pub ip: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Audit entry waiting to be written.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub company_id: CompanyId,
    pub user_id: u64,
    pub action: AuditAction,
    pub entity: AuditEntity,
    pub description: String,
    pub ip: Option<String>,
}
