use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{company::CompanyId, employee::EmployeeId, role::Role};

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct User {
    pub id: u64,

    #[schema(value_type = u64)]
    pub company_id: CompanyId,

    #[schema(example = "ana@acme.com")]
    pub email: String,

    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub password_hash: String,

    #[schema(example = "employee")]
    pub role: String,

    #[schema(value_type = Option<u64>, nullable = true)]
    pub employee_id: Option<EmployeeId>,

    pub active: bool,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,

    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Login to insert. The email is normalized and the password already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub employee_id: Option<EmployeeId>,
}

/// Role change with its employee link, plus an optional password reset.
#[derive(Debug, Clone)]
pub struct UserPatch {
    pub role: Role,
    pub employee_id: Option<EmployeeId>,
    pub password_hash: Option<String>,
}
