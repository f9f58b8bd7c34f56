use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::model::{company::CompanyId, employee::EmployeeId};

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "admin@acme.com")]
    pub email: String,
    pub password: String,
}

/// Creates a company together with its first admin user.
#[derive(Deserialize, ToSchema)]
pub struct RegisterCompanyReq {
    #[schema(example = "Acme SRL")]
    pub company_name: String,
    #[schema(example = "admin@acme.com")]
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Login row: credentials plus what goes into the token.
#[derive(FromRow)]
pub struct UserSql {
    pub id: u64,
    pub company_id: CompanyId,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub employee_id: Option<EmployeeId>,
    pub active: bool,
    pub company_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    /// Email
    pub sub: String,
    pub company_id: u64,
    pub role: String,
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
