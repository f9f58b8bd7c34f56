use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::{
    company::CompanyId,
    employee::EmployeeId,
    role::{Capability, Role},
};
use crate::models::{Claims, TokenType};

/// The authenticated caller. `company_id` is the only source of tenant
/// scope for a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub company_id: CompanyId,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<EmployeeId>,
}

impl TryFrom<Claims> for AuthUser {
    type Error = ApiError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        if claims.token_type != TokenType::Access {
            return Err(ApiError::Unauthorized("Access token required".to_string()));
        }
        let role = claims
            .role
            .parse::<Role>()
            .map_err(|_| ApiError::Unauthorized("Invalid role".to_string()))?;
        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            company_id: CompanyId(claims.company_id),
            role,
            employee_id: claims.employee_id.map(EmployeeId),
        })
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    // set by `auth_middleware` on protected scopes
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return Ok(user.clone());
    }

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing token".to_string()))?;

    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| ApiError::Internal("Config missing".to_string()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid token".to_string()))?;

    AuthUser::try_from(claims)
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

impl AuthUser {
    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        if self.role.allows(capability) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "{} may not {}",
                self.role, capability
            )))
        }
    }

    /// Employee record the caller clocks for.
    pub fn own_employee(&self) -> Result<EmployeeId, ApiError> {
        self.require(Capability::ClockSelf)?;
        self.employee_id
            .ok_or_else(|| ApiError::forbidden("No employee profile"))
    }
}
