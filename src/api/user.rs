use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    api::audit_entry,
    audit::{self, AuditSink},
    auth::{auth::AuthUser, password::hash_password},
    config::Config,
    engine::tenant,
    error::ApiError,
    model::{
        audit_log::{AuditAction, AuditEntity},
        company::CompanyId,
        employee::EmployeeId,
        role::{Capability, Role},
        user::{NewUser, UserPatch},
    },
    store::{AccountStore, EventStore},
    utils::email_filter,
};

#[derive(Deserialize, ToSchema)]
pub struct CreateUserReq {
    #[schema(example = "ana@acme.com")]
    pub email: String,
    #[schema(example = "s3cret!")]
    pub password: String,
    #[schema(value_type = String, example = "employee")]
    pub role: Role,
    /// Required for the employee role, ignored otherwise
    #[schema(value_type = Option<u64>, example = 1)]
    pub employee_id: Option<EmployeeId>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUserReq {
    #[schema(value_type = String, example = "supervisor")]
    pub role: Role,
    /// Replaces the password when present and not empty
    #[schema(example = "n3w-s3cret!", nullable = true)]
    pub password: Option<String>,
    /// Required for the employee role, ignored otherwise
    #[schema(value_type = Option<u64>, example = 1)]
    pub employee_id: Option<EmployeeId>,
}

/// Only employee logins are linked to an employee record, and that record
/// must belong to the company.
async fn employee_link(
    store: &dyn EventStore,
    company: CompanyId,
    role: Role,
    employee_id: Option<EmployeeId>,
) -> Result<Option<EmployeeId>, ApiError> {
    match (role, employee_id) {
        (Role::Employee, None) => Err(ApiError::bad_request(
            "The employee role requires an employee_id",
        )),
        (Role::Employee, Some(id)) => {
            tenant::employee_in(store, company, id).await?;
            Ok(Some(id))
        }
        _ => Ok(None),
    }
}

fn hash(password: &str) -> Result<String, ApiError> {
    hash_password(password).map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

/// Users of the caller's company
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Users ordered by email", body = [User]),
        (status = 403, description = "Forbidden")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    auth: AuthUser,
    accounts: web::Data<dyn AccountStore>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageUsers)?;
    let users = accounts.users(auth.company_id).await?;
    Ok(HttpResponse::Ok().json(users))
}

/// Create a login for the caller's company
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserReq,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Email already registered")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    auth: AuthUser,
    req: HttpRequest,
    accounts: web::Data<dyn AccountStore>,
    store: web::Data<dyn EventStore>,
    config: web::Data<Config>,
    audit_sink: web::Data<dyn AuditSink>,
    payload: web::Json<CreateUserReq>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageUsers)?;
    let payload = payload.into_inner();

    let email = email_filter::normalize(&payload.email);
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }

    let employee_id =
        employee_link(store.get_ref(), auth.company_id, payload.role, payload.employee_id).await?;

    if !email_filter::is_email_available(&email, accounts.get_ref()).await {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let new = NewUser {
        email,
        password_hash: hash(&payload.password)?,
        role: payload.role,
        employee_id,
    };
    let user = accounts.insert_user(auth.company_id, &new).await?;
    email_filter::insert(&user.email);

    info!(company_id = %auth.company_id, user_id = user.id, role = %payload.role, "User created");

    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            AuditAction::Create,
            AuditEntity::User,
            format!("User created: {} | Role: {}", user.email, payload.role),
        ),
    )
    .await;

    Ok(HttpResponse::Created().json(user))
}

/// Change a login's role and employee link, optionally resetting its
/// password. The user's refresh tokens are revoked.
#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    params(("user_id", Path, description = "User ID")),
    request_body = UpdateUserReq,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Missing employee link or own role change"),
        (status = 404, description = "User or employee not found")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
#[allow(clippy::too_many_arguments)]
pub async fn update_user(
    auth: AuthUser,
    req: HttpRequest,
    accounts: web::Data<dyn AccountStore>,
    store: web::Data<dyn EventStore>,
    config: web::Data<Config>,
    audit_sink: web::Data<dyn AuditSink>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUserReq>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageUsers)?;
    let user_id = path.into_inner();
    let payload = payload.into_inner();

    if user_id == auth.user_id && payload.role != auth.role {
        return Err(ApiError::bad_request("You cannot change your own role"));
    }

    let employee_id =
        employee_link(store.get_ref(), auth.company_id, payload.role, payload.employee_id).await?;

    let password_hash = match payload.password.as_deref() {
        Some(password) if !password.is_empty() => Some(hash(password)?),
        _ => None,
    };

    let patch = UserPatch {
        role: payload.role,
        employee_id,
        password_hash,
    };
    let user = accounts
        .update_user(auth.company_id, user_id, &patch)
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(
        company_id = %auth.company_id,
        user_id,
        role = %payload.role,
        password_reset = patch.password_hash.is_some(),
        "User updated"
    );

    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            AuditAction::Update,
            AuditEntity::User,
            format!("User updated: {} | Role: {}", user.email, user.role),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(user))
}

/// Enable or disable a login. Callers cannot disable themselves.
#[utoipa::path(
    put,
    path = "/api/users/{user_id}/toggle",
    params(("user_id", Path, description = "User ID")),
    responses(
        (status = 200, description = "New state", body = User),
        (status = 400, description = "Own account"),
        (status = 404, description = "User not found")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn toggle_user(
    auth: AuthUser,
    req: HttpRequest,
    accounts: web::Data<dyn AccountStore>,
    config: web::Data<Config>,
    audit_sink: web::Data<dyn AuditSink>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageUsers)?;
    let user_id = path.into_inner();
    if user_id == auth.user_id {
        return Err(ApiError::bad_request("You cannot disable your own account"));
    }

    let user = accounts
        .toggle_user(auth.company_id, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let state = if user.active { "enabled" } else { "disabled" };
    info!(company_id = %auth.company_id, user_id, state, "User toggled");

    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            AuditAction::Toggle,
            AuditEntity::User,
            format!("User {}: {}", state, user.email),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(user))
}
