use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;
use tracing::{debug, error, info, instrument};

use crate::{
    audit::{self, AuditSink},
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        network::client_ip,
        password::{hash_password, verify_password},
    },
    config::Config,
    error::ApiError,
    model::{
        audit_log::{AuditAction, AuditEntity, NewAuditEntry},
        company::CompanyId,
        role::Role,
        user::NewUser,
    },
    models::{Claims, LoginReqDto, RegisterCompanyReq, TokenPair, TokenType},
    store::AccountStore,
    utils::email_filter,
};

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn token_error(e: jsonwebtoken::errors::Error) -> ApiError {
    ApiError::Internal(format!("token encoding failed: {}", e))
}

/// Issue an access + refresh pair and persist the refresh token's jti.
async fn issue_tokens(
    user: &AuthUser,
    accounts: &dyn AccountStore,
    config: &Config,
) -> Result<TokenPair, ApiError> {
    let access_token =
        generate_access_token(user, &config.jwt_secret, config.access_token_ttl).map_err(token_error)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(user, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(token_error)?;

    debug!(user_id = user.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    accounts
        .store_refresh_token(user.user_id, &refresh_claims.jti, refresh_claims.exp as i64)
        .await
        .inspect_err(|e| error!(error = %e, "Failed to store refresh token"))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Decode a refresh token and turn its claims back into a caller.
fn refresh_claims(req: &HttpRequest, config: &Config) -> Option<(Claims, AuthUser)> {
    let claims = verify_token(bearer(req)?, &config.jwt_secret).ok()?;
    if claims.token_type != TokenType::Refresh {
        return None;
    }
    let user = AuthUser {
        user_id: claims.user_id,
        email: claims.sub.clone(),
        company_id: CompanyId(claims.company_id),
        role: claims.role.parse().ok()?,
        employee_id: claims.employee_id.map(Into::into),
    };
    Some((claims, user))
}

/// Login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 400, description = "Missing email or password"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(accounts, config, audit_sink, user, req), fields(email = %user.email))]
pub async fn login(
    req: HttpRequest,
    user: web::Json<LoginReqDto>,
    accounts: web::Data<dyn AccountStore>,
    config: web::Data<Config>,
    audit_sink: web::Data<dyn AuditSink>,
) -> Result<HttpResponse, ApiError> {
    info!("Login request received");

    let email = email_filter::normalize(&user.email);
    if email.is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(ApiError::bad_request("Email and password required"));
    }

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let db_user = accounts
        .credentials(&email)
        .await
        .inspect_err(|e| error!(error = %e, "Database error while fetching user"))?
        .ok_or_else(|| {
            info!("Invalid credentials: user not found");
            invalid()
        })?;

    if let Err(e) = verify_password(&user.password, &db_user.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(invalid());
    }

    if !db_user.active || !db_user.company_active {
        info!(user_id = db_user.id, "Login refused: user or company inactive");
        return Err(invalid());
    }

    let role: Role = db_user.role.parse().map_err(|_| {
        error!(user_id = db_user.id, role = %db_user.role, "Stored role is unknown");
        invalid()
    })?;

    let auth_user = AuthUser {
        user_id: db_user.id,
        email: db_user.email,
        company_id: db_user.company_id,
        role,
        employee_id: db_user.employee_id,
    };

    let tokens = issue_tokens(&auth_user, accounts.get_ref(), &config).await?;

    // Update last_login_at (non-fatal)
    if let Err(e) = accounts.touch_login(auth_user.user_id).await {
        error!(error = %e, "Failed to update last_login_at");
    }

    audit::emit(
        audit_sink.get_ref(),
        NewAuditEntry {
            company_id: auth_user.company_id,
            user_id: auth_user.user_id,
            action: AuditAction::Login,
            entity: AuditEntity::System,
            description: format!("Login - {}", auth_user.email),
            ip: client_ip(&req, config.trust_forwarded_for).map(|ip| ip.to_string()),
        },
    )
    .await;

    info!(company_id = %auth_user.company_id, "Login successful");

    Ok(HttpResponse::Ok().json(tokens))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    accounts: web::Data<dyn AccountStore>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let unauthorized = || ApiError::Unauthorized("Invalid refresh token".to_string());

    let (claims, user) = refresh_claims(&req, &config).ok_or_else(unauthorized)?;

    // revoke the presented token; a second use finds nothing to revoke
    if !accounts.consume_refresh_token(claims.user_id, &claims.jti).await? {
        return Err(unauthorized());
    }

    // the user may have been deactivated since the token was issued
    if !accounts.account_active(user.user_id).await? {
        return Err(unauthorized());
    }

    let tokens = issue_tokens(&user, accounts.get_ref(), &config).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out (idempotent)")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    accounts: web::Data<dyn AccountStore>,
    config: web::Data<Config>,
) -> HttpResponse {
    // only refresh tokens can logout
    let Some((claims, _)) = refresh_claims(&req, &config) else {
        return HttpResponse::NoContent().finish();
    };

    // revoke refresh token (idempotent)
    if let Err(e) = accounts.revoke_refresh_token(&claims.jti).await {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

/// Register a company and its first admin
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterCompanyReq,
    responses(
        (status = 201, description = "Company created", body = Object, example = json!({
            "message": "Company registered successfully", "company_id": 1
        })),
        (status = 403, description = "Company sign-up disabled"),
        (status = 409, description = "Email already taken")
    ),
    tag = "Auth"
)]
pub async fn register(
    payload: web::Json<RegisterCompanyReq>,
    accounts: web::Data<dyn AccountStore>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    if !config.allow_company_signup {
        return Err(ApiError::forbidden("Company sign-up is disabled"));
    }

    let company_name = payload.company_name.trim();
    let email = email_filter::normalize(&payload.email);
    if company_name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request(
            "Company name, email and password must not be empty",
        ));
    }

    if !email_filter::is_email_available(&email, accounts.get_ref()).await {
        return Err(ApiError::Conflict("Email already taken".to_string()));
    }

    let admin = NewUser {
        password_hash: hash_password(&payload.password)
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))?,
        email,
        role: Role::Admin,
        employee_id: None,
    };

    let company_id = accounts.register_company(company_name, &admin).await?;
    email_filter::insert(&admin.email);

    info!(%company_id, "Company registered");

    Ok(HttpResponse::Created().json(json!({
        "message": "Company registered successfully",
        "company_id": company_id
    })))
}
