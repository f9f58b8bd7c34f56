use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    api::audit_entry,
    audit::{self, AuditSink},
    auth::{
        auth::AuthUser,
        network::{client_ip, parse_cidr, parse_ip},
    },
    config::Config,
    error::ApiError,
    model::{
        audit_log::{AuditAction, AuditEntity},
        company::{Company, CompanySettingsUpdate},
        role::Capability,
    },
    store::{DirectoryStore, EventStore},
    utils::policy_cache::PolicyCache,
};

#[derive(Serialize, ToSchema)]
pub struct CompanySettings {
    pub company: Company,
    /// Address this request came from, to help fill in the allow-list
    #[schema(example = "200.45.10.3", nullable = true)]
    pub current_ip: Option<String>,
    /// Whether self-service clocking is limited by network
    pub security_active: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateCompanyReq {
    #[schema(example = "Acme SRL")]
    pub name: String,
    /// Empty or absent clears the restriction
    #[schema(example = "200.45.10.3", nullable = true)]
    pub allowed_ip: Option<String>,
    #[schema(example = "192.168.0.0/24", nullable = true)]
    pub allowed_cidr: Option<String>,
}

/// Empty strings clear the setting.
fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn settings(company: Company, req: &HttpRequest, config: &Config) -> CompanySettings {
    CompanySettings {
        security_active: company.restricts_network(),
        current_ip: client_ip(req, config.trust_forwarded_for).map(|ip| ip.to_string()),
        company,
    }
}

/// Company settings
#[utoipa::path(
    get,
    path = "/api/company",
    responses(
        (status = 200, description = "Company and network settings", body = CompanySettings),
        (status = 403, description = "Forbidden")
    ),
    tag = "Company",
    security(("bearer_auth" = []))
)]
pub async fn get_company(
    auth: AuthUser,
    req: HttpRequest,
    store: web::Data<dyn EventStore>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageCompany)?;
    let company = store
        .company(auth.company_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(settings(company, &req, &config)))
}

/// Rename the company or change where employees may clock from
#[utoipa::path(
    put,
    path = "/api/company",
    request_body = UpdateCompanyReq,
    responses(
        (status = 200, description = "Updated settings", body = CompanySettings),
        (status = 400, description = "Invalid name, IP or range")
    ),
    tag = "Company",
    security(("bearer_auth" = []))
)]
pub async fn update_company(
    auth: AuthUser,
    req: HttpRequest,
    directory: web::Data<dyn DirectoryStore>,
    config: web::Data<Config>,
    policies: web::Data<PolicyCache>,
    audit_sink: web::Data<dyn AuditSink>,
    payload: web::Json<UpdateCompanyReq>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageCompany)?;
    let payload = payload.into_inner();

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Company name is required"));
    }

    let allowed_ip = blank_to_none(payload.allowed_ip);
    let allowed_cidr = blank_to_none(payload.allowed_cidr);
    // store the canonical form so the policy never has to guess
    let allowed_ip = allowed_ip
        .map(|raw| parse_ip(&raw).map(|ip| ip.to_string()))
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let allowed_cidr = allowed_cidr
        .map(|raw| parse_cidr(&raw).map(|net| net.to_string()))
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let company = directory
        .update_company(
            auth.company_id,
            &CompanySettingsUpdate {
                name: name.to_string(),
                allowed_ip,
                allowed_cidr,
            },
        )
        .await?
        .ok_or(ApiError::NotFound)?;

    policies.invalidate(auth.company_id).await;
    info!(
        company_id = %auth.company_id,
        allowed_ip = ?company.allowed_ip,
        allowed_cidr = ?company.allowed_cidr,
        "Company settings updated"
    );

    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            AuditAction::Update,
            AuditEntity::Company,
            format!(
                "Company settings updated: {} | IP: {} | CIDR: {}",
                company.name,
                company.allowed_ip.as_deref().unwrap_or("-"),
                company.allowed_cidr.as_deref().unwrap_or("-")
            ),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(settings(company, &req, &config)))
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test as web_test};
    use serde_json::{Value, json};

    use super::blank_to_none;
    use crate::api::testing::{ACME, GLOBEX, Harness};
    use crate::model::{audit_log::AuditAction, role::Role};
    use crate::store::EventStore;

    #[test]
    fn blank_settings_clear() {
        assert_eq!(blank_to_none(Some("  ".into())), None);
        assert_eq!(blank_to_none(None), None);
        assert_eq!(blank_to_none(Some(" 10.0.0.1 ".into())).as_deref(), Some("10.0.0.1"));
    }

    #[actix_web::test]
    async fn shows_settings_and_caller_address() {
        let h = Harness::new();
        h.store.set_network(ACME, Some("10.0.0.9"), None);
        let app = web_test::init_service(App::new().configure(|c| h.register(c))).await;
        let req = web_test::TestRequest::get()
            .uri("/api/company")
            .peer_addr("10.0.0.9:5000".parse().unwrap())
            .insert_header(("Authorization", h.token(ACME, Role::Admin, None)))
            .to_request();
        let body: Value = web_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["company"]["name"], "Acme");
        assert_eq!(body["security_active"], true);
        assert_eq!(body["current_ip"], "10.0.0.9");
    }

    #[actix_web::test]
    async fn rejects_malformed_ranges_before_saving() {
        let h = Harness::new();
        let app = web_test::init_service(App::new().configure(|c| h.register(c))).await;
        let req = web_test::TestRequest::put()
            .uri("/api/company")
            .insert_header(("Authorization", h.token(ACME, Role::Admin, None)))
            .set_json(json!({"name": "Acme", "allowed_cidr": "10.0.0.0/99"}))
            .to_request();
        assert_eq!(web_test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn only_admins_see_company_settings() {
        let h = Harness::new();
        let app = web_test::init_service(App::new().configure(|c| h.register(c))).await;
        let req = web_test::TestRequest::get()
            .uri("/api/company")
            .insert_header(("Authorization", h.token(ACME, Role::Supervisor, None)))
            .to_request();
        assert_eq!(web_test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn saves_canonical_network_settings() {
        let h = Harness::new();
        let app = web_test::init_service(App::new().configure(|c| h.register(c))).await;
        let req = web_test::TestRequest::put()
            .uri("/api/company")
            .insert_header(("Authorization", h.token(ACME, Role::Admin, None)))
            .set_json(json!({
                "name": " Acme SA ",
                "allowed_ip": " 200.45.10.3 ",
                "allowed_cidr": "192.168.0.77/24"
            }))
            .to_request();
        let body: Value = web_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["company"]["name"], "Acme SA");
        assert_eq!(body["company"]["allowed_ip"], "200.45.10.3");
        assert_eq!(body["company"]["allowed_cidr"], "192.168.0.0/24");
        assert_eq!(body["security_active"], true);
        assert_eq!(h.audit_actions(), vec![AuditAction::Update]);

        let globex = h.store.company(GLOBEX).await.unwrap().unwrap();
        assert_eq!(globex.allowed_cidr, None);

        // blanks clear the restriction
        let req = web_test::TestRequest::put()
            .uri("/api/company")
            .insert_header(("Authorization", h.token(ACME, Role::Admin, None)))
            .set_json(json!({"name": "Acme SA", "allowed_ip": "", "allowed_cidr": " "}))
            .to_request();
        let body: Value = web_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["security_active"], false);
        assert!(body["company"]["allowed_ip"].is_null());
    }
}
