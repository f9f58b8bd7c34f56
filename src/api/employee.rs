use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::audit_entry,
    audit::{self, AuditSink},
    auth::auth::AuthUser,
    config::Config,
    engine::tenant,
    error::ApiError,
    model::{
        audit_log::{AuditAction, AuditEntity},
        employee::{Employee, EmployeeId, EmployeePatch, EmployeeSearch, NewEmployee},
        role::Capability,
    },
    store::{DirectoryStore, EventStore},
    utils::db_utils::text_fields,
};

/// Columns a partial update may touch.
const UPDATABLE: &[&str] = &["external_id", "last_name", "first_name"];

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "30111222")]
    pub external_id: String,
    #[schema(example = "Gomez")]
    pub last_name: String,
    #[schema(example = "Ana")]
    pub first_name: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Only active (true) or inactive (false) employees
    pub active: Option<bool>,
    /// Matches names and external id
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 10)]
    pub total: i64,
}

/// Every present field must be a non-blank string.
fn parse_patch(body: &Value) -> Result<EmployeePatch, ApiError> {
    let mut patch = EmployeePatch::default();
    for (column, value) in text_fields(body, UPDATABLE).map_err(ApiError::BadRequest)? {
        match column {
            "external_id" => patch.external_id = Some(value),
            "last_name" => patch.last_name = Some(value),
            _ => patch.first_name = Some(value),
        }
    }
    Ok(patch)
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 400, description = "Missing fields"),
        (status = 409, description = "External id already used in this company")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    req: HttpRequest,
    directory: web::Data<dyn DirectoryStore>,
    config: web::Data<Config>,
    audit_sink: web::Data<dyn AuditSink>,
    payload: web::Json<CreateEmployee>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageEmployees)?;

    let new = NewEmployee {
        external_id: payload.external_id.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        first_name: payload.first_name.trim().to_string(),
    };
    if new.external_id.is_empty() || new.last_name.is_empty() || new.first_name.is_empty() {
        return Err(ApiError::bad_request(
            "external_id, last_name and first_name are required",
        ));
    }

    let employee = directory
        .insert_employee(auth.company_id, &new)
        .await
        .inspect_err(|e| {
            error!(error = %e, company_id = %auth.company_id, "Failed to create employee");
        })?;
    info!(company_id = %auth.company_id, employee_id = %employee.id, "Employee created");

    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            AuditAction::Create,
            AuditEntity::Employee,
            format!("Employee created: {} ({})", employee.display_name(), employee.external_id),
        ),
    )
    .await;

    Ok(HttpResponse::Created().json(employee))
}

/// List Employees
#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    directory: web::Data<dyn DirectoryStore>,
    query: web::Query<EmployeeQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageEmployees)?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let search = EmployeeSearch {
        active: query.active,
        text: query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        limit: per_page,
        offset: (page - 1) * per_page,
    };
    let (data, total) = directory.employee_page(auth.company_id, &search).await?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    request_body = EmployeePatch,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "Unknown, blank or non-text field"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "External id already used in this company")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    req: HttpRequest,
    directory: web::Data<dyn DirectoryStore>,
    config: web::Data<Config>,
    audit_sink: web::Data<dyn AuditSink>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageEmployees)?;
    let employee_id = EmployeeId(path.into_inner());
    let patch = parse_patch(&body)?;

    let employee = directory
        .update_employee(auth.company_id, employee_id, &patch)
        .await?
        .ok_or(ApiError::NotFound)?;

    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            AuditAction::Update,
            AuditEntity::Employee,
            format!("Employee updated: {}", employee.display_name()),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(employee))
}

/// Activate or deactivate an employee. Inactive employees cannot record
/// new attendance; their history stays.
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}/toggle",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "New state", body = Employee),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn toggle_employee(
    auth: AuthUser,
    req: HttpRequest,
    directory: web::Data<dyn DirectoryStore>,
    config: web::Data<Config>,
    audit_sink: web::Data<dyn AuditSink>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageEmployees)?;
    let employee_id = EmployeeId(path.into_inner());

    let employee = directory
        .toggle_employee(auth.company_id, employee_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let state = if employee.active { "activated" } else { "deactivated" };
    info!(company_id = %auth.company_id, %employee_id, state, "Employee toggled");

    audit::emit(
        audit_sink.get_ref(),
        audit_entry(
            &auth,
            &req,
            &config,
            AuditAction::Toggle,
            AuditEntity::Employee,
            format!("Employee {}: {}", state, employee.display_name()),
        ),
    )
    .await;

    Ok(HttpResponse::Ok().json(employee))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    store: web::Data<dyn EventStore>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ManageEmployees)?;
    let employee =
        tenant::employee_in(store.get_ref(), auth.company_id, EmployeeId(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(employee))
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test};
    use serde_json::{Value, json};

    use crate::api::testing::{ACME, ANA, GLOBEX, Harness, LUIS, OTTO};
    use crate::model::{audit_log::AuditAction, role::Role};

    #[actix_web::test]
    async fn fetches_only_own_company_employees() {
        let h = Harness::new();
        let app = test::init_service(App::new().configure(|c| h.register(c))).await;
        let token = h.token(ACME, Role::Supervisor, None);

        let req = test::TestRequest::get()
            .uri(&format!("/api/employees/{}", ANA.0))
            .insert_header(("Authorization", token.clone()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["last_name"], "Gomez");

        let req = test::TestRequest::get()
            .uri(&format!("/api/employees/{}", OTTO.0))
            .insert_header(("Authorization", token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn employees_cannot_manage_employees() {
        let h = Harness::new();
        let app = test::init_service(App::new().configure(|c| h.register(c))).await;
        let req = test::TestRequest::get()
            .uri(&format!("/api/employees/{}", ANA.0))
            .insert_header(("Authorization", h.token(ACME, Role::Employee, Some(ANA))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn creates_employee_and_audits_it() {
        let h = Harness::new();
        let app = test::init_service(App::new().configure(|c| h.register(c))).await;
        let token = h.token(ACME, Role::Supervisor, None);

        let req = test::TestRequest::post()
            .uri("/api/employees")
            .insert_header(("Authorization", token.clone()))
            .set_json(json!({"external_id": " 30999 ", "last_name": "Diaz", "first_name": "Eva"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["external_id"], "30999");
        assert_eq!(body["company_id"], ACME.0);
        assert_eq!(body["active"], true);
        assert_eq!(h.audit_actions(), vec![AuditAction::Create]);

        // external ids are unique per company
        let req = test::TestRequest::post()
            .uri("/api/employees")
            .insert_header(("Authorization", token))
            .set_json(json!({"external_id": "30999", "last_name": "Paz", "first_name": "Ema"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri("/api/employees")
            .insert_header(("Authorization", h.token(GLOBEX, Role::Admin, None)))
            .set_json(json!({"external_id": "30999", "last_name": "Paz", "first_name": "Ema"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    }

    #[actix_web::test]
    async fn updates_only_the_given_fields() {
        let h = Harness::new();
        let app = test::init_service(App::new().configure(|c| h.register(c))).await;
        let req = test::TestRequest::put()
            .uri(&format!("/api/employees/{}", ANA.0))
            .insert_header(("Authorization", h.token(ACME, Role::Admin, None)))
            .set_json(json!({"last_name": " Gómez "}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["last_name"], "Gómez");
        assert_eq!(body["first_name"], "Ana");
        assert_eq!(h.audit_actions(), vec![AuditAction::Update]);
    }

    #[actix_web::test]
    async fn rejects_blank_null_and_non_text_updates() {
        let h = Harness::new();
        let app = test::init_service(App::new().configure(|c| h.register(c))).await;
        for payload in [
            json!({"last_name": "   "}),
            json!({"first_name": null}),
            json!({"external_id": 7}),
            json!({"company_id": "2"}),
            json!({}),
        ] {
            let req = test::TestRequest::put()
                .uri(&format!("/api/employees/{}", ANA.0))
                .insert_header(("Authorization", h.token(ACME, Role::Admin, None)))
                .set_json(&payload)
                .to_request();
            assert_eq!(
                test::call_service(&app, req).await.status(),
                StatusCode::BAD_REQUEST,
                "{}",
                payload
            );
        }
        assert!(h.audit_actions().is_empty());
    }

    #[actix_web::test]
    async fn update_cannot_steal_an_external_id_or_cross_tenants() {
        let h = Harness::new();
        let app = test::init_service(App::new().configure(|c| h.register(c))).await;
        let token = h.token(ACME, Role::Admin, None);

        // LUIS holds external id "11"
        let req = test::TestRequest::put()
            .uri(&format!("/api/employees/{}", ANA.0))
            .insert_header(("Authorization", token.clone()))
            .set_json(json!({"external_id": LUIS.0.to_string()}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::put()
            .uri(&format!("/api/employees/{}", OTTO.0))
            .insert_header(("Authorization", token))
            .set_json(json!({"first_name": "Hijack"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn toggling_deactivates_then_reactivates() {
        let h = Harness::new();
        let app = test::init_service(App::new().configure(|c| h.register(c))).await;
        for expected in [false, true] {
            let req = test::TestRequest::put()
                .uri(&format!("/api/employees/{}/toggle", LUIS.0))
                .insert_header(("Authorization", h.token(ACME, Role::Supervisor, None)))
                .to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body["active"], expected);
        }
        assert_eq!(h.audit_actions(), vec![AuditAction::Toggle, AuditAction::Toggle]);
    }

    #[actix_web::test]
    async fn lists_pages_filtered_by_search() {
        let h = Harness::new();
        let app = test::init_service(App::new().configure(|c| h.register(c))).await;
        let token = h.token(ACME, Role::Admin, None);

        let req = test::TestRequest::get()
            .uri("/api/employees?per_page=1")
            .insert_header(("Authorization", token.clone()))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        // ordered by last name
        assert_eq!(body["data"][0]["last_name"], "Alvarez");

        let req = test::TestRequest::get()
            .uri("/api/employees?search=gom")
            .insert_header(("Authorization", token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["first_name"], "Ana");
    }
}
