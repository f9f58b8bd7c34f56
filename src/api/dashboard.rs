use actix_web::{HttpResponse, web};

use crate::{
    auth::auth::AuthUser,
    engine::{
        clock::{Clock, ReportZone},
        period,
    },
    error::ApiError,
    model::role::Capability,
    store::EventStore,
};

/// Company figures for today and the current month
#[utoipa::path(
    get,
    path = "/api/dashboard",
    responses(
        (status = 200, description = "Dashboard figures", body = Dashboard),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn dashboard(
    auth: AuthUser,
    store: web::Data<dyn EventStore>,
    zone: web::Data<ReportZone>,
    clock: web::Data<dyn Clock>,
) -> Result<HttpResponse, ApiError> {
    auth.require(Capability::ViewReports)?;
    let figures = period::dashboard(store.get_ref(), &zone, auth.company_id, clock.now()).await?;
    Ok(HttpResponse::Ok().json(figures))
}

#[cfg(test)]
mod tests {
    use actix_web::{App, test};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::Value;

    use crate::api::testing::{ACME, ANA, GLOBEX, Harness, LUIS, OTTO};
    use crate::model::{
        attendance::{AttendanceEvent, EventId, EventKind},
        company::CompanyId,
        employee::EmployeeId,
        role::Role,
    };

    #[actix_web::test]
    async fn counts_only_the_callers_company() {
        let h = Harness::new();
        let push = |id: u64, company: CompanyId, employee: EmployeeId, kind: EventKind, at: DateTime<Utc>| {
            h.store.push_event(AttendanceEvent {
                id: EventId(id),
                company_id: company,
                employee_id: employee,
                kind,
                activity: (kind == EventKind::In).then(|| "packing".to_string()),
                occurred_at: at,
            })
        };
        let morning = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        push(1, ACME, ANA, EventKind::In, morning);
        push(2, ACME, ANA, EventKind::Out, morning + Duration::hours(4));
        push(3, ACME, LUIS, EventKind::In, morning + Duration::hours(1));
        push(4, GLOBEX, OTTO, EventKind::In, morning);
        let app = test::init_service(App::new().configure(|c| h.register(c))).await;

        let req = test::TestRequest::get()
            .uri("/api/dashboard")
            .insert_header(("Authorization", h.token(ACME, Role::Admin, None)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["active_employees"], 2);
        assert_eq!(body["events_today"], 3);
        assert_eq!(body["currently_active"], 1);
        assert_eq!(body["month_total"], "04:00");
        assert_eq!(body["hours_per_day"][0]["label"], "02/03");
        assert_eq!(body["hours_per_day"][0]["hours"], 4.0);
    }
}
