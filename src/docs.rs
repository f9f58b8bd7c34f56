use crate::api::attendance::{
    AttendanceListItem, ClockInReq, RecordAttendanceReq, UpdateAttendanceReq,
};
use crate::api::audit::{ActionCount, AuditReport};
use crate::api::company::{CompanySettings, UpdateCompanyReq};
use crate::api::employee::{CreateEmployee, EmployeeListResponse};
use crate::api::user::{CreateUserReq, UpdateUserReq};
use crate::engine::blocks::{Anomaly, BlockStatus, Reconstruction, WorkBlock};
use crate::engine::error::{Conflict, Neighbor, SequenceViolation, ViolationReason};
use crate::engine::period::{
    Dashboard, DailyBlock, DailyEntry, DailyStatus, DailySummary, HoursPoint, MonthBlock,
    MonthlyDetail, MonthlySummary, PeriodStatus, PeriodSummary,
};
use crate::engine::sequencing::ClockState;
use crate::model::{
    attendance::{AttendanceEvent, EventKind},
    audit_log::AuditLog,
    company::Company,
    employee::{Employee, EmployeePatch},
    role::Role,
    user::User,
};
use crate::models::{LoginReqDto, RegisterCompanyReq, TokenPair};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Timeclock API",
        version = "1.0.0",
        description = r#"
## Multitenant Time & Attendance

Employees clock **IN** and **OUT**; the service keeps every employee's
timeline strictly alternating, pairs events into work blocks and totals
worked time per day and per month.

### 🔹 Key Features
- **Clocking**
  - Self-service clock in/out, optionally limited to the company network
  - Back-dated records and corrections by supervisors
- **Reports**
  - Daily and monthly totals, per-employee block detail, dashboard
- **Administration**
  - Employees, users, company network settings, audit trail

### 🕒 Time
Instants are stored and returned in UTC. Days and months are cut in the
configured report timezone (Buenos Aires by default).

### 🔐 Security
Endpoints under `/api` require a **JWT Bearer** access token. Every query
is scoped to the caller's company.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::register,

        crate::api::attendance::clock_status,
        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::list_attendance,
        crate::api::attendance::record_attendance,
        crate::api::attendance::update_attendance,
        crate::api::attendance::delete_attendance,

        crate::api::reports::daily,
        crate::api::reports::daily_blocks,
        crate::api::reports::daily_detail,
        crate::api::reports::monthly,
        crate::api::reports::monthly_detail,
        crate::api::reports::blocks_in_range,
        crate::api::dashboard::dashboard,

        crate::api::employee::create_employee,
        crate::api::employee::get_employee,
        crate::api::employee::list_employees,
        crate::api::employee::update_employee,
        crate::api::employee::toggle_employee,

        crate::api::user::list_users,
        crate::api::user::create_user,
        crate::api::user::update_user,
        crate::api::user::toggle_user,

        crate::api::company::get_company,
        crate::api::company::update_company,

        crate::api::audit::list_audit
    ),
    components(
        schemas(
            LoginReqDto,
            RegisterCompanyReq,
            TokenPair,
            ClockInReq,
            RecordAttendanceReq,
            UpdateAttendanceReq,
            AttendanceListItem,
            AttendanceEvent,
            EventKind,
            ClockState,
            Conflict,
            Neighbor,
            SequenceViolation,
            ViolationReason,
            WorkBlock,
            BlockStatus,
            Anomaly,
            Reconstruction,
            DailyStatus,
            PeriodStatus,
            DailyEntry,
            DailySummary,
            DailyBlock,
            PeriodSummary,
            MonthlySummary,
            MonthBlock,
            MonthlyDetail,
            HoursPoint,
            Dashboard,
            CreateEmployee,
            EmployeePatch,
            Employee,
            EmployeeListResponse,
            CreateUserReq,
            UpdateUserReq,
            User,
            Role,
            Company,
            CompanySettings,
            UpdateCompanyReq,
            AuditLog,
            AuditReport,
            ActionCount
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token refresh and company signup"),
        (name = "Attendance", description = "Clocking and attendance records"),
        (name = "Reports", description = "Worked time per day and month"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "User", description = "Login accounts of a company"),
        (name = "Company", description = "Company and network settings"),
        (name = "Audit", description = "Audit trail"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_protected_scope() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/clock/in",
            "/api/reports/monthly",
            "/api/company",
            "/api/users/{user_id}",
            "/auth/login",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
