use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    ToSchema,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    Supervisor,
    Employee,
}

/// What a caller may do at the HTTP boundary. The attendance engine itself
/// never looks at these.
#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display)]
pub enum Capability {
    /// Clock in/out for the employee linked to the caller
    ClockSelf,
    /// Record attendance on behalf of any employee, back-dated included
    RecordAny,
    EditAttendance,
    ViewReports,
    ManageEmployees,
    ManageUsers,
    ManageCompany,
    ViewAudit,
}

const ADMIN: &[Capability] = &[
    Capability::RecordAny,
    Capability::EditAttendance,
    Capability::ViewReports,
    Capability::ManageEmployees,
    Capability::ManageUsers,
    Capability::ManageCompany,
    Capability::ViewAudit,
];

const SUPERVISOR: &[Capability] = &[
    Capability::RecordAny,
    Capability::EditAttendance,
    Capability::ViewReports,
    Capability::ManageEmployees,
];

const EMPLOYEE: &[Capability] = &[Capability::ClockSelf];

impl Role {
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Role::Admin => ADMIN,
            Role::Supervisor => SUPERVISOR,
            Role::Employee => EMPLOYEE,
        }
    }

    pub fn allows(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}
