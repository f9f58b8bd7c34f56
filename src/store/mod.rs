//! Durable storage.
//!
//! Every tenant-scoped method takes the company first and only ever sees
//! rows of that company; an id belonging to another company behaves exactly
//! like an id that does not exist.

use async_trait::async_trait;
use derive_more::Display;

use crate::engine::clock::TimeRange;
use crate::engine::error::{AttendanceError, SequenceViolation};
use crate::engine::sequencing::Neighbors;
use crate::model::{
    attendance::{AttendanceEvent, EventId, EventPatch, NewEvent},
    company::{Company, CompanyId, CompanySettingsUpdate},
    employee::{Employee, EmployeeId, EmployeePatch, EmployeeSearch, NewEmployee},
    user::{NewUser, User, UserPatch},
};
use crate::models::UserSql;

#[cfg(test)]
pub mod memory;
pub mod mysql;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),

    /// A stored row could not be turned into a domain value
    #[display(fmt = "corrupt row: {}", _0)]
    Corrupt(String),

    /// A unique key is already taken; carries the message for the caller
    #[display(fmt = "{}", _0)]
    Duplicate(String),

    #[display(fmt = "store lock poisoned")]
    Poisoned,
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// Which events to load. Results are always ascending by
/// `(occurred_at, id)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFilter {
    pub employee: Option<EmployeeId>,
    pub range: Option<TimeRange>,
}

impl EventFilter {
    pub fn in_range(range: TimeRange) -> Self {
        EventFilter {
            employee: None,
            range: Some(range),
        }
    }

    pub fn for_employee(employee: EmployeeId, range: TimeRange) -> Self {
        EventFilter {
            employee: Some(employee),
            range: Some(range),
        }
    }
}

/// Decides whether a candidate fits between its chronological neighbors.
pub type NeighborCheck = dyn Fn(&Neighbors) -> Result<(), SequenceViolation> + Send + Sync;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn company(&self, company: CompanyId) -> Result<Option<Company>, StoreError>;

    async fn employee(
        &self,
        company: CompanyId,
        employee: EmployeeId,
    ) -> Result<Option<Employee>, StoreError>;

    async fn employees(&self, company: CompanyId) -> Result<Vec<Employee>, StoreError>;

    async fn events(
        &self,
        company: CompanyId,
        filter: &EventFilter,
    ) -> Result<Vec<AttendanceEvent>, StoreError>;

    /// Newest first, for administrative listings.
    async fn recent_events(
        &self,
        company: CompanyId,
        limit: u32,
    ) -> Result<Vec<AttendanceEvent>, StoreError>;

    async fn count_events(&self, company: CompanyId, range: TimeRange) -> Result<u64, StoreError>;

    /// Chronologically latest event of one employee.
    async fn latest_event(
        &self,
        company: CompanyId,
        employee: EmployeeId,
    ) -> Result<Option<AttendanceEvent>, StoreError>;

    /// Chronologically latest event of every employee that has one.
    async fn latest_per_employee(
        &self,
        company: CompanyId,
    ) -> Result<Vec<AttendanceEvent>, StoreError>;

    async fn event(
        &self,
        company: CompanyId,
        id: EventId,
    ) -> Result<Option<AttendanceEvent>, StoreError>;

    /// Atomically look up the candidate's neighbors, run `check` and append.
    /// Concurrent admissions for the same employee are serialized; a
    /// rejected candidate leaves the store untouched.
    async fn admit(
        &self,
        candidate: NewEvent,
        check: &NeighborCheck,
    ) -> Result<AttendanceEvent, AttendanceError>;

    async fn update_event(
        &self,
        company: CompanyId,
        id: EventId,
        patch: &EventPatch,
    ) -> Result<Option<AttendanceEvent>, StoreError>;

    async fn delete_event(
        &self,
        company: CompanyId,
        id: EventId,
    ) -> Result<Option<AttendanceEvent>, StoreError>;
}

/// Employees and company settings, the administrative side of a tenant.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// One page of employees ordered by name, plus the total matching.
    async fn employee_page(
        &self,
        company: CompanyId,
        search: &EmployeeSearch,
    ) -> Result<(Vec<Employee>, i64), StoreError>;

    /// Fails with `Duplicate` when the external id is taken in the company.
    async fn insert_employee(
        &self,
        company: CompanyId,
        employee: &NewEmployee,
    ) -> Result<Employee, StoreError>;

    async fn update_employee(
        &self,
        company: CompanyId,
        id: EmployeeId,
        patch: &EmployeePatch,
    ) -> Result<Option<Employee>, StoreError>;

    async fn toggle_employee(
        &self,
        company: CompanyId,
        id: EmployeeId,
    ) -> Result<Option<Employee>, StoreError>;

    async fn update_company(
        &self,
        company: CompanyId,
        settings: &CompanySettingsUpdate,
    ) -> Result<Option<Company>, StoreError>;
}

/// Logins and their refresh tokens.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Users of a company ordered by email.
    async fn users(&self, company: CompanyId) -> Result<Vec<User>, StoreError>;

    async fn user(&self, company: CompanyId, id: u64) -> Result<Option<User>, StoreError>;

    /// Credentials for a login, across companies. Emails are globally unique.
    async fn credentials(&self, email: &str) -> Result<Option<UserSql>, StoreError>;

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError>;

    /// Fails with `Duplicate` when the email is registered.
    async fn insert_user(&self, company: CompanyId, user: &NewUser) -> Result<User, StoreError>;

    /// Applies the patch and revokes the user's refresh tokens, which carry
    /// the old role.
    async fn update_user(
        &self,
        company: CompanyId,
        id: u64,
        patch: &UserPatch,
    ) -> Result<Option<User>, StoreError>;

    /// Flips `active`; disabling revokes the user's refresh tokens.
    async fn toggle_user(&self, company: CompanyId, id: u64) -> Result<Option<User>, StoreError>;

    async fn touch_login(&self, user_id: u64) -> Result<(), StoreError>;

    /// Both the user and its company are active.
    async fn account_active(&self, user_id: u64) -> Result<bool, StoreError>;

    /// `expires_at` is a unix timestamp.
    async fn store_refresh_token(
        &self,
        user_id: u64,
        jti: &str,
        expires_at: i64,
    ) -> Result<(), StoreError>;

    /// Revoke a live token of `user_id`. `false` when it is unknown or was
    /// already revoked, so each token rotates at most once.
    async fn consume_refresh_token(&self, user_id: u64, jti: &str) -> Result<bool, StoreError>;

    async fn revoke_refresh_token(&self, jti: &str) -> Result<(), StoreError>;

    /// Creates a company together with its first admin.
    async fn register_company(&self, name: &str, admin: &NewUser)
    -> Result<CompanyId, StoreError>;
}
