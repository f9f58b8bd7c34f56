//! Tenant isolation helpers.
//!
//! The company is always an explicit argument, taken from verified token
//! claims at the boundary. Anything outside it is reported as not found.

use crate::engine::error::AttendanceError;
use crate::model::{
    attendance::{AttendanceEvent, EventId},
    company::CompanyId,
    employee::{Employee, EmployeeId},
};
use crate::store::EventStore;

/// Resolve an employee inside `company`, failing closed.
pub async fn employee_in(
    store: &dyn EventStore,
    company: CompanyId,
    employee: EmployeeId,
) -> Result<Employee, AttendanceError> {
    match store.employee(company, employee).await? {
        Some(found) if found.company_id == company => Ok(found),
        _ => Err(AttendanceError::TenantMismatch),
    }
}

pub async fn event_in(
    store: &dyn EventStore,
    company: CompanyId,
    id: EventId,
) -> Result<AttendanceEvent, AttendanceError> {
    match store.event(company, id).await? {
        Some(found) if found.company_id == company => Ok(found),
        _ => Err(AttendanceError::TenantMismatch),
    }
}
