//! In-process store used by tests. A single mutex guards everything, so
//! admissions are serialized the same way the row lock does for MySQL.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::engine::clock::TimeRange;
use crate::engine::error::AttendanceError;
use crate::engine::sequencing::Neighbors;
use crate::model::{
    attendance::{AttendanceEvent, EventId, EventPatch, NewEvent},
    company::{Company, CompanyId, CompanySettingsUpdate},
    employee::{Employee, EmployeeId, EmployeePatch, EmployeeSearch, NewEmployee},
    role::Role,
    user::{NewUser, User, UserPatch},
};
use crate::models::UserSql;
use crate::store::{
    AccountStore, DirectoryStore, EventFilter, EventStore, NeighborCheck, StoreError,
};

#[derive(Debug, Clone)]
struct RefreshToken {
    user_id: u64,
    jti: String,
    revoked: bool,
}

#[derive(Debug, Default)]
struct State {
    companies: Vec<Company>,
    employees: Vec<Employee>,
    users: Vec<User>,
    refresh_tokens: Vec<RefreshToken>,
    events: Vec<AttendanceEvent>,
    next_id: u64,
}

impl State {
    fn external_id_taken(&self, company: CompanyId, external_id: &str, except: Option<EmployeeId>) -> bool {
        self.employees.iter().any(|e| {
            e.company_id == company && e.external_id == external_id && Some(e.id) != except
        })
    }

    fn revoke_tokens_of(&mut self, user_id: u64) {
        for token in self.refresh_tokens.iter_mut().filter(|t| t.user_id == user_id) {
            token.revoked = true;
        }
    }

    fn push_user(&mut self, company: CompanyId, user: &NewUser) -> Result<User, StoreError> {
        if self.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("Email already registered".to_string()));
        }
        let stored = User {
            id: self.users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            company_id: company,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role.to_string(),
            employee_id: user.employee_id,
            active: true,
            created_at: Utc::now(),
            last_login_at: None,
        };
        self.users.push(stored.clone());
        Ok(stored)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn chronological(a: &AttendanceEvent, b: &AttendanceEvent) -> std::cmp::Ordering {
    (a.occurred_at, a.id).cmp(&(b.occurred_at, b.id))
}

impl MemoryStore {
    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store poisoned")
    }

    pub fn add_company(&self, id: CompanyId, name: &str) {
        self.state().companies.push(Company {
            id,
            name: name.to_string(),
            active: true,
            allowed_ip: None,
            allowed_cidr: None,
            created_at: Utc::now(),
        });
    }

    pub fn set_network(&self, id: CompanyId, allowed_ip: Option<&str>, allowed_cidr: Option<&str>) {
        let mut state = self.state();
        if let Some(company) = state.companies.iter_mut().find(|c| c.id == id) {
            company.allowed_ip = allowed_ip.map(str::to_string);
            company.allowed_cidr = allowed_cidr.map(str::to_string);
        }
    }

    pub fn add_employee(&self, company: CompanyId, id: EmployeeId, last_name: &str, first_name: &str) {
        self.state().employees.push(Employee {
            id,
            company_id: company,
            external_id: id.to_string(),
            last_name: last_name.to_string(),
            first_name: first_name.to_string(),
            active: true,
        });
    }

    pub fn set_employee_active(&self, id: EmployeeId, active: bool) {
        let mut state = self.state();
        if let Some(employee) = state.employees.iter_mut().find(|e| e.id == id) {
            employee.active = active;
        }
    }

    /// Add a login with an already hashed password; returns its id.
    pub fn add_user(
        &self,
        company: CompanyId,
        email: &str,
        password_hash: &str,
        role: Role,
        employee: Option<EmployeeId>,
    ) -> u64 {
        let user = NewUser {
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            employee_id: employee,
        };
        self.state()
            .push_user(company, &user)
            .expect("test user email is unique")
            .id
    }

    pub fn set_company_active(&self, id: CompanyId, active: bool) {
        let mut state = self.state();
        if let Some(company) = state.companies.iter_mut().find(|c| c.id == id) {
            company.active = active;
        }
    }

    /// `(jti, revoked)` of every refresh token issued to `user_id`.
    pub fn refresh_tokens(&self, user_id: u64) -> Vec<(String, bool)> {
        self.state()
            .refresh_tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| (t.jti.clone(), t.revoked))
            .collect()
    }

    /// Insert without validation, the way an external edit would.
    pub fn push_event(&self, event: AttendanceEvent) {
        let mut state = self.state();
        state.next_id = state.next_id.max(event.id.0);
        state.events.push(event);
    }

    pub fn all_events(&self) -> Vec<AttendanceEvent> {
        self.state().events.clone()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn company(&self, company: CompanyId) -> Result<Option<Company>, StoreError> {
        Ok(self.lock()?.companies.iter().find(|c| c.id == company).cloned())
    }

    async fn employee(
        &self,
        company: CompanyId,
        employee: EmployeeId,
    ) -> Result<Option<Employee>, StoreError> {
        Ok(self
            .lock()?
            .employees
            .iter()
            .find(|e| e.id == employee && e.company_id == company)
            .cloned())
    }

    async fn employees(&self, company: CompanyId) -> Result<Vec<Employee>, StoreError> {
        Ok(self
            .lock()?
            .employees
            .iter()
            .filter(|e| e.company_id == company)
            .cloned()
            .collect())
    }

    async fn events(
        &self,
        company: CompanyId,
        filter: &EventFilter,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        let mut events: Vec<AttendanceEvent> = self
            .lock()?
            .events
            .iter()
            .filter(|e| e.company_id == company)
            .filter(|e| filter.employee.is_none_or(|id| e.employee_id == id))
            .filter(|e| filter.range.is_none_or(|r| r.contains(e.occurred_at)))
            .cloned()
            .collect();
        events.sort_by(chronological);
        Ok(events)
    }

    async fn recent_events(
        &self,
        company: CompanyId,
        limit: u32,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        let mut events = self.events(company, &EventFilter::default()).await?;
        events.reverse();
        events.truncate(limit as usize);
        Ok(events)
    }

    async fn count_events(&self, company: CompanyId, range: TimeRange) -> Result<u64, StoreError> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|e| e.company_id == company && range.contains(e.occurred_at))
            .count() as u64)
    }

    async fn latest_event(
        &self,
        company: CompanyId,
        employee: EmployeeId,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|e| e.company_id == company && e.employee_id == employee)
            .max_by(|a, b| chronological(a, b))
            .cloned())
    }

    async fn latest_per_employee(
        &self,
        company: CompanyId,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        let state = self.lock()?;
        let mut latest: Vec<AttendanceEvent> = Vec::new();
        for event in state.events.iter().filter(|e| e.company_id == company) {
            match latest.iter_mut().find(|l| l.employee_id == event.employee_id) {
                Some(current) if chronological(event, current).is_gt() => *current = event.clone(),
                Some(_) => {}
                None => latest.push(event.clone()),
            }
        }
        Ok(latest)
    }

    async fn event(
        &self,
        company: CompanyId,
        id: EventId,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        Ok(self
            .lock()?
            .events
            .iter()
            .find(|e| e.id == id && e.company_id == company)
            .cloned())
    }

    async fn admit(
        &self,
        candidate: NewEvent,
        check: &NeighborCheck,
    ) -> Result<AttendanceEvent, AttendanceError> {
        let mut state = self.lock()?;

        if !state
            .employees
            .iter()
            .any(|e| e.id == candidate.employee_id && e.company_id == candidate.company_id)
        {
            return Err(AttendanceError::TenantMismatch);
        }

        let history = state.events.iter().filter(|e| {
            e.company_id == candidate.company_id && e.employee_id == candidate.employee_id
        });
        let mut neighbors = Neighbors::default();
        for event in history {
            if event.occurred_at < candidate.occurred_at {
                if neighbors
                    .predecessor
                    .as_ref()
                    .is_none_or(|p| chronological(event, p).is_gt())
                {
                    neighbors.predecessor = Some(event.clone());
                }
            } else if neighbors
                .successor
                .as_ref()
                .is_none_or(|s| chronological(event, s).is_lt())
            {
                neighbors.successor = Some(event.clone());
            }
        }

        check(&neighbors)?;

        state.next_id += 1;
        let event = candidate.into_event(EventId(state.next_id));
        state.events.push(event.clone());
        Ok(event)
    }

    async fn update_event(
        &self,
        company: CompanyId,
        id: EventId,
        patch: &EventPatch,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        let mut state = self.lock()?;
        let Some(event) = state
            .events
            .iter_mut()
            .find(|e| e.id == id && e.company_id == company)
        else {
            return Ok(None);
        };
        event.kind = patch.kind;
        event.activity = patch.activity.clone();
        event.occurred_at = patch.occurred_at;
        Ok(Some(event.clone()))
    }

    async fn delete_event(
        &self,
        company: CompanyId,
        id: EventId,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        let mut state = self.lock()?;
        let position = state
            .events
            .iter()
            .position(|e| e.id == id && e.company_id == company);
        Ok(position.map(|i| state.events.remove(i)))
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn employee_page(
        &self,
        company: CompanyId,
        search: &EmployeeSearch,
    ) -> Result<(Vec<Employee>, i64), StoreError> {
        let needle = search.text.as_deref().map(str::to_lowercase);
        let mut matching: Vec<Employee> = self
            .lock()?
            .employees
            .iter()
            .filter(|e| e.company_id == company)
            .filter(|e| search.active.is_none_or(|active| e.active == active))
            .filter(|e| {
                needle.as_deref().is_none_or(|n| {
                    [&e.first_name, &e.last_name, &e.external_id]
                        .iter()
                        .any(|field| field.to_lowercase().contains(n))
                })
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id))
        });

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(search.offset as usize)
            .take(search.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert_employee(
        &self,
        company: CompanyId,
        employee: &NewEmployee,
    ) -> Result<Employee, StoreError> {
        let mut state = self.lock()?;
        if state.external_id_taken(company, &employee.external_id, None) {
            return Err(StoreError::Duplicate(format!(
                "An employee with external id {} already exists",
                employee.external_id
            )));
        }
        let id = state.employees.iter().map(|e| e.id.0).max().unwrap_or(0) + 1;
        let stored = Employee {
            id: EmployeeId(id),
            company_id: company,
            external_id: employee.external_id.clone(),
            last_name: employee.last_name.clone(),
            first_name: employee.first_name.clone(),
            active: true,
        };
        state.employees.push(stored.clone());
        Ok(stored)
    }

    async fn update_employee(
        &self,
        company: CompanyId,
        id: EmployeeId,
        patch: &EmployeePatch,
    ) -> Result<Option<Employee>, StoreError> {
        let mut state = self.lock()?;
        if let Some(external_id) = &patch.external_id {
            if state.external_id_taken(company, external_id, Some(id)) {
                return Err(StoreError::Duplicate(
                    "Another employee already uses that external id".to_string(),
                ));
            }
        }
        let Some(employee) = state
            .employees
            .iter_mut()
            .find(|e| e.id == id && e.company_id == company)
        else {
            return Ok(None);
        };
        if let Some(v) = &patch.external_id {
            employee.external_id = v.clone();
        }
        if let Some(v) = &patch.last_name {
            employee.last_name = v.clone();
        }
        if let Some(v) = &patch.first_name {
            employee.first_name = v.clone();
        }
        Ok(Some(employee.clone()))
    }

    async fn toggle_employee(
        &self,
        company: CompanyId,
        id: EmployeeId,
    ) -> Result<Option<Employee>, StoreError> {
        let mut state = self.lock()?;
        Ok(state
            .employees
            .iter_mut()
            .find(|e| e.id == id && e.company_id == company)
            .map(|employee| {
                employee.active = !employee.active;
                employee.clone()
            }))
    }

    async fn update_company(
        &self,
        company: CompanyId,
        settings: &CompanySettingsUpdate,
    ) -> Result<Option<Company>, StoreError> {
        let mut state = self.lock()?;
        Ok(state
            .companies
            .iter_mut()
            .find(|c| c.id == company)
            .map(|c| {
                c.name = settings.name.clone();
                c.allowed_ip = settings.allowed_ip.clone();
                c.allowed_cidr = settings.allowed_cidr.clone();
                c.clone()
            }))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn users(&self, company: CompanyId) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self
            .lock()?
            .users
            .iter()
            .filter(|u| u.company_id == company)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn user(&self, company: CompanyId, id: u64) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()?
            .users
            .iter()
            .find(|u| u.id == id && u.company_id == company)
            .cloned())
    }

    async fn credentials(&self, email: &str) -> Result<Option<UserSql>, StoreError> {
        let state = self.lock()?;
        let Some(user) = state.users.iter().find(|u| u.email == email) else {
            return Ok(None);
        };
        let Some(company) = state.companies.iter().find(|c| c.id == user.company_id) else {
            return Ok(None);
        };
        Ok(Some(UserSql {
            id: user.id,
            company_id: user.company_id,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role.clone(),
            employee_id: user.employee_id,
            active: user.active,
            company_active: company.active,
        }))
    }

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.users.iter().any(|u| u.email == email))
    }

    async fn insert_user(&self, company: CompanyId, user: &NewUser) -> Result<User, StoreError> {
        self.lock()?.push_user(company, user)
    }

    async fn update_user(
        &self,
        company: CompanyId,
        id: u64,
        patch: &UserPatch,
    ) -> Result<Option<User>, StoreError> {
        let mut state = self.lock()?;
        let Some(user) = state
            .users
            .iter_mut()
            .find(|u| u.id == id && u.company_id == company)
        else {
            return Ok(None);
        };
        user.role = patch.role.to_string();
        user.employee_id = patch.employee_id;
        if let Some(hash) = &patch.password_hash {
            user.password_hash = hash.clone();
        }
        let updated = user.clone();
        state.revoke_tokens_of(id);
        Ok(Some(updated))
    }

    async fn toggle_user(&self, company: CompanyId, id: u64) -> Result<Option<User>, StoreError> {
        let mut state = self.lock()?;
        let Some(user) = state
            .users
            .iter_mut()
            .find(|u| u.id == id && u.company_id == company)
        else {
            return Ok(None);
        };
        user.active = !user.active;
        let toggled = user.clone();
        if !toggled.active {
            state.revoke_tokens_of(id);
        }
        Ok(Some(toggled))
    }

    async fn touch_login(&self, user_id: u64) -> Result<(), StoreError> {
        if let Some(user) = self.lock()?.users.iter_mut().find(|u| u.id == user_id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn account_active(&self, user_id: u64) -> Result<bool, StoreError> {
        let state = self.lock()?;
        Ok(state.users.iter().any(|u| {
            u.id == user_id
                && u.active
                && state
                    .companies
                    .iter()
                    .any(|c| c.id == u.company_id && c.active)
        }))
    }

    async fn store_refresh_token(
        &self,
        user_id: u64,
        jti: &str,
        _expires_at: i64,
    ) -> Result<(), StoreError> {
        self.lock()?.refresh_tokens.push(RefreshToken {
            user_id,
            jti: jti.to_string(),
            revoked: false,
        });
        Ok(())
    }

    async fn consume_refresh_token(&self, user_id: u64, jti: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state
            .refresh_tokens
            .iter_mut()
            .find(|t| t.jti == jti && t.user_id == user_id && !t.revoked)
        {
            Some(token) => {
                token.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_refresh_token(&self, jti: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        for token in state.refresh_tokens.iter_mut().filter(|t| t.jti == jti) {
            token.revoked = true;
        }
        Ok(())
    }

    async fn register_company(
        &self,
        name: &str,
        admin: &NewUser,
    ) -> Result<CompanyId, StoreError> {
        let mut state = self.lock()?;
        if state.users.iter().any(|u| u.email == admin.email) {
            return Err(StoreError::Duplicate("Email already taken".to_string()));
        }
        let id = CompanyId(state.companies.iter().map(|c| c.id.0).max().unwrap_or(0) + 1);
        state.companies.push(Company {
            id,
            name: name.to_string(),
            active: true,
            allowed_ip: None,
            allowed_cidr: None,
            created_at: Utc::now(),
        });
        state.push_user(id, admin)?;
        Ok(id)
    }
}

