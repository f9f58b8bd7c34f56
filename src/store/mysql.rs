use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{debug, error};

use crate::engine::clock::TimeRange;
use crate::engine::error::AttendanceError;
use crate::engine::sequencing::Neighbors;
use crate::model::{
    attendance::{AttendanceEvent, EventId, EventPatch, EventRow, NewEvent},
    company::{Company, CompanyId, CompanySettingsUpdate},
    employee::{Employee, EmployeeId, EmployeePatch, EmployeeSearch, NewEmployee},
    user::{NewUser, User, UserPatch},
};
use crate::models::UserSql;
use crate::store::{
    AccountStore, DirectoryStore, EventFilter, EventStore, NeighborCheck, StoreError,
};
use crate::utils::db_utils::{SqlValue, build_update_sql, execute_update};

const EVENT_COLUMNS: &str = "id, company_id, employee_id, kind, activity, occurred_at";
const EMPLOYEE_COLUMNS: &str = "id, company_id, external_id, last_name, first_name, active";
const USER_COLUMNS: &str =
    "id, company_id, email, password_hash, role, employee_id, active, created_at, last_login_at";

#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn to_events(rows: Vec<EventRow>) -> Result<Vec<AttendanceEvent>, StoreError> {
    rows.into_iter().map(to_event).collect()
}

fn to_event(row: EventRow) -> Result<AttendanceEvent, StoreError> {
    let id = row.id;
    AttendanceEvent::try_from(row)
        .map_err(|e| StoreError::Corrupt(format!("attendance event {}: {}", id, e)))
}

/// Unique-key violations become `Duplicate` with a message for the caller.
fn unique_violation(e: sqlx::Error, message: impl FnOnce() -> String) -> StoreError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Duplicate(message())
        }
        _ => StoreError::Database(e),
    }
}

async fn neighbor(
    conn: &mut sqlx::MySqlConnection,
    candidate: &NewEvent,
    sql: &str,
) -> Result<Option<AttendanceEvent>, StoreError> {
    sqlx::query_as::<_, EventRow>(sql)
        .bind(candidate.company_id)
        .bind(candidate.employee_id)
        .bind(candidate.occurred_at)
        .fetch_optional(conn)
        .await?
        .map(to_event)
        .transpose()
}

#[async_trait]
impl EventStore for MySqlStore {
    async fn company(&self, company: CompanyId) -> Result<Option<Company>, StoreError> {
        let found = sqlx::query_as::<_, Company>(
            r#"
            SELECT id, name, active, allowed_ip, allowed_cidr, created_at
            FROM companies
            WHERE id = ?
            "#,
        )
        .bind(company)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found)
    }

    async fn employee(
        &self,
        company: CompanyId,
        employee: EmployeeId,
    ) -> Result<Option<Employee>, StoreError> {
        let sql = format!(
            "SELECT {} FROM employees WHERE id = ? AND company_id = ?",
            EMPLOYEE_COLUMNS
        );
        let found = sqlx::query_as::<_, Employee>(&sql)
            .bind(employee)
            .bind(company)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found)
    }

    async fn employees(&self, company: CompanyId) -> Result<Vec<Employee>, StoreError> {
        let sql = format!(
            "SELECT {} FROM employees WHERE company_id = ? ORDER BY last_name, first_name, id",
            EMPLOYEE_COLUMNS
        );
        let rows = sqlx::query_as::<_, Employee>(&sql)
            .bind(company)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn events(
        &self,
        company: CompanyId,
        filter: &EventFilter,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        let mut query: QueryBuilder<'_, MySql> = QueryBuilder::new(format!(
            "SELECT {} FROM attendance_events WHERE company_id = ",
            EVENT_COLUMNS
        ));
        query.push_bind(company);

        if let Some(employee) = filter.employee {
            query.push(" AND employee_id = ").push_bind(employee);
        }
        if let Some(range) = filter.range {
            query
                .push(" AND occurred_at >= ")
                .push_bind(range.start)
                .push(" AND occurred_at < ")
                .push_bind(range.end);
        }
        query.push(" ORDER BY occurred_at ASC, id ASC");

        debug!(sql = %query.sql(), %company, "Loading attendance events");

        let rows = query
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await?;
        to_events(rows)
    }

    async fn recent_events(
        &self,
        company: CompanyId,
        limit: u32,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        let sql = format!(
            "SELECT {} FROM attendance_events WHERE company_id = ? \
             ORDER BY occurred_at DESC, id DESC LIMIT ?",
            EVENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(company)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        to_events(rows)
    }

    async fn count_events(&self, company: CompanyId, range: TimeRange) -> Result<u64, StoreError> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM attendance_events
            WHERE company_id = ? AND occurred_at >= ? AND occurred_at < ?
            "#,
        )
        .bind(company)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.max(0) as u64)
    }

    async fn latest_event(
        &self,
        company: CompanyId,
        employee: EmployeeId,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        let sql = format!(
            "SELECT {} FROM attendance_events WHERE company_id = ? AND employee_id = ? \
             ORDER BY occurred_at DESC, id DESC LIMIT 1",
            EVENT_COLUMNS
        );
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(company)
            .bind(employee)
            .fetch_optional(&self.pool)
            .await?
            .map(to_event)
            .transpose()
    }

    async fn latest_per_employee(
        &self,
        company: CompanyId,
    ) -> Result<Vec<AttendanceEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT e.id, e.company_id, e.employee_id, e.kind, e.activity, e.occurred_at
            FROM attendance_events e
            WHERE e.company_id = ?
              AND NOT EXISTS (
                SELECT 1 FROM attendance_events later
                WHERE later.company_id = e.company_id
                  AND later.employee_id = e.employee_id
                  AND (later.occurred_at > e.occurred_at
                       OR (later.occurred_at = e.occurred_at AND later.id > e.id))
              )
            "#,
        )
        .bind(company)
        .fetch_all(&self.pool)
        .await?;
        to_events(rows)
    }

    async fn event(
        &self,
        company: CompanyId,
        id: EventId,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        let sql = format!(
            "SELECT {} FROM attendance_events WHERE id = ? AND company_id = ?",
            EVENT_COLUMNS
        );
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .bind(company)
            .fetch_optional(&self.pool)
            .await?
            .map(to_event)
            .transpose()
    }

    async fn admit(
        &self,
        candidate: NewEvent,
        check: &NeighborCheck,
    ) -> Result<AttendanceEvent, AttendanceError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        // the employee row lock serializes admissions for this employee
        let locked = sqlx::query_scalar::<_, u64>(
            "SELECT id FROM employees WHERE id = ? AND company_id = ? FOR UPDATE",
        )
        .bind(candidate.employee_id)
        .bind(candidate.company_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        if locked.is_none() {
            return Err(AttendanceError::TenantMismatch);
        }

        let predecessor_sql = format!(
            "SELECT {} FROM attendance_events \
             WHERE company_id = ? AND employee_id = ? AND occurred_at < ? \
             ORDER BY occurred_at DESC, id DESC LIMIT 1",
            EVENT_COLUMNS
        );
        let successor_sql = format!(
            "SELECT {} FROM attendance_events \
             WHERE company_id = ? AND employee_id = ? AND occurred_at >= ? \
             ORDER BY occurred_at ASC, id ASC LIMIT 1",
            EVENT_COLUMNS
        );
        let neighbors = Neighbors {
            predecessor: neighbor(&mut *tx, &candidate, &predecessor_sql).await?,
            successor: neighbor(&mut *tx, &candidate, &successor_sql).await?,
        };

        // dropping `tx` on rejection rolls back and releases the lock
        check(&neighbors)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO attendance_events (company_id, employee_id, kind, activity, occurred_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(candidate.company_id)
        .bind(candidate.employee_id)
        .bind(candidate.kind.as_ref())
        .bind(candidate.activity.as_deref())
        .bind(candidate.occurred_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, employee_id = %candidate.employee_id, "Attendance insert failed");
            StoreError::from(e)
        })?;

        tx.commit().await.map_err(StoreError::from)?;

        Ok(candidate.into_event(EventId(inserted.last_insert_id())))
    }

    async fn update_event(
        &self,
        company: CompanyId,
        id: EventId,
        patch: &EventPatch,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        sqlx::query(
            r#"
            UPDATE attendance_events
            SET kind = ?, activity = ?, occurred_at = ?
            WHERE id = ? AND company_id = ?
            "#,
        )
        .bind(patch.kind.as_ref())
        .bind(patch.activity.as_deref())
        .bind(patch.occurred_at)
        .bind(id)
        .bind(company)
        .execute(&self.pool)
        .await?;

        // rows_affected is 0 for unchanged rows on MySQL, so re-read instead
        self.event(company, id).await
    }

    async fn delete_event(
        &self,
        company: CompanyId,
        id: EventId,
    ) -> Result<Option<AttendanceEvent>, StoreError> {
        let Some(existing) = self.event(company, id).await? else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM attendance_events WHERE id = ? AND company_id = ?")
            .bind(id)
            .bind(company)
            .execute(&self.pool)
            .await?;
        Ok(Some(existing))
    }
}

#[async_trait]
impl DirectoryStore for MySqlStore {
    async fn employee_page(
        &self,
        company: CompanyId,
        search: &EmployeeSearch,
    ) -> Result<(Vec<Employee>, i64), StoreError> {
        // ---------- build WHERE clause dynamically ----------
        let mut conditions = vec!["company_id = ?"];
        let mut bindings = vec![SqlValue::U64(company.0)];

        if let Some(active) = search.active {
            conditions.push("active = ?");
            bindings.push(SqlValue::Bool(active));
        }

        if let Some(text) = search.text.as_deref() {
            conditions.push("(first_name LIKE ? OR last_name LIKE ? OR external_id LIKE ?)");
            let like = format!("%{}%", text);
            bindings.push(SqlValue::String(like.clone()));
            bindings.push(SqlValue::String(like.clone()));
            bindings.push(SqlValue::String(like));
        }

        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        // ---------- total count ----------
        let count_sql = format!("SELECT COUNT(*) as total FROM employees {}", where_clause);
        debug!(sql = %count_sql, bindings = ?bindings, "Counting employees");

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for b in &bindings {
            count_query = match b {
                SqlValue::String(v) => count_query.bind(v.clone()),
                SqlValue::U64(v) => count_query.bind(*v),
                SqlValue::Bool(v) => count_query.bind(*v),
            };
        }

        let total = count_query.fetch_one(&self.pool).await.map_err(|e| {
            error!(error = %e, sql = %count_sql, "Failed to count employees");
            StoreError::from(e)
        })?;

        // ---------- data query ----------
        let data_sql = format!(
            "SELECT {} FROM employees {} ORDER BY last_name, first_name, id LIMIT ? OFFSET ?",
            EMPLOYEE_COLUMNS, where_clause
        );
        debug!(sql = %data_sql, bindings = ?bindings, limit = search.limit, offset = search.offset, "Fetching employees");

        let mut data_query = sqlx::query_as::<_, Employee>(&data_sql);
        for b in &bindings {
            data_query = match b {
                SqlValue::String(v) => data_query.bind(v.clone()),
                SqlValue::U64(v) => data_query.bind(*v),
                SqlValue::Bool(v) => data_query.bind(*v),
            };
        }
        data_query = data_query
            .bind(search.limit as i64)
            .bind(search.offset as i64);

        let employees = data_query.fetch_all(&self.pool).await.map_err(|e| {
            error!(error = %e, sql = %data_sql, "Failed to fetch employees");
            StoreError::from(e)
        })?;

        Ok((employees, total))
    }

    async fn insert_employee(
        &self,
        company: CompanyId,
        employee: &NewEmployee,
    ) -> Result<Employee, StoreError> {
        let done = sqlx::query(
            r#"
            INSERT INTO employees (company_id, external_id, last_name, first_name, active)
            VALUES (?, ?, ?, ?, TRUE)
            "#,
        )
        .bind(company)
        .bind(&employee.external_id)
        .bind(&employee.last_name)
        .bind(&employee.first_name)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                format!(
                    "An employee with external id {} already exists",
                    employee.external_id
                )
            })
        })?;

        let id = EmployeeId(done.last_insert_id());
        self.employee(company, id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("employee {} missing after insert", id)))
    }

    async fn update_employee(
        &self,
        company: CompanyId,
        id: EmployeeId,
        patch: &EmployeePatch,
    ) -> Result<Option<Employee>, StoreError> {
        let columns = [
            ("external_id", &patch.external_id),
            ("last_name", &patch.last_name),
            ("first_name", &patch.first_name),
        ];
        let fields: Vec<(&'static str, SqlValue)> = columns
            .into_iter()
            .filter_map(|(column, value)| {
                value.as_ref().map(|v| (column, SqlValue::String(v.clone())))
            })
            .collect();

        if !fields.is_empty() {
            let update = build_update_sql("employees", fields, company, id.0);
            execute_update(&self.pool, update).await.map_err(|e| {
                unique_violation(e, || "Another employee already uses that external id".to_string())
            })?;
        }

        self.employee(company, id).await
    }

    async fn toggle_employee(
        &self,
        company: CompanyId,
        id: EmployeeId,
    ) -> Result<Option<Employee>, StoreError> {
        sqlx::query("UPDATE employees SET active = NOT active WHERE id = ? AND company_id = ?")
            .bind(id)
            .bind(company)
            .execute(&self.pool)
            .await?;
        self.employee(company, id).await
    }

    async fn update_company(
        &self,
        company: CompanyId,
        settings: &CompanySettingsUpdate,
    ) -> Result<Option<Company>, StoreError> {
        sqlx::query(
            "UPDATE companies SET name = ?, allowed_ip = ?, allowed_cidr = ? WHERE id = ?",
        )
        .bind(&settings.name)
        .bind(settings.allowed_ip.as_deref())
        .bind(settings.allowed_cidr.as_deref())
        .bind(company)
        .execute(&self.pool)
        .await?;
        self.company(company).await
    }
}

#[async_trait]
impl AccountStore for MySqlStore {
    async fn users(&self, company: CompanyId) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users WHERE company_id = ? ORDER BY email",
            USER_COLUMNS
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(company)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn user(&self, company: CompanyId, id: u64) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = ? AND company_id = ?",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(company)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn credentials(&self, email: &str) -> Result<Option<UserSql>, StoreError> {
        let found = sqlx::query_as::<_, UserSql>(
            r#"
            SELECT u.id, u.company_id, u.email, u.password_hash, u.role, u.employee_id,
                   u.active, c.active AS company_active
            FROM users u
            JOIN companies c ON c.id = u.company_id
            WHERE u.email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found)
    }

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_user(&self, company: CompanyId, user: &NewUser) -> Result<User, StoreError> {
        let done = sqlx::query(
            r#"
            INSERT INTO users (company_id, email, password_hash, role, employee_id, active)
            VALUES (?, ?, ?, ?, ?, TRUE)
            "#,
        )
        .bind(company)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_ref())
        .bind(user.employee_id)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || "Email already registered".to_string()))?;

        let id = done.last_insert_id();
        self.user(company, id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("user {} missing after insert", id)))
    }

    async fn update_user(
        &self,
        company: CompanyId,
        id: u64,
        patch: &UserPatch,
    ) -> Result<Option<User>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET role = ?, employee_id = ?, password_hash = COALESCE(?, password_hash)
            WHERE id = ? AND company_id = ?
            "#,
        )
        .bind(patch.role.as_ref())
        .bind(patch.employee_id)
        .bind(patch.password_hash.as_deref())
        .bind(id)
        .bind(company)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() > 0 {
            sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.user(company, id).await
    }

    async fn toggle_user(&self, company: CompanyId, id: u64) -> Result<Option<User>, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET active = NOT active WHERE id = ? AND company_id = ?")
            .bind(id)
            .bind(company)
            .execute(&mut *tx)
            .await?;

        // outstanding refresh tokens die with the account
        sqlx::query(
            r#"
            UPDATE refresh_tokens t JOIN users u ON u.id = t.user_id
            SET t.revoked = TRUE
            WHERE u.id = ? AND u.company_id = ? AND u.active = FALSE
            "#,
        )
        .bind(id)
        .bind(company)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.user(company, id).await
    }

    async fn touch_login(&self, user_id: u64) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = UTC_TIMESTAMP() WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn account_active(&self, user_id: u64) -> Result<bool, StoreError> {
        let active = sqlx::query_as::<_, (bool, bool)>(
            r#"
            SELECT u.active, c.active
            FROM users u JOIN companies c ON c.id = u.company_id
            WHERE u.id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .is_some_and(|(user_active, company_active)| user_active && company_active);
        Ok(active)
    }

    async fn store_refresh_token(
        &self,
        user_id: u64,
        jti: &str,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, jti, expires_at)
            VALUES (?, ?, FROM_UNIXTIME(?))
            "#,
        )
        .bind(user_id)
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_refresh_token(&self, user_id: u64, jti: &str) -> Result<bool, StoreError> {
        let done = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND user_id = ? AND revoked = FALSE",
        )
        .bind(jti)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn revoke_refresh_token(&self, jti: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn register_company(
        &self,
        name: &str,
        admin: &NewUser,
    ) -> Result<CompanyId, StoreError> {
        let mut tx = self.pool.begin().await?;

        let company_id = sqlx::query("INSERT INTO companies (name, active) VALUES (?, TRUE)")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .last_insert_id();

        sqlx::query(
            r#"
            INSERT INTO users (company_id, email, password_hash, role, active)
            VALUES (?, ?, ?, ?, TRUE)
            "#,
        )
        .bind(company_id)
        .bind(&admin.email)
        .bind(&admin.password_hash)
        .bind(admin.role.as_ref())
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, || "Email already taken".to_string()))?;

        tx.commit().await?;
        Ok(CompanyId(company_id))
    }
}

