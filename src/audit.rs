//! Audit trail.
//!
//! Handlers write through [`emit`], which never fails the request: a lost
//! entry is logged and counted in [`AUDIT_FAILURES`], which `/audit` exposes.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use derive_more::Display;
use sqlx::MySqlPool;
use tracing::error;

use crate::model::{
    audit_log::{AuditLog, NewAuditEntry},
    company::CompanyId,
};

pub static AUDIT_FAILURES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Display)]
pub enum AuditError {
    #[display(fmt = "audit storage failed: {}", _0)]
    Database(sqlx::Error),
}

impl std::error::Error for AuditError {}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &NewAuditEntry) -> Result<(), AuditError>;

    /// Newest first.
    async fn recent(&self, company: CompanyId, limit: u32) -> Result<Vec<AuditLog>, AuditError>;

    /// Entries per action, ordered by action.
    async fn count_by_action(&self, company: CompanyId) -> Result<Vec<(String, i64)>, AuditError>;
}

#[derive(Debug, Clone)]
pub struct MySqlAuditSink {
    pool: MySqlPool,
}

impl MySqlAuditSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for MySqlAuditSink {
    async fn record(&self, entry: &NewAuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (company_id, user_id, action, entity, description, ip)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.company_id)
        .bind(entry.user_id)
        .bind(entry.action.as_ref())
        .bind(entry.entity.as_ref())
        .bind(&entry.description)
        .bind(entry.ip.as_deref())
        .execute(&self.pool)
        .await
        .map_err(AuditError::Database)?;
        Ok(())
    }

    async fn recent(&self, company: CompanyId, limit: u32) -> Result<Vec<AuditLog>, AuditError> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT id, company_id, user_id, action, entity, description, ip, created_at
            FROM audit_logs
            WHERE company_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(company)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AuditError::Database)
    }

    async fn count_by_action(&self, company: CompanyId) -> Result<Vec<(String, i64)>, AuditError> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT action, COUNT(*) FROM audit_logs WHERE company_id = ? GROUP BY action ORDER BY action",
        )
        .bind(company)
        .fetch_all(&self.pool)
        .await
        .map_err(AuditError::Database)
    }
}

/// Write an entry; on failure log it and count it. The main operation has
/// already happened, so the failure is reported rather than propagated.
pub async fn emit(sink: &dyn AuditSink, entry: NewAuditEntry) {
    if let Err(e) = sink.record(&entry).await {
        let total = AUDIT_FAILURES.fetch_add(1, Ordering::Relaxed) + 1;
        error!(
            error = %e,
            company_id = %entry.company_id,
            action = %entry.action,
            entity = %entry.entity,
            failures = total,
            "Audit entry lost"
        );
    }
}

pub fn failure_count() -> u64 {
    AUDIT_FAILURES.load(Ordering::Relaxed)
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;

    /// Keeps entries in memory; can be told to fail.
    #[derive(Debug, Default)]
    pub struct MemoryAuditSink {
        pub entries: Mutex<Vec<NewAuditEntry>>,
        pub fail: bool,
    }

    #[async_trait]
    impl AuditSink for MemoryAuditSink {
        async fn record(&self, entry: &NewAuditEntry) -> Result<(), AuditError> {
            if self.fail {
                return Err(AuditError::Database(sqlx::Error::PoolClosed));
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn recent(
            &self,
            company: CompanyId,
            limit: u32,
        ) -> Result<Vec<AuditLog>, AuditError> {
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .iter()
                .enumerate()
                .rev()
                .filter(|(_, e)| e.company_id == company)
                .take(limit as usize)
                .map(|(i, e)| AuditLog {
                    id: i as u64 + 1,
                    company_id: e.company_id,
                    user_id: e.user_id,
                    action: e.action.to_string(),
                    entity: e.entity.to_string(),
                    description: Some(e.description.clone()),
                    ip: e.ip.clone(),
                    created_at: Utc::now(),
                })
                .collect())
        }

        async fn count_by_action(
            &self,
            company: CompanyId,
        ) -> Result<Vec<(String, i64)>, AuditError> {
            let entries = self.entries.lock().unwrap();
            let mut counts: Vec<(String, i64)> = Vec::new();
            for entry in entries.iter().filter(|e| e.company_id == company) {
                let action = entry.action.to_string();
                match counts.iter_mut().find(|(a, _)| *a == action) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((action, 1)),
                }
            }
            counts.sort();
            Ok(counts)
        }
    }
}
