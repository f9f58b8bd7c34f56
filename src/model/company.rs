use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Tenant identifier. Every scoped query takes one of these first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    sqlx::Type,
    ToSchema,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct CompanyId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "name": "Acme SRL",
        "active": true,
        "allowed_ip": "200.45.10.3",
        "allowed_cidr": "192.168.0.0/24",
        "created_at": "2026-01-01T00:00:00Z"
    })
)]
pub struct Company {
    #[schema(value_type = u64, example = 1)]
    pub id: CompanyId,

    #[schema(example = "Acme SRL")]
    pub name: String,

    pub active: bool,

    /// Single public IP allowed to clock in, if configured
    #[schema(example = "200.45.10.3", nullable = true)]
    pub allowed_ip: Option<String>,

    /// CIDR range allowed to clock in, if configured
    #[schema(example = "192.168.0.0/24", nullable = true)]
    pub allowed_cidr: Option<String>,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn restricts_network(&self) -> bool {
        self.allowed_ip.is_some() || self.allowed_cidr.is_some()
    }
}

/// Name and canonical network allow-list of a company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanySettingsUpdate {
    pub name: String,
    pub allowed_ip: Option<String>,
    pub allowed_cidr: Option<String>,
}
