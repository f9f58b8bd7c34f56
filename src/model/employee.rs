use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::company::CompanyId;

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
pub struct EmployeeId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "company_id": 1,
        "external_id": "30111222",
        "last_name": "Gomez",
        "first_name": "Ana",
        "active": true
    })
)]
pub struct Employee {
    #[schema(value_type = u64, example = 1)]
    pub id: EmployeeId,

    #[schema(value_type = u64, example = 1)]
    pub company_id: CompanyId,

    /// National ID or any other identifier unique inside the company
    #[schema(example = "30111222")]
    pub external_id: String,

    #[schema(example = "Gomez")]
    pub last_name: String,

    #[schema(example = "Ana")]
    pub first_name: String,

    pub active: bool,
}

impl Employee {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

/// Employee to insert. Fields are already trimmed and non-empty.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub external_id: String,
    pub last_name: String,
    pub first_name: String,
}

/// Partial update; `None` leaves the column as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, ToSchema)]
pub struct EmployeePatch {
    #[schema(example = "30111222")]
    pub external_id: Option<String>,
    #[schema(example = "Gomez")]
    pub last_name: Option<String>,
    #[schema(example = "Ana")]
    pub first_name: Option<String>,
}

impl EmployeePatch {
    pub fn is_empty(&self) -> bool {
        self.external_id.is_none() && self.last_name.is_none() && self.first_name.is_none()
    }
}

/// Filter and page of an employee listing.
#[derive(Debug, Clone, Default)]
pub struct EmployeeSearch {
    pub active: Option<bool>,
    /// Matched against names and external id
    pub text: Option<String>,
    pub limit: u32,
    pub offset: u32,
}
