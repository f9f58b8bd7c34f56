use serde_json::Value;
use sqlx::MySqlPool;

use crate::model::company::CompanyId;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    Bool(bool),
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Read text columns out of a JSON patch
/// ===============================
///
/// Only keys listed in `allowed` may appear, and each must hold a string
/// that is not blank. Values come back trimmed.
pub fn text_fields(
    payload: &Value,
    allowed: &[&'static str],
) -> Result<Vec<(&'static str, String)>, String> {
    let obj = payload
        .as_object()
        .ok_or_else(|| "Payload must be a JSON object".to_string())?;

    if obj.is_empty() {
        return Err("No fields provided for update".to_string());
    }

    let mut fields = Vec::with_capacity(obj.len());
    for (key, value) in obj {
        let column = allowed
            .iter()
            .copied()
            .find(|c| *c == key.as_str())
            .ok_or_else(|| format!("Field '{}' cannot be updated", key))?;

        let text = match value {
            Value::String(s) => s.trim(),
            Value::Null => return Err(format!("'{}' cannot be null", key)),
            _ => return Err(format!("'{}' must be a string", key)),
        };
        if text.is_empty() {
            return Err(format!("'{}' cannot be blank", key));
        }
        fields.push((column, text.to_string()));
    }
    Ok(fields)
}

/// ===============================
/// Build a tenant-scoped partial UPDATE
/// ===============================
///
/// The row is matched by id AND company, so an id of another company
/// updates nothing. Column names must come from a fixed list.
pub fn build_update_sql(
    table: &str,
    fields: Vec<(&'static str, SqlValue)>,
    company: CompanyId,
    id: u64,
) -> SqlUpdate {
    // Build SET clause
    let set_clause = fields
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ? AND company_id = ?",
        table, set_clause
    );

    let mut values: Vec<SqlValue> = fields.into_iter().map(|(_, value)| value).collect();
    values.push(SqlValue::U64(id));
    values.push(SqlValue::U64(company.0));

    SqlUpdate { sql, values }
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}
