use std::sync::{PoisonError, RwLock};

use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;

use crate::store::AccountStore;

/// Expected capacity and false-positive rate.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static EMAIL_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

#[inline]
pub fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check if an email might be registered (false positives possible)
pub fn might_exist(email: &str) -> bool {
    let email = normalize(email);
    EMAIL_FILTER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&email)
}

/// Insert a single email into the filter
pub fn insert(email: &str) {
    let email = normalize(email);
    EMAIL_FILTER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .add(&email);
}

/// true  => email AVAILABLE
/// false => email TAKEN (or the lookup failed)
pub async fn is_email_available(email: &str, accounts: &dyn AccountStore) -> bool {
    // Cuckoo filter: a miss is definitive
    if !might_exist(email) {
        return true;
    }

    let exists = accounts
        .email_taken(&normalize(email))
        .await
        .unwrap_or(true); // fail-safe

    !exists
}

/// Warm up the email filter using streaming + batching
pub async fn warmup_email_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>("SELECT email FROM users").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (email,) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(normalize(&email));
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!("Email filter warmup complete: {} users", total);
    Ok(())
}

/// Insert a batch of normalized emails
fn insert_batch(emails: &[String]) {
    let mut filter = EMAIL_FILTER.write().unwrap_or_else(PoisonError::into_inner);

    for email in emails {
        filter.add(email);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_emails_are_found_case_insensitively() {
        insert("Filter.Test@Acme.com");
        assert!(might_exist("filter.test@acme.com "));
    }

    #[test]
    fn normalizes_before_lookup() {
        assert_eq!(normalize("  Ana@ACME.com"), "ana@acme.com");
    }
}
