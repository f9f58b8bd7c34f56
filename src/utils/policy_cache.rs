use std::net::IpAddr;
use std::time::Duration;

use moka::future::Cache;

use crate::auth::network::NetworkPolicy;
use crate::model::company::CompanyId;
use crate::store::{EventStore, StoreError};

/// Network policies per company, so clocking does not read the company row
/// on every request.
#[derive(Clone)]
pub struct PolicyCache {
    cache: Cache<CompanyId, NetworkPolicy>,
}

impl PolicyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn policy(
        &self,
        store: &dyn EventStore,
        company: CompanyId,
    ) -> Result<NetworkPolicy, StoreError> {
        if let Some(policy) = self.cache.get(&company).await {
            return Ok(policy);
        }
        let policy = match store.company(company).await? {
            Some(found) => NetworkPolicy::from_company(&found),
            // unknown tenant: nothing matches
            None => NetworkPolicy::Restricted { ip: None, net: None },
        };
        self.cache.insert(company, policy.clone()).await;
        Ok(policy)
    }

    pub async fn permits(
        &self,
        store: &dyn EventStore,
        company: CompanyId,
        client: Option<IpAddr>,
    ) -> Result<bool, StoreError> {
        Ok(self.policy(store, company).await?.permits(client))
    }

    /// Call after the company's IP settings change.
    pub async fn invalidate(&self, company: CompanyId) {
        self.cache.invalidate(&company).await;
    }
}

impl Default for PolicyCache {
    fn default() -> Self {
        PolicyCache::new(Duration::from_secs(300))
    }
}
