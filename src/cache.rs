use crate::error::Error;
use crate::storage::{keys, Store};
use crate::types::{ListIdentity, MatchRecord};
use metrics::counter;
use std::time::Duration;
use tracing::debug;

/// Confirmed full-hash matches, keyed by (list, full hash) and expiring
/// with the server-advertised cache duration. Expiry is lazy: an expired
/// entry simply reads as absent.
#[derive(Clone)]
pub struct FullHashCache<S> {
    store: S,
    ns: String,
}

impl<S: Store> FullHashCache<S> {
    pub fn new(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            ns: namespace.into(),
        }
    }

    pub async fn lookup(
        &self,
        list: &ListIdentity,
        full_hash_b64: &str,
    ) -> Result<Option<MatchRecord>, Error> {
        let key = keys::full_hash(&self.ns, &list.code(), full_hash_b64);
        match self.store.get(&key).await? {
            Some(payload) => {
                let record: MatchRecord = serde_json::from_str(&payload)?;
                counter!("safebrowse_full_hash_cache_hits_total").increment(1);
                debug!(list = %list.code(), "full hash cache hit");
                Ok(Some(record))
            }
            None => {
                counter!("safebrowse_full_hash_cache_misses_total").increment(1);
                Ok(None)
            }
        }
    }

    pub async fn store(&self, record: &MatchRecord, ttl: Duration) -> Result<(), Error> {
        let key = keys::full_hash(
            &self.ns,
            &record.list_identity().code(),
            &record.threat_hash,
        );
        let payload = serde_json::to_string(record)?;
        self.store.set_with_ttl(&key, &payload, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{PlatformType, ThreatEntryType, ThreatType};

    fn record() -> MatchRecord {
        MatchRecord {
            threat_type: ThreatType::SocialEngineering,
            platform_type: PlatformType::AnyPlatform,
            threat_entry_type: ThreatEntryType::Url,
            threat_hash: "c29tZWZ1bGxoYXNo".to_string(),
            client_state: "state-7".to_string(),
            cache_duration_secs: 300,
        }
    }

    #[test]
    fn confirmed_matches_round_trip() {
        tokio_test::block_on(async {
            let cache = FullHashCache::new(MemoryStore::new(), "test");
            let record = record();
            cache
                .store(&record, Duration::from_secs(record.cache_duration_secs))
                .await
                .unwrap();

            let found = cache
                .lookup(&record.list_identity(), &record.threat_hash)
                .await
                .unwrap();
            assert_eq!(found, Some(record));
        });
    }

    #[test]
    fn expired_entries_read_as_absent() {
        tokio_test::block_on(async {
            let cache = FullHashCache::new(MemoryStore::new(), "test");
            let record = record();
            cache.store(&record, Duration::ZERO).await.unwrap();
            let found = cache
                .lookup(&record.list_identity(), &record.threat_hash)
                .await
                .unwrap();
            assert_eq!(found, None);
        });
    }

    #[test]
    fn unknown_hashes_miss() {
        tokio_test::block_on(async {
            let cache = FullHashCache::<MemoryStore>::new(MemoryStore::new(), "test");
            let found = cache
                .lookup(&record().list_identity(), "bm90aGVyZQ==")
                .await
                .unwrap();
            assert_eq!(found, None);
        });
    }
}
