use crate::api::ThreatApi;
use crate::cache::FullHashCache;
use crate::canonical::canonicalize;
use crate::error::Error;
use crate::expression::lookup_expressions;
use crate::hashes::{hash_expression, HashedExpression};
use crate::lists::ThreatListStore;
use crate::storage::Store;
use crate::types::{
    parse_protocol_duration, ClientInfo, FindFullHashesRequest, ListIdentity, MatchRecord,
    ThreatEntry, ThreatInfo,
};
use metrics::counter;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

/// Cache TTL applied when a match response carries no cache duration.
const DEFAULT_CACHE_SECS: u64 = 300;

/// A local prefix-set hit: not yet a confirmed threat.
struct PartialMatch {
    list: ListIdentity,
    hashed: HashedExpression,
    state: String,
}

/// Two-phase lookup pipeline: local prefix matching, then full-hash
/// confirmation through the cache or one batched remote call. Reads list
/// state, never writes it; its only side effect is populating the
/// full-hash cache.
pub struct Matcher<S, A> {
    lists: ThreatListStore<S>,
    cache: FullHashCache<S>,
    api: A,
    client: ClientInfo,
    prefix_bytes: usize,
}

impl<S: Store + Clone, A: ThreatApi> Matcher<S, A> {
    pub fn new(
        store: S,
        api: A,
        client: ClientInfo,
        namespace: impl Into<String>,
        prefix_bytes: usize,
    ) -> Self {
        let ns = namespace.into();
        Self {
            lists: ThreatListStore::new(store.clone(), ns.clone()),
            cache: FullHashCache::new(store, ns),
            api,
            client,
            prefix_bytes,
        }
    }

    pub async fn check(&self, url: &str) -> Result<Vec<MatchRecord>, Error> {
        counter!("safebrowse_checks_total").increment(1);

        // stage 1: canonical form, lookup expressions, hashed prefixes
        let canonical = canonicalize(url)?;
        let mut hashed = Vec::new();
        let mut seen = HashSet::new();
        for expression in lookup_expressions(&canonical) {
            let h = hash_expression(&expression, self.prefix_bytes);
            if seen.insert(h.full) {
                hashed.push(h);
            }
        }

        // stage 2: prefix membership across every populated list
        let tracked = self.lists.tracked_lists().await?;
        let mut partial = Vec::new();
        for h in &hashed {
            let prefix = h.prefix_b64();
            for list in &tracked {
                if self.lists.prefix_exists(list, &prefix).await? {
                    let state = self.lists.state(list).await?.unwrap_or_default();
                    partial.push(PartialMatch {
                        list: *list,
                        hashed: h.clone(),
                        state,
                    });
                }
            }
        }
        if partial.is_empty() {
            return Ok(Vec::new());
        }
        counter!("safebrowse_partial_matches_total").increment(partial.len() as u64);
        debug!(url, candidates = partial.len(), "prefix hits, resolving full hashes");

        // stage 3: previously confirmed matches come straight from the cache
        let mut confirmed = Vec::new();
        let mut outstanding = Vec::new();
        for pm in partial {
            match self.cache.lookup(&pm.list, &pm.hashed.full_b64()).await? {
                Some(record) => confirmed.push(record),
                None => outstanding.push(pm),
            }
        }

        // stage 4: one batched verification call for everything left
        if !outstanding.is_empty() {
            confirmed.extend(self.resolve_remote(&outstanding).await?);
        }
        Ok(confirmed)
    }

    async fn resolve_remote(
        &self,
        outstanding: &[PartialMatch],
    ) -> Result<Vec<MatchRecord>, Error> {
        let request = self.build_find_request(outstanding);
        let response = self.api.find_full_hashes(&request).await?;

        let mut states: HashMap<ListIdentity, String> = HashMap::new();
        let mut expected: HashSet<String> = HashSet::new();
        for pm in outstanding {
            states.insert(pm.list, pm.state.clone());
            expected.insert(pm.hashed.full_b64());
        }

        let mut confirmed = Vec::new();
        for threat_match in &response.matches {
            // only accept hashes we derived ourselves; anything else is an
            // answer to a question we never asked
            if !expected.contains(&threat_match.threat.hash) {
                warn!(
                    hash = %threat_match.threat.hash,
                    "discarding full hash unrelated to any outstanding prefix"
                );
                continue;
            }
            let list = ListIdentity::new(
                threat_match.threat_type,
                threat_match.platform_type,
                threat_match.threat_entry_type,
            );
            let cache_secs = threat_match
                .cache_duration
                .as_deref()
                .and_then(parse_protocol_duration)
                .map(|secs| secs.ceil() as u64)
                .unwrap_or(DEFAULT_CACHE_SECS);
            let record = MatchRecord {
                threat_type: threat_match.threat_type,
                platform_type: threat_match.platform_type,
                threat_entry_type: threat_match.threat_entry_type,
                threat_hash: threat_match.threat.hash.clone(),
                client_state: states.get(&list).cloned().unwrap_or_default(),
                cache_duration_secs: cache_secs,
            };
            self.cache
                .store(&record, Duration::from_secs(cache_secs))
                .await?;
            confirmed.push(record);
        }
        Ok(confirmed)
    }

    /// One request covering every outstanding partial match: distinct
    /// threat/platform/entry types and client states, all prefixes.
    fn build_find_request(&self, outstanding: &[PartialMatch]) -> FindFullHashesRequest {
        let mut threat_types = Vec::new();
        let mut platform_types = Vec::new();
        let mut threat_entry_types = Vec::new();
        let mut client_states = Vec::new();
        let mut threat_entries = Vec::new();
        let mut seen_prefixes = HashSet::new();
        for pm in outstanding {
            if !threat_types.contains(&pm.list.threat_type) {
                threat_types.push(pm.list.threat_type);
            }
            if !platform_types.contains(&pm.list.platform_type) {
                platform_types.push(pm.list.platform_type);
            }
            if !threat_entry_types.contains(&pm.list.threat_entry_type) {
                threat_entry_types.push(pm.list.threat_entry_type);
            }
            if !client_states.contains(&pm.state) {
                client_states.push(pm.state.clone());
            }
            let prefix = pm.hashed.prefix_b64();
            if seen_prefixes.insert(prefix.clone()) {
                threat_entries.push(ThreatEntry { hash: prefix });
            }
        }
        FindFullHashesRequest {
            client: self.client.clone(),
            client_states,
            threat_info: ThreatInfo {
                threat_types,
                platform_types,
                threat_entry_types,
                threat_entries,
            },
        }
    }
}
