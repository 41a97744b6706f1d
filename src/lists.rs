use crate::error::Error;
use crate::storage::{keys, Batch, Store};
use crate::types::{ListIdentity, ListUpdateResponse, ResponseType};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, warn};

const TOMBSTONE: &str = "DELETED";
const MIN_PREFIX_BYTES: usize = 4;
const MAX_PREFIX_BYTES: usize = 32;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateStats {
    pub added: usize,
    pub removed: usize,
}

/// Per-list replica state: a membership set and an insertion-ordered
/// sequence of the same prefixes, plus the opaque version token the server
/// hands out. The sequence exists because the update protocol expresses
/// removals as indices into it.
#[derive(Clone)]
pub struct ThreatListStore<S> {
    store: S,
    ns: String,
}

impl<S: Store> ThreatListStore<S> {
    pub fn new(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            ns: namespace.into(),
        }
    }

    pub async fn state(&self, list: &ListIdentity) -> Result<Option<String>, Error> {
        self.store
            .get(&keys::list_state(&self.ns, &list.code()))
            .await
    }

    /// Drops the version token so the next sync requests full state.
    pub async fn clear_state(&self, list: &ListIdentity) -> Result<(), Error> {
        self.store
            .del(&keys::list_state(&self.ns, &list.code()))
            .await
    }

    pub async fn prefix_exists(&self, list: &ListIdentity, prefix_b64: &str) -> Result<bool, Error> {
        self.store
            .set_is_member(&keys::prefix_set(&self.ns, &list.code()), prefix_b64)
            .await
    }

    /// Set and sequence cardinality; equal outside of a mid-batch window.
    pub async fn prefix_count(&self, list: &ListIdentity) -> Result<(usize, usize), Error> {
        let code = list.code();
        let set_len = self.store.set_len(&keys::prefix_set(&self.ns, &code)).await?;
        let seq_len = self
            .store
            .list_len(&keys::prefix_list(&self.ns, &code))
            .await?;
        Ok((set_len, seq_len))
    }

    /// Lists that currently hold any prefixes, discovered from the stored
    /// set keys so matching only scans populated lists.
    pub async fn tracked_lists(&self) -> Result<Vec<ListIdentity>, Error> {
        let found = self
            .store
            .keys(&keys::prefix_set_pattern(&self.ns))
            .await?;
        let mut lists = Vec::with_capacity(found.len());
        for key in found {
            match keys::code_from_prefix_set(&key).and_then(ListIdentity::from_code) {
                Some(list) => lists.push(list),
                None => warn!(key = %key, "ignoring unrecognized prefix set key"),
            }
        }
        lists.sort_by_key(|list| list.code());
        Ok(lists)
    }

    /// Applies one per-list diff as a single atomic batch: optional full
    /// reset, removals (strictly descending), additions, then the new
    /// version token.
    pub async fn apply_update(
        &self,
        list: &ListIdentity,
        update: &ListUpdateResponse,
    ) -> Result<UpdateStats, Error> {
        let code = list.code();
        let set_key = keys::prefix_set(&self.ns, &code);
        let list_key = keys::prefix_list(&self.ns, &code);

        let full = update.response_type == ResponseType::FullUpdate;
        let mut batch = Batch::new();
        if full {
            batch.del(&set_key);
            batch.del(&list_key);
        }

        let mut stats = UpdateStats::default();

        let mut indices: Vec<usize> = update
            .removals
            .iter()
            .filter_map(|set| set.raw_indices.as_ref())
            .flat_map(|raw| raw.indices.iter().copied())
            .collect();
        if full && !indices.is_empty() {
            warn!(list = %code, "full update carried removal indices, ignoring them");
            indices.clear();
        }
        if !indices.is_empty() {
            let len = self.store.list_len(&list_key).await?;
            // Descending order, because removing a slot shifts every higher
            // index. Each tombstoned slot is dropped before the next index
            // is touched.
            indices.sort_unstable_by(|a, b| b.cmp(a));
            indices.dedup();
            for &index in &indices {
                if index >= len {
                    return Err(Error::Desync {
                        list: code.clone(),
                        index,
                    });
                }
                let prefix = self
                    .store
                    .list_index(&list_key, index)
                    .await?
                    .ok_or(Error::Desync {
                        list: code.clone(),
                        index,
                    })?;
                batch.list_set(&list_key, index, TOMBSTONE);
                batch.list_remove_value(&list_key, TOMBSTONE);
                batch.set_remove(&set_key, &prefix);
                stats.removed += 1;
            }
        }

        for addition in &update.additions {
            let Some(raw) = &addition.raw_hashes else {
                continue;
            };
            if !(MIN_PREFIX_BYTES..=MAX_PREFIX_BYTES).contains(&raw.prefix_size) {
                return Err(Error::Protocol(format!(
                    "list {code} addition has invalid prefix size {}",
                    raw.prefix_size
                )));
            }
            let bytes = BASE64.decode(&raw.raw_hashes).map_err(|e| {
                Error::Protocol(format!("list {code} addition payload is not base64: {e}"))
            })?;
            if bytes.len() % raw.prefix_size != 0 {
                return Err(Error::Protocol(format!(
                    "list {code} addition payload length {} is not a multiple of prefix size {}",
                    bytes.len(),
                    raw.prefix_size
                )));
            }
            for chunk in bytes.chunks(raw.prefix_size) {
                let prefix = BASE64.encode(chunk);
                batch.set_add(&set_key, &prefix);
                batch.list_push(&list_key, &prefix);
                stats.added += 1;
            }
        }

        batch.set(&keys::list_state(&self.ns, &code), &update.new_client_state);
        self.store.execute(batch).await?;
        debug!(
            list = %code,
            added = stats.added,
            removed = stats.removed,
            full,
            "applied list update"
        );
        Ok(stats)
    }
}
