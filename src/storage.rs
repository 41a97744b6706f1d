use crate::error::Error;
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Key layout for everything the engine persists. Keys are namespaced per
/// list by its numeric code and must stay stable across restarts so the
/// deadline and list states survive a process restart.
pub mod keys {
    pub fn next_update(ns: &str) -> String {
        format!("{ns}:nextupdate")
    }

    pub fn list_state(ns: &str, code: &str) -> String {
        format!("{ns}:{code}:state")
    }

    pub fn prefix_set(ns: &str, code: &str) -> String {
        format!("{ns}:{code}:prefixes:set")
    }

    pub fn prefix_list(ns: &str, code: &str) -> String {
        format!("{ns}:{code}:prefixes:list")
    }

    pub fn full_hash(ns: &str, code: &str, hash_b64: &str) -> String {
        format!("{ns}:{code}:hash:{hash_b64}")
    }

    pub fn prefix_set_pattern(ns: &str) -> String {
        format!("{ns}:*:prefixes:set")
    }

    pub fn code_from_prefix_set(key: &str) -> Option<&str> {
        key.strip_suffix(":prefixes:set")?.rsplit(':').next()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BatchOp {
    Del(String),
    Set { key: String, value: String },
    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
    ListSet { key: String, index: usize, value: String },
    ListRemoveValue { key: String, value: String },
    ListPush { key: String, value: String },
}

/// An ordered group of mutations applied atomically by [`Store::execute`].
#[derive(Debug, Default, Clone)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn del(&mut self, key: &str) -> &mut Self {
        self.ops.push(BatchOp::Del(key.to_string()));
        self
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.ops.push(BatchOp::Set {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn set_add(&mut self, key: &str, member: &str) -> &mut Self {
        self.ops.push(BatchOp::SetAdd {
            key: key.to_string(),
            member: member.to_string(),
        });
        self
    }

    pub fn set_remove(&mut self, key: &str, member: &str) -> &mut Self {
        self.ops.push(BatchOp::SetRemove {
            key: key.to_string(),
            member: member.to_string(),
        });
        self
    }

    pub fn list_set(&mut self, key: &str, index: usize, value: &str) -> &mut Self {
        self.ops.push(BatchOp::ListSet {
            key: key.to_string(),
            index,
            value: value.to_string(),
        });
        self
    }

    pub fn list_remove_value(&mut self, key: &str, value: &str) -> &mut Self {
        self.ops.push(BatchOp::ListRemoveValue {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn list_push(&mut self, key: &str, value: &str) -> &mut Self {
        self.ops.push(BatchOp::ListPush {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }
}

/// The backing store the engine runs against: scalars with optional
/// expiry, sets, index-addressable lists, pattern key scans, and atomic
/// batches. [`RedisStore`] is the production backend; [`MemoryStore`]
/// serves tests and embedders without a Redis deployment.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
    async fn set(&self, key: &str, value: &str) -> Result<(), Error>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error>;
    async fn del(&self, key: &str) -> Result<(), Error>;
    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, Error>;
    async fn set_len(&self, key: &str) -> Result<usize, Error>;
    async fn list_index(&self, key: &str, index: usize) -> Result<Option<String>, Error>;
    async fn list_len(&self, key: &str) -> Result<usize, Error>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error>;
    async fn execute(&self, batch: Batch) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        info!("connected to redis backing store");
        Ok(Self { manager })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut conn = self.manager.clone();
        Ok(conn.get::<_, Option<String>>(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut conn = self.manager.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs();
        if secs == 0 {
            // SETEX rejects a zero expiry; an already-expired value and an
            // absent one are indistinguishable to readers
            conn.del::<_, ()>(key).await?;
            return Ok(());
        }
        conn.set_ex::<_, _, ()>(key, value, secs).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, Error> {
        let mut conn = self.manager.clone();
        Ok(conn.sismember::<_, _, bool>(key, member).await?)
    }

    async fn set_len(&self, key: &str) -> Result<usize, Error> {
        let mut conn = self.manager.clone();
        Ok(conn.scard::<_, usize>(key).await?)
    }

    async fn list_index(&self, key: &str, index: usize) -> Result<Option<String>, Error> {
        let mut conn = self.manager.clone();
        Ok(conn.lindex::<_, Option<String>>(key, index as isize).await?)
    }

    async fn list_len(&self, key: &str) -> Result<usize, Error> {
        let mut conn = self.manager.clone();
        Ok(conn.llen::<_, usize>(key).await?)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let mut conn = self.manager.clone();
        Ok(conn.keys::<_, Vec<String>>(pattern).await?)
    }

    async fn execute(&self, batch: Batch) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &batch.ops {
            match op {
                BatchOp::Del(key) => {
                    pipe.cmd("DEL").arg(key).ignore();
                }
                BatchOp::Set { key, value } => {
                    pipe.cmd("SET").arg(key).arg(value).ignore();
                }
                BatchOp::SetAdd { key, member } => {
                    pipe.cmd("SADD").arg(key).arg(member).ignore();
                }
                BatchOp::SetRemove { key, member } => {
                    pipe.cmd("SREM").arg(key).arg(member).ignore();
                }
                BatchOp::ListSet { key, index, value } => {
                    pipe.cmd("LSET").arg(key).arg(*index as isize).arg(value).ignore();
                }
                BatchOp::ListRemoveValue { key, value } => {
                    pipe.cmd("LREM").arg(key).arg(1).arg(value).ignore();
                }
                BatchOp::ListPush { key, value } => {
                    pipe.cmd("RPUSH").arg(key).arg(value).ignore();
                }
            }
        }
        let mut conn = self.manager.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Scalar {
        value: String,
        expires_at: Option<Instant>,
    },
    Set(HashSet<String>),
    List(Vec<String>),
}

/// In-process store with redis semantics: lazy scalar expiry, empty
/// collections dropped, batches all-or-nothing.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn wrong_type(key: &str) -> Error {
    Error::Storage(format!("wrong value type at key {key}"))
}

fn apply_op(map: &mut HashMap<String, Entry>, op: &BatchOp) -> Result<(), Error> {
    match op {
        BatchOp::Del(key) => {
            map.remove(key);
        }
        BatchOp::Set { key, value } => {
            map.insert(
                key.clone(),
                Entry::Scalar {
                    value: value.clone(),
                    expires_at: None,
                },
            );
        }
        BatchOp::SetAdd { key, member } => {
            match map
                .entry(key.clone())
                .or_insert_with(|| Entry::Set(HashSet::new()))
            {
                Entry::Set(set) => {
                    set.insert(member.clone());
                }
                _ => return Err(wrong_type(key)),
            }
        }
        BatchOp::SetRemove { key, member } => {
            let emptied = match map.get_mut(key) {
                Some(Entry::Set(set)) => {
                    set.remove(member);
                    set.is_empty()
                }
                Some(_) => return Err(wrong_type(key)),
                None => false,
            };
            if emptied {
                map.remove(key);
            }
        }
        BatchOp::ListSet { key, index, value } => match map.get_mut(key) {
            Some(Entry::List(list)) => {
                let slot = list.get_mut(*index).ok_or_else(|| {
                    Error::Storage(format!("list index {index} out of range for {key}"))
                })?;
                *slot = value.clone();
            }
            Some(_) => return Err(wrong_type(key)),
            None => return Err(Error::Storage(format!("no list at {key}"))),
        },
        BatchOp::ListRemoveValue { key, value } => {
            let emptied = match map.get_mut(key) {
                Some(Entry::List(list)) => {
                    if let Some(pos) = list.iter().position(|v| v == value) {
                        list.remove(pos);
                    }
                    list.is_empty()
                }
                Some(_) => return Err(wrong_type(key)),
                None => false,
            };
            if emptied {
                map.remove(key);
            }
        }
        BatchOp::ListPush { key, value } => {
            match map
                .entry(key.clone())
                .or_insert_with(|| Entry::List(Vec::new()))
            {
                Entry::List(list) => list.push(value.clone()),
                _ => return Err(wrong_type(key)),
            }
        }
    }
    Ok(())
}

/// `*`-wildcard matching, which is all the engine's key scans use.
fn glob_match(pattern: &str, input: &str) -> bool {
    fn inner(pattern: &[u8], input: &[u8]) -> bool {
        match pattern.first() {
            None => input.is_empty(),
            Some(b'*') => {
                if inner(&pattern[1..], input) {
                    return true;
                }
                !input.is_empty() && inner(pattern, &input[1..])
            }
            Some(&c) => !input.is_empty() && input[0] == c && inner(&pattern[1..], &input[1..]),
        }
    }
    inner(pattern.as_bytes(), input.as_bytes())
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut entries = self.entries.lock();
        let expired = matches!(
            entries.get(key),
            Some(Entry::Scalar { expires_at: Some(at), .. }) if Instant::now() >= *at
        );
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        match entries.get(key) {
            Some(Entry::Scalar { value, .. }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries.lock().insert(
            key.to_string(),
            Entry::Scalar {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        self.entries.lock().insert(
            key.to_string(),
            Entry::Scalar {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), Error> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, Error> {
        match self.entries.lock().get(key) {
            Some(Entry::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(wrong_type(key)),
            None => Ok(false),
        }
    }

    async fn set_len(&self, key: &str) -> Result<usize, Error> {
        match self.entries.lock().get(key) {
            Some(Entry::Set(set)) => Ok(set.len()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn list_index(&self, key: &str, index: usize) -> Result<Option<String>, Error> {
        match self.entries.lock().get(key) {
            Some(Entry::List(list)) => Ok(list.get(index).cloned()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn list_len(&self, key: &str) -> Result<usize, Error> {
        match self.entries.lock().get(key) {
            Some(Entry::List(list)) => Ok(list.len()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, Error> {
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .filter(|(key, entry)| {
                glob_match(pattern, key)
                    && !matches!(
                        entry,
                        Entry::Scalar { expires_at: Some(at), .. } if now >= *at
                    )
            })
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn execute(&self, batch: Batch) -> Result<(), Error> {
        let mut entries = self.entries.lock();
        // staged so a failing op leaves nothing applied
        let mut staged = entries.clone();
        for op in &batch.ops {
            apply_op(&mut staged, op)?;
        }
        *entries = staged;
        Ok(())
    }
}
