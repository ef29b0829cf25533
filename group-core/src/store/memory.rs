// group-core/src/store/memory.rs

//! In-process store backend.
//!
//! `MemoryStore` keeps every logical database in a shared map guarded by an
//! async mutex, so cloned handles behave like separate connections to the
//! same server. Expiry is measured on tokio's clock, which lets tests drive
//! TTLs with a paused runtime. It backs local-only deployments and the
//! coordinator's tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::traits::{ConnId, StoreClient, Transaction, TxCommand};
use crate::error::{GroupError, Result};

type Keyspace = HashMap<String, Entry>;

#[derive(Debug)]
enum Value {
    Str(String),
    Set(HashSet<ConnId>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct Shared {
    databases: Mutex<HashMap<u32, Keyspace>>,
    reject_transactions: AtomicBool,
    fail_commands: AtomicBool,
    transactions: AtomicU64,
}

/// In-process store with per-database keyspaces.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    database: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `exec` fail as if the store aborted it.
    pub fn reject_transactions(&self, reject: bool) {
        self.shared
            .reject_transactions
            .store(reject, Ordering::SeqCst);
    }

    /// Makes every subsequent command fail as if the connection dropped.
    pub fn fail_commands(&self, fail: bool) {
        self.shared.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Number of `exec` calls seen, committed or not.
    pub fn transactions_attempted(&self) -> u64 {
        self.shared.transactions.load(Ordering::SeqCst)
    }

    /// Remaining time-to-live of `key` in the currently selected database.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        self.with_db(|db| {
            db.get(key)
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(Instant::now()))
        })
        .await
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.shared.fail_commands.load(Ordering::SeqCst) {
            return Err(GroupError::store(operation, "connection lost"));
        }
        Ok(())
    }

    async fn with_db<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut Keyspace) -> T + Send,
    {
        let mut databases = self.shared.databases.lock().await;
        let db = databases.entry(self.database).or_default();
        let now = Instant::now();
        db.retain(|_, entry| !entry.is_expired(now));
        f(db)
    }
}

fn wrong_type(operation: &'static str, key: &str) -> GroupError {
    GroupError::store(
        operation,
        format!("WRONGTYPE operation against key '{}' holding the wrong kind of value", key),
    )
}

fn set_of<'a>(
    db: &'a Keyspace,
    operation: &'static str,
    key: &str,
) -> Result<Option<&'a HashSet<ConnId>>> {
    match db.get(key) {
        None => Ok(None),
        Some(Entry {
            value: Value::Set(set),
            ..
        }) => Ok(Some(set)),
        Some(_) => Err(wrong_type(operation, key)),
    }
}

fn sample_members(members: &HashSet<ConnId>, count: usize) -> Vec<ConnId> {
    let members: Vec<ConnId> = members.iter().copied().collect();
    let amount = count.min(members.len());
    let mut rng = rand::rng();
    rand::seq::index::sample(&mut rng, members.len(), amount)
        .into_iter()
        .map(|i| members[i])
        .collect()
}

/// Matches `text` against a glob pattern supporting `*`, `?` and `\` escapes.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    backtrack = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() && p[pi + 1] == t[ti] => {
                    pi += 2;
                    ti += 1;
                    continue;
                }
                c if c != '\\' && c == t[ti] => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                _ => {}
            }
        }
        match backtrack {
            Some((star, matched)) => {
                pi = star + 1;
                ti = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn select(&mut self, database: u32) -> Result<()> {
        self.check("SELECT")?;
        self.database = database;
        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.check("GET")?;
        self.with_db(|db| match db.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type("GET", key)),
        })
        .await
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.check("SET")?;
        self.with_db(|db| {
            db.insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
        })
        .await;
        Ok(())
    }

    async fn del(&mut self, key: &str) -> Result<u64> {
        self.check("DEL")?;
        Ok(self.with_db(|db| u64::from(db.remove(key).is_some())).await)
    }

    async fn set_nx(&mut self, key: &str, value: &str) -> Result<bool> {
        self.check("SETNX")?;
        Ok(self
            .with_db(|db| {
                if db.contains_key(key) {
                    return false;
                }
                db.insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
                true
            })
            .await)
    }

    async fn exists(&mut self, key: &str) -> Result<bool> {
        self.check("EXISTS")?;
        Ok(self.with_db(|db| db.contains_key(key)).await)
    }

    async fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool> {
        self.check("EXPIRE")?;
        Ok(self
            .with_db(|db| match db.get_mut(key) {
                Some(entry) => {
                    entry.expires_at = Some(Instant::now() + ttl);
                    true
                }
                None => false,
            })
            .await)
    }

    async fn exec(&mut self, tx: &Transaction) -> Result<Vec<bool>> {
        self.shared.transactions.fetch_add(1, Ordering::SeqCst);
        self.check("EXEC")?;
        if self.shared.reject_transactions.load(Ordering::SeqCst) {
            return Err(GroupError::transaction("EXEC aborted by store"));
        }

        // Every command runs under one lock acquisition.
        Ok(self
            .with_db(|db| {
                tx.commands()
                    .iter()
                    .map(|command| match command {
                        TxCommand::Set { key, value } => {
                            db.insert(key.clone(), Entry::new(Value::Str(value.clone())));
                            true
                        }
                        TxCommand::Expire { key, ttl } => match db.get_mut(key) {
                            Some(entry) => {
                                entry.expires_at = Some(Instant::now() + *ttl);
                                true
                            }
                            None => false,
                        },
                    })
                    .collect()
            })
            .await)
    }

    async fn sadd(&mut self, key: &str, member: ConnId) -> Result<u64> {
        self.check("SADD")?;
        self.with_db(|db| {
            let entry = db
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
            match &mut entry.value {
                Value::Set(set) => Ok(u64::from(set.insert(member))),
                Value::Str(_) => Err(wrong_type("SADD", key)),
            }
        })
        .await
    }

    async fn srem(&mut self, key: &str, member: ConnId) -> Result<u64> {
        self.check("SREM")?;
        self.with_db(|db| {
            let (removed, now_empty) = match db.get_mut(key) {
                None => return Ok(0),
                Some(Entry {
                    value: Value::Set(set),
                    ..
                }) => (set.remove(&member), set.is_empty()),
                Some(_) => return Err(wrong_type("SREM", key)),
            };
            if now_empty {
                db.remove(key);
            }
            Ok(u64::from(removed))
        })
        .await
    }

    async fn sismember(&mut self, key: &str, member: ConnId) -> Result<bool> {
        self.check("SISMEMBER")?;
        self.with_db(|db| Ok(set_of(db, "SISMEMBER", key)?.is_some_and(|s| s.contains(&member))))
            .await
    }

    async fn scard(&mut self, key: &str) -> Result<u64> {
        self.check("SCARD")?;
        self.with_db(|db| Ok(set_of(db, "SCARD", key)?.map_or(0, |s| s.len() as u64)))
            .await
    }

    async fn srandmember(&mut self, key: &str, count: usize) -> Result<Vec<ConnId>> {
        self.check("SRANDMEMBER")?;
        self.with_db(|db| {
            Ok(set_of(db, "SRANDMEMBER", key)?
                .map(|s| sample_members(s, count))
                .unwrap_or_default())
        })
        .await
    }

    async fn smembers(&mut self, key: &str) -> Result<Vec<ConnId>> {
        self.check("SMEMBERS")?;
        self.with_db(|db| {
            Ok(set_of(db, "SMEMBERS", key)?
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default())
        })
        .await
    }

    async fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.check("KEYS")?;
        Ok(self
            .with_db(|db| {
                db.keys()
                    .filter(|k| glob_match(pattern, k))
                    .cloned()
                    .collect()
            })
            .await)
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
