// group-core/src/group/coordinator.rs

//! The group coordinator.
//!
//! One coordinator per process generation. It resolves leadership once at
//! startup, keeps the ping record alive while it runs, and serves group
//! membership operations that any number of processes may issue
//! concurrently against the same store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::CoordinatorConfig;
use crate::error::{GroupError, Result};
use crate::identity::ProcessIdentity;
use crate::pool::{PooledClient, ResourcePool};
use crate::scheduler::TaskHandle;
use crate::store::ConnId;

use super::heartbeat::Heartbeat;
use super::keys::GroupKeys;
use super::leadership::{self, Leadership};
use super::meta::{GroupMeta, LocalGroups};

/// Result of [`GroupCoordinator::close_group`].
#[derive(Debug)]
pub enum CloseOutcome {
    /// The membership set existed and was deleted.
    Deleted,
    /// There was nothing to delete.
    Empty,
    /// The store failed; the group may still hold members.
    Failed(GroupError),
}

impl CloseOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Store-backed group membership with leader election.
pub struct GroupCoordinator {
    store_enabled: bool,
    database: u32,
    heartbeat_interval: Duration,
    heartbeat_ttl: Duration,
    keys: GroupKeys,
    pool: Arc<dyn ResourcePool>,
    identity: Arc<dyn ProcessIdentity>,
    groups: LocalGroups,
    heartbeat: Mutex<Option<TaskHandle>>,
}

impl GroupCoordinator {
    /// Creates a coordinator. Groups declared in `config` are registered
    /// locally; nothing touches the store until [`initialize`](Self::initialize).
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` does not validate.
    pub fn new(
        config: &CoordinatorConfig,
        pool: Arc<dyn ResourcePool>,
        identity: Arc<dyn ProcessIdentity>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store_enabled: config.store.enabled,
            database: config.store.database,
            heartbeat_interval: config.group.heartbeat_interval(),
            heartbeat_ttl: config.group.heartbeat_ttl(),
            keys: GroupKeys::new(config.group.key.clone()),
            pool,
            identity,
            groups: LocalGroups::from_definitions(&config.groups),
            heartbeat: Mutex::new(None),
        })
    }

    /// Resolves leadership and starts the heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::LeadershipConflict`] if another live process
    /// holds leadership, or a store error if the store is unreachable.
    /// No heartbeat is started on error.
    pub async fn initialize(&self) -> Result<Leadership> {
        if !self.store_enabled {
            tracing::info!("Store integration disabled, skipping group leadership");
            return Ok(Leadership::Disabled);
        }

        let me = self.identity.leader_id();
        let outcome = {
            let mut client = self.client().await?;
            leadership::resolve(&mut *client, &self.keys, &me).await?
        };

        let heartbeat = Heartbeat::new(
            self.pool.clone(),
            self.database,
            &self.keys,
            self.heartbeat_ttl,
        );
        if let Err(e) = heartbeat.ping().await {
            tracing::warn!("Initial heartbeat failed: {}", e);
        }

        let handle = heartbeat.start(self.heartbeat_interval);
        // Replacing an earlier handle drops and cancels it.
        *self.lock_heartbeat() = Some(handle);

        tracing::info!(
            "Group heartbeat every {}s (ttl {}s) on {}",
            self.heartbeat_interval.as_secs(),
            self.heartbeat_ttl.as_secs(),
            self.keys.ping()
        );
        Ok(outcome)
    }

    /// Registers a group locally. No-op if the name is already known.
    pub async fn create_group(&self, name: &str, max_clients: Option<usize>) {
        if self.groups.register(GroupMeta::new(name, max_clients)).await {
            tracing::debug!("Created group {} (max_clients {:?})", name, max_clients);
        }
    }

    /// Deletes the group's membership set.
    ///
    /// Never fails; store errors are logged and returned as
    /// [`CloseOutcome::Failed`]. The local registration is kept.
    pub async fn close_group(&self, name: &str) -> CloseOutcome {
        let key = self.keys.group(name);
        let result = async {
            let mut client = self.client().await?;
            if client.scard(&key).await? == 0 {
                return Ok(false);
            }
            client.del(&key).await?;
            Ok::<_, GroupError>(true)
        }
        .await;

        match result {
            Ok(true) => {
                tracing::debug!("Closed group {}", name);
                CloseOutcome::Deleted
            }
            Ok(false) => CloseOutcome::Empty,
            Err(e) => {
                tracing::warn!("Failed to close group {}: {}", name, e);
                CloseOutcome::Failed(e)
            }
        }
    }

    /// Adds `conn` to the group. Returns true if it was not already a member.
    pub async fn join_group(&self, name: &str, conn: ConnId) -> Result<bool> {
        let mut client = self.client().await?;
        Ok(client.sadd(&self.keys.group(name), conn).await? > 0)
    }

    /// Removes `conn` from the group. Returns true if it was a member.
    pub async fn leave_group(&self, name: &str, conn: ConnId) -> Result<bool> {
        let mut client = self.client().await?;
        Ok(client.srem(&self.keys.group(name), conn).await? > 0)
    }

    pub async fn is_in_group(&self, name: &str, conn: ConnId) -> Result<bool> {
        let mut client = self.client().await?;
        client.sismember(&self.keys.group(name), conn).await
    }

    /// Connections to deliver a group message to.
    ///
    /// Groups registered with a positive `max_clients` return a random
    /// sample of at most that many members; all others return every member.
    pub async fn get_fds(&self, name: &str) -> Result<HashSet<ConnId>> {
        let bound = self.groups.sample_bound(name).await;
        let key = self.keys.group(name);
        let mut client = self.client().await?;

        let members = match bound {
            Some(count) => client.srandmember(&key, count).await?,
            None => client.smembers(&key).await?,
        };
        Ok(members.into_iter().collect())
    }

    pub async fn count(&self, name: &str) -> Result<u64> {
        let mut client = self.client().await?;
        client.scard(&self.keys.group(name)).await
    }

    /// Every name is a valid group; sets come into being on first join.
    pub fn has_group(&self, _name: &str) -> bool {
        true
    }

    pub async fn group_meta(&self, name: &str) -> Option<GroupMeta> {
        self.groups.get(name).await
    }

    pub async fn local_groups(&self) -> Vec<GroupMeta> {
        self.groups.list().await
    }

    pub fn keys(&self) -> &GroupKeys {
        &self.keys
    }

    pub fn is_heartbeating(&self) -> bool {
        self.lock_heartbeat()
            .as_ref()
            .map(TaskHandle::is_active)
            .unwrap_or(false)
    }

    /// Stops the heartbeat. Returns false if it was not running.
    ///
    /// The leader record is left in place; successors take over once the
    /// ping record expires.
    pub fn shutdown(&self) -> bool {
        match self.lock_heartbeat().take() {
            Some(mut handle) => {
                let cancelled = handle.cancel();
                if cancelled {
                    tracing::info!("Group heartbeat stopped");
                }
                cancelled
            }
            None => false,
        }
    }

    async fn client(&self) -> Result<PooledClient> {
        let mut client = self.pool.acquire().await?;
        client.select(self.database).await?;
        Ok(client)
    }

    fn lock_heartbeat(&self) -> std::sync::MutexGuard<'_, Option<TaskHandle>> {
        self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for GroupCoordinator {
    fn drop(&mut self) {
        let slot = self
            .heartbeat
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(mut handle) = slot.take() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupDefinition;
    use crate::identity::{LeaderId, StaticIdentity};
    use crate::pool::{PoolConfig, StorePool};
    use crate::store::{MemoryStore, StoreClient};

    fn test_config() -> CoordinatorConfig {
        let mut config = CoordinatorConfig::default();
        config.group.key = "K".to_string();
        config.group.heartbeat_interval_secs = 5;
        config.group.heartbeat_ttl_secs = 8;
        config
    }

    fn coordinator_with(
        store: &MemoryStore,
        config: &CoordinatorConfig,
        id: &str,
    ) -> GroupCoordinator {
        let pool = Arc::new(StorePool::memory(
            store.clone(),
            PoolConfig {
                max_size: 1,
                acquire_timeout: Duration::from_secs(1),
            },
        ));
        GroupCoordinator::new(config, pool, Arc::new(StaticIdentity::new(id))).unwrap()
    }

    fn coordinator(store: &MemoryStore, id: &str) -> GroupCoordinator {
        coordinator_with(store, &test_config(), id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_fresh_store() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");

        let outcome = coord.initialize().await.unwrap();
        assert!(matches!(outcome, Leadership::Claimed { .. }));
        assert!(coord.is_heartbeating());

        let mut client = store.clone();
        assert_eq!(client.get("K").await.unwrap().as_deref(), Some("1-a"));
        // First ping is written before initialize returns
        assert!(client.exists("K-PING").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_startups_one_wins() {
        let store = MemoryStore::new();
        let a = coordinator(&store, "1-a");
        let b = coordinator(&store, "2-b");

        let (ra, rb) = tokio::join!(a.initialize(), b.initialize());
        let winners = [ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1);

        let loser = if ra.is_err() { ra } else { rb };
        assert!(loser.unwrap_err().is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_leader_is_fatal() {
        let store = MemoryStore::new();
        let first = coordinator(&store, "1-a");
        first.initialize().await.unwrap();

        let second = coordinator(&store, "2-b");
        let err = second.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            GroupError::LeadershipConflict { ref holder, ref current }
                if holder == "1-a" && current == "2-b"
        ));
        assert!(!second.is_heartbeating());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaim_after_leader_dies() {
        let store = MemoryStore::new();
        let old = coordinator(&store, "1-a");
        old.initialize().await.unwrap();
        old.join_group("room", 7).await.unwrap();
        old.join_group("hall", 8).await.unwrap();
        drop(old);

        // Ping expires once heartbeats stop
        tokio::time::sleep(Duration::from_secs(9)).await;

        let new = coordinator(&store, "2-b");
        let outcome = new.initialize().await.unwrap();
        match outcome {
            Leadership::Reclaimed { previous, purge } => {
                assert_eq!(previous, LeaderId::from("1-a"));
                assert_eq!(purge.deleted, 2);
                assert_eq!(purge.failed, 0);
            }
            other => panic!("expected reclaim, got {:?}", other),
        }
        assert_eq!(new.count("room").await.unwrap(), 0);
        assert_eq!(new.count("hall").await.unwrap(), 0);

        let mut client = store.clone();
        assert_eq!(client.get("K").await.unwrap().as_deref(), Some("2-b"));
        assert!(client.exists("K-PING").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinitialize_same_generation() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");
        coord.initialize().await.unwrap();
        coord.join_group("room", 1).await.unwrap();

        assert_eq!(coord.initialize().await.unwrap(), Leadership::AlreadyHeld);
        // Memberships survive
        assert_eq!(coord.count("room").await.unwrap(), 1);
        assert!(coord.is_heartbeating());
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let pool: Arc<dyn ResourcePool> =
            Arc::new(StorePool::memory(MemoryStore::new(), PoolConfig::default()));
        let identity: Arc<dyn ProcessIdentity> = Arc::new(StaticIdentity::new("1-a"));

        let mut config = test_config();
        config.group.heartbeat_interval_secs = 0;
        let err = GroupCoordinator::new(&config, pool.clone(), identity.clone())
            .err()
            .unwrap();
        assert!(matches!(err, GroupError::Config { .. }));

        let mut config = test_config();
        config.group.heartbeat_ttl_secs = config.group.heartbeat_interval_secs;
        assert!(GroupCoordinator::new(&config, pool, identity).is_err());
    }

    #[tokio::test]
    async fn test_duplicate_join() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");

        assert!(coord.join_group("g", 42).await.unwrap());
        assert!(!coord.join_group("g", 42).await.unwrap());
        assert_eq!(coord.count("g").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");

        coord.join_group("g", 1).await.unwrap();
        coord.join_group("g", 2).await.unwrap();
        assert!(coord.leave_group("g", 1).await.unwrap());
        assert!(!coord.leave_group("g", 1).await.unwrap());

        assert!(!coord.is_in_group("g", 1).await.unwrap());
        assert!(coord.is_in_group("g", 2).await.unwrap());
        assert_eq!(coord.count("g").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_fds_unbounded() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");
        coord.create_group("g", None).await;

        for conn in [1, 2, 3] {
            coord.join_group("g", conn).await.unwrap();
        }

        let fds = coord.get_fds("g").await.unwrap();
        assert_eq!(fds, HashSet::from([1, 2, 3]));
        // Unknown groups are unbounded too
        coord.join_group("other", 9).await.unwrap();
        assert_eq!(coord.get_fds("other").await.unwrap(), HashSet::from([9]));
    }

    #[tokio::test]
    async fn test_get_fds_bounded_sample() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");
        coord.create_group("g", Some(2)).await;

        for conn in [1, 2, 3] {
            coord.join_group("g", conn).await.unwrap();
        }

        let all = HashSet::from([1, 2, 3]);
        for _ in 0..20 {
            let fds = coord.get_fds("g").await.unwrap();
            assert_eq!(fds.len(), 2);
            assert!(fds.is_subset(&all));
        }
    }

    #[tokio::test]
    async fn test_get_fds_bound_larger_than_group() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");
        coord.create_group("g", Some(10)).await;
        coord.join_group("g", 1).await.unwrap();

        assert_eq!(coord.get_fds("g").await.unwrap(), HashSet::from([1]));
    }

    #[tokio::test]
    async fn test_create_group_is_idempotent() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");

        coord.create_group("g", Some(2)).await;
        coord.create_group("g", Some(50)).await;
        assert_eq!(
            coord.group_meta("g").await,
            Some(GroupMeta::new("g", Some(2)))
        );

        // Local only
        let mut client = store.clone();
        assert!(!client.exists("K.g").await.unwrap());
    }

    #[tokio::test]
    async fn test_configured_groups_registered() {
        let store = MemoryStore::new();
        let mut config = test_config();
        config.groups = vec![GroupDefinition {
            name: "lobby".to_string(),
            max_clients: Some(4),
        }];
        let coord = coordinator_with(&store, &config, "1-a");

        assert_eq!(coord.local_groups().await, vec![GroupMeta::new("lobby", Some(4))]);
    }

    #[tokio::test]
    async fn test_close_group() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");
        coord.create_group("g", None).await;
        coord.join_group("g", 1).await.unwrap();
        coord.join_group("g", 2).await.unwrap();

        assert!(matches!(coord.close_group("g").await, CloseOutcome::Deleted));
        assert_eq!(coord.count("g").await.unwrap(), 0);
        assert!(!coord.is_in_group("g", 1).await.unwrap());
        assert!(!coord.is_in_group("g", 2).await.unwrap());
        assert!(matches!(coord.close_group("g").await, CloseOutcome::Empty));
        // Registration is kept for reuse
        assert!(coord.group_meta("g").await.is_some());
    }

    #[tokio::test]
    async fn test_close_group_swallows_store_errors() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");
        store.fail_commands(true);

        let outcome = coord.close_group("g").await;
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn test_membership_errors_propagate() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");
        store.fail_commands(true);

        assert!(coord.join_group("g", 1).await.is_err());
        assert!(coord.leave_group("g", 1).await.is_err());
        assert!(coord.is_in_group("g", 1).await.is_err());
        assert!(coord.count("g").await.is_err());
        assert!(coord.get_fds("g").await.is_err());

        // The client went back to the pool each time
        store.fail_commands(false);
        assert!(coord.join_group("g", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_group_always_true() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");
        assert!(coord.has_group("never-created"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_heartbeat_does_not_stop_loop() {
        let store = MemoryStore::new();
        store.reject_transactions(true);
        let coord = coordinator(&store, "1-a");

        // The first ping fails but initialization still succeeds
        assert!(coord.initialize().await.is_ok());
        assert_eq!(store.transactions_attempted(), 1);
        assert!(coord.is_heartbeating());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.transactions_attempted(), 3);
        assert!(coord.is_heartbeating());

        store.reject_transactions(false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        let mut client = store.clone();
        assert!(client.exists("K-PING").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_heartbeat() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");
        coord.initialize().await.unwrap();

        assert!(coord.shutdown());
        assert!(!coord.shutdown());
        assert!(!coord.is_heartbeating());

        let attempted = store.transactions_attempted();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(store.transactions_attempted(), attempted);

        // Leader record stays; the ping lapses
        let mut client = store.clone();
        assert_eq!(client.get("K").await.unwrap().as_deref(), Some("1-a"));
        assert!(!client.exists("K-PING").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_heartbeat() {
        let store = MemoryStore::new();
        let coord = coordinator(&store, "1-a");
        coord.initialize().await.unwrap();
        let attempted = store.transactions_attempted();

        drop(coord);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(store.transactions_attempted(), attempted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_store() {
        let store = MemoryStore::new();
        let mut config = test_config();
        config.store.enabled = false;
        let coord = coordinator_with(&store, &config, "1-a");

        assert_eq!(coord.initialize().await.unwrap(), Leadership::Disabled);
        assert!(!coord.is_heartbeating());
        assert!(!coord.shutdown());

        let mut client = store.clone();
        assert!(!client.exists("K").await.unwrap());
        assert_eq!(store.transactions_attempted(), 0);

        // Group operations still work against the supplied pool
        assert!(coord.join_group("g", 1).await.unwrap());
        assert_eq!(coord.count("g").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_database_is_selected() {
        let store = MemoryStore::new();
        let mut config = test_config();
        config.store.database = 3;
        let coord = coordinator_with(&store, &config, "1-a");
        coord.initialize().await.unwrap();
        coord.join_group("g", 1).await.unwrap();

        let mut db0 = store.clone();
        assert!(!db0.exists("K").await.unwrap());

        let mut db3 = store.clone();
        db3.select(3).await.unwrap();
        assert!(db3.exists("K").await.unwrap());
        assert_eq!(db3.scard("K.g").await.unwrap(), 1);
    }
}
