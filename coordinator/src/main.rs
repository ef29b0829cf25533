//! Group Coordinator Service
//!
//! Standalone process that holds group leadership for a cluster and keeps
//! its heartbeat alive, or inspects a group's membership.
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings (Redis on localhost)
//! group-coordinator
//!
//! # Start with configuration file
//! group-coordinator --config coordinator.toml
//!
//! # Local-only mode, no shared store
//! group-coordinator --no-store
//!
//! # Show the members of a group
//! group-coordinator --store-url redis://10.0.0.5:6379 inspect lobby
//! ```

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use group_core::config::CoordinatorConfig;
use group_core::group::{GroupCoordinator, Leadership};
use group_core::identity::ProcessGeneration;
use group_core::pool::{PoolConfig, StorePool};
use group_core::store::MemoryStore;

/// Group Coordinator
#[derive(Parser, Debug)]
#[command(name = "group-coordinator")]
#[command(about = "Store-backed group membership coordinator")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Store connection URL
    #[arg(long)]
    store_url: Option<String>,

    /// Logical database index
    #[arg(long)]
    database: Option<u32>,

    /// Base key for leader, ping and group keys
    #[arg(long)]
    key: Option<String>,

    /// Heartbeat interval in seconds
    #[arg(long)]
    heartbeat_interval: Option<u64>,

    /// Ping record expiry in seconds
    #[arg(long)]
    heartbeat_ttl: Option<u64>,

    /// Run without a shared store (local-only membership)
    #[arg(long)]
    no_store: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hold leadership and heartbeat until interrupted (default)
    Run,
    /// Print the size and members of a group
    Inspect {
        /// Group name
        group: String,
    },
}

fn load_config(args: &Args) -> group_core::Result<CoordinatorConfig> {
    let mut config = match &args.config {
        Some(path) => CoordinatorConfig::from_file(path)?,
        None => CoordinatorConfig::default(),
    }
    .with_env_overrides();

    if let Some(url) = &args.store_url {
        config.store.url = url.clone();
    }
    if let Some(database) = args.database {
        config.store.database = database;
    }
    if let Some(key) = &args.key {
        config.group.key = key.clone();
    }
    if let Some(interval) = args.heartbeat_interval {
        config.group.heartbeat_interval_secs = interval;
    }
    if let Some(ttl) = args.heartbeat_ttl {
        config.group.heartbeat_ttl_secs = ttl;
    }
    if args.no_store {
        config.store.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

fn build_pool(config: &CoordinatorConfig) -> group_core::Result<StorePool> {
    let pool_config = PoolConfig::from(&config.store);
    if !config.store.enabled {
        return Ok(StorePool::memory(MemoryStore::new(), pool_config));
    }

    #[cfg(feature = "redis")]
    let pool = StorePool::redis(&config.store.url, pool_config);

    #[cfg(not(feature = "redis"))]
    let pool = {
        let _ = pool_config;
        Err(group_core::GroupError::config(
            "store is enabled but this build has no store backend; use --no-store",
        ))
    };

    pool
}

async fn run(coordinator: GroupCoordinator) -> Result<(), Box<dyn std::error::Error>> {
    match coordinator.initialize().await {
        Ok(Leadership::Claimed { purge }) => {
            tracing::info!("Leadership claimed, purged {} stale groups", purge.deleted);
        }
        Ok(Leadership::Reclaimed { previous, purge }) => {
            tracing::info!(
                "Leadership reclaimed from {}, purged {} stale groups",
                previous,
                purge.deleted
            );
        }
        Ok(Leadership::AlreadyHeld) => tracing::info!("Leadership already held"),
        Ok(Leadership::Disabled) => tracing::info!("Running in local-only mode"),
        Err(e) => {
            tracing::error!("Failed to initialize group coordinator: {}", e);
            return Err(e.into());
        }
    }

    for meta in coordinator.local_groups().await {
        match meta.max_clients {
            Some(max) if max > 0 => tracing::info!("  Group {} (max {} clients)", meta.name, max),
            _ => tracing::info!("  Group {}", meta.name),
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down coordinator...");
    coordinator.shutdown();
    Ok(())
}

async fn inspect(coordinator: GroupCoordinator, group: &str) -> Result<(), Box<dyn std::error::Error>> {
    let count = coordinator.count(group).await?;
    let mut members: Vec<_> = coordinator.get_fds(group).await?.into_iter().collect();
    members.sort_unstable();

    println!("{}: {} members", coordinator.keys().group(group), count);
    for conn in members {
        println!("  {}", conn);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args)?;

    tracing::info!("Starting Group Coordinator");
    tracing::info!("  Store: {}", if config.store.enabled { config.store.url.as_str() } else { "disabled" });
    tracing::info!("  Database: {}", config.store.database);
    tracing::info!("  Key: {}", config.group.key);
    tracing::info!(
        "  Heartbeat: every {}s, ttl {}s",
        config.group.heartbeat_interval_secs,
        config.group.heartbeat_ttl_secs
    );

    let pool = Arc::new(build_pool(&config)?);
    let coordinator = GroupCoordinator::new(&config, pool, Arc::new(ProcessGeneration::new()))?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(coordinator).await,
        Command::Inspect { group } => inspect(coordinator, &group).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let args = Args::try_parse_from([
            "group-coordinator",
            "--key",
            "APP.GROUPS",
            "--database",
            "2",
            "--heartbeat-interval",
            "3",
            "--heartbeat-ttl",
            "6",
        ])
        .unwrap();

        let config = load_config(&args).unwrap();
        assert_eq!(config.group.key, "APP.GROUPS");
        assert_eq!(config.store.database, 2);
        assert_eq!(config.group.heartbeat_interval_secs, 3);
        assert_eq!(config.group.heartbeat_ttl_secs, 6);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_rejects_ttl_not_above_interval() {
        let args = Args::try_parse_from([
            "group-coordinator",
            "--heartbeat-interval",
            "10",
            "--heartbeat-ttl",
            "10",
        ])
        .unwrap();

        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_no_store_uses_memory_pool() {
        let args = Args::try_parse_from(["group-coordinator", "--no-store", "inspect", "lobby"]).unwrap();
        let config = load_config(&args).unwrap();
        assert!(!config.store.enabled);
        assert!(build_pool(&config).is_ok());
        assert!(matches!(args.command, Some(Command::Inspect { ref group }) if group == "lobby"));
    }

    #[test]
    fn test_config_file_then_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.toml");
        std::fs::write(
            &path,
            r#"
            [group]
            key = "FILE.KEY"

            [[groups]]
            name = "lobby"
            max_clients = 50
            "#,
        )
        .unwrap();

        let args = Args::try_parse_from([
            "group-coordinator",
            "--config",
            path.to_str().unwrap(),
            "--database",
            "4",
        ])
        .unwrap();

        let config = load_config(&args).unwrap();
        assert_eq!(config.group.key, "FILE.KEY");
        assert_eq!(config.store.database, 4);
        assert_eq!(config.groups.len(), 1);
    }
}
