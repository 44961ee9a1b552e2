//! wabot - pluggable WhatsApp automation runtime
//!
//! Receives client events from a bridge, normalises them and dispatches
//! them to hot-reloadable plugins.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `store` - Key/value stores (JSON file, SQLite, MongoDB, memory)
//! - `cache` - Moka-backed typed caches
//! - `socket` - The WhatsApp client bridge
//! - `events` - Event normalisation into `Ctx`
//! - `permissions` - Gate results and middleware combinators
//! - `plugins` - Descriptors, registry, manifests, hot reload, built-ins
//! - `bot` - Dispatcher, send wrapper, event feed and runtime
//! - `utils` - Utility functions

mod bot;
mod cache;
mod config;
mod events;
mod permissions;
mod plugins;
mod socket;
mod store;
mod utils;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use bot::webhook::{self, FeedState};
use bot::{Handler, Stores};
use config::{Config, StoreBackend};
use plugins::watcher::{PluginWatcher, reload_loop};
use socket::BridgeSocket;
use store::{JsonStore, JsonStoreOptions, MongoStore, SqliteStore, Store};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Names of the four stores, used as file names and collection names.
const STORE_NAMES: [&str; 4] = ["group_metadata", "contacts", "timer", "settings"];

/// Capacity of the feed to dispatch-lane channel.
const FEED_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wabot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting wabot...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    info!("Store backend: {:?}", config.store);

    let stores = open_stores(&config).await?;
    info!("Stores opened");

    let socket = Arc::new(BridgeSocket::new(
        config.bridge_url.clone(),
        config.bridge_token.clone(),
    )?);
    socket
        .connect(&config.identity)
        .await
        .context("failed to reach the client bridge")?;

    if config.owner_ids.is_empty() {
        info!("No owner IDs configured (OWNER_IDS is empty)");
    } else {
        info!("Bot owners: {:?}", config.owner_ids);
    }

    let handler = Handler::builder(socket)
        .stores(stores)
        .prefixes(config.prefixes.clone())
        .owners(config.owner_ids.clone())
        .recent_window(config.recent_window)
        .build();
    info!("Caches initialized: {:?}", handler.cache().cache_names());

    for unit in plugins::builtin_units()? {
        handler.install(unit);
    }

    // Manifest locations are the paths the watcher reports, so use the
    // canonical directory for both.
    std::fs::create_dir_all(&config.plugin_dir)
        .with_context(|| format!("failed to create {}", config.plugin_dir.display()))?;
    let plugin_dir = config.plugin_dir.canonicalize()?;
    plugins::load_dir(&handler, &plugin_dir);
    {
        let registry = handler.registry().read();
        info!(
            "Registry holds {} plugin(s) from {} unit(s)",
            registry.len(),
            registry.locations().len()
        );
        debug!("Command keys: {:?}", registry.command_keys());
    }
    info!("Command prefixes: {:?}", handler.prefixes());

    // Keep the watcher alive for the lifetime of the runtime.
    let _watcher = if config.hot_reload {
        start_hot_reload(&handler, &plugin_dir)
    } else {
        None
    };

    let (tx, rx) = mpsc::channel(FEED_BUFFER);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.feed_port));
    let router = webhook::router(FeedState::new(tx, config.feed_secret.clone()));
    let feed = tokio::spawn(async move {
        if let Err(e) = webhook::serve(addr, router).await {
            warn!("Event feed stopped with error: {:#}", e);
        }
    });

    bot::run(handler, rx).await;

    feed.abort();
    info!("wabot stopped");
    Ok(())
}

fn start_hot_reload(handler: &Handler, dir: &Path) -> Option<PluginWatcher> {
    match PluginWatcher::start(dir) {
        Ok((watcher, events)) => {
            tokio::spawn(reload_loop(handler.clone(), events));
            Some(watcher)
        }
        Err(e) => {
            warn!("Hot reload disabled: {:#}", e);
            None
        }
    }
}

async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    let mut opened: Vec<Arc<dyn Store>> = Vec::with_capacity(STORE_NAMES.len());

    match &config.store {
        StoreBackend::Json | StoreBackend::Sqlite => {
            std::fs::create_dir_all(&config.data_dir).with_context(|| {
                format!("failed to create {}", config.data_dir.display())
            })?;
        }
        StoreBackend::Mongo { .. } => {}
    }

    for name in STORE_NAMES {
        let store: Arc<dyn Store> = match &config.store {
            StoreBackend::Json => {
                let path = config.data_dir.join(format!("{}.json", name));
                Arc::new(JsonStore::open(
                    JsonStoreOptions::new(path).auto_save(true).auto_load(true),
                )?)
            }
            StoreBackend::Sqlite => {
                let path = config.data_dir.join(format!("{}.db", name));
                Arc::new(SqliteStore::open(path)?)
            }
            StoreBackend::Mongo { uri, database } => {
                Arc::new(MongoStore::connect(uri, database, name).await?)
            }
        };
        opened.push(store);
    }

    let [groups, contacts, timers, settings]: [Arc<dyn Store>; 4] = opened
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected {} stores", STORE_NAMES.len()))?;

    Ok(Stores {
        groups,
        contacts,
        timers,
        settings,
    })
}
