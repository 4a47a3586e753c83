//! Signaling server binary entry point
//!
//! # Usage
//!
//! ```bash
//! # Single-node server with in-memory rooms (default)
//! cargo run --bin peer-calls-server -- --bind-port 3000
//!
//! # Fleet node sharing rooms over redis
//! cargo run --bin peer-calls-server -- \
//!   --store-type redis \
//!   --redis-host redis.internal \
//!   --redis-prefix peercalls
//! ```
//!
//! Every flag can also be set through a `PEERCALLS_`-prefixed environment
//! variable, e.g. `PEERCALLS_BIND_PORT=3000`.

use std::sync::Arc;

use clap::Parser;
use futures::future::BoxFuture;
use peer_calls::ws::AdapterFactory;
use peer_calls::{
    mesh_message_handler, Config, IceServerConfig, RedisAdapter, RoomAdapter, RoomHandler,
    RoomManager, StoreType, WsServer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// WebRTC signaling and room fan-out server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0", env = "PEERCALLS_BIND_HOST")]
    bind_host: String,

    /// Port to bind (0 selects an ephemeral port)
    #[arg(long, default_value_t = 3000, env = "PEERCALLS_BIND_PORT")]
    bind_port: u16,

    /// Room store backend: memory or redis
    #[arg(long, default_value = "memory", env = "PEERCALLS_STORE_TYPE")]
    store_type: StoreTypeArg,

    /// Redis host (redis store only)
    #[arg(long, default_value = "127.0.0.1", env = "PEERCALLS_STORE_REDIS_HOST")]
    redis_host: String,

    /// Redis port (redis store only)
    #[arg(long, default_value_t = 6379, env = "PEERCALLS_STORE_REDIS_PORT")]
    redis_port: u16,

    /// Shared key prefix on the redis bus
    #[arg(long, default_value = "peercalls", env = "PEERCALLS_STORE_REDIS_PREFIX")]
    redis_prefix: String,

    /// Additional ICE server urls (comma-separated)
    #[arg(long, value_delimiter = ',', env = "PEERCALLS_ICE_SERVER_URLS")]
    ice_server_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum StoreTypeArg {
    Memory,
    Redis,
}

impl From<StoreTypeArg> for StoreType {
    fn from(arg: StoreTypeArg) -> Self {
        match arg {
            StoreTypeArg::Memory => StoreType::Memory,
            StoreTypeArg::Redis => StoreType::Redis,
        }
    }
}

fn build_config(args: &Args) -> Config {
    let mut config = Config {
        bind_host: args.bind_host.clone(),
        bind_port: args.bind_port,
        ..Default::default()
    };

    config.store.typ = args.store_type.into();
    config.store.redis.host = args.redis_host.clone();
    config.store.redis.port = args.redis_port;
    config.store.redis.prefix = args.redis_prefix.clone();

    if !args.ice_server_urls.is_empty() {
        config.ice_servers.push(IceServerConfig {
            urls: args.ice_server_urls.clone(),
            username: None,
            credential: None,
        });
    }

    config
}

fn adapter_factory(config: &Config) -> anyhow::Result<AdapterFactory> {
    match config.store.typ {
        StoreType::Memory => Ok(Arc::new(|room: &str| {
            let room = room.to_string();
            Box::pin(async move {
                Ok(Arc::new(peer_calls::MemoryAdapter::new(room)) as Arc<dyn RoomAdapter>)
            }) as BoxFuture<'static, peer_calls::Result<Arc<dyn RoomAdapter>>>
        })),
        StoreType::Redis => {
            let client = redis::Client::open(config.store.redis.url())?;
            let prefix = config.store.redis.prefix.clone();
            Ok(Arc::new(move |room: &str| {
                let client = client.clone();
                let prefix = prefix.clone();
                let room = room.to_string();
                Box::pin(async move {
                    let adapter = RedisAdapter::connect(&client, &prefix, room).await?;
                    Ok(Arc::new(adapter) as Arc<dyn RoomAdapter>)
                }) as BoxFuture<'static, peer_calls::Result<Arc<dyn RoomAdapter>>>
            }))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = build_config(&args);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_addr(),
        store = ?config.store.typ,
        "Signaling server starting"
    );

    let rooms = Arc::new(RoomManager::new(adapter_factory(&config)?));
    let handler = Arc::new(RoomHandler::new(rooms, mesh_message_handler()));

    let addr = config
        .bind_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;
    let handle = WsServer::new(addr, handler).start().await?;

    info!(addr = %handle.local_addr(), "Serving /ws/<room>/<clientID>");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    handle.shutdown().await;
    info!("Server stopped");

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
