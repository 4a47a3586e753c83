//! Server configuration

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interface to bind
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Port to bind; 0 selects an ephemeral port
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Room store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// ICE servers surfaced to clients and used by server peers
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,
}

/// Room store backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(rename = "type", default)]
    pub typ: StoreType,

    #[serde(default)]
    pub redis: RedisConfig,
}

/// Supported store backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    /// In-process rooms, single-node deployments
    #[default]
    Memory,
    /// Redis pub/sub rooms shared across a server fleet
    Redis,
}

/// Redis bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    /// Key prefix shared by all nodes of one deployment
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            prefix: default_redis_prefix(),
        }
    }
}

/// One STUN or TURN server entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            bind_port: default_bind_port(),
            store: StoreConfig::default(),
            ice_servers: default_ice_servers(),
        }
    }
}

impl Config {
    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.bind_host.is_empty() {
            return Err(Error::InvalidConfig("bind_host must not be empty".to_string()));
        }

        if self.store.typ == StoreType::Redis {
            if self.store.redis.host.is_empty() {
                return Err(Error::InvalidConfig(
                    "redis host must not be empty".to_string(),
                ));
            }
            if self.store.redis.prefix.is_empty() {
                return Err(Error::InvalidConfig(
                    "redis prefix must not be empty".to_string(),
                ));
            }
        }

        for server in &self.ice_servers {
            if server.urls.is_empty() {
                return Err(Error::InvalidConfig(
                    "ice server entry has no urls".to_string(),
                ));
            }
            for url in &server.urls {
                if !url.starts_with("stun:") && !url.starts_with("turn:") && !url.starts_with("turns:")
                {
                    return Err(Error::InvalidConfig(format!(
                        "unsupported ice server url: {}",
                        url
                    )));
                }
            }
        }

        Ok(())
    }
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    3000
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_prefix() -> String {
    "peercalls".to_string()
}

fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig {
            urls: vec!["stun:stun.l.google.com:19302".to_string()],
            username: None,
            credential: None,
        },
        IceServerConfig {
            urls: vec!["stun:global.stun.twilio.com:3478?transport=udp".to_string()],
            username: None,
            credential: None,
        },
    ]
}
