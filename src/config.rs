use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_BIND_PORT: u16 = 5000;
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 100;
const DEFAULT_HEARTBEAT_KEY_PREFIX: &str = "node_";
const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Node configuration, read from the process environment.
///
/// Only `NODE_ADDRESS` is required. Without `REDIS_URL` the node keeps its
/// heartbeats in-process, which is only meaningful for a single-node setup.
/// Without `STORE_DIR` the backing store lives in memory and nothing survives
/// a restart.
#[derive(Debug, Clone)]
pub struct Config {
    /// Advertised `host:port` other nodes use to reach this one.
    pub node_address: String,
    pub bind_addr: SocketAddr,
    pub redis_url: Option<String>,
    pub store_dir: Option<PathBuf>,
    pub heartbeat_timeout: Duration,
    pub heartbeat_key_prefix: String,
    /// Self-driven heartbeat renewal, on top of the `/health` probe.
    pub heartbeat_interval: Option<Duration>,
    pub peer_timeout: Option<Duration>,
    pub list_page_size: usize,
    pub log_level: tracing::Level,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let node_address = env::var("NODE_ADDRESS")
            .map_err(|_| Error::Config("NODE_ADDRESS is required".to_string()))?;
        if node_address.trim().is_empty() {
            return Err(Error::Config("NODE_ADDRESS must not be empty".to_string()));
        }

        let bind_addr = parse_var("BIND_ADDR")?
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_BIND_PORT)));

        let heartbeat_timeout = Duration::from_secs(
            parse_var("HEARTBEAT_TIMEOUT_SECS")?.unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
        );
        if heartbeat_timeout.is_zero() {
            return Err(Error::Config(
                "HEARTBEAT_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        let list_page_size = parse_var("LIST_PAGE_SIZE")?.unwrap_or(DEFAULT_LIST_PAGE_SIZE);
        if list_page_size == 0 {
            return Err(Error::Config("LIST_PAGE_SIZE must be positive".to_string()));
        }

        Ok(Self {
            node_address,
            bind_addr,
            redis_url: non_empty_var("REDIS_URL"),
            store_dir: non_empty_var("STORE_DIR").map(PathBuf::from),
            heartbeat_timeout,
            heartbeat_key_prefix: non_empty_var("HEARTBEAT_KEY_PREFIX")
                .unwrap_or_else(|| DEFAULT_HEARTBEAT_KEY_PREFIX.to_string()),
            heartbeat_interval: parse_var::<u64>("HEARTBEAT_INTERVAL_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            peer_timeout: parse_var::<u64>("PEER_TIMEOUT_MS")?
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            list_page_size,
            log_level: parse_var("LOG_LEVEL")?.unwrap_or(tracing::Level::INFO),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} has invalid value {:?}: {}", name, raw, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "NODE_ADDRESS",
        "BIND_ADDR",
        "REDIS_URL",
        "STORE_DIR",
        "HEARTBEAT_TIMEOUT_SECS",
        "HEARTBEAT_KEY_PREFIX",
        "HEARTBEAT_INTERVAL_SECS",
        "PEER_TIMEOUT_MS",
        "LIST_PAGE_SIZE",
        "LOG_LEVEL",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_config_requires_node_address() {
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env();
        unsafe { env::set_var("NODE_ADDRESS", "10.0.0.1:5000") };

        let config = Config::from_env().unwrap();
        assert_eq!(config.node_address, "10.0.0.1:5000");
        assert_eq!(config.bind_addr, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(100));
        assert_eq!(config.heartbeat_key_prefix, "node_");
        assert_eq!(config.list_page_size, 1000);
        assert!(config.redis_url.is_none());
        assert!(config.store_dir.is_none());
        assert!(config.heartbeat_interval.is_none());
        assert!(config.peer_timeout.is_none());
        assert_eq!(config.log_level, tracing::Level::INFO);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_overrides() {
        clear_env();
        unsafe {
            env::set_var("NODE_ADDRESS", "node-a:7000");
            env::set_var("BIND_ADDR", "127.0.0.1:7000");
            env::set_var("REDIS_URL", "redis://cache:6379");
            env::set_var("HEARTBEAT_TIMEOUT_SECS", "30");
            env::set_var("HEARTBEAT_INTERVAL_SECS", "10");
            env::set_var("PEER_TIMEOUT_MS", "750");
            env::set_var("LOG_LEVEL", "debug");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(10)));
        assert_eq!(config.peer_timeout, Some(Duration::from_millis(750)));
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_rejects_invalid_numbers() {
        clear_env();
        unsafe {
            env::set_var("NODE_ADDRESS", "node-a:7000");
            env::set_var("HEARTBEAT_TIMEOUT_SECS", "soon");
        }
        assert!(matches!(Config::from_env(), Err(Error::Config(_))));

        unsafe { env::set_var("HEARTBEAT_TIMEOUT_SECS", "0") };
        assert!(matches!(Config::from_env(), Err(Error::Config(_))));
        clear_env();
    }
}
