use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::aggregator::AggregatorConfig;
use crate::ledger::{LedgerClientConfig, Network, RetryPolicy};

/// Environment variables that override `[ledger]` settings.
pub const ENV_LEDGER_NETWORK: &str = "LEDGER_NETWORK";
pub const ENV_LEDGER_RPC_URL: &str = "LEDGER_RPC_URL";
pub const ENV_TOKEN_ADDRESS: &str = "TOKEN_CONTRACT_ADDRESS";
pub const ENV_REGISTRY_ADDRESS: &str = "REGISTRY_CONTRACT_ADDRESS";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// JSON-RPC node.
    #[default]
    Rpc,
    /// In-memory fixture; starts disconnected so the simulated catalog is served.
    Fixture,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub network: Network,
    pub rpc_url: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub token_address: Option<String>,
    pub registry_address: Option<String>,
    /// Root for ABI artifact lookup.
    pub abi_dir: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Rpc,
            network: Network::Testnet,
            rpc_url: None,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 2000,
            token_address: None,
            registry_address: None,
            abi_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Device, group and system tiers share this interval.
    pub update_interval_secs: u64,
    pub event_poll_interval_secs: u64,
    pub error_backoff_secs: u64,
    /// How often to log app stats (devices, groups, ws connections) at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 30,
            event_poll_interval_secs: 10,
            error_backoff_secs: 5,
            stats_log_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishingConfig {
    pub system_push_interval_secs: u64,
    pub device_push_interval_secs: u64,
    pub group_push_interval_secs: u64,
    /// Messages buffered per WebSocket subscriber before it counts as failed.
    pub subscriber_buffer: usize,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            system_push_interval_secs: 10,
            device_push_interval_secs: 5,
            group_push_interval_secs: 10,
            subscriber_buffer: 32,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        let mut config: AppConfig = toml::from_str(&s)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests). Environment
    /// overrides are not applied.
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies ledger overrides from `lookup` (normally the process environment).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(network) = non_empty(ENV_LEDGER_NETWORK) {
            self.ledger.network = network
                .parse()
                .map_err(|e: String| anyhow::anyhow!("{ENV_LEDGER_NETWORK}: {e}"))?;
        }
        if let Some(url) = non_empty(ENV_LEDGER_RPC_URL) {
            self.ledger.rpc_url = Some(url);
        }
        if let Some(addr) = non_empty(ENV_TOKEN_ADDRESS) {
            self.ledger.token_address = Some(addr);
        }
        if let Some(addr) = non_empty(ENV_REGISTRY_ADDRESS) {
            self.ledger.registry_address = Some(addr);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.ledger.request_timeout_secs > 0,
            "ledger.request_timeout_secs must be > 0, got {}",
            self.ledger.request_timeout_secs
        );
        anyhow::ensure!(
            self.ledger.max_retries > 0,
            "ledger.max_retries must be > 0, got {}",
            self.ledger.max_retries
        );
        if let Some(url) = &self.ledger.rpc_url {
            anyhow::ensure!(
                url.starts_with("http://") || url.starts_with("https://"),
                "ledger.rpc_url must be an http(s) URL, got {url}"
            );
        }
        anyhow::ensure!(
            self.monitoring.update_interval_secs > 0,
            "monitoring.update_interval_secs must be > 0, got {}",
            self.monitoring.update_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.event_poll_interval_secs > 0,
            "monitoring.event_poll_interval_secs must be > 0, got {}",
            self.monitoring.event_poll_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.error_backoff_secs > 0,
            "monitoring.error_backoff_secs must be > 0, got {}",
            self.monitoring.error_backoff_secs
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.publishing.system_push_interval_secs > 0,
            "publishing.system_push_interval_secs must be > 0, got {}",
            self.publishing.system_push_interval_secs
        );
        anyhow::ensure!(
            self.publishing.device_push_interval_secs > 0,
            "publishing.device_push_interval_secs must be > 0, got {}",
            self.publishing.device_push_interval_secs
        );
        anyhow::ensure!(
            self.publishing.group_push_interval_secs > 0,
            "publishing.group_push_interval_secs must be > 0, got {}",
            self.publishing.group_push_interval_secs
        );
        anyhow::ensure!(
            self.publishing.subscriber_buffer > 0,
            "publishing.subscriber_buffer must be > 0, got {}",
            self.publishing.subscriber_buffer
        );
        Ok(())
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            update_interval: Duration::from_secs(self.monitoring.update_interval_secs),
            event_poll_interval: Duration::from_secs(self.monitoring.event_poll_interval_secs),
            error_backoff: Duration::from_secs(self.monitoring.error_backoff_secs),
        }
    }

    /// Client settings; unset contract addresses get the placeholder defaults.
    pub fn ledger_client_config(&self) -> LedgerClientConfig {
        let defaults = LedgerClientConfig::default();
        LedgerClientConfig {
            network: self.ledger.network,
            rpc_url: self.ledger.rpc_url.clone(),
            request_timeout: Duration::from_secs(self.ledger.request_timeout_secs),
            retry: RetryPolicy::new(
                self.ledger.max_retries,
                Duration::from_millis(self.ledger.retry_delay_ms),
            ),
            token_address: self
                .ledger
                .token_address
                .clone()
                .unwrap_or(defaults.token_address),
            registry_address: self
                .ledger
                .registry_address
                .clone()
                .unwrap_or(defaults.registry_address),
            abi_root: self.ledger.abi_dir.clone(),
        }
    }
}
