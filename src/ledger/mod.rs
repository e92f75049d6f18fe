//! Read-only access to the device/group registry on the ledger.
//!
//! [`LedgerSource`] is the capability the aggregator depends on. Two variants
//! exist: [`LedgerClient`] talks JSON-RPC to a real node, [`FixtureLedger`]
//! serves scripted in-memory data. Neither ever fails at this seam: failed
//! reads come back empty or degraded and are logged.

mod abi;
mod client;
mod error;
mod fixture;
mod retry;
mod rpc;

pub use abi::{ABI_SEARCH_PATHS, REGISTRY_CONTRACT, TOKEN_CONTRACT, load_contract_abi, minimal_abi};
pub use client::{LedgerClient, LedgerClientConfig, decode_device, decode_group};
pub use error::LedgerError;
pub use fixture::FixtureLedger;
pub use retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryOutcome, RetryPolicy};

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::LedgerStats;

/// The all-zero address; a device with this renter is not rented.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Named networks with a default RPC endpoint and expected chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
    Local,
}

impl Network {
    pub fn default_rpc_url(self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.avax.network/ext/bc/C/rpc",
            Network::Testnet => "https://api.avax-test.network/ext/bc/C/rpc",
            Network::Local => "http://localhost:9650/ext/bc/C/rpc",
        }
    }

    pub fn expected_chain_id(self) -> u64 {
        match self {
            Network::Mainnet => 43114,
            Network::Testnet => 43113,
            Network::Local => 43112,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Local => "local",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "local" => Ok(Network::Local),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// Registry events the client installs filters for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "GPURegistered")]
    DeviceRegistered,
    #[serde(rename = "GPURented")]
    DeviceRented,
    #[serde(rename = "GPURentalEnded")]
    DeviceRentalEnded,
    #[serde(rename = "SubnetCreated")]
    GroupCreated,
    #[serde(rename = "GPUAddedToSubnet")]
    DeviceAddedToGroup,
    #[serde(rename = "GPURemovedFromSubnet")]
    DeviceRemovedFromGroup,
    #[serde(rename = "GPUMetricsUpdated")]
    DeviceMetricsUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::DeviceRegistered,
        EventKind::DeviceRented,
        EventKind::DeviceRentalEnded,
        EventKind::GroupCreated,
        EventKind::DeviceAddedToGroup,
        EventKind::DeviceRemovedFromGroup,
        EventKind::DeviceMetricsUpdated,
    ];

    /// Event name as declared in the registry ABI.
    pub fn abi_name(self) -> &'static str {
        match self {
            EventKind::DeviceRegistered => "GPURegistered",
            EventKind::DeviceRented => "GPURented",
            EventKind::DeviceRentalEnded => "GPURentalEnded",
            EventKind::GroupCreated => "SubnetCreated",
            EventKind::DeviceAddedToGroup => "GPUAddedToSubnet",
            EventKind::DeviceRemovedFromGroup => "GPURemovedFromSubnet",
            EventKind::DeviceMetricsUpdated => "GPUMetricsUpdated",
        }
    }

    pub fn from_abi_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.abi_name() == name)
    }
}

/// Raw on-chain device fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDevice {
    pub device_id: String,
    pub owner: String,
    pub renter: String,
    pub compute_capacity: f64,
    /// GB.
    pub memory_size: f64,
    pub model: String,
    pub active: bool,
    /// Epoch seconds.
    pub rental_start: u64,
    /// Epoch seconds.
    pub rental_end: u64,
    pub current_group: Option<String>,
    pub is_rented: bool,
    pub rental_active: bool,
}

impl RawDevice {
    /// An active, unrented device with no group.
    pub fn new(device_id: impl Into<String>, compute_capacity: f64, memory_size: f64) -> Self {
        Self {
            device_id: device_id.into(),
            owner: ZERO_ADDRESS.to_string(),
            renter: ZERO_ADDRESS.to_string(),
            compute_capacity,
            memory_size,
            model: String::new(),
            active: true,
            rental_start: 0,
            rental_end: 0,
            current_group: None,
            is_rented: false,
            rental_active: false,
        }
    }

    pub fn rented_by(mut self, renter: impl Into<String>, rental_end: u64) -> Self {
        self.renter = renter.into();
        self.is_rented = self.renter != ZERO_ADDRESS;
        self.rental_end = rental_end;
        self.rental_active = self.is_rented;
        self
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.current_group = Some(group_id.into());
        self
    }
}

/// Raw on-chain group fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGroup {
    pub group_id: String,
    pub coordinator: String,
    pub member_ids: Vec<String>,
    pub total_compute: f64,
    pub total_memory: f64,
    /// Epoch seconds.
    pub created_at: u64,
    pub active: bool,
    pub purpose: String,
}

impl RawGroup {
    pub fn member_count(&self) -> usize {
        self.member_ids.len()
    }
}

/// One decoded registry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    #[serde(rename = "eventName")]
    pub kind: EventKind,
    pub block_number: u64,
    pub transaction_hash: String,
    pub args: BTreeMap<String, serde_json::Value>,
    /// Epoch millis when the client drained the entry.
    pub observed_at: u64,
}

impl LedgerEvent {
    pub fn arg_str(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(|v| v.as_str())
    }

    /// The `gpuId` argument carried by device events.
    pub fn device_id(&self) -> Option<&str> {
        self.arg_str("gpuId")
    }

    pub fn group_id(&self) -> Option<&str> {
        self.arg_str("subnetId")
    }
}

/// Read-only ledger capability consumed by the aggregator.
#[async_trait]
pub trait LedgerSource: Send + Sync + 'static {
    /// Cheap liveness probe. Never fails; errors mean `false`.
    async fn is_connected(&self) -> bool;

    /// Device id -> raw fields. Empty when unavailable.
    async fn get_all_device_data(&self) -> HashMap<String, RawDevice>;

    /// Active groups only. Empty when unavailable.
    async fn get_all_group_data(&self) -> HashMap<String, RawGroup>;

    /// Aggregate counters, or a degraded record on failure.
    async fn get_system_stats(&self) -> LedgerStats;

    /// New events since the last call, sorted by block number ascending.
    /// `None` means every monitored kind.
    async fn get_recent_events(&self, kinds: Option<&[EventKind]>) -> Vec<LedgerEvent>;

    fn network_name(&self) -> &str;
}
