// JSON-RPC backed ledger client: contract bindings, event filters, retries.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use alloy::dyn_abi::{DynSolValue, EventExt, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Event, JsonAbi};
use alloy::primitives::{Address, B256, U256, hex};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::abi::{REGISTRY_CONTRACT, TOKEN_CONTRACT, load_contract_abi};
use super::rpc::{RpcLog, RpcTransport};
use super::{
    EventKind, LedgerError, LedgerEvent, LedgerSource, Network, RawDevice, RawGroup, RetryPolicy,
    ZERO_ADDRESS,
};
use crate::models::{LedgerStats, now_millis};

pub const PLACEHOLDER_TOKEN_ADDRESS: &str = "0x1234567890123456789012345678901234567890";
pub const PLACEHOLDER_REGISTRY_ADDRESS: &str = "0x0987654321098765432109876543210987654321";

/// Per-record contract reads in flight at once.
const FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    pub network: Network,
    /// Overrides the network's default endpoint.
    pub rpc_url: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub token_address: String,
    pub registry_address: String,
    /// Root directory the ABI search paths are resolved against.
    pub abi_root: PathBuf,
}

impl Default for LedgerClientConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            rpc_url: None,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            token_address: PLACEHOLDER_TOKEN_ADDRESS.to_string(),
            registry_address: PLACEHOLDER_REGISTRY_ADDRESS.to_string(),
            abi_root: PathBuf::from("."),
        }
    }
}

struct ContractBinding {
    address: Address,
    abi: JsonAbi,
}

struct EventFilter {
    id: String,
    event: Event,
}

struct Session {
    transport: RpcTransport,
    network: Network,
    token: Option<ContractBinding>,
    registry: Option<ContractBinding>,
    filters: BTreeMap<EventKind, EventFilter>,
}

pub struct LedgerClient {
    config: LedgerClientConfig,
    session: RwLock<Option<Arc<Session>>>,
    connected: AtomicBool,
    latest_block: AtomicU64,
    network_name: RwLock<&'static str>,
    /// Network and endpoint of the last `initialize`, retried while no
    /// session is open. Cleared by `disconnect`.
    reconnect_target: RwLock<Option<(Network, String)>>,
    last_attempt: Mutex<Option<Instant>>,
}

impl LedgerClient {
    pub fn new(config: LedgerClientConfig) -> Self {
        let network_name = config.network.as_str();
        Self {
            config,
            session: RwLock::new(None),
            connected: AtomicBool::new(false),
            latest_block: AtomicU64::new(0),
            network_name: RwLock::new(network_name),
            reconnect_target: RwLock::new(None),
            last_attempt: Mutex::new(None),
        }
    }

    pub fn latest_block(&self) -> u64 {
        self.latest_block.load(Ordering::Relaxed)
    }

    /// Last known connectivity without probing the node.
    pub fn connected_flag(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> Option<String> {
        self.session.read().as_ref().map(|s| s.transport.url().to_string())
    }

    /// Event kinds that have an installed filter.
    pub fn installed_filters(&self) -> Vec<EventKind> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.filters.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_contract(&self, name: &str) -> bool {
        self.session.read().as_ref().is_some_and(|s| match name {
            TOKEN_CONTRACT => s.token.is_some(),
            REGISTRY_CONTRACT => s.registry.is_some(),
            _ => false,
        })
    }

    /// Opens the RPC connection, checks the chain id, loads contract bindings
    /// and installs event filters from the current block.
    #[instrument(skip(self, endpoint_override), fields(repo = "ledger", operation = "initialize"))]
    pub async fn initialize(
        &self,
        network: Network,
        endpoint_override: Option<&str>,
    ) -> Result<(), LedgerError> {
        let url = endpoint_override
            .or(self.config.rpc_url.as_deref())
            .unwrap_or_else(|| network.default_rpc_url())
            .to_string();
        info!(network = network.as_str(), url = %url, "connecting to ledger");
        *self.reconnect_target.write() = Some((network, url.clone()));
        *self.last_attempt.lock() = Some(Instant::now());

        let transport = RpcTransport::new(&url, self.config.request_timeout)?;
        let chain_id = transport
            .chain_id()
            .await
            .map_err(|e| LedgerError::Connection(format!("{url}: {e}")))?;
        if chain_id != network.expected_chain_id() {
            warn!(
                expected = network.expected_chain_id(),
                actual = chain_id,
                "chain id mismatch"
            );
        }
        let block = transport
            .block_number()
            .await
            .map_err(|e| LedgerError::Connection(format!("{url}: {e}")))?;

        let token = bind_contract(
            TOKEN_CONTRACT,
            &self.config.token_address,
            &self.config,
        );
        let registry = bind_contract(
            REGISTRY_CONTRACT,
            &self.config.registry_address,
            &self.config,
        );
        let filters = match &registry {
            Some(binding) => install_filters(&transport, binding, block).await,
            None => {
                warn!("registry contract not loaded; skipping event monitoring");
                BTreeMap::new()
            }
        };

        *self.session.write() = Some(Arc::new(Session {
            transport,
            network,
            token,
            registry,
            filters,
        }));
        *self.network_name.write() = network.as_str();
        self.latest_block.store(block, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
        info!(chain_id, block, network = network.as_str(), "connected to ledger");
        Ok(())
    }

    /// Drops bindings, filters and the connection. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.reconnect_target.write().take();
        let had_session = self.session.write().take().is_some();
        self.connected.store(false, Ordering::Relaxed);
        if had_session {
            info!("disconnected from ledger");
        }
    }

    /// Re-runs `initialize` against the last target when no session is open,
    /// at most once per retry delay.
    async fn try_reconnect(&self) -> bool {
        let target = self.reconnect_target.read().clone();
        let Some((network, url)) = target else {
            return false;
        };
        {
            let mut last = self.last_attempt.lock();
            if last.is_some_and(|t| t.elapsed() < self.config.retry.delay) {
                return false;
            }
            *last = Some(Instant::now());
        }
        match self.initialize(network, Some(&url)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, operation = "reconnect", "ledger still unreachable");
                false
            }
        }
    }

    fn session(&self) -> Result<Arc<Session>, LedgerError> {
        self.session.read().clone().ok_or(LedgerError::NotConnected)
    }

    fn registry(session: &Session) -> Result<&ContractBinding, LedgerError> {
        session
            .registry
            .as_ref()
            .ok_or(LedgerError::ContractUnavailable(REGISTRY_CONTRACT))
    }

    /// Encodes, calls with retry, and decodes one view function.
    async fn call_contract(
        &self,
        session: &Session,
        binding: &ContractBinding,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, LedgerError> {
        let func = binding
            .abi
            .function(function)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| LedgerError::Abi(format!("function {function} not in ABI")))?;
        let input = func
            .abi_encode_input(args)
            .map_err(|e| LedgerError::Abi(format!("{function}: {e}")))?;
        let raw = self
            .config
            .retry
            .run(function, || session.transport.call(binding.address, &input))
            .await
            .into_result(function)?;
        let values = func
            .abi_decode_output(&raw)
            .map_err(|e| LedgerError::Decode(format!("{function}: {e}")))?;
        Ok(flatten_single_tuple(values))
    }

    async fn fetch_device(
        &self,
        session: &Session,
        registry: &ContractBinding,
        device_id: &str,
        now_secs: u64,
    ) -> Result<RawDevice, LedgerError> {
        let values = self
            .call_contract(
                session,
                registry,
                "gpus",
                &[DynSolValue::String(device_id.to_string())],
            )
            .await?;
        decode_device(device_id, &values, now_secs)
    }

    async fn fetch_group(
        &self,
        session: &Session,
        registry: &ContractBinding,
        word: B256,
    ) -> Result<RawGroup, LedgerError> {
        let values = self
            .call_contract(session, registry, "subnets", &[DynSolValue::FixedBytes(word, 32)])
            .await?;
        decode_group(&word, &values)
    }

    /// Lists device ids, then fetches each record with bounded concurrency.
    /// A device whose fetch fails is logged and left out.
    async fn try_device_data(&self) -> Result<HashMap<String, RawDevice>, LedgerError> {
        let session = self.session()?;
        let registry = Self::registry(&session)?;
        let out = self
            .call_contract(&session, registry, "getAllGPUIds", &[])
            .await?;
        let ids: Vec<String> = out
            .first()
            .and_then(DynSolValue::as_array)
            .ok_or_else(|| LedgerError::Decode("getAllGPUIds: expected string[]".into()))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let now_secs = now_millis() / 1000;
        let session = &session;
        let fetched: Vec<_> = stream::iter(ids)
            .map(|id| async move {
                let result = self.fetch_device(session, registry, &id, now_secs).await;
                (id, result)
            })
            .buffer_unordered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut devices = HashMap::with_capacity(fetched.len());
        for (id, result) in fetched {
            match result {
                Ok(device) => {
                    devices.insert(id, device);
                }
                Err(e) => error!(error = %e, device_id = %id, "failed to fetch device"),
            }
        }
        Ok(devices)
    }

    /// Active groups only; a group whose fetch fails is logged and left out.
    async fn try_group_data(&self) -> Result<HashMap<String, RawGroup>, LedgerError> {
        let session = self.session()?;
        let registry = Self::registry(&session)?;
        let out = self
            .call_contract(&session, registry, "getAllSubnetIds", &[])
            .await?;
        let words: Vec<B256> = out
            .first()
            .and_then(DynSolValue::as_array)
            .ok_or_else(|| LedgerError::Decode("getAllSubnetIds: expected bytes32[]".into()))?
            .iter()
            .filter_map(as_word)
            .collect();

        let session = &session;
        let fetched: Vec<_> = stream::iter(words)
            .map(|word| async move { (word, self.fetch_group(session, registry, word).await) })
            .buffer_unordered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut groups = HashMap::with_capacity(fetched.len());
        for (word, result) in fetched {
            match result {
                Ok(group) if group.active => {
                    groups.insert(group.group_id.clone(), group);
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, group_id = %hex::encode(word), "failed to fetch group"),
            }
        }
        Ok(groups)
    }

    async fn try_system_stats(&self) -> Result<LedgerStats, LedgerError> {
        let session = self.session()?;
        let registry = Self::registry(&session)?;
        let what = "getSystemStats";
        let values = self.call_contract(&session, registry, what, &[]).await?;
        Ok(LedgerStats::from_counters(
            as_u64(field(&values, 0, what)?, what)?,
            as_u64(field(&values, 1, what)?, what)?,
            as_u64(field(&values, 2, what)?, what)?,
            as_u64(field(&values, 3, what)?, what)? as f64,
            self.latest_block(),
            session.network.as_str(),
        ))
    }

    async fn drain_filter(
        &self,
        session: &Session,
        kind: EventKind,
        filter: &EventFilter,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let logs = session.transport.filter_changes(&filter.id).await?;
        let observed_at = now_millis();
        Ok(logs
            .iter()
            .filter_map(|log| match decode_event(kind, &filter.event, log, observed_at) {
                Ok(event) => Some(event),
                Err(e) => {
                    error!(
                        error = %e,
                        event = kind.abi_name(),
                        block = log.block(),
                        "undecodable log; skipping"
                    );
                    None
                }
            })
            .collect())
    }
}

fn bind_contract(name: &str, address: &str, config: &LedgerClientConfig) -> Option<ContractBinding> {
    let address = match address.parse::<Address>() {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, contract = name, address, "invalid contract address");
            return None;
        }
    };
    let abi = load_contract_abi(name, &config.abi_root);
    info!(contract = name, address = %address.to_checksum(None), "loaded contract binding");
    Some(ContractBinding { address, abi })
}

async fn install_filters(
    transport: &RpcTransport,
    registry: &ContractBinding,
    from_block: u64,
) -> BTreeMap<EventKind, EventFilter> {
    let mut filters = BTreeMap::new();
    for kind in EventKind::ALL {
        let Some(event) = registry
            .abi
            .event(kind.abi_name())
            .and_then(|overloads| overloads.first())
        else {
            debug!(event = kind.abi_name(), "event not in ABI; no filter");
            continue;
        };
        match transport
            .new_filter(registry.address, event.selector(), from_block)
            .await
        {
            Ok(id) => {
                debug!(event = kind.abi_name(), filter_id = %id, "installed event filter");
                filters.insert(
                    kind,
                    EventFilter {
                        id,
                        event: event.clone(),
                    },
                );
            }
            Err(e) => {
                error!(error = %e, event = kind.abi_name(), "failed to install event filter");
            }
        }
    }
    filters
}

/// A function returning a single struct decodes as one tuple; unwrap it so
/// callers index fields positionally either way.
fn flatten_single_tuple(values: Vec<DynSolValue>) -> Vec<DynSolValue> {
    if values.len() == 1 {
        if let Some(DynSolValue::Tuple(inner)) = values.first() {
            return inner.clone();
        }
    }
    values
}

fn field<'a>(values: &'a [DynSolValue], idx: usize, what: &str) -> Result<&'a DynSolValue, LedgerError> {
    values
        .get(idx)
        .ok_or_else(|| LedgerError::Decode(format!("{what}: missing field {idx}")))
}

fn as_string(v: &DynSolValue, what: &str) -> Result<String, LedgerError> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| LedgerError::Decode(format!("{what}: expected string")))
}

fn as_address(v: &DynSolValue, what: &str) -> Result<Address, LedgerError> {
    v.as_address()
        .ok_or_else(|| LedgerError::Decode(format!("{what}: expected address")))
}

fn as_bool(v: &DynSolValue, what: &str) -> Result<bool, LedgerError> {
    v.as_bool()
        .ok_or_else(|| LedgerError::Decode(format!("{what}: expected bool")))
}

fn as_u64(v: &DynSolValue, what: &str) -> Result<u64, LedgerError> {
    v.as_uint()
        .map(|(u, _)| u.saturating_to::<u64>())
        .ok_or_else(|| LedgerError::Decode(format!("{what}: expected uint")))
}

fn as_word(v: &DynSolValue) -> Option<B256> {
    match v {
        DynSolValue::FixedBytes(word, 32) => Some(*word),
        _ => None,
    }
}

/// Lowercase hex without prefix; the zero word means "no group".
fn group_key(word: &B256) -> Option<String> {
    if word.is_zero() {
        None
    } else {
        Some(hex::encode(word))
    }
}

/// Decodes the `gpus(id)` tuple. `now_secs` decides whether a rental is
/// still running.
pub fn decode_device(
    device_id: &str,
    values: &[DynSolValue],
    now_secs: u64,
) -> Result<RawDevice, LedgerError> {
    let what = "gpus";
    let owner = as_address(field(values, 1, what)?, what)?;
    let renter = as_address(field(values, 2, what)?, what)?;
    let rental_end = as_u64(field(values, 8, what)?, what)?;
    let group_word = as_word(field(values, 9, what)?)
        .ok_or_else(|| LedgerError::Decode("gpus: expected bytes32 group".into()))?;
    let is_rented = renter != Address::ZERO;
    Ok(RawDevice {
        device_id: as_string(field(values, 0, what)?, what).unwrap_or_else(|_| device_id.to_string()),
        owner: owner.to_checksum(None),
        renter: if is_rented {
            renter.to_checksum(None)
        } else {
            ZERO_ADDRESS.to_string()
        },
        compute_capacity: as_u64(field(values, 3, what)?, what)? as f64,
        memory_size: as_u64(field(values, 4, what)?, what)? as f64,
        model: as_string(field(values, 5, what)?, what)?,
        active: as_bool(field(values, 6, what)?, what)?,
        rental_start: as_u64(field(values, 7, what)?, what)?,
        rental_end,
        current_group: group_key(&group_word),
        is_rented,
        rental_active: is_rented && now_secs < rental_end,
    })
}

/// Decodes the `subnets(id)` tuple.
pub fn decode_group(group_word: &B256, values: &[DynSolValue]) -> Result<RawGroup, LedgerError> {
    let what = "subnets";
    let member_ids = field(values, 2, what)?
        .as_array()
        .ok_or_else(|| LedgerError::Decode("subnets: expected string[] members".into()))?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    Ok(RawGroup {
        group_id: hex::encode(group_word),
        coordinator: as_address(field(values, 1, what)?, what)?.to_checksum(None),
        member_ids,
        total_compute: as_u64(field(values, 3, what)?, what)? as f64,
        total_memory: as_u64(field(values, 4, what)?, what)? as f64,
        created_at: as_u64(field(values, 5, what)?, what)?,
        active: as_bool(field(values, 6, what)?, what)?,
        purpose: as_string(field(values, 7, what)?, what)?,
    })
}

fn value_to_json(v: &DynSolValue) -> Value {
    match v {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::Uint(u, _) => uint_to_json(u),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(hex::encode(&word.as_slice()[..(*size).min(32)]))
        }
        DynSolValue::Bytes(b) => Value::String(hex::encode_prefixed(b)),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        other => Value::String(format!("{other:?}")),
    }
}

fn uint_to_json(u: &U256) -> Value {
    if *u <= U256::from(u64::MAX) {
        Value::from(u.saturating_to::<u64>())
    } else {
        Value::String(u.to_string())
    }
}

fn decode_event(
    kind: EventKind,
    event: &Event,
    log: &RpcLog,
    observed_at: u64,
) -> Result<LedgerEvent, LedgerError> {
    let topics = log.topic_words()?;
    let data = log.data_bytes()?;
    let decoded = event
        .decode_log_parts(topics, &data)
        .map_err(|e| LedgerError::Decode(format!("{}: {e}", kind.abi_name())))?;

    let mut indexed = decoded.indexed.iter();
    let mut body = decoded.body.iter();
    let mut args = BTreeMap::new();
    for (i, param) in event.inputs.iter().enumerate() {
        let value = if param.indexed {
            indexed.next()
        } else {
            body.next()
        };
        if let Some(value) = value {
            let name = if param.name.is_empty() {
                format!("arg{i}")
            } else {
                param.name.clone()
            };
            args.insert(name, value_to_json(value));
        }
    }

    Ok(LedgerEvent {
        kind,
        block_number: log.block(),
        transaction_hash: log.transaction_hash.clone().unwrap_or_default(),
        args,
        observed_at,
    })
}

/// Failed reads are logged here and come back empty; a missing session is
/// expected before `initialize` and only logged at debug.
fn log_read_failure(operation: &str, e: &LedgerError) {
    match e {
        LedgerError::NotConnected => debug!(operation, "ledger not connected"),
        _ => error!(error = %e, operation, "ledger read failed"),
    }
}

#[async_trait]
impl LedgerSource for LedgerClient {
    async fn is_connected(&self) -> bool {
        let Ok(session) = self.session() else {
            return self.try_reconnect().await;
        };
        match session.transport.block_number().await {
            Ok(block) => {
                self.latest_block.store(block, Ordering::Relaxed);
                self.connected.store(true, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!(error = %e, operation = "is_connected", "ledger liveness probe failed");
                self.connected.store(false, Ordering::Relaxed);
                false
            }
        }
    }

    #[instrument(skip(self), fields(repo = "ledger", operation = "get_all_device_data"))]
    async fn get_all_device_data(&self) -> HashMap<String, RawDevice> {
        match self.try_device_data().await {
            Ok(devices) => {
                info!(devices = devices.len(), "fetched device data from ledger");
                devices
            }
            Err(e) => {
                log_read_failure("get_all_device_data", &e);
                HashMap::new()
            }
        }
    }

    #[instrument(skip(self), fields(repo = "ledger", operation = "get_all_group_data"))]
    async fn get_all_group_data(&self) -> HashMap<String, RawGroup> {
        match self.try_group_data().await {
            Ok(groups) => {
                info!(groups = groups.len(), "fetched group data from ledger");
                groups
            }
            Err(e) => {
                log_read_failure("get_all_group_data", &e);
                HashMap::new()
            }
        }
    }

    #[instrument(skip(self), fields(repo = "ledger", operation = "get_system_stats"))]
    async fn get_system_stats(&self) -> LedgerStats {
        match self.try_system_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                log_read_failure("get_system_stats", &e);
                let connected = self.is_connected().await;
                LedgerStats::degraded(connected, self.latest_block(), self.network_name())
            }
        }
    }

    async fn get_recent_events(&self, kinds: Option<&[EventKind]>) -> Vec<LedgerEvent> {
        let Ok(session) = self.session() else {
            return vec![];
        };
        if session.filters.is_empty() {
            return vec![];
        }
        let kinds = kinds.unwrap_or(&EventKind::ALL);
        let mut events = Vec::new();
        for kind in kinds {
            let Some(filter) = session.filters.get(kind) else {
                continue;
            };
            match self.drain_filter(&session, *kind, filter).await {
                Ok(mut batch) => events.append(&mut batch),
                Err(e) => error!(error = %e, event = kind.abi_name(), "failed to read events"),
            }
        }
        events.sort_by_key(|e| e.block_number);
        events
    }

    fn network_name(&self) -> &str {
        *self.network_name.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn device_tuple(renter: Address, rental_end: u64, group: B256) -> Vec<DynSolValue> {
        vec![
            DynSolValue::String("gpu_007".into()),
            DynSolValue::Address(addr(0x11)),
            DynSolValue::Address(renter),
            DynSolValue::Uint(U256::from(83u64), 256),
            DynSolValue::Uint(U256::from(24u64), 256),
            DynSolValue::String("RTX 4090".into()),
            DynSolValue::Bool(true),
            DynSolValue::Uint(U256::from(100u64), 256),
            DynSolValue::Uint(U256::from(rental_end), 256),
            DynSolValue::FixedBytes(group, 32),
        ]
    }

    #[test]
    fn decode_device_unrented_without_group() {
        let d = decode_device("gpu_007", &device_tuple(Address::ZERO, 0, B256::ZERO), 50).unwrap();
        assert_eq!(d.device_id, "gpu_007");
        assert!(!d.is_rented);
        assert!(!d.rental_active);
        assert_eq!(d.renter, ZERO_ADDRESS);
        assert_eq!(d.current_group, None);
        assert_eq!(d.compute_capacity, 83.0);
        assert_eq!(d.memory_size, 24.0);
        assert_eq!(d.model, "RTX 4090");
    }

    #[test]
    fn decode_device_rented_in_group() {
        let group = B256::repeat_byte(0xab);
        let d = decode_device("gpu_007", &device_tuple(addr(0x22), 200, group), 150).unwrap();
        assert!(d.is_rented);
        assert!(d.rental_active);
        assert_eq!(d.current_group.as_deref(), Some(hex::encode(group).as_str()));

        let expired = decode_device("gpu_007", &device_tuple(addr(0x22), 200, group), 250).unwrap();
        assert!(expired.is_rented);
        assert!(!expired.rental_active);
    }

    #[test]
    fn decode_device_rejects_short_tuple() {
        let values = vec![DynSolValue::String("gpu_007".into())];
        assert!(decode_device("gpu_007", &values, 0).is_err());
    }

    #[test]
    fn decode_group_reads_members() {
        let word = B256::repeat_byte(0x01);
        let values = vec![
            DynSolValue::FixedBytes(word, 32),
            DynSolValue::Address(addr(0x33)),
            DynSolValue::Array(vec![
                DynSolValue::String("gpu_001".into()),
                DynSolValue::String("gpu_002".into()),
            ]),
            DynSolValue::Uint(U256::from(166u64), 256),
            DynSolValue::Uint(U256::from(48u64), 256),
            DynSolValue::Uint(U256::from(1_700_000_000u64), 256),
            DynSolValue::Bool(true),
            DynSolValue::String("ML Training".into()),
        ];
        let g = decode_group(&word, &values).unwrap();
        assert_eq!(g.group_id, hex::encode(word));
        assert_eq!(g.member_count(), 2);
        assert_eq!(g.created_at, 1_700_000_000);
        assert_eq!(g.purpose, "ML Training");
    }

    #[test]
    fn single_struct_output_is_flattened() {
        let inner = vec![DynSolValue::Bool(true), DynSolValue::String("x".into())];
        let out = flatten_single_tuple(vec![DynSolValue::Tuple(inner.clone())]);
        assert_eq!(out, inner);
    }

    #[test]
    fn large_uint_args_become_strings() {
        assert_eq!(uint_to_json(&U256::from(7u64)), Value::from(7u64));
        let big = U256::from(u64::MAX) + U256::from(1u64);
        assert!(uint_to_json(&big).is_string());
    }

    #[tokio::test]
    async fn unconnected_client_degrades_without_errors() {
        let client = LedgerClient::new(LedgerClientConfig::default());
        assert!(!client.is_connected().await);
        assert!(client.get_all_device_data().await.is_empty());
        assert!(client.get_all_group_data().await.is_empty());
        assert!(client.get_recent_events(None).await.is_empty());
        let stats = client.get_system_stats().await;
        assert!(!stats.ledger_connected);
        assert_eq!(stats.total_devices, None);
        assert_eq!(stats.network, "testnet");
        client.disconnect();
        client.disconnect();
    }
}
