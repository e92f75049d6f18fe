// Minimal Ethereum JSON-RPC transport over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, B256, hex};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::LedgerError;

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

/// Log entry as returned by `eth_getFilterChanges`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RpcLog {
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

impl RpcLog {
    pub(crate) fn block(&self) -> u64 {
        self.block_number
            .as_deref()
            .and_then(|b| parse_quantity(b).ok())
            .unwrap_or(0)
    }

    pub(crate) fn topic_words(&self) -> Result<Vec<B256>, LedgerError> {
        self.topics
            .iter()
            .map(|t| {
                t.parse::<B256>()
                    .map_err(|e| LedgerError::Decode(format!("topic {t}: {e}")))
            })
            .collect()
    }

    pub(crate) fn data_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        hex::decode(&self.data).map_err(|e| LedgerError::Decode(format!("log data: {e}")))
    }
}

/// Parses a `0x`-prefixed hex quantity.
pub(crate) fn parse_quantity(s: &str) -> Result<u64, LedgerError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| LedgerError::Decode(format!("quantity {s}: {e}")))
}

pub(crate) struct RpcTransport {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcTransport {
    pub(crate) fn new(url: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Connection(format!("http client: {e}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response: RpcResponse<T> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(err) = response.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| LedgerError::Decode(format!("{method}: missing result")))
    }

    pub(crate) async fn chain_id(&self) -> Result<u64, LedgerError> {
        let raw: String = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&raw)
    }

    pub(crate) async fn block_number(&self) -> Result<u64, LedgerError> {
        let raw: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
    }

    pub(crate) async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, LedgerError> {
        let raw: String = self
            .request(
                "eth_call",
                json!([
                    { "to": to.to_checksum(None), "data": hex::encode_prefixed(data) },
                    "latest"
                ]),
            )
            .await?;
        hex::decode(&raw).map_err(|e| LedgerError::Decode(format!("eth_call result: {e}")))
    }

    /// Installs a log filter for one event signature; returns the filter id.
    pub(crate) async fn new_filter(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
    ) -> Result<String, LedgerError> {
        self.request(
            "eth_newFilter",
            json!([{
                "address": address.to_checksum(None),
                "fromBlock": format!("0x{from_block:x}"),
                "topics": [hex::encode_prefixed(topic0)],
            }]),
        )
        .await
    }

    pub(crate) async fn filter_changes(&self, filter_id: &str) -> Result<Vec<RpcLog>, LedgerError> {
        self.request("eth_getFilterChanges", json!([filter_id])).await
    }
}
