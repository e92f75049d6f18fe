use thiserror::Error;

/// Errors raised by ledger reads. The aggregator treats all of them as a
/// signal to degrade, never as fatal.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The RPC endpoint could not be reached during initialization.
    #[error("connection error: {0}")]
    Connection(String),

    /// HTTP-level failure (unreachable endpoint, timeout, bad body).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// ABI artifact or encoding problem.
    #[error("abi error: {0}")]
    Abi(String),

    /// A response could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The named contract binding is not loaded.
    #[error("contract {0} not available")]
    ContractUnavailable(&'static str),

    /// No session; `initialize` has not succeeded or `disconnect` was called.
    #[error("ledger not connected")]
    NotConnected,

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<LedgerError>,
    },
}
