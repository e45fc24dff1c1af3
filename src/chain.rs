//! Chain node access over Ethereum-style JSON-RPC
//!
//! The ledger and the balance gateway only see the [`ChainClient`] and
//! [`TokenReader`] traits; [`JsonRpcClient`] is the production implementation.

use crate::error::ChainError;
use crate::transaction::is_account_id;
use async_trait::async_trait;
use num_bigint::BigUint;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// `balanceOf(address)` function selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// Native-coin balance lookups and transaction broadcast.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Balance in minor units as a decimal string.
    async fn native_balance(&self, account: &str) -> Result<String, ChainError>;

    /// Broadcasts a signed payload and returns the transaction hash.
    async fn submit_signed_transaction(&self, payload: &str) -> Result<String, ChainError>;
}

/// Token-contract balance lookups.
#[async_trait]
pub trait TokenReader: Send + Sync {
    /// Balance in the token's minor units as a decimal string.
    async fn token_balance(&self, account: &str) -> Result<String, ChainError>;
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client for a single node endpoint and token contract.
pub struct JsonRpcClient {
    url: String,
    token_contract: String,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(
        url: impl Into<String>,
        token_contract: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChainError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(url, token_contract, client))
    }

    /// Create a client with custom reqwest client
    pub fn with_client(
        url: impl Into<String>,
        token_contract: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            url: url.into(),
            token_contract: token_contract.into(),
            client,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn token_contract(&self) -> &str {
        &self.token_contract
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "rpc.call");
        let response: RpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        response.result.ok_or_else(|| {
            ChainError::MalformedResponse(format!("{} returned neither result nor error", method))
        })
    }
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    async fn native_balance(&self, account: &str) -> Result<String, ChainError> {
        if !is_account_id(account) {
            return Err(ChainError::InvalidAccount(account.to_string()));
        }
        let quantity: String = self
            .call("eth_getBalance", json!([account, "latest"]))
            .await?;
        hex_to_decimal(&quantity)
    }

    async fn submit_signed_transaction(&self, payload: &str) -> Result<String, ChainError> {
        let hash: String = self
            .call("eth_sendRawTransaction", json!([payload]))
            .await?;
        if hash.is_empty() {
            return Err(ChainError::MalformedResponse(
                "eth_sendRawTransaction returned an empty hash".to_string(),
            ));
        }
        Ok(hash)
    }
}

#[async_trait]
impl TokenReader for JsonRpcClient {
    async fn token_balance(&self, account: &str) -> Result<String, ChainError> {
        let data = balance_of_calldata(account)?;
        let word: String = self
            .call(
                "eth_call",
                json!([{ "to": self.token_contract, "data": data }, "latest"]),
            )
            .await?;
        hex_to_decimal(&word)
    }
}

/// ABI-encodes `balanceOf(account)`: selector followed by the address
/// left-padded to 32 bytes.
pub fn balance_of_calldata(account: &str) -> Result<String, ChainError> {
    if !is_account_id(account) {
        return Err(ChainError::InvalidAccount(account.to_string()));
    }
    Ok(format!(
        "0x{}{:0>64}",
        BALANCE_OF_SELECTOR,
        account[2..].to_ascii_lowercase()
    ))
}

/// Converts a `0x`-prefixed hex quantity or ABI word to a decimal string
/// without going through any fixed-width or floating type.
pub fn hex_to_decimal(hex_value: &str) -> Result<String, ChainError> {
    let digits = hex_value.strip_prefix("0x").ok_or_else(|| {
        ChainError::MalformedResponse(format!("Expected 0x-prefixed hex, got '{}'", hex_value))
    })?;
    if digits.is_empty() {
        return Err(ChainError::MalformedResponse(
            "Empty hex value".to_string(),
        ));
    }
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .map(|n| n.to_str_radix(10))
        .ok_or_else(|| ChainError::MalformedResponse(format!("Invalid hex value '{}'", hex_value)))
}
