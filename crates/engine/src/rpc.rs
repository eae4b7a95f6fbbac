//! JSON-RPC 2.0 client for a Hardhat-compatible node

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to the node
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Node answered with HTTP status {0}")]
    Status(u16),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Response carried neither result nor error")]
    MissingResult,
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

/// Thin JSON-RPC client; ids increase monotonically per client
pub struct RpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` with positional `params` and decode the result as `T`
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        log::debug!("rpc -> {} #{}", method, id);
        let response = self.http.post(&self.url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(RpcError::Status(response.status().as_u16()));
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            log::debug!("rpc <- {} #{} error {}", method, id, err.code);
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let result = body.result.ok_or(RpcError::MissingResult)?;
        serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("{}: {}", method, e)))
    }
}

/// Parse a hex quantity such as `0x1a` into a number
pub fn parse_quantity(s: &str) -> Result<u64, RpcError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Decode(format!("quantity '{}' lacks 0x prefix", s)))?;
    if digits.is_empty() {
        return Err(RpcError::Decode("empty quantity".to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|e| RpcError::Decode(format!("quantity '{}': {}", s, e)))
}

/// Encode a number as a hex quantity (no leading zeros)
pub fn to_quantity(n: u64) -> String {
    format!("{:#x}", n)
}
