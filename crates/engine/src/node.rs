//! Control of a running Hardhat-compatible dev node
//!
//! Wraps the `hardhat_*` / `evm_*` management methods and pushes a loaded
//! profile's forking and mining settings onto the node.

use crate::config::{Config, ForkingConfig, MiningInterval};
use crate::rpc::{parse_quantity, to_quantity, RpcClient, RpcError};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Error type for node control
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: RpcError,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// What the node reported after a profile was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedProfile {
    pub block_number: u64,
    pub chain_id: u64,
    pub forked: bool,
    pub automine: bool,
    pub interval: MiningInterval,
}

pub struct NodeClient {
    rpc: RpcClient,
}

impl NodeClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    /// Build a client from the profile's `[rpc]` section
    pub fn from_config(config: &Config) -> Result<Self, NodeError> {
        let rpc = RpcClient::new(
            config.rpc.url.clone(),
            Duration::from_secs(config.rpc.timeout_secs),
        )?;
        Ok(Self::new(rpc))
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub async fn block_number(&self) -> Result<u64, NodeError> {
        let q: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        Ok(parse_quantity(&q)?)
    }

    pub async fn chain_id(&self) -> Result<u64, NodeError> {
        let q: String = self.rpc.call("eth_chainId", json!([])).await?;
        Ok(parse_quantity(&q)?)
    }

    pub async fn get_automine(&self) -> Result<bool, NodeError> {
        Ok(self.rpc.call("hardhat_getAutomine", json!([])).await?)
    }

    pub async fn set_automine(&self, enabled: bool) -> Result<(), NodeError> {
        let _: Value = self.rpc.call("evm_setAutomine", json!([enabled])).await?;
        Ok(())
    }

    /// `0` turns interval mining off, a range picks a random delay per block
    pub async fn set_interval_mining(&self, interval: &MiningInterval) -> Result<(), NodeError> {
        let param = match interval {
            MiningInterval::Fixed(ms) => json!(ms),
            MiningInterval::Range([min, max]) => json!([min, max]),
        };
        let _: Value = self.rpc.call("evm_setIntervalMining", json!([param])).await?;
        Ok(())
    }

    /// Mine `blocks` blocks immediately
    pub async fn mine(&self, blocks: u64) -> Result<(), NodeError> {
        match blocks {
            0 => {}
            1 => {
                let _: Value = self.rpc.call("evm_mine", json!([])).await?;
            }
            n => {
                let _: Value = self.rpc.call("hardhat_mine", json!([to_quantity(n)])).await?;
            }
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<String, NodeError> {
        Ok(self.rpc.call("evm_snapshot", json!([])).await?)
    }

    /// Roll back to a snapshot; false when the id is unknown or already used
    pub async fn revert(&self, snapshot_id: &str) -> Result<bool, NodeError> {
        Ok(self.rpc.call("evm_revert", json!([snapshot_id])).await?)
    }

    /// Reset the chain, optionally re-forking from a remote node
    pub async fn reset(&self, fork: Option<&ForkingConfig>) -> Result<(), NodeError> {
        let params = match fork {
            Some(fork) => {
                let mut forking = json!({ "jsonRpcUrl": fork.url });
                if let Some(block) = fork.block_number {
                    forking["blockNumber"] = json!(block);
                }
                json!([{ "forking": forking }])
            }
            None => json!([]),
        };
        let _: Value = self.rpc.call("hardhat_reset", params).await?;
        Ok(())
    }

    /// `eth_call` against the latest block, returning raw hex output
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String, NodeError> {
        Ok(self
            .rpc
            .call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?)
    }

    /// Push a profile's forking and mining settings onto the node
    ///
    /// Steps, stopping at the first failure:
    /// 1. Reset to the pinned fork (only when forking is enabled)
    /// 2. Set automine
    /// 3. Set interval mining
    /// 4. Read back block number and chain id
    pub async fn apply_profile(&self, config: &Config) -> Result<AppliedProfile, NodeError> {
        let hardhat = &config.networks.hardhat;
        let step = |step: &'static str| move |e: NodeError| match e {
            NodeError::Rpc(source) => NodeError::Step { step, source },
            other => other,
        };

        let fork = hardhat.active_fork();
        if let Some(fork) = fork {
            log::info!(
                "Forking {} at block {}",
                redact_url(&fork.url),
                fork.block_number
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "latest".to_string())
            );
            self.reset(Some(fork)).await.map_err(step("hardhat_reset"))?;
        }

        let mining = &hardhat.mining;
        self.set_automine(mining.auto)
            .await
            .map_err(step("evm_setAutomine"))?;
        self.set_interval_mining(&mining.interval)
            .await
            .map_err(step("evm_setIntervalMining"))?;
        if mining.is_manual() {
            log::info!("Manual mining: blocks are produced only on request");
        }

        let block_number = self.block_number().await.map_err(step("eth_blockNumber"))?;
        let chain_id = self.chain_id().await.map_err(step("eth_chainId"))?;
        if chain_id != hardhat.chain_id {
            log::warn!(
                "Node reports chain id {} but the profile expects {}",
                chain_id,
                hardhat.chain_id
            );
        }

        Ok(AppliedProfile {
            block_number,
            chain_id,
            forked: fork.is_some(),
            automine: mining.auto,
            interval: mining.interval,
        })
    }
}

/// Mask the parts of an endpoint that usually carry credentials
///
/// The last non-empty path segment (provider API keys), any password and the
/// whole query string are replaced by `***`. Input that does not parse as a
/// URL is masked entirely.
pub fn redact_url(raw: &str) -> String {
    let mut url = match Url::parse(raw.trim()) {
        Ok(url) if !url.cannot_be_a_base() => url,
        _ => return "***".to_string(),
    };

    if url.password().is_some() {
        let _ = url.set_password(Some("***"));
    }
    if url.query().is_some() {
        url.set_query(Some("***"));
    }
    url.set_fragment(None);

    let segments: Option<Vec<String>> = url
        .path_segments()
        .map(|segments| segments.map(str::to_string).collect());
    if let Some(mut segments) = segments {
        if let Some(last) = segments.iter_mut().rev().find(|s| !s.is_empty()) {
            *last = "***".to_string();
            url.set_path(&format!("/{}", segments.join("/")));
        }
    }

    url.to_string()
}
