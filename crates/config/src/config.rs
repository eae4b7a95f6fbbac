//! Core profile structures and loading logic

use crate::solc::{SolcVersion, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use url::Url;

/// Compiler used when a profile names none
pub const DEFAULT_SOLC_VERSION: &str = "0.8.9";

/// Chain id of a local Hardhat network
pub const DEFAULT_CHAIN_ID: u64 = 31337;

/// JSON-RPC endpoint of a locally running node
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Profile parsed but breaks a schema rule
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

fn invalid<T>(msg: impl Into<String>) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid(msg.into()))
}

fn default_true() -> bool {
    true
}

/// Network forking: replay chain state from a remote node at a pinned height
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForkingConfig {
    /// Remote archive node endpoint
    pub url: String,
    /// Block height to fork from (latest if None)
    #[serde(default, alias = "blockNumber", skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// solc optimizer settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptimizerSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Estimated number of calls per contract; trades code size against call cost
    #[serde(default = "default_optimizer_runs")]
    pub runs: u32,
}

fn default_optimizer_runs() -> u32 {
    200
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            runs: default_optimizer_runs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CompilerSettings {
    #[serde(default)]
    pub optimizer: OptimizerSettings,
}

/// One compiler release, optionally with optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompilerConfig {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<CompilerSettings>,
}

impl CompilerConfig {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            settings: None,
        }
    }

    pub fn with_optimizer(mut self, runs: u32) -> Self {
        self.settings = Some(CompilerSettings {
            optimizer: OptimizerSettings {
                enabled: true,
                runs,
            },
        });
        self
    }

    pub fn effective_optimizer(&self) -> OptimizerSettings {
        self.settings.map(|s| s.optimizer).unwrap_or_default()
    }

    pub fn solc_version(&self) -> Option<SolcVersion> {
        SolcVersion::parse(&self.version)
    }
}

/// Compiler selection, in any of the three accepted shapes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SolidityConfig {
    /// `solidity = "0.8.9"`
    Version(String),
    /// `[solidity]` with an ordered `compilers` list
    Multi {
        compilers: Vec<CompilerConfig>,
        /// Source path -> compiler used for that file only
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        overrides: BTreeMap<String, CompilerConfig>,
    },
    /// `[solidity]` with a single `version` and optional `settings`
    Single(CompilerConfig),
}

impl Default for SolidityConfig {
    fn default() -> Self {
        SolidityConfig::Version(DEFAULT_SOLC_VERSION.to_string())
    }
}

impl SolidityConfig {
    /// Normalized, order-preserving compiler list
    pub fn compilers(&self) -> Vec<CompilerConfig> {
        match self {
            SolidityConfig::Version(v) => vec![CompilerConfig::new(v.clone())],
            SolidityConfig::Multi { compilers, .. } => compilers.clone(),
            SolidityConfig::Single(c) => vec![c.clone()],
        }
    }

    pub fn overrides(&self) -> Option<&BTreeMap<String, CompilerConfig>> {
        match self {
            SolidityConfig::Multi { overrides, .. } => Some(overrides),
            _ => None,
        }
    }

    /// Pick the highest configured compiler satisfying a `pragma solidity` constraint
    pub fn select_compiler(&self, pragma: &str) -> Result<Option<CompilerConfig>, ConfigError> {
        let req = VersionReq::parse(pragma).map_err(ConfigError::Invalid)?;

        Ok(self
            .compilers()
            .into_iter()
            .filter_map(|c| c.solc_version().map(|v| (v, c)))
            .filter(|(v, _)| req.matches(v))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, c)| c))
    }

    /// Compiler for a given source file: a path override wins over pragma matching
    pub fn compiler_for_source(
        &self,
        source_path: &str,
        pragma: &str,
    ) -> Result<Option<CompilerConfig>, ConfigError> {
        if let Some(c) = self.overrides().and_then(|o| o.get(source_path)) {
            return Ok(Some(c.clone()));
        }
        self.select_compiler(pragma)
    }
}

/// Delay between automatically mined blocks, in milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MiningInterval {
    /// Fixed delay; 0 disables interval mining
    Fixed(u64),
    /// Uniformly random delay in `[min, max]`
    Range([u64; 2]),
}

impl Default for MiningInterval {
    fn default() -> Self {
        MiningInterval::Fixed(0)
    }
}

impl MiningInterval {
    pub fn is_disabled(&self) -> bool {
        matches!(self, MiningInterval::Fixed(0))
    }

    /// Parse `"1000"` or `"500,2000"`
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_once(',') {
            Some((min, max)) => Some(MiningInterval::Range([
                min.trim().parse().ok()?,
                max.trim().parse().ok()?,
            ])),
            None => s.trim().parse().ok().map(MiningInterval::Fixed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MempoolOrder {
    Fifo,
    #[default]
    Priority,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MempoolConfig {
    #[serde(default)]
    pub order: MempoolOrder,
}

/// Block production behavior of the local network
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MiningConfig {
    /// Mine a block for every transaction
    #[serde(default = "default_true")]
    pub auto: bool,
    #[serde(default)]
    pub interval: MiningInterval,
    #[serde(default)]
    pub mempool: MempoolConfig,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            auto: true,
            interval: MiningInterval::default(),
            mempool: MempoolConfig::default(),
        }
    }
}

impl MiningConfig {
    /// Blocks are only produced on explicit request
    pub fn is_manual(&self) -> bool {
        !self.auto && self.interval.is_disabled()
    }
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HardhatNetworkConfig {
    #[serde(default = "default_chain_id", alias = "chainId")]
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forking: Option<ForkingConfig>,
    #[serde(default)]
    pub mining: MiningConfig,
}

impl Default for HardhatNetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            forking: None,
            mining: MiningConfig::default(),
        }
    }
}

impl HardhatNetworkConfig {
    /// Forking section, only when it is switched on
    pub fn active_fork(&self) -> Option<&ForkingConfig> {
        self.forking.as_ref().filter(|f| f.enabled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NetworksConfig {
    #[serde(default)]
    pub hardhat: HardhatNetworkConfig,
}

/// Where forkbench reaches the running node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    #[serde(default = "default_rpc_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_secs: default_rpc_timeout_secs(),
        }
    }
}

/// A profile layered on top of another; absent sections keep the base's
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ProfileOverlay {
    #[serde(default)]
    pub solidity: Option<SolidityConfig>,
    #[serde(default)]
    pub networks: Option<NetworksOverlay>,
    #[serde(default)]
    pub rpc: Option<RpcConfig>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct NetworksOverlay {
    #[serde(default)]
    pub hardhat: Option<HardhatNetworkOverlay>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct HardhatNetworkOverlay {
    #[serde(default, alias = "chainId")]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub forking: Option<ForkingConfig>,
    #[serde(default)]
    pub mining: Option<MiningConfig>,
}

impl ProfileOverlay {
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let overlay: ProfileOverlay = toml::from_str(content)?;
        Ok(overlay)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub solidity: SolidityConfig,
    #[serde(default)]
    pub networks: NetworksConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the profile and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Parse a base profile with an overlay profile merged on top
    pub fn parse_layered(base: &str, overlay: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_toml(base)?;
        config.merge(ProfileOverlay::parse_toml(overlay)?);
        Ok(config)
    }

    /// Replace every section the overlay profile sets
    ///
    /// Sections are `solidity`, `rpc`, and under `networks.hardhat` the
    /// `chain_id`, `forking` and `mining` entries. A replaced section takes
    /// the overlay's values and defaults, never the base's.
    pub fn merge(&mut self, overlay: ProfileOverlay) {
        if let Some(solidity) = overlay.solidity {
            self.solidity = solidity;
        }
        if let Some(rpc) = overlay.rpc {
            self.rpc = rpc;
        }
        if let Some(hardhat) = overlay.networks.and_then(|n| n.hardhat) {
            let base = &mut self.networks.hardhat;
            if let Some(chain_id) = hardhat.chain_id {
                base.chain_id = chain_id;
            }
            if let Some(forking) = hardhat.forking {
                base.forking = Some(forking);
            }
            if let Some(mining) = hardhat.mining {
                base.mining = mining;
            }
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - FORK_URL -> networks.hardhat.forking.url (creates the section)
    /// - FORK_BLOCK_NUMBER -> networks.hardhat.forking.block_number
    /// - FORK_ENABLED -> networks.hardhat.forking.enabled
    /// - MINING_AUTO -> networks.hardhat.mining.auto
    /// - MINING_INTERVAL -> networks.hardhat.mining.interval ("1000" or "500,2000")
    /// - RPC_URL -> rpc.url
    pub fn apply_env_overrides(&mut self) {
        let hardhat = &mut self.networks.hardhat;

        // FORK_URL
        if let Ok(url) = env::var("FORK_URL") {
            if !url.trim().is_empty() {
                match hardhat.forking.as_mut() {
                    Some(fork) => fork.url = url,
                    None => {
                        hardhat.forking = Some(ForkingConfig {
                            url,
                            block_number: None,
                            enabled: true,
                        })
                    }
                }
            }
        }

        if let Some(fork) = hardhat.forking.as_mut() {
            // FORK_BLOCK_NUMBER
            if let Ok(val) = env::var("FORK_BLOCK_NUMBER") {
                if let Ok(block) = val.parse::<u64>() {
                    fork.block_number = Some(block);
                }
            }

            // FORK_ENABLED
            if let Ok(val) = env::var("FORK_ENABLED") {
                if let Some(enabled) = parse_bool(&val) {
                    fork.enabled = enabled;
                }
            }
        }

        // MINING_AUTO
        if let Ok(val) = env::var("MINING_AUTO") {
            if let Some(auto) = parse_bool(&val) {
                hardhat.mining.auto = auto;
            }
        }

        // MINING_INTERVAL
        if let Ok(val) = env::var("MINING_INTERVAL") {
            if let Some(interval) = MiningInterval::parse(&val) {
                hardhat.mining.interval = interval;
            }
        }

        // RPC_URL
        if let Ok(url) = env::var("RPC_URL") {
            if !url.trim().is_empty() {
                self.rpc.url = url;
            }
        }
    }

    /// Check the schema rules the node would otherwise reject at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_solidity()?;
        self.validate_network()?;
        self.validate_rpc()?;
        Ok(())
    }

    fn validate_solidity(&self) -> Result<(), ConfigError> {
        let compilers = self.solidity.compilers();
        if compilers.is_empty() {
            return invalid("solidity.compilers must list at least one compiler");
        }

        let mut seen = Vec::with_capacity(compilers.len());
        for compiler in &compilers {
            let version = check_compiler(compiler)?;
            if seen.contains(&version) {
                return invalid(format!("compiler {} is listed more than once", version));
            }
            seen.push(version);
        }

        if let Some(overrides) = self.solidity.overrides() {
            for (path, compiler) in overrides {
                check_compiler(compiler)
                    .map_err(|e| ConfigError::Invalid(format!("override for '{}': {}", path, e)))?;
            }
        }

        Ok(())
    }

    fn validate_network(&self) -> Result<(), ConfigError> {
        let hardhat = &self.networks.hardhat;

        if hardhat.chain_id == 0 {
            return invalid("networks.hardhat.chain_id must be greater than 0");
        }

        if let Some(fork) = hardhat.active_fork() {
            if fork.url.trim().is_empty() {
                return invalid("networks.hardhat.forking.url cannot be empty");
            }
            check_endpoint(
                "networks.hardhat.forking.url",
                &fork.url,
                &["http", "https", "ws", "wss"],
            )?;
        }

        if let MiningInterval::Range([min, max]) = hardhat.mining.interval {
            if min > max {
                return invalid(format!(
                    "mining interval range [{}, {}] has min greater than max",
                    min, max
                ));
            }
            if max == 0 {
                return invalid("mining interval range [0, 0] is not a range; use interval = 0");
            }
        }

        Ok(())
    }

    fn validate_rpc(&self) -> Result<(), ConfigError> {
        check_endpoint("rpc.url", &self.rpc.url, &["http", "https"])?;
        if self.rpc.timeout_secs == 0 {
            return invalid("rpc.timeout_secs must be greater than 0");
        }
        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Same as [`Config::load`] with an optional overlay profile merged first
    pub fn load_layered<P: AsRef<Path>, Q: AsRef<Path>>(
        base: P,
        overlay: Option<Q>,
    ) -> Result<Self, ConfigError> {
        let mut config = match overlay {
            Some(overlay) => {
                let base = fs::read_to_string(base)?;
                let overlay = fs::read_to_string(overlay)?;
                Self::parse_layered(&base, &overlay)?
            }
            None => Self::load_from_file(base)?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn check_compiler(compiler: &CompilerConfig) -> Result<SolcVersion, ConfigError> {
    let version = compiler.solc_version().ok_or_else(|| {
        ConfigError::Invalid(format!(
            "compiler version '{}' is not of the form major.minor.patch",
            compiler.version
        ))
    })?;
    if !version.is_known_release() {
        return invalid(format!("compiler version {} is not a known solc release", version));
    }
    Ok(version)
}

/// Parse an endpoint and require one of `schemes` plus a non-empty host
fn check_endpoint(field: &str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        ConfigError::Invalid(format!("{} '{}' is not a valid URL: {}", field, raw, e))
    })?;

    if !schemes.contains(&url.scheme()) {
        return invalid(format!(
            "{} must use one of the schemes {}, got '{}'",
            field,
            schemes.join("/"),
            url.scheme()
        ));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => invalid(format!("{} '{}' has no host", field, raw)),
    }
}

// Accept "true", "1", "yes" as true; "false", "0", "no" as false
fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
