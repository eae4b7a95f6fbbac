//! Dev-chain profile configuration for forkbench
//!
//! Handles loading Hardhat-style network profiles from TOML files, layering
//! profiles, environment variable overrides, and compiler selection.

pub mod config;
pub mod solc;

pub use config::*;
pub use solc::{SolcVersion, VersionReq};
