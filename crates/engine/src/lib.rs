//! forkbench
//!
//! Drives a Hardhat-compatible dev node from a profile and sizes front-running
//! trades against constant-product pools.

pub mod amm;
pub mod frontrun;
pub mod node;
pub mod pair;
pub mod quote_server;
pub mod rpc;

#[cfg(test)]
mod test_support;

pub use forkbench_config as config;
pub use forkbench_config::{Config, ConfigError};
pub use amm::{amount_out, Pool, FEE_DENOMINATOR, FEE_NUMERATOR};
pub use frontrun::{
    bounded_analytic, max_frontrun_analytic, max_frontrun_binary, simulate, sweep, FrontrunError,
    SandwichParams, SandwichQuote, SearchBounds, SweepRow, DEFAULT_MARGIN_WEI, DEFAULT_UPPER_WEI,
};
pub use node::{AppliedProfile, NodeClient, NodeError};
pub use pair::{Address, PairError, PairReader, PoolState, Reserves};
pub use quote_server::{create_quote_router, run_quote_server, QuoteStats, ServerError, ServerState};
pub use rpc::{RpcClient, RpcError};
