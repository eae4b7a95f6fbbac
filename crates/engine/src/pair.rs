//! Read-only access to a Uniswap V2 style pair contract

use crate::node::{NodeClient, NodeError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// `getReserves()`
pub const GET_RESERVES_SELECTOR: &str = "0x0902f1ac";
/// `token0()`
pub const TOKEN0_SELECTOR: &str = "0x0dfe1681";
/// `token1()`
pub const TOKEN1_SELECTOR: &str = "0xd21220a7";

#[derive(Debug, Error)]
pub enum PairError {
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Malformed return data: {0}")]
    MalformedReturn(String),

    #[error(transparent)]
    Node(#[from] NodeError),
}

/// 20-byte account address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl FromStr for Address {
    type Err = PairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| PairError::InvalidAddress(s.to_string()))?;
        let bytes = hex::decode(digits).map_err(|_| PairError::InvalidAddress(s.to_string()))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| PairError::InvalidAddress(s.to_string()))?;
        Ok(Address(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Decoded `getReserves()` output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reserves {
    pub reserve0: u128,
    pub reserve1: u128,
    pub block_timestamp_last: u32,
}

impl Reserves {
    /// Decode the three 32-byte words returned by `getReserves()`
    pub fn decode(hex_data: &str) -> Result<Self, PairError> {
        let words = decode_words(hex_data, 3)?;
        Ok(Self {
            reserve0: word_to_u128(&words[0])?,
            reserve1: word_to_u128(&words[1])?,
            block_timestamp_last: u32::try_from(word_to_u128(&words[2])?)
                .map_err(|_| PairError::MalformedReturn("timestamp exceeds uint32".to_string()))?,
        })
    }
}

/// A pair's reserves together with its token ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolState {
    pub token0: Address,
    pub token1: Address,
    pub reserves: Reserves,
}

impl PoolState {
    /// `(reserve_in, reserve_out)` when swapping the base token in
    pub fn oriented(&self, base_is_token0: bool) -> (f64, f64) {
        let (r0, r1) = (self.reserves.reserve0 as f64, self.reserves.reserve1 as f64);
        if base_is_token0 {
            (r0, r1)
        } else {
            (r1, r0)
        }
    }
}

fn decode_words(hex_data: &str, count: usize) -> Result<Vec<[u8; 32]>, PairError> {
    let digits = hex_data.strip_prefix("0x").unwrap_or(hex_data);
    let bytes = hex::decode(digits).map_err(|e| PairError::MalformedReturn(e.to_string()))?;
    if bytes.len() < count * 32 {
        return Err(PairError::MalformedReturn(format!(
            "expected {} bytes, got {}",
            count * 32,
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(32)
        .take(count)
        .map(|chunk| {
            let mut word = [0u8; 32];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

fn word_to_u128(word: &[u8; 32]) -> Result<u128, PairError> {
    if word[..16].iter().any(|&b| b != 0) {
        return Err(PairError::MalformedReturn("value exceeds uint128".to_string()));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

fn word_to_address(word: &[u8; 32]) -> Result<Address, PairError> {
    if word[..12].iter().any(|&b| b != 0) {
        return Err(PairError::MalformedReturn("dirty address padding".to_string()));
    }
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&word[12..]);
    Ok(Address(addr))
}

pub struct PairReader<'a> {
    node: &'a NodeClient,
    pair: Address,
}

impl<'a> PairReader<'a> {
    pub fn new(node: &'a NodeClient, pair: Address) -> Self {
        Self { node, pair }
    }

    pub async fn reserves(&self) -> Result<Reserves, PairError> {
        let out = self
            .node
            .eth_call(&self.pair.to_string(), GET_RESERVES_SELECTOR)
            .await?;
        Reserves::decode(&out)
    }

    pub async fn tokens(&self) -> Result<(Address, Address), PairError> {
        let token0 = self.read_address(TOKEN0_SELECTOR).await?;
        let token1 = self.read_address(TOKEN1_SELECTOR).await?;
        Ok((token0, token1))
    }

    pub async fn state(&self) -> Result<PoolState, PairError> {
        let (token0, token1) = self.tokens().await?;
        let reserves = self.reserves().await?;
        log::debug!(
            "pair {} reserves {} / {}",
            self.pair,
            reserves.reserve0,
            reserves.reserve1
        );
        Ok(PoolState {
            token0,
            token1,
            reserves,
        })
    }

    async fn read_address(&self, selector: &str) -> Result<Address, PairError> {
        let out = self.node.eth_call(&self.pair.to_string(), selector).await?;
        let words = decode_words(&out, 1)?;
        word_to_address(&words[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockNode;

    const PAIR: &str = "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

    fn word(n: u128) -> String {
        format!("{:064x}", n)
    }

    fn address_word(addr: &str) -> String {
        format!("{:0>64}", addr.trim_start_matches("0x"))
    }

    #[test]
    fn test_address_parse_and_display() {
        let addr: Address = PAIR.parse().unwrap();
        assert_eq!(addr.to_string(), PAIR);

        let upper: Address = "0xB4E16D0168E52D35CACD2C6185B44281EC28C9DC".parse().unwrap();
        assert_eq!(upper, addr);

        assert!("b4e16d0168e52d35cacd2c6185b44281ec28c9dc".parse::<Address>().is_err());
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz".parse::<Address>().is_err());
    }

    #[test]
    fn test_reserves_decode() {
        let data = format!(
            "0x{}{}{}",
            word(10_000_000_000_000),
            word(5_000_000_000_000_000_000_000),
            word(1_650_000_000)
        );
        let reserves = Reserves::decode(&data).unwrap();
        assert_eq!(reserves.reserve0, 10_000_000_000_000);
        assert_eq!(reserves.reserve1, 5_000_000_000_000_000_000_000);
        assert_eq!(reserves.block_timestamp_last, 1_650_000_000);
    }

    #[test]
    fn test_reserves_decode_rejects_short_or_oversized() {
        assert!(Reserves::decode(&format!("0x{}", word(1))).is_err());
        let oversized = format!("0x{}{}{}", "f".repeat(64), word(1), word(1));
        assert!(Reserves::decode(&oversized).is_err());
    }

    #[test]
    fn test_oriented() {
        let state = PoolState {
            token0: USDC.parse().unwrap(),
            token1: WETH.parse().unwrap(),
            reserves: Reserves {
                reserve0: 100,
                reserve1: 7,
                block_timestamp_last: 0,
            },
        };
        assert_eq!(state.oriented(true), (100.0, 7.0));
        assert_eq!(state.oriented(false), (7.0, 100.0));
    }

    #[tokio::test]
    async fn test_reader_against_node() {
        let node = MockNode::start().await;
        node.set_call_result(PAIR, TOKEN0_SELECTOR, &format!("0x{}", address_word(USDC)))
            .await;
        node.set_call_result(PAIR, TOKEN1_SELECTOR, &format!("0x{}", address_word(WETH)))
            .await;
        node.set_call_result(
            PAIR,
            GET_RESERVES_SELECTOR,
            &format!("0x{}{}{}", word(42), word(84), word(7)),
        )
        .await;

        let client = NodeClient::new(node.client());
        let reader = PairReader::new(&client, PAIR.parse().unwrap());
        let state = reader.state().await.unwrap();

        assert_eq!(state.token0.to_string(), USDC);
        assert_eq!(state.token1.to_string(), WETH);
        assert_eq!(state.reserves.reserve0, 42);
        assert_eq!(state.reserves.reserve1, 84);
    }

    #[tokio::test]
    async fn test_reader_propagates_revert() {
        let node = MockNode::start().await;
        let client = NodeClient::new(node.client());
        let reader = PairReader::new(&client, PAIR.parse().unwrap());

        let err = reader.reserves().await.unwrap_err();
        assert!(matches!(err, PairError::Node(_)));
    }
}
