//! Constant-product pool math
//!
//! Amounts are wei-denominated `f64`; pool reserves routinely exceed what the
//! intermediate `u128` products could hold.

use serde::{Deserialize, Serialize};

/// Uniswap V2 fee: 0.3% of the input stays in the pool
pub const FEE_NUMERATOR: f64 = 997.0;
pub const FEE_DENOMINATOR: f64 = 1000.0;

/// Output of swapping `amount_in` into a pool, after the fee
pub fn amount_out(amount_in: f64, reserve_in: f64, reserve_out: f64, fee: f64) -> f64 {
    let in_with_fee = amount_in * fee;
    in_with_fee * reserve_out / (reserve_in * FEE_DENOMINATOR + in_with_fee)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub reserve_in: f64,
    pub reserve_out: f64,
    pub fee: f64,
}

impl Pool {
    pub fn new(reserve_in: f64, reserve_out: f64) -> Self {
        Self {
            reserve_in,
            reserve_out,
            fee: FEE_NUMERATOR,
        }
    }

    /// Swap in the `in` token; returns the amount out and the pool afterwards
    pub fn swap_exact_in(&self, amount_in: f64) -> (f64, Pool) {
        let out = amount_out(amount_in, self.reserve_in, self.reserve_out, self.fee);
        let after = Pool {
            reserve_in: self.reserve_in + amount_in,
            reserve_out: self.reserve_out - out,
            fee: self.fee,
        };
        (out, after)
    }

    /// Same pool seen from the other token
    pub fn reversed(&self) -> Pool {
        Pool {
            reserve_in: self.reserve_out,
            reserve_out: self.reserve_in,
            fee: self.fee,
        }
    }

    pub fn invariant(&self) -> f64 {
        self.reserve_in * self.reserve_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ETH: f64 = 1e18;

    #[test]
    fn test_amount_out_known_value() {
        let out = amount_out(ETH, 10.0 * ETH, 10.0 * ETH, FEE_NUMERATOR);
        assert!((out / 9.066108938801491e17 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_in_zero_out() {
        assert_eq!(amount_out(0.0, 10.0 * ETH, 10.0 * ETH, FEE_NUMERATOR), 0.0);
    }

    #[test]
    fn test_no_fee_preserves_invariant() {
        let pool = Pool {
            reserve_in: 10.0 * ETH,
            reserve_out: 20.0 * ETH,
            fee: FEE_DENOMINATOR,
        };
        let (_, after) = pool.swap_exact_in(3.0 * ETH);
        assert!((after.invariant() / pool.invariant() - 1.0).abs() < 1e-12);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_swap_bounded_and_fee_grows_invariant(
            reserve_in in 1e15f64..1e24,
            reserve_out in 1e15f64..1e24,
            amount_in in 1e9f64..1e24,
        ) {
            let pool = Pool::new(reserve_in, reserve_out);
            let (out, after) = pool.swap_exact_in(amount_in);

            prop_assert!(out > 0.0);
            prop_assert!(out < reserve_out);
            prop_assert!(after.invariant() >= pool.invariant() * (1.0 - 1e-12));
        }

        #[test]
        fn prop_round_trip_loses_value(
            reserve in 1e18f64..1e24,
            amount_in in 1e12f64..1e22,
        ) {
            let pool = Pool::new(reserve, reserve);
            let (tokens, after) = pool.swap_exact_in(amount_in);
            let (back, _) = after.reversed().swap_exact_in(tokens);
            prop_assert!(back < amount_in);
        }
    }
}
