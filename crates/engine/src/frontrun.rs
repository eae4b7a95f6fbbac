//! Front-running (sandwich) sizing against a constant-product pool
//!
//! The attacker buys ahead of a victim's swap, the victim executes at the
//! worse price, and the attacker sells everything back. The victim's
//! minimum-output check caps how much the attacker can buy.

use crate::amm::{amount_out, FEE_DENOMINATOR, FEE_NUMERATOR};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bisection never needs more halvings than this for f64 bounds
const MAX_BISECTIONS: usize = 256;

/// Default bisection bracket: up to 100 ETH, 10 gwei precision
pub const DEFAULT_UPPER_WEI: f64 = 100e18;
pub const DEFAULT_MARGIN_WEI: f64 = 1e10;

#[derive(Debug, Error, PartialEq)]
pub enum FrontrunError {
    #[error("Invalid search bounds: lower={lower}, upper={upper}, margin={margin}")]
    InvalidBounds { lower: f64, upper: f64, margin: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Victim swap reverts: best output {victim_out} is below minimum {min_out}")]
    VictimWouldRevert { victim_out: f64, min_out: f64 },

    #[error("Minimum output must be positive to bound the front-run")]
    Unbounded,
}

/// The victim's pending swap and the pool it targets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SandwichParams {
    /// Victim's input amount (in-token wei)
    pub victim_in: f64,
    /// Pool reserve of the token both parties pay with
    pub reserve_in: f64,
    /// Pool reserve of the token both parties buy
    pub reserve_out: f64,
    #[serde(default = "default_fee")]
    pub fee: f64,
    /// Multiplier applied to every swap output
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: f64,
}

fn default_fee() -> f64 {
    FEE_NUMERATOR
}

fn default_slippage_pct() -> f64 {
    1.0
}

impl SandwichParams {
    pub fn new(victim_in: f64, reserve_in: f64, reserve_out: f64) -> Self {
        Self {
            victim_in,
            reserve_in,
            reserve_out,
            fee: default_fee(),
            slippage_pct: default_slippage_pct(),
        }
    }

    fn check(&self) -> Result<(), FrontrunError> {
        let finite_positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(FrontrunError::InvalidInput(format!("{} must be positive, got {}", name, v)))
            }
        };
        finite_positive("reserve_in", self.reserve_in)?;
        finite_positive("reserve_out", self.reserve_out)?;
        finite_positive("victim_in", self.victim_in)?;
        finite_positive("slippage_pct", self.slippage_pct)?;
        if !(self.fee > 0.0 && self.fee <= FEE_DENOMINATOR) {
            return Err(FrontrunError::InvalidInput(format!(
                "fee must be in (0, {}], got {}",
                FEE_DENOMINATOR, self.fee
            )));
        }
        Ok(())
    }

    /// Victim's output if the attacker front-runs with `attacker_in`
    pub fn victim_out(&self, attacker_in: f64) -> f64 {
        simulate(self, attacker_in).victim_out
    }
}

/// Outcome of one sandwich
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SandwichQuote {
    /// Attacker's front-run input (in-token wei)
    pub attacker_in: f64,
    /// In-token the attacker recovers on the back-run
    pub attacker_out: f64,
    /// Out-token the victim receives
    pub victim_out: f64,
    /// `attacker_out - attacker_in`
    pub profit: f64,
}

/// Play front-run, victim swap and back-run against the pool
pub fn simulate(params: &SandwichParams, attacker_in: f64) -> SandwichQuote {
    let SandwichParams {
        victim_in,
        reserve_in,
        reserve_out,
        fee,
        slippage_pct,
    } = *params;

    let bought = amount_out(attacker_in, reserve_in, reserve_out, fee) * slippage_pct;
    let victim_out =
        amount_out(victim_in, reserve_in + attacker_in, reserve_out - bought, fee) * slippage_pct;
    let attacker_out = amount_out(
        bought,
        reserve_out - bought - victim_out,
        reserve_in + attacker_in + victim_in,
        fee,
    ) * slippage_pct;

    SandwichQuote {
        attacker_in,
        attacker_out,
        victim_out,
        profit: attacker_out - attacker_in,
    }
}

/// Largest front-run in `[lower, upper]` that keeps the victim at or above `min_out`
///
/// Bisects until the bracket is narrower than `margin` and returns the quote at
/// the feasible end, so the victim's swap never reverts.
pub fn max_frontrun_binary(
    params: &SandwichParams,
    min_out: f64,
    lower: f64,
    upper: f64,
    margin: f64,
) -> Result<SandwichQuote, FrontrunError> {
    params.check()?;
    if !(lower.is_finite() && upper.is_finite() && lower >= 0.0 && upper > lower && margin > 0.0) {
        return Err(FrontrunError::InvalidBounds {
            lower,
            upper,
            margin,
        });
    }

    let floor = params.victim_out(lower);
    if floor < min_out {
        return Err(FrontrunError::VictimWouldRevert {
            victim_out: floor,
            min_out,
        });
    }

    let (mut lo, mut hi) = (lower, upper);
    let mut halvings = 0;
    while hi - lo >= margin && halvings < MAX_BISECTIONS {
        let mid = lo + (hi - lo) / 2.0;
        if params.victim_out(mid) < min_out {
            hi = mid;
        } else {
            lo = mid;
        }
        halvings += 1;
    }

    log::trace!("bisection converged after {} halvings", halvings);
    Ok(simulate(params, lo))
}

/// Closed-form front-run size that leaves the victim exactly `min_out`
///
/// Solves the constant-product quadratic for the pool's in-reserve after the
/// attacker's buy. Ignoring the fee on the attacker's own swap makes this a
/// slight underestimate of the bisection result.
pub fn max_frontrun_analytic(params: &SandwichParams, min_out: f64) -> Result<f64, FrontrunError> {
    params.check()?;
    if !(min_out > 0.0) {
        return Err(FrontrunError::Unbounded);
    }

    let floor = params.victim_out(0.0);
    if floor < min_out {
        return Err(FrontrunError::VictimWouldRevert {
            victim_out: floor,
            min_out,
        });
    }

    let k = params.reserve_in * params.reserve_out;
    let fv = params.fee * params.victim_in;
    let a_out = min_out / params.slippage_pct;

    let disc = fv * fv + 4.0 * FEE_DENOMINATOR * fv * k / a_out;
    let reserve_in_after = (-fv + disc.sqrt()) / (2.0 * FEE_DENOMINATOR);

    Ok((reserve_in_after - params.reserve_in).max(0.0))
}

/// Closed-form size, or None when it has no finite answer
///
/// A non-positive `min_out` leaves the front-run unbounded and a victim
/// whose plain swap already misses `min_out` leaves nothing to size. Invalid
/// pool parameters are still errors.
pub fn bounded_analytic(params: &SandwichParams, min_out: f64) -> Result<Option<f64>, FrontrunError> {
    match max_frontrun_analytic(params, min_out) {
        Ok(x) => Ok(Some(x)),
        Err(FrontrunError::Unbounded) | Err(FrontrunError::VictimWouldRevert { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Bracket and tolerance for the bisection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchBounds {
    pub lower: f64,
    pub upper: f64,
    pub margin: f64,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: DEFAULT_UPPER_WEI,
            margin: DEFAULT_MARGIN_WEI,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub min_out: f64,
    /// None when the victim's swap would revert
    pub binary: Option<f64>,
    /// None when the closed form has no finite answer
    pub analytic: Option<f64>,
}

/// Compare both sizing methods over a series of victim minimum outputs
pub fn sweep(
    params: &SandwichParams,
    min_outs: impl IntoIterator<Item = f64>,
    bounds: SearchBounds,
) -> Result<Vec<SweepRow>, FrontrunError> {
    params.check()?;

    min_outs
        .into_iter()
        .map(|min_out| {
            let binary = match max_frontrun_binary(params, min_out, bounds.lower, bounds.upper, bounds.margin) {
                Ok(q) => Some(q.attacker_in),
                Err(FrontrunError::VictimWouldRevert { .. }) => None,
                Err(e) => return Err(e),
            };
            let analytic = bounded_analytic(params, min_out)?;
            Ok(SweepRow {
                min_out,
                binary,
                analytic,
            })
        })
        .collect()
}
