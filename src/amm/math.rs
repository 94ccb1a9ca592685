//! Constant-product pool math
//!
//! Pure functions over [`Amount`]; all rounding is floor division.

use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};

/// Shares minted to the reserves address at creation and never redeemable
pub const MINI_LIQUIDITY: u64 = 1000;

/// Swap fee numerator over a per-mille denominator
pub const SWAP_FEE_PER_MILLE: u64 = 3;

/// `floor(sqrt(amt0 * amt1)) - MINI_LIQUIDITY`
pub fn initial_liquidity(amt0: Amount, amt1: Amount) -> IndexerResult<Amount> {
    let base = amt0.checked_mul(amt1)?.isqrt();
    let minimum = Amount::new(MINI_LIQUIDITY);
    if base <= minimum {
        return Err(IndexerError::validation(
            "add liquidity must be greater than MINI_LIQUIDITY firstly",
        ));
    }
    base.checked_sub(minimum)
}

/// Ratio-optimal deposit for an existing pool.
///
/// Tries `amt0` as the binding side first and falls back to `amt1`.
pub fn optimal_deposit(
    amt0: Amount,
    amt1: Amount,
    amt0_min: Amount,
    amt1_min: Amount,
    reserve0: Amount,
    reserve1: Amount,
) -> IndexerResult<(Amount, Amount)> {
    let amt1_optimal = amt0.checked_mul(reserve1)?.checked_div(reserve0)?;
    if amt1_optimal >= amt1_min && amt1 >= amt1_optimal {
        return Ok((amt0, amt1_optimal));
    }

    let amt0_optimal = amt1.checked_mul(reserve0)?.checked_div(reserve1)?;
    if amt0_optimal >= amt0_min && amt0 >= amt0_optimal {
        return Ok((amt0_optimal, amt1));
    }

    Err(IndexerError::validation(
        "the amount of tokens exceeds the balance",
    ))
}

/// `min(amt0 * total / reserve0, amt1 * total / reserve1)`
pub fn shares_for_deposit(
    amt0: Amount,
    amt1: Amount,
    reserve0: Amount,
    reserve1: Amount,
    total: Amount,
) -> IndexerResult<Amount> {
    let by0 = amt0.checked_mul(total)?.checked_div(reserve0)?;
    let by1 = amt1.checked_mul(total)?.checked_div(reserve1)?;
    Ok(by0.min(by1))
}

/// `liquidity * reserve / total`
pub fn pro_rata(liquidity: Amount, reserve: Amount, total: Amount) -> IndexerResult<Amount> {
    liquidity.checked_mul(reserve)?.checked_div(total)
}

/// `amount_in * reserve_out / (reserve_in + amount_in)`
pub fn constant_product_out(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
) -> IndexerResult<Amount> {
    amount_in
        .checked_mul(reserve_out)?
        .checked_div(reserve_in.checked_add(amount_in)?)
}

/// Exact-in swap quote: `(amount_in_after_fee, amount_out)`.
///
/// The fee is taken per whole thousand units of input: `fee = (amt / 1000) * 3`.
pub fn swap_out(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
) -> IndexerResult<(Amount, Amount)> {
    let fee = amount_in
        .checked_div(Amount::new(1000))?
        .checked_mul(Amount::new(SWAP_FEE_PER_MILLE))?;
    let net_in = amount_in.checked_sub(fee)?;
    let out = constant_product_out(net_in, reserve_in, reserve_out)?;
    Ok((net_in, out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(v: u64) -> Amount {
        Amount::new(v)
    }

    #[test]
    fn test_initial_liquidity() {
        assert_eq!(
            initial_liquidity(a(1_000_000), a(4_000_000)).unwrap(),
            a(2_000_000 - 1000)
        );
        assert!(initial_liquidity(a(1000), a(1000)).is_err());
        assert_eq!(initial_liquidity(a(1001), a(1001)).unwrap(), a(1));
    }

    #[test]
    fn test_swap_literal_quote() {
        // 100 in against 1000/2000: fee rounds to 0, 100 * 2000 / 1100 = 181
        let (net_in, out) = swap_out(a(100), a(1000), a(2000)).unwrap();
        assert_eq!(net_in, a(100));
        assert_eq!(out, a(181));
    }

    #[test]
    fn test_swap_fee_applied_per_thousand() {
        let (net_in, out) = swap_out(a(10_000), a(1_000_000), a(1_000_000)).unwrap();
        assert_eq!(net_in, a(9_970));
        assert_eq!(out, a(9_970 * 1_000_000 / 1_009_970));
    }

    #[test]
    fn test_product_never_decreases() {
        let (r0, r1) = (a(5_000_000), a(7_000_000));
        let k = r0.checked_mul(r1).unwrap();
        for amt in [1u64, 999, 1000, 12_345, 4_000_000] {
            let (_, out) = swap_out(a(amt), r0, r1).unwrap();
            let after = r0
                .checked_add(a(amt))
                .unwrap()
                .checked_mul(r1.checked_sub(out).unwrap())
                .unwrap();
            assert!(after >= k, "product shrank for input {}", amt);
        }
    }

    #[test]
    fn test_optimal_deposit_prefers_amt0_binding() {
        let (o0, o1) = optimal_deposit(a(100), a(500), a(0), a(0), a(1000), a(2000)).unwrap();
        assert_eq!((o0, o1), (a(100), a(200)));
    }

    #[test]
    fn test_optimal_deposit_falls_back_to_amt1() {
        let (o0, o1) = optimal_deposit(a(100), a(100), a(0), a(0), a(1000), a(2000)).unwrap();
        assert_eq!((o0, o1), (a(50), a(100)));
    }

    #[test]
    fn test_optimal_deposit_rejects_floors() {
        let err = optimal_deposit(a(100), a(100), a(80), a(150), a(1000), a(2000)).unwrap_err();
        assert_eq!(err.to_string(), "the amount of tokens exceeds the balance");
    }

    #[test]
    fn test_shares_take_the_smaller_side() {
        let shares = shares_for_deposit(a(100), a(300), a(1000), a(2000), a(1000)).unwrap();
        assert_eq!(shares, a(100));
    }
}
