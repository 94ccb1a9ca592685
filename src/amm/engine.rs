//! Pool mutations shared by legacy and v2 pools

use super::math::{
    initial_liquidity, optimal_deposit, pro_rata, shares_for_deposit, swap_out, MINI_LIQUIDITY,
};
use super::{
    canonical_pair, insert_pool, legacy_pair_id, load_pool, pool_reserves_address,
    refresh_reserves, Pool, PoolKind,
};
use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::revert::RevertEvent;
use crate::ledger::{Apply, Ledger, NewToken};
use crate::summary;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CreatePool {
    pub kind: PoolKind,
    /// v2 only; legacy pairs derive their id from the sorted ticks
    pub pair_id: String,
    pub tick0: String,
    pub tick1: String,
    pub amt0: Amount,
    pub amt1: Amount,
    pub holder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidityOutcome {
    pub pair_id: String,
    pub tick0: String,
    pub tick1: String,
    pub amt0_out: Amount,
    pub amt1_out: Amount,
    pub liquidity: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapOutcome {
    pub pair_id: String,
    pub tick_in: String,
    pub tick_out: String,
    pub amt_in: Amount,
    pub amt_out: Amount,
}

/// Load the pool and log its current row so rollback can restore it as-is
fn require_pool(ledger: &Ledger<'_, Apply>, kind: PoolKind, pair_id: &str) -> IndexerResult<Pool> {
    let pool = load_pool(ledger.conn(), kind, pair_id)?
        .ok_or_else(|| IndexerError::validation("the contract does not exist"))?;
    ledger.record(&RevertEvent::PoolReserves {
        kind,
        pair_id: pool.pair_id.clone(),
        amt0: pool.amt0,
        amt1: pool.amt1,
        liquidity: pool.liquidity,
    })?;
    Ok(pool)
}

/// Create a pool, seed it with both deposits and mint the initial shares
pub fn create_pool(ledger: &Ledger<'_, Apply>, req: &CreatePool) -> IndexerResult<LiquidityOutcome> {
    if req.tick0 == req.tick1 {
        return Err(IndexerError::validation("the token symbol must be different"));
    }

    let (tick0, tick1, amt0, amt1) = canonical_pair(&req.tick0, &req.tick1, req.amt0, req.amt1);
    let pair_id = match req.kind {
        PoolKind::Legacy => legacy_pair_id(&tick0, &tick1),
        PoolKind::V2 => req.pair_id.clone(),
    };

    if load_pool(ledger.conn(), req.kind, &pair_id)?.is_some() {
        return Err(IndexerError::validation("the pair has been created"));
    }

    let liquidity = initial_liquidity(amt0, amt1)?;
    let reserves = pool_reserves_address(&pair_id);

    let pool = Pool {
        kind: req.kind,
        pair_id: pair_id.clone(),
        tick0: tick0.clone(),
        tick1: tick1.clone(),
        amt0: Amount::ZERO,
        amt1: Amount::ZERO,
        liquidity: Amount::ZERO,
        reserves_address: reserves.clone(),
        holder: req.holder.clone(),
    };
    insert_pool(ledger.conn(), &pool, ledger.ctx())?;
    ledger.record(&match req.kind {
        PoolKind::Legacy => RevertEvent::LegacyPoolCreate {
            pair_id: pair_id.clone(),
        },
        PoolKind::V2 => RevertEvent::PoolCreate {
            pair_id: pair_id.clone(),
        },
    })?;

    ledger.deploy_token(&NewToken {
        token: pair_id.clone(),
        symbol: "Liquidity Provider".to_string(),
        name: String::new(),
        max_supply: None,
        lim: None,
        holder: reserves.clone(),
    })?;

    ledger.transfer(&tick0, &req.holder, &reserves, amt0)?;
    ledger.transfer(&tick1, &req.holder, &reserves, amt1)?;

    ledger.mint(&pair_id, &req.holder, liquidity)?;
    ledger.mint(&pair_id, &reserves, Amount::new(MINI_LIQUIDITY))?;

    refresh_reserves(ledger.conn(), req.kind, &pair_id)?;

    log::info!(
        "🏊 {} pool created {} ({} / {}) liquidity={}",
        req.kind.protocol(),
        pair_id,
        tick0,
        tick1,
        liquidity
    );

    Ok(LiquidityOutcome {
        pair_id,
        tick0,
        tick1,
        amt0_out: amt0,
        amt1_out: amt1,
        liquidity,
    })
}

/// Add liquidity at the current reserve ratio; only the ratio-optimal amounts move
#[allow(clippy::too_many_arguments)]
pub fn add_liquidity(
    ledger: &Ledger<'_, Apply>,
    kind: PoolKind,
    pair_id: &str,
    holder: &str,
    amt0: Amount,
    amt1: Amount,
    amt0_min: Amount,
    amt1_min: Amount,
) -> IndexerResult<LiquidityOutcome> {
    let pool = require_pool(ledger, kind, pair_id)?;

    let (out0, out1) = optimal_deposit(amt0, amt1, amt0_min, amt1_min, pool.amt0, pool.amt1)?;
    let shares = shares_for_deposit(out0, out1, pool.amt0, pool.amt1, pool.liquidity)?;
    if shares.is_zero() {
        return Err(IndexerError::validation("insufficient liquidity minted"));
    }

    ledger.transfer(&pool.tick0, holder, &pool.reserves_address, out0)?;
    ledger.transfer(&pool.tick1, holder, &pool.reserves_address, out1)?;
    ledger.mint(pool.lp_token(), holder, shares)?;

    refresh_reserves(ledger.conn(), kind, pair_id)?;

    Ok(LiquidityOutcome {
        pair_id: pool.pair_id.clone(),
        tick0: pool.tick0.clone(),
        tick1: pool.tick1.clone(),
        amt0_out: out0,
        amt1_out: out1,
        liquidity: shares,
    })
}

/// Burn `liquidity` shares for a pro-rata slice of both reserves
pub fn remove_liquidity(
    ledger: &Ledger<'_, Apply>,
    kind: PoolKind,
    pair_id: &str,
    holder: &str,
    liquidity: Amount,
) -> IndexerResult<LiquidityOutcome> {
    let pool = require_pool(ledger, kind, pair_id)?;

    if liquidity.is_zero() || liquidity > pool.liquidity {
        return Err(IndexerError::validation(
            "the amount of liquidity exceeds the total",
        ));
    }

    let out0 = pro_rata(liquidity, pool.amt0, pool.liquidity)?;
    let out1 = pro_rata(liquidity, pool.amt1, pool.liquidity)?;
    if out0 > pool.amt0 || out1 > pool.amt1 {
        return Err(IndexerError::validation(
            "the amount of tokens exceeds the reserves",
        ));
    }
    if out0.is_zero() || out1.is_zero() {
        return Err(IndexerError::validation("insufficient liquidity burned"));
    }

    ledger.transfer(&pool.tick0, &pool.reserves_address, holder, out0)?;
    ledger.transfer(&pool.tick1, &pool.reserves_address, holder, out1)?;
    ledger.burn(pool.lp_token(), holder, liquidity)?;

    refresh_reserves(ledger.conn(), kind, pair_id)?;

    Ok(LiquidityOutcome {
        pair_id: pool.pair_id.clone(),
        tick0: pool.tick0.clone(),
        tick1: pool.tick1.clone(),
        amt0_out: out0,
        amt1_out: out1,
        liquidity,
    })
}

/// Quote an exact-in swap without mutating anything
pub fn quote_swap(pool: &Pool, tick_in: &str, amt_in: Amount) -> IndexerResult<(String, Amount)> {
    let (reserve_in, reserve_out, tick_out) = pool
        .orient(tick_in)
        .ok_or_else(|| IndexerError::validation("the contract does not exist err"))?;
    let (_, out) = swap_out(amt_in, reserve_in, reserve_out)?;
    Ok((tick_out.to_string(), out))
}

/// Exact-in swap with a 0.3% fee that stays in the pool
pub fn swap(
    ledger: &Ledger<'_, Apply>,
    kind: PoolKind,
    pair_id: &str,
    holder: &str,
    tick_in: &str,
    amt_in: Amount,
    amt_out_min: Amount,
) -> IndexerResult<SwapOutcome> {
    let pool = require_pool(ledger, kind, pair_id)?;
    let (tick_out, amt_out) = quote_swap(&pool, tick_in, amt_in)?;

    if amt_out < amt_out_min {
        return Err(IndexerError::validation(
            "the amount of tokens is less than the minimum",
        ));
    }
    if amt_out.is_zero() {
        return Err(IndexerError::validation("insufficient output amount"));
    }

    ledger.transfer(tick_in, holder, &pool.reserves_address, amt_in)?;
    ledger.transfer(&tick_out, &pool.reserves_address, holder, amt_out)?;

    refresh_reserves(ledger.conn(), kind, pair_id)?;

    summary::record_swap(
        ledger.conn(),
        tick_in,
        amt_in,
        &tick_out,
        amt_out,
        ledger.ctx().block_time,
    )?;

    log::debug!(
        "🔁 swap {} {} {} -> {} {}",
        pair_id,
        amt_in,
        tick_in,
        amt_out,
        tick_out
    );

    Ok(SwapOutcome {
        pair_id: pair_id.to_string(),
        tick_in: tick_in.to_string(),
        tick_out,
        amt_in,
        amt_out,
    })
}
