//! Verification gate: read-only preconditions checked before a mutation
//!
//! Every check only reads. A failure is a `Validation` error whose text is stored verbatim on
//! the operation row; the mutation is then skipped for good.

use crate::amm::{self, canonical_pair, legacy_pair_id, PoolKind};
use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use crate::amm::math::initial_liquidity;
use crate::invite;
use crate::ledger::{aggregate, balance, TokenKind};
use crate::order;
use crate::pump::{self, DEPLOY_BUY_MAX, DOGE_MAX};
use crate::sale::{self, BoxStatus};
use crate::stake;
use crate::store::operations;
use crate::wdoge::{MIN_WITHDRAW, WDOGE_TICK};
use rusqlite::Connection;

pub const MAX_AMOUNT: &str = "99999999999999999999999999999999999999999";
pub const TICK_MIN_LEN: usize = 2;
pub const TICK_MAX_LEN: usize = 8;

fn reject<T>(msg: &str) -> IndexerResult<T> {
    Err(IndexerError::validation(msg))
}

fn ceiling() -> IndexerResult<Amount> {
    Amount::parse(MAX_AMOUNT)
}

fn positive(amts: &[Amount]) -> IndexerResult<()> {
    if amts.iter().any(Amount::is_zero) {
        return reject("the amount of tokens exceeds the 0");
    }
    Ok(())
}

fn covered(conn: &Connection, token: &str, holder: &str, amt: Amount) -> IndexerResult<()> {
    if balance(conn, token, holder)? < amt {
        return reject("the amount of tokens exceeds the balance");
    }
    Ok(())
}

fn tick_length(tick: &str) -> IndexerResult<()> {
    let len = tick.chars().count();
    if !(TICK_MIN_LEN..=TICK_MAX_LEN).contains(&len) {
        return reject("the token symbol must be 2 or 8 letters");
    }
    Ok(())
}

/// One applied trade per holder per height on bonding curves and v2 pools
fn one_trade_per_block(
    conn: &Connection,
    holder: &str,
    height: u64,
    protocol: &str,
    op: &str,
) -> IndexerResult<()> {
    if operations::has_applied_at(conn, holder, height, protocol, op)? {
        return reject("only one trade per address per block");
    }
    Ok(())
}

pub fn drc20_deploy(conn: &Connection, tick: &str, max: Amount, lim: Amount) -> IndexerResult<()> {
    tick_length(tick)?;
    positive(&[max, lim])?;
    let ceiling = ceiling()?;
    if max > ceiling || lim > ceiling {
        return reject(
            "the maximum value cannot be greater 99999999999999999999999999999999999999999",
        );
    }
    if max < lim {
        return reject("the maximum value is less than the limit value");
    }
    if aggregate(conn, tick)?.is_some() {
        return reject("has been deployed contracts");
    }
    Ok(())
}

pub fn drc20_mint(conn: &Connection, tick: &str, amt: Amount) -> IndexerResult<()> {
    tick_length(tick)?;
    let Some(agg) = aggregate(conn, tick)? else {
        return reject("the contract does not exist");
    };
    positive(&[amt])?;
    if let Some(lim) = agg.lim {
        if amt > lim {
            return reject("the amount of tokens exceeds the limit");
        }
    }
    if let Some(max) = agg.max_supply {
        if agg.amt_sum.checked_add(amt)? > max {
            return reject("the amount of tokens exceeds the maximum");
        }
    }
    Ok(())
}

pub fn drc20_transfer(
    conn: &Connection,
    tick: &str,
    sender: &str,
    amt: Amount,
    recipients: usize,
) -> IndexerResult<()> {
    positive(&[amt])?;
    if recipients == 0 {
        return reject("the transfer has no recipients");
    }
    if aggregate(conn, tick)?.is_none() {
        return reject("the contract does not exist");
    }
    let total = amt.checked_mul(Amount::new(recipients as u64))?;
    covered(conn, tick, sender, total)
}

pub fn meme20_deploy(tick: &str, name: &str, max: Amount) -> IndexerResult<()> {
    if tick.is_empty() || name.is_empty() {
        return reject("the token symbol and name must not be empty");
    }
    positive(&[max])?;
    if max > ceiling()? {
        return reject(
            "the maximum value cannot be greater 99999999999999999999999999999999999999999",
        );
    }
    Ok(())
}

pub fn meme20_transfer(
    conn: &Connection,
    tick_id: &str,
    sender: &str,
    amt: Amount,
    height: u64,
) -> IndexerResult<()> {
    positive(&[amt])?;
    if aggregate(conn, tick_id)?.is_none() {
        return reject("the contract does not exist");
    }
    if operations::has_applied_at(conn, sender, height, "pump", "trade")?
        || operations::has_applied_at(conn, sender, height, "pair-v2", "swap")?
    {
        return reject("the address has traded in this block");
    }
    covered(conn, tick_id, sender, amt)
}

pub fn wdoge_withdraw(conn: &Connection, holder: &str, amt: Amount) -> IndexerResult<()> {
    if amt < Amount::new(MIN_WITHDRAW) {
        return reject("the amount of tokens must be at least 1 DOGE");
    }
    covered(conn, WDOGE_TICK, holder, amt)
}

pub fn pair_create(
    conn: &Connection,
    kind: PoolKind,
    tick0: &str,
    tick1: &str,
    amt0: Amount,
    amt1: Amount,
    holder: &str,
) -> IndexerResult<()> {
    positive(&[amt0, amt1])?;
    if tick0 == tick1 {
        return reject("the token symbol must be different");
    }
    let (t0, t1, a0, a1) = canonical_pair(tick0, tick1, amt0, amt1);
    let exists = match kind {
        PoolKind::Legacy => amm::load_pool(conn, kind, &legacy_pair_id(&t0, &t1))?.is_some(),
        PoolKind::V2 => amm::v2_pair_exists(conn, &t0, &t1)?,
    };
    if exists {
        return reject("the contract has been created");
    }
    covered(conn, &t0, holder, a0)?;
    covered(conn, &t1, holder, a1)
}

pub fn pair_add(
    conn: &Connection,
    kind: PoolKind,
    pair_id: &str,
    holder: &str,
    amt0: Amount,
    amt1: Amount,
) -> IndexerResult<()> {
    positive(&[amt0, amt1])?;
    let Some(pool) = amm::load_pool(conn, kind, pair_id)? else {
        return reject("the contract does not exist");
    };
    covered(conn, &pool.tick0, holder, amt0)?;
    covered(conn, &pool.tick1, holder, amt1)
}

pub fn pair_remove(
    conn: &Connection,
    kind: PoolKind,
    pair_id: &str,
    holder: &str,
    liquidity: Amount,
) -> IndexerResult<()> {
    positive(&[liquidity])?;
    let Some(pool) = amm::load_pool(conn, kind, pair_id)? else {
        return reject("the contract does not exist");
    };
    if balance(conn, pool.lp_token(), holder)? < liquidity {
        return reject("the amount of liquidity exceeds the balance");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn pair_swap(
    conn: &Connection,
    kind: PoolKind,
    pair_id: &str,
    holder: &str,
    tick_in: &str,
    amt_in: Amount,
    amt_out_min: Amount,
    height: u64,
) -> IndexerResult<()> {
    positive(&[amt_in])?;
    if kind == PoolKind::V2 {
        one_trade_per_block(conn, holder, height, kind.protocol(), "swap")?;
    }
    let Some(pool) = amm::load_pool(conn, kind, pair_id)? else {
        return reject("the contract does not exist");
    };
    let (_, out) = amm::engine::quote_swap(&pool, tick_in, amt_in)?;
    if out < amt_out_min {
        return reject("the amount of tokens is less than the minimum");
    }
    covered(conn, tick_in, holder, amt_in)
}

pub fn pump_deploy(
    conn: &Connection,
    tick_id: &str,
    tick1_id: &str,
    reserve: u8,
    amt1: Amount,
    holder: &str,
) -> IndexerResult<()> {
    if reserve > 99 {
        return reject("the reserve must be between 0 and 99");
    }
    if reserve > 0 && !amt1.is_zero() {
        return reject("reserve and initial buy cannot be used together");
    }
    if tick1_id != WDOGE_TICK {
        return reject("the reserve currency must be WDOGE(WRAPPED-DOGE)");
    }
    if pump::load_pool(conn, tick_id)?.is_some() {
        return reject("the contract has been deployed");
    }
    if amt1 > Amount::new(DEPLOY_BUY_MAX) {
        return reject("the initial buy exceeds the maximum");
    }
    covered(conn, tick1_id, holder, amt1)
}

pub fn pump_trade(
    conn: &Connection,
    tick_id: &str,
    holder: &str,
    tick_in: &str,
    amt_in: Amount,
    height: u64,
) -> IndexerResult<()> {
    positive(&[amt_in])?;
    let Some(pool) = pump::load_pool(conn, tick_id)? else {
        return reject("the contract does not exist");
    };
    if pool.graduated || pool.amt1 >= Amount::new(DOGE_MAX) {
        return reject("pump inner plate has been completed");
    }
    one_trade_per_block(conn, holder, height, "pump", "trade")?;
    if tick_in != pool.tick_id && tick_in != pool.tick1_id {
        return reject("the contract does not exist err");
    }
    covered(conn, tick_in, holder, amt_in)
}

pub fn invite_bind(conn: &Connection, holder: &str, inviter: &str) -> IndexerResult<()> {
    if holder == inviter {
        return reject("the same address cannot be invited");
    }
    if invite::inviter_of(conn, holder)?.is_some() {
        return reject("already invited");
    }
    Ok(())
}

pub fn stake(conn: &Connection, tick: &str, holder: &str, amt: Amount) -> IndexerResult<()> {
    positive(&[amt])?;
    if aggregate(conn, tick)?.is_none() {
        return reject("the contract does not exist");
    }
    covered(conn, tick, holder, amt)
}

pub fn unstake(conn: &Connection, tick: &str, holder: &str, amt: Amount) -> IndexerResult<()> {
    positive(&[amt])?;
    let staked = stake::staked(conn, tick, holder)?.unwrap_or(Amount::ZERO);
    if staked < amt {
        return reject("the amount of tokens exceeds the staked amount");
    }
    Ok(())
}

pub fn stake_claim(conn: &Connection, tick: &str, holder: &str) -> IndexerResult<()> {
    if stake::load_pool(conn, tick)?.is_none() {
        return reject("stake pool does not exist");
    }
    if stake::pending_reward(conn, tick, holder)?.is_zero() {
        return reject("no reward to claim");
    }
    Ok(())
}

/// A deployed tick-keyed token
fn drc20_exists(conn: &Connection, tick: &str) -> IndexerResult<()> {
    if TokenKind::of(tick) != TokenKind::Tick || aggregate(conn, tick)?.is_none() {
        return reject("the contract does not exist");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn box_deploy(
    conn: &Connection,
    tick0: &str,
    tick1: &str,
    max: Amount,
    amt0: Amount,
    liqamt: Amount,
    liqblock: u64,
    height: u64,
) -> IndexerResult<()> {
    tick_length(tick0)?;
    if tick0 == tick1 {
        return reject("the token symbol must be different");
    }
    if aggregate(conn, tick0)?.is_some() || sale::load_box(conn, tick0)?.is_some() {
        return reject("has been deployed contracts");
    }
    drc20_exists(conn, tick1)?;
    positive(&[max, amt0])?;
    if max > ceiling()? {
        return reject(
            "the maximum value cannot be greater 99999999999999999999999999999999999999999",
        );
    }
    // one amt0 seeds the pool, another goes to contributors
    if amt0.checked_mul(Amount::new(2))? > max {
        return reject("the amount of tokens exceeds the maximum");
    }
    match (liqamt.is_zero(), liqblock) {
        (true, 0) => reject("the amount of tokens exceeds the 0"),
        (false, b) if b > 0 => reject("two cannot exist at the same time"),
        (true, b) if b <= height => reject("the closing height has passed"),
        (true, _) => Ok(()),
        (false, _) => initial_liquidity(amt0, liqamt).map(|_| ()),
    }
}

pub fn box_mint(
    conn: &Connection,
    tick0: &str,
    holder: &str,
    amt1: Amount,
    height: u64,
) -> IndexerResult<()> {
    positive(&[amt1])?;
    let Some(launch) = sale::load_box(conn, tick0)? else {
        return reject("the contract does not exist");
    };
    if launch.status != BoxStatus::Open || (launch.liqblock > 0 && height >= launch.liqblock) {
        return reject("the box has been closed");
    }
    if !launch.liqamt.is_zero() && launch.raised.checked_add(amt1)? > launch.liqamt {
        return reject("the amount of tokens exceeds the maximum");
    }
    covered(conn, &launch.tick1, holder, amt1)
}

pub fn order_create(
    conn: &Connection,
    tick0: &str,
    tick1: &str,
    amt0: Amount,
    amt1: Amount,
    holder: &str,
) -> IndexerResult<()> {
    drc20_exists(conn, tick0)?;
    drc20_exists(conn, tick1)?;
    if tick0 == tick1 {
        return reject("the token symbol must be different");
    }
    positive(&[amt0, amt1])?;
    covered(conn, tick0, holder, amt0)
}

pub fn order_trade(conn: &Connection, ex_id: &str, holder: &str, amt1: Amount) -> IndexerResult<()> {
    positive(&[amt1])?;
    let Some(order) = order::load_order(conn, ex_id)? else {
        return reject("the contract does not exist");
    };
    if order.holder == holder {
        return reject("the same address cannot be traded");
    }
    let amt0_out = order.quote(amt1)?;
    if amt0_out.is_zero() {
        return reject("the amount of tokens is too small");
    }
    if amt0_out > order.remaining()? {
        return reject("the amount of tokens exceeds the remaining order");
    }
    covered(conn, &order.tick1, holder, amt1)
}

pub fn order_cancel(conn: &Connection, ex_id: &str, holder: &str, amt0: Amount) -> IndexerResult<()> {
    positive(&[amt0])?;
    let Some(order) = order::load_order(conn, ex_id)? else {
        return reject("the contract does not exist");
    };
    if order.holder != holder {
        return reject("only the creator can cancel the order");
    }
    if amt0 > order.remaining()? {
        return reject("the amount of tokens exceeds the remaining order");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_support::{ctx, deploy_tick};
    use crate::ledger::Ledger;
    use crate::store::operations::{insert_pending, mark_applied, OperationRecord};
    use crate::store::test_support::create_test_store;
    use serde_json::json;

    fn a(v: u64) -> Amount {
        Amount::new(v)
    }

    fn applied_op(
        conn: &Connection,
        protocol: &str,
        op: &str,
        holder: &str,
        height: u64,
    ) -> IndexerResult<()> {
        let tx_hash = format!("{}-{}-{}-{}", protocol, op, holder, height);
        insert_pending(
            conn,
            &OperationRecord {
                protocol: protocol.to_string(),
                op: op.to_string(),
                tx_hash: tx_hash.clone(),
                tx_index: 0,
                block_number: height,
                block_hash: "bh".to_string(),
                block_time: 0,
                holder: holder.to_string(),
                payload: json!({}),
            },
        )?;
        mark_applied(conn, &tx_hash, &json!({}))
    }

    #[test]
    fn test_drc20_deploy_bounds() {
        let (store, _tmp) = create_test_store();
        store
            .read(|conn| {
                assert!(drc20_deploy(conn, "D", a(10), a(1)).is_err());
                assert!(drc20_deploy(conn, "TOOLONGTK", a(10), a(1)).is_err());
                assert!(drc20_deploy(conn, "DOGI", a(0), a(1)).is_err());
                assert!(drc20_deploy(conn, "DOGI", a(1), a(10)).is_err());
                let over = Amount::parse("100000000000000000000000000000000000000000")?;
                assert!(drc20_deploy(conn, "DOGI", over, a(1)).is_err());
                drc20_deploy(conn, "DOGI", a(10), a(10))?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_drc20_mint_limit_and_max() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", Some(1_000));
                assert!(drc20_mint(tx, "NONE", a(1)).is_err());
                drc20_mint(tx, "DOGI", a(1_000))?;
                ledger.mint("DOGI", "A", a(900))?;
                let err = drc20_mint(tx, "DOGI", a(101)).unwrap_err();
                assert_eq!(err.to_string(), "the amount of tokens exceeds the maximum");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_drc20_transfer_counts_all_recipients() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                ledger.mint("DOGI", "A", a(100))?;
                drc20_transfer(tx, "DOGI", "A", a(50), 2)?;
                assert!(drc20_transfer(tx, "DOGI", "A", a(34), 3).is_err());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_meme20_transfer_blocked_after_trade_in_same_block() {
        let (store, _tmp) = create_test_store();
        let id = "e".repeat(64);
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(8));
                ledger.deploy_token(&crate::ledger::NewToken {
                    token: id.clone(),
                    symbol: "M".to_string(),
                    name: "m".to_string(),
                    max_supply: Some(a(100)),
                    lim: None,
                    holder: "A".to_string(),
                })?;
                ledger.mint(&id, "A", a(100))?;
                meme20_transfer(tx, &id, "A", a(10), 8)?;

                applied_op(tx, "pump", "trade", "A", 8)?;
                assert!(meme20_transfer(tx, &id, "A", a(10), 8).is_err());
                meme20_transfer(tx, &id, "A", a(10), 9)?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_pump_deploy_modes_are_exclusive() {
        let (store, _tmp) = create_test_store();
        let id = "d".repeat(64);
        store
            .read(|conn| {
                assert!(pump_deploy(conn, &id, WDOGE_TICK, 100, a(0), "A").is_err());
                assert!(pump_deploy(conn, &id, WDOGE_TICK, 5, a(1), "A").is_err());
                assert!(pump_deploy(conn, &id, "DOGI", 0, a(0), "A").is_err());
                assert!(pump_deploy(conn, &id, WDOGE_TICK, 0, a(DEPLOY_BUY_MAX + 1), "A").is_err());
                pump_deploy(conn, &id, WDOGE_TICK, 10, a(0), "A")?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_invite_rules() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                assert!(invite_bind(tx, "A", "A").is_err());
                invite_bind(tx, "A", "B")?;
                invite::bind(&Ledger::new(tx, ctx(1)), "A", "B")?;
                assert!(invite_bind(tx, "A", "C").is_err());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_drc20_transfer_accepts_lp_and_wdoge_ticks() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "AAA-SWAP-BBB", None);
                ledger.mint("AAA-SWAP-BBB", "A", a(100))?;
                crate::wdoge::deposit(&ledger, "A", a(100))?;
                drc20_transfer(tx, "AAA-SWAP-BBB", "A", a(100), 1)?;
                drc20_transfer(tx, WDOGE_TICK, "A", a(100), 1)?;
                let err = drc20_transfer(tx, "NONE-SWAP-BBB", "A", a(1), 1).unwrap_err();
                assert_eq!(err.to_string(), "the contract does not exist");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_v2_swap_limited_to_one_per_holder_per_height() {
        let (store, _tmp) = create_test_store();
        let pair_id = "f".repeat(64);
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "AAA", None);
                deploy_tick(&ledger, "BBB", None);
                ledger.mint("AAA", "LP", a(100_000))?;
                ledger.mint("BBB", "LP", a(100_000))?;
                ledger.mint("AAA", "T", a(1_000))?;
                amm::engine::create_pool(
                    &ledger,
                    &amm::engine::CreatePool {
                        kind: PoolKind::V2,
                        pair_id: pair_id.clone(),
                        tick0: "AAA".to_string(),
                        tick1: "BBB".to_string(),
                        amt0: a(50_000),
                        amt1: a(50_000),
                        holder: "LP".to_string(),
                    },
                )?;

                pair_swap(tx, PoolKind::V2, &pair_id, "T", "AAA", a(100), a(0), 8)?;
                applied_op(tx, "pair-v2", "swap", "T", 8)?;
                let err = pair_swap(tx, PoolKind::V2, &pair_id, "T", "AAA", a(100), a(0), 8)
                    .unwrap_err();
                assert_eq!(err.to_string(), "only one trade per address per block");

                // Next height, or another holder, is free to trade
                pair_swap(tx, PoolKind::V2, &pair_id, "T", "AAA", a(100), a(0), 9)?;
                ledger.mint("AAA", "U", a(1_000))?;
                pair_swap(tx, PoolKind::V2, &pair_id, "U", "AAA", a(100), a(0), 8)?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_pump_trade_limited_to_one_per_holder_per_height() {
        let (store, _tmp) = create_test_store();
        let tick_id = "9".repeat(64);
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                pump::engine::deploy(
                    &ledger,
                    &pump::engine::DeployPump {
                        tick_id: tick_id.clone(),
                        symbol: "ONCE".to_string(),
                        name: String::new(),
                        tick1_id: WDOGE_TICK.to_string(),
                        reserve: 0,
                        amt1: Amount::ZERO,
                        holder: "C".to_string(),
                    },
                )?;
                crate::wdoge::deposit(&ledger, "T", a(1_000_000))?;

                pump_trade(tx, &tick_id, "T", WDOGE_TICK, a(1_000), 12)?;
                applied_op(tx, "pump", "trade", "T", 12)?;
                let err = pump_trade(tx, &tick_id, "T", WDOGE_TICK, a(1_000), 12).unwrap_err();
                assert_eq!(err.to_string(), "only one trade per address per block");
                pump_trade(tx, &tick_id, "T", WDOGE_TICK, a(1_000), 13)?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_box_deploy_needs_exactly_one_closing_rule() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);

                box_deploy(tx, "BOXT", "DOGI", a(1_000_000), a(400_000), a(0), 20, 10)?;
                box_deploy(tx, "BOXT", "DOGI", a(1_000_000), a(400_000), a(50_000), 0, 10)?;

                let cases = [
                    (a(0), 0, "the amount of tokens exceeds the 0"),
                    (a(50_000), 20, "two cannot exist at the same time"),
                    (a(0), 10, "the closing height has passed"),
                ];
                for (liqamt, liqblock, msg) in cases {
                    let err = box_deploy(
                        tx,
                        "BOXT",
                        "DOGI",
                        a(1_000_000),
                        a(400_000),
                        liqamt,
                        liqblock,
                        10,
                    )
                    .unwrap_err();
                    assert_eq!(err.to_string(), msg);
                }

                assert!(box_deploy(tx, "BOXT", "DOGI", a(1_000_000), a(500_001), a(0), 20, 10).is_err());
                assert!(box_deploy(tx, "BOXT", "NOPE", a(1_000_000), a(400_000), a(0), 20, 10).is_err());
                assert!(box_deploy(tx, "DOGI", "DOGI", a(1_000_000), a(400_000), a(0), 20, 10).is_err());
                // A target too thin to seed a pool could never finish
                assert!(box_deploy(tx, "BOXT", "DOGI", a(1_000_000), a(400_000), a(1), 0, 10).is_err());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_box_mint_closed_at_liqblock() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                ledger.mint("DOGI", "DAlice", a(1_000))?;
                sale::deploy(
                    &ledger,
                    &sale::DeployBox {
                        tick0: "BOXT".to_string(),
                        tick1: "DOGI".to_string(),
                        max: a(1_000_000),
                        amt0: a(400_000),
                        liqamt: a(0),
                        liqblock: 20,
                        holder: "DOwner".to_string(),
                    },
                )?;

                box_mint(tx, "BOXT", "DAlice", a(1_000), 19)?;
                assert!(box_mint(tx, "BOXT", "DAlice", a(1_001), 19).is_err());
                let err = box_mint(tx, "BOXT", "DAlice", a(1_000), 20).unwrap_err();
                assert_eq!(err.to_string(), "the box has been closed");
                assert!(box_mint(tx, "NONE", "DAlice", a(1), 19).is_err());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_order_checks_creator_and_remaining() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                deploy_tick(&ledger, "CATS", None);
                ledger.mint("DOGI", "DMaker", a(1_000))?;
                ledger.mint("CATS", "DTaker", a(1_000))?;

                order_create(tx, "DOGI", "CATS", a(1_000), a(500), "DMaker")?;
                assert!(order_create(tx, "DOGI", "CATS", a(1_001), a(500), "DMaker").is_err());
                assert!(order_create(tx, "DOGI", "NOPE", a(10), a(5), "DMaker").is_err());
                let order = order::create(&ledger, "DOGI", "CATS", a(1_000), a(500), "DMaker")?;

                order_trade(tx, &order.ex_id, "DTaker", a(500))?;
                let err = order_trade(tx, &order.ex_id, "DMaker", a(10)).unwrap_err();
                assert_eq!(err.to_string(), "the same address cannot be traded");
                let err = order_trade(tx, &order.ex_id, "DTaker", a(501)).unwrap_err();
                assert_eq!(err.to_string(), "the amount of tokens exceeds the remaining order");

                order_cancel(tx, &order.ex_id, "DMaker", a(1_000))?;
                assert!(order_cancel(tx, &order.ex_id, "DTaker", a(1)).is_err());
                assert!(order_cancel(tx, &order.ex_id, "DMaker", a(1_001)).is_err());
                Ok(())
            })
            .unwrap();
    }
}
