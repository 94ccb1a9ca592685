//! Bonding-curve deploy, trade and graduation

use super::{
    insert_pool, load_pool, set_graduated, write_curve, PumpPool, DOGE_INIT, DOGE_KING_MAX, DOGE_MAX,
    FINISH_FEE_ADDRESS, KING_UNSET, MEME_MAX, PUMP_CREATE_HOLDER_FEE, PUMP_FINISH_FEE,
    TX_FEE_ADDRESS,
};
use crate::address::pump_reserves_address;
use crate::amm::engine::{create_pool, CreatePool, LiquidityOutcome};
use crate::amm::math::constant_product_out;
use crate::amm::PoolKind;
use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use crate::invite;
use crate::ledger::revert::RevertEvent;
use crate::ledger::{balance, Apply, Ledger, NewToken, TokenKind};
use crate::summary;
use crate::wdoge::WDOGE_TICK;
use rusqlite::Connection;
use serde::Serialize;

/// Trade fee is 1% of the tick-keyed leg
const TRADE_FEE_DIVISOR: u64 = 100;
/// Referrer receives a fifth of each fee
const INVITE_SHARE_DIVISOR: u64 = 5;

#[derive(Debug, Clone)]
pub struct DeployPump {
    /// Id of the new token: the deploying transaction hash
    pub tick_id: String,
    pub symbol: String,
    pub name: String,
    pub tick1_id: String,
    /// Percent of supply pre-allocated to the creator, 0 = none
    pub reserve: u8,
    /// Creator's initial WDOGE buy, exclusive with `reserve`
    pub amt1: Amount,
    pub holder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployOutcome {
    pub tick_id: String,
    pub amt0_out: Amount,
    pub amt1_out: Amount,
    pub initial_trade: Option<TradeOutcome>,
}

#[derive(Debug, Clone)]
pub struct TradePump {
    pub tick_id: String,
    pub tick_in: String,
    pub amt_in: Amount,
    pub amt_out_min: Amount,
    pub holder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeOutcome {
    pub tick_id: String,
    pub tick_in: String,
    pub tick_out: String,
    pub amt_in: Amount,
    pub amt_out: Amount,
    pub graduated_pair: Option<String>,
}

/// Mint the fixed supply and open the curve
pub fn deploy(ledger: &Ledger<'_, Apply>, req: &DeployPump) -> IndexerResult<DeployOutcome> {
    if load_pool(ledger.conn(), &req.tick_id)?.is_some() {
        return Err(IndexerError::validation("the contract has been deployed"));
    }

    let reserves = pump_reserves_address(&req.tick_id, &req.tick1_id);
    let supply = Amount::new(MEME_MAX);
    let curve_supply = if (1..=99).contains(&req.reserve) {
        Amount::new(MEME_MAX / 100).checked_mul(Amount::new(100 - req.reserve as u64))?
    } else {
        supply
    };

    let pool = PumpPool {
        tick_id: req.tick_id.clone(),
        symbol: req.symbol.clone(),
        tick1_id: req.tick1_id.clone(),
        amt0: curve_supply,
        amt1: Amount::new(DOGE_INIT),
        reserves_address: reserves.clone(),
        holder: req.holder.clone(),
        king_date: KING_UNSET,
        graduated: false,
    };
    insert_pool(ledger.conn(), &pool, ledger.ctx())?;
    ledger.record(&RevertEvent::PumpDeploy {
        tick_id: req.tick_id.clone(),
    })?;

    ledger.deploy_token(&NewToken {
        token: req.tick_id.clone(),
        symbol: req.symbol.clone(),
        name: req.name.clone(),
        max_supply: Some(supply),
        lim: None,
        holder: reserves.clone(),
    })?;

    ledger.mint(&req.tick_id, &reserves, curve_supply)?;
    let creator_share = supply.checked_sub(curve_supply)?;
    if !creator_share.is_zero() {
        ledger.mint(&req.tick_id, &req.holder, creator_share)?;
    }

    if req.tick1_id == WDOGE_TICK {
        let opening_price = Amount::new(DOGE_INIT).to_f64() / curve_supply.to_f64();
        summary::record_open(ledger.conn(), &req.tick_id, opening_price, ledger.ctx().block_time)?;
    }

    log::info!(
        "🚀 pump deployed {} ({}) curve_supply={} creator_share={}",
        req.tick_id,
        req.symbol,
        curve_supply,
        creator_share
    );

    let initial_trade = if req.amt1.is_zero() {
        None
    } else {
        Some(trade(
            ledger,
            &TradePump {
                tick_id: req.tick_id.clone(),
                tick_in: req.tick1_id.clone(),
                amt_in: req.amt1,
                amt_out_min: Amount::ZERO,
                holder: req.holder.clone(),
            },
        )?)
    };

    Ok(DeployOutcome {
        tick_id: req.tick_id.clone(),
        amt0_out: curve_supply,
        amt1_out: Amount::new(DOGE_INIT),
        initial_trade,
    })
}

/// 1% fee on a tick-keyed leg; zero for id-keyed tokens
fn trade_fee(token: &str, amt: Amount) -> IndexerResult<Amount> {
    match TokenKind::of(token) {
        TokenKind::Tick => amt.checked_div(Amount::new(TRADE_FEE_DIVISOR)),
        TokenKind::Id => Ok(Amount::ZERO),
    }
}

fn collect_fee(
    ledger: &Ledger<'_, Apply>,
    token: &str,
    payer: &str,
    fee: Amount,
    trader: &str,
    inviter: Option<&str>,
) -> IndexerResult<()> {
    if fee.is_zero() {
        return Ok(());
    }
    ledger.transfer(token, payer, TX_FEE_ADDRESS, fee)?;

    if let Some(inviter) = inviter {
        let share = fee.checked_div(Amount::new(INVITE_SHARE_DIVISOR))?;
        if !share.is_zero() {
            ledger.transfer(token, TX_FEE_ADDRESS, inviter, share)?;
            invite::credit_reward(ledger, trader, inviter, share)?;
        }
    }
    Ok(())
}

/// Exact-in trade along the curve; graduates the pool in the same transaction when the
/// reserves address's real WDOGE balance reaches the threshold
pub fn trade(ledger: &Ledger<'_, Apply>, req: &TradePump) -> IndexerResult<TradeOutcome> {
    let pool = load_pool(ledger.conn(), &req.tick_id)?
        .ok_or_else(|| IndexerError::validation("the contract does not exist"))?;
    if pool.graduated {
        return Err(IndexerError::validation("pump inner plate has been completed"));
    }

    let input_is_token = if req.tick_in == pool.tick_id {
        true
    } else if req.tick_in == pool.tick1_id {
        false
    } else {
        return Err(IndexerError::validation("the contract does not exist err"));
    };
    let (reserve_in, reserve_out, tick_out) = if input_is_token {
        (pool.amt0, pool.amt1, pool.tick1_id.clone())
    } else {
        (pool.amt1, pool.amt0, pool.tick_id.clone())
    };

    let fee_in = trade_fee(&req.tick_in, req.amt_in)?;
    let net_in = req.amt_in.checked_sub(fee_in)?;
    let amt_out = constant_product_out(net_in, reserve_in, reserve_out)?;
    let fee_out = trade_fee(&tick_out, amt_out)?;
    let net_out = amt_out.checked_sub(fee_out)?;

    if net_out < req.amt_out_min {
        return Err(IndexerError::validation(
            "the amount of tokens is less than the minimum",
        ));
    }
    if net_in.is_zero() || net_out.is_zero() {
        return Err(IndexerError::validation("insufficient output amount"));
    }

    let inviter = invite::inviter_of(ledger.conn(), &req.holder)?;
    let reserves = pool.reserves_address.as_str();

    collect_fee(ledger, &req.tick_in, &req.holder, fee_in, &req.holder, inviter.as_deref())?;
    ledger.transfer(&req.tick_in, &req.holder, reserves, net_in)?;
    collect_fee(ledger, &tick_out, reserves, fee_out, &req.holder, inviter.as_deref())?;
    ledger.transfer(&tick_out, reserves, &req.holder, net_out)?;

    ledger.record(&RevertEvent::PumpTrade {
        tick_id: pool.tick_id.clone(),
        amt0: pool.amt0,
        amt1: pool.amt1,
        king_date: pool.king_date,
    })?;

    let (amt0, amt1) = if input_is_token {
        (pool.amt0.checked_add(net_in)?, pool.amt1.checked_sub(amt_out)?)
    } else {
        (pool.amt0.checked_sub(amt_out)?, pool.amt1.checked_add(net_in)?)
    };

    let wdoge_held = balance(ledger.conn(), &pool.tick1_id, reserves)?;
    let graduating = ready_to_graduate(ledger.conn(), &pool)?;
    let king_date = if wdoge_held >= Amount::new(DOGE_KING_MAX) && pool.king_date == KING_UNSET {
        log::info!("👑 {} crossed the king watermark", pool.tick_id);
        ledger.ctx().block_time
    } else {
        pool.king_date
    };
    write_curve(ledger.conn(), &pool.tick_id, amt0, amt1, king_date)?;

    summary::record_swap(
        ledger.conn(),
        &req.tick_in,
        net_in,
        &tick_out,
        amt_out,
        ledger.ctx().block_time,
    )?;

    let graduated_pair = if graduating {
        let pair_id = ledger.ctx().tx_hash.clone();
        Some(graduate(ledger, &pool, &pair_id)?.pair_id)
    } else {
        None
    };

    Ok(TradeOutcome {
        tick_id: pool.tick_id.clone(),
        tick_in: req.tick_in.clone(),
        tick_out,
        amt_in: net_in,
        amt_out: net_out,
        graduated_pair,
    })
}

/// True once an open curve's reserves address holds enough real WDOGE to graduate
pub fn ready_to_graduate(conn: &Connection, pool: &PumpPool) -> IndexerResult<bool> {
    if pool.graduated {
        return Ok(false);
    }
    Ok(balance(conn, &pool.tick1_id, &pool.reserves_address)? >= Amount::new(DOGE_MAX))
}

/// Pay the graduation fee and creator bonus, then sweep everything left on the reserves
/// address into a new v2 pool keyed by `pair_id`
pub fn graduate(
    ledger: &Ledger<'_, Apply>,
    pool: &PumpPool,
    pair_id: &str,
) -> IndexerResult<LiquidityOutcome> {
    let reserves = pool.reserves_address.as_str();

    if pool.tick1_id == WDOGE_TICK {
        let finish_fee = Amount::new(PUMP_FINISH_FEE);
        ledger.transfer(WDOGE_TICK, reserves, FINISH_FEE_ADDRESS, finish_fee)?;
        ledger.burn(WDOGE_TICK, FINISH_FEE_ADDRESS, finish_fee)?;

        let bonus = Amount::new(PUMP_CREATE_HOLDER_FEE);
        ledger.transfer(WDOGE_TICK, reserves, &pool.holder, bonus)?;
        ledger.burn(WDOGE_TICK, &pool.holder, bonus)?;
    }

    let amt0 = balance(ledger.conn(), &pool.tick_id, reserves)?;
    let amt1 = balance(ledger.conn(), &pool.tick1_id, reserves)?;

    let created = create_pool(
        ledger,
        &CreatePool {
            kind: PoolKind::V2,
            pair_id: pair_id.to_string(),
            tick0: pool.tick_id.clone(),
            tick1: pool.tick1_id.clone(),
            amt0,
            amt1,
            holder: reserves.to_string(),
        },
    )?;

    ledger.record(&RevertEvent::PumpGraduate {
        tick_id: pool.tick_id.clone(),
    })?;
    set_graduated(ledger.conn(), &pool.tick_id, true)?;

    log::info!(
        "🎓 {} graduated into v2 pair {}",
        pool.tick_id,
        created.pair_id
    );
    log::info!("   ├─ token: {}", amt0);
    log::info!("   └─ wdoge: {}", amt1);

    Ok(created)
}
