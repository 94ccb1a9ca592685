//! Ledger Audit - offline invariant checks against an existing database
//!
//! Reports:
//! - tokens whose aggregate circulating sum differs from the sum of their holder rows
//! - pools whose cached reserves differ from the reserves address balances
//! - pools whose share supply differs from the LP token's circulating sum
//!
//! Usage:
//!   cargo run --release --bin ledger_audit [db_path]
//!
//! Exits with status 1 when any mismatch is found.

use dotenv::dotenv;
use inscription_ledger::amm::{self, PoolKind};
use inscription_ledger::config::IndexerConfig;
use inscription_ledger::ledger::{aggregate, all_tokens, balance, holder_sum};
use inscription_ledger::store::Store;
use inscription_ledger::IndexerResult;
use log::{error, info, warn};
use rusqlite::Connection;
use std::env;

fn audit_tokens(conn: &Connection) -> IndexerResult<(usize, usize)> {
    let tokens = all_tokens(conn)?;
    let mut mismatches = 0;
    for token in &tokens {
        let Some(agg) = aggregate(conn, token)? else {
            continue;
        };
        let holders = holder_sum(conn, token)?;
        if holders != agg.amt_sum {
            warn!("⚠️  {} aggregate {} != holder sum {}", token, agg.amt_sum, holders);
            mismatches += 1;
        }
        if let Some(max) = agg.max_supply {
            if agg.amt_sum > max {
                warn!("⚠️  {} circulating {} exceeds max {}", token, agg.amt_sum, max);
                mismatches += 1;
            }
        }
    }
    Ok((tokens.len(), mismatches))
}

fn audit_pools(conn: &Connection, kind: PoolKind) -> IndexerResult<(usize, usize)> {
    let pools = amm::all_pools(conn, kind)?;
    let mut mismatches = 0;
    for pool in &pools {
        let held0 = balance(conn, &pool.tick0, &pool.reserves_address)?;
        let held1 = balance(conn, &pool.tick1, &pool.reserves_address)?;
        if held0 != pool.amt0 || held1 != pool.amt1 {
            warn!("⚠️  {} {} reserve drift", kind.protocol(), pool.pair_id);
            warn!("   ├─ cached: {} / {}", pool.amt0, pool.amt1);
            warn!("   └─ held:   {} / {}", held0, held1);
            mismatches += 1;
        }
        let shares = aggregate(conn, pool.lp_token())?
            .map(|agg| agg.amt_sum)
            .unwrap_or_default();
        if shares != pool.liquidity {
            warn!(
                "⚠️  {} {} liquidity {} != LP supply {}",
                kind.protocol(),
                pool.pair_id,
                pool.liquidity,
                shares
            );
            mismatches += 1;
        }
    }
    Ok((pools.len(), mismatches))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let db_path = env::args()
        .nth(1)
        .unwrap_or_else(|| IndexerConfig::from_env().db_path);

    info!("🔍 Ledger audit: {}", db_path);
    let store = Store::open_read_only(&db_path)?;

    let report = store.read(|conn| {
        let tokens = audit_tokens(conn)?;
        let legacy = audit_pools(conn, PoolKind::Legacy)?;
        let v2 = audit_pools(conn, PoolKind::V2)?;
        Ok((tokens, legacy, v2))
    })?;
    let ((tokens, token_bad), (legacy, legacy_bad), (v2, v2_bad)) = report;

    info!("📊 Audit summary");
    info!("   ├─ Tokens: {} checked, {} mismatched", tokens, token_bad);
    info!("   ├─ Legacy pools: {} checked, {} mismatched", legacy, legacy_bad);
    info!("   └─ V2 pools: {} checked, {} mismatched", v2, v2_bad);

    if token_bad + legacy_bad + v2_bad > 0 {
        error!("❌ Ledger audit found inconsistencies");
        std::process::exit(1);
    }
    info!("✅ Ledger consistent");
    Ok(())
}
