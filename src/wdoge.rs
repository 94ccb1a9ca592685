//! Wrapped DOGE: the tick-keyed reserve currency of bonding curves

use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::{balance, Apply, Ledger};

pub const WDOGE_TICK: &str = "WDOGE(WRAPPED-DOGE)";

/// One DOGE in base units; smallest withdrawal
pub const MIN_WITHDRAW: u64 = 100_000_000;

/// Credit `amt` WDOGE backed by native DOGE paid to the custody address
pub fn deposit(ledger: &Ledger<'_, Apply>, holder: &str, amt: Amount) -> IndexerResult<()> {
    ledger.mint(WDOGE_TICK, holder, amt)
}

/// Burn `amt` WDOGE; native DOGE is released off-ledger
pub fn withdraw(ledger: &Ledger<'_, Apply>, holder: &str, amt: Amount) -> IndexerResult<()> {
    if amt < Amount::new(MIN_WITHDRAW) {
        return Err(IndexerError::validation(
            "the amount of tokens must be at least 1 DOGE",
        ));
    }
    if balance(ledger.conn(), WDOGE_TICK, holder)? < amt {
        return Err(IndexerError::validation(
            "the amount of tokens exceeds the balance",
        ));
    }
    ledger.burn(WDOGE_TICK, holder, amt)
}
