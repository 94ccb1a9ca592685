//! Balance primitives for tick-keyed and id-keyed tokens
//!
//! Every mutation goes through a [`Ledger`] bound to one database transaction. The ledger's mode
//! is a type parameter:
//! - `Ledger<Apply>` is what forward processing gets. Each primitive appends a revert event and
//!   bumps transaction counters.
//! - `Ledger<Undo>` can only be built inside the crate (the fork engine). It writes no revert
//!   events and walks counters back down.
//!
//! Aggregate circulating sums always equal the sum of the matching holder rows: mint and burn
//! touch both, transfer moves between two holder rows of the same token.

pub mod revert;

use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use revert::RevertEvent;
use rusqlite::{params, Connection, OptionalExtension};
use std::marker::PhantomData;

/// Identifiers at least this long are id-keyed (tx-hash style); shorter ones are ticks.
pub const ID_KEY_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// drc-20 style, keyed by ticker symbol
    Tick,
    /// meme-20, bonding-curve and v2 LP tokens, keyed by a 64-char id
    Id,
}

impl TokenKind {
    pub fn of(token: &str) -> Self {
        if token.len() < ID_KEY_LENGTH {
            TokenKind::Tick
        } else {
            TokenKind::Id
        }
    }

    pub(crate) fn collect_table(self) -> &'static str {
        match self {
            TokenKind::Tick => "drc20_collect",
            TokenKind::Id => "meme20_collect",
        }
    }

    pub(crate) fn holder_table(self) -> &'static str {
        match self {
            TokenKind::Tick => "drc20_holder",
            TokenKind::Id => "meme20_holder",
        }
    }

    pub(crate) fn key_column(self) -> &'static str {
        match self {
            TokenKind::Tick => "tick",
            TokenKind::Id => "tick_id",
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Apply {}
    impl Sealed for super::Undo {}
}

/// Ledger mode marker; sealed so no other mode can exist
pub trait Mode: sealed::Sealed {
    const RECORDS_REVERTS: bool;
    const COUNTER_STEP: i64;
    const NAME: &'static str;
}

#[derive(Debug)]
pub struct Apply;

#[derive(Debug)]
pub struct Undo;

impl Mode for Apply {
    const RECORDS_REVERTS: bool = true;
    const COUNTER_STEP: i64 = 1;
    const NAME: &'static str = "apply";
}

impl Mode for Undo {
    const RECORDS_REVERTS: bool = false;
    const COUNTER_STEP: i64 = -1;
    const NAME: &'static str = "undo";
}

/// Chain position of the transaction a ledger is mutating for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxContext {
    pub tx_hash: String,
    pub block_number: u64,
    pub block_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub token: String,
    pub max_supply: Option<Amount>,
    pub lim: Option<Amount>,
    pub amt_sum: Amount,
    pub transactions: i64,
    pub holder: String,
}

/// Aggregate row to create on deploy
#[derive(Debug, Clone)]
pub struct NewToken {
    pub token: String,
    pub symbol: String,
    pub name: String,
    pub max_supply: Option<Amount>,
    pub lim: Option<Amount>,
    pub holder: String,
}

pub struct Ledger<'c, M: Mode> {
    conn: &'c Connection,
    ctx: TxContext,
    _mode: PhantomData<M>,
}

impl<'c> Ledger<'c, Apply> {
    pub fn new(conn: &'c Connection, ctx: TxContext) -> Self {
        Self {
            conn,
            ctx,
            _mode: PhantomData,
        }
    }

    /// Append a revert event for a mutation made outside the balance primitives
    pub fn record(&self, event: &RevertEvent) -> IndexerResult<()> {
        revert::append(self.conn, &self.ctx, event)
    }

    /// Create an aggregate row with zero circulating supply.
    ///
    /// The deploy event is appended before any mint, so reverse replay burns first and deletes
    /// the token last.
    pub fn deploy_token(&self, token: &NewToken) -> IndexerResult<()> {
        let kind = TokenKind::of(&token.token);
        if aggregate(self.conn, &token.token)?.is_some() {
            return Err(IndexerError::validation("has been deployed contracts"));
        }

        match kind {
            TokenKind::Tick => {
                self.conn.execute(
                    "INSERT INTO drc20_collect (tick, max_supply, lim, amt_sum, transactions,
                        holder_address, tx_hash, block_number)
                     VALUES (?1, ?2, ?3, '0', 0, ?4, ?5, ?6)",
                    params![
                        token.token,
                        token.max_supply,
                        token.lim,
                        token.holder,
                        self.ctx.tx_hash,
                        self.ctx.block_number
                    ],
                )?;
            }
            TokenKind::Id => {
                self.conn.execute(
                    "INSERT INTO meme20_collect (tick_id, tick, name, max_supply, amt_sum,
                        transactions, holder_address, tx_hash, block_number)
                     VALUES (?1, ?2, ?3, ?4, '0', 0, ?5, ?6, ?7)",
                    params![
                        token.token,
                        token.symbol,
                        token.name,
                        token.max_supply,
                        token.holder,
                        self.ctx.tx_hash,
                        self.ctx.block_number
                    ],
                )?;
            }
        }

        log::debug!("🪙 deploy {} ({:?}) by {}", token.token, kind, token.holder);

        self.record(&RevertEvent::TokenDeploy {
            token: token.token.clone(),
        })
    }
}

impl<'c> Ledger<'c, Undo> {
    pub(crate) fn undo(conn: &'c Connection) -> Self {
        Self {
            conn,
            ctx: TxContext {
                tx_hash: String::new(),
                block_number: 0,
                block_time: 0,
            },
            _mode: PhantomData,
        }
    }
}

impl<'c, M: Mode> Ledger<'c, M> {
    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn ctx(&self) -> &TxContext {
        &self.ctx
    }

    /// Remove a token and all of its holder rows
    pub(crate) fn delete_token(&self, token: &str) -> IndexerResult<()> {
        let kind = TokenKind::of(token);
        self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                kind.holder_table(),
                kind.key_column()
            ),
            params![token],
        )?;
        self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                kind.collect_table(),
                kind.key_column()
            ),
            params![token],
        )?;
        Ok(())
    }

    fn log_event(&self, event: RevertEvent) -> IndexerResult<()> {
        if M::RECORDS_REVERTS {
            revert::append(self.conn, &self.ctx, &event)?;
        }
        Ok(())
    }

    /// Move `amt` of `token` from one holder to another
    pub fn transfer(&self, token: &str, from: &str, to: &str, amt: Amount) -> IndexerResult<()> {
        if amt.is_zero() {
            return Err(IndexerError::consistency(format!(
                "transfer amt must be positive: {}",
                token
            )));
        }
        if from == to {
            return Err(IndexerError::consistency(format!(
                "transfer from and to addresses are the same: {}",
                from
            )));
        }

        let from_balance = balance(self.conn, token, from)?;
        if from_balance < amt {
            return Err(IndexerError::consistency(format!(
                "insufficient balance: {} tick: {} from: {} transfer: {}",
                from_balance, token, from, amt
            )));
        }

        let to_balance = balance(self.conn, token, to)?;
        let to_after = to_balance.checked_add(amt)?;
        let from_after = from_balance.checked_sub(amt)?;

        self.write_holder(token, from, from_after)?;
        self.write_holder(token, to, to_after)?;

        log::debug!(
            "↔️ transfer [{}] {} {} -> {} amt={}",
            M::NAME,
            token,
            from,
            to,
            amt
        );

        self.log_event(RevertEvent::Transfer {
            token: token.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            amt,
        })
    }

    /// Create `amt` new units of an existing token for `to`
    pub fn mint(&self, token: &str, to: &str, amt: Amount) -> IndexerResult<()> {
        if amt.is_zero() {
            return Err(IndexerError::consistency(format!(
                "mint amt must be positive: {}",
                token
            )));
        }

        let agg = aggregate(self.conn, token)?.ok_or_else(|| {
            IndexerError::consistency(format!("mint on undeployed token: {}", token))
        })?;

        let sum = agg.amt_sum.checked_add(amt)?;
        if let Some(max) = agg.max_supply {
            if sum > max {
                return Err(IndexerError::consistency(format!(
                    "mint exceeds max supply: {} max: {} after: {}",
                    token, max, sum
                )));
            }
        }

        let holder_after = balance(self.conn, token, to)?.checked_add(amt)?;
        self.write_aggregate(token, sum)?;
        self.write_holder(token, to, holder_after)?;

        log::debug!("➕ mint [{}] {} -> {} amt={}", M::NAME, token, to, amt);

        self.log_event(RevertEvent::Mint {
            token: token.to_string(),
            to: to.to_string(),
            amt,
        })
    }

    /// Destroy `amt` units held by `from`
    pub fn burn(&self, token: &str, from: &str, amt: Amount) -> IndexerResult<()> {
        if amt.is_zero() {
            return Err(IndexerError::consistency(format!(
                "burn amt must be positive: {}",
                token
            )));
        }

        let agg = aggregate(self.conn, token)?.ok_or_else(|| {
            IndexerError::consistency(format!("burn on undeployed token: {}", token))
        })?;

        let held = balance(self.conn, token, from)?;
        if agg.amt_sum < amt || held < amt {
            return Err(IndexerError::consistency(format!(
                "burn exceeds balance: {} from: {} held: {} amt: {}",
                token, from, held, amt
            )));
        }

        self.write_aggregate(token, agg.amt_sum.checked_sub(amt)?)?;
        self.write_holder(token, from, held.checked_sub(amt)?)?;

        log::debug!("➖ burn [{}] {} <- {} amt={}", M::NAME, token, from, amt);

        self.log_event(RevertEvent::Burn {
            token: token.to_string(),
            from: from.to_string(),
            amt,
        })
    }

    fn write_aggregate(&self, token: &str, amt_sum: Amount) -> IndexerResult<()> {
        let kind = TokenKind::of(token);
        let sql = format!(
            "UPDATE {} SET amt_sum = ?1, transactions = MAX(transactions + ?2, 0) WHERE {} = ?3",
            kind.collect_table(),
            kind.key_column()
        );
        self.conn
            .execute(&sql, params![amt_sum, M::COUNTER_STEP, token])?;
        Ok(())
    }

    fn write_holder(&self, token: &str, holder: &str, amt_sum: Amount) -> IndexerResult<()> {
        let kind = TokenKind::of(token);
        let sql = format!(
            "INSERT INTO {table} ({key}, holder_address, amt_sum, transactions)
             VALUES (?1, ?2, ?3, MAX(?4, 0))
             ON CONFLICT({key}, holder_address) DO UPDATE SET
                amt_sum = excluded.amt_sum,
                transactions = MAX(transactions + ?4, 0)",
            table = kind.holder_table(),
            key = kind.key_column()
        );
        self.conn
            .execute(&sql, params![token, holder, amt_sum, M::COUNTER_STEP])?;
        Ok(())
    }
}

/// Holder balance; a missing row reads as zero
pub fn balance(conn: &Connection, token: &str, holder: &str) -> IndexerResult<Amount> {
    let kind = TokenKind::of(token);
    let sql = format!(
        "SELECT amt_sum FROM {} WHERE {} = ?1 AND holder_address = ?2",
        kind.holder_table(),
        kind.key_column()
    );
    Ok(conn
        .query_row(&sql, params![token, holder], |row| row.get::<_, Amount>(0))
        .optional()?
        .unwrap_or(Amount::ZERO))
}

pub fn aggregate(conn: &Connection, token: &str) -> IndexerResult<Option<Aggregate>> {
    let kind = TokenKind::of(token);
    let lim_column = match kind {
        TokenKind::Tick => "lim",
        TokenKind::Id => "NULL",
    };
    let sql = format!(
        "SELECT max_supply, {}, amt_sum, transactions, holder_address FROM {} WHERE {} = ?1",
        lim_column,
        kind.collect_table(),
        kind.key_column()
    );
    Ok(conn
        .query_row(&sql, params![token], |row| {
            Ok(Aggregate {
                token: token.to_string(),
                max_supply: row.get(0)?,
                lim: row.get(1)?,
                amt_sum: row.get(2)?,
                transactions: row.get(3)?,
                holder: row.get(4)?,
            })
        })
        .optional()?)
}

/// Sum of all holder rows for `token`, used by invariant checks
pub fn holder_sum(conn: &Connection, token: &str) -> IndexerResult<Amount> {
    let kind = TokenKind::of(token);
    let sql = format!(
        "SELECT amt_sum FROM {} WHERE {} = ?1",
        kind.holder_table(),
        kind.key_column()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![token], |row| row.get::<_, Amount>(0))?;
    let mut total = Amount::ZERO;
    for amt in rows {
        total = total.checked_add(amt?)?;
    }
    Ok(total)
}

/// Every deployed token id of both kinds
pub fn all_tokens(conn: &Connection) -> IndexerResult<Vec<String>> {
    let mut tokens = Vec::new();
    for kind in [TokenKind::Tick, TokenKind::Id] {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            kind.key_column(),
            kind.collect_table(),
            kind.key_column()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for token in rows {
            tokens.push(token?);
        }
    }
    Ok(tokens)
}

/// Per-holder transaction counter, mostly for tests and audits
pub fn holder_transactions(conn: &Connection, token: &str, holder: &str) -> IndexerResult<i64> {
    let kind = TokenKind::of(token);
    let sql = format!(
        "SELECT transactions FROM {} WHERE {} = ?1 AND holder_address = ?2",
        kind.holder_table(),
        kind.key_column()
    );
    Ok(conn
        .query_row(&sql, params![token, holder], |row| row.get(0))
        .optional()?
        .unwrap_or(0))
}
