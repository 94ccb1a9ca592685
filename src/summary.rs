//! OHLCV candles for WDOGE-quoted trades
//!
//! Derived read-model only. Candles are written in the trade's transaction but are not part of
//! the revert log; a rolled-back trade leaves its volume behind until the next trade in that
//! bucket overwrites close/high/low.

use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use crate::wdoge::WDOGE_TICK;
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    FourHours,
    OneDay,
    OneWeek,
    OneMonth,
}

impl Interval {
    pub const ALL: [Interval; 8] = [
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::OneHour,
        Interval::FourHours,
        Interval::OneDay,
        Interval::OneWeek,
        Interval::OneMonth,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
            Interval::OneWeek => "1w",
            Interval::OneMonth => "1M",
        }
    }

    /// Start of the UTC bucket containing `ts` (unix seconds)
    pub fn bucket_start(self, ts: i64) -> IndexerResult<i64> {
        let fixed = match self {
            Interval::OneMinute => Some(60),
            Interval::FiveMinutes => Some(300),
            Interval::FifteenMinutes => Some(900),
            Interval::OneHour => Some(3_600),
            Interval::FourHours => Some(14_400),
            Interval::OneDay => Some(86_400),
            Interval::OneWeek | Interval::OneMonth => None,
        };
        if let Some(secs) = fixed {
            return Ok(ts - ts.rem_euclid(secs));
        }

        let date = DateTime::<Utc>::from_timestamp(ts, 0)
            .ok_or_else(|| IndexerError::consistency(format!("block time out of range: {}", ts)))?
            .date_naive();

        let start = match self {
            Interval::OneWeek => date
                .checked_sub_days(Days::new(date.weekday().num_days_from_monday() as u64)),
            _ => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
        };

        start
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| IndexerError::consistency(format!("no bucket for block time {}", ts)))
    }
}

/// Record one trade if either leg is WDOGE; other pairs carry no quote currency.
pub fn record_swap(
    conn: &Connection,
    tick_in: &str,
    amt_in: Amount,
    tick_out: &str,
    amt_out: Amount,
    block_time: i64,
) -> IndexerResult<()> {
    if amt_in.is_zero() || amt_out.is_zero() {
        return Ok(());
    }

    let (token, price, volume) = if tick_in == WDOGE_TICK {
        (tick_out, amt_in.to_f64() / amt_out.to_f64(), amt_in)
    } else if tick_out == WDOGE_TICK {
        (tick_in, amt_out.to_f64() / amt_in.to_f64(), amt_out)
    } else {
        return Ok(());
    };

    for interval in Interval::ALL {
        record_candle(conn, token, interval, price, volume, block_time)?;
    }
    Ok(())
}

/// Zero-volume candles at `price`, so a new token charts from its listing price
pub fn record_open(conn: &Connection, token: &str, price: f64, block_time: i64) -> IndexerResult<()> {
    for interval in Interval::ALL {
        record_candle(conn, token, interval, price, Amount::ZERO, block_time)?;
    }
    Ok(())
}

fn record_candle(
    conn: &Connection,
    token: &str,
    interval: Interval,
    price: f64,
    volume: Amount,
    block_time: i64,
) -> IndexerResult<()> {
    let bucket = interval.bucket_start(block_time)?;

    let existing = conn
        .query_row(
            "SELECT high_price, low_price, volume FROM trade_summary
             WHERE tick_id = ?1 AND interval = ?2 AND bucket_start = ?3",
            params![token, interval.label(), bucket],
            |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?, row.get::<_, Amount>(2)?)),
        )
        .optional()?;

    match existing {
        Some((high, low, prior_volume)) => {
            conn.execute(
                "UPDATE trade_summary SET close_price = ?1, high_price = ?2, low_price = ?3, volume = ?4
                 WHERE tick_id = ?5 AND interval = ?6 AND bucket_start = ?7",
                params![
                    price,
                    high.max(price),
                    low.min(price),
                    prior_volume.checked_add(volume)?,
                    token,
                    interval.label(),
                    bucket
                ],
            )?;
        }
        None => {
            let open: f64 = conn
                .query_row(
                    "SELECT close_price FROM trade_summary
                     WHERE tick_id = ?1 AND interval = ?2 AND bucket_start < ?3
                     ORDER BY bucket_start DESC LIMIT 1",
                    params![token, interval.label(), bucket],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(price);

            conn.execute(
                "INSERT INTO trade_summary (tick_id, interval, bucket_start, open_price, close_price,
                    high_price, low_price, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    token,
                    interval.label(),
                    bucket,
                    open,
                    price,
                    open.max(price),
                    open.min(price),
                    volume
                ],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::create_test_store;

    // 2024-01-03T10:17:45Z, a Wednesday
    const WEDNESDAY: i64 = 1_704_277_065;

    #[test]
    fn test_bucket_starts() {
        assert_eq!(Interval::OneMinute.bucket_start(WEDNESDAY).unwrap(), 1_704_277_020);
        assert_eq!(Interval::OneHour.bucket_start(WEDNESDAY).unwrap(), 1_704_276_000);
        assert_eq!(Interval::OneDay.bucket_start(WEDNESDAY).unwrap(), 1_704_240_000);
        // Monday 2024-01-01
        assert_eq!(Interval::OneWeek.bucket_start(WEDNESDAY).unwrap(), 1_704_067_200);
        assert_eq!(Interval::OneMonth.bucket_start(WEDNESDAY).unwrap(), 1_704_067_200);
    }

    #[test]
    fn test_new_bucket_opens_at_previous_close() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                record_swap(tx, WDOGE_TICK, Amount::new(200), "DOGI", Amount::new(100), WEDNESDAY)?;
                record_swap(tx, "DOGI", Amount::new(100), WDOGE_TICK, Amount::new(300), WEDNESDAY + 1)?;
                record_swap(tx, WDOGE_TICK, Amount::new(100), "DOGI", Amount::new(100), WEDNESDAY + 120)?;

                let (open, close, high, low, volume): (f64, f64, f64, f64, Amount) = tx.query_row(
                    "SELECT open_price, close_price, high_price, low_price, volume FROM trade_summary
                     WHERE tick_id = 'DOGI' AND interval = '1m' ORDER BY bucket_start ASC LIMIT 1",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
                )?;
                assert_eq!((open, close, high, low), (2.0, 3.0, 3.0, 2.0));
                assert_eq!(volume, Amount::new(500));

                let next_open: f64 = tx.query_row(
                    "SELECT open_price FROM trade_summary
                     WHERE tick_id = 'DOGI' AND interval = '1m' ORDER BY bucket_start DESC LIMIT 1",
                    [],
                    |r| r.get(0),
                )?;
                assert_eq!(next_open, 3.0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_non_wdoge_pairs_are_skipped() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                record_swap(tx, "AAA", Amount::new(1), "BBB", Amount::new(1), WEDNESDAY)?;
                let rows: i64 = tx.query_row("SELECT COUNT(*) FROM trade_summary", [], |r| r.get(0))?;
                assert_eq!(rows, 0);
                Ok(())
            })
            .unwrap();
    }
}
