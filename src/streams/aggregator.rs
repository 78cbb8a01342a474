//! Tick-to-candle aggregation
//!
//! Buckets a live quote stream into one-minute candles, keyed by the feed's
//! local time-of-day truncated to "HH:MM". A candle is emitted only when a
//! tick crosses the minute boundary; the final bucket of a stream stays
//! open. The feed reports cumulative volume, so the open candle stores the
//! latest reported value verbatim rather than summing deltas — the closed
//! candle's volume is a snapshot, not a per-minute traded volume.

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Asia::Kolkata;

use crate::types::{Candle, Tick};

/// Per-instrument minute bucketing state.
#[derive(Debug, Default)]
pub struct CandleAggregator {
    current_minute: Option<String>,
    candle: Option<Candle>,
}

impl CandleAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The candle currently being built, if any.
    pub fn open_candle(&self) -> Option<&Candle> {
        self.candle.as_ref()
    }

    /// Process one tick; returns the previous candle when the tick crossed
    /// a minute boundary. Ticks with a malformed `local_time` are dropped.
    pub fn on_tick(&mut self, tick: &Tick) -> Option<Candle> {
        self.apply(tick, Utc::now().with_timezone(&Kolkata).date_naive())
    }

    fn apply(&mut self, tick: &Tick, date: NaiveDate) -> Option<Candle> {
        if tick.local_time.len() < 5 {
            return None;
        }
        let minute_key = &tick.local_time[..5];

        match &self.current_minute {
            // New minute: close the previous candle, seed from this tick.
            // Lexical comparison of "HH:MM" keys is safe within one day.
            Some(current) if minute_key != current => {
                let closed = self.candle.take();
                self.candle = seed_candle(tick, date);
                self.current_minute = Some(minute_key.to_string());
                closed
            }
            // First tick after subscription
            None => {
                self.candle = seed_candle(tick, date);
                self.current_minute = Some(minute_key.to_string());
                None
            }
            // Same minute: update the open candle
            Some(_) => {
                if let Some(candle) = &mut self.candle {
                    candle.high = candle.high.max(tick.last_price);
                    candle.low = candle.low.min(tick.last_price);
                    candle.close = tick.last_price;
                    candle.volume = tick.volume;
                }
                None
            }
        }
    }
}

fn seed_candle(tick: &Tick, date: NaiveDate) -> Option<Candle> {
    Some(Candle {
        timestamp: ist_epoch(date, &tick.local_time)?,
        open: tick.last_price,
        high: tick.last_price,
        low: tick.last_price,
        close: tick.last_price,
        volume: tick.volume,
    })
}

/// Epoch seconds for an IST wall-clock time on the given date.
fn ist_epoch(date: NaiveDate, local_time: &str) -> Option<i64> {
    let time = NaiveTime::parse_from_str(local_time, "%H:%M:%S").ok()?;
    Kolkata
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(price: f64, volume: u64, local_time: &str) -> Tick {
        Tick {
            instrument_id: "54909".to_string(),
            last_price: price,
            volume,
            local_time: local_time.to_string(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
    }

    #[test]
    fn test_first_tick_seeds_open_candle() {
        let mut agg = CandleAggregator::new();
        let closed = agg.apply(&tick(250.5, 1200, "09:31:04"), date());
        assert!(closed.is_none());

        let open = agg.open_candle().unwrap();
        assert_eq!(open.open, 250.5);
        assert_eq!(open.high, 250.5);
        assert_eq!(open.low, 250.5);
        assert_eq!(open.close, 250.5);
        assert_eq!(open.volume, 1200);
    }

    #[test]
    fn test_single_minute_round_trip() {
        // All ticks in one minute: exactly one open candle, no closed ones,
        // OHLC = first/max/min/last of the input prices
        let mut agg = CandleAggregator::new();
        let prices = [250.0, 252.5, 249.0, 251.0];
        for (i, price) in prices.iter().enumerate() {
            let t = tick(*price, 1000 + i as u64 * 10, &format!("09:31:{:02}", i * 10));
            assert!(agg.apply(&t, date()).is_none());
        }

        let open = agg.open_candle().unwrap();
        assert_eq!(open.open, 250.0);
        assert_eq!(open.high, 252.5);
        assert_eq!(open.low, 249.0);
        assert_eq!(open.close, 251.0);
        // Volume is the latest reported cumulative value, not a sum
        assert_eq!(open.volume, 1030);
    }

    #[test]
    fn test_minute_rollover_emits_closed_candle() {
        let mut agg = CandleAggregator::new();
        assert!(agg.apply(&tick(100.0, 500, "09:31:10"), date()).is_none());
        assert!(agg.apply(&tick(101.0, 510, "09:31:40"), date()).is_none());

        let closed = agg.apply(&tick(99.5, 520, "09:32:02"), date()).unwrap();
        assert_eq!(closed.open, 100.0);
        assert_eq!(closed.close, 101.0);
        assert_eq!(closed.volume, 510);

        // New open candle seeded from the boundary-crossing tick
        let open = agg.open_candle().unwrap();
        assert_eq!(open.open, 99.5);
        assert_eq!(open.volume, 520);
    }

    #[test]
    fn test_hour_boundary_rolls_over() {
        let mut agg = CandleAggregator::new();
        assert!(agg.apply(&tick(100.0, 500, "09:59:58"), date()).is_none());
        let closed = agg.apply(&tick(100.5, 505, "10:00:01"), date());
        assert!(closed.is_some());
    }

    #[test]
    fn test_closed_candle_timestamp_is_ist_epoch() {
        let mut agg = CandleAggregator::new();
        agg.apply(&tick(100.0, 500, "09:31:04"), date());
        let closed = agg.apply(&tick(100.0, 500, "09:32:00"), date()).unwrap();

        let expected = Kolkata
            .from_local_datetime(
                &date().and_time(NaiveTime::from_hms_opt(9, 31, 4).unwrap()),
            )
            .single()
            .unwrap()
            .timestamp();
        assert_eq!(closed.timestamp, expected);
    }

    #[test]
    fn test_malformed_local_time_dropped() {
        let mut agg = CandleAggregator::new();
        assert!(agg.apply(&tick(100.0, 500, "bad"), date()).is_none());
        assert!(agg.open_candle().is_none());
    }
}
