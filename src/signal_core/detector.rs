//! Entry/exit signal detection over a WaveTrend series
//!
//! Walks a candle window and its oscillator lines forward, producing
//! alternating ENTRY/EXIT trade events. At most one trade is active at a
//! time; entry conditions are ignored while a trade is open and exit
//! conditions while none is. Reverse mode swaps which crossover direction
//! counts as entry, so a short-bias leg (PE) runs through the same walk.

use chrono::{DateTime, Utc};
use chrono_tz::Asia::Kolkata;
use chrono_tz::Tz;

use super::oscillator::OscillatorSeries;
use crate::types::{Candle, Direction, ExitDetails, TradeEvent, TradeResult, TradeSide};

/// The open trade between an ENTRY and its matching EXIT.
struct ActiveTrade {
    index: usize,
    price: f64,
    time: DateTime<Tz>,
}

/// Detect trade events over an ordered candle window.
///
/// A `target` of `None` or `<= 0` disables target-hit detection. Fewer than
/// two candles yields no events.
pub fn detect(
    symbol: &str,
    candles: &[Candle],
    series: &OscillatorSeries,
    reverse: bool,
    target: Option<f64>,
) -> Vec<TradeEvent> {
    let mut events = Vec::new();

    if candles.len() < 2 {
        return events;
    }
    debug_assert_eq!(candles.len(), series.len());
    if candles.len() != series.len() {
        return events;
    }

    let target = target.filter(|t| *t > 0.0);

    let mut trade_count: u32 = 0;
    let mut active_trade: Option<ActiveTrade> = None;
    // Guards against duplicate candles reaching the engine: an entry whose
    // candle timestamp equals the previous accepted entry's is skipped.
    let mut last_entry_timestamp: Option<i64> = None;

    for i in 1..candles.len() {
        let curr = &candles[i];
        let curr_dt = ist_datetime(curr.timestamp);

        let bull = series.wt1[i] > series.wt2[i] && series.wt1[i - 1] <= series.wt2[i - 1];
        let bear = series.wt1[i] < series.wt2[i] && series.wt1[i - 1] >= series.wt2[i - 1];

        let (entry_signal, exit_signal, entry_dir) = if !reverse {
            (bull, bear, Direction::Bullish)
        } else {
            (bear, bull, Direction::Bearish)
        };

        if entry_signal && active_trade.is_none() {
            if last_entry_timestamp == Some(curr.timestamp) {
                continue;
            }

            trade_count += 1;
            active_trade = Some(ActiveTrade {
                index: i,
                price: curr.close,
                time: curr_dt,
            });
            last_entry_timestamp = Some(curr.timestamp);

            events.push(TradeEvent {
                symbol: symbol.to_string(),
                direction: entry_dir,
                side: TradeSide::Entry,
                count: trade_count,
                date: curr_dt.format("%Y-%m-%d").to_string(),
                time: curr_dt.format("%H:%M").to_string(),
                price: curr.close,
                exit: None,
            });
        } else if exit_signal {
            let Some(trade) = active_trade.take() else {
                continue;
            };
            let exit_price = curr.close;

            // Direction-aware PnL
            let points = if !reverse {
                round2(exit_price - trade.price)
            } else {
                round2(trade.price - exit_price)
            };
            let percent = round2(points / trade.price * 100.0);
            let holding_minutes = (curr_dt - trade.time).num_minutes();

            let window = &candles[trade.index..=i];
            let (target_hit, target_price, target_time) =
                check_target(window, trade.price, target, reverse);
            let swing = swing_extrema(window);

            events.push(TradeEvent {
                symbol: symbol.to_string(),
                direction: entry_dir.opposite(),
                side: TradeSide::Exit,
                count: trade_count,
                date: curr_dt.format("%Y-%m-%d").to_string(),
                time: curr_dt.format("%H:%M").to_string(),
                price: exit_price,
                exit: Some(ExitDetails {
                    entry_price: trade.price,
                    exit_price,
                    points,
                    percent,
                    holding_minutes,
                    result: if points > 0.0 {
                        TradeResult::Profit
                    } else {
                        TradeResult::Loss
                    },
                    swing_min: swing.min_price,
                    swing_min_time: swing.min_time,
                    swing_max: swing.max_price,
                    swing_max_time: swing.max_time,
                    swing_range: round2(swing.max_price - swing.min_price),
                    target,
                    target_hit,
                    target_price,
                    target_time,
                }),
            });
        }
    }

    events
}

struct SwingExtrema {
    min_price: f64,
    min_time: String,
    max_price: f64,
    max_time: String,
}

/// Minimum low / maximum high over the entry..=exit window, with the times
/// of the first candle touching each extreme.
fn swing_extrema(window: &[Candle]) -> SwingExtrema {
    debug_assert!(!window.is_empty());

    let mut min_idx = 0;
    let mut max_idx = 0;
    for (i, c) in window.iter().enumerate() {
        if c.low < window[min_idx].low {
            min_idx = i;
        }
        if c.high > window[max_idx].high {
            max_idx = i;
        }
    }

    SwingExtrema {
        min_price: window[min_idx].low,
        min_time: ist_datetime(window[min_idx].timestamp)
            .format("%H:%M")
            .to_string(),
        max_price: window[max_idx].high,
        max_time: ist_datetime(window[max_idx].timestamp)
            .format("%H:%M")
            .to_string(),
    }
}

/// First candle in the window whose favorable extreme reaches entry ± target.
/// Records the theoretical target level, not the touched price.
fn check_target(
    window: &[Candle],
    entry_price: f64,
    target: Option<f64>,
    reverse: bool,
) -> (bool, Option<f64>, Option<String>) {
    let Some(target) = target else {
        return (false, None, None);
    };

    let hit = window.iter().find(|c| {
        if !reverse {
            c.high >= entry_price + target
        } else {
            c.low <= entry_price - target
        }
    });

    match hit {
        Some(c) => {
            let level = if !reverse {
                entry_price + target
            } else {
                entry_price - target
            };
            (
                true,
                Some(round2(level)),
                Some(ist_datetime(c.timestamp).format("%H:%M").to_string()),
            )
        }
        None => (false, None, None),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn ist_datetime(epoch_seconds: i64) -> DateTime<Tz> {
    DateTime::<Utc>::from_timestamp(epoch_seconds, 0)
        .unwrap_or_default()
        .with_timezone(&Kolkata)
}
