//! Three-leg trade confirmation
//!
//! Correlates ENTRY events across a call option (CE), a put option (PE) and
//! the underlying index: a CE entry is confirmed when a PE entry and a
//! bullish index entry each land within the slippage tolerance of it, and
//! the CE trade has closed. Matching is first-within-tolerance, not
//! closest, so results are deterministic in chronological order.

use chrono::NaiveDateTime;

use crate::types::{ConfirmationMeta, ConfirmedTrade, Direction, TradeEvent, TradeSide};

pub const DEFAULT_SLIPPAGE_MINUTES: i64 = 2;

const CONFIRMATION_TYPE: &str = "3-level";

/// Match CE entries against PE and index entries within the tolerance.
///
/// Only closed CE trades (ones with an EXIT sharing the entry's `count`)
/// produce confirmed trades; both slippages are measured against the CE
/// entry time.
pub fn match_confirmed_trades(
    ce_events: &[TradeEvent],
    pe_events: &[TradeEvent],
    index_events: &[TradeEvent],
    slippage_minutes: i64,
) -> Vec<ConfirmedTrade> {
    let tolerance_seconds = slippage_minutes * 60;

    let ce_entries = entries_with_times(ce_events, None);
    let pe_entries = entries_with_times(pe_events, None);
    // Directional bias of the underlying confirms the option trade
    // regardless of which leg triggered it.
    let index_entries = entries_with_times(index_events, Some(Direction::Bullish));

    let mut confirmed = Vec::new();

    for (ce, ce_dt) in &ce_entries {
        let Some((pe_match, pe_slippage)) =
            first_within(&pe_entries, *ce_dt, tolerance_seconds)
        else {
            continue;
        };

        let Some((index_match, index_slippage)) =
            first_within(&index_entries, *ce_dt, tolerance_seconds)
        else {
            continue;
        };

        // Only closed trades are ever confirmed
        let Some(ce_exit) = ce_events
            .iter()
            .find(|e| e.side == TradeSide::Exit && e.count == ce.count)
        else {
            continue;
        };

        confirmed.push(ConfirmedTrade {
            entry: (*ce).clone(),
            exit: ce_exit.clone(),
            meta: ConfirmationMeta {
                matched_pe: pe_match.clone(),
                matched_index: index_match.clone(),
                pe_slippage_seconds: pe_slippage,
                index_slippage_seconds: index_slippage,
                slippage_allowed_minutes: slippage_minutes,
                confirmation_type: CONFIRMATION_TYPE.to_string(),
            },
        });
    }

    confirmed
}

/// ENTRY events paired with their parsed timestamps, optionally filtered to
/// one direction. Events whose date/time fail to parse are skipped.
fn entries_with_times<'a>(
    events: &'a [TradeEvent],
    direction: Option<Direction>,
) -> Vec<(&'a TradeEvent, NaiveDateTime)> {
    events
        .iter()
        .filter(|e| e.side == TradeSide::Entry)
        .filter(|e| direction.is_none_or(|d| e.direction == d))
        .filter_map(|e| parse_event_time(e).map(|dt| (e, dt)))
        .collect()
}

/// First candidate whose time differs from `anchor` by at most the
/// tolerance, with the absolute slippage in seconds.
fn first_within<'a>(
    candidates: &[(&'a TradeEvent, NaiveDateTime)],
    anchor: NaiveDateTime,
    tolerance_seconds: i64,
) -> Option<(&'a TradeEvent, i64)> {
    candidates.iter().find_map(|(event, dt)| {
        let diff = (*dt - anchor).num_seconds().abs();
        (diff <= tolerance_seconds).then_some((*event, diff))
    })
}

fn parse_event_time(event: &TradeEvent) -> Option<NaiveDateTime> {
    let joined = format!("{} {}", event.date, event.time);
    NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(symbol: &str, direction: Direction, count: u32, time: &str) -> TradeEvent {
        TradeEvent {
            symbol: symbol.to_string(),
            direction,
            side: TradeSide::Entry,
            count,
            date: "2026-02-10".to_string(),
            time: time.to_string(),
            price: 100.0,
            exit: None,
        }
    }

    fn exit(symbol: &str, direction: Direction, count: u32, time: &str) -> TradeEvent {
        TradeEvent {
            side: TradeSide::Exit,
            ..entry(symbol, direction, count, time)
        }
    }

    #[test]
    fn test_three_leg_confirmation_with_slippage() {
        // CE entry 09:31:00, PE entry 90s later, index entry 105s later
        let ce = vec![
            entry("CE", Direction::Bullish, 1, "09:31:00"),
            exit("CE", Direction::Bearish, 1, "09:45:00"),
        ];
        let pe = vec![entry("PE", Direction::Bearish, 1, "09:32:30")];
        let index = vec![entry("NIFTY", Direction::Bullish, 1, "09:32:45")];

        let confirmed = match_confirmed_trades(&ce, &pe, &index, DEFAULT_SLIPPAGE_MINUTES);
        assert_eq!(confirmed.len(), 1);

        let trade = &confirmed[0];
        assert_eq!(trade.entry.count, 1);
        assert_eq!(trade.exit.side, TradeSide::Exit);
        assert_eq!(trade.meta.pe_slippage_seconds, 90);
        assert_eq!(trade.meta.index_slippage_seconds, 105);
        assert_eq!(trade.meta.slippage_allowed_minutes, 2);
        assert_eq!(trade.meta.confirmation_type, "3-level");
    }

    #[test]
    fn test_no_pe_within_tolerance_excludes_trade() {
        let ce = vec![
            entry("CE", Direction::Bullish, 1, "09:31"),
            exit("CE", Direction::Bearish, 1, "09:45"),
        ];
        let pe = vec![entry("PE", Direction::Bearish, 1, "09:40")];
        let index = vec![entry("NIFTY", Direction::Bullish, 1, "09:31")];

        let confirmed = match_confirmed_trades(&ce, &pe, &index, 2);
        assert!(confirmed.is_empty());
    }

    #[test]
    fn test_bearish_index_entries_are_ignored() {
        let ce = vec![
            entry("CE", Direction::Bullish, 1, "09:31"),
            exit("CE", Direction::Bearish, 1, "09:45"),
        ];
        let pe = vec![entry("PE", Direction::Bearish, 1, "09:31")];
        let index = vec![entry("NIFTY", Direction::Bearish, 1, "09:31")];

        let confirmed = match_confirmed_trades(&ce, &pe, &index, 2);
        assert!(confirmed.is_empty());
    }

    #[test]
    fn test_open_ce_trade_is_excluded() {
        // No CE exit with count 1: the trade is still open
        let ce = vec![entry("CE", Direction::Bullish, 1, "09:31")];
        let pe = vec![entry("PE", Direction::Bearish, 1, "09:31")];
        let index = vec![entry("NIFTY", Direction::Bullish, 1, "09:31")];

        let confirmed = match_confirmed_trades(&ce, &pe, &index, 2);
        assert!(confirmed.is_empty());
    }

    #[test]
    fn test_first_match_wins_over_closer_match() {
        let ce = vec![
            entry("CE", Direction::Bullish, 1, "09:31:00"),
            exit("CE", Direction::Bearish, 1, "09:45:00"),
        ];
        // Both PE entries qualify; the first listed one is taken even
        // though the second is closer in time
        let pe = vec![
            entry("PE", Direction::Bearish, 1, "09:32:50"),
            entry("PE", Direction::Bearish, 2, "09:31:10"),
        ];
        let index = vec![entry("NIFTY", Direction::Bullish, 1, "09:31:00")];

        let confirmed = match_confirmed_trades(&ce, &pe, &index, 2);
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].meta.pe_slippage_seconds, 110);
        assert_eq!(confirmed[0].meta.matched_pe.count, 1);
    }

    #[test]
    fn test_exit_matched_by_sequence_count() {
        let ce = vec![
            entry("CE", Direction::Bullish, 1, "09:31"),
            exit("CE", Direction::Bearish, 1, "09:40"),
            entry("CE", Direction::Bullish, 2, "10:15"),
            exit("CE", Direction::Bearish, 2, "10:30"),
        ];
        let pe = vec![
            entry("PE", Direction::Bearish, 1, "09:31"),
            entry("PE", Direction::Bearish, 2, "10:16"),
        ];
        let index = vec![
            entry("NIFTY", Direction::Bullish, 1, "09:32"),
            entry("NIFTY", Direction::Bullish, 2, "10:14"),
        ];

        let confirmed = match_confirmed_trades(&ce, &pe, &index, 2);
        assert_eq!(confirmed.len(), 2);
        assert_eq!(confirmed[0].exit.time, "09:40");
        assert_eq!(confirmed[1].exit.time, "10:30");
        // Output follows CE entry order
        assert_eq!(confirmed[0].entry.count, 1);
        assert_eq!(confirmed[1].entry.count, 2);
    }
}
