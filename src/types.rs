//! Shared types for the WaveTrend signal engine

use serde::{Deserialize, Serialize};

/// One-minute OHLCV candle. Timestamps are epoch seconds, IST market time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Raw quote update from the live feed, pre-aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub instrument_id: String,
    pub last_price: f64,
    /// Cumulative traded volume as reported by the feed (not a per-tick delta).
    pub volume: u64,
    /// Feed-local time of day, "HH:MM:SS" (IST).
    pub local_time: String,
}

/// Crossover direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Bullish => write!(f, "bullish"),
            Direction::Bearish => write!(f, "bearish"),
        }
    }
}

/// Which side of a trade an event represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Entry,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeResult {
    Profit,
    Loss,
}

/// Analytics carried by EXIT events only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitDetails {
    pub entry_price: f64,
    pub exit_price: f64,
    /// Direction-aware PnL in points, rounded to 2 decimals.
    pub points: f64,
    pub percent: f64,
    pub holding_minutes: i64,
    pub result: TradeResult,
    /// Minimum low between entry and exit candles inclusive.
    pub swing_min: f64,
    pub swing_min_time: String,
    /// Maximum high between entry and exit candles inclusive.
    pub swing_max: f64,
    pub swing_max_time: String,
    pub swing_range: f64,
    pub target: Option<f64>,
    pub target_hit: bool,
    /// Theoretical target level (entry ± target), not the touched price.
    pub target_price: Option<f64>,
    pub target_time: Option<String>,
}

/// A single ENTRY or EXIT signal produced by the detector.
///
/// `count` is one monotonically increasing counter per (symbol, run),
/// shared across both directions: it labels the Nth trade of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub symbol: String,
    #[serde(rename = "type")]
    pub direction: Direction,
    #[serde(rename = "trade_side")]
    pub side: TradeSide,
    pub count: u32,
    /// "YYYY-MM-DD" in IST.
    pub date: String,
    /// "HH:MM" in IST.
    pub time: String,
    pub price: f64,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitDetails>,
}

impl TradeEvent {
    pub fn is_entry(&self) -> bool {
        self.side == TradeSide::Entry
    }
}

/// Audit metadata attached to a confirmed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationMeta {
    pub matched_pe: TradeEvent,
    pub matched_index: TradeEvent,
    pub pe_slippage_seconds: i64,
    pub index_slippage_seconds: i64,
    pub slippage_allowed_minutes: i64,
    pub confirmation_type: String,
}

/// A CE entry/exit pair confirmed by matching PE and index entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedTrade {
    pub entry: TradeEvent,
    pub exit: TradeEvent,
    pub meta: ConfirmationMeta,
}

/// Live emission from a session loop: the candle that completed the window
/// and the genuinely new signal it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalUpdate {
    pub symbol: String,
    pub latest_candle: Candle,
    pub signal: TradeEvent,
}

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    History {
        symbol: String,
        total_signals: usize,
        signals: Vec<TradeEvent>,
    },
    LiveUpdate(SignalUpdate),
    Error {
        message: String,
    },
}
