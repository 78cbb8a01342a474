//! Signal Core - the WaveTrend processing pipeline
//!
//! Pure, stateless building blocks shared by the history endpoints and the
//! live session loops:
//! - Oscillator computation over a candle window
//! - Entry/exit detection with target and swing analytics
//! - Three-leg (CE/PE/index) trade confirmation

pub mod detector;
pub mod matcher;
pub mod oscillator;

// Re-export commonly used items
pub use detector::detect;
pub use matcher::{match_confirmed_trades, DEFAULT_SLIPPAGE_MINUTES};
pub use oscillator::{compute, OscillatorSeries};
