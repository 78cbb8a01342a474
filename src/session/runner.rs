//! Per-symbol live session loop
//!
//! Each session owns its own candle window and recomputes the full
//! oscillator + detector pass on every new candle; the window is bounded
//! so recompute cost stays flat. Emissions are gated on the latest event's
//! sequence count so a recompute that reproduces the same signals stays
//! silent. Faults inside one iteration are logged and skipped; nothing a
//! single symbol does can take down another session or the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::registry::SessionState;
use crate::fetch::{CandleSource, Segment};
use crate::signal_core;
use crate::symbols::Exchange;
use crate::types::{Candle, SignalUpdate, TradeEvent};

/// Oldest candles are evicted past this window length.
const WINDOW_CAP: usize = 2000;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Everything a session loop needs to know about its instrument.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub symbol: String,
    pub exchange: Exchange,
    pub segment: Segment,
    pub reverse: bool,
    pub target: Option<f64>,
    pub poll_interval: Duration,
}

/// Run one session to completion. Returns when the session is removed or
/// its status channel is dropped.
pub async fn run(
    config: SessionConfig,
    source: Arc<dyn CandleSource>,
    status_rx: tokio::sync::watch::Receiver<SessionState>,
    update_tx: broadcast::Sender<SignalUpdate>,
) {
    let mut window = source
        .recent_window(&config.symbol, config.exchange, config.segment)
        .await;
    evict_oldest(&mut window);

    // Seed the emission gate so historical signals are not replayed live
    let mut last_emitted = recompute(&config, &window)
        .last()
        .map(|event| event.count)
        .unwrap_or(0);
    info!(
        symbol = %config.symbol,
        candles = window.len(),
        seeded_count = last_emitted,
        "session loop started"
    );

    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // Sender dropped means the registry entry is gone
        if status_rx.has_changed().is_err() {
            break;
        }
        match *status_rx.borrow() {
            SessionState::Removed => break,
            SessionState::Paused => continue,
            SessionState::Running => {}
        }

        let Some(latest) = source
            .latest_candle(&config.symbol, config.exchange, config.segment)
            .await
        else {
            debug!(symbol = %config.symbol, "no latest candle, skipping poll");
            continue;
        };

        // The venue re-serves the open minute until it closes
        if window.last().is_some_and(|c| c.timestamp == latest.timestamp) {
            continue;
        }

        window.push(latest.clone());
        evict_oldest(&mut window);

        let events = recompute(&config, &window);
        if let Some(update) = gate_emission(&events, &mut last_emitted) {
            debug!(symbol = %config.symbol, count = update.count, "emitting live signal");
            // No subscribers is fine
            let _ = update_tx.send(SignalUpdate {
                symbol: config.symbol.clone(),
                latest_candle: latest,
                signal: update.clone(),
            });
        }
    }

    info!(symbol = %config.symbol, "session loop stopped");
}

fn recompute(config: &SessionConfig, window: &[Candle]) -> Vec<TradeEvent> {
    let series = signal_core::compute(window);
    signal_core::detect(
        &config.symbol,
        window,
        &series,
        config.reverse,
        config.target,
    )
}

fn evict_oldest(window: &mut Vec<Candle>) {
    if window.len() > WINDOW_CAP {
        window.drain(..window.len() - WINDOW_CAP);
    }
}

/// Emit only when the latest event carries a strictly newer count than
/// anything already sent.
fn gate_emission<'a>(events: &'a [TradeEvent], last_emitted: &mut u32) -> Option<&'a TradeEvent> {
    let latest = events.last()?;
    if latest.count <= *last_emitted {
        return None;
    }
    *last_emitted = latest.count;
    Some(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::types::{Direction, TradeSide};

    fn event(count: u32) -> TradeEvent {
        TradeEvent {
            symbol: "TEST".to_string(),
            direction: Direction::Bullish,
            side: TradeSide::Entry,
            count,
            date: "2026-02-10".to_string(),
            time: "09:31".to_string(),
            price: 100.0,
            exit: None,
        }
    }

    fn candle(ts: i64) -> Candle {
        Candle {
            timestamp: ts,
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 0,
        }
    }

    struct ScriptedSource {
        latest: Mutex<Vec<Option<Candle>>>,
    }

    #[async_trait]
    impl CandleSource for ScriptedSource {
        async fn recent_window(&self, _: &str, _: Exchange, _: Segment) -> Vec<Candle> {
            Vec::new()
        }

        async fn latest_candle(&self, _: &str, _: Exchange, _: Segment) -> Option<Candle> {
            let mut latest = self.latest.lock().unwrap();
            if latest.is_empty() {
                None
            } else {
                latest.remove(0)
            }
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            symbol: "TEST".to_string(),
            exchange: Exchange::Nse,
            segment: Segment::Fno,
            reverse: false,
            target: None,
            poll_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_same_count_across_polls_emits_once() {
        let mut last_emitted = 0;
        let events = vec![event(1)];

        // First poll surfaces count 1, second poll recomputes the same window
        assert!(gate_emission(&events, &mut last_emitted).is_some());
        assert!(gate_emission(&events, &mut last_emitted).is_none());
        assert_eq!(last_emitted, 1);
    }

    #[test]
    fn test_gate_requires_strictly_greater_count() {
        let mut last_emitted = 3;
        assert!(gate_emission(&[event(2)], &mut last_emitted).is_none());
        assert!(gate_emission(&[event(3)], &mut last_emitted).is_none());

        let events = [event(4)];
        let emitted = gate_emission(&events, &mut last_emitted).unwrap();
        assert_eq!(emitted.count, 4);
        assert_eq!(last_emitted, 4);
    }

    #[test]
    fn test_gate_is_silent_on_empty_events() {
        let mut last_emitted = 0;
        assert!(gate_emission(&[], &mut last_emitted).is_none());
        assert_eq!(last_emitted, 0);
    }

    #[test]
    fn test_evict_oldest_keeps_newest_candles() {
        let mut window: Vec<Candle> = (0..WINDOW_CAP as i64 + 10).map(candle).collect();
        evict_oldest(&mut window);
        assert_eq!(window.len(), WINDOW_CAP);
        assert_eq!(window[0].timestamp, 10);
    }

    #[tokio::test]
    async fn test_loop_stops_on_removal() {
        let source = Arc::new(ScriptedSource {
            latest: Mutex::new(vec![None, None, None]),
        });
        let (status_tx, status_rx) = tokio::sync::watch::channel(SessionState::Running);
        let (update_tx, _) = broadcast::channel(16);

        let handle = tokio::spawn(run(config(), source, status_rx, update_tx));
        status_tx.send(SessionState::Removed).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop after removal")
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_stops_when_registry_entry_dropped() {
        let source = Arc::new(ScriptedSource {
            latest: Mutex::new(Vec::new()),
        });
        let (status_tx, status_rx) = tokio::sync::watch::channel(SessionState::Running);
        let (update_tx, _) = broadcast::channel(16);

        let handle = tokio::spawn(run(config(), source, status_rx, update_tx));
        drop(status_tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop after status sender dropped")
            .unwrap();
    }
}
