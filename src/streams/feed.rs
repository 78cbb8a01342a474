//! Live quote feed singleton
//!
//! One process-wide task owns the instrument subscription set and the
//! per-instrument aggregators; everything else talks to it through
//! channels. Subscriptions are marshalled onto the feed task via commands
//! (never mutated from another task) and gated on a readiness flag so an
//! attempt issued before the task is up simply waits. Closed candles fan
//! out over a broadcast channel keyed by instrument id.
//!
//! The wire protocol behind the stream is not handled here: the transport
//! fills the `mpsc::Receiver<Tick>` this task consumes.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::aggregator::CandleAggregator;
use crate::types::{Candle, Tick};

const COMMAND_BUFFER: usize = 64;
const CANDLE_BUFFER: usize = 1024;

#[derive(Debug)]
enum FeedCommand {
    Subscribe {
        instrument_id: String,
        ack: oneshot::Sender<()>,
    },
    Unsubscribe {
        instrument_id: String,
        ack: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the feed task.
#[derive(Debug, Clone)]
pub struct QuoteFeedHandle {
    cmd_tx: mpsc::Sender<FeedCommand>,
    candle_tx: broadcast::Sender<(String, Candle)>,
    ready_rx: watch::Receiver<bool>,
}

impl QuoteFeedHandle {
    /// Subscribe an instrument, waiting for the feed task to come up first.
    /// Resolves once the feed task has applied the subscription.
    /// Idempotent: re-subscribing an instrument keeps its open candle.
    pub async fn subscribe(&self, instrument_id: &str) -> Result<()> {
        self.wait_ready().await?;
        let (ack, applied) = oneshot::channel();
        self.cmd_tx
            .send(FeedCommand::Subscribe {
                instrument_id: instrument_id.to_string(),
                ack,
            })
            .await
            .context("quote feed task is not running")?;
        applied
            .await
            .context("quote feed task stopped before applying subscription")
    }

    pub async fn unsubscribe(&self, instrument_id: &str) -> Result<()> {
        self.wait_ready().await?;
        let (ack, applied) = oneshot::channel();
        self.cmd_tx
            .send(FeedCommand::Unsubscribe {
                instrument_id: instrument_id.to_string(),
                ack,
            })
            .await
            .context("quote feed task is not running")?;
        applied
            .await
            .context("quote feed task stopped before applying unsubscription")
    }

    /// Subscribe to closed candles for all instruments.
    pub fn candles(&self) -> broadcast::Receiver<(String, Candle)> {
        self.candle_tx.subscribe()
    }

    async fn wait_ready(&self) -> Result<()> {
        let mut ready_rx = self.ready_rx.clone();
        while !*ready_rx.borrow() {
            ready_rx
                .changed()
                .await
                .context("quote feed task dropped before becoming ready")?;
        }
        Ok(())
    }
}

/// Spawn the feed task around a transport-provided tick stream.
pub fn spawn(tick_rx: mpsc::Receiver<Tick>) -> QuoteFeedHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (candle_tx, _) = broadcast::channel(CANDLE_BUFFER);
    let (ready_tx, ready_rx) = watch::channel(false);

    tokio::spawn(run(cmd_rx, tick_rx, candle_tx.clone(), ready_tx));

    QuoteFeedHandle {
        cmd_tx,
        candle_tx,
        ready_rx,
    }
}

async fn run(
    mut cmd_rx: mpsc::Receiver<FeedCommand>,
    mut tick_rx: mpsc::Receiver<Tick>,
    candle_tx: broadcast::Sender<(String, Candle)>,
    ready_tx: watch::Sender<bool>,
) {
    let mut aggregators: HashMap<String, CandleAggregator> = HashMap::new();

    // Mark the feed ready only once the task is actually polling
    let _ = ready_tx.send(true);
    info!("quote feed task started");

    loop {
        tokio::select! {
            // Drain pending ticks before applying subscription changes so
            // an unsubscribe cannot reorder ahead of ticks already queued
            biased;

            tick = tick_rx.recv() => {
                let Some(tick) = tick else {
                    warn!("quote stream disconnected, stopping feed task");
                    break;
                };
                // Ticks for unsubscribed instruments are dropped
                let Some(aggregator) = aggregators.get_mut(&tick.instrument_id) else {
                    continue;
                };
                if let Some(closed) = aggregator.on_tick(&tick) {
                    // No receivers is fine; sessions may not be listening yet
                    let _ = candle_tx.send((tick.instrument_id.clone(), closed));
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("all feed handles dropped, stopping");
                    break;
                };
                match cmd {
                    FeedCommand::Subscribe { instrument_id, ack } => {
                        info!(instrument = %instrument_id, "subscribing instrument");
                        aggregators.entry(instrument_id).or_default();
                        let _ = ack.send(());
                    }
                    FeedCommand::Unsubscribe { instrument_id, ack } => {
                        info!(instrument = %instrument_id, "unsubscribing instrument");
                        aggregators.remove(&instrument_id);
                        let _ = ack.send(());
                    }
                }
            }
        }
    }
}
