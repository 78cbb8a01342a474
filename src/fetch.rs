//! Historical candle retrieval
//!
//! HTTP client for the Groww charting REST API. History is pulled as a
//! 30-day range split into 7-day batches, fetched with bounded concurrency
//! and per-batch retries, then merged, deduplicated by timestamp and sorted.
//! Exhausted retries degrade to an empty batch rather than an error: to the
//! signal core, no candles simply means no signals.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Asia::Kolkata;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::symbols::Exchange;
use crate::types::Candle;

const MAX_CONCURRENT_REQUESTS: usize = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const RETRY_COUNT: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_secs(1);
const HISTORY_DAYS: i64 = 30;
const BATCH_DAYS: i64 = 7;
const LATEST_TAIL_MINUTES: i64 = 10;

const FNO_BASE_URL: &str =
    "https://groww.in/v1/api/stocks_fo_data/v1/charting_service/delayed/chart";
const CASH_BASE_URL: &str = "https://groww.in/v1/api/charting_service/v2/chart/delayed";

/// Transient fetch failures. Retried by the client; exhaustion is reported
/// to callers as an empty result, never propagated.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(StatusCode),
}

/// Venue segment the instrument trades in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Options (futures & options segment)
    Fno,
    /// The underlying index itself
    Cash,
}

/// Where history endpoints and live sessions get their candles from.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Recent minute candles for the instrument, oldest first.
    async fn recent_window(
        &self,
        symbol: &str,
        exchange: Exchange,
        segment: Segment,
    ) -> Vec<Candle>;

    /// The most recent minute candle, if the venue has one.
    async fn latest_candle(
        &self,
        symbol: &str,
        exchange: Exchange,
        segment: Segment,
    ) -> Option<Candle>;
}

/// Groww charting API client.
pub struct HistoryClient {
    client: Client,
    semaphore: Arc<Semaphore>,
}

impl HistoryClient {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        })
    }

    /// One batch with retries. A batch that keeps failing comes back empty.
    async fn fetch_batch(&self, url: &str) -> Vec<Candle> {
        // Closed only if the semaphore is dropped, which never happens here
        let Ok(_permit) = self.semaphore.acquire().await else {
            return Vec::new();
        };

        for attempt in 1..=RETRY_COUNT {
            match self.fetch_once(url).await {
                Ok(candles) => return candles,
                Err(err) if attempt < RETRY_COUNT => {
                    debug!(%url, attempt, error = %err, "batch fetch failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(err) => {
                    warn!(%url, error = %err, "batch fetch exhausted retries");
                }
            }
        }
        Vec::new()
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<Candle>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let chart: ChartResponse = response.json().await?;
        Ok(chart.candles.into_iter().map(Candle::from).collect())
    }
}

#[async_trait]
impl CandleSource for HistoryClient {
    async fn recent_window(
        &self,
        symbol: &str,
        exchange: Exchange,
        segment: Segment,
    ) -> Vec<Candle> {
        let now_ms = Utc::now().with_timezone(&Kolkata).timestamp_millis();
        let start_ms = now_ms - HISTORY_DAYS * 24 * 60 * 60 * 1000;
        let batches = seven_day_batches(start_ms, now_ms);
        let batch_count = batches.len();

        let urls: Vec<String> = batches
            .into_iter()
            .map(|(start, end)| chart_url(symbol, exchange, segment, start, end))
            .collect();
        let results: Vec<Vec<Candle>> =
            join_all(urls.iter().map(|url| self.fetch_batch(url))).await;

        let window = merge_batches(results);
        debug!(
            symbol,
            batches = batch_count,
            candles = window.len(),
            "fetched historical window"
        );
        window
    }

    async fn latest_candle(
        &self,
        symbol: &str,
        exchange: Exchange,
        segment: Segment,
    ) -> Option<Candle> {
        let now_ms = Utc::now().with_timezone(&Kolkata).timestamp_millis();
        let start_ms = now_ms - LATEST_TAIL_MINUTES * 60 * 1000;
        let url = chart_url(symbol, exchange, segment, start_ms, now_ms);
        let mut tail = self.fetch_batch(&url).await;
        tail.sort_by_key(|c| c.timestamp);
        tail.pop()
    }
}

fn chart_url(symbol: &str, exchange: Exchange, segment: Segment, start_ms: i64, end_ms: i64) -> String {
    let base = match segment {
        Segment::Fno => format!("{FNO_BASE_URL}/exchange/{exchange}/segment/FNO/{symbol}"),
        Segment::Cash => format!("{CASH_BASE_URL}/exchange/{exchange}/segment/CASH/{symbol}"),
    };
    format!("{base}?endTimeInMillis={end_ms}&intervalInMinutes=1&startTimeInMillis={start_ms}")
}

/// Split [start, end] into contiguous at-most-7-day windows in millis.
fn seven_day_batches(start_ms: i64, end_ms: i64) -> Vec<(i64, i64)> {
    const BATCH_MS: i64 = BATCH_DAYS * 24 * 60 * 60 * 1000;
    let mut batches = Vec::new();
    let mut cursor = start_ms;
    while cursor < end_ms {
        let batch_end = (cursor + BATCH_MS).min(end_ms);
        batches.push((cursor, batch_end));
        cursor = batch_end;
    }
    batches
}

/// Flatten batch results, dedup by timestamp, sort ascending. Batches may
/// overlap at their edges; the first occurrence of a timestamp wins.
fn merge_batches(batches: Vec<Vec<Candle>>) -> Vec<Candle> {
    let mut all: Vec<Candle> = batches.into_iter().flatten().collect();
    all.sort_by_key(|c| c.timestamp);
    all.dedup_by_key(|c| c.timestamp);
    all
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    #[serde(default)]
    candles: Vec<CandleRow>,
}

/// Wire row: `[timestamp, open, high, low, close, volume]`, volume nullable.
#[derive(Debug, Deserialize)]
struct CandleRow(i64, f64, f64, f64, f64, #[serde(default)] Option<f64>);

impl From<CandleRow> for Candle {
    fn from(row: CandleRow) -> Self {
        Candle {
            timestamp: row.0,
            open: row.1,
            high: row.2,
            low: row.3,
            close: row.4,
            volume: row.5.unwrap_or(0.0) as u64,
        }
    }
}
