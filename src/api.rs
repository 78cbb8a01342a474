//! HTTP and WebSocket surface
//!
//! History endpoints are stateless: build the symbol, pull the window,
//! run the signal pass, group date-wise. Session endpoints drive the
//! registry; each created session gets its own loop task. The WebSocket
//! endpoint fans the live signal broadcast out to every client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::fetch::{CandleSource, Segment};
use crate::session::{self, SessionConfig, SessionRegistry};
use crate::signal_core;
use crate::symbols::{self, Exchange, IndexName, OptionType, SymbolError};
use crate::types::{Candle, ConfirmedTrade, SignalUpdate, TradeEvent, WsMessage};

pub struct AppState {
    pub source: Arc<dyn CandleSource>,
    pub registry: SessionRegistry,
    pub update_tx: broadcast::Sender<SignalUpdate>,
    pub poll_interval: Duration,
}

/// Signals keyed by trading date, ascending.
type SignalsByDate = BTreeMap<String, Vec<TradeEvent>>;

#[derive(Serialize)]
pub struct HistoryResponse {
    pub symbol: String,
    pub exchange: Exchange,
    pub total_candles: usize,
    pub total_signals: usize,
    pub signals: SignalsByDate,
    pub candles: Vec<Candle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct ConfirmedHistoryResponse {
    pub ce_symbol: String,
    pub pe_symbol: String,
    pub index: String,
    pub total_confirmed_trades: usize,
    pub total_trading_days: usize,
    pub trades: BTreeMap<String, Vec<ConfirmedTrade>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub index_name: String,
    pub year: String,
    pub month: String,
    pub expiry_day: String,
    pub strike: String,
    pub option_type: String,
    #[serde(default)]
    pub hard_fetch: bool,
    #[serde(default)]
    pub historic_data: bool,
    #[serde(default)]
    pub reverse_trade: bool,
    pub target: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct IndexHistoryParams {
    pub index_name: String,
    #[serde(default)]
    pub historic_data: bool,
    #[serde(default)]
    pub reverse_trade: bool,
    pub target: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmedHistoryParams {
    pub index_name: String,
    pub year: String,
    pub month: String,
    pub expiry_day: String,
    pub strike: String,
    #[serde(default = "default_true")]
    pub hard_fetch: bool,
    pub target: Option<f64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub index_name: String,
    pub year: String,
    pub month: String,
    pub expiry_day: String,
    pub strike: String,
    pub option_type: String,
    #[serde(default)]
    pub reverse_trade: bool,
    pub target: Option<f64>,
}

fn bad_request(err: SymbolError) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": err.to_string()})),
    )
}

fn not_found(symbol: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": format!("session not found: {symbol}")})),
    )
}

fn group_by_date(signals: Vec<TradeEvent>) -> SignalsByDate {
    let mut by_date = SignalsByDate::new();
    for signal in signals {
        by_date.entry(signal.date.clone()).or_default().push(signal);
    }
    by_date
}

fn empty_history(symbol: String, exchange: Exchange) -> HistoryResponse {
    HistoryResponse {
        symbol,
        exchange,
        total_candles: 0,
        total_signals: 0,
        signals: SignalsByDate::new(),
        candles: Vec::new(),
        message: Some("No candle data found".to_string()),
    }
}

fn history_over(
    symbol: String,
    exchange: Exchange,
    candles: Vec<Candle>,
    reverse: bool,
    target: Option<f64>,
    include_candles: bool,
) -> HistoryResponse {
    if candles.is_empty() {
        return empty_history(symbol, exchange);
    }
    let series = signal_core::compute(&candles);
    let signals = signal_core::detect(&symbol, &candles, &series, reverse, target);
    HistoryResponse {
        symbol,
        exchange,
        total_candles: candles.len(),
        total_signals: signals.len(),
        signals: group_by_date(signals),
        candles: if include_candles { candles } else { Vec::new() },
        message: None,
    }
}

/// GET /api/history - 30-day signal history for one option contract
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let built = parse_option_params(
        &params.index_name,
        &params.year,
        &params.month,
        &params.expiry_day,
        &params.strike,
        &params.option_type,
        params.hard_fetch,
    );
    let (symbol, exchange) = match built {
        Ok(built) => built,
        Err(err) => return bad_request(err).into_response(),
    };

    let candles = state
        .source
        .recent_window(&symbol, exchange, Segment::Fno)
        .await;
    Json(history_over(
        symbol,
        exchange,
        candles,
        params.reverse_trade,
        params.target,
        params.historic_data,
    ))
    .into_response()
}

/// GET /api/index-history - 30-day signal history for the underlying index
pub async fn get_index_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IndexHistoryParams>,
) -> impl IntoResponse {
    let index: IndexName = match params.index_name.parse() {
        Ok(index) => index,
        Err(err) => return bad_request(err).into_response(),
    };
    let (instrument, exchange) = match index.cash_instrument() {
        Ok(pair) => pair,
        Err(err) => return bad_request(err).into_response(),
    };

    let candles = state
        .source
        .recent_window(&instrument, exchange, Segment::Cash)
        .await;
    Json(history_over(
        index.to_string(),
        exchange,
        candles,
        params.reverse_trade,
        params.target,
        params.historic_data,
    ))
    .into_response()
}

/// GET /api/confirmed-history - CE entries confirmed by PE and index legs
pub async fn get_confirmed_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConfirmedHistoryParams>,
) -> impl IntoResponse {
    let built = (|| {
        let index: IndexName = params.index_name.parse()?;
        let (ce_symbol, exchange) = symbols::build_option_symbol(
            index,
            &params.year,
            &params.month,
            &params.expiry_day,
            &params.strike,
            OptionType::Ce,
            params.hard_fetch,
        )?;
        let (pe_symbol, _) = symbols::build_option_symbol(
            index,
            &params.year,
            &params.month,
            &params.expiry_day,
            &params.strike,
            OptionType::Pe,
            params.hard_fetch,
        )?;
        let (index_instrument, index_exchange) = index.cash_instrument()?;
        Ok::<_, SymbolError>((index, ce_symbol, pe_symbol, exchange, index_instrument, index_exchange))
    })();
    let (index, ce_symbol, pe_symbol, exchange, index_instrument, index_exchange) = match built {
        Ok(built) => built,
        Err(err) => return bad_request(err).into_response(),
    };

    let (ce_candles, pe_candles, index_candles) = tokio::join!(
        state.source.recent_window(&ce_symbol, exchange, Segment::Fno),
        state.source.recent_window(&pe_symbol, exchange, Segment::Fno),
        state
            .source
            .recent_window(&index_instrument, index_exchange, Segment::Cash),
    );

    // PE runs with reversed logic so its entries line up with CE entries
    let ce_events = detect_over(&ce_symbol, &ce_candles, false, params.target);
    let pe_events = detect_over(&pe_symbol, &pe_candles, true, params.target);
    let index_events = detect_over(index.as_str(), &index_candles, false, None);

    let confirmed = signal_core::match_confirmed_trades(
        &ce_events,
        &pe_events,
        &index_events,
        signal_core::DEFAULT_SLIPPAGE_MINUTES,
    );

    let mut trades: BTreeMap<String, Vec<ConfirmedTrade>> = BTreeMap::new();
    for trade in confirmed {
        trades
            .entry(trade.entry.date.clone())
            .or_default()
            .push(trade);
    }

    Json(ConfirmedHistoryResponse {
        ce_symbol,
        pe_symbol,
        index: index.to_string(),
        total_confirmed_trades: trades.values().map(Vec::len).sum(),
        total_trading_days: trades.len(),
        trades,
    })
    .into_response()
}

fn detect_over(symbol: &str, candles: &[Candle], reverse: bool, target: Option<f64>) -> Vec<TradeEvent> {
    let series = signal_core::compute(candles);
    signal_core::detect(symbol, candles, &series, reverse, target)
}

/// POST /api/sessions - create a live session and spawn its loop
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let built = parse_option_params(
        &request.index_name,
        &request.year,
        &request.month,
        &request.expiry_day,
        &request.strike,
        &request.option_type,
        true,
    );
    let (symbol, exchange) = match built {
        Ok(built) => built,
        Err(err) => return bad_request(err).into_response(),
    };

    let Some(status_rx) = state.registry.insert(&symbol).await else {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": format!("session already running: {symbol}")})),
        )
            .into_response();
    };

    let config = SessionConfig {
        symbol: symbol.clone(),
        exchange,
        segment: Segment::Fno,
        reverse: request.reverse_trade,
        target: request.target,
        poll_interval: state.poll_interval,
    };
    tokio::spawn(session::runner::run(
        config,
        state.source.clone(),
        status_rx,
        state.update_tx.clone(),
    ));

    info!(%symbol, "live session created");
    (
        StatusCode::CREATED,
        Json(serde_json::json!({"status": "initialized", "symbol": symbol})),
    )
        .into_response()
}

/// POST /api/sessions/{symbol}/pause
pub async fn pause_session(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    if !state.registry.pause(&symbol).await {
        return not_found(&symbol).into_response();
    }
    Json(serde_json::json!({"status": "paused", "symbol": symbol})).into_response()
}

/// POST /api/sessions/{symbol}/resume
pub async fn resume_session(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    if !state.registry.resume(&symbol).await {
        return not_found(&symbol).into_response();
    }
    Json(serde_json::json!({"status": "running", "symbol": symbol})).into_response()
}

/// DELETE /api/sessions/{symbol}
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    if !state.registry.remove(&symbol).await {
        return not_found(&symbol).into_response();
    }
    Json(serde_json::json!({"status": "deleted", "symbol": symbol})).into_response()
}

/// GET /api/sessions - list running sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.registry.symbols().await;
    Json(serde_json::json!({"sessions": sessions}))
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Config frame a client may send to request seeded history for a contract.
#[derive(Debug, Deserialize)]
struct WsHistoryRequest {
    index_name: String,
    year: String,
    month: String,
    expiry_day: String,
    strike: String,
    option_type: String,
    #[serde(default = "default_true")]
    hard_fetch: bool,
    #[serde(default)]
    reverse_trade: bool,
    target: Option<f64>,
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.update_tx.subscribe();

    loop {
        let message = tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => WsMessage::LiveUpdate(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => WsMessage::Error {
                    message: format!("client lagged, {skipped} updates dropped"),
                },
                Err(broadcast::error::RecvError::Closed) => break,
            },
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => history_reply(&state, &text).await,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        match serde_json::to_string(&message) {
            Ok(json) => {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(err) => error!(error = %err, "failed to encode ws message"),
        }
    }

    info!("WebSocket client disconnected");
}

/// Seeded history for a config frame: full 30-day signal pass, sent once.
/// Live updates that follow carry only genuinely new signals.
async fn history_reply(state: &AppState, text: &str) -> WsMessage {
    let request: WsHistoryRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => {
            return WsMessage::Error {
                message: format!("invalid config: {err}"),
            }
        }
    };

    let built = parse_option_params(
        &request.index_name,
        &request.year,
        &request.month,
        &request.expiry_day,
        &request.strike,
        &request.option_type,
        request.hard_fetch,
    );
    let (symbol, exchange) = match built {
        Ok(built) => built,
        Err(err) => {
            return WsMessage::Error {
                message: err.to_string(),
            }
        }
    };

    let candles = state
        .source
        .recent_window(&symbol, exchange, Segment::Fno)
        .await;
    let signals = detect_over(&symbol, &candles, request.reverse_trade, request.target);
    WsMessage::History {
        symbol,
        total_signals: signals.len(),
        signals,
    }
}

fn parse_option_params(
    index_name: &str,
    year: &str,
    month: &str,
    expiry_day: &str,
    strike: &str,
    option_type: &str,
    hard_fetch: bool,
) -> Result<(String, Exchange), SymbolError> {
    let index: IndexName = index_name.parse()?;
    let option_type: OptionType = option_type.parse()?;
    symbols::build_option_symbol(index, year, month, expiry_day, strike, option_type, hard_fetch)
}
