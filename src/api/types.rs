//! Wire types of the trading service and their decoders.
//!
//! Decoders are tolerant of missing optional fields but reject payloads whose
//! top-level shape is wrong; that rejection is what surfaces as a decode
//! failure for the tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FeedError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    #[serde(default)]
    pub total_instances: u64,
    #[serde(default)]
    pub total_value: f64,
    #[serde(default)]
    pub total_pnl: f64,
    #[serde(default)]
    pub total_pnl_pct: f64,
    #[serde(default)]
    pub active_positions: u64,
    #[serde(default)]
    pub total_trades: u64,
}

/// One leaderboard row. Identity is `instance_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub rank: u32,
    pub instance_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub pnl: f64,
    #[serde(default)]
    pub pnl_pct: f64,
    #[serde(default)]
    pub sharpe_ratio: f64,
    #[serde(default)]
    pub win_rate: f64,
    #[serde(default)]
    pub max_drawdown: f64,
    #[serde(default)]
    pub total_trades: u64,
    #[serde(default)]
    pub current_value: f64,
    #[serde(default)]
    pub initial_capital: f64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Instance {
    /// Model name without its provider prefix ("openai/gpt-4o" -> "gpt-4o").
    pub fn short_model(&self) -> &str {
        self.model.rsplit('/').next().unwrap_or(&self.model)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub change_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketPrices {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub prices: BTreeMap<String, MarketPrice>,
}

/// Ticker symbols in display order.
pub const TICKER_SYMBOLS: [&str; 6] = ["BTC", "ETH", "SOL", "BNB", "DOGE", "XRP"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub historical_prices: Vec<f64>,
    #[serde(default)]
    pub historical_volumes: Vec<f64>,
}

/// Indicator values computed at decision time. Any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    #[serde(default)]
    pub macd: Option<f64>,
    #[serde(default)]
    pub macd_signal: Option<f64>,
    #[serde(default)]
    pub macd_histogram: Option<f64>,
    #[serde(default)]
    pub rsi: Option<f64>,
    #[serde(default)]
    pub ema_12: Option<f64>,
    #[serde(default)]
    pub ema_26: Option<f64>,
    #[serde(default)]
    pub ema_50: Option<f64>,
    #[serde(default)]
    pub bb_upper: Option<f64>,
    #[serde(default)]
    pub bb_middle: Option<f64>,
    #[serde(default)]
    pub bb_lower: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub trade_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub profit_target_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub invalidation_condition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub trade_type: Option<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub exit_plan: Option<ExitPlan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeldPosition {
    #[serde(default)]
    pub entry_price: f64,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub trade_type: String,
    #[serde(default)]
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolDecision {
    pub symbol: String,
    #[serde(default)]
    pub market_data: MarketData,
    #[serde(default)]
    pub technical_indicators: Option<TechnicalIndicators>,
    #[serde(default)]
    pub technical_signal: Option<Signal>,
    #[serde(default)]
    pub ai_analysis: Option<AiAnalysis>,
    #[serde(default)]
    pub current_position: Option<HeldPosition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub trade_type: String,
    #[serde(default)]
    pub executed: Option<bool>,
    #[serde(default)]
    pub execution_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioDecision {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub trades_to_execute: Vec<TradeIntent>,
    #[serde(default)]
    pub trades_executed: Vec<TradeIntent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    #[serde(default)]
    pub total_value: f64,
    #[serde(default)]
    pub available_cash: Option<f64>,
    #[serde(default)]
    pub positions_count: Option<u32>,
    #[serde(default)]
    pub total_pnl: f64,
}

/// One decision cycle. Identity is `check_number`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub check_number: u64,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub symbol_decisions: Vec<SymbolDecision>,
    #[serde(default)]
    pub portfolio_decision: PortfolioDecision,
    #[serde(default)]
    pub portfolio_state: PortfolioState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub trade_type: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub notional: f64,
    #[serde(default)]
    pub pnl: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub entry_price: f64,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub trade_type: String,
    #[serde(default)]
    pub unrealized_pnl: f64,
    #[serde(default)]
    pub notional: f64,
}

/// Portfolio value series for one instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub points: Vec<(String, f64)>,
}

impl ChartSeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn series_name(&self) -> &str {
        self.headers.get(1).map(String::as_str).unwrap_or("Portfolio Value")
    }
}

// =============================================================================
// Decoders
// =============================================================================

pub fn decode_summary(raw: &str) -> Result<DashboardSummary, FeedError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn decode_leaderboard(raw: &str) -> Result<Vec<Instance>, FeedError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn decode_market_prices(raw: &str) -> Result<MarketPrices, FeedError> {
    Ok(serde_json::from_str(raw)?)
}

#[derive(Debug, Deserialize)]
struct DecisionsBody {
    #[serde(default)]
    decisions: Vec<Decision>,
}

/// Newest-first, as served.
pub fn decode_decisions(raw: &str) -> Result<Vec<Decision>, FeedError> {
    let body: DecisionsBody = serde_json::from_str(raw)?;
    Ok(body.decisions)
}

#[derive(Debug, Deserialize)]
struct TradesBody {
    #[serde(default)]
    trades: Vec<Trade>,
}

/// A body without a `trades` array (the service may answer with a markdown
/// document under `data`) is an empty list, not a failure.
pub fn decode_trades(raw: &str) -> Result<Vec<Trade>, FeedError> {
    let body: TradesBody = serde_json::from_str(raw)?;
    Ok(body.trades)
}

#[derive(Debug, Deserialize)]
struct PositionsBody {
    #[serde(default)]
    positions: Vec<Position>,
}

pub fn decode_positions(raw: &str) -> Result<Vec<Position>, FeedError> {
    let body: PositionsBody = serde_json::from_str(raw)?;
    Ok(body.positions)
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Tabular form `[["Time", model], [ts, value], ...]`, either inline or as a
/// JSON-encoded string.
pub fn decode_chart(raw: &str) -> Result<ChartSeries, FeedError> {
    let body: ChartBody = serde_json::from_str(raw)?;
    let table = match body.data {
        Value::String(encoded) => serde_json::from_str::<Value>(&encoded)?,
        other => other,
    };
    let rows = match table {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => {
            return Err(FeedError::Decode(format!(
                "chart data is not a table: {}",
                other
            )))
        }
    };

    let mut series = ChartSeries {
        title: body.title,
        ..Default::default()
    };
    if rows.len() < 2 {
        return Ok(series);
    }

    series.headers = rows[0]
        .as_array()
        .map(|cells| cells.iter().map(cell_label).collect())
        .unwrap_or_default();

    for row in &rows[1..] {
        let cells = row
            .as_array()
            .ok_or_else(|| FeedError::Decode("chart row is not an array".to_string()))?;
        let label = cells.first().map(cell_label).unwrap_or_default();
        let value = cells
            .get(1)
            .and_then(cell_number)
            .ok_or_else(|| FeedError::Decode(format!("chart row {} has no numeric value", label)))?;
        series.points.push((label, value));
    }
    Ok(series)
}

fn cell_label(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell_number(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
