use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::api::types::{ChartSeries, SymbolDecision, TechnicalIndicators};

pub const PORTFOLIO_TITLE: &str = "TOTAL ACCOUNT VALUE";

/// Line-chart option for a portfolio series. `None` when there is nothing to
/// draw, in which case the surface keeps its previous option.
pub fn portfolio_option(series: &ChartSeries) -> Option<Value> {
    if series.is_empty() {
        return None;
    }
    let labels: Vec<&str> = series.points.iter().map(|(t, _)| t.as_str()).collect();
    let values: Vec<f64> = series.points.iter().map(|(_, v)| *v).collect();
    Some(json!({
        "title": { "text": PORTFOLIO_TITLE, "left": "center" },
        "tooltip": { "trigger": "axis" },
        "xAxis": { "type": "category", "data": labels },
        "yAxis": { "type": "value" },
        "series": [{
            "name": series.series_name(),
            "type": "line",
            "smooth": true,
            "data": values,
        }],
    }))
}

/// RSI levels marked on the RSI chart.
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const RSI_OVERSOLD: f64 = 30.0;

/// Price history with Bollinger bands and EMAs drawn flat across it. With no
/// history the current price is the only point.
pub fn price_option(sd: &SymbolDecision) -> Value {
    let prices = if sd.market_data.historical_prices.is_empty() {
        vec![sd.market_data.price]
    } else {
        sd.market_data.historical_prices.clone()
    };
    let n = prices.len();
    let labels: Vec<String> = (0..n).map(|i| format!("T{}", i)).collect();
    let ind = sd.technical_indicators.clone().unwrap_or_default();
    let flat = move |name: &str, value: f64| {
        json!({
            "name": name,
            "type": "line",
            "symbol": "none",
            "data": vec![value; n],
        })
    };

    let mut series = vec![json!({
        "name": "Price",
        "type": "line",
        "smooth": true,
        "data": prices,
    })];
    if let (Some(upper), Some(middle), Some(lower)) = (ind.bb_upper, ind.bb_middle, ind.bb_lower) {
        series.push(flat("BB Upper", upper));
        series.push(flat("BB Middle", middle));
        series.push(flat("BB Lower", lower));
    }
    for (name, value) in [("EMA 12", ind.ema_12), ("EMA 26", ind.ema_26), ("EMA 50", ind.ema_50)] {
        if let Some(v) = value {
            series.push(flat(name, v));
        }
    }
    json!({
        "title": { "text": format!("{} - Price & Bollinger Bands", sd.symbol), "left": "center" },
        "tooltip": { "trigger": "axis" },
        "xAxis": { "type": "category", "data": labels },
        "yAxis": { "type": "value" },
        "series": series,
    })
}

/// MACD line, signal and histogram as three bars. `None` unless all three
/// are known.
pub fn macd_option(ind: &TechnicalIndicators) -> Option<Value> {
    let (macd, signal, histogram) = (ind.macd?, ind.macd_signal?, ind.macd_histogram?);
    Some(json!({
        "title": { "text": "MACD", "left": "center" },
        "tooltip": { "trigger": "axis" },
        "xAxis": { "type": "category", "data": ["MACD", "Signal", "Histogram"] },
        "yAxis": { "type": "value" },
        "series": [{ "name": "MACD", "type": "bar", "data": [macd, signal, histogram] }],
    }))
}

pub fn rsi_option(ind: &TechnicalIndicators) -> Option<Value> {
    let rsi = ind.rsi?;
    Some(json!({
        "title": { "text": format!("RSI: {:.2}", rsi), "left": "center" },
        "tooltip": { "trigger": "axis" },
        "xAxis": { "type": "category", "data": ["RSI"] },
        "yAxis": { "type": "value", "min": 0, "max": 100 },
        "series": [{
            "name": "RSI",
            "type": "bar",
            "data": [rsi],
            "markLine": { "data": [
                { "yAxis": RSI_OVERBOUGHT, "name": "Overbought" },
                { "yAxis": RSI_OVERSOLD, "name": "Oversold" },
            ] },
        }],
    }))
}

/// Content hash of an option. serde_json maps are ordered, so equal options
/// always serialize identically.
pub fn option_hash(option: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(option.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
