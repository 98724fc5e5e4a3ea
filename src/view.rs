//! Text projection of a snapshot, plus console command parsing.
//!
//! Projection is a pure function of its inputs; the binary decides when to
//! redraw.

use crate::api::types::{Decision, SymbolDecision, TICKER_SYMBOLS};
use crate::chart::option::{RSI_OVERBOUGHT, RSI_OVERSOLD};
use crate::feed::monitor::Connectivity;
use crate::feed::FeedKey;
use crate::poller::Command;
use crate::store::selection::DetailTab;
use crate::store::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Poller(Command),
    Resize(usize),
    Quit,
}

pub fn parse_console_input(line: &str) -> Result<ConsoleInput, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or_else(|| "empty command".to_string())?;
    let arg = parts.next();
    let need = |what: &str| arg.ok_or_else(|| format!("{} needs {}", verb, what));
    match verb {
        "select" => Ok(ConsoleInput::Poller(Command::SelectInstance(
            need("an instance id")?.to_string(),
        ))),
        "decision" => need("a check number")?
            .trim_start_matches('#')
            .parse()
            .map(|n| ConsoleInput::Poller(Command::SelectDecision(n)))
            .map_err(|e| format!("bad check number: {}", e)),
        "symbol" => Ok(ConsoleInput::Poller(Command::SelectSymbol(
            need("a symbol")?.to_string(),
        ))),
        "tab" => need("a tab name")?
            .parse::<DetailTab>()
            .map(|t| ConsoleInput::Poller(Command::SelectTab(t))),
        "resize" => need("a width")?
            .parse()
            .map(ConsoleInput::Resize)
            .map_err(|e| format!("bad width: {}", e)),
        "quit" | "exit" | "q" => Ok(ConsoleInput::Quit),
        other => Err(format!("unknown command: {}", other)),
    }
}

/// `$1,234.56`, `-$12.00`
pub fn format_currency(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// `+1.23%`, `-0.50%`
pub fn format_percent(value: f64) -> String {
    format!("{}{:.2}%", if value >= 0.0 { "+" } else { "" }, value)
}

pub fn format_price(value: f64) -> String {
    if value >= 1.0 {
        format_currency(value)
    } else {
        format!("${:.4}", value)
    }
}

/// Render the whole dashboard. `charts` carries the lines drawn by each
/// mounted chart surface, in display order.
pub fn project(snap: &Snapshot, charts: &[&[String]]) -> Vec<String> {
    let mut out = Vec::new();
    header(snap, &mut out);
    if snap.initial_load_failed {
        out.push("!! Unable to load dashboard data. Is the trading service running?".to_string());
    }
    summary(snap, &mut out);
    ticker(snap, &mut out);
    leaderboard(snap, &mut out);
    detail(snap, charts, &mut out);
    out
}

fn header(snap: &Snapshot, out: &mut Vec<String>) {
    let status = match snap.connectivity {
        Connectivity::Connecting => "connecting...",
        Connectivity::Connected => "connected",
        Connectivity::Disconnected => "disconnected",
    };
    let checked = snap
        .last_check
        .map(|t| format!("  last check {}", t.format("%H:%M:%S")))
        .unwrap_or_default();
    out.push(format!("AI TRADING ARENA  [{}]{}", status, checked));
}

fn stale_note(snap: &Snapshot, key: &FeedKey) -> String {
    match snap.feed_health(key) {
        Some(h) if h.is_failing() => format!(
            "  (not updating: {})",
            h.last_error.as_deref().unwrap_or("error")
        ),
        Some(h) if h.is_lagging() => format!(
            "  (not updating: {} responses overtaken by newer requests)",
            h.stale_drops
        ),
        _ => String::new(),
    }
}

fn summary(snap: &Snapshot, out: &mut Vec<String>) {
    let Some(s) = &snap.summary else {
        return;
    };
    out.push(format!(
        "TOTAL {}  PNL {} ({})  instances {}  positions {}  trades {}{}",
        format_currency(s.total_value),
        format_currency(s.total_pnl),
        format_percent(s.total_pnl_pct),
        s.total_instances,
        s.active_positions,
        s.total_trades,
        stale_note(snap, &FeedKey::Dashboard)
    ));
}

fn ticker(snap: &Snapshot, out: &mut Vec<String>) {
    let Some(market) = &snap.market else {
        let note = stale_note(snap, &FeedKey::MarketPrices);
        if !note.is_empty() {
            out.push(format!("MARKET{}", note));
        }
        return;
    };
    let cells: Vec<String> = TICKER_SYMBOLS
        .iter()
        .filter_map(|sym| market.prices.get(*sym))
        .map(|p| format!("{} {} {}", p.symbol, format_price(p.price), format_percent(p.change_pct)))
        .collect();
    out.push(format!(
        "{}{}",
        cells.join(" | "),
        stale_note(snap, &FeedKey::MarketPrices)
    ));
}

fn leaderboard(snap: &Snapshot, out: &mut Vec<String>) {
    out.push(format!("LEADERBOARD{}", stale_note(snap, &FeedKey::Leaderboard)));
    if snap.instances.is_empty() {
        out.push("  no trading instances".to_string());
        return;
    }
    let selected = snap.selection.instance_id.as_deref();
    for inst in &snap.instances {
        let marker = if Some(inst.instance_id.as_str()) == selected { ">" } else { " " };
        out.push(format!(
            "{} #{:<2} {:<20} {:>14} {:>12} {:>8}  sharpe {:.2}  win {:.1}%  dd {:.2}%",
            marker,
            inst.rank,
            inst.short_model(),
            format_currency(inst.current_value),
            format_currency(inst.pnl),
            format_percent(inst.pnl_pct),
            inst.sharpe_ratio,
            inst.win_rate,
            inst.max_drawdown
        ));
    }
}

fn detail(snap: &Snapshot, charts: &[&[String]], out: &mut Vec<String>) {
    let Some(inst) = snap.selected_instance() else {
        return;
    };
    let id = inst.instance_id.clone();
    let tabs: Vec<String> = DetailTab::ALL
        .iter()
        .map(|t| {
            if *t == snap.selection.tab {
                format!("[{}]", t)
            } else {
                t.to_string()
            }
        })
        .collect();
    out.push(format!("INSTANCE {} ({})  {}", id, inst.model, tabs.join(" ")));
    if let Some(sym) = &snap.selection.symbol {
        out.push(format!("  symbol {}", sym));
    }

    match snap.selection.tab {
        DetailTab::ModelChat | DetailTab::Decisions => {
            out.push(format!("DECISIONS{}", stale_note(snap, &FeedKey::Decisions(id))));
            if snap.detail.decisions.is_empty() {
                out.push("  no decisions yet".to_string());
            }
            for d in &snap.detail.decisions {
                decision(snap, d, out);
            }
        }
        DetailTab::Chart => {
            out.push(format!("CHART{}", stale_note(snap, &FeedKey::Chart(id))));
            match charts.first() {
                Some(lines) => out.extend(lines.iter().map(|l| format!("  {}", l))),
                None => out.push("  no chart data".to_string()),
            }
        }
        DetailTab::Analysis => {
            out.push(format!("ANALYSIS{}", stale_note(snap, &FeedKey::Decisions(id))));
            analysis(snap, charts, out);
        }
        DetailTab::Positions => {
            out.push(format!("POSITIONS{}", stale_note(snap, &FeedKey::Positions(id))));
            if snap.detail.positions.is_empty() {
                out.push("  no open positions".to_string());
            }
            for p in &snap.detail.positions {
                out.push(format!(
                    "  {:<10} {:<5} qty {:.4}  entry {}  now {}  pnl {}",
                    p.symbol,
                    p.trade_type,
                    p.quantity,
                    format_currency(p.entry_price),
                    format_currency(p.current_price),
                    format_currency(p.unrealized_pnl)
                ));
            }
        }
        DetailTab::Trades => {
            out.push(format!("TRADES{}", stale_note(snap, &FeedKey::Trades(id))));
            if snap.detail.trades.is_empty() {
                out.push("  no trades yet".to_string());
            }
            for t in &snap.detail.trades {
                out.push(format!(
                    "  {} {:<10} {:<5} {:<5} {} x {:.4}  pnl {}",
                    t.timestamp,
                    t.symbol,
                    t.action,
                    t.trade_type,
                    format_currency(t.price),
                    t.quantity,
                    t.pnl.map(format_currency).unwrap_or_else(|| "-".to_string())
                ));
            }
        }
    }
}

fn analysis(snap: &Snapshot, charts: &[&[String]], out: &mut Vec<String>) {
    let picked = snap.selected_decision().and_then(|d| {
        let symbol = snap.selection.symbol.as_deref()?;
        let sd = d.symbol_decisions.iter().find(|sd| sd.symbol == symbol)?;
        Some((d, sd))
    });
    let Some((d, sd)) = picked else {
        out.push("  select a decision and symbol to analyse".to_string());
        return;
    };
    out.push(format!("  check #{}  {}  {}", d.check_number, d.timestamp, sd.symbol));
    out.push(format!("  {}", indicator_summary(sd)));
    for lines in charts {
        out.extend(lines.iter().map(|l| format!("  {}", l)));
    }
}

fn indicator_summary(sd: &SymbolDecision) -> String {
    let mut cells = vec![format!("price {}", format_price(sd.market_data.price))];
    if let Some(volume) = sd.market_data.volume {
        cells.push(format!("volume {:.2}", volume));
    }
    let ind = sd.technical_indicators.clone().unwrap_or_default();
    if let Some(rsi) = ind.rsi {
        let zone = if rsi >= RSI_OVERBOUGHT {
            " overbought"
        } else if rsi <= RSI_OVERSOLD {
            " oversold"
        } else {
            ""
        };
        cells.push(format!("rsi {:.2}{}", rsi, zone));
    }
    if let Some(macd) = ind.macd {
        cells.push(format!("macd {:.4}", macd));
    }
    cells.join("  ")
}

fn decision(snap: &Snapshot, d: &Decision, out: &mut Vec<String>) {
    let focused = snap.selection.decision == Some(d.check_number);
    let expanded = snap.selection.is_expanded(d.check_number);
    out.push(format!(
        "{} {} #{}  {}  value {}  pnl {}",
        if focused { ">" } else { " " },
        if expanded { "-" } else { "+" },
        d.check_number,
        d.timestamp,
        format_currency(d.portfolio_state.total_value),
        format_currency(d.portfolio_state.total_pnl)
    ));
    if !expanded {
        return;
    }
    if !d.portfolio_decision.reasoning.is_empty() {
        out.push(format!("      {}", d.portfolio_decision.reasoning));
    }
    for sd in &d.symbol_decisions {
        let ai = sd
            .ai_analysis
            .as_ref()
            .map(|a| format!("{} ({:.0}%)", a.action, a.confidence))
            .unwrap_or_else(|| "-".to_string());
        let marker = if snap.selection.symbol.as_deref() == Some(sd.symbol.as_str()) {
            "*"
        } else {
            " "
        };
        out.push(format!(
            "     {}{:<10} {}  ai {}",
            marker,
            sd.symbol,
            format_price(sd.market_data.price),
            ai
        ));
    }
    for t in &d.portfolio_decision.trades_executed {
        out.push(format!(
            "      executed {} {} {}{}",
            t.action,
            t.trade_type,
            t.symbol,
            t.execution_price
                .map(|p| format!(" @ {}", format_currency(p)))
                .unwrap_or_default()
        ));
    }
}
