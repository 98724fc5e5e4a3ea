//! Feeds: one repeatedly-polled data source each.
//!
//! A [`FeedTask`] pairs an endpoint with a period and a decoder. The
//! [`scheduler::Scheduler`] runs tasks on fixed-period timers, the
//! [`sequencer::ResponseSequencer`] stamps every dispatch, and each
//! completion travels back to the poller as a [`Completion`].

use std::fmt;
use std::time::Duration;

use tokio::time::timeout;

use crate::api::types::{
    decode_chart, decode_decisions, decode_leaderboard, decode_market_prices, decode_positions,
    decode_summary, decode_trades, ChartSeries, DashboardSummary, Decision, Instance,
    MarketPrices, Position, Trade,
};
use crate::api::{encode_segment, Endpoint, Method, Transport};
use crate::config::Config;
use crate::error::FeedError;

pub mod monitor;
pub mod scheduler;
pub mod sequencer;

use sequencer::RequestEnvelope;

/// Feed identity: endpoint family plus path parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedKey {
    Health,
    Dashboard,
    Leaderboard,
    MarketPrices,
    Decisions(String),
    Trades(String),
    Positions(String),
    Chart(String),
}

impl FeedKey {
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            FeedKey::Decisions(id)
            | FeedKey::Trades(id)
            | FeedKey::Positions(id)
            | FeedKey::Chart(id) => Some(id),
            _ => None,
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            FeedKey::Health => "health",
            FeedKey::Dashboard => "dashboard",
            FeedKey::Leaderboard => "leaderboard",
            FeedKey::MarketPrices => "market_prices",
            FeedKey::Decisions(_) => "decisions",
            FeedKey::Trades(_) => "trades",
            FeedKey::Positions(_) => "positions",
            FeedKey::Chart(_) => "chart",
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance_id() {
            Some(id) => write!(f, "{}:{}", self.family(), id),
            None => f.write_str(self.family()),
        }
    }
}

/// Decoded body of one successful tick.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPayload {
    Health,
    Summary(DashboardSummary),
    Leaderboard(Vec<Instance>),
    MarketPrices(MarketPrices),
    Decisions(Vec<Decision>),
    Trades(Vec<Trade>),
    Positions(Vec<Position>),
    Chart(ChartSeries),
}

pub type Decoder = fn(&str) -> Result<FeedPayload, FeedError>;

/// Result of one dispatched request, stamped with its envelope.
#[derive(Debug, Clone)]
pub struct Completion {
    pub envelope: RequestEnvelope,
    pub outcome: Result<FeedPayload, FeedError>,
}

#[derive(Debug, Clone)]
pub struct FeedTask {
    pub id: FeedKey,
    pub endpoint: Endpoint,
    pub period: Duration,
    /// Only the health probe carries a deadline; data feeds rely on the next
    /// tick superseding a hung request.
    pub deadline: Option<Duration>,
    decode: Decoder,
}

impl FeedTask {
    /// Resolve the endpoint template and period for `key`.
    pub fn for_key(key: FeedKey, cfg: &Config) -> Self {
        let instance_period = Config::period(cfg.instance_poll_ms);
        let (endpoint, period, decode, deadline): (Endpoint, Duration, Decoder, Option<Duration>) =
            match &key {
                FeedKey::Health => (
                    Endpoint::head("/dashboard"),
                    Config::period(cfg.health_poll_ms),
                    health_payload as Decoder,
                    Some(cfg.probe_timeout()),
                ),
                FeedKey::Dashboard => (
                    Endpoint::get("/dashboard"),
                    Config::period(cfg.dashboard_poll_ms),
                    summary_payload as Decoder,
                    None,
                ),
                FeedKey::Leaderboard => (
                    Endpoint::get("/leaderboard"),
                    Config::period(cfg.leaderboard_poll_ms),
                    leaderboard_payload as Decoder,
                    None,
                ),
                FeedKey::MarketPrices => (
                    Endpoint::get("/market-prices"),
                    Config::period(cfg.market_poll_ms),
                    market_payload as Decoder,
                    None,
                ),
                FeedKey::Decisions(id) => (
                    Endpoint::get(format!(
                        "/instance/{}/decisions?limit={}",
                        encode_segment(id),
                        cfg.decisions_limit
                    )),
                    instance_period,
                    decisions_payload as Decoder,
                    None,
                ),
                FeedKey::Trades(id) => (
                    Endpoint::get(format!("/instance/{}/trades", encode_segment(id))),
                    instance_period,
                    trades_payload as Decoder,
                    None,
                ),
                FeedKey::Positions(id) => (
                    Endpoint::get(format!("/instance/{}/positions", encode_segment(id))),
                    instance_period,
                    positions_payload as Decoder,
                    None,
                ),
                FeedKey::Chart(id) => (
                    Endpoint::get(format!("/instance/{}/chart", encode_segment(id))),
                    instance_period,
                    chart_payload as Decoder,
                    None,
                ),
            };
        Self {
            id: key,
            endpoint,
            period,
            deadline,
            decode,
        }
    }

    pub fn decode(&self, raw: &str) -> Result<FeedPayload, FeedError> {
        (self.decode)(raw)
    }

    /// One network call, no retries.
    pub async fn execute(&self, transport: &dyn Transport) -> Result<FeedPayload, FeedError> {
        let call = async {
            match self.endpoint.method {
                Method::Head => {
                    transport.head(&self.endpoint.path).await?;
                    self.decode("")
                }
                Method::Get => {
                    let raw = transport.get(&self.endpoint.path).await?;
                    self.decode(&raw)
                }
            }
        };
        match self.deadline {
            Some(limit) => timeout(limit, call).await.unwrap_or_else(|_| {
                Err(FeedError::Network(format!(
                    "no response within {}ms",
                    limit.as_millis()
                )))
            }),
            None => call.await,
        }
    }
}

fn health_payload(_: &str) -> Result<FeedPayload, FeedError> {
    Ok(FeedPayload::Health)
}

fn summary_payload(raw: &str) -> Result<FeedPayload, FeedError> {
    decode_summary(raw).map(FeedPayload::Summary)
}

fn leaderboard_payload(raw: &str) -> Result<FeedPayload, FeedError> {
    decode_leaderboard(raw).map(FeedPayload::Leaderboard)
}

fn market_payload(raw: &str) -> Result<FeedPayload, FeedError> {
    decode_market_prices(raw).map(FeedPayload::MarketPrices)
}

fn decisions_payload(raw: &str) -> Result<FeedPayload, FeedError> {
    decode_decisions(raw).map(FeedPayload::Decisions)
}

fn trades_payload(raw: &str) -> Result<FeedPayload, FeedError> {
    decode_trades(raw).map(FeedPayload::Trades)
}

fn positions_payload(raw: &str) -> Result<FeedPayload, FeedError> {
    decode_positions(raw).map(FeedPayload::Positions)
}

fn chart_payload(raw: &str) -> Result<FeedPayload, FeedError> {
    decode_chart(raw).map(FeedPayload::Chart)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_resolve_path_parameters() {
        let cfg = Config::default();
        let task = FeedTask::for_key(FeedKey::Decisions("inst-1".to_string()), &cfg);
        assert_eq!(task.endpoint, Endpoint::get("/instance/inst-1/decisions?limit=50"));
        assert_eq!(task.period, Duration::from_secs(10));

        let probe = FeedTask::for_key(FeedKey::Health, &cfg);
        assert_eq!(probe.endpoint.method, Method::Head);
        assert_eq!(probe.deadline, Some(Duration::from_secs(3)));
        assert_eq!(probe.period, Duration::from_secs(5));
    }

    #[test]
    fn test_instance_id_is_escaped() {
        let task = FeedTask::for_key(FeedKey::Trades("a b/c".to_string()), &Config::default());
        assert_eq!(task.endpoint.path, "/instance/a%20b%2Fc/trades");
    }

    #[test]
    fn test_display_names_feed_and_instance() {
        assert_eq!(FeedKey::Chart("x".to_string()).to_string(), "chart:x");
        assert_eq!(FeedKey::MarketPrices.to_string(), "market_prices");
    }

    #[test]
    fn test_decoder_matches_family() {
        let task = FeedTask::for_key(FeedKey::Leaderboard, &Config::default());
        assert_eq!(task.decode("[]").unwrap(), FeedPayload::Leaderboard(vec![]));
        assert!(task.decode("{}").is_err());
    }
}
