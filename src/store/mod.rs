//! View state: entity collections plus the selection cursor.
//!
//! The store is owned by exactly one task (the poller); every public mutation
//! ends in [`ViewStateStore::commit`], which repairs the selection and checks
//! that no reference dangles. Repair always narrows to "first available", so
//! applying feeds in any order converges on the same selection.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::api::types::{
    ChartSeries, DashboardSummary, Decision, Instance, MarketPrices, Position, Trade,
};
use crate::error::FeedError;
use crate::feed::monitor::{ConnectionMonitor, Connectivity};
use crate::feed::FeedKey;
use crate::logging::{log, log_selection_change, obj, v_str, Domain, Level};
use crate::verify::invariants::{
    assert_decision_order, assert_selection_invariants, InvariantViolation,
};

pub mod selection;

use selection::{DetailTab, SelectionState};

/// Per-feed freshness: "last known data, not updating" when failing or when
/// every recent response was overtaken by a newer request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedHealth {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Superseded responses since the last applied one.
    pub stale_drops: u64,
}

impl FeedHealth {
    pub fn is_failing(&self) -> bool {
        self.consecutive_failures > 0
    }

    pub fn is_lagging(&self) -> bool {
        self.stale_drops > 0
    }
}

/// Collections scoped to the selected instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstanceDetail {
    pub decisions: Vec<Decision>,
    pub trades: Vec<Trade>,
    pub positions: Vec<Position>,
    pub chart: Option<ChartSeries>,
}

/// Immutable copy of the store handed to presentation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub revision: u64,
    pub summary: Option<DashboardSummary>,
    pub instances: Vec<Instance>,
    pub market: Option<MarketPrices>,
    pub detail: InstanceDetail,
    pub selection: SelectionState,
    pub connectivity: Connectivity,
    pub last_check: Option<DateTime<Utc>>,
    pub feeds: BTreeMap<String, FeedHealth>,
    pub initial_load_failed: bool,
}

impl Snapshot {
    pub fn selected_instance(&self) -> Option<&Instance> {
        let id = self.selection.instance_id.as_deref()?;
        self.instances.iter().find(|i| i.instance_id == id)
    }

    pub fn selected_decision(&self) -> Option<&Decision> {
        let n = self.selection.decision?;
        self.detail.decisions.iter().find(|d| d.check_number == n)
    }

    pub fn feed_health(&self, key: &FeedKey) -> Option<&FeedHealth> {
        self.feeds.get(&key.to_string())
    }
}

#[derive(Debug, Default)]
pub struct ViewStateStore {
    summary: Option<DashboardSummary>,
    instances: Vec<Instance>,
    market: Option<MarketPrices>,
    detail: InstanceDetail,
    selection: SelectionState,
    /// Instance to prefer on the first non-empty leaderboard.
    preferred_instance: Option<String>,
    decisions_seeded: bool,
    health: BTreeMap<FeedKey, FeedHealth>,
    revision: u64,
}

impl ViewStateStore {
    /// An empty store. The initial selection can only name entities that do
    /// not exist yet, so its instance becomes a preference honoured on the
    /// first leaderboard that contains it.
    pub fn init(initial: SelectionState) -> Self {
        Self {
            preferred_instance: initial.instance_id,
            selection: SelectionState {
                tab: initial.tab,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn teardown(&mut self) {
        let tab = self.selection.tab;
        let revision = self.revision + 1;
        *self = Self::init(SelectionState {
            tab,
            ..Default::default()
        });
        self.revision = revision;
    }

    // =========================================================================
    // Feed application
    // =========================================================================

    pub fn apply_summary(&mut self, summary: DashboardSummary) {
        self.summary = Some(summary);
        self.commit("summary");
    }

    pub fn apply_market_prices(&mut self, prices: MarketPrices) {
        self.market = Some(prices);
        self.commit("market_prices");
    }

    /// Replace the leaderboard wholesale; a vanished selection degrades to
    /// rank 1, or clears on an empty board.
    pub fn apply_instances(&mut self, list: Vec<Instance>) {
        self.instances = list;
        self.commit("leaderboard");
    }

    /// Decisions for any instance but the selected one are not tracked.
    pub fn apply_decisions(&mut self, instance_id: &str, list: Vec<Decision>) -> bool {
        if !self.tracks(instance_id) {
            return false;
        }
        if let Err(v) = assert_decision_order(&list) {
            log(
                Level::Warn,
                Domain::Store,
                "decision_order",
                obj(&[("instance_id", v_str(instance_id)), ("msg", v_str(&v.msg))]),
            );
        }
        if !self.decisions_seeded {
            if let Some(latest) = list.first() {
                self.selection.expanded = BTreeSet::from([latest.check_number]);
                self.decisions_seeded = true;
            }
        }
        self.detail.decisions = list;
        self.commit("decisions");
        true
    }

    pub fn apply_trades(&mut self, instance_id: &str, list: Vec<Trade>) -> bool {
        if !self.tracks(instance_id) {
            return false;
        }
        self.detail.trades = list;
        self.commit("trades");
        true
    }

    pub fn apply_positions(&mut self, instance_id: &str, list: Vec<Position>) -> bool {
        if !self.tracks(instance_id) {
            return false;
        }
        self.detail.positions = list;
        self.commit("positions");
        true
    }

    pub fn apply_chart(&mut self, instance_id: &str, series: ChartSeries) -> bool {
        if !self.tracks(instance_id) {
            return false;
        }
        self.detail.chart = Some(series);
        self.commit("chart");
        true
    }

    pub fn record_feed_success(&mut self, feed: &FeedKey, at: DateTime<Utc>) {
        let health = self.health.entry(feed.clone()).or_default();
        health.last_success_at = Some(at);
        health.last_error = None;
        health.consecutive_failures = 0;
        health.stale_drops = 0;
        self.revision += 1;
    }

    /// A response arrived after a newer request for the same feed was issued.
    pub fn record_stale_drop(&mut self, feed: &FeedKey) -> u64 {
        let health = self.health.entry(feed.clone()).or_default();
        health.stale_drops = health.stale_drops.saturating_add(1);
        let drops = health.stale_drops;
        self.revision += 1;
        drops
    }

    /// Data stays as it was. Returns the failure streak length.
    pub fn record_feed_error(&mut self, feed: &FeedKey, err: &FeedError) -> u32 {
        let health = self.health.entry(feed.clone()).or_default();
        health.last_error = Some(err.to_string());
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        let streak = health.consecutive_failures;
        self.revision += 1;
        streak
    }

    pub fn forget_feed(&mut self, feed: &FeedKey) {
        if self.health.remove(feed).is_some() {
            self.revision += 1;
        }
    }

    // =========================================================================
    // User selection
    // =========================================================================

    /// Unknown ids are ignored; the selection never points at nothing.
    pub fn select_instance(&mut self, id: &str) -> bool {
        if !self.has_instance(id) {
            self.reject_selection("instance", id);
            return false;
        }
        if self.selection.instance_id.as_deref() != Some(id) {
            let from = self.selection.instance_id.clone();
            log_selection_change("instance", from.as_deref(), Some(id), "user");
            self.switch_instance(Some(id.to_string()));
            self.commit("select_instance");
        }
        true
    }

    /// Focus a decision and toggle its expansion; other expanded decisions
    /// stay expanded.
    pub fn select_decision(&mut self, check_number: u64) -> bool {
        if !self.has_decision(check_number) {
            self.reject_selection("decision", &check_number.to_string());
            return false;
        }
        self.selection.decision = Some(check_number);
        if !self.selection.expanded.remove(&check_number) {
            self.selection.expanded.insert(check_number);
        }
        self.commit("select_decision");
        true
    }

    pub fn select_symbol(&mut self, symbol: &str) -> bool {
        if !self.symbol_candidates().iter().any(|s| s == symbol) {
            self.reject_selection("symbol", symbol);
            return false;
        }
        self.selection.symbol = Some(symbol.to_string());
        self.commit("select_symbol");
        true
    }

    pub fn select_tab(&mut self, tab: DetailTab) {
        self.selection.tab = tab;
        self.commit("select_tab");
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn detail(&self) -> &InstanceDetail {
        &self.detail
    }

    pub fn health(&self, feed: &FeedKey) -> Option<&FeedHealth> {
        self.health.get(feed)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when neither summary nor leaderboard ever loaded and at least one
    /// of them has failed.
    pub fn initial_load_failed(&self) -> bool {
        let core = [FeedKey::Dashboard, FeedKey::Leaderboard];
        let never_loaded = core.iter().all(|k| {
            self.health
                .get(k)
                .map(|h| h.last_success_at.is_none())
                .unwrap_or(true)
        });
        let any_failed = core
            .iter()
            .any(|k| self.health.get(k).map(FeedHealth::is_failing).unwrap_or(false));
        never_loaded && any_failed
    }

    /// Symbols of the selected decision, else the selected instance's.
    pub fn symbol_candidates(&self) -> Vec<String> {
        if let Some(n) = self.selection.decision {
            if let Some(d) = self.detail.decisions.iter().find(|d| d.check_number == n) {
                return d.symbol_decisions.iter().map(|s| s.symbol.clone()).collect();
            }
        }
        self.selection
            .instance_id
            .as_deref()
            .and_then(|id| self.instances.iter().find(|i| i.instance_id == id))
            .map(|i| i.symbols.clone())
            .unwrap_or_default()
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        assert_selection_invariants(
            &self.selection,
            &self.instances,
            &self.detail.decisions,
            &self.symbol_candidates(),
        )
    }

    pub fn snapshot(&self, monitor: &ConnectionMonitor) -> Snapshot {
        Snapshot {
            revision: self.revision,
            summary: self.summary.clone(),
            instances: self.instances.clone(),
            market: self.market.clone(),
            detail: self.detail.clone(),
            selection: self.selection.clone(),
            connectivity: monitor.state(),
            last_check: monitor.last_check(),
            feeds: self
                .health
                .iter()
                .map(|(k, h)| (k.to_string(), h.clone()))
                .collect(),
            initial_load_failed: self.initial_load_failed(),
        }
    }

    // =========================================================================
    // Repair
    // =========================================================================

    fn tracks(&self, instance_id: &str) -> bool {
        self.selection.instance_id.as_deref() == Some(instance_id)
    }

    fn has_instance(&self, id: &str) -> bool {
        self.instances.iter().any(|i| i.instance_id == id)
    }

    fn has_decision(&self, check_number: u64) -> bool {
        self.detail
            .decisions
            .iter()
            .any(|d| d.check_number == check_number)
    }

    fn switch_instance(&mut self, next: Option<String>) {
        self.selection.instance_id = next;
        self.selection.clear_instance_scope();
        self.detail = InstanceDetail::default();
        self.decisions_seeded = false;
    }

    fn commit(&mut self, cause: &str) {
        self.revalidate(cause);
        self.revision += 1;
        if let Err(v) = self.check_invariants() {
            log(
                Level::Error,
                Domain::Store,
                "invariant_violation",
                obj(&[("cause", v_str(cause)), ("msg", v_str(&v.msg))]),
            );
        }
    }

    fn revalidate(&mut self, cause: &str) {
        // Instance axis.
        let current = self.selection.instance_id.clone();
        let mut next = current.clone().filter(|id| self.has_instance(id));
        if next.is_none() && !self.instances.is_empty() {
            next = self
                .preferred_instance
                .take()
                .filter(|id| self.has_instance(id))
                .or_else(|| self.instances.first().map(|i| i.instance_id.clone()));
        }
        if next != current {
            log_selection_change("instance", current.as_deref(), next.as_deref(), cause);
            self.switch_instance(next);
        }

        // Decision axis.
        let present: BTreeSet<u64> = self.detail.decisions.iter().map(|d| d.check_number).collect();
        self.selection.expanded.retain(|n| present.contains(n));
        if !self.selection.decision.map(|n| present.contains(&n)).unwrap_or(false) {
            let first = self.detail.decisions.first().map(|d| d.check_number);
            if first != self.selection.decision {
                let from = self.selection.decision.map(|n| n.to_string());
                let to = first.map(|n| n.to_string());
                log_selection_change("decision", from.as_deref(), to.as_deref(), cause);
            }
            self.selection.decision = first;
        }

        // Symbol axis.
        let candidates = self.symbol_candidates();
        let valid = self
            .selection
            .symbol
            .as_ref()
            .map(|s| candidates.contains(s))
            .unwrap_or(false);
        if !valid {
            self.selection.symbol = candidates.into_iter().next();
        }
    }

    fn reject_selection(&self, axis: &str, requested: &str) {
        log(
            Level::Debug,
            Domain::Store,
            "invalid_selection",
            obj(&[("axis", v_str(axis)), ("requested", json!(requested))]),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::SymbolDecision;

    fn inst(id: &str, symbols: &[&str]) -> Instance {
        Instance {
            instance_id: id.to_string(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn dec(n: u64, symbols: &[&str]) -> Decision {
        Decision {
            check_number: n,
            symbol_decisions: symbols
                .iter()
                .map(|s| SymbolDecision {
                    symbol: s.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn store_with(ids: &[&str]) -> ViewStateStore {
        let mut store = ViewStateStore::init(SelectionState::default());
        store.apply_instances(ids.iter().map(|id| inst(id, &["BTC-USD"])).collect());
        store
    }

    #[test]
    fn test_auto_selects_rank_one() {
        let store = store_with(&["x", "y"]);
        assert_eq!(store.selection().instance_id.as_deref(), Some("x"));
        assert!(store.check_invariants().is_ok());
    }

    #[test]
    fn test_preferred_instance_honoured_once_present() {
        let mut store = ViewStateStore::init(SelectionState {
            instance_id: Some("y".to_string()),
            tab: DetailTab::Chart,
            ..Default::default()
        });
        assert_eq!(store.selection().instance_id, None);
        assert_eq!(store.selection().tab, DetailTab::Chart);
        store.apply_instances(vec![inst("x", &[]), inst("y", &[])]);
        assert_eq!(store.selection().instance_id.as_deref(), Some("y"));
    }

    #[test]
    fn test_missing_preference_falls_back_to_first() {
        let mut store = ViewStateStore::init(SelectionState {
            instance_id: Some("nope".to_string()),
            ..Default::default()
        });
        store.apply_instances(vec![inst("x", &[])]);
        assert_eq!(store.selection().instance_id.as_deref(), Some("x"));
    }

    #[test]
    fn test_decisions_for_other_instance_ignored() {
        let mut store = store_with(&["x", "y"]);
        assert!(!store.apply_decisions("y", vec![dec(3, &[])]));
        assert!(store.detail().decisions.is_empty());
    }

    #[test]
    fn test_select_decision_toggles_expansion() {
        let mut store = store_with(&["x"]);
        store.apply_decisions("x", vec![dec(5, &[]), dec(4, &[])]);
        assert!(store.select_decision(4));
        assert_eq!(store.selection().decision, Some(4));
        assert_eq!(store.selection().expanded, BTreeSet::from([4, 5]));
        assert!(store.select_decision(5));
        assert_eq!(store.selection().expanded, BTreeSet::from([4]));
        assert!(!store.select_decision(99));
    }

    #[test]
    fn test_vanished_decision_falls_back_to_newest() {
        let mut store = store_with(&["x"]);
        store.apply_decisions("x", vec![dec(5, &[]), dec(4, &[])]);
        store.select_decision(4);
        store.apply_decisions("x", vec![dec(7, &[]), dec(6, &[])]);
        assert_eq!(store.selection().decision, Some(7));
        // 4 and 5 are gone; seeding is not repeated for the same instance.
        assert!(store.selection().expanded.is_empty());
    }

    #[test]
    fn test_symbol_follows_selected_decision() {
        let mut store = store_with(&["x"]);
        assert_eq!(store.selection().symbol.as_deref(), Some("BTC-USD"));
        store.apply_decisions("x", vec![dec(2, &["ETH-USD", "SOL-USD"])]);
        assert_eq!(store.selection().symbol.as_deref(), Some("ETH-USD"));
        assert!(store.select_symbol("SOL-USD"));
        assert!(!store.select_symbol("DOGE-USD"));
        store.apply_decisions("x", vec![dec(3, &["SOL-USD"]), dec(2, &["ETH-USD", "SOL-USD"])]);
        assert_eq!(store.selection().symbol.as_deref(), Some("SOL-USD"));
    }

    #[test]
    fn test_switching_instance_clears_scope_and_reseeds() {
        let mut store = store_with(&["x", "y"]);
        store.apply_decisions("x", vec![dec(5, &[])]);
        store.apply_trades("x", vec![Trade::default()]);
        assert!(store.select_instance("y"));
        assert!(store.detail().decisions.is_empty());
        assert!(store.detail().trades.is_empty());
        assert_eq!(store.selection().decision, None);
        store.apply_decisions("y", vec![dec(9, &[])]);
        assert_eq!(store.selection().expanded, BTreeSet::from([9]));
        assert!(!store.select_instance("zzz"));
        assert_eq!(store.selection().instance_id.as_deref(), Some("y"));
    }

    #[test]
    fn test_feed_error_keeps_data() {
        let mut store = store_with(&["x"]);
        let key = FeedKey::Trades("x".to_string());
        store.apply_trades("x", vec![Trade::default()]);
        store.record_feed_success(&key, Utc::now());
        let err = FeedError::Network("refused".to_string());
        assert_eq!(store.record_feed_error(&key, &err), 1);
        assert_eq!(store.record_feed_error(&key, &err), 2);
        assert_eq!(store.detail().trades.len(), 1);
        assert!(store.health(&key).unwrap().is_failing());
    }

    #[test]
    fn test_stale_drops_count_until_next_success() {
        let mut store = ViewStateStore::init(SelectionState::default());
        let key = FeedKey::MarketPrices;
        let before = store.revision();
        assert_eq!(store.record_stale_drop(&key), 1);
        assert_eq!(store.record_stale_drop(&key), 2);
        assert!(store.revision() > before);
        let health = store.health(&key).unwrap();
        assert!(health.is_lagging());
        assert!(!health.is_failing());

        store.record_feed_success(&key, Utc::now());
        assert_eq!(store.health(&key).unwrap().stale_drops, 0);
    }

    #[test]
    fn test_initial_load_failure_banner() {
        let mut store = ViewStateStore::init(SelectionState::default());
        assert!(!store.initial_load_failed());
        store.record_feed_error(&FeedKey::Leaderboard, &FeedError::Network("down".to_string()));
        assert!(store.initial_load_failed());
        store.record_feed_success(&FeedKey::Dashboard, Utc::now());
        assert!(!store.initial_load_failed());
    }

    #[test]
    fn test_teardown_clears_everything() {
        let mut store = store_with(&["x"]);
        store.apply_decisions("x", vec![dec(1, &[])]);
        let before = store.revision();
        store.teardown();
        assert!(store.instances().is_empty());
        assert_eq!(store.selection().instance_id, None);
        assert!(store.revision() > before);
    }
}
