use chrono::Utc;
use serde_json::json;

use super::Command;
use crate::config::Config;
use crate::feed::monitor::ConnectionMonitor;
use crate::feed::sequencer::{lock, Admission, SharedSequencer};
use crate::feed::{Completion, FeedKey, FeedPayload, FeedTask};
use crate::logging::{log, log_applied, log_feed_error, log_stale_drop, obj, v_str, Domain, Level};
use crate::store::selection::SelectionState;
use crate::store::{Snapshot, ViewStateStore};

/// What a completion did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Data,
    Failed,
    Probe,
    Stale,
}

/// Everything the apply loop owns. Kept free of channels and timers so the
/// completion path can be driven synchronously.
pub struct SyncState {
    store: ViewStateStore,
    monitor: ConnectionMonitor,
    sequencer: SharedSequencer,
    cfg: Config,
    probes: u64,
}

impl SyncState {
    pub fn new(cfg: Config, sequencer: SharedSequencer, initial: SelectionState) -> Self {
        Self {
            store: ViewStateStore::init(initial),
            monitor: ConnectionMonitor::new(),
            sequencer,
            cfg,
            probes: 0,
        }
    }

    pub fn apply(&mut self, completion: Completion) -> Applied {
        let Completion { envelope, outcome } = completion;
        let feed = envelope.feed.to_string();

        let verdict = lock(&self.sequencer).admit(&envelope);
        match verdict {
            Admission::Apply => {}
            Admission::Superseded { latest } => {
                log_stale_drop(&feed, envelope.seq, latest, "superseded");
                if envelope.feed != FeedKey::Health {
                    self.store.record_stale_drop(&envelope.feed);
                }
                return Applied::Stale;
            }
            Admission::Stopped => {
                let latest = lock(&self.sequencer).latest(&envelope.feed);
                log_stale_drop(&feed, envelope.seq, latest, "stopped");
                return Applied::Stale;
            }
        }

        if envelope.feed == FeedKey::Health {
            self.monitor.record(outcome.is_ok(), Utc::now());
            self.probes += 1;
            return Applied::Probe;
        }

        match outcome {
            Err(err) => {
                let streak = self.store.record_feed_error(&envelope.feed, &err);
                log_feed_error(&feed, envelope.seq, err.kind(), &err.to_string(), streak);
                Applied::Failed
            }
            Ok(payload) => {
                self.apply_payload(&envelope.feed, payload);
                self.store.record_feed_success(&envelope.feed, Utc::now());
                log_applied(&feed, envelope.seq);
                Applied::Data
            }
        }
    }

    fn apply_payload(&mut self, feed: &FeedKey, payload: FeedPayload) {
        let store = &mut self.store;
        let accepted = match (feed, payload) {
            (FeedKey::Dashboard, FeedPayload::Summary(summary)) => {
                store.apply_summary(summary);
                true
            }
            (FeedKey::Leaderboard, FeedPayload::Leaderboard(list)) => {
                store.apply_instances(list);
                true
            }
            (FeedKey::MarketPrices, FeedPayload::MarketPrices(prices)) => {
                store.apply_market_prices(prices);
                true
            }
            (FeedKey::Decisions(id), FeedPayload::Decisions(list)) => {
                store.apply_decisions(id, list)
            }
            (FeedKey::Trades(id), FeedPayload::Trades(list)) => store.apply_trades(id, list),
            (FeedKey::Positions(id), FeedPayload::Positions(list)) => {
                store.apply_positions(id, list)
            }
            (FeedKey::Chart(id), FeedPayload::Chart(series)) => store.apply_chart(id, series),
            (_, other) => {
                log(
                    Level::Error,
                    Domain::Feed,
                    "payload_mismatch",
                    obj(&[
                        ("feed", v_str(&feed.to_string())),
                        ("payload", json!(format!("{:?}", other))),
                    ]),
                );
                false
            }
        };
        if !accepted {
            log(
                Level::Debug,
                Domain::Store,
                "untracked_instance",
                obj(&[("feed", v_str(&feed.to_string()))]),
            );
        }
    }

    /// Apply a user command. `Shutdown` is handled by the loop, not here.
    pub fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SelectInstance(id) => {
                self.store.select_instance(&id);
            }
            Command::SelectDecision(n) => {
                self.store.select_decision(n);
            }
            Command::SelectSymbol(sym) => {
                self.store.select_symbol(&sym);
            }
            Command::SelectTab(tab) => self.store.select_tab(tab),
            Command::Shutdown => {}
        }
    }

    /// Feeds the current view needs mounted.
    pub fn desired_feeds(&self) -> Vec<FeedTask> {
        let mut keys = vec![
            FeedKey::Health,
            FeedKey::Dashboard,
            FeedKey::Leaderboard,
            FeedKey::MarketPrices,
        ];
        let selection = self.store.selection();
        if let Some(id) = &selection.instance_id {
            keys.push(FeedKey::Trades(id.clone()));
            keys.push(FeedKey::Positions(id.clone()));
            if selection.tab.needs_decisions() {
                keys.push(FeedKey::Decisions(id.clone()));
            }
            if selection.tab.needs_chart() {
                keys.push(FeedKey::Chart(id.clone()));
            }
        }
        keys.into_iter()
            .map(|key| FeedTask::for_key(key, &self.cfg))
            .collect()
    }

    pub fn forget_feed(&mut self, feed: &FeedKey) {
        self.store.forget_feed(feed);
    }

    /// Changes whenever the published view would.
    pub fn revision(&self) -> u64 {
        self.store.revision() + self.probes
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut snap = self.store.snapshot(&self.monitor);
        snap.revision = self.revision();
        snap
    }

    pub fn store(&self) -> &ViewStateStore {
        &self.store
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub fn teardown(&mut self) {
        self.store.teardown();
    }
}
