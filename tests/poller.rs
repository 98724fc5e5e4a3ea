//! Poller and scheduler against an in-process fake service, on a paused clock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use arenawatch::api::Transport;
use arenawatch::config::Config;
use arenawatch::error::FeedError;
use arenawatch::feed::monitor::Connectivity;
use arenawatch::feed::scheduler::Scheduler;
use arenawatch::feed::sequencer::{lock, Admission, ResponseSequencer};
use arenawatch::feed::{FeedKey, FeedTask};
use arenawatch::poller::{Poller, PollerHandle};
use arenawatch::store::selection::{DetailTab, SelectionState};
use arenawatch::store::Snapshot;
use arenawatch::view::project;

struct FakeService {
    calls: Mutex<BTreeMap<String, usize>>,
    probe_ok: AtomicBool,
    fail_trades: bool,
    head_delay: Duration,
    market_delay: Duration,
}

impl FakeService {
    fn new(fail_trades: bool) -> Arc<Self> {
        Self::with_delays(fail_trades, Duration::ZERO, Duration::ZERO)
    }

    /// HEAD answers after `head_delay`; `/market-prices` after `market_delay`.
    fn with_delays(fail_trades: bool, head_delay: Duration, market_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(BTreeMap::new()),
            probe_ok: AtomicBool::new(true),
            fail_trades,
            head_delay,
            market_delay,
        })
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(_, n)| *n)
            .sum()
    }
}

#[async_trait]
impl Transport for FakeService {
    async fn get(&self, path: &str) -> Result<String, FeedError> {
        *self.calls.lock().unwrap().entry(path.to_string()).or_default() += 1;
        if path == "/market-prices" && !self.market_delay.is_zero() {
            tokio::time::sleep(self.market_delay).await;
        }
        let body = match path {
            "/dashboard" => {
                r#"{"total_instances":1,"total_value":10500.0,"total_pnl":500.0,"total_pnl_pct":5.0}"#
            }
            "/leaderboard" => {
                r#"[{"rank":1,"instance_id":"a","model":"openai/gpt-4o","symbols":["BTC-USD"]}]"#
            }
            "/market-prices" => {
                r#"{"timestamp":"t","prices":{"BTC":{"symbol":"BTC","price":65000.0,"change_pct":1.2}}}"#
            }
            "/instance/a/trades" if self.fail_trades => {
                return Err(FeedError::Protocol {
                    status: 500,
                    body: "boom".to_string(),
                })
            }
            "/instance/a/trades" => r#"{"trades":[]}"#,
            "/instance/a/positions" => r#"{"positions":[{"symbol":"BTC-USD","quantity":0.5}]}"#,
            "/instance/a/chart" => {
                r#"{"data":"[[\"Time\",\"gpt-4o\"],[\"10:00\",10000],[\"10:05\",10100]]"}"#
            }
            p if p.starts_with("/instance/a/decisions") => {
                r#"{"decisions":[{"check_number":7,"symbol_decisions":[{"symbol":"BTC-USD"}]}]}"#
            }
            _ => {
                return Err(FeedError::Protocol {
                    status: 404,
                    body: String::new(),
                })
            }
        };
        Ok(body.to_string())
    }

    async fn head(&self, path: &str) -> Result<(), FeedError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(format!("HEAD {}", path))
            .or_default() += 1;
        if !self.head_delay.is_zero() {
            tokio::time::sleep(self.head_delay).await;
        }
        if self.probe_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FeedError::Network("connection refused".to_string()))
        }
    }
}

fn start(service: Arc<FakeService>, initial: SelectionState) -> (JoinHandle<()>, PollerHandle) {
    let (poller, handle) = Poller::new(service, Config::default(), initial);
    (tokio::spawn(poller.run()), handle)
}

async fn wait_for(
    rx: &mut watch::Receiver<Snapshot>,
    pred: impl Fn(&Snapshot) -> bool,
) -> Snapshot {
    let wait = async {
        loop {
            {
                let snap = rx.borrow_and_update();
                if pred(&*snap) {
                    return snap.clone();
                }
            }
            rx.changed().await.expect("poller alive");
        }
    };
    tokio::time::timeout(Duration::from_secs(300), wait)
        .await
        .expect("condition reached")
}

#[tokio::test(start_paused = true)]
async fn test_failing_feed_is_isolated() {
    let service = FakeService::new(true);
    let (worker, handle) = start(service.clone(), SelectionState::default());
    let mut rx = handle.subscribe();
    let trades = FeedKey::Trades("a".to_string());

    let snap = wait_for(&mut rx, |s| {
        s.feed_health(&trades)
            .map(|h| h.consecutive_failures >= 3)
            .unwrap_or(false)
    })
    .await;

    assert_eq!(snap.detail.positions.len(), 1);
    assert_eq!(snap.detail.decisions.len(), 1);
    assert_eq!(snap.selection.decision, Some(7));
    assert!(snap.summary.is_some());
    assert_eq!(snap.connectivity, Connectivity::Connected);
    assert!(!snap.initial_load_failed);
    assert!(snap
        .feed_health(&trades)
        .and_then(|h| h.last_error.clone())
        .unwrap_or_default()
        .contains("500"));

    handle.shutdown();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_probe_failure_only_touches_connectivity() {
    let service = FakeService::new(false);
    let (worker, handle) = start(service.clone(), SelectionState::default());
    let mut rx = handle.subscribe();

    wait_for(&mut rx, |s| {
        s.connectivity == Connectivity::Connected && !s.instances.is_empty()
    })
    .await;
    service.probe_ok.store(false, Ordering::SeqCst);
    let snap = wait_for(&mut rx, |s| s.connectivity == Connectivity::Disconnected).await;
    assert_eq!(snap.instances.len(), 1);
    assert!(snap.market.is_some());

    handle.shutdown();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tab_switch_swaps_instance_feeds() {
    let service = FakeService::new(false);
    let (worker, handle) = start(service.clone(), SelectionState::default());
    let mut rx = handle.subscribe();

    wait_for(&mut rx, |s| !s.detail.decisions.is_empty()).await;
    assert_eq!(service.count("/instance/a/chart"), 0);

    assert!(handle.select_tab(DetailTab::Chart));
    let snap = wait_for(&mut rx, |s| s.detail.chart.is_some()).await;
    assert_eq!(snap.selection.tab, DetailTab::Chart);
    assert_eq!(snap.detail.chart.as_ref().map(|c| c.points.len()), Some(2));
    assert!(snap.feed_health(&FeedKey::Decisions("a".to_string())).is_none());

    let decisions_before = service.count("/instance/a/decisions");
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(service.count("/instance/a/decisions"), decisions_before);

    handle.shutdown();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_initial_instance_preference() {
    let service = FakeService::new(false);
    let initial = SelectionState {
        instance_id: Some("a".to_string()),
        tab: DetailTab::Positions,
        ..Default::default()
    };
    let (worker, handle) = start(service.clone(), initial);
    let mut rx = handle.subscribe();

    let snap = wait_for(&mut rx, |s| !s.detail.positions.is_empty()).await;
    assert_eq!(snap.selection.instance_id.as_deref(), Some("a"));
    assert_eq!(snap.selection.tab, DetailTab::Positions);
    assert_eq!(service.count("/instance/a/decisions"), 0);

    handle.shutdown();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_stop_cancels_timer_and_in_flight() {
    let service = FakeService::new(false);
    let seq = ResponseSequencer::shared();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cfg = Config::default();
    let mut scheduler = Scheduler::new(service.clone(), seq.clone(), tx);

    assert!(scheduler.start(FeedTask::for_key(FeedKey::MarketPrices, &cfg)));
    assert!(!scheduler.start(FeedTask::for_key(FeedKey::MarketPrices, &cfg)));

    let first = rx.recv().await.unwrap();
    assert_eq!(first.envelope.seq, 1);
    let second = rx.recv().await.unwrap();
    assert_eq!(second.envelope.seq, 2);

    assert!(scheduler.stop(&FeedKey::MarketPrices));
    assert!(!scheduler.is_running(&FeedKey::MarketPrices));
    assert_eq!(lock(&seq).admit(&second.envelope), Admission::Stopped);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(service.count("/market-prices"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hung_connectivity_check_times_out_at_deadline() {
    let service = FakeService::with_delays(false, Duration::from_secs(60), Duration::ZERO);
    let (worker, handle) = start(service.clone(), SelectionState::default());

    tokio::time::sleep(Duration::from_millis(2_900)).await;
    assert_eq!(handle.current().connectivity, Connectivity::Connecting);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let snap = handle.current();
    assert_eq!(snap.connectivity, Connectivity::Disconnected);
    assert!(snap.last_check.is_some());
    assert_eq!(service.count("HEAD"), 1);
    // Data feeds are unaffected by the hung check.
    assert_eq!(snap.instances.len(), 1);

    handle.shutdown();
    worker.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_keeps_fixed_period() {
    let service = FakeService::with_delays(false, Duration::ZERO, Duration::from_secs(7));
    let (worker, handle) = start(service.clone(), SelectionState::default());

    tokio::time::sleep(Duration::from_millis(30_100)).await;
    // Ticks at 0, 5, .. 30 each issue a call even though every fetch takes 7s.
    assert_eq!(service.count("/market-prices"), 7);
    assert_eq!(service.count("HEAD"), 7);

    // Each answer lands after a newer request went out, so none is applied
    // and the feed is reported as lagging.
    let snap = handle.current();
    assert!(snap.market.is_none());
    let health = snap.feed_health(&FeedKey::MarketPrices).unwrap();
    assert_eq!(health.stale_drops, 5);
    assert!(!health.is_failing());
    assert!(project(&snap, &[])
        .iter()
        .any(|l| l.contains("5 responses overtaken")));

    handle.shutdown();
    worker.await.unwrap();
}
