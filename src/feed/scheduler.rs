//! Fixed-period execution of feed tasks.
//!
//! Each running feed owns one timer task. A tick stamps an envelope and
//! spawns the fetch separately, so a slow fetch never stretches the period.
//! Stopping a feed retires its sequence first and then aborts the timer; any
//! fetch still in flight completes but its result is dropped on admission.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::sequencer::{lock, SharedSequencer};
use super::{Completion, FeedKey, FeedTask};
use crate::api::Transport;
use crate::logging::{log_feed_started, log_feed_stopped};

pub struct FeedHandle {
    pub key: FeedKey,
    timer: JoinHandle<()>,
}

pub struct Scheduler {
    transport: Arc<dyn Transport>,
    sequencer: SharedSequencer,
    completions: mpsc::UnboundedSender<Completion>,
    running: BTreeMap<FeedKey, FeedHandle>,
}

impl Scheduler {
    pub fn new(
        transport: Arc<dyn Transport>,
        sequencer: SharedSequencer,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            transport,
            sequencer,
            completions,
            running: BTreeMap::new(),
        }
    }

    /// Start polling `task`: an immediate fetch, then one per period.
    /// Returns false if the feed is already running.
    pub fn start(&mut self, task: FeedTask) -> bool {
        if self.running.contains_key(&task.id) {
            return false;
        }
        lock(&self.sequencer).activate(&task.id);
        log_feed_started(&task.id.to_string(), task.period.as_millis() as u64);
        let key = task.id.clone();
        let timer = tokio::spawn(run_feed(
            task,
            self.transport.clone(),
            self.sequencer.clone(),
            self.completions.clone(),
        ));
        self.running.insert(key.clone(), FeedHandle { key, timer });
        true
    }

    /// Returns false if the feed was not running.
    pub fn stop(&mut self, key: &FeedKey) -> bool {
        let Some(handle) = self.running.remove(key) else {
            return false;
        };
        let last = lock(&self.sequencer).retire(&handle.key);
        handle.timer.abort();
        log_feed_stopped(&handle.key.to_string(), last);
        true
    }

    /// Bring the running set in line with `desired`. Returns the stopped keys.
    pub fn reconcile(&mut self, desired: Vec<FeedTask>) -> Vec<FeedKey> {
        let wanted: BTreeSet<FeedKey> = desired.iter().map(|t| t.id.clone()).collect();
        let stale: Vec<FeedKey> = self
            .running
            .keys()
            .filter(|k| !wanted.contains(*k))
            .cloned()
            .collect();
        for key in &stale {
            self.stop(key);
        }
        for task in desired {
            self.start(task);
        }
        stale
    }

    pub fn stop_all(&mut self) {
        let keys: Vec<FeedKey> = self.running.keys().cloned().collect();
        for key in keys {
            self.stop(&key);
        }
    }

    pub fn running(&self) -> impl Iterator<Item = &FeedKey> {
        self.running.keys()
    }

    pub fn is_running(&self, key: &FeedKey) -> bool {
        self.running.contains_key(key)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn run_feed(
    task: FeedTask,
    transport: Arc<dyn Transport>,
    sequencer: SharedSequencer,
    completions: mpsc::UnboundedSender<Completion>,
) {
    let mut ticker = interval(task.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let task = Arc::new(task);
    loop {
        ticker.tick().await;
        if completions.is_closed() {
            break;
        }
        let issued = lock(&sequencer).issue(&task.id);
        let Some(envelope) = issued else {
            break;
        };
        let task = task.clone();
        let transport = transport.clone();
        let completions = completions.clone();
        tokio::spawn(async move {
            let outcome = task.execute(transport.as_ref()).await;
            let _ = completions.send(Completion { envelope, outcome });
        });
    }
}
