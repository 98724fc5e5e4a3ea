//! The poller actor.
//!
//! One task owns the [`ViewStateStore`](crate::store::ViewStateStore) and is
//! the only place it is mutated. Feed completions and user commands arrive
//! on channels; after each one the running feed set is reconciled against
//! what the view needs and a fresh snapshot is published on a watch channel.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, watch};

use crate::api::Transport;
use crate::config::Config;
use crate::feed::scheduler::Scheduler;
use crate::feed::sequencer::ResponseSequencer;
use crate::feed::Completion;
use crate::logging::{self, log, obj, tick_aggregator, Domain, Level, ProfileScope};
use crate::store::selection::{DetailTab, SelectionState};
use crate::store::Snapshot;

pub mod apply;

pub use apply::{Applied, SyncState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SelectInstance(String),
    SelectDecision(u64),
    SelectSymbol(String),
    SelectTab(DetailTab),
    Shutdown,
}

/// Cloneable front door to a running [`Poller`].
#[derive(Clone)]
pub struct PollerHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl PollerHandle {
    /// Returns false once the poller has exited.
    pub fn send(&self, cmd: Command) -> bool {
        self.commands.send(cmd).is_ok()
    }

    pub fn select_instance(&self, id: impl Into<String>) -> bool {
        self.send(Command::SelectInstance(id.into()))
    }

    pub fn select_decision(&self, check_number: u64) -> bool {
        self.send(Command::SelectDecision(check_number))
    }

    pub fn select_symbol(&self, symbol: impl Into<String>) -> bool {
        self.send(Command::SelectSymbol(symbol.into()))
    }

    pub fn select_tab(&self, tab: DetailTab) -> bool {
        self.send(Command::SelectTab(tab))
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn current(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }
}

pub struct Poller {
    state: SyncState,
    scheduler: Scheduler,
    completions: mpsc::UnboundedReceiver<Completion>,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<Snapshot>,
    published: Option<u64>,
}

impl Poller {
    pub fn new(
        transport: Arc<dyn Transport>,
        cfg: Config,
        initial: SelectionState,
    ) -> (Self, PollerHandle) {
        let sequencer = ResponseSequencer::shared();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());

        let poller = Self {
            state: SyncState::new(cfg, sequencer.clone(), initial),
            scheduler: Scheduler::new(transport, sequencer, completion_tx),
            completions: completion_rx,
            commands: command_rx,
            snapshots: snapshot_tx,
            published: None,
        };
        let handle = PollerHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (poller, handle)
    }

    /// Run until `Shutdown` or until every handle is dropped.
    pub async fn run(mut self) {
        log(Level::Info, Domain::System, "poller_started", obj(&[]));
        self.sync();

        loop {
            tokio::select! {
                Some(completion) = self.completions.recv() => {
                    let _scope = ProfileScope::with_context(
                        "apply_completion",
                        &[("feed", json!(completion.envelope.feed.to_string()))],
                    );
                    self.state.apply(completion);
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => {
                        log(
                            Level::Debug,
                            Domain::System,
                            "command",
                            obj(&[("command", json!(format!("{:?}", cmd)))]),
                        );
                        self.state.handle_command(cmd);
                    }
                },
            }
            self.sync();
            tick_aggregator();
        }

        self.scheduler.stop_all();
        self.state.teardown();
        self.publish();
        log(Level::Info, Domain::System, "poller_stopped", obj(&[]));
        logging::flush();
    }

    /// Reconcile feeds with the view, then publish if anything changed.
    fn sync(&mut self) {
        let stopped = self.scheduler.reconcile(self.state.desired_feeds());
        for key in &stopped {
            self.state.forget_feed(key);
        }
        if self.published != Some(self.state.revision()) {
            self.publish();
        }
    }

    fn publish(&mut self) {
        let snapshot = self.state.snapshot();
        self.published = Some(snapshot.revision);
        self.snapshots.send_replace(snapshot);
    }
}
