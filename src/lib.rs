//! Live polling engine for an AI trading arena dashboard.
//!
//! Feeds poll the trading service on fixed periods, a sequencer keeps only
//! the latest response per feed, and a single poller task folds admitted
//! responses into the view state and publishes snapshots.

pub mod api;
pub mod chart;
pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod poller;
pub mod store;
pub mod verify;
pub mod view;
