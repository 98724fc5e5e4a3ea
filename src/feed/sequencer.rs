//! Per-feed request sequencing.
//!
//! Every dispatch is stamped with the next sequence number of its feed. A
//! completion is applied only if it carries the latest number issued for the
//! feed and the feed has not been stopped since. Applied responses are
//! therefore monotonically non-decreasing in issuance order, whatever the
//! completion order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::FeedKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub feed: FeedKey,
    pub seq: u64,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Apply,
    /// A newer request was issued, or this one was already applied.
    Superseded { latest: u64 },
    /// The feed was stopped after this request was issued.
    Stopped,
}

#[derive(Debug, Clone, Default)]
struct FeedSequence {
    last_issued: u64,
    last_admitted: u64,
    /// Everything issued up to here belongs to a stopped run of the feed.
    retired_through: u64,
    active: bool,
}

#[derive(Debug, Default)]
pub struct ResponseSequencer {
    feeds: HashMap<FeedKey, FeedSequence>,
}

pub type SharedSequencer = Arc<Mutex<ResponseSequencer>>;

/// Critical sections never panic midway, so a poisoned lock still guards
/// consistent counters.
pub fn lock(shared: &SharedSequencer) -> MutexGuard<'_, ResponseSequencer> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ResponseSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSequencer {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Allow issuance. Counters carry over from earlier runs of the feed.
    pub fn activate(&mut self, feed: &FeedKey) {
        self.feeds.entry(feed.clone()).or_default().active = true;
    }

    /// Stamp a dispatch. `None` once the feed is stopped.
    pub fn issue(&mut self, feed: &FeedKey) -> Option<RequestEnvelope> {
        let state = self.feeds.get_mut(feed).filter(|s| s.active)?;
        state.last_issued += 1;
        Some(RequestEnvelope {
            feed: feed.clone(),
            seq: state.last_issued,
            issued_at: Utc::now(),
        })
    }

    /// Decide the fate of a completion. An `Apply` verdict is given at most
    /// once per envelope.
    pub fn admit(&mut self, envelope: &RequestEnvelope) -> Admission {
        let Some(state) = self.feeds.get_mut(&envelope.feed) else {
            return Admission::Stopped;
        };
        if !state.active || envelope.seq <= state.retired_through {
            return Admission::Stopped;
        }
        if envelope.seq != state.last_issued || envelope.seq <= state.last_admitted {
            return Admission::Superseded {
                latest: state.last_issued,
            };
        }
        state.last_admitted = envelope.seq;
        Admission::Apply
    }

    /// Stop the feed; every request issued so far is dead from now on.
    /// Returns the last issued sequence number.
    pub fn retire(&mut self, feed: &FeedKey) -> u64 {
        match self.feeds.get_mut(feed) {
            Some(state) => {
                state.active = false;
                state.retired_through = state.last_issued;
                state.last_issued
            }
            None => 0,
        }
    }

    pub fn latest(&self, feed: &FeedKey) -> u64 {
        self.feeds.get(feed).map(|s| s.last_issued).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trades() -> FeedKey {
        FeedKey::Trades("a".to_string())
    }

    #[test]
    fn test_issue_requires_activation() {
        let mut seq = ResponseSequencer::new();
        assert!(seq.issue(&trades()).is_none());
        seq.activate(&trades());
        assert_eq!(seq.issue(&trades()).unwrap().seq, 1);
        assert_eq!(seq.issue(&trades()).unwrap().seq, 2);
    }

    #[test]
    fn test_late_earlier_response_is_superseded() {
        let mut seq = ResponseSequencer::new();
        seq.activate(&trades());
        let a = seq.issue(&trades()).unwrap();
        let b = seq.issue(&trades()).unwrap();
        assert_eq!(seq.admit(&b), Admission::Apply);
        assert_eq!(seq.admit(&a), Admission::Superseded { latest: 2 });
    }

    #[test]
    fn test_earlier_response_superseded_even_before_later_lands() {
        let mut seq = ResponseSequencer::new();
        seq.activate(&trades());
        let a = seq.issue(&trades()).unwrap();
        let _b = seq.issue(&trades()).unwrap();
        assert_eq!(seq.admit(&a), Admission::Superseded { latest: 2 });
    }

    #[test]
    fn test_duplicate_delivery_applies_once() {
        let mut seq = ResponseSequencer::new();
        seq.activate(&trades());
        let a = seq.issue(&trades()).unwrap();
        assert_eq!(seq.admit(&a), Admission::Apply);
        assert_eq!(seq.admit(&a), Admission::Superseded { latest: 1 });
    }

    #[test]
    fn test_stop_invalidates_in_flight() {
        let mut seq = ResponseSequencer::new();
        seq.activate(&trades());
        let a = seq.issue(&trades()).unwrap();
        assert_eq!(seq.retire(&trades()), 1);
        assert!(seq.issue(&trades()).is_none());
        assert_eq!(seq.admit(&a), Admission::Stopped);
    }

    #[test]
    fn test_restart_keeps_counter_and_kills_old_run() {
        let mut seq = ResponseSequencer::new();
        seq.activate(&trades());
        let old = seq.issue(&trades()).unwrap();
        seq.retire(&trades());
        seq.activate(&trades());
        // The old response lands before the restarted feed dispatches.
        assert_eq!(seq.admit(&old), Admission::Stopped);
        let fresh = seq.issue(&trades()).unwrap();
        assert_eq!(fresh.seq, 2);
        assert_eq!(seq.admit(&fresh), Admission::Apply);
    }

    #[test]
    fn test_feeds_are_independent() {
        let mut seq = ResponseSequencer::new();
        let pos = FeedKey::Positions("a".to_string());
        seq.activate(&trades());
        seq.activate(&pos);
        let t = seq.issue(&trades()).unwrap();
        let p = seq.issue(&pos).unwrap();
        let _t2 = seq.issue(&trades()).unwrap();
        assert_eq!(seq.admit(&p), Admission::Apply);
        assert!(matches!(seq.admit(&t), Admission::Superseded { .. }));
    }

    #[test]
    fn test_unknown_feed_is_stopped() {
        let mut seq = ResponseSequencer::new();
        let env = RequestEnvelope {
            feed: FeedKey::Leaderboard,
            seq: 1,
            issued_at: Utc::now(),
        };
        assert_eq!(seq.admit(&env), Admission::Stopped);
        assert_eq!(seq.latest(&FeedKey::Leaderboard), 0);
    }
}
