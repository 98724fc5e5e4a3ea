//! Selection repair: references never dangle, whatever order feeds land in.

use std::collections::BTreeSet;

use arenawatch::api::types::{Decision, Instance};
use arenawatch::store::selection::SelectionState;
use arenawatch::store::ViewStateStore;

fn board(ids: &[&str]) -> Vec<Instance> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| Instance {
            rank: i as u32 + 1,
            instance_id: id.to_string(),
            symbols: vec!["BTC-USD".to_string()],
            ..Default::default()
        })
        .collect()
}

fn decisions(numbers: &[u64]) -> Vec<Decision> {
    numbers
        .iter()
        .map(|n| Decision {
            check_number: *n,
            ..Default::default()
        })
        .collect()
}

#[test]
fn test_vanished_instance_degrades_to_rank_one() {
    let mut store = ViewStateStore::init(SelectionState::default());
    store.apply_instances(board(&["X", "Y", "Z"]));
    assert!(store.select_instance("Y"));

    store.apply_instances(board(&["X", "Z"]));
    assert_eq!(store.selection().instance_id.as_deref(), Some("X"));
    assert!(store.check_invariants().is_ok());
}

#[test]
fn test_first_decisions_seed_selection_and_expansion() {
    let mut store = ViewStateStore::init(SelectionState::default());
    store.apply_instances(board(&["a"]));
    store.apply_decisions("a", decisions(&[5, 4, 3]));

    assert_eq!(store.selection().decision, Some(5));
    assert_eq!(store.selection().expanded, BTreeSet::from([5]));

    // Later refreshes keep the user's expansion choices.
    store.select_decision(3);
    store.apply_decisions("a", decisions(&[6, 5, 4, 3]));
    assert_eq!(store.selection().decision, Some(3));
    assert_eq!(store.selection().expanded, BTreeSet::from([3, 5]));
}

#[test]
fn test_end_to_end_selection_lifecycle() {
    let mut store = ViewStateStore::init(SelectionState::default());
    assert_eq!(store.selection().instance_id, None);

    store.apply_instances(board(&["a"]));
    assert_eq!(store.selection().instance_id.as_deref(), Some("a"));

    store.apply_decisions("a", decisions(&[7]));
    assert_eq!(store.selection().decision, Some(7));
    assert_eq!(store.selection().expanded, BTreeSet::from([7]));

    store.apply_instances(Vec::new());
    assert_eq!(store.selection().instance_id, None);
    assert_eq!(store.selection().decision, None);
    assert!(store.selection().expanded.is_empty());
    assert!(store.detail().decisions.is_empty());
    assert!(store.check_invariants().is_ok());
}

#[test]
fn test_feed_order_does_not_change_outcome() {
    // Decisions for an instance that is not yet selected are ignored, so
    // leaderboard-then-decisions and decisions-then-leaderboard converge
    // once the decisions feed ticks again.
    let mut early = ViewStateStore::init(SelectionState::default());
    assert!(!early.apply_decisions("a", decisions(&[2, 1])));
    early.apply_instances(board(&["a"]));
    early.apply_decisions("a", decisions(&[2, 1]));

    let mut late = ViewStateStore::init(SelectionState::default());
    late.apply_instances(board(&["a"]));
    late.apply_decisions("a", decisions(&[2, 1]));

    assert_eq!(early.selection(), late.selection());
}
