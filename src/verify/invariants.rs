use std::collections::BTreeSet;

use crate::api::types::{Decision, Instance};
use crate::store::selection::SelectionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub msg: String,
}

/// Every reference held by the selection must resolve in its collection.
pub fn assert_selection_invariants(
    selection: &SelectionState,
    instances: &[Instance],
    decisions: &[Decision],
    symbol_candidates: &[String],
) -> Result<(), InvariantViolation> {
    if let Some(id) = &selection.instance_id {
        if !instances.iter().any(|i| &i.instance_id == id) {
            return Err(InvariantViolation {
                msg: format!("selected instance {} not in leaderboard", id),
            });
        }
    } else if selection.decision.is_some() || !selection.expanded.is_empty() {
        return Err(InvariantViolation {
            msg: "decision selection without an instance".to_string(),
        });
    }

    let present: BTreeSet<u64> = decisions.iter().map(|d| d.check_number).collect();
    if let Some(n) = selection.decision {
        if !present.contains(&n) {
            return Err(InvariantViolation {
                msg: format!("selected decision #{} not in decisions", n),
            });
        }
    }
    if let Some(n) = selection.expanded.iter().find(|n| !present.contains(n)) {
        return Err(InvariantViolation {
            msg: format!("expanded decision #{} not in decisions", n),
        });
    }

    if let Some(sym) = &selection.symbol {
        if !symbol_candidates.contains(sym) {
            return Err(InvariantViolation {
                msg: format!("selected symbol {} not available", sym),
            });
        }
    }
    Ok(())
}

/// Decisions must be served newest-first with unique check numbers.
pub fn assert_decision_order(decisions: &[Decision]) -> Result<(), InvariantViolation> {
    for pair in decisions.windows(2) {
        if pair[0].check_number <= pair[1].check_number {
            return Err(InvariantViolation {
                msg: format!(
                    "decisions out of order: #{} before #{}",
                    pair[0].check_number, pair[1].check_number
                ),
            });
        }
    }
    Ok(())
}
