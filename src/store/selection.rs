use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tabs of the instance detail view. The tab decides which per-instance feeds
/// are mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailTab {
    #[default]
    ModelChat,
    Chart,
    Decisions,
    Positions,
    Trades,
    Analysis,
}

impl DetailTab {
    pub const ALL: [DetailTab; 6] = [
        DetailTab::ModelChat,
        DetailTab::Chart,
        DetailTab::Decisions,
        DetailTab::Positions,
        DetailTab::Trades,
        DetailTab::Analysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetailTab::ModelChat => "model_chat",
            DetailTab::Chart => "chart",
            DetailTab::Decisions => "decisions",
            DetailTab::Positions => "positions",
            DetailTab::Trades => "trades",
            DetailTab::Analysis => "analysis",
        }
    }

    pub fn needs_decisions(&self) -> bool {
        matches!(
            self,
            DetailTab::ModelChat | DetailTab::Decisions | DetailTab::Analysis
        )
    }

    pub fn needs_chart(&self) -> bool {
        matches!(self, DetailTab::Chart)
    }
}

impl fmt::Display for DetailTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        match norm.as_str() {
            "model_chat" | "chat" | "modelchat" => Ok(DetailTab::ModelChat),
            other => DetailTab::ALL
                .into_iter()
                .find(|t| t.as_str() == other)
                .ok_or_else(|| format!("unknown tab: {}", s)),
        }
    }
}

/// The cursor across instance, decision, symbol and tab axes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    pub instance_id: Option<String>,
    pub decision: Option<u64>,
    pub expanded: BTreeSet<u64>,
    pub symbol: Option<String>,
    pub tab: DetailTab,
}

impl SelectionState {
    /// Drop everything scoped to the selected instance.
    pub(crate) fn clear_instance_scope(&mut self) {
        self.decision = None;
        self.expanded.clear();
        self.symbol = None;
    }

    pub fn is_expanded(&self, check_number: u64) -> bool {
        self.expanded.contains(&check_number)
    }
}
