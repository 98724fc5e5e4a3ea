use serde_json::Value;

use super::option::{macd_option, portfolio_option, price_option, rsi_option};
use super::{ChartHandle, ChartSurfaceManager, SurfaceFactory};
use crate::store::selection::DetailTab;
use crate::store::Snapshot;

pub fn portfolio_container(instance_id: &str) -> String {
    format!("portfolio-chart:{}", instance_id)
}

/// Containers of the analysis charts, in display order: price, MACD, RSI.
pub fn indicator_containers(instance_id: &str, symbol: &str) -> [String; 3] {
    ["price", "macd", "rsi"].map(|kind| format!("indicator-{}:{}:{}", kind, instance_id, symbol))
}

/// What the snapshot shows: each container with the option to push, if any.
fn wanted(snapshot: &Snapshot) -> Vec<(String, Option<Value>)> {
    let Some(id) = snapshot.selection.instance_id.as_deref() else {
        return Vec::new();
    };
    match snapshot.selection.tab {
        DetailTab::Chart => {
            let option = snapshot.detail.chart.as_ref().and_then(portfolio_option);
            vec![(portfolio_container(id), option)]
        }
        DetailTab::Analysis => {
            let Some(symbol) = snapshot.selection.symbol.as_deref() else {
                return Vec::new();
            };
            let Some(sd) = snapshot
                .selected_decision()
                .and_then(|d| d.symbol_decisions.iter().find(|sd| sd.symbol == symbol))
            else {
                return Vec::new();
            };
            let ind = sd.technical_indicators.clone().unwrap_or_default();
            let [price, macd, rsi] = indicator_containers(id, symbol);
            vec![
                (price, Some(price_option(sd))),
                (macd, macd_option(&ind)),
                (rsi, rsi_option(&ind)),
            ]
        }
        _ => Vec::new(),
    }
}

/// Mount exactly the containers the snapshot shows and push their options.
/// Returns the mounted handles in display order.
pub fn sync_charts<F: SurfaceFactory>(
    manager: &mut ChartSurfaceManager<F>,
    snapshot: &Snapshot,
) -> Vec<ChartHandle> {
    let wanted = wanted(snapshot);

    for handle in manager.handles() {
        if !wanted.iter().any(|(c, _)| c == handle.container()) {
            manager.dispose(&handle);
        }
    }

    wanted
        .into_iter()
        .map(|(container, option)| {
            let handle = manager.acquire(&container);
            if let Some(option) = option {
                manager.update(&handle, &option);
            }
            handle
        })
        .collect()
}
