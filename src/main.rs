use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use arenawatch::api::HttpTransport;
use arenawatch::chart::text::TextSurfaceFactory;
use arenawatch::chart::{sync_charts, ChartSurfaceManager};
use arenawatch::config::Config;
use arenawatch::logging::{self, log, obj, v_str, Domain, Level};
use arenawatch::poller::Poller;
use arenawatch::store::selection::SelectionState;
use arenawatch::store::Snapshot;
use arenawatch::view::{parse_console_input, project, ConsoleInput};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::Config,
        "config_loaded",
        obj(&[
            ("base_url", v_str(&cfg.base_url)),
            ("dashboard_poll_ms", json!(cfg.dashboard_poll_ms)),
            ("market_poll_ms", json!(cfg.market_poll_ms)),
            ("health_poll_ms", json!(cfg.health_poll_ms)),
            ("instance_poll_ms", json!(cfg.instance_poll_ms)),
            ("initial_instance", json!(cfg.initial_instance)),
        ]),
    );

    let transport = Arc::new(HttpTransport::new(&cfg.base_url)?);
    let factory = TextSurfaceFactory::new(cfg.render_width);
    let mut charts = ChartSurfaceManager::new(factory.clone());
    let initial = SelectionState {
        instance_id: cfg.initial_instance.clone(),
        ..Default::default()
    };
    let (poller, handle) = Poller::new(transport, cfg, initial);
    let worker = tokio::spawn(poller.run());

    let mut snapshots = handle.subscribe();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = snapshots.borrow_and_update().clone();
                redraw(&mut charts, &snap);
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match parse_console_input(&line) {
                    Ok(ConsoleInput::Poller(cmd)) => {
                        handle.send(cmd);
                    }
                    Ok(ConsoleInput::Resize(width)) => {
                        factory.set_width(width);
                        charts.resize_all();
                        redraw(&mut charts, &handle.current());
                    }
                    Ok(ConsoleInput::Quit) => break,
                    Err(msg) => eprintln!("{}", msg),
                },
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown();
    let _ = worker.await;
    charts.dispose_all();
    logging::flush();
    Ok(())
}

fn redraw(charts: &mut ChartSurfaceManager<TextSurfaceFactory>, snap: &Snapshot) {
    let mounted = sync_charts(charts, snap);
    let drawn: Vec<&[String]> = mounted
        .iter()
        .filter_map(|h| charts.surface(h))
        .filter_map(|s| s.rendered())
        .collect();
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "\x1b[2J\x1b[H");
    for line in project(snap, &drawn) {
        let _ = writeln!(out, "{}", line);
    }
    let _ = out.flush();
}
