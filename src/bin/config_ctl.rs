//! Trading configuration CRUD against the arena service.
//!
//! Usage:
//!   cargo run --bin config_ctl -- list
//!   cargo run --bin config_ctl -- models
//!   cargo run --bin config_ctl -- get <id>
//!   cargo run --bin config_ctl -- create <spec.json>
//!   cargo run --bin config_ctl -- update <id> <patch.json>
//!   cargo run --bin config_ctl -- delete <id>
//!   cargo run --bin config_ctl -- start <id>
//!
//! The base URL comes from ARENA_BASE_URL.

use std::fs;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use arenawatch::api::trading_config::{ConfigClient, TradingConfigCreate, TradingConfigUpdate};
use arenawatch::config::Config;
use arenawatch::logging;

fn read_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn usage() -> ! {
    eprintln!(
        "usage: config_ctl list | models | get <id> | create <json-file> \
         | update <id> <json-file> | delete <id> | start <id>"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = Config::from_env();
    let client = ConfigClient::new(&cfg.base_url)?;

    let arg = |i: usize| args.get(i).map(String::as_str);
    let result = match (arg(0), arg(1), arg(2)) {
        (Some("list"), None, None) => {
            let configs = client.list().await?;
            for c in &configs {
                println!(
                    "{}  {}  symbols={}  models={}  active={}",
                    c.id,
                    c.spec.name,
                    c.spec.crypto_symbols.join(","),
                    c.spec.agent_models.join(","),
                    c.active_instances.len()
                );
            }
            Ok(())
        }
        (Some("models"), None, None) => print(&client.available_models().await?),
        (Some("get"), Some(id), None) => print(&client.get(id).await?),
        (Some("create"), Some(path), None) => {
            let spec: TradingConfigCreate = read_json(path)?;
            print(&client.create(&spec).await?)
        }
        (Some("update"), Some(id), Some(path)) => {
            let patch: TradingConfigUpdate = read_json(path)?;
            print(&client.update(id, &patch).await?)
        }
        (Some("delete"), Some(id), None) => print(&client.delete(id).await?),
        (Some("start"), Some(id), None) => print(&client.start(id).await?),
        (None, _, _) => usage(),
        (Some(cmd), _, _) => bail!("unknown or malformed command: {}", cmd),
    };
    logging::flush();
    result
}
