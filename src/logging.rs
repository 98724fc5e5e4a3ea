//! Structured logging for the dashboard engine.
//!
//! Every record is one JSON line carrying a run id, a monotonically increasing
//! sequence number, a level and a domain. Records go to per-run files under
//! `LOG_DIR` so that stdout stays free for the rendered view:
//!
//! - `events.jsonl`: info and above
//! - `trace.jsonl`: trace and debug
//! - `manifest.json`: run id, pid, start time
//!
//! Set `LOG_STDERR=1` to mirror records to stderr.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_LEVEL").ok().as_deref())
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("trace") => Level::Trace,
            Some("debug") => Level::Debug,
            Some("info") => Level::Info,
            Some("warn") => Level::Warn,
            Some("error") => Level::Error,
            Some("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Feed,       // Tick dispatch, fetch outcomes
    Sequence,   // Stale and post-stop drops
    Store,      // Collection replacement, selection repair
    Chart,      // Surface lifecycle
    Connection, // Health probe transitions
    Config,     // Configuration CRUD passthrough
    System,     // Startup, shutdown
    Profile,    // Performance profiling
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Feed => "feed",
            Domain::Sequence => "sequence",
            Domain::Store => "store",
            Domain::Chart => "chart",
            Domain::Connection => "connection",
            Domain::Config => "config",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    run_dir: PathBuf,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
    mirror_stderr: bool,
}

impl RunContext {
    /// Create `<base>/<run_id>/` with its manifest and log files. File errors
    /// degrade to a context that drops records instead of failing startup.
    pub fn open(base: &Path, run_id: &str) -> Self {
        let run_dir = base.join(run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }
        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        let open = |name: &str| match File::create(run_dir.join(name)) {
            Ok(f) => Some(Mutex::new(BufWriter::new(f))),
            Err(err) => {
                eprintln!("[log] failed to create {}: {}", name, err);
                None
            }
        };

        Self {
            run_id: run_id.to_string(),
            events: open("events.jsonl"),
            trace: open("trace.jsonl"),
            run_dir,
            mirror_stderr: matches!(std::env::var("LOG_STDERR").as_deref(), Ok("1") | Ok("true")),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn write(&self, level: Level, line: &str) {
        let sink = match level {
            Level::Trace | Level::Debug => &self.trace,
            _ => &self.events,
        };
        if let Some(writer) = sink {
            if let Ok(mut w) = writer.lock() {
                let _ = writeln!(w, "{}", line);
                if level >= Level::Warn {
                    let _ = w.flush();
                }
            }
        }
        if self.mirror_stderr {
            eprintln!("{}", line);
        }
    }

    pub fn flush(&self) {
        for sink in [&self.events, &self.trace].into_iter().flatten() {
            if let Ok(mut w) = sink.lock() {
                let _ = w.flush();
            }
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        RunContext::open(Path::new(&base), &run_id)
    })
}

/// Flush buffered records; call before exit.
pub fn flush() {
    if let Some(ctx) = RUN_CONTEXT.get() {
        ctx.flush();
    }
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["authorization", "Authorization", "api_key", "token", "cookie"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["feed", "request_seq", "instance_id", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }
    let ctx = ensure_run_context();
    let line = render_record(ctx.run_id(), level, domain.as_str(), event, fields);
    ctx.write(level, &line);
}

fn render_record(
    run_id: &str,
    level: Level,
    component: &str,
    event: &str,
    fields: Map<String, Value>,
) -> String {
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry).to_string()
}

// =============================================================================
// Engine logs
// =============================================================================

pub fn log_feed_started(feed: &str, period_ms: u64) {
    log(
        Level::Debug,
        Domain::Feed,
        "feed_started",
        obj(&[("feed", v_str(feed)), ("period_ms", json!(period_ms))]),
    );
}

pub fn log_feed_stopped(feed: &str, last_issued: u64) {
    log(
        Level::Debug,
        Domain::Feed,
        "feed_stopped",
        obj(&[("feed", v_str(feed)), ("last_issued", json!(last_issued))]),
    );
}

/// A fetch failed; previous data stays in place.
pub fn log_feed_error(feed: &str, request_seq: u64, kind: &str, error: &str, consecutive: u32) {
    agg_increment("error");
    log(
        Level::Warn,
        Domain::Feed,
        "feed_error",
        obj(&[
            ("feed", v_str(feed)),
            ("request_seq", json!(request_seq)),
            ("kind", v_str(kind)),
            ("error", v_str(error)),
            ("consecutive", json!(consecutive)),
        ]),
    );
}

pub fn log_applied(feed: &str, request_seq: u64) {
    agg_increment("applied");
    log(
        Level::Trace,
        Domain::Feed,
        "applied",
        obj(&[("feed", v_str(feed)), ("request_seq", json!(request_seq))]),
    );
}

/// Superseded or post-stop response; dropped silently.
pub fn log_stale_drop(feed: &str, request_seq: u64, latest: u64, reason: &str) {
    agg_increment("stale");
    log(
        Level::Debug,
        Domain::Sequence,
        "stale_drop",
        obj(&[
            ("feed", v_str(feed)),
            ("request_seq", json!(request_seq)),
            ("latest", json!(latest)),
            ("reason", v_str(reason)),
        ]),
    );
}

pub fn log_selection_change(axis: &str, from: Option<&str>, to: Option<&str>, cause: &str) {
    log(
        Level::Info,
        Domain::Store,
        "selection_change",
        obj(&[
            ("axis", v_str(axis)),
            ("from", from.map(v_str).unwrap_or(Value::Null)),
            ("to", to.map(v_str).unwrap_or(Value::Null)),
            ("cause", v_str(cause)),
        ]),
    );
}

pub fn log_connectivity(from: &str, to: &str) {
    log(
        Level::Info,
        Domain::Connection,
        "connectivity",
        obj(&[("from", v_str(from)), ("to", v_str(to))]),
    );
}

pub fn log_surface(event: &str, container: &str, epoch: u64) {
    log(
        Level::Debug,
        Domain::Chart,
        event,
        obj(&[("container", v_str(container)), ("epoch", json!(epoch))]),
    );
}

// =============================================================================
// Helpers
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = Self::should_sample();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    fn should_sample() -> bool {
        std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|p| {
                if p >= 1.0 {
                    true
                } else if p <= 0.0 {
                    false
                } else {
                    let seq = PROFILE_SEQ.fetch_add(1, Ordering::SeqCst);
                    let bucket = (seq % 10_000) as f64 / 10_000.0;
                    bucket < p
                }
            })
            .unwrap_or(false)
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Log Aggregator for Periodic Summaries
// =============================================================================

static AGGREGATOR: OnceLock<Mutex<LogAggregator>> = OnceLock::new();

fn get_aggregator() -> &'static Mutex<LogAggregator> {
    AGGREGATOR.get_or_init(|| Mutex::new(LogAggregator::new()))
}

struct LogAggregator {
    applied: u64,
    stale: u64,
    errors: u64,
    last_flush: Instant,
    flush_interval_secs: u64,
}

impl LogAggregator {
    fn new() -> Self {
        Self {
            applied: 0,
            stale: 0,
            errors: 0,
            last_flush: Instant::now(),
            flush_interval_secs: std::env::var("LOG_FLUSH_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }

    fn increment(&mut self, event: &str) {
        match event {
            "applied" => self.applied += 1,
            "stale" => self.stale += 1,
            "error" => self.errors += 1,
            _ => {}
        }
    }

    fn maybe_flush(&mut self) -> Option<(u64, u64, u64)> {
        if self.last_flush.elapsed().as_secs() >= self.flush_interval_secs {
            let result = (self.applied, self.stale, self.errors);
            self.applied = 0;
            self.stale = 0;
            self.errors = 0;
            self.last_flush = Instant::now();
            Some(result)
        } else {
            None
        }
    }
}

/// Call periodically to emit aggregated poll stats
pub fn tick_aggregator() {
    if let Ok(mut agg) = get_aggregator().lock() {
        if let Some((applied, stale, errors)) = agg.maybe_flush() {
            log(
                Level::Info,
                Domain::System,
                "poll_stats",
                obj(&[
                    ("applied", json!(applied)),
                    ("stale", json!(stale)),
                    ("errors", json!(errors)),
                ]),
            );
        }
    }
}

fn agg_increment(event: &str) {
    if let Ok(mut agg) = get_aggregator().lock() {
        agg.increment(event);
    }
}

// =============================================================================
// Tests
// =============================================================================
