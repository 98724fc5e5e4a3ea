use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub dashboard_poll_ms: u64,
    pub leaderboard_poll_ms: u64,
    pub market_poll_ms: u64,
    pub health_poll_ms: u64,
    pub probe_timeout_ms: u64,
    pub instance_poll_ms: u64,
    pub decisions_limit: u32,
    pub initial_instance: Option<String>,
    pub render_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001/api/v1/trading".to_string(),
            dashboard_poll_ms: 10_000,
            leaderboard_poll_ms: 10_000,
            market_poll_ms: 5_000,
            health_poll_ms: 5_000,
            probe_timeout_ms: 3_000,
            instance_poll_ms: 10_000,
            decisions_limit: 50,
            initial_instance: None,
            render_width: 72,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            base_url: std::env::var("ARENA_BASE_URL").unwrap_or(d.base_url),
            dashboard_poll_ms: env_or("DASHBOARD_POLL_MS", d.dashboard_poll_ms),
            leaderboard_poll_ms: env_or("LEADERBOARD_POLL_MS", d.leaderboard_poll_ms),
            market_poll_ms: env_or("MARKET_POLL_MS", d.market_poll_ms),
            health_poll_ms: env_or("HEALTH_POLL_MS", d.health_poll_ms),
            probe_timeout_ms: env_or("PROBE_TIMEOUT_MS", d.probe_timeout_ms),
            instance_poll_ms: env_or("INSTANCE_POLL_MS", d.instance_poll_ms),
            decisions_limit: env_or("DECISIONS_LIMIT", d.decisions_limit),
            initial_instance: std::env::var("INITIAL_INSTANCE")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            render_width: env_or("RENDER_WIDTH", d.render_width),
        }
    }

    /// Zero periods would spin the timer; clamp to 1ms.
    pub fn period(ms: u64) -> Duration {
        Duration::from_millis(ms.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Unset or unparsable variables fall back to `default`.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_cadence() {
        let cfg = Config::default();
        assert_eq!(cfg.dashboard_poll_ms, 10_000);
        assert_eq!(cfg.market_poll_ms, 5_000);
        assert_eq!(cfg.health_poll_ms, 5_000);
        assert_eq!(cfg.probe_timeout(), Duration::from_secs(3));
        assert!(cfg.base_url.ends_with("/api/v1/trading"));
    }

    #[test]
    fn test_zero_period_clamped() {
        assert_eq!(Config::period(0), Duration::from_millis(1));
    }
}
