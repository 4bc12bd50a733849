use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub cors_origin: String,
    /// Number of games the action store keeps before evicting the least recently used.
    pub action_cache_capacity: usize,
    pub action_cache_ttl: Duration,
    pub tally_cache_ttl: Duration,
    /// Delay before a phase timer whose transition failed tries again.
    pub phase_retry_delay: Duration,
    // falseの場合、フェーズは明示的な進行リクエストでのみ進む
    pub auto_advance_phases: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            action_cache_capacity: 100,
            action_cache_ttl: Duration::from_secs(600),
            tally_cache_ttl: Duration::from_secs(5),
            phase_retry_delay: Duration::from_secs(5),
            auto_advance_phases: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let server_addr = env::var("SERVER_ADDR").unwrap_or(defaults.server_addr);
        let cors_origin = env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin);
        let action_cache_capacity = env::var("ACTION_CACHE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(defaults.action_cache_capacity);
        let action_cache_ttl = env::var("ACTION_CACHE_TTL_SECONDS")
            .ok()
            .and_then(|v| positive_seconds(&v))
            .unwrap_or(defaults.action_cache_ttl);
        let tally_cache_ttl = env::var("TALLY_CACHE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.tally_cache_ttl);
        let phase_retry_delay = env::var("PHASE_RETRY_SECONDS")
            .ok()
            .and_then(|v| positive_seconds(&v))
            .unwrap_or(defaults.phase_retry_delay);
        let auto_advance_phases = env::var("AUTO_ADVANCE_PHASES")
            .map(|v| v != "false")
            .unwrap_or(defaults.auto_advance_phases);

        Self {
            server_addr,
            cors_origin,
            action_cache_capacity,
            action_cache_ttl,
            tally_cache_ttl,
            phase_retry_delay,
            auto_advance_phases,
        }
    }
}

// TTLが0だと書き込んだ瞬間にエントリが期限切れになる
fn positive_seconds(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
}
