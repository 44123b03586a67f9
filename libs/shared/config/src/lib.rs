use std::env;
use tracing::warn;

const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
const DEFAULT_REDIS_TIMEOUT_MS: u64 = 2000;
const DEFAULT_AVG_CONSULTATION_MINUTES: u32 = 15;
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_url: Option<String>,
    pub use_redis: bool,
    pub queue_force_local: bool,
    pub queue_strict_redis: bool,
    pub redis_timeout_ms: u64,
    pub queue_key_prefix: Option<String>,
    pub avg_consultation_minutes: u32,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            use_redis: false,
            queue_force_local: false,
            queue_strict_redis: false,
            redis_timeout_ms: DEFAULT_REDIS_TIMEOUT_MS,
            queue_key_prefix: None,
            avg_consultation_minutes: DEFAULT_AVG_CONSULTATION_MINUTES,
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            use_redis: env_flag("USE_REDIS"),
            queue_force_local: env_flag("QUEUE_FORCE_LOCAL"),
            queue_strict_redis: env_flag("QUEUE_STRICT_REDIS"),
            redis_timeout_ms: env_number("REDIS_TIMEOUT_MS", DEFAULT_REDIS_TIMEOUT_MS),
            queue_key_prefix: env::var("QUEUE_KEY_PREFIX").ok().filter(|p| !p.is_empty()),
            avg_consultation_minutes: env_number(
                "AVG_CONSULTATION_MINUTES",
                DEFAULT_AVG_CONSULTATION_MINUTES,
            ),
            port: env_number("PORT", DEFAULT_PORT),
        };

        if config.use_redis && config.redis_url.is_none() {
            warn!("USE_REDIS set but REDIS_URL not set, using {}", DEFAULT_REDIS_URL);
        }

        config
    }

    /// Connection address for the network queue store.
    pub fn redis_url_or_default(&self) -> String {
        self.redis_url
            .clone()
            .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string())
    }

    /// Whether store selection should try the network store at all.
    pub fn wants_redis(&self) -> bool {
        self.use_redis && !self.queue_force_local
    }

    /// Config that never touches the network store. Handy for tests.
    pub fn local_only() -> Self {
        Self {
            queue_force_local: true,
            ..Self::default()
        }
    }
}

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn env_number<T: std::str::FromStr + std::fmt::Display + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
