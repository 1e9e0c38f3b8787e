//! Application configuration (spec §6), loaded from the environment once at
//! startup. Mirrors the teacher backend's `Config::from_env` pattern: every
//! field has a documented default and is overridable via `.env`/process env.

use std::env;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

/// Exponential backoff parameters for broker reconnection (spec §4.B).
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
    pub jitter_pct: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
            jitter_pct: 0.20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UsageLimits {
    pub public: Option<u32>,
    pub free: Option<u32>,
    pub pro: Option<u32>,
    pub business: Option<u32>,
    pub enterprise: Option<u32>,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            public: Some(0),
            free: Some(3),
            pro: Some(100),
            business: Some(1000),
            enterprise: None,
        }
    }
}

impl UsageLimits {
    pub fn for_tier(&self, tier: crate::domain::Tier) -> Option<u32> {
        use crate::domain::Tier;
        match tier {
            Tier::Public => self.public,
            Tier::Free => self.free,
            Tier::Pro => self.pro,
            Tier::Business => self.business,
            Tier::Enterprise => self.enterprise,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Process / transport
    pub bind_addr: String,
    pub db_path: String,
    pub jwt_secret: String,
    pub nats_url: Option<String>,
    pub metrics_port: u16,
    pub admin_token: String,

    // orchestrator.*
    pub agent_timeout: Duration,
    pub demo_mode: bool,
    pub demo_latency_min: Duration,
    pub demo_latency_max: Duration,

    // broker.*
    pub handler_budget: Duration,
    pub outbound_cap: usize,
    pub reconnect_backoff: BackoffConfig,
    pub health_grace: Duration,

    // push.*
    pub subscriber_cap: usize,

    // usage.*
    pub usage_limits: UsageLimits,

    // store.*
    pub store_op_timeout: Duration,

    // shutdown.*
    pub drain_budget: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "./signalzero.db".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                "dev-secret-change-in-production-minimum-32-characters".to_string()
            }),
            nats_url: env::var("NATS_URL").ok(),
            metrics_port: env_or("METRICS_PORT", 9090),
            admin_token: env::var("ADMIN_TOKEN")
                .unwrap_or_else(|_| "dev-admin-token-change-in-production".to_string()),

            agent_timeout: Duration::from_millis(env_or("ORCHESTRATOR_AGENT_TIMEOUT_MS", 5000)),
            demo_mode: env_bool("ORCHESTRATOR_DEMO_MODE", false),
            demo_latency_min: Duration::from_millis(env_or("ORCHESTRATOR_DEMO_LATENCY_MIN_MS", 200)),
            demo_latency_max: Duration::from_millis(env_or(
                "ORCHESTRATOR_DEMO_LATENCY_MAX_MS",
                1500,
            )),

            handler_budget: Duration::from_millis(env_or("BROKER_HANDLER_BUDGET_MS", 2000)),
            outbound_cap: env_or("BROKER_OUTBOUND_CAP", 1024),
            reconnect_backoff: BackoffConfig::default(),
            health_grace: Duration::from_millis(env_or("BROKER_HEALTH_GRACE_MS", 10_000)),

            subscriber_cap: env_or("PUSH_SUBSCRIBER_CAP", 256),

            usage_limits: UsageLimits::default(),

            store_op_timeout: Duration::from_millis(env_or("STORE_OP_TIMEOUT_MS", 500)),

            drain_budget: Duration::from_millis(env_or("SHUTDOWN_DRAIN_BUDGET_MS", 10_000)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_limits_match_spec_defaults() {
        let limits = UsageLimits::default();
        assert_eq!(limits.public, Some(0));
        assert_eq!(limits.free, Some(3));
        assert_eq!(limits.pro, Some(100));
        assert_eq!(limits.business, Some(1000));
        assert_eq!(limits.enterprise, None);
    }
}
