//! Configuration types consumed by the consumer and provider composition
//! roots. Every field has a documented default so a config file only names
//! what it overrides.

use serde::{Deserialize, Serialize};

/// Load-balancing strategy for instance selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LbStrategy {
    #[default]
    RoundRobin,
    Random,
}

/// Which transport the consumer uses to reach providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Http,
    Tcp,
}

/// Retry behavior for the invocation pipeline.
///
/// `max_retries` counts retries after the first attempt: 0 means a single
/// attempt, 2 means up to three attempts. Only network-class errors retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default)]
    pub max_retries: u32,
    /// Per-attempt timeout in milliseconds. Default 3000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Prefer a not-yet-tried instance on each retry. Default true.
    #[serde(default = "default_true")]
    pub switch_instance_on_retry: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            timeout_ms: default_timeout_ms(),
            switch_instance_on_retry: true,
        }
    }
}

/// Circuit-breaker thresholds. Disabled by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Consecutive in-window failures that open the circuit. Default 5.
    #[serde(default = "default_fault_limit")]
    pub fault_limit: u32,
    /// Wait before the first half-open probe. Default 10000.
    #[serde(default = "default_half_open_initial_delay_ms")]
    pub half_open_initial_delay_ms: u64,
    /// Wait between subsequent half-open probes. Default 5000.
    #[serde(default = "default_half_open_delay_ms")]
    pub half_open_delay_ms: u64,
    /// Sliding failure window in milliseconds. Default 10000.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            fault_limit: default_fault_limit(),
            half_open_initial_delay_ms: default_half_open_initial_delay_ms(),
            half_open_delay_ms: default_half_open_delay_ms(),
            window_ms: default_window_ms(),
        }
    }
}

/// Consumer-side configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub load_balancer: LbStrategy,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub circuit_breaker: BreakerSettings,
    /// Percentage of traffic routed to gray-marked instances, 0..=100.
    #[serde(default)]
    pub gray_ratio: u8,
}

/// Provider-side configuration. Either listener may be omitted to run a
/// single-surface provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http_addr: Option<String>,
    #[serde(default)]
    pub frame_addr: Option<String>,
}

/// Registry client configuration shared by both discovery strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the poll-based registry, e.g. `http://127.0.0.1:8484`.
    pub address: String,
    #[serde(default = "default_app")]
    pub app: String,
    #[serde(default = "default_env")]
    pub env: String,
    /// Heartbeat renewal interval in milliseconds. Default 5000.
    #[serde(default = "default_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Version-poll interval for subscriptions in milliseconds. Default 5000.
    #[serde(default = "default_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_fault_limit() -> u32 {
    5
}

fn default_half_open_initial_delay_ms() -> u64 {
    10_000
}

fn default_half_open_delay_ms() -> u64 {
    5_000
}

fn default_window_ms() -> u64 {
    10_000
}

fn default_app() -> String {
    "app1".to_string()
}

fn default_env() -> String {
    "dev".to_string()
}

fn default_interval_ms() -> u64 {
    5_000
}
