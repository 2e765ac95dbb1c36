//! Configuration data types.

use crate::selector::{ApplyMode, Node, P2cConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Node selection settings
    #[serde(default)]
    pub selector: SelectorConfig,

    /// Per-node transport pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Initial node set
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl Config {
    /// The configured nodes as selector nodes, in file order.
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.iter().map(NodeConfig::to_node).collect()
    }
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Load balancing algorithm.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Random,
    #[serde(alias = "weighted_round_robin")]
    Wrr,
    #[serde(alias = "power_of_two_choices")]
    P2c,
    /// Single fixed node.
    #[serde(alias = "once", alias = "aio")]
    Static,
}

/// Node selection settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SelectorConfig {
    /// Balancing algorithm
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Whether apply keeps runtime state of unchanged nodes
    #[serde(default)]
    pub apply_mode: ApplyMode,

    /// P2C tuning (ignored by other algorithms)
    #[serde(default)]
    pub p2c: P2cSettings,
}

/// P2C tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct P2cSettings {
    /// Weight of the previous latency estimate, in (0, 1)
    #[serde(default = "default_decay")]
    pub decay: f64,

    /// Latency multiplier applied on failed requests, >= 1
    #[serde(default = "default_error_penalty")]
    pub error_penalty: f64,

    /// Latency estimate for nodes without observations
    #[serde(default = "default_initial_latency", with = "humantime_serde")]
    pub initial_latency: Duration,

    /// Idle time after which a node losing the comparison is picked anyway
    #[serde(default = "default_force_pick", with = "humantime_serde")]
    pub force_pick: Duration,
}

impl P2cSettings {
    pub fn to_balancer_config(&self) -> P2cConfig {
        P2cConfig {
            decay: self.decay,
            error_penalty: self.error_penalty,
            initial_latency: self.initial_latency,
            force_pick: self.force_pick,
        }
    }
}

impl Default for P2cSettings {
    fn default() -> Self {
        Self {
            decay: default_decay(),
            error_penalty: default_error_penalty(),
            initial_latency: default_initial_latency(),
            force_pick: default_force_pick(),
        }
    }
}

/// Transport settings applied to every pooled per-node client.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle connections kept per node
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,

    /// How long an idle connection is kept
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// TCP connect timeout
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// TCP keep-alive interval (unset disables keep-alive probes)
    #[serde(
        default = "default_keepalive",
        with = "option_humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub keepalive: Option<Duration>,

    /// Upper bound for one request, unless the scope sets its own
    #[serde(
        default = "default_request_timeout",
        with = "option_humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_timeout: Option<Duration>,

    /// Set TCP_NODELAY on connections
    #[serde(default = "default_true")]
    pub nodelay: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_max_idle_per_host(),
            idle_timeout: default_idle_timeout(),
            connect_timeout: default_connect_timeout(),
            keepalive: default_keepalive(),
            request_timeout: default_request_timeout(),
            nodelay: true,
        }
    }
}

/// One backend node.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Scheme used to reach the node
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Host and port, unique across nodes
    pub address: String,

    /// Declared scheduling weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u64>,

    /// Node version
    #[serde(default)]
    pub version: String,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl NodeConfig {
    /// Convert to a selector node.
    ///
    /// An explicit `weight` wins over a `weight` metadata key.
    pub fn to_node(&self) -> Node {
        let mut node = Node::from_metadata(&self.scheme, &self.address, self.metadata.clone());
        if let Some(weight) = self.weight {
            node = node.with_weight(weight);
        }
        if !self.version.is_empty() {
            node = node.with_version(&self.version);
        }
        node
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_decay() -> f64 {
    0.9
}

fn default_error_penalty() -> f64 {
    2.0
}

fn default_initial_latency() -> Duration {
    Duration::from_millis(10)
}

fn default_force_pick() -> Duration {
    Duration::from_secs(3)
}

fn default_max_idle_per_host() -> usize {
    100
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_keepalive() -> Option<Duration> {
    Some(Duration::from_secs(5))
}

fn default_request_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30))
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Custom serde module for optional humantime durations.
mod option_humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => {
                let s = humantime::format_duration(*d).to_string();
                serializer.serialize_some(&s)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
