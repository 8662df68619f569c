use anyhow::Result;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: General,
    pub source: Source,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    pub refresh: Refresh,
    pub observability: Observability,
    pub web: Option<Web>,
}

#[derive(Debug, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    /// Filesystem path for `file`, absolute URL for `http`.
    pub location: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    15
}

/// How an address inherits a risk category from the records that name it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressRiskPolicy {
    /// Risk of the first record naming the address.
    #[default]
    FirstSeen,
    /// Riskiest record naming the address (category, then score).
    MaxOverTransactions,
    /// Risk of the last record naming the address.
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub risk_policy: AddressRiskPolicy,
    pub high_volume_threshold: u64,
    pub recent_limit: usize,
    pub top_risk_limit: usize,
    pub activity_limit: usize,
    pub top_addresses_limit: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            risk_policy: AddressRiskPolicy::FirstSeen,
            high_volume_threshold: 50,
            recent_limit: 10,
            top_risk_limit: 25,
            activity_limit: 5,
            top_addresses_limit: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Refresh {
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Observability {
    pub prometheus_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Web {
    pub port: u16,
    pub host: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = std::env::var("CHAINQUASAR_CONFIG")
            .unwrap_or_else(|_| "config/default.toml".to_string());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
