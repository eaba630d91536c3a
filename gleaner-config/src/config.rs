use std::collections::BTreeMap;

use gleaner_log::LogConfig;
use serde::{Deserialize, Serialize};

use crate::{EventPoolConfig, RemoteWriteConfig, ScrapeConfig};

/// Indicates a configuration that could not be loaded or failed validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Parsing JSON failed.
    #[error("could not parse json config")]
    BadJson(#[source] serde_json::Error),
    /// Parsing YAML failed.
    #[error("could not parse yaml config")]
    BadYaml(#[source] serde_yaml::Error),
    /// A value is present but not acceptable.
    #[error("invalid config value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Human readable explanation.
        reason: String,
    },
    /// A required value is missing or empty.
    #[error("missing config value `{0}`")]
    MissingValue(&'static str),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Controls self-monitoring through statsd.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`, which disables self-monitoring.
    pub statsd: Option<String>,
    /// Common prefix that is added to all metrics.
    ///
    /// Defaults to `"gleaner"`.
    pub prefix: String,
    /// Default tags to apply to all metrics.
    pub default_tags: BTreeMap<String, String>,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    ///
    /// Defaults to `1.0` (100%).
    pub sample_rate: f64,
    /// Aggregate counters and gauges locally before sending them.
    ///
    /// Defaults to `true`.
    pub aggregate: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            statsd: None,
            prefix: "gleaner".to_owned(),
            default_tags: BTreeMap::new(),
            sample_rate: 1.0,
            aggregate: true,
        }
    }
}

/// Aggregated pipeline configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    logging: LogConfig,
    metrics: MetricsConfig,
    event_pool: EventPoolConfig,
    scrape_configs: Vec<ScrapeConfig>,
    remote_write: Option<RemoteWriteConfig>,
}

impl Config {
    /// Loads and validates a configuration from a JSON value.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value).map_err(ConfigError::BadJson)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a YAML document.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s).map_err(ConfigError::BadYaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.metrics.sample_rate) {
            return Err(ConfigError::invalid(
                "sample_rate",
                "must be between 0.0 and 1.0",
            ));
        }

        self.event_pool.validate()?;

        for scrape_config in &self.scrape_configs {
            scrape_config.validate()?;
        }

        let mut job_names: Vec<&str> = self
            .scrape_configs
            .iter()
            .map(|c| c.job_name.as_str())
            .collect();
        job_names.sort_unstable();
        if let Some(pair) = job_names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ConfigError::invalid(
                "job_name",
                format!("duplicate job `{}`", pair[0]),
            ));
        }

        if let Some(ref remote_write) = self.remote_write {
            remote_write.validate()?;
        }

        Ok(())
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.logging
    }

    /// Returns the self-monitoring configuration.
    pub fn metrics(&self) -> &MetricsConfig {
        &self.metrics
    }

    /// Returns the event pool configuration.
    pub fn event_pool(&self) -> &EventPoolConfig {
        &self.event_pool
    }

    /// Returns all configured scrape jobs.
    pub fn scrape_configs(&self) -> &[ScrapeConfig] {
        &self.scrape_configs
    }

    /// Returns the remote-write sink, if configured.
    pub fn remote_write(&self) -> Option<&RemoteWriteConfig> {
        self.remote_write.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_json_value(serde_json::json!({})).unwrap();

        assert!(config.scrape_configs().is_empty());
        assert!(config.remote_write().is_none());
        assert_eq!(config.metrics(), &MetricsConfig::default());
        assert!(config.event_pool().enable_lock);
    }

    #[test]
    fn test_full_yaml() {
        let config = Config::from_yaml_str(
            r#"
logging:
  level: debug
metrics:
  statsd: "127.0.0.1:8125"
  sample_rate: 0.5
event_pool:
  enable_lock: false
  gc_interval: 30
scrape_configs:
  - job_name: node
    scrape_interval: 15
    scrape_timeout: 5
    honor_labels: true
    metric_relabel_configs:
      - source_labels: [__name__]
        regex: "go_.*"
        action: drop
remote_write:
  Endpoint: example.com
  Scheme: https
  UserId: "1"
  ClusterId: c1
  Region: r1
"#,
        )
        .unwrap();

        assert_eq!(config.metrics().statsd.as_deref(), Some("127.0.0.1:8125"));
        assert!(!config.event_pool().enable_lock);
        assert_eq!(config.scrape_configs()[0].metric_relabel_configs.len(), 1);
        assert_eq!(
            config.remote_write().unwrap().remote_write_path(),
            "/prometheus/1/c1/r1/api/v2/write"
        );
    }

    #[test]
    fn test_bad_sample_rate() {
        let err = Config::from_json_value(serde_json::json!({
            "metrics": {"sample_rate": 2.0}
        }))
        .unwrap_err();

        insta::assert_snapshot!(err, @"invalid config value for `sample_rate`: must be between 0.0 and 1.0");
    }

    #[test]
    fn test_duplicate_jobs() {
        let err = Config::from_json_value(serde_json::json!({
            "scrape_configs": [{"job_name": "a"}, {"job_name": "a"}]
        }))
        .unwrap_err();

        insta::assert_snapshot!(err, @"invalid config value for `job_name`: duplicate job `a`");
    }

    #[test]
    fn test_invalid_yaml() {
        let err = Config::from_yaml_str("scrape_configs: 12").unwrap_err();
        assert!(matches!(err, ConfigError::BadYaml(_)));
    }
}
