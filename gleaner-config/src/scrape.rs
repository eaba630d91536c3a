use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, RelabelConfig};

/// URL scheme used to reach a target or sink.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Returns the scheme as it appears in URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Returns the port implied by the scheme.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scrape job.
///
/// Every target assigned to this job is scraped with the same interval, timeout and relabel
/// rules.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Name of the job, attached to every scraped series as `job`.
    pub job_name: String,
    /// Scheme used to reach targets.
    ///
    /// Defaults to `http`.
    pub scheme: Scheme,
    /// HTTP path to scrape.
    ///
    /// Defaults to `/metrics`.
    pub metrics_path: String,
    /// Seconds between the start of two consecutive scrapes.
    ///
    /// Defaults to `30`.
    pub scrape_interval: u64,
    /// Seconds after which a scrape is abandoned and reported as failed.
    ///
    /// Defaults to `10`.
    pub scrape_timeout: u64,
    /// When `true`, labels exposed by the target win over target labels on collision.
    pub honor_labels: bool,
    /// Maximum number of samples accepted per scrape. `0` disables the limit.
    pub sample_limit: u64,
    /// Relabel rules applied to every scraped sample.
    pub metric_relabel_configs: Vec<RelabelConfig>,
    /// Labels attached to every series of this job, in declaration order.
    pub external_labels: IndexMap<String, String>,
    /// Query parameters appended to the scrape path.
    pub params: BTreeMap<String, Vec<String>>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            job_name: String::new(),
            scheme: Scheme::Http,
            metrics_path: "/metrics".to_owned(),
            scrape_interval: 30,
            scrape_timeout: 10,
            honor_labels: false,
            sample_limit: 0,
            metric_relabel_configs: Vec::new(),
            external_labels: IndexMap::new(),
            params: BTreeMap::new(),
        }
    }
}

impl ScrapeConfig {
    /// Checks the job for values that cannot be scheduled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_name.is_empty() {
            return Err(ConfigError::MissingValue("job_name"));
        }
        if self.scrape_interval == 0 {
            return Err(ConfigError::invalid(
                "scrape_interval",
                "must be greater than zero",
            ));
        }
        if self.scrape_timeout == 0 {
            return Err(ConfigError::invalid(
                "scrape_timeout",
                "must be greater than zero",
            ));
        }
        if self.scrape_timeout > self.scrape_interval {
            return Err(ConfigError::invalid(
                "scrape_timeout",
                format!(
                    "{}s exceeds the scrape interval of {}s",
                    self.scrape_timeout, self.scrape_interval
                ),
            ));
        }
        if !self.metrics_path.starts_with('/') {
            return Err(ConfigError::invalid("metrics_path", "must start with `/`"));
        }
        Ok(())
    }

    /// Returns the scrape interval.
    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval)
    }

    /// Returns the scrape timeout.
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout)
    }

    /// Returns the request path including the encoded query parameters.
    pub fn scrape_path(&self) -> String {
        if self.params.is_empty() {
            return self.metrics_path.clone();
        }

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.params {
            for value in values {
                query.append_pair(key, value);
            }
        }

        format!("{}?{}", self.metrics_path, query.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(value: serde_json::Value) -> ScrapeConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = job(serde_json::json!({"job_name": "node"}));

        assert_eq!(config.scheme, Scheme::Http);
        assert_eq!(config.scrape_path(), "/metrics");
        assert_eq!(config.scrape_interval(), Duration::from_secs(30));
        assert_eq!(config.scrape_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scrape_path_with_params() {
        let config = job(serde_json::json!({
            "job_name": "federate",
            "metrics_path": "/federate",
            "params": {"match[]": ["{job=\"node\"}", "up"]},
        }));

        assert_eq!(
            config.scrape_path(),
            "/federate?match%5B%5D=%7Bjob%3D%22node%22%7D&match%5B%5D=up"
        );
    }

    #[test]
    fn test_external_labels_keep_order() {
        let config = job(serde_json::json!({
            "job_name": "node",
            "external_labels": {"zone": "b", "cluster": "a"},
        }));

        let keys: Vec<_> = config.external_labels.keys().collect();
        assert_eq!(keys, ["zone", "cluster"]);
    }

    #[test]
    fn test_validation() {
        let missing = job(serde_json::json!({}));
        insta::assert_snapshot!(missing.validate().unwrap_err(), @"missing config value `job_name`");

        let zero = job(serde_json::json!({"job_name": "a", "scrape_interval": 0}));
        insta::assert_snapshot!(zero.validate().unwrap_err(), @"invalid config value for `scrape_interval`: must be greater than zero");

        let slow = job(serde_json::json!({"job_name": "a", "scrape_interval": 5, "scrape_timeout": 6}));
        insta::assert_snapshot!(slow.validate().unwrap_err(), @"invalid config value for `scrape_timeout`: 6s exceeds the scrape interval of 5s");

        let path = job(serde_json::json!({"job_name": "a", "metrics_path": "metrics"}));
        insta::assert_snapshot!(path.validate().unwrap_err(), @"invalid config value for `metrics_path`: must start with `/`");
    }
}
