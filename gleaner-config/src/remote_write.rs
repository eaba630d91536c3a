use serde::{Deserialize, Serialize};

use crate::{ConfigError, Scheme};

/// Destination of serialized remote-write requests.
///
/// Field names follow the agent's plugin configuration, for example:
///
/// ```json
/// {
///   "Endpoint": "cn-hangzhou.example.com",
///   "Scheme": "https",
///   "UserId": "1234",
///   "ClusterId": "c-abc",
///   "Region": "cn-hangzhou"
/// }
/// ```
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteWriteConfig {
    /// Host name of the remote-write endpoint, without scheme or path.
    pub endpoint: String,
    /// Scheme used to reach the endpoint.
    pub scheme: Scheme,
    /// Tenant owning the written series.
    pub user_id: String,
    /// Cluster the series originate from.
    pub cluster_id: String,
    /// Region of the endpoint.
    pub region: String,
}

impl RemoteWriteConfig {
    /// Returns the request path for this tenant.
    pub fn remote_write_path(&self) -> String {
        format!(
            "/prometheus/{}/{}/{}/api/v2/write",
            self.user_id, self.cluster_id, self.region
        )
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("Endpoint", &self.endpoint),
            ("UserId", &self.user_id),
            ("ClusterId", &self.cluster_id),
            ("Region", &self.region),
        ] {
            if value.is_empty() {
                return Err(ConfigError::MissingValue(field));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_is_rejected() {
        let result = serde_json::from_value::<RemoteWriteConfig>(serde_json::json!({
            "Endpoint": "example.com",
            "Scheme": "https",
            "UserId": "1",
            "Region": "r1",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_non_string_field_is_rejected() {
        let result = serde_json::from_value::<RemoteWriteConfig>(serde_json::json!({
            "Endpoint": "example.com",
            "Scheme": "https",
            "UserId": 1,
            "ClusterId": "c1",
            "Region": "r1",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_field_fails_validation() {
        let config = RemoteWriteConfig {
            endpoint: "example.com".to_owned(),
            scheme: Scheme::Https,
            user_id: String::new(),
            cluster_id: "c1".to_owned(),
            region: "r1".to_owned(),
        };

        insta::assert_snapshot!(config.validate().unwrap_err(), @"missing config value `UserId`");
    }
}
