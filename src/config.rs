//! Connector configuration
//!
//! The configuration bundle the host framework hands to the engine:
//! credentials, the start-date floor for incremental streams, and the
//! per-connector flags. Parsing the host's config file format is the
//! host's concern; this module only validates the resulting bundle.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

fn default_api_version() -> String {
    "v11.0".to_string()
}

fn default_page_size() -> u32 {
    100
}

/// Configuration bundle for one connector run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Access token / API key for the provider
    pub access_token: String,

    /// Start-date floor for incremental streams (ISO date, `YYYY-MM-DD`)
    pub start_date: String,

    /// Include historically deleted/archived objects
    #[serde(default)]
    pub include_deleted: bool,

    /// Use the provider's sandbox environment
    #[serde(default)]
    pub is_sandbox: bool,

    /// Provider API version string
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl ConnectorConfig {
    /// Create a config with defaults for the optional flags
    pub fn new(access_token: impl Into<String>, start_date: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            start_date: start_date.into(),
            include_deleted: false,
            is_sandbox: false,
            api_version: default_api_version(),
            page_size: default_page_size(),
        }
    }

    /// Set the include-deleted flag
    #[must_use]
    pub fn with_include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    /// Set the sandbox flag
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.is_sandbox = sandbox;
        self
    }

    /// Set the API version string
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Validate required fields and formats
    pub fn validate(&self) -> Result<()> {
        if self.access_token.is_empty() {
            return Err(Error::missing_field("access_token"));
        }
        if self.start_date.is_empty() {
            return Err(Error::missing_field("start_date"));
        }
        self.start_floor()?;
        if self.page_size == 0 {
            return Err(Error::invalid_config("page_size", "must be nonzero"));
        }
        Ok(())
    }

    /// The start-date floor as a UTC instant (midnight of the configured date)
    pub fn start_floor(&self) -> Result<DateTime<Utc>> {
        let date = NaiveDate::parse_from_str(&self.start_date, "%Y-%m-%d")
            .map_err(|e| Error::invalid_config("start_date", format!("expected YYYY-MM-DD: {e}")))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::invalid_config("start_date", "not a valid date"))?;
        Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_config_defaults() {
        let config = ConnectorConfig::new("token", "2021-01-01");
        assert!(!config.include_deleted);
        assert!(!config.is_sandbox);
        assert_eq!(config.page_size, 100);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_from_json() {
        let config: ConnectorConfig = serde_json::from_str(
            r#"{ "access_token": "t", "start_date": "2021-06-14", "include_deleted": true }"#,
        )
        .unwrap();
        assert!(config.include_deleted);
        assert_eq!(config.api_version, "v11.0");
        config.validate().unwrap();
    }

    #[test]
    fn test_start_floor() {
        let config = ConnectorConfig::new("token", "2021-01-05");
        let floor = config.start_floor().unwrap();
        assert_eq!(floor.year(), 2021);
        assert_eq!(floor.month(), 1);
        assert_eq!(floor.day(), 5);
    }

    #[test]
    fn test_validation_errors() {
        let config = ConnectorConfig::new("", "2021-01-01");
        assert!(matches!(
            config.validate(),
            Err(Error::MissingConfigField { .. })
        ));

        let config = ConnectorConfig::new("token", "01/05/2021");
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfigValue { .. })
        ));
    }
}
