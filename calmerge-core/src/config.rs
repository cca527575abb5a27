//! Service configuration.

use std::path::Path;

use chrono_tz::Tz;
use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::aggregate::SourceFailurePolicy;
use crate::cache::DEFAULT_CAPACITY;
use crate::error::{CalMergeError, CalMergeResult};
use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use crate::split::SplittingStrategy;

/// Environment variable holding a JSON list that replaces `calendar_urls`.
pub const CALENDAR_URLS_ENV: &str = "CALENDAR_URLS";

fn default_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_fetch_timeout_seconds() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

/// Largest accepted `days_limit` (about ten years).
pub const MAX_DAYS_LIMIT: u32 = 3660;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Configuration read from config.yaml
#[derive(Debug, Clone, Deserialize)]
pub struct MergerConfig {
    /// Calendar sources: URLs or local file paths
    pub calendar_urls: Vec<String>,

    pub cache_expiration_minutes: u64,

    /// IANA name of the timezone output events are expressed in
    pub local_timezone: String,

    /// Number of days, starting today, to include
    pub days_limit: u32,

    pub merge_overlapping_events: bool,

    pub event_splitting_strategy: SplittingStrategy,

    /// Display name of the merged calendar
    pub calendar_name: String,

    /// SUMMARY given to every merged event
    pub busy_events_summary: String,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,

    #[serde(default)]
    pub source_failure_policy: SourceFailurePolicy,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl MergerConfig {
    /// Load a YAML config file and apply the `CALENDAR_URLS` override.
    pub fn load(path: &Path) -> CalMergeResult<Self> {
        if !path.exists() {
            return Err(CalMergeError::Config(format!(
                "Config file not found at {}",
                path.display()
            )));
        }

        let mut config = Self::build(File::from(path).format(FileFormat::Yaml))?;
        config.apply_calendar_urls_override(std::env::var(CALENDAR_URLS_ENV).ok().as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text, without environment overrides.
    pub fn from_yaml_str(yaml: &str) -> CalMergeResult<Self> {
        let config = Self::build(File::from_str(yaml, FileFormat::Yaml))?;
        config.validate()?;
        Ok(config)
    }

    fn build<T>(source: T) -> CalMergeResult<Self>
    where
        T: config::Source + Send + Sync + 'static,
    {
        Config::builder()
            .add_source(source)
            .build()
            .map_err(|e| CalMergeError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalMergeError::Config(e.to_string()))
    }

    /// Replace `calendar_urls` with a JSON-encoded list, if one is given.
    pub fn apply_calendar_urls_override(&mut self, value: Option<&str>) -> CalMergeResult<()> {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
            return Ok(());
        };

        self.calendar_urls = serde_json::from_str(value).map_err(|e| {
            CalMergeError::Config(format!("{} must be a JSON list of strings: {e}", CALENDAR_URLS_ENV))
        })?;
        Ok(())
    }

    pub fn timezone(&self) -> CalMergeResult<Tz> {
        self.local_timezone
            .parse()
            .map_err(|_| CalMergeError::InvalidTimezone(self.local_timezone.clone()))
    }

    fn validate(&self) -> CalMergeResult<()> {
        self.timezone()?;
        if self.days_limit == 0 {
            return Err(CalMergeError::Config("days_limit must be positive".into()));
        }
        if self.days_limit > MAX_DAYS_LIMIT {
            return Err(CalMergeError::Config(format!(
                "days_limit must be at most {}",
                MAX_DAYS_LIMIT
            )));
        }
        if self.fetch_timeout_seconds == 0 {
            return Err(CalMergeError::Config(
                "fetch_timeout_seconds must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
calendar_urls:
  - https://example.com/work.ics
  - ./home.ics
cache_expiration_minutes: 15
local_timezone: Europe/Berlin
days_limit: 30
merge_overlapping_events: true
event_splitting_strategy: split_and_adjust
calendar_name: My busy times
busy_events_summary: Busy
"#;

    #[test]
    fn test_load_minimal_config_with_defaults() {
        let config = MergerConfig::from_yaml_str(MINIMAL).unwrap();

        assert_eq!(config.calendar_urls.len(), 2);
        assert_eq!(config.cache_expiration_minutes, 15);
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Berlin);
        assert_eq!(config.days_limit, 30);
        assert!(config.merge_overlapping_events);
        assert_eq!(
            config.event_splitting_strategy,
            SplittingStrategy::SplitAndAdjust
        );
        assert_eq!(config.calendar_name, "My busy times");
        assert_eq!(config.busy_events_summary, "Busy");
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.fetch_timeout_seconds, 10);
        assert_eq!(config.source_failure_policy, SourceFailurePolicy::Fail);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_optional_keys_override_defaults() {
        let yaml = format!(
            "{}cache_capacity: 5\nfetch_timeout_seconds: 3\nsource_failure_policy: skip\nport: 9090\n",
            MINIMAL
        );

        let config = MergerConfig::from_yaml_str(&yaml).unwrap();

        assert_eq!(config.cache_capacity, 5);
        assert_eq!(config.fetch_timeout_seconds, 3);
        assert_eq!(config.source_failure_policy, SourceFailurePolicy::Skip);
        assert_eq!(config.port, 9090);
    }

    #[test]
    fn test_missing_required_key_is_config_error() {
        let yaml = MINIMAL.replace("days_limit: 30\n", "");

        let result = MergerConfig::from_yaml_str(&yaml);

        assert!(matches!(result, Err(CalMergeError::Config(_))));
    }

    #[test]
    fn test_days_limit_bounds() {
        for days in ["0", "200000000"] {
            let yaml = MINIMAL.replace("days_limit: 30", &format!("days_limit: {}", days));

            let result = MergerConfig::from_yaml_str(&yaml);

            assert!(matches!(result, Err(CalMergeError::Config(_))), "days_limit {}", days);
        }

        let yaml = MINIMAL.replace("days_limit: 30", &format!("days_limit: {}", MAX_DAYS_LIMIT));
        assert!(MergerConfig::from_yaml_str(&yaml).is_ok());
    }

    #[test]
    fn test_invalid_timezone_is_rejected() {
        let yaml = MINIMAL.replace("Europe/Berlin", "Mars/Olympus_Mons");

        let result = MergerConfig::from_yaml_str(&yaml);

        assert!(matches!(result, Err(CalMergeError::InvalidTimezone(_))));
    }

    #[test]
    fn test_calendar_urls_override() {
        let mut config = MergerConfig::from_yaml_str(MINIMAL).unwrap();

        config
            .apply_calendar_urls_override(Some(r#"["https://a.example/x.ics", "/srv/y.ics"]"#))
            .unwrap();

        assert_eq!(
            config.calendar_urls,
            vec!["https://a.example/x.ics".to_string(), "/srv/y.ics".to_string()]
        );
    }

    #[test]
    fn test_calendar_urls_override_absent_or_invalid() {
        let mut config = MergerConfig::from_yaml_str(MINIMAL).unwrap();

        config.apply_calendar_urls_override(None).unwrap();
        assert_eq!(config.calendar_urls.len(), 2);

        let result = config.apply_calendar_urls_override(Some("https://not-json.example"));
        assert!(matches!(result, Err(CalMergeError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = MergerConfig::load(&path).unwrap();

        assert_eq!(config.calendar_name, "My busy times");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();

        let result = MergerConfig::load(&dir.path().join("absent.yaml"));

        assert!(matches!(result, Err(CalMergeError::Config(_))));
    }
}
