use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const TIMELINE_JSON: &str = "timeline.json";
const SUPPORTED_SCHEMA: u64 = 1;
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3/";
const MAX_PAGE_SIZE: u32 = 2500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineConfig {
    pub schema: u8,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    pub source: SourceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    #[serde(rename_all = "camelCase")]
    Local { events_path: PathBuf },
    #[serde(rename_all = "camelCase")]
    Remote {
        #[serde(default = "default_calendar_id")]
        calendar_id: String,
        #[serde(default = "default_api_base_url")]
        api_base_url: String,
        #[serde(default = "default_page_size")]
        page_size: u32,
        #[serde(default = "default_color_token")]
        color_token: String,
        access_token_env: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl TimelineConfig {
    pub fn timezone(&self) -> Result<Tz, InfraError> {
        self.timezone.trim().parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("unknown timezone '{}': {error}", self.timezone))
        })
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn validate(&self) -> Result<(), InfraError> {
        self.timezone()?;
        if self.settle_delay_ms == 0 {
            return Err(InfraError::InvalidConfig(
                "settleDelayMs must be > 0".to_string(),
            ));
        }
        match &self.source {
            SourceConfig::Local { events_path } => {
                if events_path.as_os_str().is_empty() {
                    return Err(InfraError::InvalidConfig(
                        "source.eventsPath must not be empty".to_string(),
                    ));
                }
            }
            SourceConfig::Remote {
                calendar_id,
                api_base_url,
                page_size,
                access_token_env,
                ..
            } => {
                if calendar_id.trim().is_empty() {
                    return Err(InfraError::InvalidConfig(
                        "source.calendarId must not be empty".to_string(),
                    ));
                }
                url::Url::parse(api_base_url).map_err(|error| {
                    InfraError::InvalidConfig(format!("invalid source.apiBaseUrl '{api_base_url}': {error}"))
                })?;
                if *page_size == 0 || *page_size > MAX_PAGE_SIZE {
                    return Err(InfraError::InvalidConfig(format!(
                        "source.pageSize must be within 1..={MAX_PAGE_SIZE}"
                    )));
                }
                if access_token_env.trim().is_empty() {
                    return Err(InfraError::InvalidConfig(
                        "source.accessTokenEnv must not be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_settle_delay_ms() -> u64 {
    350
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_page_size() -> u32 {
    250
}

fn default_color_token() -> String {
    "remote".to_string()
}

fn default_file() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "timezone": "UTC",
        "settleDelayMs": 350,
        "source": {
            "kind": "local",
            "eventsPath": "events.json"
        },
        "retry": {
            "maxAttempts": 3,
            "baseDelayMs": 200
        }
    })
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(TIMELINE_JSON)
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    fs::create_dir_all(config_dir)?;
    let path = config_path(config_dir);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_file())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Loads and validates `timeline.json`. A relative `eventsPath` is resolved
/// against `config_dir`.
pub fn load_config(config_dir: &Path) -> Result<TimelineConfig, InfraError> {
    let path = config_path(config_dir);
    let value = read_config(&path)?;
    let mut config: TimelineConfig = serde_json::from_value(value).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid {}: {error}", path.display()))
    })?;
    if let SourceConfig::Local { events_path } = &mut config.source {
        if events_path.is_relative() {
            *events_path = config_dir.join(&*events_path);
        }
    }
    config.validate()?;
    Ok(config)
}
