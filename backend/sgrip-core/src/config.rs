// src/config.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::imputation::HourPolicy;

pub const ENV_PREFIX: &str = "SGRIP_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server settings, read from `SGRIP_*` variables (a `.env` file is honoured).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// TLS is enabled only when both paths are set.
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
    #[serde(default = "default_max_daily_hours")]
    pub max_daily_hours: Decimal,
    #[serde(default = "default_hour_step")]
    pub hour_step: Decimal,
    #[serde(default = "default_reminder_interval")]
    pub reminder_interval_secs: u64,
    /// UTC hour from which the Monday reminder goes out.
    #[serde(default = "default_reminder_hour")]
    pub reminder_hour: u32,
    pub webhook_url: Option<String>,
    #[serde(default = "default_chart_scale")]
    pub chart_scale: f32,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/sgrip.json")
}

fn default_snapshot_interval() -> u64 {
    60
}

fn default_max_daily_hours() -> Decimal {
    dec!(24)
}

fn default_hour_step() -> Decimal {
    dec!(0.25)
}

fn default_reminder_interval() -> u64 {
    900
}

fn default_reminder_hour() -> u32 {
    9
}

fn default_chart_scale() -> f32 {
    2.0
}

impl AppConfig {
    /// Reads `SGRIP_*` variables. `.env` is loaded once by `main` before this runs.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = envy::prefixed(ENV_PREFIX).from_env::<AppConfig>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cert_path.is_some() != self.key_path.is_some() {
            return Err(ConfigError::Invalid(
                "SGRIP_CERT_PATH and SGRIP_KEY_PATH must be set together".to_string(),
            ));
        }
        if self.max_daily_hours <= Decimal::ZERO || self.max_daily_hours > dec!(24) {
            return Err(ConfigError::Invalid(format!(
                "max_daily_hours must be in (0, 24], got {}",
                self.max_daily_hours
            )));
        }
        if self.hour_step <= Decimal::ZERO || self.hour_step > Decimal::ONE {
            return Err(ConfigError::Invalid(format!(
                "hour_step must be in (0, 1], got {}",
                self.hour_step
            )));
        }
        if self.reminder_hour > 23 {
            return Err(ConfigError::Invalid(format!(
                "reminder_hour must be 0-23, got {}",
                self.reminder_hour
            )));
        }
        if self.snapshot_interval_secs == 0 || self.reminder_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "intervals must be at least one second".to_string(),
            ));
        }
        if !(0.5..=4.0).contains(&self.chart_scale) {
            return Err(ConfigError::Invalid(format!(
                "chart_scale must be between 0.5 and 4, got {}",
                self.chart_scale
            )));
        }
        if let Some(raw) = &self.webhook_url {
            let url = Url::parse(raw)
                .map_err(|e| ConfigError::Invalid(format!("webhook_url {}: {}", raw, e)))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Invalid(format!(
                    "webhook_url must be http(s), got {}",
                    url.scheme()
                )));
            }
        }
        Ok(())
    }

    pub fn hour_policy(&self) -> HourPolicy {
        HourPolicy {
            step: self.hour_step,
            max_daily_hours: self.max_daily_hours,
            ..HourPolicy::default()
        }
    }

    pub fn tls_paths(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.cert_path.as_ref().zip(self.key_path.as_ref())
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let config = envy::prefixed(ENV_PREFIX).from_iter::<_, AppConfig>(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.bind_addr, default_bind_addr());
        assert_eq!(config.data_path, PathBuf::from("data/sgrip.json"));
        assert_eq!(config.reminder_hour, 9);
        assert!(config.tls_paths().is_none());
        assert_eq!(config.hour_policy(), HourPolicy::default());
    }

    #[test]
    fn prefixed_variables_override_defaults() {
        let config = from_pairs(&[
            ("SGRIP_BIND_ADDR", "0.0.0.0:8443"),
            ("SGRIP_CERT_PATH", "/etc/sgrip/cert.pem"),
            ("SGRIP_KEY_PATH", "/etc/sgrip/key.pem"),
            ("SGRIP_MAX_DAILY_HOURS", "10"),
            ("SGRIP_HOUR_STEP", "0.5"),
            ("SGRIP_WEBHOOK_URL", "https://hooks.example.com/sgrip"),
            ("OTHER_VAR", "ignored"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8443);
        assert!(config.tls_paths().is_some());
        let policy = config.hour_policy();
        assert_eq!(policy.max_daily_hours, dec!(10));
        assert_eq!(policy.step, dec!(0.5));
        assert_eq!(policy.max_cell_hours, dec!(24));
    }

    #[test]
    fn inconsistent_settings_are_rejected() {
        assert!(matches!(
            from_pairs(&[("SGRIP_CERT_PATH", "/etc/sgrip/cert.pem")]),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            from_pairs(&[("SGRIP_REMINDER_HOUR", "25")]),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            from_pairs(&[("SGRIP_WEBHOOK_URL", "ftp://example.com")]),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            from_pairs(&[("SGRIP_MAX_DAILY_HOURS", "30")]),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            from_pairs(&[("SGRIP_REMINDER_HOUR", "nine")]),
            Err(ConfigError::Env(_))
        ));
    }
}
