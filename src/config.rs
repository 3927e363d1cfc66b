use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};

use crate::error::DashboardError;

// ---------------------------------------------------------------------------
// Supabase
// ---------------------------------------------------------------------------

/// Connection settings for the hosted sensor store.
///
/// Values may be empty after loading; `validate` is called by the gateway
/// constructor so a missing key only disables the data sections.
#[derive(Debug, Clone, Default)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

impl SupabaseConfig {
    pub fn validate(&self) -> Result<(), DashboardError> {
        if self.url.trim().is_empty() {
            return Err(DashboardError::configuration("SUPABASE_URL is not set"));
        }
        if self.key.trim().is_empty() {
            return Err(DashboardError::configuration("SUPABASE_KEY is not set"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MQTT
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Topic the pump controller subscribes to.
    pub topic_pump_cmd: String,
    pub keep_alive: Duration,
    /// Upper bound on waiting for the broker's CONNACK.
    pub handshake_timeout: Duration,
    /// Pause after CONNACK before publishing.
    pub settle_delay: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: String::new(),
            port: 8883,
            user: String::new(),
            password: String::new(),
            topic_pump_cmd: DEFAULT_TOPIC_PUMP_CMD.to_owned(),
            keep_alive: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(200),
        }
    }
}

impl MqttConfig {
    /// Checked before any connection attempt.
    pub fn validate(&self) -> Result<(), DashboardError> {
        let missing: Vec<&str> = [
            ("MQTT_BROKER", &self.broker),
            ("MQTT_USER", &self.user),
            ("MQTT_PASS", &self.password),
            ("TOPIC_PUMP_CMD", &self.topic_pump_cmd),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DashboardError::configuration(format!(
                "MQTT settings incomplete, missing: {}",
                missing.join(", ")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Query sizing, cache lifetimes and display settings.
#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub latest_ttl: Duration,
    pub history_ttl: Duration,
    pub vision_ttl: Duration,
    /// Row cap for the windowed history query.
    pub history_limit: usize,
    /// Rows served when the history window is empty.
    pub history_fallback_limit: usize,
    /// Offset used when formatting timestamps for the operator.
    pub display_offset: FixedOffset,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            latest_ttl: Duration::from_secs(5),
            history_ttl: Duration::from_secs(10),
            vision_ttl: Duration::from_secs(10),
            history_limit: 5000,
            history_fallback_limit: 500,
            display_offset: offset_from_hours(7).unwrap_or_else(utc),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

pub const DEFAULT_TOPIC_PUMP_CMD: &str = "adikara-iot/actuator/pump_cmd";

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase: SupabaseConfig,
    pub mqtt: MqttConfig,
    pub dashboard: DashboardSettings,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    /// Reads every setting from the environment.
    ///
    /// Only malformed values fail here. Missing credentials are reported by
    /// the feature that needs them, so the dashboard still renders.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let utc_offset_hours: i32 = get("DISPLAY_UTC_OFFSET_HOURS", "7")
            .trim()
            .parse()
            .context("DISPLAY_UTC_OFFSET_HOURS must be an integer")?;

        Ok(Self {
            supabase: SupabaseConfig {
                url: get("SUPABASE_URL", "").trim().trim_end_matches('/').to_owned(),
                key: get("SUPABASE_KEY", ""),
            },
            mqtt: MqttConfig {
                broker: get("MQTT_BROKER", ""),
                port: get("MQTT_PORT", "8883")
                    .trim()
                    .parse()
                    .context("MQTT_PORT must be a valid port number")?,
                user: get("MQTT_USER", ""),
                password: get("MQTT_PASS", ""),
                topic_pump_cmd: get("TOPIC_PUMP_CMD", DEFAULT_TOPIC_PUMP_CMD),
                keep_alive: Duration::from_secs(30),
                handshake_timeout: Duration::from_secs(
                    parse_u64(&get("MQTT_HANDSHAKE_TIMEOUT_SECS", "5"), "MQTT_HANDSHAKE_TIMEOUT_SECS")?,
                ),
                settle_delay: Duration::from_millis(parse_u64(
                    &get("MQTT_SETTLE_MILLIS", "200"),
                    "MQTT_SETTLE_MILLIS",
                )?),
            },
            dashboard: DashboardSettings {
                latest_ttl: Duration::from_secs(parse_u64(
                    &get("LATEST_TTL_SECS", "5"),
                    "LATEST_TTL_SECS",
                )?),
                history_ttl: Duration::from_secs(parse_u64(
                    &get("HISTORY_TTL_SECS", "10"),
                    "HISTORY_TTL_SECS",
                )?),
                vision_ttl: Duration::from_secs(parse_u64(
                    &get("VISION_TTL_SECS", "10"),
                    "VISION_TTL_SECS",
                )?),
                history_limit: parse_u64(&get("HISTORY_LIMIT", "5000"), "HISTORY_LIMIT")? as usize,
                history_fallback_limit: parse_u64(
                    &get("HISTORY_FALLBACK_LIMIT", "500"),
                    "HISTORY_FALLBACK_LIMIT",
                )? as usize,
                display_offset: offset_from_hours(utc_offset_hours).with_context(|| {
                    format!("DISPLAY_UTC_OFFSET_HOURS out of range: {utc_offset_hours}")
                })?,
            },
            server_host: get("SERVER_HOST", "0.0.0.0"),
            server_port: get("SERVER_PORT", "8080")
                .trim()
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
        })
    }
}

fn parse_u64(raw: &str, key: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{key} must be a non-negative integer, got: {raw:?}"))
}

fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

fn utc() -> FixedOffset {
    Utc.fix()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let c = load(&[]).unwrap();
        assert_eq!(c.server_host, "0.0.0.0");
        assert_eq!(c.server_port, 8080);
        assert_eq!(c.mqtt.port, 8883);
        assert_eq!(c.mqtt.topic_pump_cmd, DEFAULT_TOPIC_PUMP_CMD);
        assert_eq!(c.dashboard.latest_ttl, Duration::from_secs(5));
        assert_eq!(c.dashboard.history_ttl, Duration::from_secs(10));
        assert_eq!(c.dashboard.history_limit, 5000);
        assert_eq!(c.dashboard.history_fallback_limit, 500);
        assert_eq!(c.dashboard.display_offset.local_minus_utc(), 7 * 3600);
    }

    #[test]
    fn missing_credentials_do_not_fail_loading() {
        let c = load(&[]).unwrap();
        assert!(matches!(
            c.supabase.validate(),
            Err(DashboardError::Configuration(_))
        ));
        assert!(matches!(c.mqtt.validate(), Err(DashboardError::Configuration(_))));
    }

    #[test]
    fn supabase_url_trailing_slash_is_trimmed() {
        let c = load(&[("SUPABASE_URL", "https://x.supabase.co/"), ("SUPABASE_KEY", "k")]).unwrap();
        assert_eq!(c.supabase.url, "https://x.supabase.co");
        assert!(c.supabase.validate().is_ok());
    }

    #[test]
    fn invalid_port_errors() {
        let err = load(&[("SERVER_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
    }

    #[test]
    fn custom_fallback_limit_is_read() {
        let c = load(&[("HISTORY_FALLBACK_LIMIT", "800")]).unwrap();
        assert_eq!(c.dashboard.history_fallback_limit, 800);
    }

    #[test]
    fn out_of_range_offset_errors() {
        let err = load(&[("DISPLAY_UTC_OFFSET_HOURS", "30")]).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn mqtt_validate_lists_every_missing_field() {
        let cfg = MqttConfig {
            broker: "broker.example".into(),
            ..MqttConfig::default()
        };
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("MQTT_USER"));
        assert!(err.contains("MQTT_PASS"));
        assert!(!err.contains("MQTT_BROKER"));
    }

    #[test]
    fn mqtt_validate_accepts_complete_settings() {
        let cfg = MqttConfig {
            broker: "broker.example".into(),
            user: "u".into(),
            password: "p".into(),
            ..MqttConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
