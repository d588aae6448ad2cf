use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_KINDWISE_API_URL: &str = "https://crop.kindwise.com/api/v1/identification";
const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_NOTIFY_TOPIC: &str = "agrisense/user/report_ready";
const DEFAULT_JOB_RECORD_LIMIT: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub hostname: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub kindwise_api_key: Option<String>,
    pub kindwise_api_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_api_url: String,
    pub gemini_model: String,
    pub mqtt: Option<MqttConfig>,
    pub notify_topic: String,
    pub upload_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub s3_bucket: Option<String>,
    pub fonts_dir: PathBuf,
    pub locales_config: Option<PathBuf>,
    pub sweep_max_age: Option<Duration>,
    pub job_record_limit: usize,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let mqtt = match get("MQTT_HOSTNAME") {
            Some(hostname) => Some(MqttConfig {
                hostname,
                port: parse_or("MQTT_PORT", get("MQTT_PORT"), 8883)?,
                username: get("MQTT_USERNAME"),
                password: get("MQTT_PASSWORD"),
                use_tls: parse_or("MQTT_USE_TLS", get("MQTT_USE_TLS"), true)?,
            }),
            None => None,
        };

        let sweep_max_age = match get("SWEEP_MAX_AGE_HOURS") {
            Some(raw) => {
                let hours: u64 = parse_value("SWEEP_MAX_AGE_HOURS", &raw)?;
                let secs = hours.checked_mul(3600).ok_or(ConfigError::Invalid {
                    key: "SWEEP_MAX_AGE_HOURS",
                    message: format!("{hours} hours is out of range"),
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            kindwise_api_key: get("KINDWISE_API_KEY"),
            kindwise_api_url: or_default("KINDWISE_API_URL", DEFAULT_KINDWISE_API_URL),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_api_url: or_default("GEMINI_API_URL", DEFAULT_GEMINI_API_URL),
            gemini_model: or_default("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            mqtt,
            notify_topic: or_default("NOTIFY_TOPIC", DEFAULT_NOTIFY_TOPIC),
            upload_dir: PathBuf::from(or_default("UPLOAD_DIR", "temp_uploads")),
            reports_dir: PathBuf::from(or_default("REPORTS_DIR", "reports")),
            s3_bucket: get("S3_BUCKET_NAME"),
            fonts_dir: PathBuf::from(or_default("FONTS_DIR", "fonts")),
            locales_config: get("LOCALES_CONFIG").map(PathBuf::from),
            sweep_max_age,
            job_record_limit: parse_or(
                "JOB_RECORD_LIMIT",
                get("JOB_RECORD_LIMIT"),
                DEFAULT_JOB_RECORD_LIMIT,
            )?,
            port: parse_or("PORT", get("PORT"), 8081)?,
        })
    }

    pub fn api_keys_configured(&self) -> bool {
        self.kindwise_api_key.is_some() && self.gemini_api_key.is_some()
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: format!("'{}': {}", raw, e),
    })
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.kindwise_api_url, DEFAULT_KINDWISE_API_URL);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.notify_topic, DEFAULT_NOTIFY_TOPIC);
        assert_eq!(config.port, 8081);
        assert!(config.mqtt.is_none());
        assert!(config.sweep_max_age.is_none());
        assert_eq!(config.job_record_limit, 10_000);
        assert!(!config.api_keys_configured());
    }

    #[test]
    fn mqtt_block_requires_hostname() {
        let config = config_from(&[("MQTT_PORT", "1883")]).unwrap();
        assert!(config.mqtt.is_none());

        let config = config_from(&[
            ("MQTT_HOSTNAME", "broker.local"),
            ("MQTT_USE_TLS", "false"),
            ("MQTT_USERNAME", "rover"),
        ])
        .unwrap();
        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.port, 8883);
        assert!(!mqtt.use_tls);
        assert_eq!(mqtt.username.as_deref(), Some("rover"));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = config_from(&[("KINDWISE_API_KEY", "  "), ("S3_BUCKET_NAME", "")]).unwrap();
        assert!(config.kindwise_api_key.is_none());
        assert!(config.s3_bucket.is_none());
    }

    #[test]
    fn unparseable_numbers_are_errors() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn sweep_age_is_in_hours() {
        let config = config_from(&[("SWEEP_MAX_AGE_HOURS", "48")]).unwrap();
        assert_eq!(config.sweep_max_age, Some(Duration::from_secs(48 * 3600)));
    }

    #[test]
    fn oversized_sweep_age_is_rejected() {
        let err = config_from(&[("SWEEP_MAX_AGE_HOURS", "18446744073709551615")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "SWEEP_MAX_AGE_HOURS",
                ..
            }
        ));
    }
}
