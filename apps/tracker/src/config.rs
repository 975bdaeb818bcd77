use std::env;
use std::time::Duration;

use crate::smtp::{Encryption, SmtpSettings};

#[derive(Clone, Debug)]
pub struct Config {
    pub firebase_url: String,
    pub firebase_secret: String,
    pub root_path: String,
    pub smtp: SmtpSettings,
    pub sender_email: String,
    pub sender_name: String,
    pub recipient_email: String,
    pub threshold_meters: f64,
    pub check_interval_secs: u32,
    pub poll_interval: Duration,
    pub gpsd_addr: String,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::MissingVar(key));

        let encryption: Encryption = var("SMTP_ENCRYPTION")
            .unwrap_or_else(|| "Tls".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue(format!("SMTP_ENCRYPTION: {}", e)))?;

        let username = var("SMTP_USERNAME").unwrap_or_default();
        let smtp = SmtpSettings {
            host: var("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port: parse_or(&var, "SMTP_PORT", 465)?,
            encryption,
            username: username.clone(),
            password: var("SMTP_PASSWORD").unwrap_or_default(),
            timeout: Duration::from_secs(parse_or(&var, "SMTP_TIMEOUT_SECS", 10)?),
        };

        let sender_email = match var("ALERT_SENDER_EMAIL") {
            Some(sender) => sender,
            None if !username.is_empty() => username,
            None => return Err(ConfigError::MissingVar("ALERT_SENDER_EMAIL")),
        };

        let threshold_meters: f64 = parse_or(&var, "DRIFT_THRESHOLD_METERS", 1.0)?;
        if !threshold_meters.is_finite() || threshold_meters < 0.0 {
            return Err(ConfigError::InvalidValue(
                "DRIFT_THRESHOLD_METERS".to_string(),
            ));
        }

        let check_interval_secs: u32 = parse_or(&var, "CHECK_INTERVAL_SECS", 30)?;
        if check_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("CHECK_INTERVAL_SECS".to_string()));
        }

        Ok(Config {
            firebase_url: required("FIREBASE_DATABASE_URL")?,
            firebase_secret: var("FIREBASE_DATABASE_SECRET").unwrap_or_default(),
            root_path: var("TRACKER_ROOT_PATH").unwrap_or_else(|| "/".to_string()),
            smtp,
            sender_email,
            sender_name: var("ALERT_SENDER_NAME").unwrap_or_else(|| "ESP Vehicle".to_string()),
            recipient_email: required("ALERT_RECIPIENT_EMAIL")?,
            threshold_meters,
            check_interval_secs,
            poll_interval: Duration::from_millis(parse_or(&var, "POLL_INTERVAL_MS", 250)?),
            gpsd_addr: var("GPSD_ADDR").unwrap_or_else(|| "127.0.0.1:2947".to_string()),
            http_timeout: Duration::from_secs(parse_or(&var, "HTTP_TIMEOUT_SECS", 10)?),
        })
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(var) => write!(f, "Invalid value for: {}", var),
        }
    }
}

impl std::error::Error for ConfigError {}
