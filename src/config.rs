//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use regex::Regex;

/// Default allowed origin when `CORS_ORIGINS` is not set
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Cross-origin policy
    pub cors: CorsSettings,

    /// Mail provider and addressing
    pub mail: MailSettings,

    /// Document store connection
    pub database: DatabaseSettings,

    /// Shared secret expected in the `x-api-key` header
    pub api_secret_key: Option<String>,

    /// Contact route throttling
    pub rate_limit: RateLimitSettings,

    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
    /// Matched against the whole origin when it is not in the allow-list
    /// (deploy previews)
    pub preview_origin_pattern: Option<Regex>,
    pub allow_credentials: bool,
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub from: String,
    pub to: String,
    /// Shown in the subject line and the footer of outgoing mail
    pub site_name: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Connection string; empty when not configured
    pub uri: String,
    /// Overrides the database named in the URI
    pub name: Option<String>,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub max_idle_time: Duration,
    pub server_selection_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            uri: String::new(),
            name: None,
            max_pool_size: 10,
            min_pool_size: 2,
            max_idle_time: Duration::from_secs(30),
            server_selection_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u32,
    /// Key clients by the first `X-Forwarded-For` entry when present
    pub trust_proxy: bool,
}

impl Settings {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated the same as missing ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&var, "PORT", 3001)?;
        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let allowed_origins = var("CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()]);

        let preview_origin_pattern = var("CORS_PREVIEW_ORIGIN_PATTERN")
            .map(|pattern| Regex::new(&format!("^(?:{})$", pattern.trim())))
            .transpose()
            .map_err(|_| ConfigError::InvalidValue("CORS_PREVIEW_ORIGIN_PATTERN"))?;

        let cors = CorsSettings {
            allowed_origins,
            preview_origin_pattern,
            allow_credentials: parse_flag(&var, "CORS_ALLOW_CREDENTIALS")?,
        };

        let mail = MailSettings {
            region: var("AWS_REGION").unwrap_or_else(|| "us-west-2".to_string()),
            access_key_id: var("AWS_ACCESS_KEY_ID"),
            secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            from: var("EMAIL_FROM").unwrap_or_else(|| "no-reply@localhost".to_string()),
            to: var("EMAIL_TO").unwrap_or_else(|| "owner@localhost".to_string()),
            site_name: var("SITE_NAME").unwrap_or_else(|| "portfolio".to_string()),
        };

        let database = DatabaseSettings {
            uri: var("MONGO_URL").unwrap_or_default(),
            name: var("DATABASE_NAME"),
            ..DatabaseSettings::default()
        };

        let window_ms: u64 = parse_or(&var, "RATE_LIMIT_WINDOW_MS", 15 * 60 * 1000)?;
        if window_ms == 0 {
            return Err(ConfigError::InvalidValue("RATE_LIMIT_WINDOW_MS"));
        }

        let rate_limit = RateLimitSettings {
            window: Duration::from_millis(window_ms),
            max_requests: parse_or(&var, "RATE_LIMIT_MAX", 5)?,
            trust_proxy: parse_flag(&var, "TRUST_PROXY")?,
        };

        let json_logs = match var("LOG_FORMAT").as_deref() {
            None | Some("pretty") => false,
            Some("json") => true,
            Some(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        Ok(Self {
            host,
            port,
            environment,
            cors,
            mail,
            database,
            api_secret_key: var("API_SECRET_KEY"),
            rate_limit,
            json_logs,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

fn parse_flag<F>(var: &F, key: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).map(|raw| raw.trim().to_ascii_lowercase()).as_deref() {
        None | Some("false" | "0" | "no") => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some(_) => Err(ConfigError::InvalidValue(key)),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings_from(&[]).unwrap();

        assert_eq!(settings.port, 3001);
        assert_eq!(settings.environment, "development");
        assert!(!settings.is_production());
        assert_eq!(settings.cors.allowed_origins, vec!["http://localhost:3000"]);
        assert!(settings.cors.preview_origin_pattern.is_none());
        assert!(!settings.cors.allow_credentials);
        assert_eq!(settings.mail.region, "us-west-2");
        assert!(settings.database.uri.is_empty());
        assert_eq!(settings.database.max_pool_size, 10);
        assert_eq!(settings.rate_limit.window, Duration::from_secs(900));
        assert_eq!(settings.rate_limit.max_requests, 5);
        assert!(settings.api_secret_key.is_none());
        assert!(!settings.json_logs);
    }

    #[test]
    fn test_cors_origins_are_split_and_trimmed() {
        let settings =
            settings_from(&[("CORS_ORIGINS", "https://a.example, https://b.example,,")]).unwrap();

        assert_eq!(
            settings.cors.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_overrides() {
        let settings = settings_from(&[
            ("PORT", "8080"),
            ("ENVIRONMENT", "production"),
            ("RATE_LIMIT_WINDOW_MS", "60000"),
            ("RATE_LIMIT_MAX", "2"),
            ("TRUST_PROXY", "true"),
            ("API_SECRET_KEY", "s3cret"),
            ("MONGO_URL", "mongodb://localhost:27017/site"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(settings.port, 8080);
        assert!(settings.is_production());
        assert_eq!(settings.rate_limit.window, Duration::from_secs(60));
        assert_eq!(settings.rate_limit.max_requests, 2);
        assert!(settings.rate_limit.trust_proxy);
        assert_eq!(settings.api_secret_key.as_deref(), Some("s3cret"));
        assert_eq!(settings.database.uri, "mongodb://localhost:27017/site");
        assert!(settings.json_logs);
    }

    #[test]
    fn test_preview_pattern_is_anchored() {
        let settings = settings_from(&[(
            "CORS_PREVIEW_ORIGIN_PATTERN",
            r"https://deploy-preview-\d+--site\.netlify\.app",
        )])
        .unwrap();
        let pattern = settings.cors.preview_origin_pattern.unwrap();

        assert!(pattern.is_match("https://deploy-preview-42--site.netlify.app"));
        assert!(!pattern.is_match("https://deploy-preview-42--site.netlify.app.evil.test"));
        assert!(matches!(
            settings_from(&[("CORS_PREVIEW_ORIGIN_PATTERN", "(unclosed")]),
            Err(ConfigError::InvalidValue("CORS_PREVIEW_ORIGIN_PATTERN"))
        ));
    }

    #[test]
    fn test_blank_secret_is_unset() {
        let settings = settings_from(&[("API_SECRET_KEY", "   ")]).unwrap();
        assert!(settings.api_secret_key.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            settings_from(&[("PORT", "not-a-port")]),
            Err(ConfigError::InvalidValue("PORT"))
        ));
        assert!(matches!(
            settings_from(&[("RATE_LIMIT_WINDOW_MS", "0")]),
            Err(ConfigError::InvalidValue("RATE_LIMIT_WINDOW_MS"))
        ));
        assert!(matches!(
            settings_from(&[("TRUST_PROXY", "maybe")]),
            Err(ConfigError::InvalidValue("TRUST_PROXY"))
        ));
    }
}
