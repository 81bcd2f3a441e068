//! Runtime configuration, resolved once at startup from the environment.

use chrono::Duration;

use crate::access::{AccessRulesMode, CachePolicy};
use crate::errors::AppError;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_CACHE_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    /// Identities, roles and login (`ACCOUNT_ON`)
    pub account_on: bool,
    /// Access rule enforcement (`ACCESS_RULES_MODE`)
    pub access_rules: AccessRulesMode,
    /// Rule cache lifetime (`ACCESS_RULES_CACHE`)
    pub cache_policy: CachePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            account_on: true,
            access_rules: AccessRulesMode::Strict,
            cache_policy: CachePolicy::TimeBoxed(Duration::seconds(DEFAULT_CACHE_SECS)),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("APP_PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            None => defaults.port,
        };

        let account_on = match lookup("ACCOUNT_ON") {
            Some(value) => parse_flag("ACCOUNT_ON", &value)?,
            None => defaults.account_on,
        };

        let access_rules = match lookup("ACCESS_RULES_MODE") {
            Some(value) => value.parse::<AccessRulesMode>().map_err(AppError::configuration)?,
            None => defaults.access_rules,
        };

        let cache_policy = match lookup("ACCESS_RULES_CACHE") {
            Some(value) => parse_cache_policy(&value)?,
            None => defaults.cache_policy,
        };

        let config = Self {
            port,
            account_on,
            access_rules,
            cache_policy,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.access_rules.is_enabled() && !self.account_on {
            return Err(AppError::configuration(
                "ACCESS_RULES_MODE requires ACCOUNT_ON; set ACCESS_RULES_MODE=off or enable accounts",
            ));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(AppError::configuration(format!("{key} must be a boolean"))),
    }
}

fn parse_cache_policy(value: &str) -> Result<CachePolicy, AppError> {
    match value.trim().to_lowercase().as_str() {
        "session" => Ok(CachePolicy::Session),
        "disabled" | "off" | "0" => Ok(CachePolicy::Disabled),
        secs => secs
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(|secs| CachePolicy::TimeBoxed(Duration::seconds(secs)))
            .ok_or_else(|| {
                AppError::configuration("ACCESS_RULES_CACHE must be 'session', 'disabled' or a number of seconds")
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.access_rules, AccessRulesMode::Strict);
    }

    #[test]
    fn test_flags_and_cache_policy() {
        let config = config_from(&[
            ("APP_PORT", "9100"),
            ("ACCESS_RULES_MODE", "advisory"),
            ("ACCESS_RULES_CACHE", "session"),
        ])
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.access_rules, AccessRulesMode::Advisory);
        assert_eq!(config.cache_policy, CachePolicy::Session);

        let config = config_from(&[("ACCESS_RULES_CACHE", "15")]).unwrap();
        assert_eq!(config.cache_policy, CachePolicy::TimeBoxed(Duration::seconds(15)));

        let config = config_from(&[("ACCESS_RULES_CACHE", "0")]).unwrap();
        assert_eq!(config.cache_policy, CachePolicy::Disabled);
    }

    #[test]
    fn test_access_rules_require_accounts() {
        let err = config_from(&[("ACCOUNT_ON", "false")]).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));

        let config = config_from(&[("ACCOUNT_ON", "false"), ("ACCESS_RULES_MODE", "off")]).unwrap();
        assert!(!config.account_on);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("ACCESS_RULES_MODE", "sometimes")]).is_err());
        assert!(config_from(&[("ACCESS_RULES_CACHE", "-5")]).is_err());
        assert!(config_from(&[("ACCOUNT_ON", "maybe")]).is_err());
        assert!(config_from(&[("APP_PORT", "http")]).is_err());
    }
}
