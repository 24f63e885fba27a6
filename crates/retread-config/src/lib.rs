//! Environment-driven configuration for the tyre-management database.
//!
//! The deployment platform injects everything through environment
//! variables; there is no config file. The variable names are the ones
//! the rest of the deployment already uses: `DB_HOST`, `DB_USER`,
//! `DB_PASS`, `DB_NAME`, plus optional `DB_PORT`, `DB_SCHEMA`, and
//! `DB_SSL`.

use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

/// Connection and catalog settings for one database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database to connect to.
    pub database: String,
    /// Schema the catalog queries filter on.
    pub schema: String,
    /// Encrypt the connection. Certificate validation is relaxed: the
    /// hosted database does not present a verifiable chain.
    pub ssl: bool,
}

impl DbConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read the configuration through an arbitrary lookup. This is what
    /// the tests use; [`DbConfig::from_env`] passes `env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(var))
        };

        let host = required("DB_HOST")?;
        let user = required("DB_USER")?;
        let password = required("DB_PASS")?;
        let database = required("DB_NAME")?;

        let port = match lookup("DB_PORT").filter(|v| !v.is_empty()) {
            None => 5432,
            Some(v) => match v.parse() {
                Ok(port) => port,
                Err(_) => {
                    return Err(ConfigError::Invalid {
                        var: "DB_PORT",
                        value: v,
                    });
                }
            },
        };

        let ssl = match lookup("DB_SSL").filter(|v| !v.is_empty()) {
            None => false,
            Some(v) => match parse_bool(&v) {
                Some(ssl) => ssl,
                None => {
                    return Err(ConfigError::Invalid {
                        var: "DB_SSL",
                        value: v,
                    });
                }
            },
        };

        let schema = lookup("DB_SCHEMA")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "public".to_string());

        Ok(Self {
            host,
            port,
            user,
            password,
            database,
            schema,
            ssl,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn minimal_environment_uses_defaults() {
        let config = DbConfig::from_lookup(lookup_from(&[
            ("DB_HOST", "db.internal"),
            ("DB_USER", "tyres"),
            ("DB_PASS", "secret"),
            ("DB_NAME", "tyremanagement"),
        ]))
        .unwrap();

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 5432);
        assert_eq!(config.schema, "public");
        assert!(!config.ssl);
    }

    #[test]
    fn explicit_port_schema_and_ssl() {
        let config = DbConfig::from_lookup(lookup_from(&[
            ("DB_HOST", "db.internal"),
            ("DB_USER", "tyres"),
            ("DB_PASS", "secret"),
            ("DB_NAME", "tyremanagement"),
            ("DB_PORT", "6543"),
            ("DB_SCHEMA", "fleet"),
            ("DB_SSL", "true"),
        ]))
        .unwrap();

        assert_eq!(config.port, 6543);
        assert_eq!(config.schema, "fleet");
        assert!(config.ssl);
    }

    #[test]
    fn missing_required_variable_is_named() {
        let err = DbConfig::from_lookup(lookup_from(&[
            ("DB_HOST", "db.internal"),
            ("DB_USER", "tyres"),
            ("DB_NAME", "tyremanagement"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Missing("DB_PASS")));
    }

    #[test]
    fn empty_values_count_as_missing() {
        let err = DbConfig::from_lookup(lookup_from(&[
            ("DB_HOST", ""),
            ("DB_USER", "tyres"),
            ("DB_PASS", "secret"),
            ("DB_NAME", "tyremanagement"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Missing("DB_HOST")));
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = DbConfig::from_lookup(lookup_from(&[
            ("DB_HOST", "db.internal"),
            ("DB_USER", "tyres"),
            ("DB_PASS", "secret"),
            ("DB_NAME", "tyremanagement"),
            ("DB_PORT", "not-a-port"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { var: "DB_PORT", .. }));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
