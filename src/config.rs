// src/config.rs
use log::warn;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;

const DEFAULT_DB_NAME: &str = "stockdb";
const DEFAULT_JWT_SECRET: &str = "change_me";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3030";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub scylla_uri: String,
    pub db_name: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars().collect())
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        let scylla_uri = get("SCYLLA_URI").ok_or(ConfigError::Missing("SCYLLA_URI"))?;

        let db_name = get("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
        validate_keyspace(&db_name)?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!(
                    "JWT_SECRET is not set; signing tokens with the insecure default secret"
                );
                DEFAULT_JWT_SECRET.to_string()
            }
        };

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        Ok(Config {
            scylla_uri,
            db_name,
            jwt_secret,
            bind_addr,
        })
    }
}

// Keyspace names are formatted into CQL, so only plain identifiers pass.
fn validate_keyspace(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        var: "DB_NAME",
        reason: reason.to_string(),
    };
    if name.len() > 48 {
        return Err(invalid("longer than 48 characters"));
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(invalid("must start with a letter")),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("only letters, digits and underscores are allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_only_uri_is_set() {
        let config = Config::from_vars(vars(&[("SCYLLA_URI", "10.0.0.5:9042")])).unwrap();
        assert_eq!(config.scylla_uri, "10.0.0.5:9042");
        assert_eq!(config.db_name, "stockdb");
        assert_eq!(config.jwt_secret, "change_me");
        assert_eq!(config.bind_addr, "127.0.0.1:3030".parse().unwrap());
    }

    #[test]
    fn missing_uri_is_an_error() {
        let err = Config::from_vars(vars(&[("DB_NAME", "stocks")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("SCYLLA_URI"));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = Config::from_vars(vars(&[
            ("SCYLLA_URI", "db:9042"),
            ("DB_NAME", "stocks_test"),
            ("JWT_SECRET", "s3cret"),
            ("BIND_ADDR", "0.0.0.0:8080"),
        ]))
        .unwrap();
        assert_eq!(config.db_name, "stocks_test");
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn keyspace_must_be_a_plain_identifier() {
        for bad in ["1stocks", "stocks; DROP", "stock-db"] {
            let err = Config::from_vars(vars(&[("SCYLLA_URI", "db:9042"), ("DB_NAME", bad)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { var: "DB_NAME", .. }));
        }
    }

    #[test]
    fn bad_bind_addr_is_rejected() {
        let err = Config::from_vars(vars(&[("SCYLLA_URI", "db:9042"), ("BIND_ADDR", "nope")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "BIND_ADDR", .. }));
    }
}
