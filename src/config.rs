use std::env;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bind_address: String,
    pub frontend_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let or_default = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let token_ttl_hours = match lookup("TOKEN_TTL_HOURS") {
            None => 48,
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or(ConfigError::Invalid {
                    name: "TOKEN_TTL_HOURS",
                    value: raw,
                })?,
        };

        Ok(Self {
            mongo_uri: required("MONGO_URI")?,
            database_name: or_default("DATABASE_NAME", "teamhub"),
            jwt_secret: required("JWT_SECRET")?,
            token_ttl_hours,
            bind_address: or_default("BIND_ADDRESS", "0.0.0.0:5000"),
            frontend_origin: or_default("FRONTEND_ORIGIN", "http://localhost:5001"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_fill_optional_values() {
        let config = Config::from_lookup(vars(&[
            ("MONGO_URI", "mongodb://localhost:27017"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(config.database_name, "teamhub");
        assert_eq!(config.token_ttl_hours, 48);
        assert_eq!(config.bind_address, "0.0.0.0:5000");
        assert_eq!(config.frontend_origin, "http://localhost:5001");
    }

    #[test]
    fn missing_required_values_are_reported() {
        assert_eq!(
            Config::from_lookup(vars(&[("JWT_SECRET", "x")])).unwrap_err(),
            ConfigError::Missing("MONGO_URI")
        );
        assert_eq!(
            Config::from_lookup(vars(&[("MONGO_URI", "mongodb://db"), ("JWT_SECRET", " ")]))
                .unwrap_err(),
            ConfigError::Missing("JWT_SECRET")
        );
    }

    #[test]
    fn malformed_ttl_is_invalid() {
        let err = Config::from_lookup(vars(&[
            ("MONGO_URI", "mongodb://db"),
            ("JWT_SECRET", "x"),
            ("TOKEN_TTL_HOURS", "two days"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "TOKEN_TTL_HOURS", .. }));
    }
}
