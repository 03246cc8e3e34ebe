use std::{env, net::SocketAddr};

use reqwest::Url;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

#[derive(Debug, Clone)]
pub struct Config {
    pub openlibrary_url: Option<Url>,
    pub bind_addr: String,
    pub port: u16,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("OPENLIBRARY_URL must be an absolute URL")]
    InvalidOpenLibraryUrl,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    /// Reads the process environment, after loading a `.env` file when one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let openlibrary_url = lookup("OPENLIBRARY_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| Url::parse(&value).map_err(|_| ConfigError::InvalidOpenLibraryUrl))
            .transpose()?;
        if openlibrary_url.is_none() {
            warn!("OPENLIBRARY_URL not set - the search-books tool will fail until it is configured");
        }

        let bind_addr = lookup("BIND_ADDR")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let port = lookup("PORT")
            .map(|value| value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let config = Self {
            openlibrary_url,
            bind_addr,
            port,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_defaults() {
        let config = config_from(&[]).expect("config should parse");
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.openlibrary_url.is_none());
    }

    #[test]
    fn reads_port_and_upstream_url() {
        let config = config_from(&[
            ("PORT", "8081"),
            ("OPENLIBRARY_URL", "https://openlibrary.org/search.json"),
        ])
        .expect("config should parse");

        assert_eq!(config.port, 8081);
        assert_eq!(
            config.openlibrary_url.as_ref().map(Url::as_str),
            Some("https://openlibrary.org/search.json")
        );
    }

    #[test]
    fn invalid_port_fails() {
        let err = config_from(&[("PORT", "70000")]).expect_err("expected invalid port");
        assert!(matches!(err, ConfigError::InvalidPort));
    }

    #[test]
    fn relative_upstream_url_fails() {
        let err = config_from(&[("OPENLIBRARY_URL", "search.json")])
            .expect_err("expected invalid url");
        assert!(matches!(err, ConfigError::InvalidOpenLibraryUrl));
    }

    #[test]
    fn invalid_bind_addr_fails() {
        let err = config_from(&[("BIND_ADDR", "not an address")])
            .expect_err("expected invalid socket");
        assert!(matches!(err, ConfigError::InvalidSocket));
    }
}
