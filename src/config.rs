//! Server configuration from environment variables (optionally via `.env`).

use std::{env, time::Duration};

use anyhow::{bail, Context, Result};

use crate::backend::Credentials;
use crate::dialect::{BackendKind, Dialect, PagingMode};
use crate::request::{Limits, DEFAULT_LIMIT, MAX_LIMIT};

pub const DEFAULT_PORT: u16 = 9588;
pub const DEFAULT_OPENSEARCH_URL: &str = "https://opensearch.ifremer.fr";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Public URL of this API, used in links.
    pub base_url: String,
    pub backend: BackendKind,
    pub backend_url: String,
    pub dialect: Dialect,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    pub limits: Limits,
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".into());
        let port: u16 = parse_var(&lookup, "PORT", DEFAULT_PORT)?;
        let base_url = lookup("STAC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let backend: BackendKind = lookup("BACKEND")
            .unwrap_or_else(|| "opensearch".into())
            .parse()
            .context("BACKEND")?;

        let backend_url = match (lookup("BACKEND_URL"), backend) {
            (Some(url), _) => url,
            (None, BackendKind::Opensearch) => DEFAULT_OPENSEARCH_URL.to_string(),
            (None, BackendKind::Elasticsearch) => {
                bail!("BACKEND_URL is required for the elasticsearch backend")
            }
        };

        let paging: PagingMode = lookup("ES_PAGING")
            .unwrap_or_else(|| "cursor".into())
            .parse()
            .context("ES_PAGING")?;
        let dialect_name = lookup("DIALECT").unwrap_or_else(|| "ifremer".into());
        let dialect = Dialect::from_name(backend, &dialect_name, paging).context("DIALECT")?;

        let timeout_secs: u64 = parse_var(&lookup, "BACKEND_TIMEOUT_SECS", 20)?;

        let limits = Limits {
            default: parse_var(&lookup, "DEFAULT_LIMIT", DEFAULT_LIMIT)?,
            max: parse_var(&lookup, "MAX_LIMIT", MAX_LIMIT)?,
        };
        if limits.default == 0 || limits.default > limits.max {
            bail!("DEFAULT_LIMIT must be between 1 and MAX_LIMIT ({})", limits.max);
        }

        Ok(Config {
            host,
            port,
            base_url,
            backend,
            backend_url,
            dialect,
            credentials: lookup("ES_CREDENTIALS").map(|c| Credentials::parse(&c)),
            timeout: Duration::from_secs(timeout_secs),
            limits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{ElasticDialect, OpensearchDialect};
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.base_url, "http://localhost:9588");
        assert_eq!(config.backend_url, DEFAULT_OPENSEARCH_URL);
        assert_eq!(config.dialect, Dialect::Opensearch(OpensearchDialect::Ifremer));
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.limits.default, DEFAULT_LIMIT);
    }

    #[test]
    fn test_elasticsearch() {
        let config = Config::from_lookup(lookup(&[
            ("BACKEND", "elasticsearch"),
            ("BACKEND_URL", "https://es.example:9200"),
            ("ES_PAGING", "page"),
            ("ES_CREDENTIALS", "reader:pw"),
            ("STAC_BASE_URL", "https://stac.example/"),
        ]))
        .unwrap();
        assert_eq!(
            config.dialect,
            Dialect::Elasticsearch(ElasticDialect::ifremer(PagingMode::Page))
        );
        assert_eq!(config.base_url, "https://stac.example");
        assert_eq!(config.credentials.unwrap().username, "reader");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[("DIALECT", "nasa")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BACKEND", "elasticsearch")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BACKEND_TIMEOUT_SECS", "-1")])).is_err());
        assert!(Config::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DEFAULT_LIMIT", "0")])).is_err());
    }
}
