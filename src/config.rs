//! Configuration loader and validator for the queue dashboard proxy.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "dashboard.yaml";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "http://127.0.0.1:8000";

pub const ENV_BASE_URL: &str = "DB_API_BASE_URL";
pub const ENV_SERVICE_TOKEN: &str = "DB_API_SERVICE_TOKEN";
pub const ENV_BIND: &str = "DASHBOARD_BIND";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub upstream: Upstream,
}

/// Local listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Server {
    pub bind: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Remote service settings. The token never leaves the proxy process.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Upstream {
    pub base_url: String,
    pub service_token: Option<String>,
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            service_token: None,
        }
    }
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("base_url", &self.base_url)
            .field("service_token", &self.service_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Config {
    /// Apply environment-style overrides. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.upstream.base_url = url;
        }
        if let Some(token) = lookup(ENV_SERVICE_TOKEN) {
            self.upstream.service_token = Some(token);
        }
        if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
            self.server.bind = bind;
        }
        // A blank token is the same as no token.
        if self
            .upstream
            .service_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            self.upstream.service_token = None;
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid("server.bind must be a socket address"))
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.upstream.base_url)
            .map_err(|_| ConfigError::Invalid("upstream.base_url must be an absolute URL"))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Invalid("upstream.base_url must use http or https"));
        }
        Ok(url)
    }
}

/// Load configuration from a YAML file, apply process environment overrides,
/// and validate it.
/// - If `path` is given, the file must exist.
/// - If `path` is None, `dashboard.yaml` is read when present, else defaults are used.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_with(path, |key| std::env::var(key).ok())
}

pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match path {
        Some(p) => parse(&fs::read_to_string(p)?)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                parse(&fs::read_to_string(default_path)?)?
            } else {
                Config::default()
            }
        }
    };
    cfg.apply_overrides(lookup);
    validate(&cfg)?;
    Ok(cfg)
}

fn parse(content: &str) -> Result<Config, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

/// Validate a configuration instance. A missing service token is allowed
/// here; requests fail individually until one is configured.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    cfg.bind_addr()?;
    cfg.base_url()?;
    Ok(())
}

/// Example `dashboard.yaml`.
pub fn example() -> &'static str {
    r#"server:
  bind: "127.0.0.1:3000"

upstream:
  base_url: "http://127.0.0.1:8000"
  # Prefer DB_API_SERVICE_TOKEN in the environment over committing this.
  service_token: "YOUR_DB_API_SERVICE_TOKEN"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.upstream.service_token.as_deref(), Some("YOUR_DB_API_SERVICE_TOKEN"));
    }

    #[test]
    fn defaults_fall_back_to_loopback() {
        let mut cfg = Config::default();
        cfg.apply_overrides(env(&[]));
        validate(&cfg).unwrap();
        assert_eq!(cfg.upstream.base_url, DEFAULT_UPSTREAM_BASE_URL);
        assert_eq!(cfg.server.bind, DEFAULT_BIND);
        assert!(cfg.upstream.service_token.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.apply_overrides(env(&[
            (ENV_BASE_URL, "https://db.internal:9000/"),
            (ENV_SERVICE_TOKEN, "s3cret"),
            (ENV_BIND, "0.0.0.0:8080"),
        ]));
        assert_eq!(cfg.upstream.base_url, "https://db.internal:9000/");
        assert_eq!(cfg.upstream.service_token.as_deref(), Some("s3cret"));
        assert_eq!(cfg.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let mut cfg = Config::default();
        cfg.apply_overrides(env(&[(ENV_SERVICE_TOKEN, "   ")]));
        assert!(cfg.upstream.service_token.is_none());
    }

    #[test]
    fn invalid_bind() {
        let mut cfg = Config::default();
        cfg.server.bind = "localhost".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("server.bind")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_base_url() {
        let mut cfg = Config::default();
        cfg.upstream.base_url = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        cfg.upstream.base_url = "ftp://127.0.0.1/".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("http or https")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn debug_redacts_token() {
        let mut cfg = Config::default();
        cfg.upstream.service_token = Some("s3cret".into());
        let printed = format!("{:?}", cfg);
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("dashboard.yaml");
        fs::write(&p, "upstream:\n  base_url: \"http://10.0.0.5:8000\"\n").unwrap();
        let cfg = load_with(Some(&p), env(&[(ENV_SERVICE_TOKEN, "tok")])).unwrap();
        assert_eq!(cfg.upstream.base_url, "http://10.0.0.5:8000");
        assert_eq!(cfg.server.bind, DEFAULT_BIND);
        assert_eq!(cfg.upstream.service_token.as_deref(), Some("tok"));
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let td = tempdir().unwrap();
        let p = td.path().join("absent.yaml");
        assert!(matches!(load_with(Some(&p), env(&[])), Err(ConfigError::Io(_))));
    }
}
