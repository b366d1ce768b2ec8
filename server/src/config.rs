use std::{
    collections::HashMap,
    io::Read,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use platform_seal::{SealError, SealKey};
use thiserror::Error;
use tracing::warn;

const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

pub const PAYLOAD_ROUTE: &str = "/payload";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error loading env file {}: {source}", .path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("missing API URL or token")]
    MissingProxyTarget,
    #[error("missing SODIUM_KEY")]
    MissingKey,
    #[error("invalid sealing key: {0}")]
    InvalidKey(#[from] SealError),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl ConfigError {
    /// Short message safe to hand back to the browser.
    pub fn summary(&self) -> &'static str {
        match self {
            ConfigError::EnvFile { .. } => "error loading env file",
            ConfigError::MissingProxyTarget => "missing API URL or token",
            ConfigError::MissingKey => "missing SODIUM_KEY",
            ConfigError::InvalidKey(_) => "invalid sealing key",
            ConfigError::InvalidValue { .. } => "invalid configuration value",
        }
    }
}

/// Key/value pairs read from a dotenv-style file.
#[derive(Clone, Debug, Default)]
pub struct EnvFile {
    entries: HashMap<String, String>,
}

impl EnvFile {
    /// Reads `path` without touching the process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let iter = dotenvy::from_path_iter(path).map_err(|source| ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::collect(iter))
    }

    pub fn parse(text: &str) -> Self {
        Self::collect(dotenvy::from_read_iter(text.as_bytes()))
    }

    /// Later entries replace earlier ones; unparsable lines are skipped.
    fn collect<R: Read>(iter: dotenvy::Iter<R>) -> Self {
        let mut entries = HashMap::new();
        for item in iter {
            match item {
                Ok((key, value)) => {
                    entries.insert(key, value);
                }
                Err(err) => warn!(error = %err, "skipping unparsable env line"),
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub sodium_key: Option<String>,
    pub payload_url: Option<String>,
    pub upstream_timeout: Duration,
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    /// Reads `path` and resolves settings against it, falling back to the
    /// process environment for keys the file does not set.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let env_file = EnvFile::load(path)?;
        tracing::debug!(path = %path.display(), entries = env_file.len(), "env file loaded");
        Self::from_sources(&env_file, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(env_file: &EnvFile, fallback: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| -> Option<String> {
            env_file
                .get(key)
                .map(str::to_string)
                .or_else(|| fallback(key))
                .filter(|value| !value.trim().is_empty())
        };

        let upstream_timeout = match lookup("UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidValue {
                    key: "UPSTREAM_TIMEOUT_SECS",
                    value: raw,
                })?,
            None => Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        };

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>();

        let config = Self {
            api_url: lookup("API_URL"),
            api_token: lookup("API_TOKEN"),
            sodium_key: lookup("SODIUM_KEY"),
            payload_url: lookup("PAYLOAD_URL"),
            upstream_timeout,
            cors_allowed_origins,
        };

        if config.proxy_target().is_err() {
            warn!("API_URL or API_TOKEN not set; the payload route will refuse requests");
        }
        if let Err(err) = config.sealing_key() {
            warn!(error = %err, "sealing key unusable; the employee page will refuse requests");
        }
        Ok(config)
    }

    /// Upstream API address and bearer token for the payload route.
    pub fn proxy_target(&self) -> Result<(&str, &str), ConfigError> {
        match (self.api_url.as_deref(), self.api_token.as_deref()) {
            (Some(url), Some(token)) => Ok((url, token)),
            _ => Err(ConfigError::MissingProxyTarget),
        }
    }

    pub fn sealing_key(&self) -> Result<SealKey, ConfigError> {
        let encoded = self.sodium_key.as_deref().ok_or(ConfigError::MissingKey)?;
        Ok(SealKey::from_base64(encoded)?)
    }

    /// Where the employee page fetches its sealed payload. Defaults to this
    /// server's own payload route.
    pub fn payload_url(&self, local_addr: SocketAddr) -> String {
        if let Some(url) = &self.payload_url {
            return url.clone();
        }
        let host = match local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        format!(
            "http://{}{PAYLOAD_ROUTE}",
            SocketAddr::new(host, local_addr.port())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parses_dotenv_lines() {
        let env = EnvFile::parse(
            "# upstream\nAPI_URL=http://api.local/employees?limit=5&x=1\n\nAPI_TOKEN=abc=def\nbogus line\n=orphan\nSODIUM_KEY=\"quoted+key/==\"\n",
        );
        assert_eq!(env.get("API_URL"), Some("http://api.local/employees?limit=5&x=1"));
        assert_eq!(env.get("API_TOKEN"), Some("abc=def"));
        assert_eq!(env.get("SODIUM_KEY"), Some("quoted+key/=="));
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn later_entries_win() {
        let env = EnvFile::parse("API_TOKEN=first\nAPI_TOKEN=second\n");
        assert_eq!(env.get("API_TOKEN"), Some("second"));
    }

    #[test]
    fn file_values_take_precedence_over_process_env() {
        let env = EnvFile::parse("API_URL=http://file\n");
        let config = AppConfig::from_sources(&env, |key| match key {
            "API_URL" => Some("http://process".into()),
            "API_TOKEN" => Some("token-from-process".into()),
            _ => None,
        })
        .expect("config");
        assert_eq!(config.proxy_target().unwrap(), ("http://file", "token-from-process"));
    }

    #[test]
    fn empty_values_count_as_missing() {
        let env = EnvFile::parse("API_URL=http://api\nAPI_TOKEN=\n");
        let config = AppConfig::from_sources(&env, no_env).expect("config");
        assert!(matches!(
            config.proxy_target(),
            Err(ConfigError::MissingProxyTarget)
        ));
    }

    #[test]
    fn sealing_key_errors_are_distinct() {
        let config = AppConfig::from_sources(&EnvFile::default(), no_env).expect("config");
        assert!(matches!(config.sealing_key(), Err(ConfigError::MissingKey)));

        let env = EnvFile::parse("SODIUM_KEY=c2hvcnQ=\n");
        let config = AppConfig::from_sources(&env, no_env).expect("config");
        let err = config.sealing_key().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey(_)));
        assert!(err.to_string().contains("expected 32 bytes"));
        assert_eq!(err.summary(), "invalid sealing key");

        let key = SealKey::generate();
        let env = EnvFile::parse(&format!("SODIUM_KEY={}\n", key.to_base64()));
        let config = AppConfig::from_sources(&env, no_env).expect("config");
        assert_eq!(config.sealing_key().unwrap().to_base64(), key.to_base64());
    }

    #[test]
    fn timeout_defaults_and_validates() {
        let config = AppConfig::from_sources(&EnvFile::default(), no_env).expect("config");
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));

        let env = EnvFile::parse("UPSTREAM_TIMEOUT_SECS=3\n");
        let config = AppConfig::from_sources(&env, no_env).expect("config");
        assert_eq!(config.upstream_timeout, Duration::from_secs(3));

        let env = EnvFile::parse("UPSTREAM_TIMEOUT_SECS=soon\n");
        let err = AppConfig::from_sources(&env, no_env).unwrap_err();
        assert!(err.to_string().contains("UPSTREAM_TIMEOUT_SECS"));
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let env = EnvFile::parse("CORS_ALLOWED_ORIGINS=http://a.test, ,http://b.test \n");
        let config = AppConfig::from_sources(&env, no_env).expect("config");
        assert_eq!(config.cors_allowed_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn payload_url_defaults_to_loopback_route() {
        let config = AppConfig::from_sources(&EnvFile::default(), no_env).expect("config");
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(config.payload_url(addr), "http://127.0.0.1:8080/payload");

        let env = EnvFile::parse("PAYLOAD_URL=http://elsewhere/payload\n");
        let config = AppConfig::from_sources(&env, no_env).expect("config");
        assert_eq!(config.payload_url(addr), "http://elsewhere/payload");
    }

    #[test]
    fn loads_from_disk() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "API_URL=http://api.test/employees").unwrap();
        writeln!(file, "API_TOKEN=t0ken").unwrap();
        let config = AppConfig::load(file.path()).expect("config");
        assert_eq!(config.proxy_target().unwrap().1, "t0ken");
        assert_ne!(std::env::var("API_TOKEN").ok().as_deref(), Some("t0ken"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = AppConfig::load(&dir.path().join(".env")).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile { .. }));
        assert!(err.to_string().starts_with("error loading env file"));
    }
}
