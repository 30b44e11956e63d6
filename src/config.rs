//! Settings for the store, the model endpoint, identity and evaluation limits.
//!
//! Precedence, lowest first: built-in defaults, a TOML file (with the
//! `toml-config` feature), `CONJURE_*` environment variables, command line flags.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::path::{STORE_ENV, STORE_FILE_NAME};
use crate::generator::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::identity::IdentityMode;
use crate::runtime::ExecutionLimits;

pub const ENDPOINT_ENV: &str = "CONJURE_ENDPOINT";
pub const MODEL_ENV: &str = "CONJURE_MODEL";
pub const TIMEOUT_ENV: &str = "CONJURE_TIMEOUT_SECS";
pub const IDENTITY_ENV: &str = "CONJURE_IDENTITY";
pub const CONFIG_ENV: &str = "CONJURE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}': {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is invalid: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store_path: PathBuf,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: Option<u64>,
    pub identity: IdentityMode,
    pub limits: ExecutionLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(STORE_FILE_NAME),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: None,
            identity: IdentityMode::default(),
            limits: ExecutionLimits::default(),
        }
    }
}

impl Config {
    /// Defaults, then the config file if enabled, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file()?.unwrap_or_default();
        config.apply_overrides(|var| env::var(var).ok())?;
        Ok(config)
    }

    /// Applies `CONJURE_*` overrides read through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let lookup = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        if let Some(path) = lookup(STORE_ENV) {
            self.store_path = PathBuf::from(path);
        }
        if let Some(endpoint) = lookup(ENDPOINT_ENV) {
            self.endpoint = endpoint;
        }
        if let Some(model) = lookup(MODEL_ENV) {
            self.model = model;
        }
        if let Some(value) = lookup(TIMEOUT_ENV) {
            let secs = value.trim().parse::<u64>().map_err(|err| ConfigError::InvalidEnv {
                var: TIMEOUT_ENV,
                value: value.clone(),
                reason: err.to_string(),
            })?;
            self.timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(value) = lookup(IDENTITY_ENV) {
            self.identity = value.parse().map_err(|reason| ConfigError::InvalidEnv {
                var: IDENTITY_ENV,
                value: value.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    #[cfg(feature = "toml-config")]
    fn from_file() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_file_path() else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|err| ConfigError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(Some(config))
    }

    #[cfg(not(feature = "toml-config"))]
    fn from_file() -> Result<Option<Self>, ConfigError> {
        Ok(None)
    }
}

/// `CONJURE_CONFIG`, else `conjure.toml` in the working directory, else the
/// per-user config directory.
#[cfg(feature = "toml-config")]
fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from("conjure.toml");
    if local.is_file() {
        return Some(local);
    }
    directories::ProjectDirs::from("", "", "conjure")
        .map(|dirs| dirs.config_dir().join("conjure.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_point_at_a_local_ollama() {
        let config = Config::default();
        assert_eq!(config.store_path, PathBuf::from("conjure_store.json"));
        assert_eq!(config.endpoint, "http://localhost:11434");
        assert_eq!(config.model, "qwen2.5-coder");
        assert_eq!(config.identity, IdentityMode::Signature);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn environment_overrides_apply() -> Result<(), ConfigError> {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("CONJURE_STORE", "/tmp/store.json"),
            ("CONJURE_MODEL", "llama3"),
            ("CONJURE_TIMEOUT_SECS", "30"),
            ("CONJURE_IDENTITY", "documented"),
            ("CONJURE_ENDPOINT", ""),
        ]))?;
        assert_eq!(config.store_path, PathBuf::from("/tmp/store.json"));
        assert_eq!(config.model, "llama3");
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.identity, IdentityMode::Documented);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        Ok(())
    }

    #[test]
    fn invalid_overrides_are_reported() {
        let mut config = Config::default();
        let err = config.apply_overrides(lookup(&[("CONJURE_TIMEOUT_SECS", "soon")]));
        assert!(matches!(err, Err(ConfigError::InvalidEnv { var: TIMEOUT_ENV, .. })));
    }

    #[test]
    fn partial_documents_fill_in_defaults() -> Result<(), serde_json::Error> {
        let config: Config = serde_json::from_str(r#"{"model": "codellama", "limits": {"max_steps": 10}}"#)?;
        assert_eq!(config.model, "codellama");
        assert_eq!(config.limits.max_steps, 10);
        assert_eq!(config.limits.max_call_depth, 200);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        Ok(())
    }
}
