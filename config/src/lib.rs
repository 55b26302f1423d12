//! Configuration loading for Perito.
//!
//! Reads `~/.perito/config.toml`. Every key is optional; a missing file means
//! defaults. String values may reference the environment with `${VAR}`, and
//! `PERITO_MODEL`, `PERITO_BASE_URL` and `PERITO_TEMPERATURE` override the
//! file.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use perito_types::{
    DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
    DEFAULT_TIMEOUT_SECS, InferenceSettings,
};

pub const ENV_MODEL: &str = "PERITO_MODEL";
pub const ENV_BASE_URL: &str = "PERITO_BASE_URL";
pub const ENV_TEMPERATURE: &str = "PERITO_TEMPERATURE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PeritoConfig {
    pub inference: Option<InferenceConfig>,
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InferenceConfig {
    /// Ollama model tag, e.g. `llama3.1`.
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    /// Hard deadline per inference call, retries included.
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PipelineConfig {
    /// Refuse on-demand stages whose upstream stages have not run.
    pub require_upstream: Option<bool>,
}

/// Validated settings ready for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub inference: InferenceSettings,
    pub require_upstream: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            inference: InferenceSettings::default(),
            require_upstream: true,
        }
    }
}

/// Replace `${VAR}` references with the variable's value (empty if unset).
///
/// An unclosed `${` is kept literally.
pub fn expand_env_vars(value: &str) -> String {
    expand_with(value, |name| env::var(name).ok())
}

fn expand_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &after[..end];
        if !name.is_empty() {
            out.push_str(&lookup(name).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl PeritoConfig {
    /// Load from the default location. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Apply defaults, `${VAR}` expansion and environment overrides, then validate.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        self.resolve_with(|name| env::var(name).ok())
    }

    /// [`Self::resolve`] with variables read through `lookup` instead of the
    /// process environment.
    pub fn resolve_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ResolvedConfig, ConfigError> {
        let inference = self.inference.as_ref();
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let model = non_empty(lookup(ENV_MODEL))
            .or_else(|| {
                inference
                    .and_then(|i| i.model.as_deref())
                    .map(|m| expand_with(m, &lookup))
            })
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base_url = non_empty(lookup(ENV_BASE_URL))
            .or_else(|| {
                inference
                    .and_then(|i| i.base_url.as_deref())
                    .map(|u| expand_with(u, &lookup))
            })
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        validate_base_url(&base_url)?;

        let temperature = match non_empty(lookup(ENV_TEMPERATURE)) {
            Some(raw) => raw.trim().parse::<f32>().map_err(|e| ConfigError::Invalid {
                key: ENV_TEMPERATURE,
                reason: format!("{raw:?}: {e}"),
            })?,
            None => inference
                .and_then(|i| i.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
        };

        let timeout_secs = inference
            .and_then(|i| i.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_retries = inference
            .and_then(|i| i.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let settings = InferenceSettings::new(
            model,
            base_url,
            temperature,
            Duration::from_secs(timeout_secs),
            max_retries,
        )
        .map_err(|e| ConfigError::Invalid {
            key: "inference",
            reason: e.to_string(),
        })?;

        let require_upstream = self
            .pipeline
            .as_ref()
            .and_then(|p| p.require_upstream)
            .unwrap_or(true);

        Ok(ResolvedConfig {
            inference: settings,
            require_upstream,
        })
    }
}

fn validate_base_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        key: "inference.base_url",
        reason: format!("{raw:?}: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            key: "inference.base_url",
            reason: format!("{raw:?}: scheme must be http or https"),
        });
    }
    Ok(())
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".perito").join("config.toml"))
}
