//! Resolved inference settings shared across crates.
//!
//! Raw TOML structs (all `Option`) stay in `perito-config`; the loader
//! resolves them into [`InferenceSettings`] at the parse boundary, so holding
//! a value means it was validated.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MODEL: &str = "llama3.1";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Highest sampling temperature accepted by the endpoint.
pub const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("model name must not be empty")]
    EmptyModel,
    #[error("base URL must not be empty")]
    EmptyBaseUrl,
    #[error("temperature must be within 0.0..={MAX_TEMPERATURE} (got {0})")]
    Temperature(f32),
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

/// Endpoint, model and sampling configuration for the inference client.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceSettings {
    model: String,
    base_url: String,
    temperature: f32,
    timeout: Duration,
    max_retries: u32,
}

impl InferenceSettings {
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        temperature: f32,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, SettingsError> {
        let model = model.into().trim().to_string();
        if model.is_empty() {
            return Err(SettingsError::EmptyModel);
        }
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SettingsError::EmptyBaseUrl);
        }
        if !temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(SettingsError::Temperature(temperature));
        }
        if timeout.is_zero() {
            return Err(SettingsError::ZeroTimeout);
        }
        Ok(Self {
            model,
            base_url,
            temperature,
            timeout,
            max_retries,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Base address without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Hard deadline for one inference call, retries included.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}
