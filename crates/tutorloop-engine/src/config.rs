//! Configuration types for tutorloop.
//!
//! The configuration selects the active LLM provider, stores per-provider
//! credentials and model choices, and tunes where courses live and how long
//! provider calls and learner programs may take.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

/// Directory under the home directory holding config and courses.
const CONFIG_DIR_NAME: &str = ".tutorloop";

/// The default config file name.
const CONFIG_FILE_NAME: &str = "config.json";

/// Directory under the config directory holding generated courses.
const COURSES_DIR_NAME: &str = "courses";

/// Provider identities with a built-in backend.
pub const KNOWN_PROVIDERS: [&str; 4] = ["gemini", "openai", "anthropic", "zai"];

/// Default active provider.
fn default_active_provider() -> String {
    "gemini".to_string()
}

/// Main configuration for tutorloop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Identity of the provider used for generation and judging.
    #[serde(default = "default_active_provider")]
    pub active_provider: String,

    /// Root directory for generated courses. Defaults to `~/.tutorloop/courses`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courses_dir: Option<PathBuf>,

    /// Per-request timeout for provider calls, in seconds. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Wall-clock limit for learner programs, in seconds. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,

    /// Credentials and model choice per provider identity.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active_provider: default_active_provider(),
            courses_dir: None,
            request_timeout_secs: None,
            run_timeout_secs: None,
            providers: BTreeMap::new(),
        }
    }
}

/// Credentials and model selection for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// API key sent to the provider.
    #[serde(default)]
    pub api_key: String,

    /// Model identifier, e.g. `gemini-2.5-pro`.
    #[serde(default)]
    pub model: String,

    /// Override for the provider's base URL (OpenAI-compatible gateways).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Config {
    /// Returns the default config directory (`~/.tutorloop`).
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigValidationError` if the home directory
    /// cannot be determined.
    pub fn default_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR_NAME))
            .ok_or_else(|| {
                TutorError::config_validation(
                    "cannot determine the home directory",
                    "Set the HOME environment variable or pass --config and --courses-dir",
                )
            })
    }

    /// Returns the default config file path (`~/.tutorloop/config.json`).
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::default_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        Self::load_from_file(&Self::default_path()?)
    }

    /// Loads configuration from a specific directory.
    ///
    /// Looks for `config.json` in the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigParseError` if the file exists but cannot be
    /// read or contains invalid JSON.
    ///
    /// Returns `TutorError::ConfigValidationError` if the configuration values
    /// are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(TutorError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TutorError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::PersistenceFailure` if the file cannot be written.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TutorError::persistence(parent, e))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| TutorError::persistence(path, e))?;
        std::fs::write(path, json).map_err(|e| TutorError::persistence(path, e))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// Checks that:
    /// - `activeProvider` is not empty
    /// - timeouts, when present, are greater than 0
    /// - `coursesDir`, when present, is not empty
    ///
    /// Whether the active provider is known and has a credential is checked
    /// when the provider is built, not here.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigValidationError` if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        if self.active_provider.trim().is_empty() {
            return Err(TutorError::config_validation(
                "activeProvider must not be empty",
                format!("Set activeProvider to one of: {}", KNOWN_PROVIDERS.join(", ")),
            ));
        }

        if self.request_timeout_secs == Some(0) {
            return Err(TutorError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Remove requestTimeoutSecs for no limit, or set it to at least 1",
            ));
        }

        if self.run_timeout_secs == Some(0) {
            return Err(TutorError::config_validation(
                "runTimeoutSecs must be greater than 0",
                "Remove runTimeoutSecs for no limit, or set it to at least 1",
            ));
        }

        if self
            .courses_dir
            .as_ref()
            .is_some_and(|d| d.as_os_str().is_empty())
        {
            return Err(TutorError::config_validation(
                "coursesDir must not be empty",
                "Remove coursesDir to use ~/.tutorloop/courses, or give a directory path",
            ));
        }

        Ok(())
    }

    /// Returns the courses root, falling back to `~/.tutorloop/courses`.
    ///
    /// # Errors
    ///
    /// Returns an error if no directory is configured and the home directory
    /// cannot be determined.
    pub fn courses_root(&self) -> Result<PathBuf> {
        match &self.courses_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::default_dir()?.join(COURSES_DIR_NAME)),
        }
    }

    /// Returns the settings of the active provider, if any were saved.
    #[must_use]
    pub fn active_provider_config(&self) -> Option<&ProviderConfig> {
        self.providers.get(&self.active_provider)
    }

    /// Stores credentials for `provider` and makes it the active provider.
    pub fn set_provider(
        &mut self,
        provider: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) {
        let provider = provider.into().trim().to_lowercase();
        let entry = self.providers.entry(provider.clone()).or_default();
        entry.api_key = api_key.into();
        entry.model = model.into();
        self.active_provider = provider;
    }

    /// Per-request timeout for provider calls.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Wall-clock limit for learner programs.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

/// Returns suggested model identifiers for a provider.
///
/// Returns an empty slice for unknown providers.
#[must_use]
pub fn suggested_models(provider: &str) -> &'static [&'static str] {
    match provider.trim().to_lowercase().as_str() {
        "gemini" => &[
            "gemini-3-pro-preview",
            "gemini-3-flash-preview",
            "gemini-flash-latest",
            "gemini-flash-lite-latest",
            "gemini-2.5-pro",
        ],
        "openai" => &["gpt-5.2", "gpt-5-mini", "gpt-5-nano"],
        "anthropic" => &["claude-opus-4-6", "claude-sonnet-4-5", "claude-haiku-4-5"],
        "zai" => &["glm-4.6", "glm-4.5-air"],
        _ => &[],
    }
}

/// Masks an API key for display, keeping only the last four characters.
#[must_use]
pub fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = key.chars().skip(count - 4).collect();
    format!("{}{tail}", "*".repeat(count - 4))
}
