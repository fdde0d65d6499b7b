//! LLM provider gateway.
//!
//! The [`StructuredCompletion`] trait is the single capability the engine
//! needs from a model: given a system prompt, some messages and one required
//! tool, return the JSON arguments of the tool call. Backends are built by
//! identity through a [`ProviderRegistry`].
//!
//! # Example
//!
//! ```no_run
//! use tutorloop_engine::provider::{
//!     CompletionRequest, Message, ProviderRegistry, ProviderSettings, ToolSchema,
//! };
//!
//! # async fn example() -> tutorloop_engine::Result<()> {
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.build("openai", &ProviderSettings::new("sk-...", "gpt-5-mini"), None)?;
//!
//! let request = CompletionRequest::new(
//!     "You are helpful.",
//!     vec![Message::user("Say hi")],
//!     ToolSchema::new("reply", "Reply to the user", serde_json::json!({
//!         "type": "object",
//!         "properties": { "text": { "type": "string" } },
//!         "required": ["text"]
//!     })),
//! );
//! let arguments = provider.structured_complete(&request).await?;
//! # Ok(())
//! # }
//! ```

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatibleProvider;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{LlmErrorKind, Result, TutorError};

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message setting context/behavior.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// A role-tagged text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who is speaking.
    pub role: Role,
    /// Text content.
    pub content: String,
}

impl Message {
    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A function the model is required to call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Function name.
    pub name: String,
    /// What the function is for.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

impl ToolSchema {
    /// Creates a tool schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// One structured completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System prompt.
    pub system: String,
    /// Conversation messages, in order.
    pub messages: Vec<Message>,
    /// The tool the model must invoke.
    pub tool: ToolSchema,
}

impl CompletionRequest {
    /// Creates a request.
    pub fn new(system: impl Into<String>, messages: Vec<Message>, tool: ToolSchema) -> Self {
        Self {
            system: system.into(),
            messages,
            tool,
        }
    }
}

/// Credentials and model for building a provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// API key.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Optional base URL override.
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ProviderSettings {
    /// Creates settings without a base URL override.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    /// Overrides the backend's base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(default)
            .trim_end_matches('/')
    }
}

impl From<&ProviderConfig> for ProviderSettings {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        }
    }
}

/// A backend able to perform structured (tool-call) completions.
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    /// Returns the provider identity (e.g. "openai").
    fn name(&self) -> &str;

    /// Performs the completion and returns the tool call's arguments as JSON text.
    ///
    /// # Errors
    ///
    /// Returns `TransportFailure` for network or status failures,
    /// `ProviderInitFailure` when the backend rejects the credential, and
    /// `MalformedResponse` when the answer has no usable tool call.
    async fn structured_complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Constructor for a provider backend.
pub type ProviderFactory =
    fn(&ProviderSettings, Option<Duration>) -> Result<Arc<dyn StructuredCompletion>>;

/// Maps provider identities to backend constructors.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("identities", &self.identities())
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in backends:
    /// `openai`, `anthropic`, `gemini` and `zai`.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new()
            .with_provider("openai", OpenAiCompatibleProvider::openai)
            .with_provider("zai", OpenAiCompatibleProvider::zai)
            .with_provider("anthropic", AnthropicProvider::build)
            .with_provider("gemini", GeminiProvider::build)
    }

    /// Registers (or replaces) a backend constructor.
    #[must_use]
    pub fn with_provider(mut self, identity: impl Into<String>, factory: ProviderFactory) -> Self {
        self.factories
            .insert(identity.into().to_lowercase(), factory);
        self
    }

    /// Returns the registered identities in sorted order.
    #[must_use]
    pub fn identities(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Returns `true` if `identity` has a registered backend.
    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.factories.contains_key(&identity.trim().to_lowercase())
    }

    /// Builds the backend for `identity`.
    ///
    /// No network activity happens here.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ProviderNotConfigured` for an unknown identity or
    /// an empty API key or model, and `TutorError::ProviderInitFailure` if
    /// the HTTP client cannot be constructed.
    pub fn build(
        &self,
        identity: &str,
        settings: &ProviderSettings,
        timeout: Option<Duration>,
    ) -> Result<Arc<dyn StructuredCompletion>> {
        let key = identity.trim().to_lowercase();
        let Some(factory) = self.factories.get(&key) else {
            warn!(provider = identity, "Unknown provider requested");
            return Err(TutorError::provider_not_configured(identity));
        };
        if settings.api_key.trim().is_empty() || settings.model.trim().is_empty() {
            return Err(TutorError::provider_not_configured(identity));
        }
        debug!(provider = %key, model = %settings.model, ?timeout, "Building provider");
        factory(settings, timeout)
    }
}

// ============================================================================
// Shared HTTP plumbing for the built-in backends
// ============================================================================

fn http_client(provider: &str, timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| TutorError::provider_init(provider, e.to_string()))
}

fn secret_header(provider: &str, value: &str) -> Result<HeaderValue> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        TutorError::provider_init(provider, "API key contains characters not allowed in a header")
    })?;
    header.set_sensitive(true);
    Ok(header)
}

/// Sends a JSON request and decodes the JSON response body.
async fn send_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    let response = request.send().await.map_err(|e| {
        let kind = if e.is_timeout() || e.is_connect() {
            LlmErrorKind::Network
        } else {
            LlmErrorKind::Other
        };
        TutorError::transport(provider, kind, e.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(provider, status = status.as_u16(), "Provider returned an error status");
        let message = format!("HTTP {status}: {}", truncate(&body, 500));
        return Err(match LlmErrorKind::from_status(status.as_u16()) {
            LlmErrorKind::Authentication => TutorError::provider_init(provider, message),
            kind => TutorError::transport(provider, kind, message),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| TutorError::transport(provider, LlmErrorKind::Network, e.to_string()))?;
    serde_json::from_str(&body)
        .map_err(|e| TutorError::malformed(format!("{provider} response is not valid JSON: {e}")))
}

/// Re-encodes a decoded arguments object as JSON text.
fn encode_arguments(provider: &str, arguments: &Value) -> Result<String> {
    match arguments {
        Value::Object(map) if !map.is_empty() => serde_json::to_string(arguments)
            .map_err(|e| TutorError::malformed(format!("{provider} arguments: {e}"))),
        _ => Err(TutorError::malformed(format!(
            "{provider} returned empty tool call arguments"
        ))),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
