//! Anthropic Messages API backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{
    encode_arguments, http_client, secret_header, send_json, CompletionRequest, ProviderSettings,
    Role, StructuredCompletion,
};
use crate::error::{Result, TutorError};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 16_384;
const PROVIDER: &str = "anthropic";

/// Backend for Anthropic's `/v1/messages` endpoint.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    base_url: String,
    model: String,
    api_key: HeaderValue,
    http_client: reqwest::Client,
}

impl AnthropicProvider {
    /// Creates the backend.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ProviderInitFailure` if the key cannot be sent as
    /// a header or the HTTP client cannot be built.
    pub fn new(settings: &ProviderSettings, timeout: Option<Duration>) -> Result<Self> {
        Ok(Self {
            base_url: settings.base_url_or(ANTHROPIC_BASE_URL).to_string(),
            model: settings.model.clone(),
            api_key: secret_header(PROVIDER, &settings.api_key)?,
            http_client: http_client(PROVIDER, timeout)?,
        })
    }

    /// Registry constructor.
    pub fn build(
        settings: &ProviderSettings,
        timeout: Option<Duration>,
    ) -> Result<Arc<dyn StructuredCompletion>> {
        Ok(Arc::new(Self::new(settings, timeout)?))
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<ApiMessage<'a>>,
    tools: Vec<ToolDefinition<'a>>,
    tool_choice: ToolChoice<'a>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ToolDefinition<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse {
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

fn build_body<'a>(model: &'a str, request: &'a CompletionRequest) -> MessagesRequest<'a> {
    // The API takes system text separately, so inline system messages join it.
    let mut system = request.system.clone();
    let mut messages = Vec::with_capacity(request.messages.len());
    for message in &request.messages {
        if message.role == Role::System {
            system.push_str("\n\n");
            system.push_str(&message.content);
        } else {
            messages.push(ApiMessage {
                role: message.role,
                content: &message.content,
            });
        }
    }

    MessagesRequest {
        model,
        max_tokens: MAX_TOKENS,
        system,
        messages,
        tools: vec![ToolDefinition {
            name: &request.tool.name,
            description: &request.tool.description,
            input_schema: &request.tool.parameters,
        }],
        tool_choice: ToolChoice {
            kind: "tool",
            name: &request.tool.name,
        },
    }
}

fn extract_arguments(response: MessagesResponse) -> Result<String> {
    let input = response
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::ToolUse { input } => Some(input),
            ContentBlock::Other => None,
        })
        .ok_or_else(|| TutorError::malformed("anthropic response has no tool_use block"))?;
    encode_arguments(PROVIDER, &input)
}

#[async_trait]
impl StructuredCompletion for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self, request), fields(provider = PROVIDER, model = %self.model, tool = %request.tool.name))]
    async fn structured_complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = build_body(&self.model, request);
        let builder = self
            .http_client
            .post(self.endpoint())
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: MessagesResponse = send_json(PROVIDER, builder).await?;
        let arguments = extract_arguments(response)?;
        debug!(bytes = arguments.len(), "Received tool call");
        Ok(arguments)
    }
}
