//! OpenAI-compatible chat completions backend (`openai`, `zai`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{
    encode_arguments, http_client, secret_header, send_json, CompletionRequest, ProviderSettings,
    Role, StructuredCompletion,
};
use crate::error::{Result, TutorError};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ZAI_BASE_URL: &str = "https://api.z.ai/api/paas/v4";

/// Backend for any service speaking the OpenAI chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    identity: String,
    base_url: String,
    model: String,
    authorization: HeaderValue,
    http_client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Creates a backend for `identity` talking to `default_base_url` unless
    /// the settings override it.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ProviderInitFailure` if the key cannot be sent as
    /// a header or the HTTP client cannot be built.
    pub fn new(
        identity: impl Into<String>,
        default_base_url: &str,
        settings: &ProviderSettings,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let identity = identity.into();
        let authorization = secret_header(&identity, &format!("Bearer {}", settings.api_key))?;
        Ok(Self {
            base_url: settings.base_url_or(default_base_url).to_string(),
            model: settings.model.clone(),
            authorization,
            http_client: http_client(&identity, timeout)?,
            identity,
        })
    }

    /// Registry constructor for OpenAI.
    pub fn openai(
        settings: &ProviderSettings,
        timeout: Option<Duration>,
    ) -> Result<Arc<dyn StructuredCompletion>> {
        Ok(Arc::new(Self::new("openai", OPENAI_BASE_URL, settings, timeout)?))
    }

    /// Registry constructor for Z.ai.
    pub fn zai(
        settings: &ProviderSettings,
        timeout: Option<Duration>,
    ) -> Result<Arc<dyn StructuredCompletion>> {
        Ok(Arc::new(Self::new("zai", ZAI_BASE_URL, settings, timeout)?))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    tools: Vec<ToolDefinition<'a>>,
    tool_choice: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ToolDefinition<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDefinition<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    arguments: String,
}

fn build_body<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatCompletionRequest<'a> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(ChatMessage {
        role: Role::System,
        content: &request.system,
    });
    messages.extend(request.messages.iter().map(|m| ChatMessage {
        role: m.role,
        content: &m.content,
    }));

    ChatCompletionRequest {
        model,
        messages,
        tools: vec![ToolDefinition {
            kind: "function",
            function: FunctionDefinition {
                name: &request.tool.name,
                description: &request.tool.description,
                parameters: &request.tool.parameters,
            },
        }],
        tool_choice: "required",
    }
}

fn extract_arguments(provider: &str, response: ChatCompletionResponse) -> Result<String> {
    let arguments = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.tool_calls?.into_iter().next())
        .map(|call| call.function.arguments)
        .ok_or_else(|| TutorError::malformed(format!("{provider} response has no tool call")))?;

    if arguments.trim().is_empty() {
        return Err(TutorError::malformed(format!(
            "{provider} returned empty tool call arguments"
        )));
    }
    // Validate and normalize through the shared encoder.
    let value: Value = serde_json::from_str(&arguments).map_err(|e| {
        TutorError::malformed(format!("{provider} tool call arguments are not JSON: {e}"))
    })?;
    encode_arguments(provider, &value)
}

#[async_trait]
impl StructuredCompletion for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.identity
    }

    #[instrument(skip(self, request), fields(provider = %self.identity, model = %self.model, tool = %request.tool.name))]
    async fn structured_complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = build_body(&self.model, request);
        let builder = self
            .http_client
            .post(self.endpoint())
            .header(AUTHORIZATION, self.authorization.clone())
            .json(&body);

        let response: ChatCompletionResponse = send_json(&self.identity, builder).await?;
        let arguments = extract_arguments(&self.identity, response)?;
        debug!(bytes = arguments.len(), "Received tool call");
        Ok(arguments)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::provider::{Message, ToolSchema};
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            "be terse",
            vec![Message::user("Task: x"), Message::user("Course length: short")],
            ToolSchema::new("judge_code", "Judge", json!({"type": "object"})),
        )
    }

    #[test]
    fn test_body_forces_the_tool() {
        let req = request();
        let body = serde_json::to_value(build_body("gpt-5-mini", &req)).unwrap();

        assert_eq!(body["model"], "gpt-5-mini");
        assert_eq!(body["tool_choice"], "required");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "judge_code");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be terse");
        assert_eq!(body["messages"][2]["content"], "Course length: short");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_extract_arguments() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": null, "tool_calls": [
                { "id": "c1", "type": "function",
                  "function": { "name": "judge_code", "arguments": "{\"is_correct\": true, \"advice\": \"ok\"}" } }
            ]}}]
        }))
        .unwrap();
        let arguments = extract_arguments("openai", response).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&arguments).unwrap(),
            json!({"is_correct": true, "advice": "ok"})
        );
    }

    #[test]
    fn test_missing_tool_call_is_malformed() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": "hello", "tool_calls": null } }]
        }))
        .unwrap();
        assert!(matches!(
            extract_arguments("openai", response),
            Err(TutorError::MalformedResponse { .. })
        ));

        let empty: ChatCompletionResponse = serde_json::from_value(json!({})).unwrap();
        assert!(extract_arguments("openai", empty).is_err());
    }

    #[test]
    fn test_non_json_arguments_are_malformed() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "tool_calls": [{ "function": { "arguments": "{oops" } }] } }]
        }))
        .unwrap();
        assert!(matches!(
            extract_arguments("zai", response),
            Err(TutorError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_endpoints() {
        let settings = ProviderSettings::new("k", "m");
        let openai = OpenAiCompatibleProvider::new("openai", OPENAI_BASE_URL, &settings, None).unwrap();
        assert_eq!(openai.endpoint(), "https://api.openai.com/v1/chat/completions");

        let zai = OpenAiCompatibleProvider::new("zai", ZAI_BASE_URL, &settings, None).unwrap();
        assert_eq!(zai.endpoint(), "https://api.z.ai/api/paas/v4/chat/completions");

        let local = OpenAiCompatibleProvider::new(
            "openai",
            OPENAI_BASE_URL,
            &settings.with_base_url("http://127.0.0.1:8080/v1"),
            None,
        )
        .unwrap();
        assert_eq!(local.endpoint(), "http://127.0.0.1:8080/v1/chat/completions");
    }
}
