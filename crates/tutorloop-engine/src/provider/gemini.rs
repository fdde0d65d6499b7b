//! Google Gemini `generateContent` backend.

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

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const PROVIDER: &str = "gemini";

/// Backend for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    base_url: String,
    model: String,
    api_key: HeaderValue,
    http_client: reqwest::Client,
}

impl GeminiProvider {
    /// Creates the backend.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ProviderInitFailure` if the key cannot be sent as
    /// a header or the HTTP client cannot be built.
    pub fn new(settings: &ProviderSettings, timeout: Option<Duration>) -> Result<Self> {
        Ok(Self {
            base_url: settings.base_url_or(GEMINI_BASE_URL).to_string(),
            model: settings.model.trim_start_matches("models/").to_string(),
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
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    tools: Vec<Tool<'a>>,
    tool_config: ToolConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool<'a> {
    function_declarations: Vec<FunctionDeclaration<'a>>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig<'a> {
    function_calling_config: FunctionCallingConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionCallingConfig<'a> {
    mode: &'static str,
    allowed_function_names: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    args: Value,
}

fn build_body<'a>(request: &'a CompletionRequest) -> GenerateContentRequest<'a> {
    let mut system_parts = vec![TextPart {
        text: &request.system,
    }];
    let mut contents = Vec::with_capacity(request.messages.len());
    for message in &request.messages {
        let role = match message.role {
            Role::System => {
                system_parts.push(TextPart {
                    text: &message.content,
                });
                continue;
            }
            Role::User => "user",
            Role::Assistant => "model",
        };
        contents.push(Content {
            role: Some(role),
            parts: vec![TextPart {
                text: &message.content,
            }],
        });
    }

    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: system_parts,
        },
        contents,
        tools: vec![Tool {
            function_declarations: vec![FunctionDeclaration {
                name: &request.tool.name,
                description: &request.tool.description,
                parameters: &request.tool.parameters,
            }],
        }],
        tool_config: ToolConfig {
            function_calling_config: FunctionCallingConfig {
                mode: "ANY",
                allowed_function_names: vec![&request.tool.name],
            },
        },
    }
}

fn extract_arguments(response: GenerateContentResponse) -> Result<String> {
    let args = response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .find_map(|part| part.function_call)
        .map(|call| call.args)
        .ok_or_else(|| TutorError::malformed("gemini response has no functionCall part"))?;
    encode_arguments(PROVIDER, &args)
}

#[async_trait]
impl StructuredCompletion for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(skip(self, request), fields(provider = PROVIDER, model = %self.model, tool = %request.tool.name))]
    async fn structured_complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = build_body(request);
        let builder = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.clone())
            .json(&body);

        let response: GenerateContentResponse = send_json(PROVIDER, builder).await?;
        let arguments = extract_arguments(response)?;
        debug!(bytes = arguments.len(), "Received function call");
        Ok(arguments)
    }
}
