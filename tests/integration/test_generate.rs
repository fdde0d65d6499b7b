//! Integration tests for course generation and judging over HTTP.
//!
//! The real provider backends are pointed at a local axum server that mimics
//! the OpenAI, Anthropic and Gemini endpoints, so the full request/response
//! path (headers, tool forcing, tool-call extraction, status mapping) runs
//! without network access.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tutorloop_engine::{
    CourseGenerator, CourseLength, CourseStore, Judge, Judging, LlmErrorKind, ProviderRegistry,
    ProviderSettings, StructuredCompletion, Submission, TutorError,
};

/// One request seen by the mock server.
#[derive(Debug, Clone)]
struct Captured {
    route: String,
    headers: HeaderMap,
    body: Value,
}

/// Shared state of the mock provider server.
#[derive(Clone)]
struct MockState {
    /// Tool arguments every endpoint answers with.
    reply: Value,
    /// When set, every endpoint fails with this status instead.
    fail_with: Option<StatusCode>,
    seen: Arc<Mutex<Vec<Captured>>>,
}

impl MockState {
    fn replying(reply: Value) -> Self {
        Self {
            reply,
            fail_with: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing(status: StatusCode) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::replying(Value::Null)
        }
    }

    fn record(&self, route: impl Into<String>, headers: HeaderMap, body: Value) {
        self.seen
            .lock()
            .expect("mock state poisoned")
            .push(Captured {
                route: route.into(),
                headers,
                body,
            });
    }

    fn captured(&self) -> Vec<Captured> {
        self.seen.lock().expect("mock state poisoned").clone()
    }

    fn failure(&self) -> Option<Response> {
        self.fail_with
            .map(|status| (status, "{\"error\":\"mock failure\"}").into_response())
    }
}

async fn openai_chat(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let tool = body["tools"][0]["function"]["name"].clone();
    state.record("/v1/chat/completions", headers, body);
    if let Some(response) = state.failure() {
        return response;
    }
    Json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": tool, "arguments": state.reply.to_string() }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    }))
    .into_response()
}

async fn anthropic_messages(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let tool = body["tool_choice"]["name"].clone();
    state.record("/v1/messages", headers, body);
    if let Some(response) = state.failure() {
        return response;
    }
    Json(json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": [
            { "type": "text", "text": "Calling the tool." },
            { "type": "tool_use", "id": "toolu_1", "name": tool, "input": state.reply }
        ],
        "stop_reason": "tool_use"
    }))
    .into_response()
}

async fn gemini_generate(
    State(state): State<MockState>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let tool = body["tools"][0]["functionDeclarations"][0]["name"].clone();
    state.record(format!("/v1beta/models/{call}"), headers, body);
    if let Some(response) = state.failure() {
        return response;
    }
    Json(json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{ "functionCall": { "name": tool, "args": state.reply } }]
            },
            "finishReason": "STOP"
        }]
    }))
    .into_response()
}

/// Spawns the mock server and returns its base URL.
async fn spawn_mock(state: MockState) -> String {
    let router = Router::new()
        .route("/v1/chat/completions", post(openai_chat))
        .route("/v1/messages", post(anthropic_messages))
        .route("/v1beta/models/:call", post(gemini_generate))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    format!("http://{addr}")
}

/// Builds a registered backend that talks to the mock server.
fn provider(identity: &str, base_url: &str) -> Arc<dyn StructuredCompletion> {
    let settings = ProviderSettings::new("test-key", "mock-model").with_base_url(base_url);
    ProviderRegistry::with_defaults()
        .build(identity, &settings, None)
        .expect("Failed to build provider")
}

fn course_reply() -> Value {
    json!({
        "course_id": "loops101",
        "title": "Loops 101",
        "description": "Learn loops in Python",
        "programming_language": "py",
        "lessons": [
            {
                "lesson_id": "for-loops",
                "title": "For loops",
                "slides": ["## Setup Guide\nInstall Python 3", "## for\nIterate a range"],
                "task_description": "Print hi",
                "initial_code": "# write your code here\n",
                "correct_output": "hi\n"
            },
            {
                "lesson_id": "while-loops",
                "title": "While loops",
                "slides": ["## while\nLoop until false"],
                "task_description": "Print 1 to 3",
                "initial_code": "i = 1\n",
                "correct_output": "1\n2\n3\n",
                "file_name": "count.py"
            }
        ]
    })
}

fn submission() -> Submission {
    Submission {
        task_description: "Print hi".to_string(),
        code: "print('hi')\n".to_string(),
        output: "hi\n".to_string(),
        correct_output: "hi\n".to_string(),
    }
}

fn header<'a>(captured: &'a Captured, name: &str) -> &'a str {
    captured
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

// ============================================================================
// Generation
// ============================================================================

/// Generates a course through the OpenAI backend and checks what lands on disk.
#[tokio::test]
async fn test_openai_generation_persists_course() {
    let state = MockState::replying(course_reply());
    let base = spawn_mock(state.clone()).await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = CourseStore::new(dir.path());

    let generator = CourseGenerator::new(provider("openai", &format!("{base}/v1")), store.clone());
    let course = generator
        .generate("Python loops for beginners", CourseLength::Short)
        .await
        .expect("Generation failed");

    assert_eq!(course.id, "loops101");
    assert_eq!(course.lessons.len(), 2);
    assert_eq!(store.load("loops101").expect("Failed to load"), course);

    let root = dir.path().join("loops101");
    assert!(root.join("course.json").is_file());
    assert_eq!(
        std::fs::read_to_string(root.join("for-loops/main.py")).expect("missing main.py"),
        "# write your code here\n"
    );
    assert!(root.join("while-loops/count.py").is_file());
    assert_eq!(
        std::fs::read_to_string(root.join("while-loops/task.md")).expect("missing task.md"),
        "Print 1 to 3"
    );

    let seen = state.captured();
    assert_eq!(seen.len(), 1, "Expected exactly one provider call");
    let request = &seen[0];
    assert_eq!(header(request, "authorization"), "Bearer test-key");
    assert_eq!(request.body["model"], "mock-model");
    assert_eq!(request.body["tool_choice"], "required");
    assert_eq!(
        request.body["tools"][0]["function"]["name"],
        "generate_course_data"
    );
    assert_eq!(request.body["messages"][0]["role"], "system");
    assert!(request.body["messages"][1]["content"]
        .as_str()
        .unwrap_or_default()
        .contains("Python loops for beginners"));
    assert_eq!(request.body["messages"][2]["content"], "Course length: short");
}

/// Z.ai speaks the OpenAI protocol under its own identity.
#[tokio::test]
async fn test_zai_uses_chat_completions_route() {
    let state = MockState::replying(course_reply());
    let base = spawn_mock(state.clone()).await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let backend = provider("zai", &format!("{base}/v1"));
    assert_eq!(backend.name(), "zai");

    let generator = CourseGenerator::new(backend, CourseStore::new(dir.path()));
    generator
        .generate("Loops", CourseLength::Medium)
        .await
        .expect("Generation failed");

    assert_eq!(state.captured()[0].route, "/v1/chat/completions");
}

/// A tool call missing `lessons` is rejected and nothing is written.
#[tokio::test]
async fn test_schema_rejection_writes_nothing() {
    let mut reply = course_reply();
    reply
        .as_object_mut()
        .expect("reply is an object")
        .remove("lessons");
    let base = spawn_mock(MockState::replying(reply)).await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let generator = CourseGenerator::new(
        provider("anthropic", &base),
        CourseStore::new(dir.path()),
    );
    let err = generator
        .generate("Loops", CourseLength::Short)
        .await
        .expect_err("Generation should fail");

    assert!(
        matches!(err, TutorError::MalformedResponse { .. }),
        "Expected MalformedResponse, got: {err:?}"
    );
    assert!(
        !dir.path().join("loops101").exists(),
        "Nothing should be persisted on rejection"
    );
}

/// Generating through Gemini hits the model-specific route.
#[tokio::test]
async fn test_gemini_generation_route() {
    let state = MockState::replying(course_reply());
    let base = spawn_mock(state.clone()).await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let generator = CourseGenerator::new(provider("gemini", &base), CourseStore::new(dir.path()));
    let course = generator
        .generate("Loops", CourseLength::Long)
        .await
        .expect("Generation failed");
    assert_eq!(course.title, "Loops 101");

    let seen = state.captured();
    assert_eq!(seen[0].route, "/v1beta/models/mock-model:generateContent");
    assert_eq!(header(&seen[0], "x-goog-api-key"), "test-key");
    assert_eq!(
        seen[0].body["toolConfig"]["functionCallingConfig"]["allowedFunctionNames"],
        json!(["generate_course_data"])
    );
}

// ============================================================================
// Judging
// ============================================================================

/// The Anthropic backend forces the judge tool and returns its verdict.
#[tokio::test]
async fn test_anthropic_judge_verdict() {
    let state = MockState::replying(json!({ "is_correct": true, "advice": "**Nice** work" }));
    let base = spawn_mock(state.clone()).await;

    let judge = Judge::new(provider("anthropic", &base));
    let verdict = judge.judge(&submission()).await.expect("Judging failed");

    assert!(verdict.is_correct);
    assert_eq!(verdict.advice, "**Nice** work");

    let seen = state.captured();
    assert_eq!(seen[0].route, "/v1/messages");
    assert_eq!(header(&seen[0], "x-api-key"), "test-key");
    assert_eq!(header(&seen[0], "anthropic-version"), "2023-06-01");
    assert_eq!(
        seen[0].body["tool_choice"],
        json!({ "type": "tool", "name": "judge_code" })
    );
    assert_eq!(seen[0].body["messages"].as_array().map(Vec::len), Some(4));
}

/// The Gemini backend returns a wrong verdict unchanged.
#[tokio::test]
async fn test_gemini_judge_wrong_verdict() {
    let state = MockState::replying(json!({ "is_correct": false, "advice": "Print `hi`" }));
    let base = spawn_mock(state).await;

    let judge = Judge::new(provider("gemini", &base));
    let verdict = judge.judge(&submission()).await.expect("Judging failed");

    assert!(!verdict.is_correct);
    assert_eq!(verdict.advice, "Print `hi`");
}

// ============================================================================
// Failure mapping
// ============================================================================

/// A rejected key fails as an initialization problem, not a transport one.
#[tokio::test]
async fn test_unauthorized_is_provider_init_failure() {
    let base = spawn_mock(MockState::failing(StatusCode::UNAUTHORIZED)).await;

    let judge = Judge::new(provider("openai", &format!("{base}/v1")));
    let err = judge
        .judge(&submission())
        .await
        .expect_err("Judging should fail");

    assert!(
        matches!(err, TutorError::ProviderInitFailure { .. }),
        "Expected ProviderInitFailure, got: {err:?}"
    );
}

/// Server errors surface as transient transport failures.
#[tokio::test]
async fn test_server_error_is_transport_failure() {
    let base = spawn_mock(MockState::failing(StatusCode::INTERNAL_SERVER_ERROR)).await;

    let judge = Judge::new(provider("anthropic", &base));
    let err = judge
        .judge(&submission())
        .await
        .expect_err("Judging should fail");

    assert!(
        matches!(
            err,
            TutorError::TransportFailure {
                kind: LlmErrorKind::Server,
                ..
            }
        ),
        "Expected Server TransportFailure, got: {err:?}"
    );
    assert!(err.is_transient());
    assert!(err.to_string().contains("Suggestion:"));
}

/// Rate limiting is classified separately.
#[tokio::test]
async fn test_rate_limit_is_classified() {
    let base = spawn_mock(MockState::failing(StatusCode::TOO_MANY_REQUESTS)).await;

    let judge = Judge::new(provider("gemini", &base));
    let err = judge
        .judge(&submission())
        .await
        .expect_err("Judging should fail");

    assert!(
        matches!(
            err,
            TutorError::TransportFailure {
                kind: LlmErrorKind::RateLimit,
                ..
            }
        ),
        "Expected RateLimit TransportFailure, got: {err:?}"
    );
}

/// An unreachable endpoint is a network failure.
#[tokio::test]
async fn test_unreachable_endpoint_is_network_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    drop(listener);

    let judge = Judge::new(provider("anthropic", &format!("http://{addr}")));
    let err = judge
        .judge(&submission())
        .await
        .expect_err("Judging should fail");

    assert!(
        matches!(
            err,
            TutorError::TransportFailure {
                kind: LlmErrorKind::Network,
                ..
            }
        ),
        "Expected Network TransportFailure, got: {err:?}"
    );
}

/// An unknown identity fails before any request is made.
#[tokio::test]
async fn test_unknown_provider_makes_no_call() {
    let state = MockState::replying(course_reply());
    let base = spawn_mock(state.clone()).await;

    let settings = ProviderSettings::new("test-key", "mock-model").with_base_url(base);
    let result = ProviderRegistry::with_defaults().build("unknown", &settings, None);

    assert!(
        matches!(result, Err(TutorError::ProviderNotConfigured { .. })),
        "Expected ProviderNotConfigured"
    );
    assert!(state.captured().is_empty());
}
