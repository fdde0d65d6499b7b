//! Grading of learner submissions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::error::{Result, TutorError};
use crate::provider::{CompletionRequest, Message, StructuredCompletion, ToolSchema};

/// Name of the judging tool.
pub const JUDGE_TOOL_NAME: &str = "judge_code";

const JUDGE_SYSTEM_PROMPT: &str = "You are a programming instructor. Compare the student's code and output with the task and the model answer. Check whether the logic and the output meet the requirements. Use Markdown.";

/// Everything the judge sees about one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// The lesson's task description.
    pub task_description: String,
    /// The learner's source code as it was run.
    pub code: String,
    /// What the learner's program printed.
    pub output: String,
    /// The reference output of a correct solution.
    pub correct_output: String,
}

/// The judge's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeResult {
    /// Whether the submission solves the task.
    pub is_correct: bool,
    /// Short Markdown feedback in the learner's language.
    pub advice: String,
}

/// Scores submissions.
#[async_trait]
pub trait Judging: Send + Sync {
    /// Judges one submission.
    async fn judge(&self, submission: &Submission) -> Result<JudgeResult>;
}

/// Returns the JSON schema of the `judge_code` tool.
#[must_use]
pub fn judge_tool() -> ToolSchema {
    ToolSchema::new(
        JUDGE_TOOL_NAME,
        "Report whether the student's submission is correct, with feedback.",
        json!({
            "type": "object",
            "properties": {
                "is_correct": { "type": "boolean" },
                "advice": {
                    "type": "string",
                    "description": "Super-short, helpful feedback in the student's language. Use Markdown but do not break the line."
                }
            },
            "required": ["is_correct", "advice"]
        }),
    )
}

/// Builds the completion request for a submission.
#[must_use]
pub fn judge_request(submission: &Submission) -> CompletionRequest {
    CompletionRequest::new(
        JUDGE_SYSTEM_PROMPT,
        vec![
            Message::user(format!("Task:{}", submission.task_description)),
            Message::user(format!("Model Output:{}", submission.correct_output)),
            Message::user(format!("Student Code:{}", submission.code)),
            Message::user(format!("Student Output:{}", submission.output)),
        ],
        judge_tool(),
    )
}

/// LLM-backed judge.
pub struct Judge {
    provider: Arc<dyn StructuredCompletion>,
}

impl std::fmt::Debug for Judge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Judge")
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl Judge {
    /// Creates a judge backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn StructuredCompletion>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Judging for Judge {
    #[instrument(skip(self, submission), fields(provider = self.provider.name()))]
    async fn judge(&self, submission: &Submission) -> Result<JudgeResult> {
        let arguments = self
            .provider
            .structured_complete(&judge_request(submission))
            .await?;
        let result: JudgeResult = serde_json::from_str(&arguments).map_err(|e| {
            TutorError::malformed(format!("judge payload does not match schema: {e}"))
        })?;
        info!(is_correct = result.is_correct, "Submission judged");
        Ok(result)
    }
}
