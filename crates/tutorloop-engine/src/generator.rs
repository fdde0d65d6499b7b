//! Course generation.
//!
//! One structured completion with the `generate_course_data` tool turns a
//! free-text topic into a [`Course`], which is validated and persisted.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::course::{Course, CourseLength};
use crate::error::Result;
use crate::provider::{CompletionRequest, Message, StructuredCompletion, ToolSchema};
use crate::store::CourseStore;

/// Name of the generation tool.
pub const GENERATION_TOOL_NAME: &str = "generate_course_data";

const GENERATION_SYSTEM_PROMPT: &str = "\
You are a professional coding instructor. Generate a structured programming course for the user's topic by calling the provided tool.
Follow these rules strictly:
1. Write \"title\", \"description\", \"slides\", \"task_description\" and every comment inside \"initial_code\" in the same natural language as the user's topic.
2. Write every other field, identifier and piece of metadata in English so the system can process it.
3. \"initial_code\" must contain real source code in the target programming language; only its explanatory comments use the user's language.
4. Write the slides in Markdown so they are easy to read.
5. Keep the course_id short and very simple.
6. Keep the course title simple.
7. The first slide of the first lesson MUST be a \"Setup Guide\" explaining how to install the language's toolchain and how to run the code on a local machine.";

const SLIDES_DESCRIPTION: &str = "\
An array of Markdown strings, one element per slide page. Rules: \
1. Start each slide's content with a '##' header. \
2. Write naturally in the student's language (the language of the topic). \
3. Do not put page numbers in the Markdown. \
4. The VERY FIRST slide of the FIRST lesson must be a 'Local Setup Guide' for the programming language (installation and run commands).";

/// Returns the JSON schema of the `generate_course_data` tool.
#[must_use]
pub fn generation_tool() -> ToolSchema {
    ToolSchema::new(
        GENERATION_TOOL_NAME,
        "Create the complete course: metadata plus ordered lessons with slides, a task, starter code and the expected output.",
        generation_parameters(),
    )
}

fn generation_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "course_id": { "type": "string" },
            "title": { "type": "string" },
            "description": { "type": "string" },
            "programming_language": {
                "type": "string",
                "description": "The file extension of the code file to create (e.g. go, py, js), NOT a natural language (ja, en, ...)"
            },
            "lessons": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "lesson_id": { "type": "string" },
                        "title": { "type": "string" },
                        "slides": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": SLIDES_DESCRIPTION
                        },
                        "task_description": { "type": "string" },
                        "initial_code": {
                            "type": "string",
                            "description": "The boilerplate code the student starts from."
                        },
                        "correct_output": {
                            "type": "string",
                            "description": "The expected standard output (stdout) of a correct solution."
                        },
                        "file_name": {
                            "type": "string",
                            "description": "The name of the code file (e.g. main.go, index.html)"
                        }
                    },
                    "required": [
                        "lesson_id", "title", "slides", "task_description",
                        "initial_code", "correct_output"
                    ]
                }
            }
        },
        "required": ["course_id", "title", "description", "programming_language", "lessons"]
    })
}

/// Builds the completion request for a topic and length.
#[must_use]
pub fn generation_request(topic: &str, length: CourseLength) -> CompletionRequest {
    CompletionRequest::new(
        GENERATION_SYSTEM_PROMPT,
        vec![
            Message::user(format!("Topic: \"\"\"\n{topic}\n\"\"\"")),
            Message::user(format!("Course length: {length}")),
        ],
        generation_tool(),
    )
}

/// Generates courses with an LLM and stores them.
pub struct CourseGenerator {
    provider: Arc<dyn StructuredCompletion>,
    store: CourseStore,
}

impl std::fmt::Debug for CourseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourseGenerator")
            .field("provider", &self.provider.name())
            .field("store", &self.store)
            .finish()
    }
}

impl CourseGenerator {
    /// Creates a generator that writes into `store`.
    #[must_use]
    pub fn new(provider: Arc<dyn StructuredCompletion>, store: CourseStore) -> Self {
        Self { provider, store }
    }

    /// Generates, validates and persists a course for `topic`.
    ///
    /// # Errors
    ///
    /// Propagates provider errors unchanged. Returns
    /// `TutorError::MalformedResponse` if the tool call does not describe a
    /// valid course and `TutorError::PersistenceFailure` if it cannot be saved.
    #[instrument(skip(self, topic, length), fields(provider = self.provider.name(), %length))]
    pub async fn generate(&self, topic: &str, length: CourseLength) -> Result<Course> {
        let request = generation_request(topic, length);
        let arguments = self.provider.structured_complete(&request).await?;

        let mut course = Course::from_tool_arguments(&arguments)?;
        course.validate()?;
        course.normalize();

        let dir = self.store.save(&course)?;
        info!(
            course_id = %course.id,
            lessons = course.lessons.len(),
            path = %dir.display(),
            "Course generated"
        );
        Ok(course)
    }
}
