//! tutorloop engine
//!
//! Generates programming courses with an LLM, stores them on disk and walks
//! a learner through slides, tasks and judged attempts.

pub mod config;
pub mod course;
pub mod error;
pub mod generator;
pub mod judge;
pub mod provider;
pub mod session;
pub mod store;

pub use config::{mask_key, suggested_models, Config, ProviderConfig, KNOWN_PROVIDERS};
pub use course::{Course, CourseLength, Lesson};
pub use error::{LlmErrorKind, Result, TutorError};
pub use generator::{CourseGenerator, GENERATION_TOOL_NAME};
pub use judge::{Judge, JudgeResult, Judging, Submission, JUDGE_TOOL_NAME};
pub use provider::{
    AnthropicProvider, CompletionRequest, GeminiProvider, Message, OpenAiCompatibleProvider,
    ProviderFactory, ProviderRegistry, ProviderSettings, Role, StructuredCompletion, ToolSchema,
};
pub use session::{AttemptPhase, AttemptRecord, LessonSession, SessionState};
pub use store::CourseStore;
