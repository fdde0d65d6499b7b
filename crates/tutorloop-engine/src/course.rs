//! Course and lesson data model.
//!
//! A [`Course`] is the unit the generator produces and the store persists as
//! `course.json`. Field names on the wire follow the generation tool schema.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

/// A generated programming course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Short slug used as the course directory name.
    #[serde(rename = "course_id")]
    pub id: String,

    /// Display title.
    pub title: String,

    /// One-paragraph description.
    pub description: String,

    /// File-extension-like language tag (`go`, `py`, `html`, ...).
    pub programming_language: String,

    /// Lessons in presentation order.
    pub lessons: Vec<Lesson>,
}

/// One exercise within a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Slug used as the lesson directory name; unique within the course.
    #[serde(rename = "lesson_id")]
    pub id: String,

    /// Display title.
    pub title: String,

    /// Markdown pages shown before the task.
    pub slides: Vec<String>,

    /// Markdown instructions for the exercise.
    pub task_description: String,

    /// Starter code written to the learner's file.
    pub initial_code: String,

    /// Reference output used as grading context.
    pub correct_output: String,

    /// Name of the editable file; `main.<language>` when empty.
    #[serde(default)]
    pub file_name: String,
}

impl Lesson {
    /// Returns the editable file name, defaulting to `main.<language>`.
    #[must_use]
    pub fn file_name_or_default(&self, language: &str) -> String {
        if self.file_name.trim().is_empty() {
            format!("main.{}", language.trim())
        } else {
            self.file_name.clone()
        }
    }
}

impl Course {
    /// Parses a course from the JSON text of a generation tool call.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::MalformedResponse` if the text is not a JSON
    /// object with every required field.
    pub fn from_tool_arguments(arguments: &str) -> Result<Self> {
        serde_json::from_str(arguments)
            .map_err(|e| TutorError::malformed(format!("course payload does not match schema: {e}")))
    }

    /// Checks the structural rules a course must satisfy before it is stored.
    ///
    /// - at least one lesson
    /// - a non-empty `programming_language`
    /// - course id and every lesson id sanitize to a usable path segment
    /// - lesson ids are unique after sanitization
    /// - a non-empty `file_name` sanitizes to a usable file name
    ///
    /// # Errors
    ///
    /// Returns `TutorError::MalformedResponse` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.lessons.is_empty() {
            return Err(TutorError::malformed("course has no lessons"));
        }
        if self.programming_language.trim().is_empty() {
            return Err(TutorError::malformed("course has no programming_language"));
        }
        if sanitize_segment(&self.id).is_none() {
            return Err(TutorError::malformed(format!(
                "course_id '{}' is not a usable directory name",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for lesson in &self.lessons {
            let Some(segment) = sanitize_segment(&lesson.id) else {
                return Err(TutorError::malformed(format!(
                    "lesson_id '{}' is not a usable directory name",
                    lesson.id
                )));
            };
            if !seen.insert(segment) {
                return Err(TutorError::malformed(format!(
                    "lesson_id '{}' appears more than once",
                    lesson.id
                )));
            }
            if !lesson.file_name.trim().is_empty() && sanitize_segment(&lesson.file_name).is_none()
            {
                return Err(TutorError::malformed(format!(
                    "file_name '{}' of lesson '{}' is not a usable file name",
                    lesson.file_name, lesson.id
                )));
            }
        }
        Ok(())
    }

    /// Rewrites ids and file names into the form they take on disk.
    ///
    /// The course id and lesson ids become their sanitized path segment, and
    /// empty `file_name`s become `main.<programming_language>`. Call after
    /// [`validate`](Self::validate); unusable values are left unchanged.
    pub fn normalize(&mut self) {
        if let Some(id) = sanitize_segment(&self.id) {
            self.id = id;
        }
        for lesson in &mut self.lessons {
            if let Some(id) = sanitize_segment(&lesson.id) {
                lesson.id = id;
            }
            let file_name = lesson.file_name_or_default(&self.programming_language);
            lesson.file_name = sanitize_segment(&file_name).unwrap_or(file_name);
        }
    }
}

/// Reduces an identifier to a single safe path segment.
///
/// Both `/` and `\` count as separators. Trailing separators are ignored and
/// the last segment is kept. Returns `None` for an empty result, `.` or `..`.
///
/// ```
/// use tutorloop_engine::course::sanitize_segment;
///
/// assert_eq!(sanitize_segment("../../etc").as_deref(), Some("etc"));
/// assert_eq!(sanitize_segment("loops/"), Some("loops".to_string()));
/// assert_eq!(sanitize_segment(".."), None);
/// ```
#[must_use]
pub fn sanitize_segment(raw: &str) -> Option<String> {
    let segment = raw
        .trim()
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match segment {
        "" | "." | ".." => None,
        s => Some(s.to_string()),
    }
}

/// Requested course size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CourseLength {
    /// A few lessons.
    Short,
    /// The default size.
    #[default]
    Medium,
    /// Many lessons.
    Long,
}

impl CourseLength {
    /// Returns the lowercase name sent to the model.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

impl fmt::Display for CourseLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseLength {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "long" => Ok(Self::Long),
            _ => Err(format!(
                "invalid course length '{s}': expected one of 'short', 'medium', 'long'"
            )),
        }
    }
}
