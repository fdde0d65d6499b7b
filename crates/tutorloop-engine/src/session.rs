//! Lesson session state machine.
//!
//! A [`LessonSession`] walks a learner through one course: the slides of
//! each lesson, then its task, then a run-and-judge loop that repeats until
//! the judge accepts the submission.
//!
//! ```text
//! Presenting(l, s) --ack--> Presenting(l, s+1) | TaskShown(l)
//! TaskShown(l)     --ack--> Attempting(l)
//! Attempting(l)    --attempt--> Judged(l, verdict)
//! Judged(l, ok)    --ack--> Presenting(l+1, 0) | TaskShown(l+1) | Finished
//! Judged(l, !ok)   --ack--> Attempting(l)
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use tutorloop_runner::CodeRunner;

use crate::course::{Course, Lesson};
use crate::error::{Result, TutorError};
use crate::judge::{JudgeResult, Judging, Submission};
use crate::store::CourseStore;

// ============================================================================
// SessionState
// ============================================================================

/// Where the learner currently is in the course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Showing slide `slide` of lesson `lesson`.
    Presenting {
        /// Lesson index.
        lesson: usize,
        /// Slide index within the lesson.
        slide: usize,
    },
    /// Showing the task of lesson `lesson`.
    TaskShown {
        /// Lesson index.
        lesson: usize,
    },
    /// Waiting for the learner to edit the file and submit.
    Attempting {
        /// Lesson index.
        lesson: usize,
    },
    /// The last attempt was judged.
    Judged {
        /// Lesson index.
        lesson: usize,
        /// The judge's verdict.
        verdict: JudgeResult,
    },
    /// Every lesson is solved.
    Finished,
}

impl SessionState {
    /// Returns `true` once the course is complete.
    ///
    /// # Examples
    ///
    /// ```
    /// use tutorloop_engine::SessionState;
    ///
    /// assert!(SessionState::Finished.is_terminal());
    /// assert!(!SessionState::Attempting { lesson: 0 }.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns the index of the current lesson, if any.
    #[must_use]
    pub const fn lesson_index(&self) -> Option<usize> {
        match self {
            Self::Presenting { lesson, .. }
            | Self::TaskShown { lesson }
            | Self::Attempting { lesson }
            | Self::Judged { lesson, .. } => Some(*lesson),
            Self::Finished => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presenting { lesson, slide } => {
                write!(f, "presenting slide {slide} of lesson {lesson}")
            }
            Self::TaskShown { lesson } => write!(f, "showing task of lesson {lesson}"),
            Self::Attempting { lesson } => write!(f, "attempting lesson {lesson}"),
            Self::Judged { lesson, verdict } => write!(
                f,
                "judged lesson {lesson} ({})",
                if verdict.is_correct { "correct" } else { "wrong" }
            ),
            Self::Finished => write!(f, "finished"),
        }
    }
}

// ============================================================================
// AttemptRecord
// ============================================================================

/// Record of one run-and-judge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Id of the lesson attempted.
    pub lesson_id: String,

    /// Attempt number within the lesson (1-indexed).
    pub attempt: u32,

    /// Output of the learner's program.
    pub output: String,

    /// The judge's verdict.
    pub verdict: JudgeResult,

    /// When the attempt started.
    pub started_at: DateTime<Utc>,

    /// When the verdict arrived.
    pub ended_at: DateTime<Utc>,
}

/// Progress notifications emitted during [`LessonSession::attempt_with_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase<'a> {
    /// The learner's program is about to run.
    Running,
    /// The program finished with this output.
    Ran {
        /// Captured output.
        output: &'a str,
    },
    /// The submission is being judged.
    Judging,
}

// ============================================================================
// LessonSession
// ============================================================================

/// Drives a learner through one course.
pub struct LessonSession {
    course: Course,
    store: CourseStore,
    runner: Arc<dyn CodeRunner>,
    judge: Arc<dyn Judging>,
    state: SessionState,
    attempts: Vec<AttemptRecord>,
}

impl fmt::Debug for LessonSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LessonSession")
            .field("course", &self.course.id)
            .field("state", &self.state)
            .field("attempts", &self.attempts.len())
            .finish_non_exhaustive()
    }
}

impl LessonSession {
    /// Starts a session at the first slide of the first lesson.
    ///
    /// A lesson without slides starts at its task; a course without lessons
    /// is immediately finished.
    #[must_use]
    pub fn new(
        course: Course,
        store: CourseStore,
        runner: Arc<dyn CodeRunner>,
        judge: Arc<dyn Judging>,
    ) -> Self {
        let state = Self::entry_state(&course, 0);
        info!(course_id = %course.id, lessons = course.lessons.len(), %state, "Session started");
        Self {
            course,
            store,
            runner,
            judge,
            state,
            attempts: Vec::new(),
        }
    }

    fn entry_state(course: &Course, lesson: usize) -> SessionState {
        match course.lessons.get(lesson) {
            None => SessionState::Finished,
            Some(l) if l.slides.is_empty() => SessionState::TaskShown { lesson },
            Some(_) => SessionState::Presenting { lesson, slide: 0 },
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns the course being studied.
    #[must_use]
    pub const fn course(&self) -> &Course {
        &self.course
    }

    /// Returns every attempt made so far, oldest first.
    #[must_use]
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Returns the current lesson, or `None` when finished.
    #[must_use]
    pub fn current_lesson(&self) -> Option<&Lesson> {
        self.state
            .lesson_index()
            .and_then(|i| self.course.lessons.get(i))
    }

    /// Returns the absolute path of the current lesson's editable file.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` when finished and
    /// `TutorError::PersistenceFailure` if the file name is unusable.
    pub fn lesson_file_path(&self) -> Result<PathBuf> {
        let lesson = self
            .current_lesson()
            .ok_or_else(|| TutorError::invalid_transition(&self.state, "locate the lesson file"))?;
        self.store.lesson_file_path(&self.course, lesson)
    }

    /// Advances past the current slide, task or verdict.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` in `Attempting` (which
    /// needs [`attempt`](Self::attempt)) and in `Finished`.
    pub fn acknowledge(&mut self) -> Result<&SessionState> {
        let next = match &self.state {
            SessionState::Presenting { lesson, slide } => {
                let slides = self.course.lessons.get(*lesson).map_or(0, |l| l.slides.len());
                if slide + 1 < slides {
                    SessionState::Presenting {
                        lesson: *lesson,
                        slide: slide + 1,
                    }
                } else {
                    SessionState::TaskShown { lesson: *lesson }
                }
            }
            SessionState::TaskShown { lesson } => SessionState::Attempting { lesson: *lesson },
            SessionState::Judged { lesson, verdict } if verdict.is_correct => {
                Self::entry_state(&self.course, lesson + 1)
            }
            SessionState::Judged { lesson, .. } => SessionState::Attempting { lesson: *lesson },
            SessionState::Attempting { .. } | SessionState::Finished => {
                return Err(TutorError::invalid_transition(&self.state, "acknowledge"));
            }
        };
        debug!(from = %self.state, to = %next, "Session transition");
        self.state = next;
        Ok(&self.state)
    }

    /// Runs and judges the learner's current file.
    ///
    /// # Errors
    ///
    /// See [`attempt_with_progress`](Self::attempt_with_progress).
    pub async fn attempt(&mut self) -> Result<AttemptRecord> {
        self.attempt_with_progress(|_| {}).await
    }

    /// Runs and judges the learner's current file, reporting each phase.
    ///
    /// Reads the file fresh, runs it, sends it to the judge, records the
    /// attempt and moves to `Judged`. On any error the state stays
    /// `Attempting` so the learner can retry.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` outside `Attempting`,
    /// `TutorError::ExecutionFailure` if the program cannot be run to
    /// completion, `TutorError::PersistenceFailure` if the file cannot be
    /// read, and judge errors unchanged.
    #[instrument(skip(self, on_progress), fields(course_id = %self.course.id))]
    pub async fn attempt_with_progress<F>(&mut self, mut on_progress: F) -> Result<AttemptRecord>
    where
        F: FnMut(AttemptPhase<'_>) + Send,
    {
        let SessionState::Attempting { lesson: index } = self.state else {
            return Err(TutorError::invalid_transition(&self.state, "attempt"));
        };
        let lesson = self
            .course
            .lessons
            .get(index)
            .ok_or_else(|| TutorError::invalid_transition(&self.state, "attempt"))?;

        let started_at = Utc::now();
        let path = self.store.lesson_file_path(&self.course, lesson)?;
        let code = self.store.read_lesson_file(&self.course, lesson)?;

        on_progress(AttemptPhase::Running);
        let run = self
            .runner
            .run(&self.course.programming_language, &path)
            .await
            .map_err(|e| {
                warn!(lesson_id = %lesson.id, error = %e, "Learner program failed");
                TutorError::from(e)
            })?;
        on_progress(AttemptPhase::Ran {
            output: &run.output,
        });

        on_progress(AttemptPhase::Judging);
        let submission = Submission {
            task_description: lesson.task_description.clone(),
            code,
            output: run.output.clone(),
            correct_output: lesson.correct_output.clone(),
        };
        let verdict = self.judge.judge(&submission).await?;

        let attempt = self.attempt_count(&lesson.id) + 1;
        let record = AttemptRecord {
            lesson_id: lesson.id.clone(),
            attempt,
            output: run.output,
            verdict: verdict.clone(),
            started_at,
            ended_at: Utc::now(),
        };
        info!(
            lesson_id = %record.lesson_id,
            attempt,
            is_correct = verdict.is_correct,
            "Attempt judged"
        );

        self.attempts.push(record.clone());
        self.state = SessionState::Judged {
            lesson: index,
            verdict,
        };
        Ok(record)
    }

    fn attempt_count(&self, lesson_id: &str) -> u32 {
        let count = self
            .attempts
            .iter()
            .filter(|a| a.lesson_id == lesson_id)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Returns the header and Markdown of the slide being presented.
    #[must_use]
    pub fn current_slide(&self) -> Option<(String, &str)> {
        let SessionState::Presenting { lesson, slide } = self.state else {
            return None;
        };
        let l = self.course.lessons.get(lesson)?;
        let markdown = l.slides.get(slide)?;
        Some((slide_header(&self.course.title, &l.title, slide), markdown.as_str()))
    }

    /// Returns the header and Markdown of the current lesson's task.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` when finished.
    pub fn task_view(&self) -> Result<(String, String)> {
        let lesson = self
            .current_lesson()
            .ok_or_else(|| TutorError::invalid_transition(&self.state, "show the task"))?;
        let path = self.store.lesson_file_path(&self.course, lesson)?;
        Ok((
            task_header(&self.course.title, &lesson.title),
            task_markdown(&lesson.task_description, &path),
        ))
    }
}

// ============================================================================
// Views
// ============================================================================

/// Header shown above a slide; pages are numbered from 1.
#[must_use]
pub fn slide_header(course_title: &str, lesson_title: &str, slide: usize) -> String {
    format!("{course_title} - {lesson_title}: page {}", slide + 1)
}

/// Header shown above a task.
#[must_use]
pub fn task_header(course_title: &str, lesson_title: &str) -> String {
    format!("{course_title} - {lesson_title}: task")
}

/// Markdown block describing the task and the file to edit.
#[must_use]
pub fn task_markdown(task_description: &str, file: &Path) -> String {
    format!(
        "## Task:\n{task_description}\n\n**File to edit:**\n```text\n{}\n```",
        file.display()
    )
}

/// Markdown block with the program's output.
#[must_use]
pub fn output_markdown(output: &str) -> String {
    format!("## Execution output\n> {output}")
}

/// Markdown block announcing the verdict and the judge's advice.
#[must_use]
pub fn verdict_markdown(verdict: &JudgeResult) -> String {
    let heading = if verdict.is_correct {
        "## 🎉 CORRECT!  \n\n"
    } else {
        "## ❌ WRONG...  \n\n"
    };
    format!("{heading}### AI Advice  \n> {}", verdict.advice)
}
