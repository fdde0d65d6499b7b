//! End-to-end lesson session tests.
//!
//! A course is saved to a temp directory, the learner file is edited on disk
//! and the real `LocalRunner` executes it. The judge is a stub that compares
//! outputs, so these tests need `python3` but no network. They print a note
//! and return early when `python3` is missing.

use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tutorloop_engine::{
    Course, CourseStore, JudgeResult, Judging, LessonSession, Lesson, SessionState, Submission,
    TutorError,
};
use tutorloop_runner::LocalRunner;

/// Judge that accepts exactly when the output matches the reference.
#[derive(Default)]
struct OutputJudge {
    calls: AtomicUsize,
}

#[async_trait]
impl Judging for OutputJudge {
    async fn judge(&self, submission: &Submission) -> tutorloop_engine::Result<JudgeResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let is_correct = submission.output == submission.correct_output;
        Ok(JudgeResult {
            is_correct,
            advice: if is_correct {
                "Well done".to_string()
            } else {
                format!("Expected `{}`", submission.correct_output.trim_end())
            },
        })
    }
}

fn python_available() -> bool {
    let available = Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !available {
        eprintln!("python3 not found, skipping");
    }
    available
}

fn loops101() -> Course {
    Course {
        id: "loops101".to_string(),
        title: "Loops 101".to_string(),
        description: "Learn loops in Python".to_string(),
        programming_language: "py".to_string(),
        lessons: vec![Lesson {
            id: "say-hi".to_string(),
            title: "Say hi".to_string(),
            slides: vec!["## Setup Guide\nInstall Python 3".to_string()],
            task_description: "Print hi".to_string(),
            initial_code: "# write your code here\n".to_string(),
            correct_output: "hi\n".to_string(),
            file_name: "main.py".to_string(),
        }],
    }
}

/// Saves `course` and opens a session on it with the given runner timeout.
fn open_session(
    root: &Path,
    course: &Course,
    judge: Arc<OutputJudge>,
    timeout: Option<Duration>,
) -> LessonSession {
    let store = CourseStore::new(root);
    store.save(course).expect("Failed to save course");
    let loaded = store.load(&course.id).expect("Failed to load course");

    let runner = LocalRunner::new()
        .without_opener()
        .with_optional_timeout(timeout);
    LessonSession::new(loaded, store, Arc::new(runner), judge)
}

/// Acknowledges slides and the task until the learner may attempt.
fn advance_to_attempt(session: &mut LessonSession) {
    while !matches!(session.state(), SessionState::Attempting { .. }) {
        session.acknowledge().expect("Failed to advance");
    }
}

/// The learner writes a correct solution and finishes after one attempt.
#[tokio::test]
async fn test_single_correct_attempt_finishes_course() {
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let judge = Arc::new(OutputJudge::default());
    let mut session = open_session(dir.path(), &loops101(), judge.clone(), None);

    assert_eq!(
        session.state(),
        &SessionState::Presenting {
            lesson: 0,
            slide: 0
        }
    );
    advance_to_attempt(&mut session);

    let file = session.lesson_file_path().expect("No lesson file");
    assert!(file.is_absolute(), "Lesson file path should be absolute");
    assert_eq!(
        std::fs::read_to_string(&file).expect("Failed to read file"),
        "# write your code here\n"
    );
    std::fs::write(&file, "print('hi')\n").expect("Failed to write file");

    let record = session.attempt().await.expect("Attempt failed");
    assert_eq!(record.output, "hi\n");
    assert_eq!(record.attempt, 1);
    assert!(record.verdict.is_correct);
    assert!(record.ended_at >= record.started_at);

    session.acknowledge().expect("Failed to acknowledge verdict");
    assert_eq!(session.state(), &SessionState::Finished);
    assert_eq!(session.attempts().len(), 1);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        std::fs::read_to_string(&file).expect("Failed to read file"),
        "print('hi')\n",
        "The session must never rewrite the learner file"
    );
}

/// Starter code that is already correct finishes the course untouched.
#[tokio::test]
async fn test_correct_starter_code_finishes_without_edits() {
    if !python_available() {
        return;
    }
    let mut course = loops101();
    course.lessons[0].initial_code = "print('hi')\n".to_string();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let judge = Arc::new(OutputJudge::default());
    let mut session = open_session(dir.path(), &course, judge.clone(), None);
    advance_to_attempt(&mut session);

    let file = session.lesson_file_path().expect("No lesson file");
    let record = session.attempt().await.expect("Attempt failed");
    assert_eq!(record.output, "hi\n");
    assert_eq!(record.attempt, 1);
    assert!(record.verdict.is_correct);

    session.acknowledge().expect("Failed to acknowledge verdict");
    assert_eq!(session.state(), &SessionState::Finished);
    assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        std::fs::read_to_string(&file).expect("Failed to read file"),
        "print('hi')\n"
    );
}

/// A wrong answer loops back to `Attempting`; the fix is picked up from disk.
#[tokio::test]
async fn test_wrong_then_fixed_attempt() {
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let judge = Arc::new(OutputJudge::default());
    let mut session = open_session(dir.path(), &loops101(), judge.clone(), None);
    advance_to_attempt(&mut session);
    let file = session.lesson_file_path().expect("No lesson file");

    std::fs::write(&file, "print('bye')\n").expect("Failed to write file");
    let first = session.attempt().await.expect("Attempt failed");
    assert!(!first.verdict.is_correct);
    assert_eq!(first.output, "bye\n");

    session.acknowledge().expect("Failed to acknowledge verdict");
    assert_eq!(session.state(), &SessionState::Attempting { lesson: 0 });

    std::fs::write(&file, "print('hi')\n").expect("Failed to write file");
    let second = session.attempt().await.expect("Attempt failed");
    assert!(second.verdict.is_correct);
    assert_eq!(second.attempt, 2);

    session.acknowledge().expect("Failed to acknowledge verdict");
    assert!(session.state().is_terminal());
    assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
}

/// A crashing program is reported with its output and can be retried.
#[tokio::test]
async fn test_crashing_program_is_recoverable() {
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let judge = Arc::new(OutputJudge::default());
    let mut session = open_session(dir.path(), &loops101(), judge.clone(), None);
    advance_to_attempt(&mut session);
    let file = session.lesson_file_path().expect("No lesson file");

    std::fs::write(&file, "print('hi')\nraise SystemExit(2)\n").expect("Failed to write file");
    let err = session.attempt().await.expect_err("Attempt should fail");

    assert!(
        matches!(err, TutorError::ExecutionFailure { .. }),
        "Expected ExecutionFailure, got: {err:?}"
    );
    assert!(err.is_learner_recoverable());
    assert_eq!(err.execution_output(), Some("hi\n"));
    assert_eq!(session.state(), &SessionState::Attempting { lesson: 0 });
    assert_eq!(judge.calls.load(Ordering::SeqCst), 0, "Judge must not run");
    assert!(session.attempts().is_empty());
}

/// A program that never exits is killed at the configured limit.
#[tokio::test]
async fn test_runaway_program_times_out() {
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let judge = Arc::new(OutputJudge::default());
    let mut session = open_session(
        dir.path(),
        &loops101(),
        judge,
        Some(Duration::from_millis(500)),
    );
    advance_to_attempt(&mut session);
    let file = session.lesson_file_path().expect("No lesson file");

    std::fs::write(&file, "while True:\n    pass\n").expect("Failed to write file");
    let err = session.attempt().await.expect_err("Attempt should time out");

    assert!(
        matches!(err, TutorError::ExecutionFailure { .. }),
        "Expected ExecutionFailure, got: {err:?}"
    );
    assert_eq!(session.state(), &SessionState::Attempting { lesson: 0 });
}

/// Re-saving a course keeps the learner's edits.
#[test]
fn test_resave_keeps_learner_edits() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = CourseStore::new(dir.path());
    let course = loops101();
    store.save(&course).expect("Failed to save course");

    let file = store
        .lesson_file_path(&course, &course.lessons[0])
        .expect("No lesson file");
    std::fs::write(&file, "print('mine')\n").expect("Failed to write file");

    store.save(&course).expect("Failed to save course again");
    assert_eq!(
        store
            .read_lesson_file(&course, &course.lessons[0])
            .expect("Failed to read"),
        "print('mine')\n"
    );
}
