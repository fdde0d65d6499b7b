//! On-disk course storage.
//!
//! Layout under the courses root:
//!
//! ```text
//! <root>/<course_id>/course.json
//! <root>/<course_id>/<lesson_id>/task.md
//! <root>/<course_id>/<lesson_id>/<file_name>
//! ```
//!
//! Every identifier is reduced with [`sanitize_segment`] before it becomes
//! part of a path, so nothing written here escapes the root.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::course::{sanitize_segment, Course, Lesson};
use crate::error::{Result, TutorError};

/// File name of the persisted course document.
pub const COURSE_FILE_NAME: &str = "course.json";

/// File name of the per-lesson task description.
pub const TASK_FILE_NAME: &str = "task.md";

/// Reads and writes courses below a root directory.
#[derive(Debug, Clone)]
pub struct CourseStore {
    root: PathBuf,
}

impl CourseStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the courses root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory of the course with the given id.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::CourseNotFound` if the id sanitizes to nothing.
    pub fn course_dir(&self, course_id: &str) -> Result<PathBuf> {
        sanitize_segment(course_id)
            .map(|segment| self.root.join(segment))
            .ok_or_else(|| TutorError::course_not_found(course_id, &self.root))
    }

    /// Returns the directory of a lesson within a course.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::PersistenceFailure` if either id sanitizes to nothing.
    pub fn lesson_dir(&self, course: &Course, lesson: &Lesson) -> Result<PathBuf> {
        let course_segment = self.segment(&course.id)?;
        let lesson_segment = self.segment(&lesson.id)?;
        Ok(self.root.join(course_segment).join(lesson_segment))
    }

    /// Returns the absolute path of the learner's editable file for a lesson.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::PersistenceFailure` if an identifier is unusable.
    pub fn lesson_file_path(&self, course: &Course, lesson: &Lesson) -> Result<PathBuf> {
        let file_name = lesson.file_name_or_default(&course.programming_language);
        let file_segment = self.segment(&file_name)?;
        Ok(absolutize(self.lesson_dir(course, lesson)?.join(file_segment)))
    }

    fn segment(&self, raw: &str) -> Result<String> {
        sanitize_segment(raw).ok_or_else(|| {
            TutorError::persistence(
                &self.root,
                format!("'{raw}' is not a usable file or directory name"),
            )
        })
    }

    /// Persists a course and materializes its lesson files.
    ///
    /// Every path is resolved before anything is written. `course.json` is
    /// replaced atomically after the lessons, and every `task.md` is rewritten.
    /// A lesson's editable file is only created when it does not exist yet,
    /// so learner edits survive regeneration of the same course id.
    ///
    /// Returns the course directory.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::PersistenceFailure` on any I/O or encoding failure.
    #[instrument(skip(self, course), fields(course_id = %course.id, lessons = course.lessons.len()))]
    pub fn save(&self, course: &Course) -> Result<PathBuf> {
        let course_dir = self.root.join(self.segment(&course.id)?);
        let lessons = course
            .lessons
            .iter()
            .map(|lesson| {
                let lesson_dir = self.lesson_dir(course, lesson)?;
                let code_path = self.lesson_file_path(course, lesson)?;
                Ok((lesson, lesson_dir, code_path))
            })
            .collect::<Result<Vec<_>>>()?;

        for (lesson, lesson_dir, code_path) in lessons {
            fs::create_dir_all(&lesson_dir)
                .map_err(|e| TutorError::persistence(&lesson_dir, e))?;

            let task_path = lesson_dir.join(TASK_FILE_NAME);
            fs::write(&task_path, &lesson.task_description)
                .map_err(|e| TutorError::persistence(&task_path, e))?;

            write_if_absent(&code_path, lesson.initial_code.as_bytes())?;
        }

        // course.json goes last: list() only sees fully materialized courses.
        fs::create_dir_all(&course_dir).map_err(|e| TutorError::persistence(&course_dir, e))?;
        let json = serde_json::to_string_pretty(course)
            .map_err(|e| TutorError::persistence(&course_dir, e))?;
        write_atomic(&course_dir.join(COURSE_FILE_NAME), json.as_bytes())?;

        info!(path = %course_dir.display(), "Course saved");
        Ok(course_dir)
    }

    /// Loads the course with the given id.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::CourseNotFound` if there is no such course and
    /// `TutorError::PersistenceFailure` if `course.json` cannot be read or parsed.
    #[instrument(skip(self))]
    pub fn load(&self, course_id: &str) -> Result<Course> {
        let course_dir = self.course_dir(course_id)?;
        let path = course_dir.join(COURSE_FILE_NAME);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TutorError::course_not_found(course_id, course_dir));
            }
            Err(e) => return Err(TutorError::persistence(&path, e)),
        };
        serde_json::from_str(&contents).map_err(|e| TutorError::persistence(&path, e))
    }

    /// Lists every course under the root, sorted by directory name.
    ///
    /// A missing root yields an empty list. Subdirectories without a
    /// `course.json` are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::PersistenceFailure` if the root cannot be read or
    /// a `course.json` is unreadable or malformed.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn list(&self) -> Result<Vec<Course>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Courses root does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(TutorError::persistence(&self.root, e)),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TutorError::persistence(&self.root, e))?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        let mut courses = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let path = dir.join(COURSE_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(contents) => courses.push(
                    serde_json::from_str(&contents)
                        .map_err(|e| TutorError::persistence(&path, e))?,
                ),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(dir = %dir.display(), "Skipping directory without course.json");
                }
                Err(e) => return Err(TutorError::persistence(&path, e)),
            }
        }
        Ok(courses)
    }

    /// Reads the current contents of a lesson's editable file.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::PersistenceFailure` if the file cannot be read.
    pub fn read_lesson_file(&self, course: &Course, lesson: &Lesson) -> Result<String> {
        let path = self.lesson_file_path(course, lesson)?;
        fs::read_to_string(&path).map_err(|e| TutorError::persistence(&path, e))
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

/// Writes `contents` to a temporary sibling and renames it over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| TutorError::persistence(dir, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| TutorError::persistence(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| TutorError::persistence(path, e.error))?;
    Ok(())
}

/// Creates `path` with `contents` unless it already exists.
fn write_if_absent(path: &Path, contents: &[u8]) -> Result<()> {
    match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => file
            .write_all(contents)
            .map_err(|e| TutorError::persistence(path, e)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %path.display(), "Keeping existing learner file");
            Ok(())
        }
        Err(e) => Err(TutorError::persistence(path, e)),
    }
}
