pub mod http;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::{
    course::{CourseId, CourseOutline, LessonId},
    error::Error,
    progress::LessonProgress,
    quiz::{QuizOutcome, QuizSubmission},
};

/// Body of a progress write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub lesson_id: LessonId,
    pub watch_percentage: f32,
    pub current_position: f64,
    pub total_watch_time: f64,
}

/// Authoritative progress returned by every successful write. The
/// `certificate_issued` flag rides along when the write completed the
/// course; the UI surfaces it as a banner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub progress: LessonProgress,
    #[serde(default)]
    pub certificate_issued: bool,
}

/// The enrollment's view of the whole course, fetched on page load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollmentProgress {
    pub lessons: Vec<LessonProgress>,
    pub completed_lessons: Option<u32>,
    pub total_lessons: Option<u32>,
    pub percentage: Option<f32>,
}

/// The backend progress/quiz API the coordinator talks to. The server is
/// authoritative for persistence, unlock checks, quiz scoring and attempt
/// limits; this trait is only the contract surface the client consumes.
pub trait ProgressBackend: Send + Sync + 'static {
    fn fetch_outline(
        &self,
        course_id: CourseId,
    ) -> impl Future<Output = Result<CourseOutline, Error>> + Send;

    fn fetch_progress(
        &self,
        course_id: CourseId,
    ) -> impl Future<Output = Result<EnrollmentProgress, Error>> + Send;

    /// Idempotent; called on lesson entry. Fails with
    /// [`Error::LessonLocked`] when prior lessons are incomplete.
    fn start_lesson(
        &self,
        lesson_id: LessonId,
    ) -> impl Future<Output = Result<LessonProgress, Error>> + Send;

    fn push_progress(
        &self,
        update: ProgressUpdate,
    ) -> impl Future<Output = Result<ProgressSnapshot, Error>> + Send;

    /// Idempotent; calling twice for a completed lesson is harmless.
    fn complete_lesson(
        &self,
        lesson_id: LessonId,
        quiz_score: Option<f32>,
    ) -> impl Future<Output = Result<ProgressSnapshot, Error>> + Send;

    fn submit_quiz(
        &self,
        lesson_id: LessonId,
        submission: QuizSubmission,
    ) -> impl Future<Output = Result<QuizOutcome, Error>> + Send;
}
