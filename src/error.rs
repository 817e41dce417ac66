use crate::course::LessonId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Progress write failed in transit; retried at the next checkpoint,
    /// never surfaced to the learner as a blocking error.
    #[error("transient network failure: {0}")]
    Transient(String),
    /// The server (or the navigation guard) refused access to a lesson.
    #[error("complete previous lessons first")]
    LessonLocked { lesson_id: LessonId },
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
    #[error("fatal error: {0}")]
    Fatal(#[from] anyhow::Error),
}

impl Error {
    /// Transient failures are retried silently; everything else reaches the UI.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}
