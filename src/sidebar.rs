use std::collections::HashSet;

use serde::Serialize;

use crate::{
    course::{ChapterId, CourseOutline, LessonId},
    error::Error,
    unlock,
};

/// Per-lesson affordance in the course sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LessonDisplayState {
    Locked,
    Unlocked,
    CurrentInProgress,
    CurrentNearComplete,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonView {
    pub lesson_id: LessonId,
    pub title: String,
    pub state: LessonDisplayState,
    pub watch_percentage: f32,
    pub has_quiz: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterView {
    pub chapter_id: ChapterId,
    pub title: String,
    pub lessons: Vec<LessonView>,
}

/// Pure projection from structural data plus progress/unlock state to the
/// sidebar render model. No server calls; everything is read from what the
/// session already holds.
pub fn project(
    outline: &CourseOutline,
    completed: &HashSet<LessonId>,
    percent_of: impl Fn(LessonId) -> f32,
    current: Option<LessonId>,
    threshold: f32,
    preview: bool,
) -> Vec<ChapterView> {
    outline
        .chapters
        .iter()
        .map(|chapter| ChapterView {
            chapter_id: chapter.id,
            title: chapter.title.clone(),
            lessons: chapter
                .lessons
                .iter()
                .map(|lesson| {
                    let percentage = percent_of(lesson.id);
                    let state = if completed.contains(&lesson.id) {
                        LessonDisplayState::Completed
                    } else if current == Some(lesson.id) {
                        if percentage >= threshold {
                            LessonDisplayState::CurrentNearComplete
                        } else {
                            LessonDisplayState::CurrentInProgress
                        }
                    } else if unlock::is_unlocked(outline, completed, lesson.id, preview) {
                        LessonDisplayState::Unlocked
                    } else {
                        LessonDisplayState::Locked
                    };
                    LessonView {
                        lesson_id: lesson.id,
                        title: lesson.title.clone(),
                        state,
                        watch_percentage: percentage,
                        has_quiz: lesson.has_quiz(),
                    }
                })
                .collect(),
        })
        .collect()
}

/// Navigation guard: clicking a locked lesson is rejected with a message
/// instead of navigating; every other state navigates.
pub fn try_navigate(
    outline: &CourseOutline,
    completed: &HashSet<LessonId>,
    target: LessonId,
    preview: bool,
) -> Result<LessonId, Error> {
    if outline.lesson(target).is_none() {
        return Err(Error::NotFound {
            kind: "lesson",
            id: target,
        });
    }
    if unlock::is_unlocked(outline, completed, target, preview) {
        Ok(target)
    } else {
        Err(Error::LessonLocked { lesson_id: target })
    }
}
