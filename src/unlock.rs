//! Sequential unlock rules, derived rather than stored.
//!
//! Course content is strictly linear, so "unlocked" is a pure function over
//! the outline and the completion set: the first lesson of the course, any
//! lesson whose predecessor is completed, and everything in preview mode.
//! Deriving at read time replaces the stored per-lesson unlock flags (and
//! the propagation they required) with something that cannot drift.

use std::collections::HashSet;

use crate::course::{CourseOutline, LessonId};

pub fn is_unlocked(
    outline: &CourseOutline,
    completed: &HashSet<LessonId>,
    lesson_id: LessonId,
    preview: bool,
) -> bool {
    if preview {
        return true;
    }
    match outline.prev_lesson(lesson_id) {
        // first lesson of the course
        None => outline.lesson(lesson_id).is_some(),
        Some(prev) => completed.contains(&prev),
    }
}

/// The single lesson newly reachable after completing `lesson_id`: the next
/// one in the chapter, else the first lesson of the next chapter. Purely
/// additive; nothing is ever locked by a completion.
pub fn unlocked_by_completion(
    outline: &CourseOutline,
    lesson_id: LessonId,
) -> Option<LessonId> {
    outline.next_lesson(lesson_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::tests::two_chapter_outline;

    #[test]
    fn first_lesson_starts_unlocked() {
        let outline = two_chapter_outline();
        let completed = HashSet::new();
        assert!(is_unlocked(&outline, &completed, 1, false));
        assert!(!is_unlocked(&outline, &completed, 2, false));
        assert!(!is_unlocked(&outline, &completed, 3, false));
    }

    #[test]
    fn completing_last_of_chapter_unlocks_only_next_chapter_head() {
        let outline = two_chapter_outline();
        let completed: HashSet<LessonId> = [1, 2].into_iter().collect();
        assert_eq!(unlocked_by_completion(&outline, 2), Some(3));
        assert!(is_unlocked(&outline, &completed, 3, false));
        // L4 is untouched by L2's completion
        assert!(!is_unlocked(&outline, &completed, 4, false));
        assert_eq!(unlocked_by_completion(&outline, 4), None);
    }

    #[test]
    fn preview_bypasses_unlock_checks() {
        let outline = two_chapter_outline();
        let completed = HashSet::new();
        for lesson in outline.lessons() {
            assert!(is_unlocked(&outline, &completed, lesson.id, true));
        }
    }

    #[test]
    fn unknown_lesson_is_not_unlocked() {
        let outline = two_chapter_outline();
        let completed = HashSet::new();
        assert!(!is_unlocked(&outline, &completed, 99, false));
    }
}
