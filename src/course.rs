use serde::{Deserialize, Serialize};

use crate::quiz::QuizMeta;

pub type CourseId = i64;
pub type ChapterId = i64;
pub type LessonId = i64;

/// Structural course data, fetched once per page load and read-only after
/// that. Progress and unlock fields are spliced in at projection time
/// ([`crate::sidebar`]), never written back into the outline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseOutline {
    pub id: CourseId,
    pub title: String,
    pub chapters: Vec<ChapterData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterData {
    pub id: ChapterId,
    pub title: String,
    pub position: u32,
    pub lessons: Vec<LessonData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LessonData {
    pub id: LessonId,
    pub title: String,
    pub position: u32,
    pub duration_secs: u32,
    #[serde(default)]
    pub quiz: Option<QuizMeta>,
}

impl LessonData {
    pub fn has_quiz(&self) -> bool {
        self.quiz.is_some()
    }
}

impl CourseOutline {
    /// Course content is strictly linear: chapter order then lesson order
    /// defines a single total order. The backend sends chapters/lessons
    /// already ordered, but positions are authoritative, so sort on ingest.
    pub fn normalize(&mut self) {
        self.chapters.sort_by_key(|c| c.position);
        for chapter in &mut self.chapters {
            chapter.lessons.sort_by_key(|l| l.position);
        }
    }

    /// All lessons in course order.
    pub fn lessons(&self) -> impl Iterator<Item = &LessonData> {
        self.chapters.iter().flat_map(|c| c.lessons.iter())
    }

    pub fn total_lessons(&self) -> u32 {
        self.lessons().count() as u32
    }

    pub fn lesson(&self, id: LessonId) -> Option<&LessonData> {
        self.lessons().find(|l| l.id == id)
    }

    pub fn first_lesson(&self) -> Option<LessonId> {
        self.lessons().next().map(|l| l.id)
    }

    /// Next lesson in the total order: same chapter if one follows, else the
    /// first lesson of the next chapter.
    pub fn next_lesson(&self, id: LessonId) -> Option<LessonId> {
        let mut lessons = self.lessons();
        lessons.find(|l| l.id == id)?;
        lessons.next().map(|l| l.id)
    }

    /// Immediately preceding lesson in the total order, if any.
    pub fn prev_lesson(&self, id: LessonId) -> Option<LessonId> {
        let mut prev = None;
        for lesson in self.lessons() {
            if lesson.id == id {
                return prev;
            }
            prev = Some(lesson.id);
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two chapters of two lessons each: [[1, 2], [3, 4]]. Lesson 2 carries
    /// a one-question quiz with its answer key (option 2 of question 1).
    pub(crate) fn two_chapter_outline() -> CourseOutline {
        let quiz = QuizMeta {
            pass_percentage: 70.0,
            questions: vec![crate::quiz::QuizQuestion {
                id: 1,
                correct_option: 2,
            }],
        };
        CourseOutline {
            id: 1,
            title: "Intro to Watercolor".to_string(),
            chapters: vec![
                ChapterData {
                    id: 10,
                    title: "Basics".to_string(),
                    position: 1,
                    lessons: vec![
                        LessonData {
                            id: 1,
                            title: "Materials".to_string(),
                            position: 1,
                            duration_secs: 300,
                            quiz: None,
                        },
                        LessonData {
                            id: 2,
                            title: "First Wash".to_string(),
                            position: 2,
                            duration_secs: 600,
                            quiz: Some(quiz),
                        },
                    ],
                },
                ChapterData {
                    id: 11,
                    title: "Technique".to_string(),
                    position: 2,
                    lessons: vec![
                        LessonData {
                            id: 3,
                            title: "Wet on Wet".to_string(),
                            position: 1,
                            duration_secs: 480,
                            quiz: None,
                        },
                        LessonData {
                            id: 4,
                            title: "Dry Brush".to_string(),
                            position: 2,
                            duration_secs: 420,
                            quiz: None,
                        },
                    ],
                },
            ],
        }
    }

    #[test]
    fn linear_order_crosses_chapter_boundary() {
        let outline = two_chapter_outline();
        assert_eq!(outline.first_lesson(), Some(1));
        assert_eq!(outline.next_lesson(1), Some(2));
        assert_eq!(outline.next_lesson(2), Some(3));
        assert_eq!(outline.next_lesson(4), None);
        assert_eq!(outline.prev_lesson(3), Some(2));
        assert_eq!(outline.prev_lesson(1), None);
        assert_eq!(outline.total_lessons(), 4);
    }

    #[test]
    fn normalize_sorts_by_position() {
        let mut outline = two_chapter_outline();
        outline.chapters.reverse();
        outline.chapters[0].lessons.reverse();
        outline.normalize();
        let order: Vec<LessonId> = outline.lessons().map(|l| l.id).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }
}
