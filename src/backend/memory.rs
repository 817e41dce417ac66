use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;

use crate::{
    backend::{EnrollmentProgress, ProgressBackend, ProgressSnapshot, ProgressUpdate},
    course::{CourseId, CourseOutline, LessonId},
    error::Error,
    progress::LessonProgress,
    quiz::{self, QuizOutcome, QuizSubmission},
    utils::now_local,
};

/// In-memory backend with the same authority rules as the real server:
/// sequential unlock enforced on `start_lesson`, grading against the
/// outline's answer key, certificate issued once by the mutation that
/// completes the last lesson. Counts every mutation call, which doubles as
/// the write spy in tests.
#[derive(Debug)]
pub struct MemoryBackend {
    outline: CourseOutline,
    progress: DashMap<LessonId, LessonProgress>,
    certificate_issued: AtomicBool,
    start_calls: AtomicU64,
    write_calls: AtomicU64,
    complete_calls: AtomicU64,
    quiz_calls: AtomicU64,
}

impl MemoryBackend {
    pub fn new(mut outline: CourseOutline) -> Self {
        outline.normalize();
        Self {
            outline,
            progress: DashMap::new(),
            certificate_issued: AtomicBool::new(false),
            start_calls: AtomicU64::new(0),
            write_calls: AtomicU64::new(0),
            complete_calls: AtomicU64::new(0),
            quiz_calls: AtomicU64::new(0),
        }
    }

    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Every state-changing call: start, progress write, complete, quiz.
    pub fn mutation_calls(&self) -> u64 {
        self.start_calls.load(Ordering::SeqCst)
            + self.write_calls.load(Ordering::SeqCst)
            + self.complete_calls.load(Ordering::SeqCst)
            + self.quiz_calls.load(Ordering::SeqCst)
    }

    fn lesson_progress(&self, lesson_id: LessonId) -> LessonProgress {
        self.progress
            .entry(lesson_id)
            .or_insert_with(|| LessonProgress::new(lesson_id))
            .clone()
    }

    fn all_completed(&self) -> bool {
        self.outline.lessons().all(|l| {
            self.progress
                .get(&l.id)
                .map(|p| p.is_completed)
                .unwrap_or(false)
        })
    }

    fn predecessor_completed(&self, lesson_id: LessonId) -> bool {
        match self.outline.prev_lesson(lesson_id) {
            None => true,
            Some(prev) => self
                .progress
                .get(&prev)
                .map(|p| p.is_completed)
                .unwrap_or(false),
        }
    }
}

impl ProgressBackend for MemoryBackend {
    async fn fetch_outline(&self, course_id: CourseId) -> Result<CourseOutline, Error> {
        if course_id != self.outline.id {
            return Err(Error::NotFound {
                kind: "course",
                id: course_id,
            });
        }
        Ok(self.outline.clone())
    }

    async fn fetch_progress(
        &self,
        course_id: CourseId,
    ) -> Result<EnrollmentProgress, Error> {
        if course_id != self.outline.id {
            return Err(Error::NotFound {
                kind: "course",
                id: course_id,
            });
        }
        let lessons: Vec<LessonProgress> =
            self.progress.iter().map(|p| p.clone()).collect();
        let completed = lessons.iter().filter(|p| p.is_completed).count() as u32;
        let total = self.outline.total_lessons();
        let percentage = if total == 0 {
            0.0
        } else {
            completed as f32 / total as f32 * 100.0
        };
        Ok(EnrollmentProgress {
            lessons,
            completed_lessons: Some(completed),
            total_lessons: Some(total),
            percentage: Some(percentage),
        })
    }

    async fn start_lesson(&self, lesson_id: LessonId) -> Result<LessonProgress, Error> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.outline.lesson(lesson_id).is_none() {
            return Err(Error::NotFound {
                kind: "lesson",
                id: lesson_id,
            });
        }
        if !self.predecessor_completed(lesson_id) {
            return Err(Error::LessonLocked { lesson_id });
        }
        Ok(self.lesson_progress(lesson_id))
    }

    async fn push_progress(
        &self,
        update: ProgressUpdate,
    ) -> Result<ProgressSnapshot, Error> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.outline.lesson(update.lesson_id).is_none() {
            return Err(Error::NotFound {
                kind: "lesson",
                id: update.lesson_id,
            });
        }
        let mut entry = self
            .progress
            .entry(update.lesson_id)
            .or_insert_with(|| LessonProgress::new(update.lesson_id));
        entry.watch_percentage = entry.watch_percentage.max(update.watch_percentage);
        entry.current_position = update.current_position;
        entry.total_watch_time = entry.total_watch_time.max(update.total_watch_time);
        let progress = entry.clone();
        drop(entry);
        Ok(ProgressSnapshot {
            progress,
            certificate_issued: false,
        })
    }

    async fn complete_lesson(
        &self,
        lesson_id: LessonId,
        _quiz_score: Option<f32>,
    ) -> Result<ProgressSnapshot, Error> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.outline.lesson(lesson_id).is_none() {
            return Err(Error::NotFound {
                kind: "lesson",
                id: lesson_id,
            });
        }
        let mut entry = self
            .progress
            .entry(lesson_id)
            .or_insert_with(|| LessonProgress::new(lesson_id));
        if !entry.is_completed {
            entry.is_completed = true;
            entry.completed_at = Some(now_local());
        }
        let progress = entry.clone();
        drop(entry);
        // the flag rides along exactly once, on the completing mutation
        let newly_issued = self.all_completed()
            && !self.certificate_issued.swap(true, Ordering::SeqCst);
        Ok(ProgressSnapshot {
            progress,
            certificate_issued: newly_issued,
        })
    }

    async fn submit_quiz(
        &self,
        lesson_id: LessonId,
        submission: QuizSubmission,
    ) -> Result<QuizOutcome, Error> {
        self.quiz_calls.fetch_add(1, Ordering::SeqCst);
        let lesson = self.outline.lesson(lesson_id).ok_or(Error::NotFound {
            kind: "lesson",
            id: lesson_id,
        })?;
        let meta = lesson
            .quiz
            .as_ref()
            .ok_or_else(|| Error::Fatal(anyhow::anyhow!("lesson {lesson_id} has no quiz")))?;
        Ok(quiz::grade_locally(meta, &submission))
    }
}
