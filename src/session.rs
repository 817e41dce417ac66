use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{info, warn};

use crate::{
    backend::{EnrollmentProgress, ProgressBackend},
    config::PlayerConfig,
    course::{CourseId, CourseOutline, LessonId},
    error::Error,
    progress::{CourseProgressSummary, LessonProgress, ProgressStore},
    quiz::{self, QuizGate, QuizMeta, QuizOutcome, QuizState, QuizSubmission},
    sidebar::{self, ChapterView},
    unlock,
    writer::ProgressWriter,
};

/// Notifications the UI layer consumes: toasts, sidebar refreshes, the
/// certificate banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    ThresholdReached { lesson_id: LessonId },
    QuizAvailable { lesson_id: LessonId },
    LessonCompleted { lesson_id: LessonId },
    LessonUnlocked { lesson_id: LessonId },
    CertificateIssued,
}

/// Per-course session state: the outline, the completion set and cached
/// per-lesson progress the sidebar reads, and the event channel. Created on
/// course-page mount; an explicit object, never a module-global.
pub struct CourseSession<B> {
    backend: Arc<B>,
    player: PlayerConfig,
    outline: Arc<CourseOutline>,
    completed: Arc<RwLock<HashSet<LessonId>>>,
    progress: Arc<DashMap<LessonId, LessonProgress>>,
    enrollment: Option<EnrollmentProgress>,
    events: UnboundedSender<SessionEvent>,
}

impl<B: ProgressBackend> CourseSession<B> {
    /// Fetch the outline and the enrollment's progress, and build the
    /// session. Both are read paths and run in preview mode too.
    pub async fn open(
        backend: Arc<B>,
        player: PlayerConfig,
        course_id: CourseId,
    ) -> Result<(Self, UnboundedReceiver<SessionEvent>), Error> {
        let mut outline = backend.fetch_outline(course_id).await?;
        outline.normalize();
        let enrollment = backend.fetch_progress(course_id).await?;

        let completed: HashSet<LessonId> = enrollment
            .lessons
            .iter()
            .filter(|p| p.is_completed)
            .map(|p| p.lesson_id)
            .collect();
        let progress = DashMap::new();
        for lesson in &enrollment.lessons {
            progress.insert(lesson.lesson_id, lesson.clone());
        }

        let (events, receiver) = unbounded_channel();
        info!(
            course = course_id,
            lessons = outline.total_lessons(),
            completed = completed.len(),
            preview = player.preview,
            "course session opened"
        );
        Ok((
            Self {
                backend,
                player,
                outline: Arc::new(outline),
                completed: Arc::new(RwLock::new(completed)),
                progress: Arc::new(progress),
                enrollment: Some(enrollment),
                events,
            },
            receiver,
        ))
    }

    pub fn outline(&self) -> &CourseOutline {
        &self.outline
    }

    pub fn summary(&self) -> CourseProgressSummary {
        CourseProgressSummary::compute(
            &self.outline,
            &self.completed.read(),
            self.enrollment.as_ref(),
        )
    }

    /// Sidebar render model. `current` is the live progress of the lesson
    /// being played, which is fresher than the cached map.
    pub fn sidebar(&self, current: Option<&LessonProgress>) -> Vec<ChapterView> {
        let completed = self.completed.read();
        let percent_of = |id: LessonId| {
            if let Some(live) = current {
                if live.lesson_id == id {
                    return live.watch_percentage;
                }
            }
            self.progress
                .get(&id)
                .map(|p| p.watch_percentage)
                .unwrap_or(0.0)
        };
        sidebar::project(
            &self.outline,
            &completed,
            percent_of,
            current.map(|p| p.lesson_id),
            self.player.completion_threshold,
            self.player.preview,
        )
    }

    pub fn try_navigate(&self, target: LessonId) -> Result<LessonId, Error> {
        sidebar::try_navigate(
            &self.outline,
            &self.completed.read(),
            target,
            self.player.preview,
        )
    }

    /// Enter a lesson: guard navigation, call the idempotent start endpoint
    /// (skipped in preview), fetch-or-initialize the local progress copy and
    /// wire up store, writer and quiz gate.
    pub async fn enter_lesson(&self, lesson_id: LessonId) -> Result<LessonSession<B>, Error> {
        self.try_navigate(lesson_id)?;
        let lesson = self.outline.lesson(lesson_id).ok_or(Error::NotFound {
            kind: "lesson",
            id: lesson_id,
        })?;

        let initial = if self.player.preview {
            self.progress
                .get(&lesson_id)
                .map(|p| p.clone())
                .unwrap_or_else(|| LessonProgress::new(lesson_id))
        } else {
            // the server re-checks the unlock rule and may refuse
            self.backend.start_lesson(lesson_id).await?
        };
        self.progress.insert(lesson_id, initial.clone());

        let store = Arc::new(ProgressStore::new(
            lesson_id,
            self.player.completion_threshold,
        ));
        store.hydrate(&initial);
        let mut gate = QuizGate::new(lesson.has_quiz());
        if initial.is_completed {
            gate.hydrate_passed();
        }
        let writer = ProgressWriter::new(
            Arc::clone(&self.backend),
            Arc::clone(&store),
            self.player.save_interval(),
            !self.player.preview,
            self.events.clone(),
        );
        info!(lesson = lesson_id, resumed_at = initial.current_position, "lesson entered");
        let session = LessonSession {
            lesson_id,
            preview: self.player.preview,
            backend: Arc::clone(&self.backend),
            outline: Arc::clone(&self.outline),
            completed: Arc::clone(&self.completed),
            progress: Arc::clone(&self.progress),
            quiz: lesson.quiz.clone(),
            store,
            writer,
            gate: Mutex::new(gate),
            events: self.events.clone(),
        };
        // A resumed lesson may already sit past the watch threshold without
        // being completed (a quiz still to take, or a completion call that
        // failed last time). Catch the gate up so the lesson does not wedge.
        if !session.store.is_completed()
            && session.store.displayed() >= self.player.completion_threshold
        {
            session.advance_gate().await;
        }
        Ok(session)
    }
}

/// A single lesson's playback session: the progress store, its debounced
/// writer and the quiz gate, alive from lesson mount to unmount.
pub struct LessonSession<B> {
    lesson_id: LessonId,
    preview: bool,
    backend: Arc<B>,
    outline: Arc<CourseOutline>,
    completed: Arc<RwLock<HashSet<LessonId>>>,
    progress: Arc<DashMap<LessonId, LessonProgress>>,
    quiz: Option<QuizMeta>,
    store: Arc<ProgressStore>,
    writer: Arc<ProgressWriter<B>>,
    gate: Mutex<QuizGate>,
    events: UnboundedSender<SessionEvent>,
}

impl<B: ProgressBackend> LessonSession<B> {
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    pub fn displayed_percentage(&self) -> f32 {
        self.store.displayed()
    }

    pub fn is_completed(&self) -> bool {
        self.store.is_completed()
    }

    pub fn quiz_state(&self) -> QuizState {
        self.gate.lock().state()
    }

    pub fn snapshot(&self) -> LessonProgress {
        self.store.snapshot()
    }

    /// Player time/percentage tick. The ratchet happens synchronously, the
    /// persistence write is debounced.
    pub async fn record_progress(&self, percentage: f32, position_secs: f64) {
        let crossed = self.store.record_progress(percentage, position_secs);
        self.writer.schedule();
        if crossed {
            self.handle_threshold().await;
        }
    }

    /// Pause is a natural checkpoint: cancel the pending debounced write and
    /// flush immediately. Losing progress on a tab close after a pause is
    /// not acceptable.
    pub async fn record_pause(&self, percentage: f32, position_secs: f64) {
        let crossed = self.store.record_progress(percentage, position_secs);
        if crossed {
            self.handle_threshold().await;
        }
        self.writer.flush_now().await;
        self.progress.insert(self.lesson_id, self.store.snapshot());
    }

    /// Submit a quiz attempt. In preview mode the submission is graded
    /// locally against the outline's answer key and nothing is persisted.
    pub async fn submit_quiz(&self, submission: QuizSubmission) -> Result<QuizOutcome, Error> {
        let meta = self.quiz.as_ref().ok_or_else(|| {
            Error::Fatal(anyhow::anyhow!("lesson {} has no quiz", self.lesson_id))
        })?;
        if self.gate.lock().state() == QuizState::QuizPending {
            return Err(Error::Fatal(anyhow::anyhow!(
                "quiz for lesson {} is not available yet",
                self.lesson_id
            )));
        }
        let outcome = if self.preview {
            quiz::grade_locally(meta, &submission)
        } else {
            self.backend.submit_quiz(self.lesson_id, submission).await?
        };
        let passed_now = self.gate.lock().record_outcome(&outcome);
        if passed_now {
            self.complete(Some(outcome.score)).await;
        }
        Ok(outcome)
    }

    /// Teardown on navigation away: replace any pending debounced write with
    /// an immediate flush so no stale timer leaks across lesson transitions.
    pub async fn unmount(&self) {
        self.writer.flush_now().await;
        self.progress.insert(self.lesson_id, self.store.snapshot());
    }

    /// Drop session-local state for a remount of the same lesson.
    pub fn reset(&self) {
        self.writer.cancel();
        self.store.reset();
    }

    async fn handle_threshold(&self) {
        let _ = self.events.send(SessionEvent::ThresholdReached {
            lesson_id: self.lesson_id,
        });
        self.advance_gate().await;
    }

    /// Move the quiz gate past the watch threshold and, when nothing blocks
    /// completion, complete the lesson. Also runs on lesson entry when the
    /// hydrated progress already sits past the threshold, so a resumed
    /// lesson can still offer its quiz (or finish a completion whose earlier
    /// call failed).
    async fn advance_gate(&self) {
        let (newly_available, blocks) = {
            let mut gate = self.gate.lock();
            let newly_available = gate.threshold_reached();
            (newly_available, gate.blocks_completion())
        };
        if newly_available {
            let _ = self.events.send(SessionEvent::QuizAvailable {
                lesson_id: self.lesson_id,
            });
        }
        if !blocks {
            let score = self.gate.lock().best_score();
            self.complete(score).await;
        }
    }

    /// The "lesson complete" transition. Idempotent: a lesson that is
    /// already completed neither errors nor re-propagates unlocks.
    async fn complete(&self, quiz_score: Option<f32>) {
        if !self.store.complete() {
            return;
        }
        if !self.preview {
            match self.backend.complete_lesson(self.lesson_id, quiz_score).await {
                Ok(snapshot) => {
                    self.store.reconcile(&snapshot.progress);
                    if snapshot.certificate_issued {
                        let _ = self.events.send(SessionEvent::CertificateIssued);
                    }
                }
                Err(e) => {
                    // completion stays locally durable; the write is retried
                    // at the next checkpoint
                    warn!(
                        lesson = self.lesson_id,
                        "completion call failed, keeping local state: {e}"
                    );
                    self.store.mark_dirty();
                }
            }
        }
        self.completed.write().insert(self.lesson_id);
        self.progress.insert(self.lesson_id, self.store.snapshot());
        let _ = self.events.send(SessionEvent::LessonCompleted {
            lesson_id: self.lesson_id,
        });
        if let Some(next) = unlock::unlocked_by_completion(&self.outline, self.lesson_id) {
            let _ = self.events.send(SessionEvent::LessonUnlocked { lesson_id: next });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{ProgressUpdate, memory::MemoryBackend},
        course::tests::two_chapter_outline,
        quiz::QuizAnswer,
        sidebar::LessonDisplayState,
    };

    fn player(preview: bool) -> PlayerConfig {
        PlayerConfig {
            completion_threshold: 95.0,
            save_interval_secs: 10,
            preview,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn open_session(
        preview: bool,
    ) -> (
        Arc<MemoryBackend>,
        CourseSession<MemoryBackend>,
        UnboundedReceiver<SessionEvent>,
    ) {
        let backend = Arc::new(MemoryBackend::new(two_chapter_outline()));
        let (session, rx) = CourseSession::open(Arc::clone(&backend), player(preview), 1)
            .await
            .unwrap();
        (backend, session, rx)
    }

    #[tokio::test]
    async fn watch_threshold_completes_quizless_lesson_and_unlocks_next() {
        let (_backend, session, mut rx) = open_session(false).await;
        let lesson = session.enter_lesson(1).await.unwrap();
        lesson.record_progress(50.0, 150.0).await;
        assert!(!lesson.is_completed());
        lesson.record_progress(96.0, 290.0).await;
        assert!(lesson.is_completed());
        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::ThresholdReached { lesson_id: 1 }));
        assert!(events.contains(&SessionEvent::LessonCompleted { lesson_id: 1 }));
        assert!(events.contains(&SessionEvent::LessonUnlocked { lesson_id: 2 }));
        // lesson 2 is now enterable, lesson 3 still is not
        assert!(session.try_navigate(2).is_ok());
        assert!(matches!(
            session.try_navigate(3),
            Err(Error::LessonLocked { lesson_id: 3 })
        ));
    }

    #[tokio::test]
    async fn quiz_lesson_requires_a_pass_to_complete() {
        let backend = Arc::new(MemoryBackend::new(two_chapter_outline()));
        backend.complete_lesson(1, None).await.unwrap();
        let (session, mut rx) = CourseSession::open(Arc::clone(&backend), player(false), 1)
            .await
            .unwrap();
        let lesson = session.enter_lesson(2).await.unwrap();
        lesson.record_progress(96.0, 580.0).await;
        // watch percentage alone must not complete a quiz lesson
        assert!(!lesson.is_completed());
        assert_eq!(lesson.quiz_state(), QuizState::QuizAvailable);

        let wrong = QuizSubmission {
            answers: vec![QuizAnswer {
                question_id: 1,
                selected_option: 0,
            }],
        };
        let outcome = lesson.submit_quiz(wrong).await.unwrap();
        assert!(!outcome.passed);
        assert!(!lesson.is_completed());
        assert_eq!(lesson.quiz_state(), QuizState::QuizAvailable);

        let right = QuizSubmission {
            answers: vec![QuizAnswer {
                question_id: 1,
                selected_option: 2,
            }],
        };
        let outcome = lesson.submit_quiz(right).await.unwrap();
        assert!(outcome.passed);
        assert!(lesson.is_completed());
        assert_eq!(lesson.quiz_state(), QuizState::QuizPassed);

        let completions = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::LessonCompleted { lesson_id: 2 }))
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn resumed_quiz_lesson_past_threshold_still_offers_the_quiz() {
        let backend = Arc::new(MemoryBackend::new(two_chapter_outline()));
        backend.complete_lesson(1, None).await.unwrap();
        // watched past the threshold in an earlier session, quiz never taken
        backend
            .push_progress(ProgressUpdate {
                lesson_id: 2,
                watch_percentage: 96.0,
                current_position: 580.0,
                total_watch_time: 580.0,
            })
            .await
            .unwrap();
        let (session, mut rx) = CourseSession::open(Arc::clone(&backend), player(false), 1)
            .await
            .unwrap();
        let lesson = session.enter_lesson(2).await.unwrap();
        assert!(!lesson.is_completed());
        assert_eq!(lesson.quiz_state(), QuizState::QuizAvailable);
        assert!(drain(&mut rx).contains(&SessionEvent::QuizAvailable { lesson_id: 2 }));

        let right = QuizSubmission {
            answers: vec![QuizAnswer {
                question_id: 1,
                selected_option: 2,
            }],
        };
        let outcome = lesson.submit_quiz(right).await.unwrap();
        assert!(outcome.passed);
        assert!(lesson.is_completed());
    }

    #[tokio::test]
    async fn resumed_quizless_lesson_past_threshold_completes_on_entry() {
        let backend = Arc::new(MemoryBackend::new(two_chapter_outline()));
        // watched to the end earlier, but the completion call never landed
        backend
            .push_progress(ProgressUpdate {
                lesson_id: 1,
                watch_percentage: 97.0,
                current_position: 295.0,
                total_watch_time: 295.0,
            })
            .await
            .unwrap();
        let (session, mut rx) = CourseSession::open(Arc::clone(&backend), player(false), 1)
            .await
            .unwrap();
        let lesson = session.enter_lesson(1).await.unwrap();
        assert!(lesson.is_completed());
        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::LessonCompleted { lesson_id: 1 }));
        assert!(events.contains(&SessionEvent::LessonUnlocked { lesson_id: 2 }));
        assert!(session.try_navigate(2).is_ok());
    }

    #[tokio::test]
    async fn quiz_before_threshold_is_rejected() {
        let (_backend, session, _rx) = open_session(true).await;
        let lesson = session.enter_lesson(2).await.unwrap();
        let submission = QuizSubmission { answers: vec![] };
        assert!(lesson.submit_quiz(submission).await.is_err());
        assert_eq!(lesson.quiz_state(), QuizState::QuizPending);
    }

    #[tokio::test]
    async fn already_completed_lesson_does_not_repropagate() {
        let backend = Arc::new(MemoryBackend::new(two_chapter_outline()));
        backend.complete_lesson(1, None).await.unwrap();
        let (session, mut rx) = CourseSession::open(Arc::clone(&backend), player(false), 1)
            .await
            .unwrap();
        let lesson = session.enter_lesson(1).await.unwrap();
        assert!(lesson.is_completed());
        lesson.record_progress(97.0, 295.0).await;
        lesson.record_progress(98.0, 299.0).await;
        let events = drain(&mut rx);
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, SessionEvent::LessonCompleted { .. }))
        );
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, SessionEvent::LessonUnlocked { .. }))
        );
    }

    #[tokio::test]
    async fn locked_lesson_entry_is_refused() {
        let (_backend, session, _rx) = open_session(false).await;
        let err = match session.enter_lesson(3).await {
            Err(err) => err,
            Ok(_) => panic!("locked lesson must not open"),
        };
        assert_eq!(err.to_string(), "complete previous lessons first");
    }

    #[tokio::test]
    async fn preview_mode_writes_nothing_but_renders_everything() {
        let (backend, session, _rx) = open_session(true).await;
        // normally locked, accessible in preview
        let lesson = session.enter_lesson(3).await.unwrap();
        lesson.record_progress(30.0, 30.0).await;
        lesson.record_progress(10.0, 10.0).await;
        lesson.record_progress(60.0, 60.0).await;
        assert_eq!(lesson.displayed_percentage(), 60.0);
        lesson.record_pause(60.0, 60.0).await;
        lesson.unmount().await;
        assert_eq!(backend.mutation_calls(), 0);

        // quiz still runs for practice, with zero persistence
        let quiz_lesson = session.enter_lesson(2).await.unwrap();
        quiz_lesson.record_progress(96.0, 580.0).await;
        let outcome = quiz_lesson
            .submit_quiz(QuizSubmission {
                answers: vec![QuizAnswer {
                    question_id: 1,
                    selected_option: 2,
                }],
            })
            .await
            .unwrap();
        assert!(outcome.passed);
        assert_eq!(backend.mutation_calls(), 0);

        // read-side rendering still operates
        let views = session.sidebar(None);
        assert!(
            views
                .iter()
                .flat_map(|c| c.lessons.iter())
                .all(|l| l.state != LessonDisplayState::Locked)
        );
    }

    #[tokio::test]
    async fn completing_the_course_raises_the_certificate_banner() {
        let (_backend, session, mut rx) = open_session(false).await;
        for id in [1, 2, 3, 4] {
            let lesson = session.enter_lesson(id).await.unwrap();
            lesson.record_progress(96.0, 500.0).await;
            if lesson.quiz_state() == QuizState::QuizAvailable {
                lesson
                    .submit_quiz(QuizSubmission {
                        answers: vec![QuizAnswer {
                            question_id: 1,
                            selected_option: 2,
                        }],
                    })
                    .await
                    .unwrap();
            }
            lesson.unmount().await;
        }
        let events = drain(&mut rx);
        let certificates = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::CertificateIssued))
            .count();
        assert_eq!(certificates, 1);
        let summary = session.summary();
        assert_eq!(summary.completed_lessons, 4);
        assert_eq!(summary.remaining_secs, 0);
    }

    #[tokio::test]
    async fn sidebar_prefers_live_progress_for_the_current_lesson() {
        let (_backend, session, _rx) = open_session(false).await;
        let lesson = session.enter_lesson(1).await.unwrap();
        lesson.record_progress(42.0, 120.0).await;
        let views = session.sidebar(Some(&lesson.snapshot()));
        let first = &views[0].lessons[0];
        assert_eq!(first.state, LessonDisplayState::CurrentInProgress);
        assert_eq!(first.watch_percentage, 42.0);
    }

    #[tokio::test]
    async fn reset_returns_to_server_confirmed_baseline() {
        let (_backend, session, _rx) = open_session(false).await;
        let lesson = session.enter_lesson(1).await.unwrap();
        lesson.record_progress(40.0, 100.0).await;
        lesson.record_pause(40.0, 100.0).await; // server now holds 40
        lesson.record_progress(60.0, 200.0).await;
        lesson.reset();
        assert_eq!(lesson.displayed_percentage(), 40.0);
    }
}
