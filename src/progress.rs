use std::collections::HashSet;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    backend::{EnrollmentProgress, ProgressUpdate},
    course::{CourseOutline, LessonId},
    utils::now_local,
};

/// Client-side cache of one lesson's progress. The enrollment record on the
/// server owns this; our copy may be stale or optimistically ahead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonProgress {
    pub lesson_id: LessonId,
    pub watch_percentage: f32,
    pub current_position: f64,
    pub total_watch_time: f64,
    pub is_completed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl LessonProgress {
    pub fn new(lesson_id: LessonId) -> Self {
        Self {
            lesson_id,
            watch_percentage: 0.0,
            current_position: 0.0,
            total_watch_time: 0.0,
            is_completed: false,
            completed_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct ProgressState {
    /// client ratchet, never decreased by anything
    local_max: f32,
    /// last authoritative value; updated on every newer server response
    server_confirmed: f32,
    position_secs: f64,
    total_watch_secs: f64,
    completed: bool,
    completed_at: Option<OffsetDateTime>,
    /// unflushed local change, or a flush that failed and wants a retry
    dirty: bool,
    threshold_emitted: bool,
}

/// Per-lesson optimistic progress state (two-field model: `local_max` is the
/// client ratchet, `server_confirmed` the last authoritative value; the
/// displayed percentage is the max of the two, so the UI never visibly
/// regresses no matter how stale a response arrives).
#[derive(Debug)]
pub struct ProgressStore {
    lesson_id: LessonId,
    threshold: f32,
    state: Mutex<ProgressState>,
}

impl ProgressStore {
    pub fn new(lesson_id: LessonId, threshold: f32) -> Self {
        Self {
            lesson_id,
            threshold,
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    /// Adopt the fetched-or-initialized server copy on lesson entry.
    pub fn hydrate(&self, progress: &LessonProgress) {
        let mut state = self.state.lock();
        state.server_confirmed = clamp_percentage(progress.watch_percentage);
        state.position_secs = progress.current_position;
        state.total_watch_secs = progress.total_watch_time;
        if progress.is_completed {
            state.completed = true;
            state.completed_at = progress.completed_at;
        }
        // a lesson resumed past the threshold must not re-announce it
        state.threshold_emitted =
            state.completed || state.server_confirmed >= self.threshold;
    }

    /// Ratchet the watch percentage and advance the playhead. Returns true
    /// exactly once, on the call that crosses the completion threshold.
    pub fn record_progress(&self, percentage: f32, position_secs: f64) -> bool {
        let percentage = clamp_percentage(percentage);
        let mut state = self.state.lock();
        if percentage > state.local_max {
            state.local_max = percentage;
            state.dirty = true;
        }
        // forward playback accumulates watch time, seeking backward does not
        let delta = position_secs - state.position_secs;
        if delta > 0.0 {
            state.total_watch_secs += delta;
        }
        if delta != 0.0 {
            // a moved playhead is worth persisting even when the percentage
            // ratchet did not advance (rewatching after a seek back)
            state.dirty = true;
        }
        state.position_secs = position_secs;

        let displayed = state.local_max.max(state.server_confirmed);
        if displayed >= self.threshold && !state.threshold_emitted {
            state.threshold_emitted = true;
            return true;
        }
        false
    }

    /// Merge an authoritative response. `server_confirmed` always adopts the
    /// server value (display is a max, so a lower read cannot regress the
    /// UI); completion only ever goes false -> true.
    pub fn reconcile(&self, progress: &LessonProgress) {
        let mut state = self.state.lock();
        state.server_confirmed = clamp_percentage(progress.watch_percentage);
        if progress.is_completed && !state.completed {
            state.completed = true;
            state.completed_at = progress.completed_at.or_else(|| Some(now_local()));
        }
    }

    /// Mark the lesson completed. Returns true only on the first transition;
    /// completion is durable and never reset by client logic.
    pub fn complete(&self) -> bool {
        let mut state = self.state.lock();
        if state.completed {
            return false;
        }
        state.completed = true;
        state.completed_at = Some(now_local());
        true
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub fn displayed(&self) -> f32 {
        let state = self.state.lock();
        state.local_max.max(state.server_confirmed)
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    pub fn clear_dirty(&self) {
        self.state.lock().dirty = false;
    }

    pub fn snapshot(&self) -> LessonProgress {
        let state = self.state.lock();
        LessonProgress {
            lesson_id: self.lesson_id,
            watch_percentage: state.local_max.max(state.server_confirmed),
            current_position: state.position_secs,
            total_watch_time: state.total_watch_secs,
            is_completed: state.completed,
            completed_at: state.completed_at,
        }
    }

    /// Payload for the persistence writer; always the freshest local view.
    pub fn flush_payload(&self) -> ProgressUpdate {
        let state = self.state.lock();
        ProgressUpdate {
            lesson_id: self.lesson_id,
            watch_percentage: state.local_max.max(state.server_confirmed),
            current_position: state.position_secs,
            total_watch_time: state.total_watch_secs,
        }
    }

    /// Drop session-local state back to the server-confirmed baseline, for
    /// reuse of the session object across a remount. Completion stays.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.local_max = 0.0;
        state.position_secs = 0.0;
        state.dirty = false;
        state.threshold_emitted =
            state.completed || state.server_confirmed >= self.threshold;
    }
}

fn clamp_percentage(percentage: f32) -> f32 {
    percentage.clamp(0.0, 100.0)
}

/// Derived aggregate for the course header. Uses the enrollment's
/// authoritative counts when the backend sends them, unless the session has
/// since completed more lessons than the page-load snapshot knew about, in
/// which case the local completion set wins until the next refresh. Falls
/// back to the local lesson list entirely when no counts are available;
/// remaining time always comes from the outline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CourseProgressSummary {
    pub percentage: f32,
    pub completed_lessons: u32,
    pub total_lessons: u32,
    pub remaining_secs: u64,
}

impl CourseProgressSummary {
    pub fn compute(
        outline: &CourseOutline,
        completed: &HashSet<LessonId>,
        enrollment: Option<&EnrollmentProgress>,
    ) -> Self {
        let remaining_secs = outline
            .lessons()
            .filter(|l| !completed.contains(&l.id))
            .map(|l| l.duration_secs as u64)
            .sum();
        let local_completed = completed.len() as u32;
        let (completed_lessons, total_lessons, percentage) = match enrollment {
            Some(e) if e.completed_lessons.is_some() && e.total_lessons.is_some() => {
                let server_completed = e.completed_lessons.unwrap_or_default();
                let total = e.total_lessons.unwrap_or_default();
                if local_completed > server_completed {
                    // the snapshot predates this session's completions
                    (local_completed, total, ratio(local_completed, total))
                } else {
                    let percentage = e
                        .percentage
                        .unwrap_or_else(|| ratio(server_completed, total));
                    (server_completed, total, percentage)
                }
            }
            _ => {
                let total = outline.total_lessons();
                (local_completed, total, ratio(local_completed, total))
            }
        };
        Self {
            percentage,
            completed_lessons,
            total_lessons,
            remaining_secs,
        }
    }
}

fn ratio(completed: u32, total: u32) -> f32 {
    if total == 0 {
        0.0
    } else {
        completed as f32 / total as f32 * 100.0
    }
}
