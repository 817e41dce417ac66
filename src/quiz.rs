use serde::{Deserialize, Serialize};

/// Quiz metadata carried in the course outline. `questions` (with answer
/// keys) is only populated when the viewer may grade locally, i.e. a creator
/// previewing their own course; learner-facing outlines leave it empty and
/// the backend grades submissions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizMeta {
    pub pass_percentage: f32,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: i64,
    pub correct_option: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub answers: Vec<QuizAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub question_id: i64,
    pub selected_option: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuizOutcome {
    pub passed: bool,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuizState {
    NoQuiz,
    /// video threshold not yet reached
    QuizPending,
    /// threshold reached, not yet passed
    QuizAvailable,
    QuizPassed,
}

/// Per-lesson quiz gate. When a quiz exists, "lesson complete" is never
/// asserted from watch percentage alone; it waits for a passing submission.
/// A failed attempt is a normal transition back to `QuizAvailable` (retry;
/// attempt limits are enforced server-side).
#[derive(Debug)]
pub struct QuizGate {
    state: QuizState,
    best_score: Option<f32>,
}

impl QuizGate {
    pub fn new(has_quiz: bool) -> Self {
        let state = if has_quiz {
            QuizState::QuizPending
        } else {
            QuizState::NoQuiz
        };
        Self {
            state,
            best_score: None,
        }
    }

    pub fn state(&self) -> QuizState {
        self.state
    }

    pub fn best_score(&self) -> Option<f32> {
        self.best_score
    }

    /// The watch threshold was reached. Returns true if the quiz just became
    /// available (so the UI can present it).
    pub fn threshold_reached(&mut self) -> bool {
        if self.state == QuizState::QuizPending {
            self.state = QuizState::QuizAvailable;
            return true;
        }
        false
    }

    /// Record a graded attempt. Returns true exactly once, on the passing
    /// transition that should drive lesson completion.
    pub fn record_outcome(&mut self, outcome: &QuizOutcome) -> bool {
        if self
            .best_score
            .is_none_or(|best| outcome.score > best)
        {
            self.best_score = Some(outcome.score);
        }
        if outcome.passed && self.state == QuizState::QuizAvailable {
            self.state = QuizState::QuizPassed;
            return true;
        }
        false
    }

    /// Whether the gate currently blocks the "lesson complete" transition.
    pub fn blocks_completion(&self) -> bool {
        matches!(self.state, QuizState::QuizPending | QuizState::QuizAvailable)
    }

    /// Adopt server state for an already-completed lesson.
    pub fn hydrate_passed(&mut self) {
        if self.state != QuizState::NoQuiz {
            self.state = QuizState::QuizPassed;
        }
    }
}

/// Grade a submission against the outline's answer key. Only meaningful in
/// preview mode, where persistence is suppressed and the key is present.
pub fn grade_locally(meta: &QuizMeta, submission: &QuizSubmission) -> QuizOutcome {
    if meta.questions.is_empty() {
        // nothing to grade against; treat as a failed practice run
        return QuizOutcome {
            passed: false,
            score: 0.0,
        };
    }
    let correct = meta
        .questions
        .iter()
        .filter(|q| {
            submission
                .answers
                .iter()
                .any(|a| a.question_id == q.id && a.selected_option == q.correct_option)
        })
        .count();
    let score = correct as f32 / meta.questions.len() as f32 * 100.0;
    QuizOutcome {
        passed: score >= meta.pass_percentage,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_quiz_never_blocks() {
        let gate = QuizGate::new(false);
        assert_eq!(gate.state(), QuizState::NoQuiz);
        assert!(!gate.blocks_completion());
    }

    #[test]
    fn gate_transitions_in_order() {
        let mut gate = QuizGate::new(true);
        assert!(gate.blocks_completion());
        assert!(gate.threshold_reached());
        assert!(!gate.threshold_reached());
        assert_eq!(gate.state(), QuizState::QuizAvailable);
        // failing keeps the quiz available for retry
        let failed = QuizOutcome {
            passed: false,
            score: 40.0,
        };
        assert!(!gate.record_outcome(&failed));
        assert_eq!(gate.state(), QuizState::QuizAvailable);
        assert!(gate.blocks_completion());
        // passing fires the completion signal exactly once
        let passed = QuizOutcome {
            passed: true,
            score: 85.0,
        };
        assert!(gate.record_outcome(&passed));
        assert!(!gate.record_outcome(&passed));
        assert_eq!(gate.state(), QuizState::QuizPassed);
        assert!(!gate.blocks_completion());
        assert_eq!(gate.best_score(), Some(85.0));
    }

    #[test]
    fn local_grading_uses_pass_percentage() {
        let meta = QuizMeta {
            pass_percentage: 70.0,
            questions: vec![
                QuizQuestion {
                    id: 1,
                    correct_option: 2,
                },
                QuizQuestion {
                    id: 2,
                    correct_option: 0,
                },
                QuizQuestion {
                    id: 3,
                    correct_option: 1,
                },
            ],
        };
        let submission = QuizSubmission {
            answers: vec![
                QuizAnswer {
                    question_id: 1,
                    selected_option: 2,
                },
                QuizAnswer {
                    question_id: 2,
                    selected_option: 0,
                },
                QuizAnswer {
                    question_id: 3,
                    selected_option: 3,
                },
            ],
        };
        let outcome = grade_locally(&meta, &submission);
        assert!(!outcome.passed);
        assert!((outcome.score - 66.666_67).abs() < 0.001);
    }
}
