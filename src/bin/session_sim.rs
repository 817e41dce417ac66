//! Scripted playback session against the in-memory backend. Useful for
//! watching the coordinator's event flow without a server: threshold
//! crossings, quiz gating, unlock propagation and the certificate banner.

use std::sync::Arc;

use clap::Parser;
use course_player::{
    backend::memory::MemoryBackend,
    config::PlayerConfig,
    course::{ChapterData, CourseOutline, LessonData},
    quiz::{QuizAnswer, QuizMeta, QuizQuestion, QuizState, QuizSubmission},
    session::CourseSession,
    utils::init_log,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run the session in preview mode (no persistence)
    #[arg(long)]
    preview: bool,

    /// Watch percentage that counts as fully watched
    #[arg(long, default_value = "95.0")]
    threshold: f32,
}

fn demo_outline() -> CourseOutline {
    CourseOutline {
        id: 1,
        title: "Rust for Painters".to_string(),
        chapters: vec![
            ChapterData {
                id: 1,
                title: "Getting Started".to_string(),
                position: 1,
                lessons: vec![
                    LessonData {
                        id: 1,
                        title: "Setup".to_string(),
                        position: 1,
                        duration_secs: 240,
                        quiz: None,
                    },
                    LessonData {
                        id: 2,
                        title: "Ownership".to_string(),
                        position: 2,
                        duration_secs: 600,
                        quiz: Some(QuizMeta {
                            pass_percentage: 60.0,
                            questions: vec![
                                QuizQuestion {
                                    id: 1,
                                    correct_option: 1,
                                },
                                QuizQuestion {
                                    id: 2,
                                    correct_option: 3,
                                },
                            ],
                        }),
                    },
                ],
            },
            ChapterData {
                id: 2,
                title: "Going Further".to_string(),
                position: 2,
                lessons: vec![LessonData {
                    id: 3,
                    title: "Borrowing".to_string(),
                    position: 1,
                    duration_secs: 480,
                    quiz: None,
                }],
            },
        ],
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_log(None);
    let args = Cli::parse();

    let backend = Arc::new(MemoryBackend::new(demo_outline()));
    let player = PlayerConfig {
        completion_threshold: args.threshold,
        save_interval_secs: 10,
        preview: args.preview,
    };
    let (session, mut events) =
        CourseSession::open(Arc::clone(&backend), player, 1).await?;

    let lesson_ids: Vec<i64> = session.outline().lessons().map(|l| l.id).collect();
    for id in lesson_ids {
        let meta = session.outline().lesson(id).cloned().expect("lesson exists");
        println!("--- playing '{}' ---", meta.title);
        let lesson = session.enter_lesson(id).await?;

        let duration = meta.duration_secs as f64;
        let mut position = 0.0;
        while position < duration {
            position = (position + duration / 20.0).min(duration);
            let percentage = (position / duration * 100.0) as f32;
            lesson.record_progress(percentage, position).await;
        }

        if lesson.quiz_state() == QuizState::QuizAvailable {
            let submission = QuizSubmission {
                answers: meta
                    .quiz
                    .as_ref()
                    .map(|q| {
                        q.questions
                            .iter()
                            .map(|question| QuizAnswer {
                                question_id: question.id,
                                selected_option: question.correct_option,
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            };
            let outcome = lesson.submit_quiz(submission).await?;
            println!(
                "quiz: passed={} score={:.0}",
                outcome.passed, outcome.score
            );
        }

        lesson.record_pause(100.0, duration).await;
        lesson.unmount().await;
        while let Ok(event) = events.try_recv() {
            println!("event: {event:?}");
        }
    }

    let summary = session.summary();
    println!(
        "done: {}/{} lessons, {:.0}% ({} mutation calls hit the backend)",
        summary.completed_lessons,
        summary.total_lessons,
        summary.percentage,
        backend.mutation_calls()
    );
    Ok(())
}
