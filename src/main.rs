use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use course_player::{
    backend::http::HttpBackend,
    config::{self, Config},
    session::CourseSession,
    sidebar::LessonDisplayState,
    utils::init_log,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the player config file
    #[arg(short, long, default_value = "course-player.toml")]
    config: PathBuf,

    /// Course to display
    #[arg(short = 'C', long)]
    course: i64,

    /// Render all lessons accessible, persist nothing
    #[arg(long)]
    preview: bool,

    /// Emit the sidebar and summary as JSON instead of text
    #[arg(long)]
    json: bool,
}

/// Print the sidebar view and progress summary of a course.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_log(None);
    let args = Cli::parse();

    let config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        Config::default()
    };
    let mut player = config.player.clone();
    player.preview = player.preview || args.preview;

    let backend = Arc::new(HttpBackend::new(config.api.base_url, config::api_token()));
    let (session, _events) = CourseSession::open(backend, player, args.course).await?;

    if args.json {
        let view = serde_json::json!({
            "title": session.outline().title,
            "chapters": session.sidebar(None),
            "summary": session.summary(),
        });
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{}", session.outline().title);
    for chapter in session.sidebar(None) {
        println!("{}", chapter.title);
        for lesson in chapter.lessons {
            let marker = match lesson.state {
                LessonDisplayState::Completed => "[x]",
                LessonDisplayState::Locked => "[-]",
                LessonDisplayState::Unlocked => "[ ]",
                LessonDisplayState::CurrentInProgress
                | LessonDisplayState::CurrentNearComplete => "[>]",
            };
            let quiz = if lesson.has_quiz { " (quiz)" } else { "" };
            println!(
                "  {} {} - {:.0}%{}",
                marker, lesson.title, lesson.watch_percentage, quiz
            );
        }
    }
    let summary = session.summary();
    println!(
        "{}/{} lessons completed ({:.0}%), about {} min remaining",
        summary.completed_lessons,
        summary.total_lessons,
        summary.percentage,
        summary.remaining_secs / 60
    );

    Ok(())
}
