use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;

use crate::{
    backend::{EnrollmentProgress, ProgressBackend, ProgressSnapshot, ProgressUpdate},
    course::{CourseId, CourseOutline, LessonId},
    error::Error,
    progress::LessonProgress,
    quiz::{QuizOutcome, QuizSubmission},
};

/// REST implementation of the progress/quiz contract. The outline is
/// structural data fetched once per page load, so it sits behind a short
/// TTL cache; progress endpoints always go to the network.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    outline_cache: Cache<CourseId, CourseOutline>,
}

#[derive(Serialize)]
struct CompleteRequest {
    quiz_score: Option<f32>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
            outline_cache: Cache::builder()
                .max_capacity(64)
                .time_to_live(Duration::from_secs(300))
                .build(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        kind: &'static str,
        id: i64,
    ) -> Result<reqwest::Response, Error> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound { kind, id });
        }
        if status == reqwest::StatusCode::FORBIDDEN && kind == "lesson" {
            return Err(Error::LessonLocked { lesson_id: id });
        }
        if status.is_server_error() {
            return Err(Error::Transient(format!("{kind} {id}: http {status}")));
        }
        Err(Error::Fatal(anyhow::anyhow!(
            "unexpected status {status} for {kind} {id}"
        )))
    }
}

impl ProgressBackend for HttpBackend {
    async fn fetch_outline(&self, course_id: CourseId) -> Result<CourseOutline, Error> {
        if let Some(outline) = self.outline_cache.get(&course_id).await {
            return Ok(outline);
        }
        let url = self.url(&format!("/api/courses/{course_id}/outline"));
        let response = self.send(self.client.get(url), "course", course_id).await?;
        let mut outline: CourseOutline = response
            .json()
            .await
            .map_err(|e| Error::Fatal(anyhow::anyhow!("decode outline: {e}")))?;
        outline.normalize();
        self.outline_cache.insert(course_id, outline.clone()).await;
        Ok(outline)
    }

    async fn fetch_progress(
        &self,
        course_id: CourseId,
    ) -> Result<EnrollmentProgress, Error> {
        let url = self.url(&format!("/api/progress/courses/{course_id}"));
        let response = self.send(self.client.get(url), "course", course_id).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Fatal(anyhow::anyhow!("decode enrollment progress: {e}")))
    }

    async fn start_lesson(&self, lesson_id: LessonId) -> Result<LessonProgress, Error> {
        let url = self.url(&format!("/api/progress/lessons/{lesson_id}/start"));
        let response = self.send(self.client.post(url), "lesson", lesson_id).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Fatal(anyhow::anyhow!("decode lesson progress: {e}")))
    }

    async fn push_progress(
        &self,
        update: ProgressUpdate,
    ) -> Result<ProgressSnapshot, Error> {
        let lesson_id = update.lesson_id;
        let url = self.url(&format!("/api/progress/lessons/{lesson_id}/progress"));
        let response = self
            .send(self.client.put(url).json(&update), "lesson", lesson_id)
            .await?;
        response
            .json()
            .await
            .map_err(|e| Error::Transient(format!("decode progress response: {e}")))
    }

    async fn complete_lesson(
        &self,
        lesson_id: LessonId,
        quiz_score: Option<f32>,
    ) -> Result<ProgressSnapshot, Error> {
        let url = self.url(&format!("/api/progress/lessons/{lesson_id}/complete"));
        let body = CompleteRequest { quiz_score };
        let response = self
            .send(self.client.post(url).json(&body), "lesson", lesson_id)
            .await?;
        response
            .json()
            .await
            .map_err(|e| Error::Transient(format!("decode completion response: {e}")))
    }

    async fn submit_quiz(
        &self,
        lesson_id: LessonId,
        submission: QuizSubmission,
    ) -> Result<QuizOutcome, Error> {
        let url = self.url(&format!("/api/progress/lessons/{lesson_id}/quiz"));
        let response = self
            .send(self.client.post(url).json(&submission), "lesson", lesson_id)
            .await?;
        response
            .json()
            .await
            .map_err(|e| Error::Fatal(anyhow::anyhow!("decode quiz outcome: {e}")))
    }
}
