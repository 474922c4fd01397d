use std::time::Duration;

use super::truncate;
use crate::config::EnglishConfig;
use crate::error::AppError;

/// Renders a laudo server-side for the sample registered under a session
/// marker and answers with the produced file name.
#[async_trait::async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, session_id: &str) -> Result<String, AppError>;
}

pub struct HttpReportRenderer {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpReportRenderer {
    pub fn new(config: &EnglishConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.render_url.clone(),
            timeout: config.render_timeout,
        }
    }
}

#[async_trait::async_trait]
impl ReportRenderer for HttpReportRenderer {
    #[tracing::instrument(name = "render.english", skip(self), fields(http.response.status_code))]
    async fn render(&self, session_id: &str) -> Result<String, AppError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .query(&[("sesion", session_id), ("lng", "1"), ("directo", "1")])
            .send()
            .await?;

        let status = response.status();
        tracing::Span::current().record("http.response.status_code", status.as_u16());
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AppError::ReportService(format!(
                "render endpoint answered HTTP {}: {}",
                status.as_u16(),
                truncate(&body, 200)
            )));
        }

        Ok(body)
    }
}
