use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// The upstream is treated as at-least-sometimes-unavailable; callers
/// fall back to the original text instead of retrying.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str)
    -> Result<String, TranslateError>;
}

/// Client for a Google-Translate-v2-shaped endpoint:
/// POST {endpoint}?key={api_key} with `{"q": ..., "target": ...}`.
pub struct HttpTranslator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpTranslator {
    pub fn new(endpoint: String, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct UpstreamResponse {
    data: UpstreamData,
}

#[derive(Deserialize)]
struct UpstreamData {
    translations: Vec<UpstreamTranslation>,
}

#[derive(Deserialize)]
struct UpstreamTranslation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslateError> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "q": text, "target": target_language }))
            .send()
            .await
            .map_err(|e| {
                warn!("Translation upstream unreachable: {}", e);
                TranslateError::Unavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("Translation upstream returned {}", status);
            return Err(TranslateError::Unavailable(format!("status {}", status)));
        }

        let body: UpstreamResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Unavailable(e.to_string()))?;

        body.data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| TranslateError::Unavailable("empty translation response".into()))
    }
}
