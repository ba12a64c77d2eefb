use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::completion::prompt::{build_chat_request, parse_suggestions};
use crate::completion::types::{ChatResponse, CompletionRequest, CompletionSuggestion};
use crate::config::{CompletionConfig, HttpConfig};

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion API key is not configured")]
    NotConfigured,
    #[error("chat error: {status} - {body}")]
    Status { status: StatusCode, body: String },
    #[error("send chat request: {0}")]
    Network(#[from] reqwest::Error),
    #[error("parse chat response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid API key header value")]
    InvalidKey,
}

impl CompletionError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Source of raw suggestions. The service layers caching on top.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn is_configured(&self) -> bool;

    /// Never fails: any error is logged and becomes an empty list.
    async fn fetch(&self, request: &CompletionRequest) -> Vec<CompletionSuggestion>;
}

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    pub base_url: String,
    pub(crate) inner: reqwest::Client,
    pub cfg: CompletionConfig,
    api_key: Arc<RwLock<Option<String>>>,
}

impl OpenAIClient {
    pub fn new(cfg: CompletionConfig) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder().build()?;
        let api_key = cfg.api_key.clone().filter(|k| !k.trim().is_empty());
        Ok(Self {
            base_url: cfg.base_url.clone(),
            inner,
            cfg,
            api_key: Arc::new(RwLock::new(api_key)),
        })
    }

    pub fn with_http_config(mut self, http: &HttpConfig) -> Self {
        let builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(http.connect_timeout_ms))
            .timeout(Duration::from_millis(http.request_timeout_ms));
        // Keep the default client if the builder rejects the settings.
        if let Ok(c) = builder.build() {
            self.inner = c;
        }
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        let mut base = self.base_url.trim_end_matches('/').to_string();
        if let Some(pos) = base.rfind("/v1") {
            base.truncate(pos);
            base = base.trim_end_matches('/').to_string();
        }
        format!("{base}/v1/chat/completions")
    }

    pub fn set_api_key(&self, key: impl Into<String>) {
        let key = key.into();
        let value = (!key.trim().is_empty()).then(|| key.trim().to_string());
        match self.api_key.write() {
            Ok(mut slot) => *slot = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    pub fn clear_api_key(&self) {
        self.set_api_key("");
    }

    fn current_key(&self) -> Option<String> {
        match self.api_key.read() {
            Ok(k) => k.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub async fn request_completions(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<CompletionSuggestion>, CompletionError> {
        let key = self.current_key().ok_or(CompletionError::NotConfigured)?;
        let url = self.endpoint();
        let body = build_chat_request(&self.cfg, &request.code, &request.language, request.cursor);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| CompletionError::InvalidKey)?,
        );

        debug!(endpoint=%url, language=%request.language, "sending completion request");
        let resp = self.inner.post(&url).headers(headers).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body: text });
        }

        let text = resp.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&text)?;
        Ok(parse_suggestions(parsed, &request.language))
    }
}

#[async_trait]
impl CompletionBackend for OpenAIClient {
    fn is_configured(&self) -> bool {
        self.current_key().is_some()
    }

    async fn fetch(&self, request: &CompletionRequest) -> Vec<CompletionSuggestion> {
        match self.request_completions(request).await {
            Ok(suggestions) => suggestions,
            Err(e) if e.is_rate_limited() => {
                warn!(err=%e, "completion API rate limited");
                Vec::new()
            }
            Err(e) => {
                error!(err=%e, "completion request failed");
                Vec::new()
            }
        }
    }
}
