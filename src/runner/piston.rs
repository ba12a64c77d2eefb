use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::models::ExecutionResult;
use crate::runner::ExecError;
use crate::runner::languages::{Language, LanguageSpec, builtin_languages, capitalize};

#[derive(Debug, Clone, Serialize)]
pub struct PistonFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub version: String,
    pub files: Vec<PistonFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

impl ExecuteRequest {
    pub fn new(spec: &LanguageSpec, code: &str, stdin: Option<&str>) -> Self {
        Self {
            language: spec.runtime.to_string(),
            version: spec.version.to_string(),
            files: vec![PistonFile {
                name: format!("main.{}", spec.extension),
                content: code.to_string(),
            }],
            stdin: stdin.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunStage {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompileStage {
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub run: Option<RunStage>,
    #[serde(default)]
    pub compile: Option<CompileStage>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

impl ExecuteResponse {
    /// Compile diagnostics take precedence over runtime stderr.
    pub fn into_result(self) -> ExecutionResult {
        let run = self.run.unwrap_or_default();
        let compile = self.compile.unwrap_or_default();

        let stdout = run.stdout.unwrap_or_default();
        let stderr = non_empty(compile.stderr)
            .or_else(|| non_empty(run.stderr))
            .unwrap_or_default();
        let output = non_empty(run.output).unwrap_or_else(|| stdout.clone());
        let exit_code = run
            .code
            .or(compile.code.filter(|c| *c != 0))
            .unwrap_or(0);

        ExecutionResult {
            stdout,
            stderr,
            output,
            exit_code,
            execution_time_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Runtime {
    pub language: String,
    pub version: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Remote compile-and-run service.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResult, ExecError>;

    async fn runtimes(&self) -> Result<Vec<Runtime>, ExecError>;
}

#[derive(Debug, Clone)]
pub struct PistonClient {
    pub api_url: String,
    inner: reqwest::Client,
}

impl PistonClient {
    pub fn new(api_url: impl Into<String>, http: &HttpConfig) -> Result<Self, ExecError> {
        let inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(http.connect_timeout_ms))
            .timeout(Duration::from_millis(http.request_timeout_ms))
            .build()?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            inner,
        })
    }

    /// Runtime list for display, falling back to the built-in table.
    pub async fn available_languages(&self) -> Vec<Language> {
        match self.runtimes().await {
            Ok(runtimes) => runtimes
                .into_iter()
                .map(|r| Language {
                    name: capitalize(&r.language),
                    id: r.language,
                    version: r.version,
                    aliases: r.aliases,
                })
                .collect(),
            Err(e) => {
                warn!(err=%e, "fetching runtimes failed; using built-in languages");
                builtin_languages()
            }
        }
    }
}

#[async_trait]
impl RemoteExecutor for PistonClient {
    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResult, ExecError> {
        let url = format!("{}/execute", self.api_url);
        debug!(endpoint=%url, language=%request.language, version=%request.version, "sending execute request");
        let resp = self.inner.post(&url).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExecError::Status { status, body });
        }
        let text = resp.text().await?;
        let parsed: ExecuteResponse = serde_json::from_str(&text)?;
        Ok(parsed.into_result())
    }

    async fn runtimes(&self) -> Result<Vec<Runtime>, ExecError> {
        let url = format!("{}/runtimes", self.api_url);
        let resp = self.inner.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExecError::Status { status, body });
        }
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
