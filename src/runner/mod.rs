//! Code execution: JavaScript runs in an embedded engine, every other
//! supported language goes to the remote execution service.

pub mod languages;
mod piston;
mod script;
mod sink;

use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::models::{ExecutionResult, OutputKind};

pub use languages::{Language, SUPPORTED_LANGUAGES, lookup};
pub use piston::{ExecuteRequest, PistonClient, RemoteExecutor};
use script::run_script;
pub use sink::{ConsoleBuffer, OutputSink};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Execution API error: {status} - {body}")]
    Status { status: StatusCode, body: String },
    #[error("Execution API request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Malformed execution API response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Script worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub struct ExecutionDispatcher {
    remote: Arc<dyn RemoteExecutor>,
    inline_language: String,
}

impl ExecutionDispatcher {
    pub fn new(remote: Arc<dyn RemoteExecutor>, inline_language: impl Into<String>) -> Self {
        Self {
            remote,
            inline_language: inline_language.into(),
        }
    }

    pub fn runs_inline(&self, language: &str) -> bool {
        language == self.inline_language
    }

    /// Never fails: every error becomes a result with exit code 1 and an
    /// `Error` line in `sink`.
    pub async fn execute(
        &self,
        code: &str,
        language: &str,
        stdin: Option<&str>,
        sink: &mut dyn OutputSink,
    ) -> ExecutionResult {
        let started = Instant::now();
        let outcome = if self.runs_inline(language) {
            self.execute_inline(code, sink).await
        } else {
            self.execute_remote(code, language, stdin, sink).await
        };
        let mut result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(language, err=%e, "execution failed");
                let message = e.to_string();
                sink.write(OutputKind::Error, &message);
                ExecutionResult::failure(message)
            }
        };
        let elapsed = started.elapsed().as_millis() as u64;
        result.execution_time_ms = Some(elapsed);
        info!(language, exit_code = result.exit_code, elapsed_ms = elapsed, "execution finished");
        result
    }

    async fn execute_inline(
        &self,
        code: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<ExecutionResult, ExecError> {
        let source = code.to_string();
        let report = tokio::task::spawn_blocking(move || run_script(&source)).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        for (kind, message) in &report.lines {
            sink.write(*kind, message);
            match kind {
                OutputKind::Log => stdout.push(message.clone()),
                OutputKind::Warn => stdout.push(format!("⚠️ {message}")),
                OutputKind::Info => stdout.push(format!("ℹ️ {message}")),
                OutputKind::Error => stderr.push(message.clone()),
            }
        }
        let stdout = stdout.join("\n");

        Ok(match report.error {
            Some(message) => {
                sink.write(OutputKind::Error, &message);
                ExecutionResult {
                    output: stdout.clone(),
                    stdout,
                    stderr: message,
                    exit_code: 1,
                    execution_time_ms: None,
                }
            }
            None => ExecutionResult {
                output: stdout.clone(),
                stdout,
                stderr: stderr.join("\n"),
                exit_code: 0,
                execution_time_ms: None,
            },
        })
    }

    async fn execute_remote(
        &self,
        code: &str,
        language: &str,
        stdin: Option<&str>,
        sink: &mut dyn OutputSink,
    ) -> Result<ExecutionResult, ExecError> {
        let spec =
            lookup(language).ok_or_else(|| ExecError::UnsupportedLanguage(language.to_string()))?;
        let request = ExecuteRequest::new(spec, code, stdin);
        debug!(runtime = spec.runtime, version = spec.version, "dispatching to execution service");
        let result = self.remote.execute(&request).await?;

        for line in result.stdout.lines().filter(|l| !l.is_empty()) {
            sink.write(OutputKind::Log, line);
        }
        for line in result.stderr.lines().filter(|l| !l.is_empty()) {
            sink.write(OutputKind::Error, line);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::piston::Runtime;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingExecutor {
        calls: AtomicUsize,
        requests: Mutex<Vec<ExecuteRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl RemoteExecutor for RecordingExecutor {
        async fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResult, ExecError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ExecError::Status {
                    status: StatusCode::BAD_GATEWAY,
                    body: "upstream down".into(),
                });
            }
            Ok(ExecutionResult {
                stdout: "line one\nline two\n".into(),
                stderr: "warning: unused".into(),
                output: "line one\nline two\n".into(),
                exit_code: 0,
                execution_time_ms: None,
            })
        }

        async fn runtimes(&self) -> Result<Vec<Runtime>, ExecError> {
            Ok(Vec::new())
        }
    }

    fn dispatcher(fail: bool) -> (ExecutionDispatcher, Arc<RecordingExecutor>) {
        let remote = Arc::new(RecordingExecutor {
            fail,
            ..Default::default()
        });
        (ExecutionDispatcher::new(remote.clone(), "javascript"), remote)
    }

    #[tokio::test]
    async fn javascript_never_hits_network() {
        let (d, remote) = dispatcher(false);
        let mut sink = ConsoleBuffer::new();
        let result = d
            .execute(
                "console.log('hi'); console.warn('w'); console.info('i'); console.error('e')",
                "javascript",
                None,
                &mut sink,
            )
            .await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hi\n⚠️ w\nℹ️ i");
        assert_eq!(result.output, result.stdout);
        assert_eq!(result.stderr, "e");
        assert!(result.execution_time_ms.is_some());
        assert_eq!(sink.entries.len(), 4);
    }

    #[tokio::test]
    async fn javascript_throw_sets_exit_code() {
        let (d, _) = dispatcher(false);
        let mut sink = ConsoleBuffer::new();
        let result = d
            .execute("throw new Error('x')", "javascript", None, &mut sink)
            .await;
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, "x");
        assert_eq!(sink.messages(OutputKind::Error), vec!["x"]);
    }

    #[tokio::test]
    async fn every_other_language_goes_remote() {
        let (d, remote) = dispatcher(false);
        for spec in SUPPORTED_LANGUAGES.iter().filter(|l| l.tag != "javascript") {
            let mut sink = ConsoleBuffer::new();
            d.execute("code", spec.tag, Some("in"), &mut sink).await;
        }
        assert_eq!(remote.calls.load(Ordering::SeqCst), 9);
        let requests = remote.requests.lock().unwrap();
        assert!(requests.iter().all(|r| r.stdin.as_deref() == Some("in")));
        assert!(requests.iter().any(|r| r.files[0].name == "main.rs"));
    }

    #[tokio::test]
    async fn remote_lines_reach_sink() {
        let (d, _) = dispatcher(false);
        let mut sink = ConsoleBuffer::new();
        let result = d.execute("print(1)", "python", None, &mut sink).await;
        assert!(result.succeeded());
        assert_eq!(sink.messages(OutputKind::Log), vec!["line one", "line two"]);
        assert_eq!(sink.messages(OutputKind::Error), vec!["warning: unused"]);
    }

    #[tokio::test]
    async fn unsupported_language_fails_fast() {
        let (d, remote) = dispatcher(false);
        let mut sink = ConsoleBuffer::new();
        let result = d.execute("x", "cobol", None, &mut sink).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, "Unsupported language: cobol");
        assert_eq!(sink.messages(OutputKind::Error), vec!["Unsupported language: cobol"]);
    }

    #[tokio::test]
    async fn remote_failure_becomes_result() {
        let (d, _) = dispatcher(true);
        let mut sink = ConsoleBuffer::new();
        let result = d.execute("x", "ruby", None, &mut sink).await;
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("upstream down"));
    }
}
