//! Session-scoped service container. Built once from configuration and the
//! local session, then handed to whichever front-end drives it.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::autosave::AutoSaver;
use crate::completion::{CompletionRequest, CompletionService, CompletionSuggestion, OpenAIClient};
use crate::config::AppConfig;
use crate::files::{DEFAULT_FILE_CONTENT, ensure_correct_extension, language_from_filename};
use crate::models::{
    CodeFile, ExecutionResult, FileVersion, Project, Share, SharePermission, SharedSnippet,
};
use crate::runner::{ExecutionDispatcher, Language, OutputSink, PistonClient};
use crate::session::{AuthSession, SessionData, SessionStore};
use crate::store::{
    AuthApi, BackendClient, FileUpdate, FilesApi, ProjectsApi, SharesApi, SnippetsApi, StoreError,
    VersionsApi,
};
use crate::validation::ValidationError;

/// What a share link points at.
#[derive(Debug)]
pub enum OpenedShare {
    Snippet(SharedSnippet),
    Project {
        share: Share,
        project: Project,
        files: Vec<CodeFile>,
    },
}

pub struct Workspace {
    pub config: AppConfig,
    pub backend: BackendClient,
    pub projects: ProjectsApi,
    pub files: FilesApi,
    pub versions: VersionsApi,
    pub shares: SharesApi,
    pub snippets: SnippetsApi,
    pub auth: AuthApi,
    completion_client: OpenAIClient,
    completion: CompletionService,
    piston: PistonClient,
    dispatcher: ExecutionDispatcher,
    session: SessionStore,
    user: Option<AuthSession>,
}

impl Workspace {
    pub fn open(config: AppConfig) -> Result<Self> {
        let session = SessionStore::new(&config.session_file);
        let data = session
            .load()
            .with_context(|| format!("load session: {}", session.path().display()))?;
        Self::new(config, session, data)
    }

    pub fn new(config: AppConfig, session: SessionStore, data: SessionData) -> Result<Self> {
        let backend =
            BackendClient::new(&config.backend, &config.http).context("build backend client")?;
        backend.set_access_token(data.access_token().map(str::to_string));

        let mut completion_cfg = config.completion.clone();
        if completion_cfg.api_key.is_none() {
            completion_cfg.api_key = data.completion_api_key.clone();
        }
        let completion_client = OpenAIClient::new(completion_cfg)
            .context("build completion client")?
            .with_http_config(&config.http);
        let completion = CompletionService::new(
            Arc::new(completion_client.clone()),
            config.completion.cache_capacity,
            config.completion.key_window,
        );

        let piston = PistonClient::new(&config.execution.api_url, &config.http)
            .context("build execution client")?;
        let dispatcher = ExecutionDispatcher::new(
            Arc::new(piston.clone()),
            config.execution.inline_language.clone(),
        );

        Ok(Self {
            projects: ProjectsApi::new(backend.clone()),
            files: FilesApi::new(backend.clone()),
            versions: VersionsApi::new(backend.clone()),
            shares: SharesApi::new(backend.clone()),
            snippets: SnippetsApi::new(backend.clone()),
            auth: AuthApi::new(backend.clone(), config.backend.email_domain.clone()),
            backend,
            completion_client,
            completion,
            piston,
            dispatcher,
            session,
            user: data.auth,
            config,
        })
    }

    pub fn user(&self) -> Option<&AuthSession> {
        self.user.as_ref()
    }

    pub async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Project, StoreError> {
        self.projects.create(name, description).await
    }

    /// The language defaults to the one implied by the name's extension, and
    /// the extension is corrected to match the language.
    pub async fn create_file(
        &self,
        project_id: &str,
        name: &str,
        language: Option<&str>,
    ) -> Result<CodeFile, StoreError> {
        let language = language.unwrap_or_else(|| language_from_filename(name.trim()));
        let name = ensure_correct_extension(name.trim(), language);
        self.files
            .create(project_id, &name, Some(DEFAULT_FILE_CONTENT), Some(language))
            .await
    }

    pub async fn load_file(&self, file_id: &str) -> Result<CodeFile, StoreError> {
        self.files
            .get(file_id)
            .await?
            .ok_or_else(|| StoreError::not_found("File", file_id))
    }

    pub async fn run_code(
        &self,
        code: &str,
        language: &str,
        stdin: Option<&str>,
        sink: &mut dyn OutputSink,
    ) -> Result<ExecutionResult, ValidationError> {
        if code.trim().is_empty() {
            return Err(ValidationError::EmptyCode);
        }
        Ok(self.dispatcher.execute(code, language, stdin, sink).await)
    }

    pub async fn run_file(
        &self,
        file_id: &str,
        stdin: Option<&str>,
        sink: &mut dyn OutputSink,
    ) -> Result<ExecutionResult, StoreError> {
        let file = self.load_file(file_id).await?;
        info!(file_id=%file.id, language=%file.language, "running file");
        Ok(self
            .run_code(&file.content, &file.language, stdin, sink)
            .await?)
    }

    /// Explicit save: writes the content and appends a version snapshot.
    pub async fn save_file(
        &self,
        file_id: &str,
        content: &str,
        description: Option<&str>,
    ) -> Result<(CodeFile, FileVersion), StoreError> {
        let update = FileUpdate {
            content: Some(content.to_string()),
            ..Default::default()
        };
        let file = self.files.update(file_id, &update).await?;
        let version = self.versions.create(file_id, content, description).await?;
        Ok((file, version))
    }

    pub async fn restore_version(&self, version_id: &str) -> Result<CodeFile, StoreError> {
        let version = self
            .versions
            .get(version_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Version", version_id))?;
        let update = FileUpdate {
            content: Some(version.content),
            ..Default::default()
        };
        let file = self.files.update(&version.file_id, &update).await?;
        info!(file_id=%file.id, version = version.version_number, "version restored");
        Ok(file)
    }

    pub async fn share_project(
        &self,
        project_id: &str,
        permission: SharePermission,
    ) -> Result<(Share, String), StoreError> {
        let created_by = self.user.as_ref().map(|u| u.user_id.as_str());
        let share = self.shares.create(project_id, permission, created_by).await?;
        let url = self.config.share_url(&share.share_token);
        Ok((share, url))
    }

    pub async fn share_file(
        &self,
        file_id: &str,
        expires_in_days: Option<u32>,
    ) -> Result<(SharedSnippet, String), StoreError> {
        let file = self.load_file(file_id).await?;
        let snippet = self
            .snippets
            .create(
                Some(&file.id),
                &file.name,
                &file.content,
                &file.language,
                expires_in_days,
            )
            .await?;
        let url = self.config.share_url(&snippet.share_id);
        Ok((snippet, url))
    }

    /// Loads a shared snippet, refusing expired ones, and counts the view.
    pub async fn open_share(&self, share_id: &str) -> Result<SharedSnippet, StoreError> {
        let snippet = self
            .snippets
            .get_by_share_id(share_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Snippet", share_id))?;
        if SnippetsApi::is_expired(&snippet, Utc::now()) {
            return Err(StoreError::Expired);
        }
        if let Err(e) = self.snippets.record_view(share_id).await {
            warn!(err=%e, share_id, "recording snippet view failed");
        }
        Ok(snippet)
    }

    pub async fn open_project_share(
        &self,
        token: &str,
    ) -> Result<(Share, Project, Vec<CodeFile>), StoreError> {
        let share = self
            .shares
            .get_by_token(token)
            .await?
            .ok_or_else(|| StoreError::not_found("Share", token))?;
        let project = self
            .projects
            .get(&share.project_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Project", &share.project_id))?;
        let files = self.files.list_by_project(&project.id).await?;
        Ok((share, project, files))
    }

    /// Resolves a share link token: snippets first, then project shares.
    pub async fn open_link(&self, token: &str) -> Result<OpenedShare, StoreError> {
        match self.open_share(token).await {
            Ok(snippet) => Ok(OpenedShare::Snippet(snippet)),
            Err(StoreError::NotFound { .. }) => {
                let (share, project, files) = self.open_project_share(token).await?;
                Ok(OpenedShare::Project {
                    share,
                    project,
                    files,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn autosaver(&self, file: &CodeFile) -> AutoSaver {
        AutoSaver::spawn(
            Arc::new(self.files.clone()),
            file.id.clone(),
            file.content.clone(),
            Duration::from_millis(self.config.autosave.debounce_ms),
        )
    }

    pub async fn complete(&self, request: CompletionRequest) -> Vec<CompletionSuggestion> {
        self.completion.get_completions(request).await
    }

    pub fn completion_configured(&self) -> bool {
        self.completion.is_configured()
    }

    pub async fn languages(&self) -> Vec<Language> {
        self.piston.available_languages().await
    }

    pub fn set_api_key(&self, key: &str) -> Result<()> {
        self.session
            .update(|d| d.set_api_key(key))
            .context("store API key")?;
        self.completion_client.set_api_key(key);
        self.completion.clear_cache();
        Ok(())
    }

    pub fn clear_api_key(&self) -> Result<()> {
        self.session
            .update(|d| d.clear_api_key())
            .context("clear API key")?;
        self.completion_client.clear_api_key();
        self.completion.clear_cache();
        Ok(())
    }

    pub async fn sign_in(&mut self, username: &str, password: &str) -> Result<AuthSession> {
        let auth = self.auth.sign_in(username, password).await?;
        self.remember(auth)
    }

    pub async fn sign_up(
        &mut self,
        username: &str,
        password: &str,
        confirm: &str,
    ) -> Result<AuthSession> {
        let auth = self.auth.sign_up(username, password, confirm).await?;
        self.remember(auth)
    }

    fn remember(&mut self, auth: AuthSession) -> Result<AuthSession> {
        let stored = auth.clone();
        self.session
            .update(move |d| d.set_auth(stored))
            .context("store auth session")?;
        self.user = Some(auth.clone());
        Ok(auth)
    }

    pub async fn sign_out(&mut self) -> Result<()> {
        self.auth.sign_out().await;
        self.backend.set_access_token(None);
        self.session
            .update(|d| d.clear_auth())
            .context("clear auth session")?;
        self.user = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::models::OutputKind;
    use crate::runner::ConsoleBuffer;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;
    use tempfile::TempDir;

    fn workspace(server: &Server, dir: &TempDir) -> Workspace {
        let config = AppConfig {
            backend: BackendConfig {
                url: server.url_str(""),
                anon_key: "anon-key".into(),
                email_domain: "chambers.local".into(),
            },
            session_file: dir.path().join("session.json"),
            ..AppConfig::default()
        };
        Workspace::open(config).unwrap()
    }

    fn file_row(content: &str) -> serde_json::Value {
        json!({
            "id": "f1",
            "project_id": "p1",
            "name": "script.js",
            "content": content,
            "language": "javascript",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn create_project_file_and_run() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/rest/v1/projects"),
                request::body(json_decoded(|v: &serde_json::Value| v["name"] == "Demo")),
            ])
            .respond_with(
                status_code(201).body(
                    json!([{
                        "id": "p1",
                        "name": "Demo",
                        "description": null,
                        "created_at": "2024-05-01T10:00:00Z",
                        "updated_at": "2024-05-01T10:00:00Z"
                    }])
                    .to_string(),
                ),
            ),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/rest/v1/code_files"),
                request::body(json_decoded(|v: &serde_json::Value| {
                    v["name"] == "script.js"
                        && v["content"] == "// Write your code here\n"
                        && v["project_id"] == "p1"
                })),
            ])
            .respond_with(
                status_code(201).body(json!([file_row("// Write your code here\n")]).to_string()),
            ),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/rest/v1/code_files"),
                request::query(url_decoded(contains(("id", "eq.f1")))),
            ])
            .times(2)
            .respond_with(cycle![
                json_encoded(json!([file_row("// Write your code here\nconsole.log(1 + 1);")])),
                json_encoded(json!([file_row("throw new Error('x')")])),
            ]),
        );

        let ws = workspace(&server, &dir);
        let project = ws.create_project("Demo", None).await.unwrap();
        let file = ws.create_file(&project.id, "script", None).await.unwrap();
        assert_eq!(file.name, "script.js");

        let mut sink = ConsoleBuffer::new();
        let ok = ws.run_file(&file.id, None, &mut sink).await.unwrap();
        assert_eq!(ok.exit_code, 0);
        assert!(ok.stderr.is_empty());
        assert_eq!(ok.stdout, "2");

        let mut sink = ConsoleBuffer::new();
        let failed = ws.run_file(&file.id, None, &mut sink).await.unwrap();
        assert_eq!(failed.exit_code, 1);
        assert!(!failed.stderr.is_empty());
        assert_eq!(sink.messages(OutputKind::Error), vec!["x"]);
    }

    #[tokio::test]
    async fn blank_code_is_rejected() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&server, &dir);
        let mut sink = ConsoleBuffer::new();
        let err = ws
            .run_code("  \n ", "python", None, &mut sink)
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyCode);
    }

    #[tokio::test]
    async fn save_appends_version() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(request::method_path("PATCH", "/rest/v1/code_files"))
                .respond_with(json_encoded(json!([file_row("v2")]))),
        );
        server.expect(
            Expectation::matching(request::method_path(
                "POST",
                "/rest/v1/rpc/get_next_version_number",
            ))
            .respond_with(json_encoded(json!(2))),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/rest/v1/file_versions"))
                .respond_with(
                    status_code(201).body(
                        json!([{
                            "id": "v2",
                            "file_id": "f1",
                            "content": "v2",
                            "version_number": 2,
                            "created_at": "2024-05-01T10:00:00Z"
                        }])
                        .to_string(),
                    ),
                ),
        );
        let ws = workspace(&server, &dir);
        let (file, version) = ws.save_file("f1", "v2", None).await.unwrap();
        assert_eq!(file.content, "v2");
        assert_eq!(version.version_number, 2);
    }

    #[tokio::test]
    async fn expired_snippet_is_refused_without_counting() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(request::method_path("GET", "/rest/v1/shared_snippets"))
                .respond_with(json_encoded(json!([{
                    "id": "n1",
                    "share_id": "abc",
                    "file_name": "a.js",
                    "content": "",
                    "language": "javascript",
                    "expires_at": "2020-01-01T00:00:00Z",
                    "view_count": 0,
                    "created_at": "2019-12-01T00:00:00Z"
                }]))),
        );
        let ws = workspace(&server, &dir);
        let err = ws.open_share("abc").await.unwrap_err();
        assert!(matches!(err, StoreError::Expired));
    }

    fn snippet_row(expires_at: &str) -> serde_json::Value {
        json!({
            "id": "n1",
            "share_id": "abc",
            "file_id": "f1",
            "file_name": "a.js",
            "content": "console.log(1);",
            "language": "javascript",
            "expires_at": expires_at,
            "view_count": 4,
            "created_at": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn restore_version_writes_its_content_back() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/rest/v1/file_versions"),
                request::query(url_decoded(contains(("id", "eq.v1")))),
            ])
            .respond_with(json_encoded(json!([{
                "id": "v1",
                "file_id": "f1",
                "content": "let old = true;",
                "version_number": 1,
                "created_at": "2024-05-01T10:00:00Z"
            }]))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PATCH", "/rest/v1/code_files"),
                request::query(url_decoded(contains(("id", "eq.f1")))),
                request::body(json_decoded(|v: &serde_json::Value| {
                    v["content"] == "let old = true;"
                })),
            ])
            .respond_with(json_encoded(json!([file_row("let old = true;")]))),
        );
        let ws = workspace(&server, &dir);
        let file = ws.restore_version("v1").await.unwrap();
        assert_eq!(file.id, "f1");
        assert_eq!(file.content, "let old = true;");
    }

    #[tokio::test]
    async fn restoring_unknown_version_changes_nothing() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(request::method_path("GET", "/rest/v1/file_versions"))
                .respond_with(json_encoded(json!([]))),
        );
        let ws = workspace(&server, &dir);
        let err = ws.restore_version("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn open_share_counts_the_view() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/rest/v1/shared_snippets"),
                request::query(url_decoded(contains(("share_id", "eq.abc")))),
            ])
            .respond_with(json_encoded(json!([snippet_row("2999-01-01T00:00:00Z")]))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/rest/v1/rpc/increment_snippet_views"),
                request::body(json_decoded(|v: &serde_json::Value| v["p_share_id"] == "abc")),
            ])
            .times(1)
            .respond_with(status_code(204)),
        );
        let ws = workspace(&server, &dir);
        let snippet = ws.open_share("abc").await.unwrap();
        assert_eq!(snippet.file_name, "a.js");
        assert_eq!(snippet.content, "console.log(1);");
    }

    #[tokio::test]
    async fn failed_view_count_still_opens_snippet() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(request::method_path("GET", "/rest/v1/shared_snippets"))
                .respond_with(json_encoded(json!([snippet_row("2999-01-01T00:00:00Z")]))),
        );
        server.expect(
            Expectation::matching(request::method_path(
                "POST",
                "/rest/v1/rpc/increment_snippet_views",
            ))
            .respond_with(status_code(500).body(r#"{"message":"function missing"}"#)),
        );
        let ws = workspace(&server, &dir);
        match ws.open_link("abc").await.unwrap() {
            OpenedShare::Snippet(snippet) => assert_eq!(snippet.share_id, "abc"),
            other => panic!("unexpected share: {other:?}"),
        }
    }

    fn expect_project_share(server: &Server) {
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/rest/v1/shares"),
                request::query(url_decoded(contains(("share_token", "eq.tok")))),
                request::query(url_decoded(contains(("is_active", "eq.true")))),
            ])
            .respond_with(json_encoded(json!([{
                "id": "s1",
                "project_id": "p1",
                "share_token": "tok",
                "permission": "edit",
                "is_active": true,
                "created_at": "2024-05-01T10:00:00Z"
            }]))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/rest/v1/projects"),
                request::query(url_decoded(contains(("id", "eq.p1")))),
            ])
            .respond_with(json_encoded(json!([{
                "id": "p1",
                "name": "Demo",
                "description": null,
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": "2024-05-01T10:00:00Z"
            }]))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/rest/v1/code_files"),
                request::query(url_decoded(contains(("project_id", "eq.p1")))),
            ])
            .respond_with(json_encoded(json!([file_row("console.log(1);")]))),
        );
    }

    #[tokio::test]
    async fn open_project_share_loads_project_and_files() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        expect_project_share(&server);
        let ws = workspace(&server, &dir);
        let (share, project, files) = ws.open_project_share("tok").await.unwrap();
        assert_eq!(share.permission, SharePermission::Edit);
        assert_eq!(project.name, "Demo");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "script.js");
    }

    #[tokio::test]
    async fn link_falls_back_to_project_share() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/rest/v1/shared_snippets"),
                request::query(url_decoded(contains(("share_id", "eq.tok")))),
            ])
            .respond_with(json_encoded(json!([]))),
        );
        expect_project_share(&server);
        let ws = workspace(&server, &dir);
        match ws.open_link("tok").await.unwrap() {
            OpenedShare::Project {
                share,
                project,
                files,
            } => {
                assert_eq!(share.share_token, "tok");
                assert_eq!(project.id, "p1");
                assert_eq!(files.len(), 1);
            }
            other => panic!("unexpected share: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_link_is_not_found() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        server.expect(
            Expectation::matching(request::method_path("GET", "/rest/v1/shared_snippets"))
                .respond_with(json_encoded(json!([]))),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/rest/v1/shares"))
                .respond_with(json_encoded(json!([]))),
        );
        let ws = workspace(&server, &dir);
        let err = ws.open_link("zzz").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn api_key_is_persisted_locally() {
        let server = Server::run();
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&server, &dir);
        assert!(!ws.completion_configured());
        ws.set_api_key("sk-local").unwrap();
        assert!(ws.completion_configured());

        let reopened = workspace(&server, &dir);
        assert!(reopened.completion_configured());
        reopened.clear_api_key().unwrap();
        assert!(!workspace(&server, &dir).completion_configured());
    }
}
