use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::autosave::SaveTarget;
use crate::files::DEFAULT_LANGUAGE;
use crate::models::CodeFile;
use crate::store::client::{BackendClient, filter_eq, order_by};
use crate::store::error::StoreError;
use crate::validation::validate_filename;

const TABLE: &str = "code_files";

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Serialize)]
struct NewFile<'a> {
    project_id: &'a str,
    name: &'a str,
    content: &'a str,
    language: &'a str,
}

#[derive(Serialize)]
struct FilePatch<'a> {
    #[serde(flatten)]
    fields: &'a FileUpdate,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ContentPatch<'a> {
    content: &'a str,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FilesApi {
    client: BackendClient,
}

impl FilesApi {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// Sorted by name.
    pub async fn list_by_project(&self, project_id: &str) -> Result<Vec<CodeFile>, StoreError> {
        self.client
            .select(
                TABLE,
                &[filter_eq("project_id", project_id), order_by("name", true)],
            )
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<CodeFile>, StoreError> {
        self.client.select_one(TABLE, &[filter_eq("id", id)]).await
    }

    /// `content` defaults to empty and `language` to javascript.
    pub async fn create(
        &self,
        project_id: &str,
        name: &str,
        content: Option<&str>,
        language: Option<&str>,
    ) -> Result<CodeFile, StoreError> {
        validate_filename(name)?;
        let body = NewFile {
            project_id,
            name,
            content: content.unwrap_or_default(),
            language: language.unwrap_or(DEFAULT_LANGUAGE),
        };
        let file: CodeFile = self.client.insert(TABLE, &body).await?;
        info!(file_id=%file.id, name=%file.name, language=%file.language, "file created");
        Ok(file)
    }

    pub async fn update(&self, id: &str, update: &FileUpdate) -> Result<CodeFile, StoreError> {
        if let Some(name) = &update.name {
            validate_filename(name)?;
        }
        let body = FilePatch {
            fields: update,
            updated_at: Utc::now(),
        };
        self.client
            .update(TABLE, &[filter_eq("id", id)], &body)
            .await?
            .ok_or_else(|| StoreError::not_found("File", id))
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.client.delete(TABLE, &[filter_eq("id", id)]).await?;
        info!(file_id=%id, "file deleted");
        Ok(())
    }

    /// Content-only write used by the autosaver.
    pub async fn auto_save(&self, id: &str, content: &str) -> Result<(), StoreError> {
        let body = ContentPatch {
            content,
            updated_at: Utc::now(),
        };
        self.client
            .update_minimal(TABLE, &[filter_eq("id", id)], &body)
            .await?;
        debug!(file_id=%id, bytes = content.len(), "file auto-saved");
        Ok(())
    }
}

#[async_trait]
impl SaveTarget for FilesApi {
    async fn save(&self, file_id: &str, content: &str) -> Result<(), StoreError> {
        self.auto_save(file_id, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::client::test_support::client_for;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;

    fn row(id: &str, name: &str, content: &str) -> serde_json::Value {
        json!({
            "id": id,
            "project_id": "p1",
            "name": name,
            "content": content,
            "language": "javascript",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn list_filters_by_project_and_sorts_by_name() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/rest/v1/code_files"),
                request::query(url_decoded(contains(("project_id", "eq.p1")))),
                request::query(url_decoded(contains(("order", "name.asc")))),
            ])
            .respond_with(json_encoded(json!([row("f1", "a.js", ""), row("f2", "b.js", "")]))),
        );
        let api = FilesApi::new(client_for(&server));
        let files = api.list_by_project("p1").await.unwrap();
        assert_eq!(files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(), ["a.js", "b.js"]);
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/rest/v1/code_files"),
                request::body(json_decoded(|v: &serde_json::Value| {
                    v["content"] == "" && v["language"] == "javascript" && v["name"] == "main.js"
                })),
            ])
            .respond_with(status_code(201).body(json!([row("f1", "main.js", "")]).to_string())),
        );
        let api = FilesApi::new(client_for(&server));
        let file = api.create("p1", "main.js", None, None).await.unwrap();
        assert_eq!(file.id, "f1");
    }

    #[tokio::test]
    async fn invalid_filename_is_rejected_locally() {
        let server = Server::run();
        let api = FilesApi::new(client_for(&server));
        for bad in ["", "a/b.js", ".hidden"] {
            let err = api.create("p1", bad, None, None).await.unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn auto_save_patches_content_only() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PATCH", "/rest/v1/code_files"),
                request::query(url_decoded(contains(("id", "eq.f1")))),
                request::headers(contains(("prefer", "return=minimal"))),
                request::body(json_decoded(|v: &serde_json::Value| {
                    v["content"] == "let x = 1;"
                        && v["updated_at"].is_string()
                        && v.get("name").is_none()
                })),
            ])
            .respond_with(status_code(204)),
        );
        let api = FilesApi::new(client_for(&server));
        api.save("f1", "let x = 1;").await.unwrap();
    }

    #[tokio::test]
    async fn update_returns_row() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PATCH", "/rest/v1/code_files"),
                request::body(json_decoded(|v: &serde_json::Value| {
                    v["content"] == "new" && v.get("language").is_none()
                })),
            ])
            .respond_with(json_encoded(json!([row("f1", "a.js", "new")]))),
        );
        let api = FilesApi::new(client_for(&server));
        let update = FileUpdate {
            content: Some("new".into()),
            ..Default::default()
        };
        assert_eq!(api.update("f1", &update).await.unwrap().content, "new");
    }
}
