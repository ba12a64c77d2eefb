use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::models::FileVersion;
use crate::store::client::{BackendClient, filter_eq, order_by};
use crate::store::error::StoreError;

const TABLE: &str = "file_versions";

#[derive(Serialize)]
struct NewVersion<'a> {
    file_id: &'a str,
    content: &'a str,
    version_number: i64,
    description: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct VersionsApi {
    client: BackendClient,
}

impl VersionsApi {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// Newest first.
    pub async fn list_by_file(&self, file_id: &str) -> Result<Vec<FileVersion>, StoreError> {
        self.client
            .select(
                TABLE,
                &[filter_eq("file_id", file_id), order_by("version_number", false)],
            )
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<FileVersion>, StoreError> {
        self.client.select_one(TABLE, &[filter_eq("id", id)]).await
    }

    /// The number is assigned by the backend, never computed here.
    pub async fn create(
        &self,
        file_id: &str,
        content: &str,
        description: Option<&str>,
    ) -> Result<FileVersion, StoreError> {
        let version_number: i64 = self
            .client
            .rpc("get_next_version_number", &json!({ "p_file_id": file_id }))
            .await?;
        let body = NewVersion {
            file_id,
            content,
            version_number,
            description: description.map(str::trim).filter(|d| !d.is_empty()),
        };
        let version: FileVersion = self.client.insert(TABLE, &body).await?;
        info!(file_id=%file_id, version = version.version_number, "version snapshot created");
        Ok(version)
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.client.delete(TABLE, &[filter_eq("id", id)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::client::test_support::client_for;
    use httptest::{Expectation, Server, matchers::*, responders::*};

    fn row(n: i64) -> serde_json::Value {
        json!({
            "id": format!("v{n}"),
            "file_id": "f1",
            "content": "print(1)",
            "version_number": n,
            "description": null,
            "created_at": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn create_asks_backend_for_number() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/rest/v1/rpc/get_next_version_number"),
                request::body(json_decoded(|v: &serde_json::Value| v["p_file_id"] == "f1")),
            ])
            .respond_with(json_encoded(json!(4))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/rest/v1/file_versions"),
                request::body(json_decoded(|v: &serde_json::Value| {
                    v["version_number"] == 4 && v["description"] == "before refactor"
                })),
            ])
            .respond_with(status_code(201).body(json!([row(4)]).to_string())),
        );
        let api = VersionsApi::new(client_for(&server));
        let v = api
            .create("f1", "print(1)", Some(" before refactor "))
            .await
            .unwrap();
        assert_eq!(v.version_number, 4);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/rest/v1/file_versions"),
                request::query(url_decoded(contains(("file_id", "eq.f1")))),
                request::query(url_decoded(contains(("order", "version_number.desc")))),
            ])
            .respond_with(json_encoded(json!([row(2), row(1)]))),
        );
        let api = VersionsApi::new(client_for(&server));
        let versions = api.list_by_file("f1").await.unwrap();
        assert_eq!(versions[0].version_number, 2);
        assert_eq!(versions[1].line_count(), 1);
    }

    #[tokio::test]
    async fn rpc_failure_prevents_insert() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path(
                "POST",
                "/rest/v1/rpc/get_next_version_number",
            ))
            .respond_with(status_code(404).body(r#"{"message":"function not found"}"#)),
        );
        let api = VersionsApi::new(client_for(&server));
        let err = api.create("f1", "x", None).await.unwrap_err();
        assert!(err.to_string().contains("function not found"));
    }
}
