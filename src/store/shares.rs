use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::models::{Share, SharePermission, SharedSnippet};
use crate::store::client::{BackendClient, filter_eq, order_by};
use crate::store::error::StoreError;

const SHARES: &str = "shares";
const SNIPPETS: &str = "shared_snippets";

/// Opaque, unguessable link token.
pub fn new_share_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Serialize)]
struct NewShare<'a> {
    project_id: &'a str,
    share_token: &'a str,
    permission: SharePermission,
    created_by: Option<&'a str>,
}

#[derive(Serialize)]
struct NewSnippet<'a> {
    share_id: &'a str,
    file_id: Option<&'a str>,
    file_name: &'a str,
    content: &'a str,
    language: &'a str,
    expires_at: Option<DateTime<Utc>>,
}

/// Project-level share links.
#[derive(Debug, Clone)]
pub struct SharesApi {
    client: BackendClient,
}

impl SharesApi {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    pub async fn create(
        &self,
        project_id: &str,
        permission: SharePermission,
        created_by: Option<&str>,
    ) -> Result<Share, StoreError> {
        let token = new_share_token();
        let body = NewShare {
            project_id,
            share_token: &token,
            permission,
            created_by,
        };
        let share: Share = self.client.insert(SHARES, &body).await?;
        info!(project_id=%project_id, %permission, "project share created");
        Ok(share)
    }

    /// Only active shares resolve.
    pub async fn get_by_token(&self, token: &str) -> Result<Option<Share>, StoreError> {
        self.client
            .select_one(
                SHARES,
                &[filter_eq("share_token", token), filter_eq("is_active", "true")],
            )
            .await
    }

    pub async fn list_by_project(&self, project_id: &str) -> Result<Vec<Share>, StoreError> {
        self.client
            .select(
                SHARES,
                &[filter_eq("project_id", project_id), order_by("created_at", false)],
            )
            .await
    }

    pub async fn deactivate(&self, id: &str) -> Result<(), StoreError> {
        self.client
            .update_minimal(SHARES, &[filter_eq("id", id)], &json!({ "is_active": false }))
            .await?;
        info!(share_id=%id, "project share deactivated");
        Ok(())
    }
}

/// Single-file snippet shares.
#[derive(Debug, Clone)]
pub struct SnippetsApi {
    client: BackendClient,
}

impl SnippetsApi {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    pub async fn create(
        &self,
        file_id: Option<&str>,
        file_name: &str,
        content: &str,
        language: &str,
        expires_in_days: Option<u32>,
    ) -> Result<SharedSnippet, StoreError> {
        let share_id = new_share_token();
        let body = NewSnippet {
            share_id: &share_id,
            file_id,
            file_name,
            content,
            language,
            expires_at: expires_in_days.map(|d| Utc::now() + Duration::days(i64::from(d))),
        };
        let snippet: SharedSnippet = self.client.insert(SNIPPETS, &body).await?;
        info!(share_id=%snippet.share_id, file_name=%file_name, "snippet shared");
        Ok(snippet)
    }

    pub async fn get_by_share_id(&self, share_id: &str) -> Result<Option<SharedSnippet>, StoreError> {
        self.client
            .select_one(SNIPPETS, &[filter_eq("share_id", share_id)])
            .await
    }

    pub fn is_expired(snippet: &SharedSnippet, now: DateTime<Utc>) -> bool {
        snippet.is_expired_at(now)
    }

    pub async fn record_view(&self, share_id: &str) -> Result<(), StoreError> {
        self.client
            .rpc_void("increment_snippet_views", &json!({ "p_share_id": share_id }))
            .await
    }
}
