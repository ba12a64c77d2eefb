use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::models::Project;
use crate::store::client::{BackendClient, filter_eq, order_by};
use crate::store::error::StoreError;
use crate::validation::validate_name;

const TABLE: &str = "projects";

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Serialize)]
struct NewProject<'a> {
    name: &'a str,
    description: Option<&'a str>,
}

#[derive(Serialize)]
struct Stamped<'a, T> {
    #[serde(flatten)]
    fields: &'a T,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProjectsApi {
    client: BackendClient,
}

impl ProjectsApi {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// Most recently updated first.
    pub async fn list(&self) -> Result<Vec<Project>, StoreError> {
        self.client
            .select(TABLE, &[order_by("updated_at", false)])
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Project>, StoreError> {
        self.client.select_one(TABLE, &[filter_eq("id", id)]).await
    }

    pub async fn create(&self, name: &str, description: Option<&str>) -> Result<Project, StoreError> {
        validate_name(name)?;
        let body = NewProject {
            name: name.trim(),
            description: description.map(str::trim).filter(|d| !d.is_empty()),
        };
        let project: Project = self.client.insert(TABLE, &body).await?;
        info!(project_id=%project.id, name=%project.name, "project created");
        Ok(project)
    }

    pub async fn update(&self, id: &str, update: &ProjectUpdate) -> Result<Project, StoreError> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        let body = Stamped {
            fields: update,
            updated_at: Utc::now(),
        };
        self.client
            .update(TABLE, &[filter_eq("id", id)], &body)
            .await?
            .ok_or_else(|| StoreError::not_found("Project", id))
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.client.delete(TABLE, &[filter_eq("id", id)]).await?;
        info!(project_id=%id, "project deleted");
        Ok(())
    }
}
