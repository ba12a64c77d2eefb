//! Thin CRUD façade over the hosted database and its auth service.

mod auth;
mod client;
mod error;
mod files;
mod projects;
mod shares;
mod versions;

pub use auth::AuthApi;
pub use client::BackendClient;
pub use error::StoreError;
pub use files::{FileUpdate, FilesApi};
pub use projects::{ProjectUpdate, ProjectsApi};
pub use shares::{SharesApi, SnippetsApi};
pub use versions::VersionsApi;
