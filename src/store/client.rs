use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::config::{BackendConfig, HttpConfig};
use crate::store::error::StoreError;

pub fn filter_eq(column: &'static str, value: &str) -> (&'static str, String) {
    (column, format!("eq.{value}"))
}

pub fn order_by(column: &str, ascending: bool) -> (&'static str, String) {
    let dir = if ascending { "asc" } else { "desc" };
    ("order", format!("{column}.{dir}"))
}

/// HTTP access to the hosted database (REST tables and RPC) and its auth
/// service. Cheap to clone; clones share the signed-in token.
#[derive(Debug, Clone)]
pub struct BackendClient {
    pub base_url: String,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
    inner: reqwest::Client,
}

impl BackendClient {
    pub fn new(cfg: &BackendConfig, http: &HttpConfig) -> Result<Self, StoreError> {
        let inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(http.connect_timeout_ms))
            .timeout(Duration::from_millis(http.request_timeout_ms))
            .build()?;
        Ok(Self {
            base_url: cfg.url.trim_end_matches('/').to_string(),
            anon_key: cfg.anon_key.clone(),
            access_token: Arc::new(RwLock::new(None)),
            inner,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.anon_key.is_empty()
    }

    pub fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut slot) => *slot = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    pub fn access_token(&self) -> Option<String> {
        match self.access_token.read() {
            Ok(t) => t.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, StoreError> {
        if !self.is_configured() {
            return Err(StoreError::NotConfigured);
        }
        let bearer = self.access_token().unwrap_or_else(|| self.anon_key.clone());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key).map_err(|_| StoreError::NotConfigured)?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}"))
                .map_err(|_| StoreError::Unauthenticated)?,
        );
        Ok(headers)
    }

    fn rest(&self, method: Method, table: &str) -> Result<RequestBuilder, StoreError> {
        let url = format!("{}/rest/v1/{table}", self.base_url);
        debug!(%method, %url, "backend request");
        Ok(self.inner.request(method, url).headers(self.headers()?))
    }

    async fn read_body(resp: Response) -> Result<String, StoreError> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::from_response(status, &text));
        }
        Ok(text)
    }

    async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
        let text = Self::read_body(resp).await?;
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&'static str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let resp = self
            .rest(Method::GET, table)?
            .query(&[("select", "*")])
            .query(query)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    /// At most one row; absence is not an error.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&'static str, String)],
    ) -> Result<Option<T>, StoreError> {
        let mut query = query.to_vec();
        query.push(("limit", "1".to_string()));
        let rows: Vec<T> = self.select(table, &query).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<T, StoreError> {
        let resp = self
            .rest(Method::POST, table)?
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let rows: Vec<T> = Self::read_json(resp).await?;
        rows.into_iter().next().ok_or_else(|| {
            StoreError::Decode(serde::de::Error::custom(format!(
                "insert into {table} returned no rows"
            )))
        })
    }

    /// Returns the updated row, or `None` when the filter matched nothing.
    pub async fn update<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        query: &[(&'static str, String)],
        body: &B,
    ) -> Result<Option<T>, StoreError> {
        let resp = self
            .rest(Method::PATCH, table)?
            .header("Prefer", "return=representation")
            .query(query)
            .json(body)
            .send()
            .await?;
        let rows: Vec<T> = Self::read_json(resp).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn update_minimal<B: Serialize + ?Sized>(
        &self,
        table: &str,
        query: &[(&'static str, String)],
        body: &B,
    ) -> Result<(), StoreError> {
        let resp = self
            .rest(Method::PATCH, table)?
            .header("Prefer", "return=minimal")
            .query(query)
            .json(body)
            .send()
            .await?;
        Self::read_body(resp).await.map(|_| ())
    }

    pub async fn delete(
        &self,
        table: &str,
        query: &[(&'static str, String)],
    ) -> Result<(), StoreError> {
        let resp = self.rest(Method::DELETE, table)?.query(query).send().await?;
        Self::read_body(resp).await.map(|_| ())
    }

    pub async fn rpc<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        function: &str,
        args: &B,
    ) -> Result<T, StoreError> {
        let resp = self
            .rest(Method::POST, &format!("rpc/{function}"))?
            .json(args)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    /// RPC whose result is ignored (void functions answer with an empty body).
    pub async fn rpc_void<B: Serialize + ?Sized>(
        &self,
        function: &str,
        args: &B,
    ) -> Result<(), StoreError> {
        let resp = self
            .rest(Method::POST, &format!("rpc/{function}"))?
            .json(args)
            .send()
            .await?;
        Self::read_body(resp).await.map(|_| ())
    }

    pub(crate) async fn auth_post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, StoreError> {
        let url = format!("{}/auth/v1/{path}", self.base_url);
        debug!(%url, "auth request");
        let resp = self
            .inner
            .post(url)
            .headers(self.headers()?)
            .query(query)
            .json(body)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    pub(crate) async fn auth_post_empty(&self, path: &str) -> Result<(), StoreError> {
        let url = format!("{}/auth/v1/{path}", self.base_url);
        let resp = self.inner.post(url).headers(self.headers()?).send().await?;
        Self::read_body(resp).await.map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn client_for(server: &httptest::Server) -> BackendClient {
        let cfg = BackendConfig {
            url: server.url_str(""),
            anon_key: "anon-key".to_string(),
            email_domain: "chambers.local".to_string(),
        };
        BackendClient::new(&cfg, &HttpConfig::default()).unwrap()
    }
}
