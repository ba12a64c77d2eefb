use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::session::AuthSession;
use crate::store::client::BackendClient;
use crate::store::error::StoreError;
use crate::validation::validate_credentials;

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

/// Username/password auth. Usernames are mapped onto e-mail addresses under a
/// fixed domain.
#[derive(Debug, Clone)]
pub struct AuthApi {
    client: BackendClient,
    email_domain: String,
}

impl AuthApi {
    pub fn new(client: BackendClient, email_domain: impl Into<String>) -> Self {
        Self {
            client,
            email_domain: email_domain.into(),
        }
    }

    pub fn email_for(&self, username: &str) -> String {
        format!("{}@{}", username.trim(), self.email_domain)
    }

    /// On success the client starts sending the user's token.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<AuthSession, StoreError> {
        validate_credentials(username, password, None)?;
        let email = self.email_for(username);
        let token: TokenResponse = self
            .client
            .auth_post(
                "token",
                &[("grant_type", "password")],
                &Credentials {
                    email: &email,
                    password,
                },
            )
            .await?;
        let session = AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user_id: token.user.id,
            email: token.user.email.or(Some(email)),
            expires_at: token.expires_at,
        };
        self.client.set_access_token(Some(session.access_token.clone()));
        info!(user_id=%session.user_id, "signed in");
        Ok(session)
    }

    pub async fn sign_up(
        &self,
        username: &str,
        password: &str,
        confirm: &str,
    ) -> Result<AuthSession, StoreError> {
        validate_credentials(username, password, Some(confirm))?;
        let email = self.email_for(username);
        let _: serde_json::Value = self
            .client
            .auth_post(
                "signup",
                &[],
                &Credentials {
                    email: &email,
                    password,
                },
            )
            .await?;
        info!(%email, "account created");
        self.sign_in(username, password).await
    }

    /// Best effort: the local session is dropped even if the backend call fails.
    pub async fn sign_out(&self) {
        if self.client.access_token().is_none() {
            return;
        }
        if let Err(e) = self.client.auth_post_empty("logout").await {
            warn!(err=%e, "sign-out request failed");
        }
        self.client.set_access_token(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::client::test_support::client_for;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;

    fn token_body() -> serde_json::Value {
        json!({
            "access_token": "jwt-1",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "refresh_token": "r-1",
            "user": {"id": "user-1", "email": "ada@chambers.local"}
        })
    }

    #[tokio::test]
    async fn sign_in_maps_username_to_email() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/auth/v1/token"),
                request::query(url_decoded(contains(("grant_type", "password")))),
                request::body(json_decoded(|v: &serde_json::Value| {
                    v["email"] == "ada@chambers.local" && v["password"] == "secret1"
                })),
            ])
            .respond_with(json_encoded(token_body())),
        );
        let client = client_for(&server);
        let auth = AuthApi::new(client.clone(), "chambers.local");
        let session = auth.sign_in("ada", "secret1").await.unwrap();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.username(), Some("ada"));
        assert_eq!(client.access_token().as_deref(), Some("jwt-1"));
    }

    #[tokio::test]
    async fn sign_up_then_signs_in() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/auth/v1/signup"))
                .respond_with(json_encoded(json!({"id": "user-1"}))),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/auth/v1/token"))
                .respond_with(json_encoded(token_body())),
        );
        let auth = AuthApi::new(client_for(&server), "chambers.local");
        let session = auth.sign_up("ada", "secret1", "secret1").await.unwrap();
        assert_eq!(session.access_token, "jwt-1");
    }

    #[tokio::test]
    async fn bad_credentials_fail_before_network() {
        let server = Server::run();
        let auth = AuthApi::new(client_for(&server), "chambers.local");
        let err = auth.sign_up("ada", "secret1", "secret2").await.unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        let err = auth.sign_in("not valid", "secret1").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn rejected_login_surfaces_message() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/auth/v1/token")).respond_with(
                status_code(400).body(
                    r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
                ),
            ),
        );
        let auth = AuthApi::new(client_for(&server), "chambers.local");
        let err = auth.sign_in("ada", "wrongpw").await.unwrap_err();
        assert!(err.to_string().contains("Invalid login credentials"));
    }
}
