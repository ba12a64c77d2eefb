use chrono::{TimeZone, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

fn deserialize_rfc3339<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct RfcVisitor;

    impl<'de> Visitor<'de> for RfcVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(
                formatter,
                "an RFC3339 timestamp string or integer seconds since epoch"
            )
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let dt = Utc
                .timestamp_opt(value, 0)
                .single()
                .ok_or_else(|| E::custom("invalid timestamp"))?;
            Ok(dt.to_rfc3339())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            self.visit_i64(value as i64)
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(RfcVisitor)
}

/// Signed-in user as returned by the hosted auth service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Seconds since epoch, when the backend reports it.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl AuthSession {
    pub fn username(&self) -> Option<&str> {
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
    }
}

/// Client-side state that survives between runs. Never uploaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionData {
    #[serde(default)]
    pub completion_api_key: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthSession>,
    /// Last updated timestamp (RFC3339 string)
    #[serde(default, deserialize_with = "deserialize_rfc3339")]
    pub updated_at: String,
}

impl SessionData {
    fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.completion_api_key = if key.trim().is_empty() {
            None
        } else {
            Some(key.trim().to_string())
        };
        self.touch();
    }

    pub fn clear_api_key(&mut self) {
        self.completion_api_key = None;
        self.touch();
    }

    pub fn set_auth(&mut self, auth: AuthSession) {
        self.auth = Some(auth);
        self.touch();
    }

    pub fn clear_auth(&mut self) {
        self.auth = None;
        self.touch();
    }

    /// Nothing worth keeping on disk.
    pub fn is_empty(&self) -> bool {
        self.completion_api_key.is_none() && self.auth.is_none()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.access_token.as_str())
    }
}
