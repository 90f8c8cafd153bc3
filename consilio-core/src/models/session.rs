use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session as returned by the auth service's `get-session` endpoint.
///
/// Owned entirely by the auth service. This crate only reads it, once per
/// request, and never caches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session: SessionRecord,
    pub user: SessionUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub image: Option<String>,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}
