//! Client for the external authentication service.
//!
//! Every credential, cookie and session lives in the auth service; this
//! module only forwards the browser's cookies and relays outcomes. Calls are
//! never retried: a failed sign-in is surfaced to the user, who resubmits.
//!
//! Endpoints (relative to `{base_url}/api/auth`):
//! - `GET  /get-session`
//! - `POST /sign-in/email`
//! - `POST /sign-in/social`
//! - `POST /sign-up/email`
//! - `POST /sign-out`

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::models::Session;

/// Fallback shown when the auth service gives no message of its own.
pub const GENERIC_AUTH_ERROR: &str = "Something went wrong";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("auth service unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("invalid auth service response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// Human-readable message for the user.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Rejected { message, .. } => message.clone(),
            _ => GENERIC_AUTH_ERROR.to_string(),
        }
    }
}

/// Supported social sign-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialProvider {
    Github,
    Google,
}

impl SocialProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialProvider::Github => "github",
            SocialProvider::Google => "google",
        }
    }
}

impl fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocialProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(SocialProvider::Github),
            "google" => Ok(SocialProvider::Google),
            other => Err(format!("unsupported provider: {}", other)),
        }
    }
}

/// Validated email/password sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailCredentials {
    pub email: String,
    pub password: String,
}

/// Validated sign-up request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// What the browser needs after a successful auth action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthOutcome {
    /// `Set-Cookie` values to relay to the browser.
    pub set_cookies: Vec<String>,
    /// Where to send the browser next (social sign-in only).
    pub redirect_url: Option<String>,
}

/// The auth service as seen by this application.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Resolve the session for the incoming request's headers.
    /// `Ok(None)` means "not signed in"; `Err` means the service failed.
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, AuthError>;

    async fn sign_in_email(&self, credentials: &EmailCredentials) -> Result<AuthOutcome, AuthError>;

    async fn sign_in_social(
        &self,
        provider: SocialProvider,
        callback_url: &str,
    ) -> Result<AuthOutcome, AuthError>;

    async fn sign_up_email(&self, account: &NewAccount) -> Result<AuthOutcome, AuthError>;

    async fn sign_out(&self, headers: &HeaderMap) -> Result<AuthOutcome, AuthError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SocialRequest<'a> {
    provider: &'a str,
    #[serde(rename = "callbackURL")]
    callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct SocialResponse {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP client for a better-auth compatible service.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    client: Client,
    base_url: String,
}

impl HttpAuthClient {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        Self::with_base_url(config.base_url.clone(), config.timeout_seconds)
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/auth{}", self.base_url, path)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        headers: HeaderMap,
    ) -> Result<Response, AuthError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .headers(headers)
            .json(body)
            .send()
            .await?;
        ensure_success(response).await
    }
}

/// Copy only the headers that identify the browser's session.
pub fn forwarded_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in [COOKIE, AUTHORIZATION] {
        for value in incoming.get_all(&name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

fn collect_set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v: &HeaderValue| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

async fn ensure_success(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| GENERIC_AUTH_ERROR.to_string());

    tracing::warn!(status = status.as_u16(), message = %message, "Auth service rejected request");

    Err(AuthError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl AuthBackend for HttpAuthClient {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, AuthError> {
        let response = self
            .client
            .get(self.endpoint("/get-session"))
            .headers(forwarded_headers(headers))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str::<Option<Session>>(&body)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }

    async fn sign_in_email(&self, credentials: &EmailCredentials) -> Result<AuthOutcome, AuthError> {
        let response = self
            .post_json("/sign-in/email", credentials, HeaderMap::new())
            .await?;
        tracing::info!(email = %credentials.email, "Signed in with email");
        Ok(AuthOutcome {
            set_cookies: collect_set_cookies(response.headers()),
            redirect_url: None,
        })
    }

    async fn sign_in_social(
        &self,
        provider: SocialProvider,
        callback_url: &str,
    ) -> Result<AuthOutcome, AuthError> {
        let request = SocialRequest {
            provider: provider.as_str(),
            callback_url,
        };
        let response = self
            .post_json("/sign-in/social", &request, HeaderMap::new())
            .await?;
        let set_cookies = collect_set_cookies(response.headers());
        let body: SocialResponse = response.json().await?;

        let redirect_url = body
            .url
            .ok_or_else(|| AuthError::InvalidResponse("social sign-in returned no url".to_string()))?;

        Ok(AuthOutcome {
            set_cookies,
            redirect_url: Some(redirect_url),
        })
    }

    async fn sign_up_email(&self, account: &NewAccount) -> Result<AuthOutcome, AuthError> {
        let response = self
            .post_json("/sign-up/email", account, HeaderMap::new())
            .await?;
        tracing::info!(email = %account.email, "Account created");
        Ok(AuthOutcome {
            set_cookies: collect_set_cookies(response.headers()),
            redirect_url: None,
        })
    }

    async fn sign_out(&self, headers: &HeaderMap) -> Result<AuthOutcome, AuthError> {
        let response = self
            .post_json("/sign-out", &serde_json::json!({}), forwarded_headers(headers))
            .await?;
        Ok(AuthOutcome {
            set_cookies: collect_set_cookies(response.headers()),
            redirect_url: None,
        })
    }
}
