//! In-process fakes for handler tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use consilio_core::auth::{AuthOutcome, EmailCredentials, NewAccount};
use consilio_core::config::{AuthConfig, DatabaseConfig, ServiceConfig, StoreBackend};
use consilio_core::models::{Session, SessionRecord, SessionUser};
use consilio_core::{AuthBackend, AuthError, ConsilioConfig, MemoryStore, SocialProvider};

use crate::http::AppState;

/// The only password [`StubAuth`] accepts.
pub const GOOD_PASSWORD: &str = "correct horse";

#[derive(Debug, Clone)]
enum Mode {
    SignedIn(String),
    SignedOut,
    Unavailable,
}

/// Auth service double with a fixed session and a call counter.
#[derive(Debug, Clone)]
pub struct StubAuth {
    mode: Mode,
    calls: Arc<AtomicUsize>,
}

impl StubAuth {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn signed_in(user_id: &str) -> Self {
        Self::with_mode(Mode::SignedIn(user_id.to_string()))
    }

    pub fn signed_out() -> Self {
        Self::with_mode(Mode::SignedOut)
    }

    pub fn unavailable() -> Self {
        Self::with_mode(Mode::Unavailable)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Unavailable => Err(AuthError::InvalidResponse("stub is down".to_string())),
            _ => Ok(()),
        }
    }

    fn cookie_outcome() -> AuthOutcome {
        AuthOutcome {
            set_cookies: vec!["better-auth.session_token=stub; Path=/; HttpOnly".to_string()],
            redirect_url: None,
        }
    }
}

fn session_for(user_id: &str) -> Session {
    Session {
        session: SessionRecord {
            id: format!("sess-{}", user_id),
            user_id: user_id.to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        },
        user: SessionUser {
            id: user_id.to_string(),
            name: format!("User {}", user_id),
            email: format!("{}@example.com", user_id),
            email_verified: true,
            image: None,
        },
    }
}

#[async_trait]
impl AuthBackend for StubAuth {
    async fn get_session(&self, _headers: &HeaderMap) -> Result<Option<Session>, AuthError> {
        self.enter()?;
        Ok(match &self.mode {
            Mode::SignedIn(user_id) => Some(session_for(user_id)),
            _ => None,
        })
    }

    async fn sign_in_email(&self, credentials: &EmailCredentials) -> Result<AuthOutcome, AuthError> {
        self.enter()?;
        if credentials.password == GOOD_PASSWORD {
            Ok(Self::cookie_outcome())
        } else {
            Err(AuthError::Rejected {
                status: 401,
                message: "Invalid email or password".to_string(),
            })
        }
    }

    async fn sign_in_social(
        &self,
        provider: SocialProvider,
        _callback_url: &str,
    ) -> Result<AuthOutcome, AuthError> {
        self.enter()?;
        Ok(AuthOutcome {
            set_cookies: Vec::new(),
            redirect_url: Some(format!("https://{}.example/authorize", provider)),
        })
    }

    async fn sign_up_email(&self, _account: &NewAccount) -> Result<AuthOutcome, AuthError> {
        self.enter()?;
        Ok(Self::cookie_outcome())
    }

    async fn sign_out(&self, _headers: &HeaderMap) -> Result<AuthOutcome, AuthError> {
        self.enter()?;
        Ok(AuthOutcome {
            set_cookies: vec!["better-auth.session_token=; Max-Age=0; Path=/".to_string()],
            redirect_url: None,
        })
    }
}

pub fn test_config() -> ConsilioConfig {
    ConsilioConfig {
        service: ServiceConfig {
            name: "consilio-test".to_string(),
            log_level: "debug".to_string(),
        },
        database: DatabaseConfig {
            backend: StoreBackend::Memory,
            ..DatabaseConfig::default()
        },
        auth: AuthConfig {
            base_url: "http://auth.invalid".to_string(),
            timeout_seconds: 1,
            social_callback_url: "/".to_string(),
        },
        routes: Default::default(),
        listing: Default::default(),
        http: Default::default(),
    }
}

pub fn test_state(auth: StubAuth, store: MemoryStore) -> Arc<AppState> {
    Arc::new(AppState::new(
        test_config(),
        Arc::new(auth),
        Arc::new(store),
        None,
    ))
}
