//! Session gate: decides, per page visit, whether the visitor may proceed.
//!
//! The decision is a pure function of the page kind and the resolved session.
//! Resolution always goes to the auth service; nothing is cached between
//! requests. A resolution failure is returned as an error and the caller must
//! not render anything for that request.

use reqwest::header::HeaderMap;

use crate::auth::{AuthBackend, AuthError};
use crate::config::RoutesConfig;
use crate::models::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Sign-in and sign-up: only for visitors without a session.
    Auth,
    /// Everything behind the dashboard: requires a session.
    Protected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Render the page. Protected pages always carry the session.
    Render(Option<Session>),
    /// Stop processing and send the visitor elsewhere.
    Redirect(String),
}

impl GateDecision {
    pub fn is_redirect(&self) -> bool {
        matches!(self, GateDecision::Redirect(_))
    }
}

pub fn decide(kind: PageKind, session: Option<Session>, routes: &RoutesConfig) -> GateDecision {
    match (kind, session) {
        (PageKind::Auth, Some(_)) => GateDecision::Redirect(routes.landing.clone()),
        (PageKind::Auth, None) => GateDecision::Render(None),
        (PageKind::Protected, None) => GateDecision::Redirect(routes.sign_in.clone()),
        (PageKind::Protected, Some(session)) => GateDecision::Render(Some(session)),
    }
}

/// Resolve the session for `headers` and decide.
pub async fn evaluate(
    auth: &dyn AuthBackend,
    headers: &HeaderMap,
    kind: PageKind,
    routes: &RoutesConfig,
) -> Result<GateDecision, AuthError> {
    let session = auth.get_session(headers).await.map_err(|e| {
        tracing::error!(error = %e, ?kind, "Session resolution failed");
        e
    })?;
    let decision = decide(kind, session, routes);
    if let GateDecision::Redirect(to) = &decision {
        tracing::debug!(?kind, to = %to, "Gate redirect");
    }
    Ok(decision)
}
