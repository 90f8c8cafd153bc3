//! Gated dashboard pages.
//!
//! Every page resolves the session first and either redirects (terminal, no
//! further work for the request) or renders its view model as JSON. The
//! meetings page additionally prefetches the listing for the filters found in
//! the URL, through the shared query cache.

use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use consilio_core::gate::{self, GateDecision, PageKind};
use consilio_core::models::{Session, SessionUser};
use consilio_core::{CacheStatus, FilterState, SocialProvider};
use serde::Serialize;

use crate::error::AppError;
use crate::http::AppState;

/// Outcome of a page request.
#[derive(Debug)]
pub enum PageResponse {
    Redirect(String),
    View(serde_json::Value),
}

impl PageResponse {
    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            PageResponse::Redirect(to) => Some(to),
            PageResponse::View(_) => None,
        }
    }

    pub fn view(&self) -> Option<&serde_json::Value> {
        match self {
            PageResponse::View(v) => Some(v),
            PageResponse::Redirect(_) => None,
        }
    }
}

impl IntoResponse for PageResponse {
    fn into_response(self) -> Response {
        match self {
            PageResponse::Redirect(to) => Redirect::temporary(&to).into_response(),
            PageResponse::View(body) => (StatusCode::OK, Json(body)).into_response(),
        }
    }
}

#[derive(Debug, Serialize)]
struct UserView<'a> {
    name: &'a str,
    email: &'a str,
    image: Option<&'a str>,
}

impl<'a> From<&'a SessionUser> for UserView<'a> {
    fn from(user: &'a SessionUser) -> Self {
        Self {
            name: &user.name,
            email: &user.email,
            image: user.image.as_deref(),
        }
    }
}

/// Run the gate for an auth page. `Ok(None)` means render.
async fn gate_auth_page(state: &AppState, headers: &HeaderMap) -> Result<Option<PageResponse>, AppError> {
    match gate::evaluate(state.auth.as_ref(), headers, PageKind::Auth, &state.config.routes).await? {
        GateDecision::Redirect(to) => Ok(Some(PageResponse::Redirect(to))),
        GateDecision::Render(_) => Ok(None),
    }
}

/// Run the gate for a protected page, yielding the session on admission.
async fn gate_protected_page(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Result<Session, PageResponse>, AppError> {
    let decision =
        gate::evaluate(state.auth.as_ref(), headers, PageKind::Protected, &state.config.routes).await?;
    Ok(match decision {
        GateDecision::Render(Some(session)) => Ok(session),
        GateDecision::Render(None) => Err(PageResponse::Redirect(state.config.routes.sign_in.clone())),
        GateDecision::Redirect(to) => Err(PageResponse::Redirect(to)),
    })
}

fn social_providers() -> Vec<&'static str> {
    [SocialProvider::Google, SocialProvider::Github]
        .iter()
        .map(SocialProvider::as_str)
        .collect()
}

pub async fn sign_in_inner(state: &AppState, headers: &HeaderMap) -> Result<PageResponse, AppError> {
    if let Some(redirect) = gate_auth_page(state, headers).await? {
        return Ok(redirect);
    }
    Ok(PageResponse::View(serde_json::json!({
        "page": "sign-in",
        "title": "Welcome Back",
        "action": "/api/auth/sign-in",
        "socialProviders": social_providers(),
        "alternate": { "label": "Sign Up", "href": state.config.routes.sign_up },
    })))
}

pub async fn sign_up_inner(state: &AppState, headers: &HeaderMap) -> Result<PageResponse, AppError> {
    if let Some(redirect) = gate_auth_page(state, headers).await? {
        return Ok(redirect);
    }
    Ok(PageResponse::View(serde_json::json!({
        "page": "sign-up",
        "title": "Let's get started",
        "action": "/api/auth/sign-up",
        "socialProviders": social_providers(),
        "alternate": { "label": "Sign In", "href": state.config.routes.sign_in },
    })))
}

pub async fn home_inner(state: &AppState, headers: &HeaderMap) -> Result<PageResponse, AppError> {
    let session = match gate_protected_page(state, headers).await? {
        Ok(session) => session,
        Err(redirect) => return Ok(redirect),
    };
    Ok(PageResponse::View(serde_json::json!({
        "page": "home",
        "user": UserView::from(&session.user),
        "signOut": "/api/auth/sign-out",
    })))
}

pub async fn meetings_inner(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<PageResponse, AppError> {
    let session = match gate_protected_page(state, headers).await? {
        Ok(session) => session,
        Err(redirect) => return Ok(redirect),
    };

    let filters = FilterState::parse(query.unwrap_or_default());
    let page_size = state.config.listing.effective_page_size();
    let user_id = session.user_id();

    let listing = match state
        .cache
        .get_or_fetch(user_id, &filters, || {
            state.store.list_meetings(user_id, &filters, page_size)
        })
        .await
    {
        Ok((page, cache)) => serde_json::json!({
            "state": "ready",
            "cache": match cache {
                CacheStatus::Hit => "hit",
                CacheStatus::Miss => "miss",
            },
            "data": page,
        }),
        Err(e) => {
            tracing::error!(error = %e, user_id, "Meetings prefetch failed");
            serde_json::json!({
                "state": "error",
                "message": "Error loading meetings",
            })
        }
    };

    Ok(PageResponse::View(serde_json::json!({
        "page": "meetings",
        "user": UserView::from(&session.user),
        "filters": filters,
        "query": filters.serialize(),
        "isFilterModified": filters.is_modified(),
        "clearHref": "/meetings",
        "listing": listing,
    })))
}

pub async fn agents_inner(state: &AppState, headers: &HeaderMap) -> Result<PageResponse, AppError> {
    let session = match gate_protected_page(state, headers).await? {
        Ok(session) => session,
        Err(redirect) => return Ok(redirect),
    };
    let agents = state.store.list_agents(session.user_id()).await?;
    Ok(PageResponse::View(serde_json::json!({
        "page": "agents",
        "user": UserView::from(&session.user),
        "agents": agents,
    })))
}

pub async fn sign_in_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<PageResponse, AppError> {
    sign_in_inner(&state, &headers).await
}

pub async fn sign_up_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<PageResponse, AppError> {
    sign_up_inner(&state, &headers).await
}

pub async fn home_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<PageResponse, AppError> {
    home_inner(&state, &headers).await
}

pub async fn meetings_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<PageResponse, AppError> {
    meetings_inner(&state, &headers, query.as_deref()).await
}

pub async fn agents_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<PageResponse, AppError> {
    agents_inner(&state, &headers).await
}
