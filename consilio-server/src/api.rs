//! JSON actions behind the dashboard forms.
//!
//! Auth actions validate their form, then drive a [`FormMachine`] through the
//! auth service call. The reply carries the settled form state (`success` or
//! `error` with a user-facing message) and relays the service's `Set-Cookie`
//! headers. List-data actions require a session and are scoped to its user.

use std::fmt;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, RawQuery, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use consilio_core::auth::AuthOutcome;
use consilio_core::models::{Agent, Meeting, Page, Session};
use consilio_core::schema::{
    AgentForm, AgentUpdateForm, MeetingForm, MeetingUpdateForm, SignInForm, SignUpForm,
};
use consilio_core::{AuthError, CacheStatus, FilterState, FormMachine, Schema, SocialProvider};
use serde::Deserialize;

use crate::error::AppError;
use crate::http::AppState;

/// Auth error as the user should read it.
#[derive(Debug)]
struct UserFacing(AuthError);

impl fmt::Display for UserFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.user_message())
    }
}

/// Settled auth form.
#[derive(Debug)]
pub struct AuthReply {
    pub status: StatusCode,
    pub body: serde_json::Value,
    pub set_cookies: Vec<String>,
}

impl IntoResponse for AuthReply {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        for cookie in &self.set_cookies {
            match HeaderValue::from_str(cookie) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(error = %e, "Dropping unrepresentable Set-Cookie"),
            }
        }
        (self.status, headers, Json(self.body)).into_response()
    }
}

fn reply_status(error: &AuthError) -> StatusCode {
    match error {
        AuthError::Rejected { status, .. } => StatusCode::from_u16(*status)
            .ok()
            .filter(StatusCode::is_client_error)
            .unwrap_or(StatusCode::BAD_GATEWAY),
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Run `action` through a fresh form machine and shape the reply.
/// `redirect` is used when the outcome names no destination of its own.
async fn settle<Fut>(action: Fut, redirect: &str) -> Result<AuthReply, AppError>
where
    Fut: std::future::Future<Output = Result<AuthOutcome, AuthError>>,
{
    let mut form = FormMachine::new();
    let outcome = form
        .run(async { action.await.map_err(UserFacing) })
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let state = serde_json::to_value(form.state()).unwrap_or_default();

    Ok(match outcome {
        Ok(outcome) => {
            let mut body = state;
            body["redirect"] = serde_json::Value::String(
                outcome.redirect_url.unwrap_or_else(|| redirect.to_string()),
            );
            AuthReply {
                status: StatusCode::OK,
                body,
                set_cookies: outcome.set_cookies,
            }
        }
        Err(UserFacing(e)) => AuthReply {
            status: reply_status(&e),
            body: state,
            set_cookies: Vec::new(),
        },
    })
}

pub async fn sign_in_inner(state: &AppState, form: SignInForm) -> Result<AuthReply, AppError> {
    let credentials = form.validate()?;
    settle(
        state.auth.sign_in_email(&credentials),
        &state.config.routes.after_sign_in,
    )
    .await
}

pub async fn sign_up_inner(state: &AppState, form: SignUpForm) -> Result<AuthReply, AppError> {
    let account = form.validate()?;
    settle(
        state.auth.sign_up_email(&account),
        &state.config.routes.after_sign_in,
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct SocialRequest {
    pub provider: String,
}

pub async fn social_inner(state: &AppState, request: SocialRequest) -> Result<AuthReply, AppError> {
    let provider: SocialProvider = request.provider.parse().map_err(AppError::BadRequest)?;
    settle(
        state
            .auth
            .sign_in_social(provider, &state.config.auth.social_callback_url),
        &state.config.routes.after_sign_in,
    )
    .await
}

pub async fn sign_out_inner(state: &AppState, headers: &HeaderMap) -> Result<AuthReply, AppError> {
    settle(state.auth.sign_out(headers), &state.config.routes.sign_in).await
}

/// Resolve the caller's session; no session is a 401.
pub async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Session, AppError> {
    state
        .auth
        .get_session(headers)
        .await?
        .ok_or(AppError::Unauthorized)
}

pub async fn list_meetings_inner(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<(Page<Meeting>, CacheStatus), AppError> {
    let session = require_session(state, headers).await?;
    let filters = FilterState::parse(query.unwrap_or_default());
    let page_size = state.config.listing.effective_page_size();
    let user_id = session.user_id();

    let listing = state
        .cache
        .get_or_fetch(user_id, &filters, || {
            state.store.list_meetings(user_id, &filters, page_size)
        })
        .await?;
    Ok(listing)
}

pub async fn create_meeting_inner(
    state: &AppState,
    headers: &HeaderMap,
    form: MeetingForm,
) -> Result<Meeting, AppError> {
    let session = require_session(state, headers).await?;
    let meeting = form.validate()?;
    let created = state.store.create_meeting(session.user_id(), meeting).await?;
    state.cache.invalidate_user(session.user_id());
    tracing::info!(meeting_id = %created.id, user_id = session.user_id(), "Meeting created");
    Ok(created)
}

/// The path id is authoritative over any id in the body.
pub async fn update_meeting_inner(
    state: &AppState,
    headers: &HeaderMap,
    id: String,
    mut form: MeetingUpdateForm,
) -> Result<Meeting, AppError> {
    let session = require_session(state, headers).await?;
    form.id = id;
    let update = form.validate()?;
    let updated = state.store.update_meeting(session.user_id(), update).await?;
    state.cache.invalidate_user(session.user_id());
    tracing::info!(meeting_id = %updated.id, user_id = session.user_id(), "Meeting updated");
    Ok(updated)
}

pub async fn list_agents_inner(state: &AppState, headers: &HeaderMap) -> Result<Vec<Agent>, AppError> {
    let session = require_session(state, headers).await?;
    Ok(state.store.list_agents(session.user_id()).await?)
}

pub async fn create_agent_inner(
    state: &AppState,
    headers: &HeaderMap,
    form: AgentForm,
) -> Result<Agent, AppError> {
    let session = require_session(state, headers).await?;
    let agent = form.validate()?;
    let created = state.store.create_agent(session.user_id(), agent).await?;
    tracing::info!(agent_id = %created.id, user_id = session.user_id(), "Agent created");
    Ok(created)
}

pub async fn update_agent_inner(
    state: &AppState,
    headers: &HeaderMap,
    id: String,
    mut form: AgentUpdateForm,
) -> Result<Agent, AppError> {
    let session = require_session(state, headers).await?;
    form.id = id;
    let update = form.validate()?;
    Ok(state.store.update_agent(session.user_id(), update).await?)
}

pub async fn sign_in_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignInForm>, JsonRejection>,
) -> Result<AuthReply, AppError> {
    let Json(form) = payload?;
    sign_in_inner(&state, form).await
}

pub async fn sign_up_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignUpForm>, JsonRejection>,
) -> Result<AuthReply, AppError> {
    let Json(form) = payload?;
    sign_up_inner(&state, form).await
}

pub async fn social_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SocialRequest>, JsonRejection>,
) -> Result<AuthReply, AppError> {
    let Json(request) = payload?;
    social_inner(&state, request).await
}

pub async fn sign_out_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<AuthReply, AppError> {
    sign_out_inner(&state, &headers).await
}

pub async fn list_meetings_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, AppError> {
    let (page, cache) = list_meetings_inner(&state, &headers, query.as_deref()).await?;
    let cache = match cache {
        CacheStatus::Hit => "hit",
        CacheStatus::Miss => "miss",
    };
    Ok(([("x-cache", cache)], Json(page)))
}

pub async fn create_meeting_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<MeetingForm>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(form) = payload?;
    let meeting = create_meeting_inner(&state, &headers, form).await?;
    Ok((StatusCode::CREATED, Json(meeting)))
}

pub async fn update_meeting_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<MeetingUpdateForm>, JsonRejection>,
) -> Result<Json<Meeting>, AppError> {
    let Json(form) = payload?;
    Ok(Json(update_meeting_inner(&state, &headers, id, form).await?))
}

pub async fn list_agents_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Agent>>, AppError> {
    Ok(Json(list_agents_inner(&state, &headers).await?))
}

pub async fn create_agent_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AgentForm>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(form) = payload?;
    let agent = create_agent_inner(&state, &headers, form).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn update_agent_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<AgentUpdateForm>, JsonRejection>,
) -> Result<Json<Agent>, AppError> {
    let Json(form) = payload?;
    Ok(Json(update_agent_inner(&state, &headers, id, form).await?))
}
