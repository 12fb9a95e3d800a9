//! Axum request handlers.

use crate::domain::config::RelayConfig;
use crate::domain::error::RelayError;
use crate::domain::ids::{PendingId, SessionId};
use crate::domain::pending::PendingWait;
use crate::domain::types::{ErrorBody, RedirectNotice, SubmissionReceipt};
use crate::http::pages;
use crate::relay::{OperatorOutcome, OperatorUpdate, RelayCore, SubmitOutcome};
use axum::{
    body::Bytes,
    extract::{
        rejection::{FormRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RelayCore>,
    pub config: Arc<RelayConfig>,
}

/// Query of `GET /set_response`
#[derive(Debug, Default, Deserialize)]
pub struct SetResponseQuery {
    pub pending_id: Option<String>,
    pub return_url: Option<String>,
}

/// Form of `POST /set_response`
#[derive(Debug, Default, Deserialize)]
pub struct SetResponseForm {
    pub new_response: Option<String>,
    pub pending_id: Option<String>,
    pub return_url: Option<String>,
}

/// Session resolved from the request cookie, minted when absent.
struct ClientSession {
    id: SessionId,
    set_cookie: Option<HeaderValue>,
}

impl ClientSession {
    fn resolve(headers: &HeaderMap, cookie_name: &str) -> Self {
        match session_from_cookies(headers, cookie_name) {
            Some(id) => Self {
                id,
                set_cookie: None,
            },
            None => {
                let id = SessionId::new();
                let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", cookie_name, id);
                debug!(session_id = %id, "Minted session");
                Self {
                    id,
                    set_cookie: HeaderValue::from_str(&cookie).ok(),
                }
            }
        }
    }

    fn attach(&self, mut response: Response) -> Response {
        if let Some(cookie) = &self.set_cookie {
            response
                .headers_mut()
                .append(header::SET_COOKIE, cookie.clone());
        }
        response
    }
}

fn session_from_cookies(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .and_then(|(_, value)| SessionId::parse(value).ok())
}

/// Treat blank form and query fields as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_pending_id(raw: Option<String>) -> Result<Option<PendingId>, RelayError> {
    match non_blank(raw) {
        Some(text) => PendingId::parse(&text)
            .map(Some)
            .map_err(|_| RelayError::InvalidPendingIdentifier(text)),
        None => Ok(None),
    }
}

/// Only same-site absolute paths are followed after an update.
fn safe_return_url(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains('\\')
}

fn error_response(state: &AppState, error: &RelayError) -> Response {
    let status = error.status_code();
    if status.is_server_error() {
        warn!(error = %error, "Request rejected");
    } else {
        debug!(error = %error, "Request failed");
    }
    let body = ErrorBody::new(error.to_string(), Some(state.core.response_option()));
    (status, Json(body)).into_response()
}

fn see_other(notice: RedirectNotice) -> Response {
    let location = notice.redirect_url.clone();
    let mut response = (StatusCode::SEE_OTHER, Json(notice)).into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

/// `GET /` - message log page
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(pages::render_messages(&state.core.messages()))
}

/// `POST /send_data` - submit an encrypted message
pub async fn send_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = ClientSession::resolve(&headers, &state.config.session.cookie_name);

    let response = match state.core.submit_body(&body, session.id) {
        Ok(SubmitOutcome::Answered(receipt)) => (StatusCode::OK, Json(receipt)).into_response(),
        Ok(SubmitOutcome::Deferred(id)) => see_other(RedirectNotice::new(
            "Response pending: the operator must set a response option",
            format!("/set_response?pending_id={}", id),
            Some(id),
        )),
        Ok(SubmitOutcome::AwaitingOption) => see_other(RedirectNotice::new(
            "Please set a response option before your message is processed",
            "/set_response?return_url=/",
            None,
        )),
        Err(e) => error_response(&state, &e),
    };

    session.attach(response)
}

/// `GET /set_response` - operator form
pub async fn set_response_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<SetResponseQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return error_response(&state, &RelayError::MalformedPayload(rejection.body_text()))
        }
    };

    let pending_id = match parse_pending_id(query.pending_id) {
        Ok(id) => id,
        Err(e) => return error_response(&state, &e),
    };

    let preview = match pending_id {
        Some(id) => match state.core.pending_preview(&id) {
            Some(preview) => Some(preview),
            None => return error_response(&state, &RelayError::UnknownPendingIdentifier(id)),
        },
        None => session_from_cookies(&headers, &state.config.session.cookie_name)
            .and_then(|session| state.core.session_preview(&session)),
    };

    let return_url = non_blank(query.return_url).filter(|u| safe_return_url(u));
    let pending_text = pending_id.map(|id| id.to_string());

    Html(pages::render_option_form(
        &state.core.response_option(),
        preview.as_ref(),
        pending_text.as_deref(),
        return_url.as_deref(),
    ))
    .into_response()
}

/// `POST /set_response` - update the option and complete whatever waits on it
pub async fn set_response(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<SetResponseForm>, FormRejection>,
) -> Response {
    let session = ClientSession::resolve(&headers, &state.config.session.cookie_name);

    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            let error = RelayError::MalformedPayload(rejection.body_text());
            return session.attach(error_response(&state, &error));
        }
    };

    let pending_id = match parse_pending_id(form.pending_id) {
        Ok(id) => id,
        Err(e) => return session.attach(error_response(&state, &e)),
    };

    let update = OperatorUpdate {
        new_response: form.new_response,
        pending_id,
        session: Some(session.id),
    };

    let response = match state.core.apply_operator_update(update) {
        Ok(OperatorOutcome::Completed(receipt)) => (StatusCode::OK, Json(receipt)).into_response(),
        Ok(OperatorOutcome::Updated) => match non_blank(form.return_url) {
            Some(url) if safe_return_url(&url) => Redirect::to(&url).into_response(),
            Some(url) => {
                warn!(return_url = %url, "Ignoring off-site return URL");
                Html(pages::render_option_updated()).into_response()
            }
            None => Html(pages::render_option_updated()).into_response(),
        },
        Err(e) => error_response(&state, &e),
    };

    session.attach(response)
}

/// `GET /pending/:pending_id` - wait for the operator to complete a submission
pub async fn await_pending(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Response {
    let id = match parse_pending_id(Some(raw_id)) {
        Ok(Some(id)) => id,
        Ok(None) => return error_response(&state, &RelayError::InvalidPendingIdentifier(String::new())),
        Err(e) => return error_response(&state, &e),
    };

    let mut waiter = match state.core.claim_waiter(&id) {
        Ok(PendingWait::Ready(receipt)) => return (StatusCode::OK, Json(receipt)).into_response(),
        Ok(PendingWait::Waiting(waiter)) => waiter,
        Err(e) => return error_response(&state, &e),
    };

    let waited = tokio::time::timeout(state.config.pending.wait_timeout, &mut waiter).await;
    let receipt: Option<SubmissionReceipt> = match waited {
        Ok(Ok(receipt)) => Some(receipt),
        // sender dropped without an answer: the entry expired
        Ok(Err(_)) => None,
        Err(_) => match state.core.restore_waiter(&id, waiter) {
            Ok(()) => {
                return (
                    StatusCode::ACCEPTED,
                    Json(serde_json::json!({
                        "status": "pending",
                        "message": "Waiting for the operator to set a response option",
                        "pending_id": id,
                    })),
                )
                    .into_response();
            }
            Err(mut waiter) => waiter.try_recv().ok(),
        },
    };

    match receipt {
        Some(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        None => error_response(&state, &RelayError::UnknownPendingIdentifier(id)),
    }
}

/// `GET /admin/pending` - pending registry counters
pub async fn pending_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.core.pending_snapshot())
}

/// `GET /health`
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "cipher-relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
