//! Manual view override endpoints
//!
//! Lets users pick the mobile or standard view explicitly, overriding device
//! detection for the rest of the session.
//!
//! # Endpoints
//!
//! - `GET /view` - current view and preference
//! - `POST /view/mobile` - choose the mobile view
//! - `POST /view/standard` - choose the standard view
//! - `DELETE /view` - forget the choice and fall back to detection
//!
//! Mount these under [`MobileViewLayer`](crate::layer::MobileViewLayer) with
//! the same [`MobileViewState`] so the choice lands in the store the
//! negotiator reads.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::context::ViewContext;
use crate::error::MobileViewError;
use crate::format::Format;
use crate::layer::MobileViewState;
use crate::negotiate::negotiate;
use crate::session::{SessionId, ViewPreference};

/// Body returned by every view endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewStatus {
    /// Format of this request; for overrides, the format the new preference
    /// gives the next page view
    pub format: Option<String>,
    /// Stored session preference
    pub preference: ViewPreference,
    /// Device classification after exclusions
    pub mobile_device: bool,
    /// Raw device label from the upstream detector
    pub device: Option<String>,
}

impl ViewStatus {
    fn new(view: &ViewContext, format: Option<&Format>, preference: ViewPreference) -> Self {
        Self {
            format: format.map(|f| f.as_str().to_string()),
            preference,
            mobile_device: view.is_mobile_device(),
            device: view.mobile_device().map(str::to_string),
        }
    }
}

/// Report the current view
#[instrument(skip_all)]
pub async fn view_status(view: ViewContext) -> Json<ViewStatus> {
    Json(ViewStatus::new(&view, view.format(), view.preference()))
}

/// Choose the mobile view for this session
pub async fn choose_mobile(
    State(state): State<Arc<MobileViewState>>,
    view: ViewContext,
    headers: HeaderMap,
) -> Result<Response, MobileViewError> {
    choose(&state, &view, &headers, ViewPreference::MobileView).await
}

/// Choose the standard view for this session
pub async fn choose_standard(
    State(state): State<Arc<MobileViewState>>,
    view: ViewContext,
    headers: HeaderMap,
) -> Result<Response, MobileViewError> {
    choose(&state, &view, &headers, ViewPreference::StandardView).await
}

/// Forget the stored choice
#[instrument(skip_all)]
pub async fn clear_view(
    State(state): State<Arc<MobileViewState>>,
    view: ViewContext,
    headers: HeaderMap,
) -> Result<Json<ViewStatus>, MobileViewError> {
    if let Some(session) = current_session(&state, &view, &headers) {
        state.store().clear(&session).await?;
        info!(session = %session, "View preference cleared");
    }

    let format = implied_format(&state, &view, ViewPreference::Unset);
    Ok(Json(ViewStatus::new(&view, format.as_ref(), ViewPreference::Unset)))
}

#[instrument(skip_all, fields(preference = %preference))]
async fn choose(
    state: &MobileViewState,
    view: &ViewContext,
    headers: &HeaderMap,
    preference: ViewPreference,
) -> Result<Response, MobileViewError> {
    // Only ids the store already holds are reused
    let mut known = current_session(state, view, headers);
    if let Some(session) = &known {
        if !state.store().get(session).await?.is_set() {
            known = None;
        }
    }
    let (session, fresh) = match known {
        Some(session) => (session, false),
        None => (SessionId::generate(), true),
    };

    state.store().set(&session, preference).await?;
    info!(session = %session, "View preference chosen");

    let format = implied_format(state, view, preference);
    let mut response = Json(ViewStatus::new(view, format.as_ref(), preference)).into_response();
    if fresh {
        if let Some(cookie) = state.session_cookie(&session) {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
    }
    Ok(response)
}

/// Format the next non-XHR page view gets under `preference`
fn implied_format(
    state: &MobileViewState,
    view: &ViewContext,
    preference: ViewPreference,
) -> Option<Format> {
    if !state.config().set_request_format {
        return None;
    }
    negotiate(
        false,
        view.is_mobile_device(),
        preference,
        &state.config().negotiation_options(),
    )
    .format
}

/// Session from the layer's context, falling back to the cookie
fn current_session(
    state: &MobileViewState,
    view: &ViewContext,
    headers: &HeaderMap,
) -> Option<SessionId> {
    view.session()
        .cloned()
        .or_else(|| state.session_id(headers))
}

// ============================================================================
// Router Configuration
// ============================================================================

/// Create the view override router
pub fn view_router(state: Arc<MobileViewState>) -> Router {
    Router::new()
        .route("/view", get(view_status).delete(clear_view))
        .route("/view/mobile", post(choose_mobile))
        .route("/view/standard", post(choose_standard))
        .with_state(state)
}
