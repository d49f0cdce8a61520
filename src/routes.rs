use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error};

use crate::config::Config;
use crate::controller::{Controller, ControllerOptions};
use crate::feed::{encode_uri_component, FeedSource};
use crate::live::{self, SessionStore};
use crate::render::Renderer;
use crate::router::landing_submission;
use crate::state::Viewport;

pub struct AppState {
    pub feeds: Arc<dyn FeedSource>,
    pub config: Arc<Config>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(feeds: Arc<dyn FeedSource>, config: Config) -> Self {
        Self {
            feeds,
            sessions: SessionStore::new(config.live_sessions),
            config: Arc::new(config),
        }
    }

    fn controller(&self, renderer: Renderer, width: Option<u32>) -> Controller {
        let options = ControllerOptions {
            viewport: viewport_for(width),
            ..ControllerOptions::from(self.config.as_ref())
        };
        Controller::new(self.feeds.clone(), renderer, options)
    }
}

/// What the page script forwards: the fragment to show and the window width.
/// `username` comes from the landing form.
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub fragment: String,
    pub width: Option<u32>,
    pub username: Option<String>,
}

/// Where a page's live socket picks up from.
#[derive(Debug, Default, Deserialize)]
pub struct LiveQuery {
    /// Token of the page's settled view
    #[serde(default)]
    pub session: String,
    /// Fragment to start from when the view is gone
    #[serde(default)]
    pub fragment: String,
    pub width: Option<u32>,
}

fn viewport_for(width: Option<u32>) -> Viewport {
    width
        .filter(|width| *width > 0)
        .map(Viewport::new)
        .unwrap_or_default()
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

/// Render the page for a fragment once its feed has settled. The settled view
/// is kept for the page's live socket.
pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Result<Response, AppError> {
    if let Some(input) = query.username.as_deref() {
        return Ok(submit(input).into_response());
    }

    let token = state.sessions.issue().await;
    let renderer = Renderer::system().with_session(token.clone());
    let mut controller = state.controller(renderer, query.width);

    controller.start(&query.fragment);
    controller.settle().await;
    let frame = controller.render()?;
    let view = controller.state().clone();
    state.sessions.put(token, view).await;

    Ok(Html(frame.html).into_response())
}

/// The controller a page's live socket drives: the page's own settled view
/// when it is still held, otherwise a fresh start on the fragment.
pub async fn live_controller(state: &AppState, query: &LiveQuery) -> Controller {
    let mut controller = state.controller(Renderer::system(), query.width);
    match state.sessions.take(&query.session).await {
        Some(view) => controller.resume(view),
        None => {
            debug!("No held view for session {:?}, starting over", query.session);
            controller.start(&query.fragment);
        }
    }
    controller
}

pub async fn live_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<LiveQuery>,
) -> Response {
    let controller = live_controller(&state, &query).await;
    ws.on_upgrade(move |socket| live::attach(controller, socket))
}

// Landing form: blank input stays on the landing page.
fn submit(input: &str) -> Redirect {
    match landing_submission(input) {
        Some(route) => {
            debug!("Landing submission for {:?}", route);
            Redirect::to(&format!(
                "/?fragment={}",
                encode_uri_component(&route.fragment())
            ))
        }
        None => Redirect::to("/"),
    }
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/live", get(live_socket))
        .nest_service("/static", ServeDir::new("static"))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
