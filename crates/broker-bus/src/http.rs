//! The dashboard's HTTP surface: `GET /` serves the static page, `GET /sse`
//! streams the live event feed, `GET /file/:token` serves a registered file
//! back by its opaque token.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::broadcaster::EventBus;
use crate::files::FileRegistry;

const DASHBOARD_HTML: &str = include_str!("../static/dashboard.html");

/// Shared state for every dashboard route.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<EventBus>,
    pub files: Arc<FileRegistry>,
    pub max_clients: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/sse", get(sse_handler))
        .route("/file/:token", get(serve_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// Streams every broadcast `UnifiedEvent` as an SSE `message` event, JSON
/// encoded. Axum's built-in `KeepAlive` sends the `: ping\n\n` comment every
/// 25 seconds, which is exactly what a reconnecting `EventSource` expects.
async fn sse_handler(State(state): State<AppState>) -> Result<Response, StatusCode> {
    if state.bus.viewer_count() >= state.max_clients {
        warn!(max_clients = state.max_clients, "rejecting dashboard connection, at capacity");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let (viewer_id, receiver) = state.bus.register_viewer();
    info!(viewer_id, "dashboard viewer connected");

    let bus = Arc::clone(&state.bus);
    let stream = ReceiverStream::new(receiver).map(move |event| {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(payload))
    });

    // When the stream is dropped (client disconnected), deregister. We wrap
    // the stream so the registration id stays alive for its lifetime and is
    // cleaned up exactly once, on drop.
    let guarded = ViewerGuardedStream { inner: stream, bus, viewer_id, deregistered: false };

    let sse = Sse::new(guarded).keep_alive(KeepAlive::new().interval(Duration::from_secs(25)).text("ping"));
    Ok(([(header::HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"))], sse).into_response())
}

/// Wraps a viewer's event stream so dropping it (client disconnect) always
/// deregisters the viewer exactly once, regardless of how the stream ends.
struct ViewerGuardedStream<S> {
    inner: S,
    bus: Arc<EventBus>,
    viewer_id: u64,
    deregistered: bool,
}

impl<S: Stream + Unpin> Stream for ViewerGuardedStream<S> {
    type Item = S::Item;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.inner).poll_next(cx)
    }
}

impl<S> Drop for ViewerGuardedStream<S> {
    fn drop(&mut self) {
        if !self.deregistered {
            self.deregistered = true;
            info!(viewer_id = self.viewer_id, "dashboard viewer disconnected");
            self.bus.deregister_viewer(self.viewer_id);
        }
    }
}

async fn serve_file(Path(token): Path<String>, State(state): State<AppState>) -> Response {
    match state.files.resolve(&token) {
        Some(path) => match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mime = mime_guess::from_path(&path).first_or_octet_stream();
                (
                    [
                        (header::CONTENT_TYPE, HeaderValue::from_str(&mime.to_string()).unwrap_or(HeaderValue::from_static("application/octet-stream"))),
                        (header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600")),
                    ],
                    bytes,
                )
                    .into_response()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read registered file");
                StatusCode::NOT_FOUND.into_response()
            }
        },
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
