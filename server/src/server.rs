use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Form, State},
    http::{header, StatusCode, Uri},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::IntervalStream;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::{pages, AppState, PLACEHOLDER_JPEG};

/// Poll interval of the server-sent-event channels.
const SSE_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Reconnect delay suggested to SSE clients.
const SSE_RETRY: Duration = Duration::from_millis(3000);
/// Pace of placeholder frames while the output gate is closed.
const PLACEHOLDER_FRAME_INTERVAL: Duration = Duration::from_millis(200);

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/index.html", get(handle_index))
        .route(
            "/settings.html",
            get(handle_settings).post(handle_settings_post),
        )
        .route("/stream.mjpg", get(handle_stream))
        .route("/measurements_event_stream", get(handle_measurement_events))
        .route("/buttons_event_stream", get(handle_button_events))
        // The output-allowed toggle path is configured at runtime, so it is
        // matched in the fallback rather than the route table.
        .fallback(handle_fallback)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn redirect(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .body(Body::empty())
        .unwrap()
}

fn html(content: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from(content))
        .unwrap()
}

async fn handle_root() -> Response {
    redirect("/index.html")
}

async fn handle_index(State(state): State<AppState>) -> Response {
    let measurements = state.panel.read_measurements();
    html(pages::render_index(
        state.controller.state(),
        &measurements,
        state.controller.is_real_device(),
    ))
}

async fn handle_settings(State(state): State<AppState>) -> Response {
    if !state.controller.is_output_allowed() {
        return redirect("/index.html");
    }
    html(pages::render_settings(
        state.controller.state(),
        &state.controller.recordings_base().display().to_string(),
        state.controller.can_write_recordings(),
    ))
}

/// Start/stop control surface. Delegates to the state machine and
/// redirects right away; completion is observed through the event streams.
async fn handle_settings_post(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if state.controller.is_output_allowed() {
        if form.contains_key("start") {
            state.controller.start_recording();
        } else if form.contains_key("stop") {
            state.controller.stop_recording();
        }
    } else {
        debug!("control request ignored, output not allowed");
    }
    redirect("/settings.html")
}

fn multipart_frame(frame: &[u8]) -> Bytes {
    let head = format!(
        "--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.len()
    );
    let mut part = Vec::with_capacity(head.len() + frame.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(frame);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Long-lived MJPEG stream. Each connection pulls the latest frame from
/// the broadcaster and writes one multipart section per frame until the
/// client goes away; while the output gate is closed the placeholder image
/// is served instead of live frames.
async fn handle_stream(State(state): State<AppState>) -> Response {
    info!("client connected to MJPEG stream");
    let rx = state.controller.subscribe_frames();

    let stream = futures::stream::unfold((rx, state), |(mut rx, state)| async move {
        let frame = if state.controller.is_output_allowed() {
            match rx.next_frame().await {
                Some((frame, _generation)) => frame,
                None => return None,
            }
        } else {
            tokio::time::sleep(PLACEHOLDER_FRAME_INTERVAL).await;
            Bytes::from_static(PLACEHOLDER_JPEG)
        };
        Some((Ok::<_, Infallible>(multipart_frame(&frame)), (rx, state)))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::AGE, "0")
        .header(header::CACHE_CONTROL, "no-cache, private")
        .header(header::PRAGMA, "no-cache")
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=FRAME",
        )
        .body(Body::from_stream(stream))
        .unwrap()
}

fn sse_event<T: serde::Serialize>(payload: &T) -> Event {
    match Event::default().retry(SSE_RETRY).json_data(payload) {
        Ok(event) => event,
        Err(e) => {
            debug!("event payload failed to serialize: {}", e);
            Event::default().retry(SSE_RETRY).data("{}")
        }
    }
}

async fn handle_measurement_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = IntervalStream::new(tokio::time::interval(SSE_POLL_INTERVAL)).map(move |_| {
        let measurements = state.panel.read_measurements();
        Ok::<_, Infallible>(sse_event(&measurements))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn handle_button_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = IntervalStream::new(tokio::time::interval(SSE_POLL_INTERVAL)).map(move |_| {
        let payload = json!({
            "is_streaming_allowed": state.controller.is_output_allowed(),
            "is_recording": state.controller.is_recording(),
        });
        Ok::<_, Infallible>(sse_event(&payload))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn handle_fallback(State(state): State<AppState>, uri: Uri) -> Response {
    if uri.path() == state.toggle_token {
        state.controller.toggle_output_allowed();
        return redirect("/index.html");
    }
    (StatusCode::NOT_FOUND, "Not found").into_response()
}
