use super::AppState;
use crate::display::{ChannelDisplay, DisplayEvent};
use crate::upload::Upload;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

const INDEX_HTML: &str = include_str!("index.html");

/// Multipart field that carries the PDF.
pub(crate) const FILE_FIELD: &str = "file";

pub(crate) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "model": &*state.model }))
}

/// Request rejected before analysis started.
#[derive(Debug)]
pub(crate) enum UploadError {
    Missing,
    NotPdf(String),
    Multipart(String),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let message = match self {
            UploadError::Missing => "No PDF file uploaded".to_string(),
            UploadError::NotPdf(name) => format!("'{name}' is not a PDF file"),
            UploadError::Multipart(detail) => format!("Malformed upload: {detail}"),
        };
        (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
    }
}

/// Aborts the analysis task when the response stream is dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// POST /api/analyze
pub(crate) async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, UploadError> {
    let upload = read_upload(&mut multipart).await?;
    info!("Upload received: {} ({} bytes)", upload.filename, upload.bytes.len());

    let (display, rx) = ChannelDisplay::channel();
    let analyst = state.analyst.clone();
    let task = tokio::spawn(async move {
        analyst.analyze(upload, &display).await;
    });
    let guard = AbortOnDrop(task);

    let events = UnboundedReceiverStream::new(rx).map(move |event| {
        let _ = &guard;
        Ok(sse_event(&event))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "upload.pdf".to_string());
        let content_type = field.content_type().map(|s| s.to_string());
        if !looks_like_pdf(&filename, content_type.as_deref()) {
            warn!("Rejected upload '{}' ({:?})", filename, content_type);
            return Err(UploadError::NotPdf(filename));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| UploadError::Multipart(e.to_string()))?;
        if bytes.is_empty() {
            return Err(UploadError::Missing);
        }
        return Ok(Upload::new(filename, bytes.to_vec()));
    }
    Err(UploadError::Missing)
}

fn looks_like_pdf(filename: &str, content_type: Option<&str>) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
        || content_type.is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"))
}

/// One display event as an SSE event.
pub fn sse_event(event: &DisplayEvent) -> Event {
    let name = match event {
        DisplayEvent::Started { .. } => "status",
        DisplayEvent::Success { .. } => "success",
        DisplayEvent::Error { .. } => "error",
        DisplayEvent::Render { .. } => "render",
        DisplayEvent::Finished => "done",
    };
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(name).data(data)
}
