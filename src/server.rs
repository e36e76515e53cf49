use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::context::RunContext;
use crate::error::ForgeError;
use crate::orchestrator::Orchestrator;
use crate::output::{self, Delivery};
use crate::request::ProcessingRequest;
use crate::upload::{Upload, UploadWriter};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
}

impl IntoResponse for ForgeError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Build the service router.
///
/// API routes are matched first; every other path is served from the
/// configured static directory.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;
    let static_files = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/health", get(health))
        .route("/api/probe", get(probe))
        .route("/api/process", post(process))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .fallback_service(static_files)
}

async fn health() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "ok")
}

/// Encoder capability listing, passed through verbatim
async fn probe(State(state): State<AppState>) -> Result<impl IntoResponse, ForgeError> {
    let listing = state.orchestrator.runner().capabilities().await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], listing))
}

/// Accept one upload, run every requested format and return either the
/// single artifact or a ZIP bundle.
///
/// The working directory travels with the response body and is removed
/// once the body has been fully written or dropped.
async fn process(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response, ForgeError> {
    let ctx = RunContext::new()?;
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut upload: Option<Upload> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ForgeError::Validation(format!("form parse error: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let declared = field.file_name().unwrap_or_default().to_string();
            let target = Upload::prepare(ctx.path(), &declared);
            let mut writer = UploadWriter::create(&target).await?;
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| ForgeError::Validation(format!("file upload error: {}", e)))?
            {
                writer.write_chunk(&chunk).await?;
            }
            let size = writer.finish().await?;
            info!("Received upload {} ({} bytes, {:?})", declared, size, target.kind);
            upload = Some(target);
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ForgeError::Validation(format!("form parse error: {}", e)))?;
            fields.insert(name, value);
        }
    }

    let upload = upload.ok_or_else(|| ForgeError::Validation("file required".to_string()))?;
    let request = ProcessingRequest::from_fields(&fields, &state.config.defaults);

    let artifacts = state.orchestrator.process(&ctx, &upload, &request).await?;
    let delivery = output::aggregate(&ctx, &upload.stem(), &artifacts).await?;

    stream_delivery(ctx, delivery).await
}

async fn stream_delivery(ctx: RunContext, delivery: Delivery) -> Result<Response, ForgeError> {
    let file = tokio::fs::File::open(delivery.path()).await?;
    let content_type = delivery.content_type();
    let disposition = delivery.disposition();
    info!("Request {} delivering {}", ctx.request_id(), disposition);

    // The context is owned by the stream so cleanup waits for the body
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _keep = &ctx;
        chunk
    });

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
