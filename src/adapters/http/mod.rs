pub mod routes;
pub mod state;
pub mod stream;

use std::future::Future;
use std::sync::Arc;

use axum::{http::StatusCode, response::{IntoResponse, Response}, routing::{get, post}, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use crate::adapters::http::state::HttpState;
use crate::application::services::PipelineService;
use crate::domain::errors::DomainError;

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/video_feed", get(stream::video_feed))
        .route("/start_stream", post(routes::start_stream))
        .route("/stop_stream", post(routes::stop_stream))
        .route("/api/status", get(routes::status))
        .route("/api/config", get(routes::get_config))
        .route("/api/cameras", get(routes::list_cameras))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn error_response(err: DomainError) -> Response {
    let status = match err {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::InvalidInput(_) | DomainError::SourceUnavailable(_) => StatusCode::BAD_REQUEST,
        DomainError::OperationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// Sirve `app` hasta que `shutdown` se resuelva.
///
/// El pipeline se detiene antes de drenar las conexiones: al cerrarse el
/// buffer de relevo terminan los streams `/video_feed` abiertos y el servidor
/// puede completar el apagado ordenado.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    pipeline: Arc<PipelineService>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            if let Err(e) = pipeline.stop().await {
                tracing::error!("No se pudo detener el pipeline: {}", e);
            }
        })
        .await
}
