use axum::{body::Bytes, extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use crate::adapters::http::{error_response, state::HttpState};
use crate::application::dto::{CamerasResponse, ConfigResponse, StartStreamRequest};
use crate::domain::camera::SourceSpec;
use crate::domain::errors::DomainError;

pub async fn get_config(State(st): State<HttpState>) -> impl IntoResponse {
    Json(ConfigResponse {
        settings: st.pipeline.settings().clone(),
        default_source: st.pipeline.default_source().cloned(),
    })
}

pub async fn list_cameras(State(st): State<HttpState>) -> Response {
    match st.camera.list_cameras().await {
        Ok(cameras) => Json(CamerasResponse { cameras }).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn status(State(st): State<HttpState>) -> impl IntoResponse {
    Json(st.pipeline.status().await)
}

/// Cuerpo vacío = fuente por defecto. Acepta un `SourceSpec` directo o el
/// envoltorio `{"source": ..}` / `{"uri": ..}`.
fn parse_start_request(body: &[u8]) -> Result<Option<SourceSpec>, DomainError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if let Ok(spec) = serde_json::from_slice::<SourceSpec>(body) {
        return Ok(Some(spec));
    }
    let req: StartStreamRequest = serde_json::from_slice(body)
        .map_err(|e| DomainError::InvalidInput(format!("invalid start request: {e}")))?;
    match (req.source, req.uri) {
        (Some(source), _) => Ok(Some(source)),
        (None, Some(uri)) => uri.parse().map(Some),
        (None, None) => Ok(None),
    }
}

pub async fn start_stream(State(st): State<HttpState>, body: Bytes) -> Response {
    let source = match parse_start_request(&body) {
        Ok(source) => source,
        Err(e) => return error_response(e),
    };
    match st.pipeline.start(source).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn stop_stream(State(st): State<HttpState>) -> Response {
    match st.pipeline.stop().await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}
