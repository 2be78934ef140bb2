use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::adapters::http::{error_response, state::HttpState};
use crate::application::emitter::{mjpeg_stream, CONTENT_TYPE};

/// `GET /video_feed`: stream MJPEG propio de esta conexión. Si el cliente se
/// desconecta, axum suelta el body y el bucle de emisión termina con él.
pub async fn video_feed(State(st): State<HttpState>) -> Response {
    let cursor = match st.pipeline.open_feed().await {
        Ok(cursor) => cursor,
        Err(e) => return error_response(e),
    };

    let chunks = mjpeg_stream(cursor, st.pipeline.emitter_settings());
    (
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        Body::from_stream(chunks),
    )
        .into_response()
}
