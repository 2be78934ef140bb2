use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use yolo_mjpeg_relay::adapters::{
    http::{router, state::HttpState},
    sources::{camera_catalog, DefaultSourceOpener},
    synthetic::StubDetectorLoader,
};
use yolo_mjpeg_relay::application::services::{CameraService, PipelineService};
use yolo_mjpeg_relay::domain::{camera::FrameSize, stream::{LifecycleState, StreamSettings}};

const SIZE: FrameSize = FrameSize { width: 160, height: 120 };

fn settings() -> StreamSettings {
    StreamSettings {
        frame_size: SIZE,
        top_k: 1,
        jpeg_quality: 90,
        pacing_ms: 0,
        read_timeout_ms: 2000,
        ..StreamSettings::default()
    }
}

fn app() -> (Router, Arc<PipelineService>) {
    let pipeline = Arc::new(
        PipelineService::new(
            Arc::new(DefaultSourceOpener::new(SIZE)),
            Arc::new(StubDetectorLoader::new(3)),
            settings(),
        )
        .unwrap(),
    );
    let state = HttpState {
        camera: Arc::new(CameraService::new(camera_catalog())),
        pipeline: pipeline.clone(),
    };
    (router(state), pipeline)
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json(app: &Router, uri: &str) -> serde_json::Value {
    let resp = app.clone().oneshot(get(uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Separa el cuerpo multipart en los JPEG de cada parte.
fn split_parts(body: &[u8]) -> Vec<Vec<u8>> {
    let mut parts = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        assert!(rest.starts_with(b"--frame\r\n"), "part must start with the boundary");
        let header_end = rest.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let headers = std::str::from_utf8(&rest[..header_end]).unwrap();
        assert!(headers.contains("Content-Type: image/jpeg"));
        let length: usize = headers
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let start = header_end + 4;
        parts.push(rest[start..start + length].to_vec());
        assert_eq!(&rest[start + length..start + length + 2], b"\r\n");
        rest = &rest[start + length + 2..];
    }
    parts
}

#[tokio::test]
async fn video_feed_without_producer_is_rejected() {
    let (app, _) = app();
    let resp = app.clone().oneshot(get("/video_feed")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(err["error"].is_string());
}

#[tokio::test]
async fn start_without_default_source_is_rejected() {
    let (app, _) = app();
    let resp = app.clone().oneshot(post("/start_stream", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_video_file_is_not_found() {
    let (app, pipeline) = app();
    let resp = app
        .clone()
        .oneshot(post("/start_stream", r#"{"uri":"/no/such/clip.mp4"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(&app, "/api/status").await["state"], "idle");
    assert_eq!(pipeline.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn oversized_synthetic_frames_are_rejected() {
    let (app, pipeline) = app();
    for size in [r#"{"width":100000,"height":100000}"#, r#"{"width":0,"height":0}"#] {
        let body = format!(r#"{{"kind":"synthetic","frames":1,"size":{size}}}"#);
        let resp = app.clone().oneshot(post("/start_stream", &body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{size}");
    }
    assert_eq!(pipeline.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn streams_every_annotated_frame_then_closes() {
    let (app, pipeline) = app();

    let resp = app
        .clone()
        .oneshot(post("/start_stream", r#"{"uri":"stub://3?interval_ms=150"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app.clone().oneshot(get("/video_feed")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let body = tokio::time::timeout(Duration::from_secs(10), to_bytes(resp.into_body(), usize::MAX))
        .await
        .expect("stream should end when the source is exhausted")
        .unwrap();
    let parts = split_parts(&body);
    assert_eq!(parts.len(), 3);

    // Con K=1 solo se dibuja la caja más segura: borde superior en y=30..32.
    for jpeg in &parts {
        let image = image::load_from_memory(jpeg).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (SIZE.width, SIZE.height));
        let (r, g) = (50..110).fold((0u32, 0u32), |(r, g), x| {
            let p = image.get_pixel(x, 31);
            (r + u32::from(p[0]), g + u32::from(p[1]))
        });
        assert!(g > r + 60 * 50, "top edge should be green (r={r}, g={g})");

        // La segunda caja (y1=36) queda fuera con K=1.
        let inner = image.get_pixel(80, 37);
        assert!(inner[1] < inner[0] + 40, "second box must not be drawn: {inner:?}");
    }

    let mut rx = pipeline.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == LifecycleState::Idle))
        .await
        .expect("producer should return to idle")
        .unwrap();
    assert_eq!(json(&app, "/api/status").await["stats"]["frames_forwarded"], 3);
}

#[tokio::test]
async fn stop_and_status_reflect_the_lifecycle() {
    let (app, _) = app();

    let resp = app.clone().oneshot(post("/stop_stream", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(post("/start_stream", r#"{"kind":"synthetic","frames":1000,"interval_ms":20}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let status = json(&app, "/api/status").await;
    assert_eq!(status["state"], "running");
    assert_eq!(status["source"]["kind"], "synthetic");

    // Un segundo arranque no abre otra fuente.
    let resp = app
        .clone()
        .oneshot(post("/start_stream", r#"{"uri":"stub://5"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(json(&app, "/api/status").await["source"]["frames"], 1000);

    let resp = app.clone().oneshot(post("/stop_stream", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let status = json(&app, "/api/status").await;
    assert_eq!(status["state"], "idle");
    assert_eq!(status["buffered"], 0);
}

#[tokio::test]
async fn config_and_cameras_are_exposed() {
    let (app, _) = app();
    let config = json(&app, "/api/config").await;
    assert_eq!(config["settings"]["top_k"], 1);
    assert_eq!(config["settings"]["frame_size"]["width"], 160);
    assert!(config["default_source"].is_null());

    let cameras = json(&app, "/api/cameras").await;
    assert!(cameras["cameras"].is_array());
}
