use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tokstream_core::{EngineConfig, Token2Audio, ToneBackend, VoicePromptTable};
use tokstream_server::{create_router, AppState};
use tower::ServiceExt;

fn app() -> Router {
    let config = EngineConfig {
        cold_start_token_threshold: 5,
        ..EngineConfig::default()
    };
    let engine = Token2Audio::new(
        config,
        Arc::new(ToneBackend::new(16000, 5)),
        Arc::new(VoicePromptTable::strict().with_voice("alice", "prompts/alice.wav")),
    )
    .unwrap();
    create_router(AppState::new(engine))
}

async fn body_json(body: Body) -> serde_json::Value {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response.into_body()).await["status"], "ok");
}

#[tokio::test]
async fn convert_returns_wav() {
    let request = Request::post("/v1/token2audio?voice=alice")
        .body(Body::from("888,265,1189,4502,4264\n413,133,3645,4576,5040\n692,29,3708"))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    // 13 tokens at 24ms each.
    assert_eq!(response.headers()["x-audio-duration-ms"], "312");

    let wav = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&wav[..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
    // 44-byte header plus 312ms of 16kHz mono 16-bit audio.
    assert_eq!(wav.len(), 44 + 312 * 16 * 2);
}

#[tokio::test]
async fn unknown_voice_is_not_found() {
    let request = Request::post("/v1/token2audio?voice=mallory")
        .body(Body::from("1,2,3,4,5"))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], 404);
}

#[tokio::test]
async fn body_without_tokens_is_rejected() {
    let request = Request::post("/v1/token2audio?voice=alice")
        .body(Body::from("no tokens\n0,0,0"))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stream_route_requires_upgrade() {
    let response = app()
        .oneshot(
            Request::get("/v1/token2audio/stream?voice=alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
