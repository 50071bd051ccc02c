//! One-shot conversion: token text in, WAV out.

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures::stream;
use tokio::sync::mpsc;
use tokstream_core::{encode_wav, AudioFrame};
use tracing::info;

use super::VoiceQuery;
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /v1/token2audio?voice=<id>`
///
/// Each line of the body is fed to the engine as one chunk, so the batching
/// behaves as it would for a streamed request.
pub async fn convert(
    State(state): State<AppState>,
    Query(query): Query<VoiceQuery>,
    body: String,
) -> Result<Response, ApiError> {
    info!(
        "Convert request: {} bytes, voice: {}",
        body.len(),
        query.voice
    );

    let chunks: Vec<String> = body.lines().map(str::to_owned).collect();
    let (tx, mut rx) = mpsc::unbounded_channel::<AudioFrame>();

    let report = state
        .engine
        .convert(stream::iter(chunks), &query.voice, move |frame| {
            let _ = tx.send(frame);
        })
        .await?;

    let mut frames = Vec::with_capacity(report.frames_delivered);
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }

    if report.tokens_received == 0 {
        return Err(ApiError::bad_request("no audio tokens in request body"));
    }
    let Some(wav) = encode_wav(&frames)? else {
        return Err(ApiError::bad_gateway(format!(
            "backend produced no audio ({} of {} batches failed)",
            report.batches_failed, report.batches_submitted
        )));
    };

    info!(
        "Converted {} tokens into {:.2}s of audio",
        report.tokens_received,
        report.audio_seconds()
    );

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::HeaderName::from_static("x-audio-duration-ms"),
                report.audio_duration.as_millis().to_string(),
            ),
            (
                header::HeaderName::from_static("x-batches-failed"),
                report.batches_failed.to_string(),
            ),
        ],
        wav,
    )
        .into_response())
}
