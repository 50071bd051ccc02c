//! Streaming conversion over a WebSocket.
//!
//! Client text messages are token chunks; `[END]` (or closing the socket)
//! ends input. Frames go back as binary PCM messages in order, followed by
//! one JSON text message carrying the session report or an error.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokstream_core::{AudioFrame, SessionReport};
use tracing::{debug, info, warn};

use super::{VoiceQuery, END_MARKER};
use crate::error::ApiError;
use crate::state::AppState;

/// Final text message of a successful stream.
#[derive(Debug, Serialize)]
struct ReportMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    tokens_received: usize,
    batches_submitted: usize,
    batches_failed: usize,
    frames_delivered: usize,
    audio_seconds: f64,
    cancelled: bool,
}

impl From<&SessionReport> for ReportMessage {
    fn from(report: &SessionReport) -> Self {
        Self {
            kind: "report",
            tokens_received: report.tokens_received,
            batches_submitted: report.batches_submitted,
            batches_failed: report.batches_failed,
            frames_delivered: report.frames_delivered,
            audio_seconds: report.audio_seconds(),
            cancelled: report.cancelled,
        }
    }
}

/// `GET /v1/token2audio/stream?voice=<id>`
pub async fn stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<VoiceQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.voice))
}

/// Frame callback feeding a bounded channel.
///
/// A full channel blocks the sequencer and, behind it, the workers and their
/// backend streams. Requires the multi-thread runtime.
fn forward_frames(frame_tx: mpsc::Sender<AudioFrame>) -> impl FnMut(AudioFrame) + Send + 'static {
    move |frame| {
        if tokio::task::block_in_place(|| frame_tx.blocking_send(frame)).is_err() {
            debug!("Frame receiver dropped");
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, voice: String) {
    info!("Stream opened, voice: {}", voice);
    let (mut sender, mut receiver) = socket.split();

    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<String>();
    let (frame_tx, mut frame_rx) =
        mpsc::channel::<AudioFrame>(state.engine.config().frame_queue_capacity);

    let session = state.engine.session();
    let handle = session.handle();
    let run = tokio::spawn(async move {
        session
            .run(
                UnboundedReceiverStream::new(chunk_rx),
                &voice,
                forward_frames(frame_tx),
            )
            .await
    });

    // Dropping `chunk_tx` ends the session's input.
    let reader = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) if text.trim() == END_MARKER => break,
                Ok(Message::Text(text)) => {
                    if chunk_tx.send(text).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket read error: {e}");
                    break;
                }
            }
        }
    });

    while let Some(frame) = frame_rx.recv().await {
        if let Err(e) = sender.send(Message::Binary(frame.data.to_vec())).await {
            warn!("Client went away, cancelling session: {e}");
            handle.cancel();
            break;
        }
    }
    // Unblocks a sequencer parked on a full queue.
    drop(frame_rx);

    let result = run.await;
    reader.abort();

    let message = match result {
        Ok(Ok(report)) => {
            info!(
                "Stream closed: {} frames, {:.2}s of audio",
                report.frames_delivered,
                report.audio_seconds()
            );
            serde_json::to_value(ReportMessage::from(&report))
                .unwrap_or_else(|e| ApiError::internal(e.to_string()).body())
        }
        Ok(Err(e)) => {
            warn!("Stream session failed: {e}");
            ApiError::from(e).body()
        }
        Err(e) => ApiError::internal(format!("session task failed: {e}")).body(),
    };

    let _ = sender.send(Message::Text(message.to_string())).await;
    let _ = sender.close().await;
}
