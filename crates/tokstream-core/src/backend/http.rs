//! Streaming HTTP conversion backend
//!
//! Posts a batch as JSON and reads the chunked response body as raw
//! little-endian 16-bit PCM. The audio format comes from the `x-sample-rate`
//! and `x-channels` response headers.

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ConversionBackend, ConversionRequest, FrameStream};
use crate::audio::{AudioFrame, BYTES_PER_SAMPLE};
use crate::config::TokenType;
use crate::error::{Error, Result};
use crate::lexer::Token;

const DEFAULT_SAMPLE_RATE: u32 = 24000;
const DEFAULT_CHANNELS: u16 = 1;

/// Request body sent to the conversion service
#[derive(Debug, Serialize)]
struct Token2AudioBody<'a> {
    tokens: &'a [Token],
    prompt_wav: &'a str,
    token_type: TokenType,
    request_id: &'a str,
    model: &'a str,
    direct: &'a str,
}

/// Conversion backend speaking to a remote token2audio service.
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    /// Create a backend for `endpoint` (scheme and host, no path).
    ///
    /// A non-empty `routing.endpoint` on a request overrides it.
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn url_for(&self, routing_endpoint: &str) -> String {
        let base = if routing_endpoint.is_empty() {
            &self.endpoint
        } else {
            routing_endpoint
        };
        format!("{}/v1/token2audio", base.trim_end_matches('/'))
    }
}

#[async_trait]
impl ConversionBackend for HttpBackend {
    async fn convert(&self, request: ConversionRequest) -> Result<FrameStream> {
        let url = self.url_for(&request.routing.endpoint);
        let body = Token2AudioBody {
            tokens: &request.tokens,
            prompt_wav: &request.prompt_reference,
            token_type: request.token_type,
            request_id: &request.request_id,
            model: &request.routing.model,
            direct: &request.routing.direct,
        };

        debug!(
            url = %url,
            request_id = %request.request_id,
            tokens = request.tokens.len(),
            "Posting conversion request"
        );

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::BackendError(format!(
                "{url} returned {status}: {}",
                text.trim()
            )));
        }

        let (sample_rate, channels) = audio_format(response.headers())?;
        Ok(Box::pin(pcm_frames(
            response.bytes_stream(),
            sample_rate,
            channels,
        )))
    }

    async fn probe(&self) -> Result<()> {
        let url = format!("{}/health", self.endpoint.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(Error::BackendUnavailable(format!(
                "{url} returned {}",
                response.status()
            ))),
            Err(e) => Err(Error::BackendUnavailable(e.to_string())),
        }
    }
}

fn audio_format(headers: &HeaderMap) -> Result<(u32, u16)> {
    fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str, default: T) -> Result<T> {
        match headers.get(name) {
            None => Ok(default),
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| Error::BackendError(format!("invalid {name} header: {value:?}"))),
        }
    }

    let sample_rate = header(headers, "x-sample-rate", DEFAULT_SAMPLE_RATE)?;
    let channels = header(headers, "x-channels", DEFAULT_CHANNELS)?;
    if sample_rate == 0 || channels == 0 {
        return Err(Error::BackendError(format!(
            "unsupported audio format: {sample_rate} Hz / {channels} ch"
        )));
    }
    Ok((sample_rate, channels))
}

/// Re-chunk a raw PCM byte stream into frames that hold whole samples.
fn pcm_frames<S>(
    body: S,
    sample_rate: u32,
    channels: u16,
) -> impl Stream<Item = Result<AudioFrame>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let align = channels as usize * BYTES_PER_SAMPLE;
    try_stream! {
        futures::pin_mut!(body);
        let mut carry = BytesMut::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(Error::from)?;
            carry.extend_from_slice(&chunk);

            let usable = carry.len() - carry.len() % align;
            if usable > 0 {
                yield AudioFrame::new(carry.split_to(usable).freeze(), sample_rate, channels);
            }
        }

        if !carry.is_empty() {
            warn!("Discarding {} trailing bytes of a partial sample", carry.len());
        }
    }
}
