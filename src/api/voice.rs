//! Device voice endpoint
//!
//! Devices post raw 16 kHz, 16-bit mono PCM and get the spoken reply back in
//! the same format.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::ApiState;
use crate::Error;
use crate::debug::{DebugRecord, DebugTranscript};
use crate::pipeline::OutcomeStatus;
use crate::voice::{AudioBuffer, strip_container_header, wrap_pcm_as_wav};

/// Body returned when no reply audio could be produced
pub const CONVERSION_ERROR_BODY: &str = "TTS_CONVERSION_ERROR";

/// Content type of both request and response audio
const PCM_CONTENT_TYPE: &str = "application/octet-stream";

/// Header carrying the per-request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the pipeline outcome
pub const OUTCOME_HEADER: &str = "x-beacon-outcome";

/// Build voice router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/voice_input", post(voice_input))
        .with_state(state)
}

/// Answer one recorded utterance with spoken audio
async fn voice_input(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, VoiceError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("voice_input", request_id = %request_id);
    handle_voice_input(&state, &headers, body, request_id)
        .instrument(span)
        .await
}

async fn handle_voice_input(
    state: &ApiState,
    headers: &HeaderMap,
    body: Bytes,
    request_id: Uuid,
) -> Result<Response, VoiceError> {
    if !is_pcm_content_type(headers) {
        tracing::warn!(content_type = ?headers.get(header::CONTENT_TYPE), "unsupported media type");
        return Err(VoiceError::UnsupportedMediaType);
    }

    if body.is_empty() {
        return Err(VoiceError::BadRequest("No audio data received".to_string()));
    }

    let input = AudioBuffer::from_device(body.to_vec())
        .map_err(|e| VoiceError::BadRequest(e.to_string()))?;

    let outcome = state.pipeline.process(&input).await.map_err(|e| match e {
        Error::InvalidInput(msg) => VoiceError::BadRequest(msg),
        other => VoiceError::Internal(other.to_string()),
    })?;

    let response_wav = outcome.audio.as_ref().map(wrap_pcm_as_wav);

    if let Some(recorder) = &state.recorder {
        recorder.record(DebugRecord {
            request_wav: wrap_pcm_as_wav(&input),
            response_wav: response_wav.clone(),
            transcript: DebugTranscript::from_outcome(request_id, &outcome),
        });
    }

    if outcome.status == OutcomeStatus::Failed {
        return Err(VoiceError::ConversionFailed);
    }

    let pcm = response_wav
        .as_deref()
        .ok_or(VoiceError::ConversionFailed)
        .and_then(|wav| {
            strip_container_header(wav).map_err(|e| {
                tracing::error!(error = %e, "failed to unwrap reply audio");
                VoiceError::ConversionFailed
            })
        })?;

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PCM_CONTENT_TYPE)],
        pcm,
    )
        .into_response();

    let response_headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response_headers.insert(REQUEST_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&outcome.status.to_string()) {
        response_headers.insert(OUTCOME_HEADER, value);
    }

    Ok(response)
}

/// Whether the request declares raw PCM, ignoring parameters and case
fn is_pcm_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(PCM_CONTENT_TYPE))
}

/// Voice API errors
#[derive(Debug)]
pub enum VoiceError {
    UnsupportedMediaType,
    BadRequest(String),
    /// Reply audio could not be produced; answered with the sentinel body
    ConversionFailed,
    Internal(String),
}

impl IntoResponse for VoiceError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::ConversionFailed => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    CONVERSION_ERROR_BODY,
                )
                    .into_response();
            }
            Self::UnsupportedMediaType => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                "Unsupported media type".to_string(),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}
