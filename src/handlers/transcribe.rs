//! # Transcription Endpoints
//!
//! The three endpoint variants and the shared request pipeline behind
//! them. Each request runs the same linear sequence — decode payload,
//! sniff gate, persist artifact, invoke the model, release artifact,
//! assemble the envelope — and differs only in how the payload arrives.
//!
//! ## Endpoints:
//! - `POST /transcribe` — legacy: multipart accepting either a `file`
//!   field or a `base64_audio` text field
//! - `POST /transcribe_base64` — JSON body, base64 only
//! - `POST /transcribe_file` — multipart upload only
//!
//! The artifact is released after the invocation outcome is captured and
//! before the outcome is propagated, so cleanup runs on the failure path
//! as well as the success path.

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::artifact::TempArtifact;
use crate::error::{ApiError, ApiResult};
use crate::payload::MediaInput;
use crate::sniff;
use crate::state::AppState;
use crate::transcription::TranscriptionResult;

/// Success response body: timing plus the forwarded model result.
#[derive(Debug, Serialize)]
pub struct ResponseEnvelope {
    /// Wall-clock seconds spent in the model capability
    pub processing_time: f64,
    pub result: TranscriptionResult,
}

/// JSON body for the base64-only endpoint.
#[derive(Debug, Deserialize)]
pub struct Base64Request {
    /// Base64 audio data, optionally with a data-URI prefix.
    /// Optional in the schema so its absence maps to the pipeline's
    /// 400 rather than a framework deserialization error.
    pub base64_audio: Option<String>,
    pub language: Option<String>,
}

/// Fields collected from a multipart form.
#[derive(Debug, Default)]
struct TranscribeForm {
    file: Option<Vec<u8>>,
    base64_audio: Option<String>,
    language: Option<String>,
}

/// Legacy endpoint: accepts either input shape.
///
/// ## Endpoint: `POST /transcribe`
pub async fn transcribe_legacy(
    state: web::Data<AppState>,
    payload: Multipart,
) -> ApiResult<HttpResponse> {
    let form = read_form(payload).await?;

    let input = if let Some(bytes) = form.file {
        MediaInput::Upload(bytes)
    } else if let Some(text) = form.base64_audio {
        MediaInput::Base64(text)
    } else {
        return Err(ApiError::MissingPayload(
            "Must provide an audio file or base64 audio data".to_string(),
        ));
    };

    run_pipeline(&state, input, form.language).await
}

/// Base64-only endpoint.
///
/// ## Endpoint: `POST /transcribe_base64`
///
/// ## Request Body:
/// ```json
/// {"base64_audio": "data:audio/wav;base64,UklGR...", "language": "en"}
/// ```
pub async fn transcribe_base64(
    state: web::Data<AppState>,
    body: web::Json<Base64Request>,
) -> ApiResult<HttpResponse> {
    let request = body.into_inner();

    let text = request.base64_audio.ok_or_else(|| {
        ApiError::MissingPayload("No base64 audio data provided".to_string())
    })?;

    run_pipeline(&state, MediaInput::Base64(text), request.language).await
}

/// Upload-only endpoint.
///
/// ## Endpoint: `POST /transcribe_file`
///
/// ## Request:
/// Multipart form with a binary `file` field and an optional `language`
/// text field.
pub async fn transcribe_file(
    state: web::Data<AppState>,
    payload: Multipart,
) -> ApiResult<HttpResponse> {
    let form = read_form(payload).await?;

    let bytes = form.file.ok_or_else(|| {
        ApiError::MissingPayload("No audio file provided".to_string())
    })?;

    run_pipeline(&state, MediaInput::Upload(bytes), form.language).await
}

/// The shared linear pipeline: decode → sniff → persist → invoke →
/// release → respond.
async fn run_pipeline(
    state: &web::Data<AppState>,
    input: MediaInput,
    language: Option<String>,
) -> ApiResult<HttpResponse> {
    let bytes = input.into_bytes()?;

    let max_upload_bytes = state.get_config().limits.max_upload_bytes;
    if bytes.len() > max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Payload is {} bytes (limit: {} bytes)",
            bytes.len(),
            max_upload_bytes
        )));
    }

    let class = sniff::classify(&bytes);
    if !class.is_accepted() {
        return Err(ApiError::InvalidMediaType(format!(
            "The provided file is not valid audio or video (detected {})",
            class.mime_type()
        )));
    }
    tracing::debug!(mime = class.mime_type(), size = bytes.len(), "payload accepted");

    let artifact = TempArtifact::persist(&bytes).await?;

    // Capture the outcome before propagating it so release runs on the
    // failure path too; the Drop guard covers anything that panics.
    let outcome = state
        .engine
        .transcribe_file(artifact.path(), language.as_deref())
        .await;
    artifact.release().await;
    let (result, processing_time) = outcome?;

    Ok(HttpResponse::Ok().json(ResponseEnvelope {
        processing_time,
        result,
    }))
}

/// Collect the known fields from a multipart form.
///
/// Unknown fields are drained and ignored. Text fields must be UTF-8.
async fn read_form(mut payload: Multipart) -> ApiResult<TranscribeForm> {
    let mut form = TranscribeForm::default();

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| ApiError::MissingPayload(format!("Multipart error: {}", e)))?;

        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .map(|name| name.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| ApiError::MissingPayload(format!("Upload read error: {}", e)))?;
            bytes.extend_from_slice(&chunk);
        }

        match field_name.as_deref() {
            Some("file") => form.file = Some(bytes),
            Some("base64_audio") => form.base64_audio = Some(text_field(bytes, "base64_audio")?),
            Some("language") => {
                let value = text_field(bytes, "language")?;
                if !value.trim().is_empty() {
                    form.language = Some(value.trim().to_string());
                }
            }
            _ => {} // drained above
        }
    }

    Ok(form)
}

fn text_field(bytes: Vec<u8>, name: &str) -> ApiResult<String> {
    String::from_utf8(bytes)
        .map_err(|_| ApiError::MissingPayload(format!("Field '{}' must be UTF-8 text", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::Segment;

    #[test]
    fn test_base64_request_parsing() {
        let json = r#"{"base64_audio": "UklGRg==", "language": "fr"}"#;
        let request: Base64Request = serde_json::from_str(json).unwrap();
        assert_eq!(request.base64_audio.as_deref(), Some("UklGRg=="));
        assert_eq!(request.language.as_deref(), Some("fr"));
    }

    #[test]
    fn test_base64_request_fields_are_optional() {
        let request: Base64Request = serde_json::from_str("{}").unwrap();
        assert!(request.base64_audio.is_none());
        assert!(request.language.is_none());
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = ResponseEnvelope {
            processing_time: 1.25,
            result: TranscriptionResult {
                text: "bonjour".to_string(),
                segments: vec![Segment {
                    start: 0.0,
                    end: 1.0,
                    text: "bonjour".to_string(),
                }],
                language: "fr".to_string(),
            },
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["processing_time"], 1.25);
        assert_eq!(json["result"]["text"], "bonjour");
        assert_eq!(json["result"]["language"], "fr");
        assert!(json["result"]["segments"].is_array());
    }

    #[test]
    fn test_text_field_rejects_non_utf8() {
        let result = text_field(vec![0xFF, 0xFE, 0x80], "language");
        assert!(matches!(result, Err(ApiError::MissingPayload(_))));
    }
}
