//! # Transcription Engine
//!
//! The invocation boundary around the model capability. Owns the loaded
//! Whisper model as a process-wide singleton, serializes access to it,
//! runs inference off the event loop, and measures wall-clock duration
//! strictly around each call.
//!
//! ## Concurrency:
//! The candle decoder needs `&mut` access, so the model sits behind a
//! `std::sync::Mutex` and each invocation locks it inside a
//! `spawn_blocking` closure. One slow transcription therefore never
//! stalls the request dispatcher, only other transcriptions.
//!
//! ## Deadline:
//! Every invocation is bounded by the configured timeout; expiry surfaces
//! as a server error rather than hanging the request forever.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use candle_core::Device;
use serde::Serialize;

use crate::audio;
use crate::error::{ApiError, ApiResult};
use crate::transcription::model::{ModelSize, Segment, WhisperModel};

/// The transcript envelope returned to clients, produced entirely by the
/// model capability and forwarded without interpretation.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    /// Full transcript, segments joined in order
    pub text: String,
    /// Ordered timed spans
    pub segments: Vec<Segment>,
    /// Language used: the caller's hint, or the detected code
    pub language: String,
}

/// Process-wide transcription singleton.
///
/// Loaded once in `main` before the server accepts requests; never
/// reloaded or torn down during normal operation.
pub struct TranscriptionEngine {
    model: Mutex<WhisperModel>,
    size: ModelSize,
    timeout: Duration,
}

impl TranscriptionEngine {
    /// Load the model and wrap it as the shared engine.
    pub async fn load(size: ModelSize, device: Device, timeout: Duration) -> anyhow::Result<Arc<Self>> {
        let model = WhisperModel::load(size, device).await?;
        Ok(Arc::new(Self {
            model: Mutex::new(model),
            size,
            timeout,
        }))
    }

    /// The model size this engine was loaded with, surfaced by /health.
    pub fn model_size(&self) -> ModelSize {
        self.size
    }

    /// Transcribe a persisted artifact.
    ///
    /// ## Parameters:
    /// - **path**: the temp artifact location
    /// - **language**: optional hint, forwarded unchanged to the model
    ///
    /// ## Returns:
    /// The transcript envelope plus elapsed wall-clock seconds measured
    /// around the whole capability call (audio read + inference).
    pub async fn transcribe_file(
        self: &Arc<Self>,
        path: &Path,
        language: Option<&str>,
    ) -> ApiResult<(TranscriptionResult, f64)> {
        let start_time = Instant::now();

        let engine = Arc::clone(self);
        let path = path.to_path_buf();
        let language = language.map(|l| l.to_string());

        let task = tokio::task::spawn_blocking(move || -> anyhow::Result<(Vec<Segment>, String)> {
            let pcm = audio::decode_wav_file(&path)?;
            tracing::debug!(
                samples = pcm.len(),
                duration_secs = pcm.len() as f64 / audio::TARGET_SAMPLE_RATE as f64,
                "decoded artifact for transcription"
            );

            let mut model = engine
                .model
                .lock()
                .map_err(|_| anyhow::anyhow!("transcription model lock poisoned"))?;
            model.transcribe(&pcm, language.as_deref())
        });

        let joined = tokio::time::timeout(self.timeout, task).await.map_err(|_| {
            ApiError::Timeout(format!(
                "Transcription did not complete within {}s",
                self.timeout.as_secs()
            ))
        })?;

        let (segments, language) = joined
            .map_err(|e| ApiError::Internal(format!("Transcription task failed: {}", e)))?
            .map_err(|e| ApiError::Transcription(e.to_string()))?;

        let elapsed = start_time.elapsed().as_secs_f64();

        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!(
            segments = segments.len(),
            chars = text.len(),
            language = %language,
            elapsed_secs = format!("{:.2}", elapsed),
            "transcription completed"
        );

        Ok((
            TranscriptionResult {
                text,
                segments,
                language,
            },
            elapsed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serialization_shape() {
        let result = TranscriptionResult {
            text: "hello world".to_string(),
            segments: vec![Segment {
                start: 0.0,
                end: 2.5,
                text: "hello world".to_string(),
            }],
            language: "en".to_string(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["text"], "hello world");
        assert_eq!(json["language"], "en");
        assert_eq!(json["segments"][0]["start"], 0.0);
        assert_eq!(json["segments"][0]["end"], 2.5);
    }
}
