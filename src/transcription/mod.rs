//! # Transcription Module
//!
//! Speech-to-text via Whisper models on the Candle-rs framework — a pure
//! Rust inference path with no FFI into whisper.cpp.
//!
//! ## Key Components:
//! - **Model Management**: downloading and loading Whisper checkpoints
//! - **Transcription Engine**: the process-wide invocation boundary with
//!   serialized model access, blocking-thread inference, and a deadline
//!
//! ## Whisper Model Sizes:
//! - **tiny**: ~39MB, fastest but least accurate
//! - **base**: ~74MB, the default deployment choice
//! - **small**: ~244MB, better accuracy
//! - **medium**: ~769MB, good technical vocabulary
//! - **large**: ~1550MB, best accuracy but slowest

pub mod engine;
pub mod model;

pub use engine::{TranscriptionEngine, TranscriptionResult};
pub use model::{ModelSize, Segment};
