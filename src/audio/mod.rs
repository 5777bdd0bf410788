//! # Audio Module
//!
//! Converts the persisted artifact into the sample format the Whisper
//! model consumes: 16kHz, mono, 32-bit float in [-1.0, 1.0].

pub mod decode;

pub use decode::{decode_wav_file, TARGET_SAMPLE_RATE};
