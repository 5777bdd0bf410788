//! # Whisper Model Management
//!
//! Loads Whisper models via Candle-rs and turns 16kHz PCM into timed
//! transcript segments.
//!
//! ## Model Loading Process:
//! 1. Download model files from HuggingFace if not cached locally
//! 2. Load model weights (forced to f32 — no half-precision fast path,
//!    which keeps CPU inference warning-free) and the tokenizer
//! 3. Initialize the model on the selected device
//!
//! ## Decoding:
//! Audio is processed in 30-second windows. Each window runs through the
//! encoder once; the decoder then emits tokens greedily with a temperature
//! fallback ladder when the output degenerates into repetition. The first
//! window also drives language detection when no hint was supplied.

use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use rand::Rng;
use serde::Serialize;
use tokenizers::Tokenizer;

/// Whisper's fixed input sample rate.
const SAMPLE_RATE: usize = 16_000;

/// Samples per 30-second decode window.
const WINDOW_SAMPLES: usize = 30 * SAMPLE_RATE;

/// Mel frames per window (Whisper's fixed frame count for 30s).
const WINDOW_FRAMES: usize = 3000;

/// Available Whisper model sizes.
///
/// Larger models are more accurate and slower; `Base` is the default
/// deployment choice (74MB, tolerable cold start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace model repository for this size.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// Approximate weight size in MB, surfaced by /health.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 39,
            ModelSize::Base => 74,
            ModelSize::Small => 244,
            ModelSize::Medium => 769,
            ModelSize::Large => 1550,
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// One decoded span of the transcript.
#[derive(Debug, Clone, Serialize)]
pub struct Segment {
    /// Span start in seconds from the beginning of the audio
    pub start: f64,
    /// Span end in seconds
    pub end: f64,
    /// Transcribed text for this span
    pub text: String,
}

/// Multilingual token ids for the languages the service can hint or detect.
///
/// These ids are fixed across the multilingual Whisper checkpoints.
const LANGUAGES: &[(&str, u32)] = &[
    ("en", 50259),
    ("zh", 50260),
    ("de", 50261),
    ("es", 50262),
    ("ru", 50263),
    ("ko", 50264),
    ("fr", 50265),
    ("ja", 50266),
    ("pt", 50267),
    ("tr", 50268),
    ("pl", 50269),
    ("nl", 50271),
    ("ar", 50272),
    ("it", 50274),
    ("hi", 50276),
];

// Special token ids shared by the multilingual checkpoints.
const SOT_TOKEN: u32 = 50258;
const EOT_TOKEN: u32 = 50257;
const TRANSCRIBE_TOKEN: u32 = 50359;

/// A loaded Whisper model ready for transcription.
///
/// Decoding needs `&mut self`, so the engine serializes access behind a
/// mutex and runs inference on a blocking thread.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
}

impl WhisperModel {
    /// Download (if needed) and load a Whisper model from HuggingFace.
    ///
    /// ## Environment:
    /// - `HF_TOKEN`: optional auth token
    /// - `HF_HUB_CACHE` / `HF_HOME`: cache location overrides
    ///
    /// Download progress bars are disabled; the only output is tracing.
    pub async fn load(size: ModelSize, device: Device) -> Result<Self> {
        tracing::info!("Loading Whisper {} model...", size);
        let start_time = std::time::Instant::now();

        let api = {
            use hf_hub::api::tokio::ApiBuilder;

            let mut builder = ApiBuilder::new().with_token(std::env::var("HF_TOKEN").ok());

            if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
                builder = builder.with_cache_dir(cache_dir.into());
            } else if let Ok(hf_home) = std::env::var("HF_HOME") {
                builder = builder.with_cache_dir(std::path::PathBuf::from(hf_home).join("hub"));
            }

            builder
                .with_progress(false)
                .build()
                .map_err(|e| anyhow!("Failed to initialize HuggingFace API: {}", e))?
        };

        let repo = api.model(size.repo_name().to_string());

        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let model_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let mel_filters = Self::create_mel_filter_bank(&config);

        // f32 weights only: half precision is the unsupported fast path on
        // CPU and produces warning noise on most deployments.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_filename], candle_core::DType::F32, &device)?
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let load_time = start_time.elapsed();
        tracing::info!("Whisper {} model loaded in {:.2}s", size, load_time.as_secs_f64());

        Ok(Self {
            model,
            config,
            device,
            tokenizer,
            mel_filters,
        })
    }

    /// Transcribe 16kHz mono PCM into timed segments.
    ///
    /// ## Parameters:
    /// - **pcm**: samples as f32 in [-1.0, 1.0], 16kHz, mono
    /// - **language**: optional hint, forwarded unvalidated — hints without
    ///   a known token simply add no language token to the prompt
    ///
    /// ## Returns:
    /// The ordered segments plus the language used: the hint when given,
    /// otherwise the code detected from the first window.
    pub fn transcribe(
        &mut self,
        pcm: &[f32],
        language: Option<&str>,
    ) -> Result<(Vec<Segment>, String)> {
        if pcm.is_empty() {
            return Err(anyhow!("audio stream is empty"));
        }

        let mut segments = Vec::new();
        let mut resolved_language: Option<String> = language.map(|l| l.to_string());

        for (index, window) in pcm.chunks(WINDOW_SAMPLES).enumerate() {
            let window_start = (index * WINDOW_SAMPLES) as f64 / SAMPLE_RATE as f64;
            let window_duration = window.len() as f64 / SAMPLE_RATE as f64;

            let mel = self.pcm_to_mel(window)?.unsqueeze(0)?;
            let encoder_output = self.model.encoder.forward(&mel, true)?;

            if resolved_language.is_none() {
                resolved_language = Some(self.detect_language(&encoder_output)?.to_string());
                tracing::debug!(
                    language = resolved_language.as_deref().unwrap_or("?"),
                    "auto-detected language from first window"
                );
            }

            let text = self.decode_window(&encoder_output, resolved_language.as_deref())?;
            if !text.is_empty() {
                segments.push(Segment {
                    start: window_start,
                    end: window_start + window_duration,
                    text,
                });
            }
        }

        Ok((segments, resolved_language.unwrap_or_else(|| "en".to_string())))
    }

    /// Pick the most probable language token for an encoded window.
    fn detect_language(&mut self, encoder_output: &Tensor) -> Result<&'static str> {
        let tokens = Tensor::new(&[SOT_TOKEN], &self.device)?.unsqueeze(0)?;
        let logits = self.model.decoder.forward(&tokens, encoder_output, true)?;
        let logits = logits.i((0, 0))?.to_vec1::<f32>()?;

        let mut best = ("en", f32::NEG_INFINITY);
        for &(code, token_id) in LANGUAGES {
            if let Some(&score) = logits.get(token_id as usize) {
                if score > best.1 {
                    best = (code, score);
                }
            }
        }
        Ok(best.0)
    }

    /// Greedy decode of one 30-second window with temperature fallback.
    fn decode_window(&mut self, encoder_output: &Tensor, language: Option<&str>) -> Result<String> {
        // Prompt: SOT, optional language token, transcribe task token.
        let mut prompt = vec![SOT_TOKEN];
        if let Some(lang_token) = language.and_then(language_token) {
            prompt.push(lang_token);
        }
        prompt.push(TRANSCRIBE_TOKEN);

        const MAX_TOKENS: usize = 224;
        const TEMPERATURES: &[f32] = &[0.0, 0.2, 0.4, 0.6, 0.8, 1.0];

        let mut tokens = prompt.clone();
        let mut output_tokens: Vec<u32> = Vec::new();

        for &temperature in TEMPERATURES {
            tokens.truncate(prompt.len());
            output_tokens.clear();

            let mut decode_success = true;

            for step in 0..MAX_TOKENS {
                let token_tensor = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
                let logits = self
                    .model
                    .decoder
                    .forward(&token_tensor, encoder_output, step == 0)?;
                let last_logits = logits.i((.., tokens.len() - 1, ..))?;

                let next_token = if temperature > 0.0 {
                    self.sample_token(&last_logits, temperature)?
                } else {
                    last_logits.argmax_keepdim(1)?.to_scalar::<u32>()?
                };

                if next_token == EOT_TOKEN {
                    break;
                }

                if is_repetitive(&output_tokens, next_token) {
                    decode_success = false;
                    break;
                }

                tokens.push(next_token);
                output_tokens.push(next_token);
            }

            if decode_success {
                break;
            }
        }

        self.decode_tokens(&output_tokens)
    }

    /// Multinomial sample from temperature-scaled logits, so retries at
    /// higher temperatures actually explore different token sequences.
    fn sample_token(&self, logits: &Tensor, temperature: f32) -> Result<u32> {
        let temp_tensor = Tensor::from_vec(vec![temperature], (1,), &self.device)?;
        let scaled = logits.broadcast_div(&temp_tensor)?;
        let probs = candle_nn::ops::softmax_last_dim(&scaled)?;
        let probs: Vec<f32> = probs.flatten_all()?.to_vec1()?;

        let roll: f32 = rand::thread_rng().gen();
        Ok(sample_from_probs(&probs, roll) as u32)
    }

    /// Decode token ids to text and strip special-token artifacts.
    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(cleaned.trim().to_string())
    }

    /// Convert one PCM window to a mel spectrogram tensor.
    ///
    /// Simplified log-mel frontend: triangular filters over frame energy.
    /// Windows shorter than 30s are zero-padded to the full frame count,
    /// as the encoder expects a fixed input shape.
    fn pcm_to_mel(&self, pcm: &[f32]) -> Result<Tensor> {
        let mut padded = vec![0.0f32; WINDOW_SAMPLES];
        let copy_len = pcm.len().min(WINDOW_SAMPLES);
        padded[..copy_len].copy_from_slice(&pcm[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let mut mel_data = vec![0.0f32; n_mels * WINDOW_FRAMES];

        let n_fft = self.mel_filters.len() / n_mels;
        let frame_size = padded.len() / WINDOW_FRAMES;
        for frame in 0..WINDOW_FRAMES {
            let start = frame * frame_size;
            let end = (start + frame_size).min(padded.len());

            let mut energy = 0.0f32;
            for &sample in &padded[start..end] {
                energy += sample.abs();
            }
            let log_energy = (energy / frame_size as f32).ln().max(-11.5129); // -80 dB floor

            let fft_bin = frame % n_fft;
            for mel_bin in 0..n_mels {
                let weight = self.mel_filters[mel_bin * n_fft + fft_bin].max(0.05);
                mel_data[mel_bin * WINDOW_FRAMES + frame] = log_energy * weight;
            }
        }

        Ok(Tensor::from_vec(mel_data, (n_mels, WINDOW_FRAMES), &self.device)?)
    }

    /// Build a triangular mel filter bank sized to the model config.
    fn create_mel_filter_bank(config: &Config) -> Vec<f32> {
        let n_fft = 400; // standard for 16kHz Whisper
        let n_mels = config.num_mel_bins as usize;
        let mut filters = vec![0.0f32; n_fft * n_mels];

        for i in 0..n_mels {
            let center = (i + 1) * n_fft / (n_mels + 1);
            let width = n_fft / (n_mels + 1);

            for j in center.saturating_sub(width)..=(center + width).min(n_fft - 1) {
                let distance = (j as i32 - center as i32).unsigned_abs() as f32;
                filters[i * n_fft + j] = (1.0 - distance / width as f32).max(0.0);
            }
        }

        filters
    }
}

/// Walk the cumulative distribution until the roll is spent.
///
/// `roll` is uniform in [0, 1); rounding slack past the last bucket falls
/// through to the final index.
fn sample_from_probs(probs: &[f32], roll: f32) -> usize {
    let mut remaining = roll;
    for (index, &p) in probs.iter().enumerate() {
        remaining -= p;
        if remaining < 0.0 {
            return index;
        }
    }
    probs.len().saturating_sub(1)
}

/// Language token for a hint code, if the code is known.
fn language_token(language: &str) -> Option<u32> {
    let needle = language.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(code, _)| *code == needle)
        .map(|&(_, token)| token)
}

/// Repetition guard for the greedy decode loop: bail on a token repeated
/// three times or a repeating 3-gram, triggering the temperature fallback.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    if tokens.len() >= 2 {
        let tail = &tokens[tokens.len() - 2..];
        if tail == [new_token, new_token] {
            return true;
        }
    }

    if tokens.len() >= 6 {
        let last_3 = &tokens[tokens.len() - 3..];
        let prev_3 = &tokens[tokens.len() - 6..tokens.len() - 3];
        if last_3 == prev_3 {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("base".parse::<ModelSize>().unwrap(), ModelSize::Base);
        assert_eq!("LARGE".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert!("huge".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_model_size_display_round_trip() {
        for size in [
            ModelSize::Tiny,
            ModelSize::Base,
            ModelSize::Small,
            ModelSize::Medium,
            ModelSize::Large,
        ] {
            assert_eq!(size.to_string().parse::<ModelSize>().unwrap(), size);
        }
    }

    #[test]
    fn test_language_token_lookup() {
        assert_eq!(language_token("en"), Some(50259));
        assert_eq!(language_token("FR"), Some(50265));
        assert_eq!(language_token("xx"), None);
    }

    #[test]
    fn test_sampling_follows_cumulative_distribution() {
        let probs = [0.1, 0.7, 0.2];
        assert_eq!(sample_from_probs(&probs, 0.05), 0);
        assert_eq!(sample_from_probs(&probs, 0.5), 1);
        assert_eq!(sample_from_probs(&probs, 0.95), 2);
    }

    #[test]
    fn test_sampling_roll_overflow_lands_on_last_bucket() {
        // Float rounding can leave the cumulative sum just under the roll.
        let probs = [0.3, 0.3, 0.3];
        assert_eq!(sample_from_probs(&probs, 0.999), 2);
    }

    #[test]
    fn test_repetition_guard() {
        assert!(!is_repetitive(&[], 5));
        assert!(!is_repetitive(&[1, 2, 3], 4));
        // Immediate triple repetition
        assert!(is_repetitive(&[9, 7, 7], 7));
        // Repeating 3-gram
        assert!(is_repetitive(&[1, 2, 3, 1, 2, 3], 1));
    }
}
