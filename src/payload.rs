//! # Payload Decoding
//!
//! Normalizes the two accepted input shapes — a raw binary upload or a
//! base64 text field — into a single byte buffer for the rest of the
//! pipeline. Which shape an endpoint accepts is decided at the handler
//! layer; this module only knows how to turn either shape into bytes.
//!
//! ## Base64 Handling:
//! Some clients prepend a data-URI header such as `data:audio/wav;base64,`.
//! The decoder splits on the **last** comma and decodes only the suffix,
//! so headers (which cannot contain commas after the final one) are
//! stripped and bare base64 passes through untouched.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{ApiError, ApiResult};

/// The submitted media payload, tagged by input shape.
///
/// Representing the two shapes as an explicit union keeps the
/// presence/absence branching at the decoding boundary instead of
/// spreading nullable-field checks through the handlers.
#[derive(Debug, Clone)]
pub enum MediaInput {
    /// Raw bytes from a multipart file field
    Upload(Vec<u8>),
    /// Base64 text, optionally prefixed with a data-URI header
    Base64(String),
}

impl MediaInput {
    /// Decode the input into raw payload bytes.
    ///
    /// ## Failure Modes:
    /// - empty upload or empty base64 text → `MissingPayload`
    /// - undecodable base64 → `InvalidEncoding`
    pub fn into_bytes(self) -> ApiResult<Vec<u8>> {
        match self {
            MediaInput::Upload(bytes) => {
                if bytes.is_empty() {
                    return Err(ApiError::MissingPayload(
                        "Uploaded audio file is empty".to_string(),
                    ));
                }
                Ok(bytes)
            }
            MediaInput::Base64(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(ApiError::MissingPayload(
                        "Base64 audio data is empty".to_string(),
                    ));
                }

                // Strip an optional data-URI prefix: keep the suffix after
                // the last comma, which is the actual base64 body.
                let body = match trimmed.rsplit_once(',') {
                    Some((_, suffix)) => suffix,
                    None => trimmed,
                };

                STANDARD.decode(body).map_err(|e| {
                    ApiError::InvalidEncoding(format!("Invalid base64 audio data: {}", e))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_passes_through() {
        let bytes = vec![0x52, 0x49, 0x46, 0x46];
        let decoded = MediaInput::Upload(bytes.clone()).into_bytes().unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn test_empty_upload_is_missing_payload() {
        let result = MediaInput::Upload(Vec::new()).into_bytes();
        assert!(matches!(result, Err(ApiError::MissingPayload(_))));
    }

    #[test]
    fn test_base64_round_trip() {
        let payload = b"RIFF....WAVEfmt \x10\x00\x00\x00".to_vec();
        let encoded = STANDARD.encode(&payload);
        let decoded = MediaInput::Base64(encoded).into_bytes().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_data_uri_prefix_is_stripped() {
        let payload = b"hello audio".to_vec();
        let encoded = format!("data:audio/wav;base64,{}", STANDARD.encode(&payload));
        let decoded = MediaInput::Base64(encoded).into_bytes().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_split_uses_last_comma() {
        // A header with a comma in the media-type parameters must not
        // confuse the split.
        let payload = b"\x00\x01\x02\x03".to_vec();
        let encoded = format!(
            "data:audio/wav;codecs=1,2;base64,{}",
            STANDARD.encode(&payload)
        );
        let decoded = MediaInput::Base64(encoded).into_bytes().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_malformed_base64_is_invalid_encoding() {
        let result = MediaInput::Base64("not%%base64!!".to_string()).into_bytes();
        assert!(matches!(result, Err(ApiError::InvalidEncoding(_))));
    }

    #[test]
    fn test_blank_base64_is_missing_payload() {
        let result = MediaInput::Base64("   ".to_string()).into_bytes();
        assert!(matches!(result, Err(ApiError::MissingPayload(_))));
    }
}
