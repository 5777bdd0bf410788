//! # Media Sniffing
//!
//! Classifies a payload by its binary content signature (magic numbers),
//! never by filename or client-declared content type. The gate accepts
//! audio, video, and opaque binary — some audio containers carry no
//! recognizable signature, so unknown binary is given the benefit of the
//! doubt — and rejects everything it can positively identify as
//! something else (images, documents, archives, plain text).
//!
//! This is a pure function of the buffer prefix; no I/O happens here.

/// Classification of a payload by content signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaClass {
    /// A recognized audio container, with its sniffed MIME type
    Audio(&'static str),
    /// A recognized video container, with its sniffed MIME type
    Video(&'static str),
    /// No recognizable signature; treated as plausibly valid audio
    OpaqueBinary,
    /// A recognized non-media signature, with the offending MIME type
    Rejected(&'static str),
}

impl MediaClass {
    /// Whether the pipeline should proceed with this payload.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, MediaClass::Rejected(_))
    }

    /// The sniffed MIME type, for logging and error messages.
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaClass::Audio(mime) | MediaClass::Video(mime) | MediaClass::Rejected(mime) => mime,
            MediaClass::OpaqueBinary => "application/octet-stream",
        }
    }
}

/// How many leading bytes the classifier inspects at most.
const SNIFF_WINDOW: usize = 64;

/// Classify a byte buffer by its content signature.
pub fn classify(bytes: &[u8]) -> MediaClass {
    if bytes.len() < 4 {
        // Too short to carry any signature; also far too short to be audio.
        return MediaClass::Rejected("application/x-empty");
    }

    // RIFF containers: the format tag at offset 8 separates WAV from AVI.
    if bytes.starts_with(b"RIFF") && bytes.len() >= 12 {
        return match &bytes[8..12] {
            b"WAVE" => MediaClass::Audio("audio/x-wav"),
            b"AVI " => MediaClass::Video("video/x-msvideo"),
            b"WEBP" => MediaClass::Rejected("image/webp"),
            _ => MediaClass::OpaqueBinary,
        };
    }

    // IFF containers (AIFF family).
    if bytes.starts_with(b"FORM") && bytes.len() >= 12 {
        if matches!(&bytes[8..12], b"AIFF" | b"AIFC") {
            return MediaClass::Audio("audio/x-aiff");
        }
    }

    // MP3: either an ID3 tag or a bare MPEG audio frame sync.
    if bytes.starts_with(b"ID3") || (bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0) {
        return MediaClass::Audio("audio/mpeg");
    }

    if bytes.starts_with(b"OggS") {
        return MediaClass::Audio("audio/ogg");
    }

    if bytes.starts_with(b"fLaC") {
        return MediaClass::Audio("audio/x-flac");
    }

    if bytes.starts_with(b"#!AMR") {
        return MediaClass::Audio("audio/amr");
    }

    // ISO base media (MP4 family): the `ftyp` box sits at offset 4 and
    // its major brand distinguishes audio-only from video containers.
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return match &bytes[8..12] {
            b"M4A " | b"M4B " => MediaClass::Audio("audio/mp4"),
            _ => MediaClass::Video("video/mp4"),
        };
    }

    // Matroska / WebM share the EBML magic.
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return MediaClass::Video("video/webm");
    }

    if let Some(mime) = known_non_media(bytes) {
        return MediaClass::Rejected(mime);
    }

    if looks_like_text(bytes) {
        return MediaClass::Rejected("text/plain");
    }

    MediaClass::OpaqueBinary
}

/// Signatures of formats that are definitely not audio or video.
fn known_non_media(bytes: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (&[0x89, b'P', b'N', b'G'], "image/png"),
        (&[0xFF, 0xD8, 0xFF], "image/jpeg"),
        (b"GIF8", "image/gif"),
        (b"BM", "image/bmp"),
        (b"%PDF", "application/pdf"),
        (&[0x50, 0x4B, 0x03, 0x04], "application/zip"),
        (&[0x1F, 0x8B], "application/gzip"),
        (&[0x7F, b'E', b'L', b'F'], "application/x-executable"),
        (b"<!DOCTYPE", "text/html"),
        (b"<html", "text/html"),
        (b"<?xml", "application/xml"),
    ];

    SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map(|(_, mime)| *mime)
}

/// Heuristic for plain text: every byte in the sniff window is printable
/// ASCII or common whitespace. Catches text files renamed to `.wav`.
fn looks_like_text(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(SNIFF_WINDOW)
        .all(|&b| b.is_ascii_graphic() || matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_header() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&36u32.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf
    }

    #[test]
    fn test_wav_is_audio() {
        let class = classify(&wav_header());
        assert_eq!(class, MediaClass::Audio("audio/x-wav"));
        assert!(class.is_accepted());
    }

    #[test]
    fn test_mp3_variants_are_audio() {
        assert_eq!(classify(b"ID3\x04\x00tag data"), MediaClass::Audio("audio/mpeg"));
        assert_eq!(
            classify(&[0xFF, 0xFB, 0x90, 0x00, 0x00]),
            MediaClass::Audio("audio/mpeg")
        );
    }

    #[test]
    fn test_container_formats() {
        assert_eq!(classify(b"OggS\x00\x02junk"), MediaClass::Audio("audio/ogg"));
        assert_eq!(classify(b"fLaC\x00\x00\x00\x22"), MediaClass::Audio("audio/x-flac"));

        let mut m4a = vec![0, 0, 0, 32];
        m4a.extend_from_slice(b"ftypM4A ");
        assert_eq!(classify(&m4a), MediaClass::Audio("audio/mp4"));

        let mut mp4 = vec![0, 0, 0, 32];
        mp4.extend_from_slice(b"ftypisom");
        assert_eq!(classify(&mp4), MediaClass::Video("video/mp4"));

        let mut avi = b"RIFF".to_vec();
        avi.extend_from_slice(&[0u8; 4]);
        avi.extend_from_slice(b"AVI ");
        assert_eq!(classify(&avi), MediaClass::Video("video/x-msvideo"));

        assert_eq!(
            classify(&[0x1A, 0x45, 0xDF, 0xA3, 0x01]),
            MediaClass::Video("video/webm")
        );
    }

    #[test]
    fn test_png_is_rejected() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let class = classify(&png);
        assert_eq!(class, MediaClass::Rejected("image/png"));
        assert!(!class.is_accepted());
    }

    #[test]
    fn test_plain_text_disguised_as_wav_is_rejected() {
        // Text bytes regardless of what extension the client claimed.
        let class = classify(b"hello, this is just a text file pretending\n");
        assert_eq!(class, MediaClass::Rejected("text/plain"));
    }

    #[test]
    fn test_unknown_binary_is_opaque_and_accepted() {
        let buffer = [0x00, 0x17, 0x92, 0xE4, 0x88, 0x01, 0x55, 0xAA];
        let class = classify(&buffer);
        assert_eq!(class, MediaClass::OpaqueBinary);
        assert!(class.is_accepted());
        assert_eq!(class.mime_type(), "application/octet-stream");
    }

    #[test]
    fn test_tiny_buffer_is_rejected() {
        assert!(!classify(&[0x00, 0x01]).is_accepted());
        assert!(!classify(&[]).is_accepted());
    }
}
