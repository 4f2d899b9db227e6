//! Shared types for SignFlow transcript matching and sign playback.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Kind of a sign asset, decided by sniffing the payload content.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Still image, shown for the sequencer's dwell duration
    #[default]
    Image,
    /// Short clip, shown until the renderer reports the media has ended
    Video,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw content of a sign asset.
///
/// The payload is opaque to the engine: either the encoded media itself or a
/// reference string such as a `data:` URL.
#[derive(Clone, PartialEq, Eq)]
pub enum AssetPayload {
    /// Encoded media bytes (PNG, JPEG, WebM, MP4, ...)
    Bytes(Vec<u8>),
    /// Data reference, typically a `data:<mime>;base64,...` URL
    Reference(String),
}

impl fmt::Debug for AssetPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Payloads can be megabytes; never dump them into logs.
        match self {
            AssetPayload::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            AssetPayload::Reference(reference) => {
                let head: String = reference.chars().take(32).collect();
                write!(f, "Reference({:?}.., {} chars)", head, reference.len())
            }
        }
    }
}

/// Result of sniffing a payload: its kind and best-guess MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub kind: AssetKind,
    pub mime: Cow<'static, str>,
}

impl AssetPayload {
    /// Determine the content type by inspecting the payload itself.
    ///
    /// References are classified by their `data:` media type prefix; bytes by
    /// their magic numbers. Anything unrecognized is treated as an image.
    pub fn sniff(&self) -> ContentType {
        match self {
            AssetPayload::Reference(reference) => sniff_reference(reference),
            AssetPayload::Bytes(bytes) => sniff_bytes(bytes),
        }
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        match self {
            AssetPayload::Bytes(bytes) => bytes.len(),
            AssetPayload::Reference(reference) => reference.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const UNKNOWN_MIME: &str = "application/octet-stream";

fn sniff_reference(reference: &str) -> ContentType {
    match data_media_type(reference) {
        Some(media_type) if !media_type.is_empty() => ContentType {
            kind: if media_type.starts_with("video/") {
                AssetKind::Video
            } else {
                AssetKind::Image
            },
            mime: Cow::Owned(media_type),
        },
        _ => ContentType {
            kind: AssetKind::Image,
            mime: Cow::Borrowed(UNKNOWN_MIME),
        },
    }
}

/// Lowercased media type declared by a `data:` URL, the text between the
/// scheme and the first `;` or `,`. `None` for any other reference.
fn data_media_type(reference: &str) -> Option<String> {
    let scheme = reference.get(..5)?;
    if !scheme.eq_ignore_ascii_case("data:") {
        return None;
    }
    let rest = &reference[5..];
    let end = rest.find(|c: char| c == ';' || c == ',').unwrap_or(rest.len());
    Some(rest[..end].trim().to_ascii_lowercase())
}

fn sniff_bytes(bytes: &[u8]) -> ContentType {
    const VIDEO: AssetKind = AssetKind::Video;
    const IMAGE: AssetKind = AssetKind::Image;

    let (kind, mime) = if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        (VIDEO, "video/webm")
    } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        if &bytes[8..10] == b"qt" {
            (VIDEO, "video/quicktime")
        } else {
            (VIDEO, "video/mp4")
        }
    } else if bytes.starts_with(b"OggS") {
        (VIDEO, "video/ogg")
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"AVI " {
        (VIDEO, "video/x-msvideo")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        (IMAGE, "image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        (IMAGE, "image/jpeg")
    } else if bytes.starts_with(b"GIF8") {
        (IMAGE, "image/gif")
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        (IMAGE, "image/webp")
    } else {
        (IMAGE, UNKNOWN_MIME)
    };
    ContentType {
        kind,
        mime: Cow::Borrowed(mime),
    }
}

/// A sign asset stored in the library.
///
/// `kind` is always derived from the payload; there is no way to construct an
/// asset with a caller-asserted kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    kind: AssetKind,
    mime: Cow<'static, str>,
    payload: AssetPayload,
}

impl Asset {
    /// Build an asset, sniffing its kind from the payload content.
    pub fn from_payload(payload: AssetPayload) -> Self {
        let ContentType { kind, mime } = payload.sniff();
        Self {
            kind,
            mime,
            payload,
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn payload(&self) -> &AssetPayload {
        &self.payload
    }

    pub fn is_video(&self) -> bool {
        self.kind == AssetKind::Video
    }
}

/// One phrase or word scheduled for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayUnit {
    /// Per-session enqueue sequence number, echoed back in the completion signal
    pub seq: u64,
    /// Library key (single word or space-joined phrase) to display
    pub key: String,
}

/// What the renderer should show right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayItem {
    pub unit: PlayUnit,
    /// Library asset for the unit, or `None` for the textual fallback
    pub asset: Option<Asset>,
}

impl DisplayItem {
    /// Whether the renderer, rather than the sequencer's timer, ends this item.
    pub fn completes_on_media_end(&self) -> bool {
        self.asset.as_ref().is_some_and(Asset::is_video)
    }

    pub fn is_fallback(&self) -> bool {
        self.asset.is_none()
    }
}

/// Review-mode state of a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    /// Queue non-empty or a drain is in progress
    Sequencing,
    /// Queue empty, missing words presented for review
    Reviewing,
    /// Queue empty and nothing left to review
    #[default]
    Idle,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Sequencing => "sequencing",
            ReviewState::Reviewing => "reviewing",
            ReviewState::Idle => "idle",
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime mode - determines where logs go.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Development mode - verbose console logging
    Development,
    /// Production mode - rolling log files
    #[default]
    Production,
}

impl RuntimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeMode::Development => "development",
            RuntimeMode::Production => "production",
        }
    }
}

/// Point-in-time view of a session, for front ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Current review-mode state
    pub review_state: ReviewState,
    /// Number of units waiting behind the current one
    pub queue_depth: usize,
    /// Unit currently displayed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<PlayUnit>,
    /// Words with no library entry, in first-seen order
    pub missing_words: Vec<String>,
    /// Whether speech capture is active
    pub listening: bool,
    /// Finalized transcript accumulated this session
    pub transcript: String,
    /// Interim (not yet final) text
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub interim: String,
}
