//! Streaming protocol messages (JSON text frames).
//!
//! Both directions are serde tagged enums keyed by `type`. Unknown server
//! message types deserialize to [`ServerMessage::Unknown`] and are ignored by
//! the controller.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::error::{PlayerError, PlayerResult};
use super::frame_cache::RgbwBuffer;

/// Client → server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    PlaybackInit {
        filename: String,
        slave_id: i32,
    },
    PlaybackPlay {
        frame: u32,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        slave_id: Option<i32>,
    },
    PlaybackPause {},
    PlaybackStop {},
    PlaybackSeek {
        frame: u32,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        slave_id: Option<i32>,
    },
    PlaybackGetFrame {
        frame: u32,
        slave_id: i32,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::PlaybackInit { .. } => "playback_init",
            ClientMessage::PlaybackPlay { .. } => "playback_play",
            ClientMessage::PlaybackPause {} => "playback_pause",
            ClientMessage::PlaybackStop {} => "playback_stop",
            ClientMessage::PlaybackSeek { .. } => "playback_seek",
            ClientMessage::PlaybackGetFrame { .. } => "playback_get_frame",
        }
    }

    pub fn to_json(&self) -> PlayerResult<String> {
        serde_json::to_string(self).map_err(|e| PlayerError::Protocol(e.to_string()))
    }
}

/// One slave's payload inside `frame_data_all`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveFrame {
    pub slave_id: i32,
    pub rgbw_b64: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pixel_count: Option<u32>,
}

/// Server → client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connection {
        #[serde(default)]
        message: String,
    },
    PlaybackReady {
        total_frames: u32,
        fps: f64,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        slave_ids: Option<Vec<i32>>,
    },
    PlaybackStarted {
        #[serde(default)]
        frame: u32,
    },
    PlaybackPaused {
        #[serde(default)]
        frame: u32,
    },
    PlaybackStopped {},
    FrameData {
        frame: u32,
        slave_id: i32,
        rgbw_b64: String,
    },
    FrameDataAll {
        frame: u32,
        slaves: Vec<SlaveFrame>,
    },
    PlaybackError {
        #[serde(default)]
        message: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Decode one text frame. Malformed JSON or a known type with a bad
    /// payload is a protocol error; an unknown `type` is not.
    pub fn parse(text: &str) -> PlayerResult<Self> {
        serde_json::from_str(text).map_err(|e| PlayerError::Protocol(e.to_string()))
    }

    pub fn to_json(&self) -> PlayerResult<String> {
        serde_json::to_string(self).map_err(|e| PlayerError::Protocol(e.to_string()))
    }

    pub fn is_frame(&self) -> bool {
        matches!(
            self,
            ServerMessage::FrameData { .. } | ServerMessage::FrameDataAll { .. }
        )
    }
}

/// base64 → RGBW bytes; the length must be a multiple of 4
pub fn decode_rgbw(b64: &str) -> PlayerResult<RgbwBuffer> {
    let bytes = BASE64
        .decode(b64.trim())
        .map_err(|e| PlayerError::Decode(e.to_string()))?;
    if bytes.len() % 4 != 0 {
        return Err(PlayerError::Decode(format!(
            "{} bytes is not a whole number of RGBW pixels",
            bytes.len()
        )));
    }
    Ok(bytes.into())
}

pub fn encode_rgbw(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Split a merged all-slaves buffer into per-slave buffers, in slave list
/// order, `pixel_count * 4` bytes each. A short buffer yields the slaves that
/// fit; the remainder is reported as an error.
pub fn split_merged(
    merged: &[u8],
    pixel_counts: &[(i32, u32)],
) -> (Vec<(i32, RgbwBuffer)>, Option<PlayerError>) {
    let mut out = Vec::with_capacity(pixel_counts.len());
    let mut offset = 0usize;
    for &(id, count) in pixel_counts {
        let len = count as usize * 4;
        match merged.get(offset..offset + len) {
            Some(chunk) => out.push((id, RgbwBuffer::from(chunk))),
            None => {
                let err = PlayerError::Decode(format!(
                    "merged frame ends at byte {} before slave {} ({} bytes)",
                    merged.len(),
                    id,
                    len
                ));
                return (out, Some(err));
            }
        }
        offset += len;
    }
    (out, None)
}
