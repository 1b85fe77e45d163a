//! Transport codec shared by the scheduler and the worker harness.
//!
//! Both directions use the same encoding: MessagePack (named fields) wrapped in
//! standard base64, which is safe to pass as a single process argument.
//!
//! The result channel adds explicit framing: the worker writes
//! `"<len>:<body>"`, where `len` is the byte length of the base64 `body`.
//! A pipe may deliver that in any number of pieces, so the scheduler feeds
//! every read into a [`FrameBuffer`] until the body is complete.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::outcome::Outcome;
use crate::task::Task;

/// Longest accepted length prefix; anything longer is not a real frame.
const MAX_PREFIX_DIGITS: usize = 19;

/// Errors produced while encoding or decoding tasks and outcomes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("invalid frame: {0}")]
    Frame(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let bytes = rmp_serde::to_vec_named(value)?;
    Ok(STANDARD.encode(bytes))
}

fn decode<T: DeserializeOwned>(encoded: &str) -> Result<T, CodecError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(rmp_serde::from_slice(&bytes)?)
}

/// Encode a task into a process-argument-safe string.
pub fn encode_task(task: &Task) -> Result<String, CodecError> {
    encode(task)
}

pub fn decode_task(encoded: &str) -> Result<Task, CodecError> {
    decode(encoded)
}

/// Encode an outcome into the base64 body of a result frame.
pub fn encode_outcome(outcome: &Outcome) -> Result<String, CodecError> {
    encode(outcome)
}

pub fn decode_outcome(encoded: &str) -> Result<Outcome, CodecError> {
    decode(encoded)
}

/// Wrap an encoded body in a length-prefixed frame.
pub fn frame(body: &str) -> String {
    format!("{}:{}", body.len(), body)
}

/// Accumulates bytes read from a worker's stdout until a full frame arrived.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// The frame body once all of it has been received.
    ///
    /// `Ok(None)` means more bytes are needed. Bytes after the body are ignored.
    pub fn complete(&self) -> Result<Option<&str>, CodecError> {
        let Some(colon) = self.buf.iter().position(|&b| b == b':') else {
            if self.buf.len() > MAX_PREFIX_DIGITS {
                return Err(CodecError::Frame("missing length prefix".into()));
            }
            if let Some(bad) = self.buf.iter().find(|b| !b.is_ascii_digit()) {
                return Err(CodecError::Frame(format!(
                    "unexpected byte 0x{bad:02x} in length prefix"
                )));
            }
            return Ok(None);
        };

        let prefix = &self.buf[..colon];
        if prefix.is_empty()
            || prefix.len() > MAX_PREFIX_DIGITS
            || !prefix.iter().all(u8::is_ascii_digit)
        {
            return Err(CodecError::Frame(format!(
                "malformed length prefix {:?}",
                String::from_utf8_lossy(prefix)
            )));
        }
        let len: usize = std::str::from_utf8(prefix)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CodecError::Frame("length prefix out of range".into()))?;

        let body = &self.buf[colon + 1..];
        if body.len() < len {
            return Ok(None);
        }
        std::str::from_utf8(&body[..len])
            .map(Some)
            .map_err(|e| CodecError::Frame(format!("frame body is not UTF-8: {e}")))
    }
}
