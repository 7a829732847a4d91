//! Domain-specific error types for the rplay pipeline.
//!
//! Every error that reaches a session loop is session-fatal: the loop
//! exits, drops its codec contexts and socket, and hands the error back
//! to the caller. Nothing here is retried automatically.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::video::backend::EncoderBackend;

/// The canonical error type for a streaming session.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Codec Errors ─────────────────────────────────────────────
    /// No backend in the cascade could be initialised.
    #[error("no usable H.264 encoder: {}", Attempts(.attempts))]
    EncoderUnavailable {
        /// Every candidate that was tried, in order, with its failure.
        attempts: Vec<(EncoderBackend, CodecError)>,
    },

    /// The active encoder rejected a frame or failed while draining.
    #[error("encode failed: {0}")]
    EncodeFailed(#[source] CodecError),

    /// The decoder rejected a packet or failed while draining.
    #[error("decode failed: {0}")]
    DecodeFailed(#[source] CodecError),

    // ── Transport Errors ─────────────────────────────────────────
    /// The peer closed the connection or the socket reported an error.
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] std::io::Error),

    /// A frame's declared length exceeds the configured cap.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A socket operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Collaborator Errors ──────────────────────────────────────
    /// The capture source failed in a way that is not a timeout.
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// The presenter could not display a surface.
    #[error("present failed: {0}")]
    Present(String),

    // ── Invocation Errors ────────────────────────────────────────
    /// Bad invocation or configuration, detected before any session starts.
    #[error("usage error: {0}")]
    Usage(String),
}

impl StreamError {
    /// Whether this error means the peer went away (as opposed to a
    /// local codec or collaborator failure).
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::Timeout(_))
    }
}

/// Renders the cascade attempts as `nvenc: not found; qsv: ...`.
struct Attempts<'a>(&'a [(EncoderBackend, CodecError)]);

impl fmt::Display for Attempts<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no backends were tried");
        }
        for (i, (backend, err)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{backend}: {err}")?;
        }
        Ok(())
    }
}

// ── CodecError ────────────────────────────────────────────────────

/// Failure of a single codec step.
///
/// The cascade uses the step variants to report *where* a candidate
/// backend gave up; the per-frame path only ever produces
/// [`CodecError::Backend`] or [`CodecError::Conversion`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The named implementation is not present in this build/system.
    #[error("encoder implementation `{0}` not found")]
    NotFound(&'static str),

    /// The context could not be allocated with the requested geometry.
    #[error("context allocation failed: {0}")]
    Allocation(String),

    /// The backend rejected a tuning option.
    #[error("tuning `{key}={value}` rejected")]
    Tuning { key: &'static str, value: &'static str },

    /// The context could not be opened.
    #[error("open failed: {0}")]
    Open(String),

    /// The pixel-format conversion could not be set up or run.
    #[error("pixel conversion: {0}")]
    Conversion(String),

    /// A frame was submitted before the context was opened.
    #[error("context is not open")]
    NotOpen,

    /// A runtime error reported by the backend.
    #[error("backend error: {0}")]
    Backend(String),
}

// ── CaptureError ──────────────────────────────────────────────────

/// Errors produced by a capture source.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No new surface within the wait bound. Not fatal: the host loop
    /// skips the iteration.
    #[error("no surface within {0:?}")]
    Timeout(Duration),

    /// The capture mechanism is gone (device lost, access revoked, ...).
    #[error("{0}")]
    Fatal(String),
}

// ── Tests ─────────────────────────────────────────────────────────
