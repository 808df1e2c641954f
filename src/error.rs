//! Error taxonomy for the toy pad engine.
//!
//! Frame-level problems (bad checksum, short buffers) are logged and
//! dropped by the inbound path; they never reach a caller. Everything
//! a caller can actually observe is enumerated here.

use thiserror::Error;

/// Errors surfaced by the public engine API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToyPadError {
    /// No attached session; the device is not open.
    #[error("toy pad is not connected")]
    NotConnected,

    /// No matching response arrived before the deadline.
    #[error("request timed out waiting for a response")]
    Timeout,

    /// A frame violated the expected structure (short payload, bad
    /// preamble, impossible length).
    #[error("malformed response frame")]
    Malformed,

    /// The device reported a non-zero status byte.
    #[error("device reported error status {0:#04x}")]
    DeviceError(u8),

    /// Neither length convention validated and the Convention-A
    /// fallback also failed to produce a structurally sound frame.
    #[error("response checksum did not validate under either convention")]
    ChecksumMismatch,

    /// UID derivation was given an input that doesn't match
    /// `^04[0-9a-f]{12}$`.
    #[error("invalid UID for key derivation: {0}")]
    InvalidUid(String),

    /// UID derivation was given a sector outside `0..4`.
    #[error("invalid sector: {0}")]
    InvalidSector(u8),
}

pub type Result<T> = std::result::Result<T, ToyPadError>;
