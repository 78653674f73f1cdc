//! Typed errors for the wire protocol.
//!
//! Every other error in this workspace (socket setup, config parsing) is
//! propagated as `anyhow::Error` at the application seams, matching the
//! rest of the crate. The codec is the one place callers need to match on
//! a specific failure mode, so it gets a real enum.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum CodecError {
    #[error("bad magic: packet does not start with the protocol id")]
    BadMagic,
    #[error("truncated header: fewer than 15 bytes available")]
    TruncatedHeader,
    #[error("truncated payload: payload_len exceeds remaining bytes")]
    TruncatedPayload,
    #[error("unknown packet type byte: {0:#04x}")]
    UnknownType(u8),
}
