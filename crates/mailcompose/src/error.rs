//! Error types for message composition.

use std::io;

/// Result type alias for composition operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Composition error types.
///
/// Only [`Error::UnsupportedEncoding`] and [`Error::Io`] abort a composition.
/// The other variants are produced by the lower-level helpers and are
/// recovered from by the builder, which degrades to a safe representation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An address field could not be parsed at all.
    #[error("Invalid address syntax: {0}")]
    InvalidAddressSyntax(String),

    /// Requested transfer encoding is not one of 7bit, quoted-printable, base64.
    #[error("Unsupported transfer encoding: {0}")]
    UnsupportedEncoding(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Source content could not be decoded with its declared encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// I/O error while writing a message to a sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
