//! Transfer encoding selection.
//!
//! Decides which Content-Transfer-Encoding a body gets and invokes the
//! matching encoder from [`crate::encoding`].

use crate::encoding::{encode_base64_wrapped, encode_quoted_printable, normalize_line_endings};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Transfer encodings the composer can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferEncoding {
    /// 7-bit ASCII, lines of at most 998 octets.
    SevenBit,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Base64 encoding.
    Base64,
}

impl TransferEncoding {
    /// Returns the header value for this encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::QuotedPrintable => "quoted-printable",
            Self::Base64 => "base64",
        }
    }
}

impl FromStr for TransferEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "7bit" => Ok(Self::SevenBit),
            "quoted-printable" => Ok(Self::QuotedPrintable),
            "base64" => Ok(Self::Base64),
            _ => Err(Error::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds used when no transfer encoding is requested.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EncodingPolicy {
    /// Longest line (in octets, excluding CRLF) still allowed as 7bit.
    pub max_line_length: usize,
    /// Share of non-ASCII or control bytes above which base64 is chosen
    /// over quoted-printable.
    pub base64_threshold: f64,
}

impl Default for EncodingPolicy {
    fn default() -> Self {
        Self {
            max_line_length: 998,
            base64_threshold: 0.5,
        }
    }
}

impl EncodingPolicy {
    /// Picks a transfer encoding for `data`.
    ///
    /// `is_text` marks content whose line breaks may be normalized to CRLF.
    #[must_use]
    pub fn detect(&self, data: &[u8], is_text: bool) -> TransferEncoding {
        let stats = ContentStats::scan(data);

        if self.is_seven_bit(&stats, is_text) {
            return TransferEncoding::SevenBit;
        }

        if (is_text || stats.bare_line_breaks == 0) && std::str::from_utf8(data).is_ok() {
            #[allow(clippy::cast_precision_loss)]
            let ratio = stats.unsafe_bytes as f64 / data.len().max(1) as f64;
            if ratio <= self.base64_threshold {
                return TransferEncoding::QuotedPrintable;
            }
        }

        TransferEncoding::Base64
    }

    fn is_seven_bit(&self, stats: &ContentStats, is_text: bool) -> bool {
        stats.non_ascii == 0
            && !stats.has_nul
            && stats.longest_line <= self.max_line_length
            && (is_text || stats.bare_line_breaks == 0)
    }
}

/// Byte statistics driving the encoding decision.
#[derive(Debug, Default)]
struct ContentStats {
    non_ascii: usize,
    unsafe_bytes: usize,
    has_nul: bool,
    longest_line: usize,
    bare_line_breaks: usize,
}

impl ContentStats {
    fn scan(data: &[u8]) -> Self {
        let mut stats = Self::default();
        let mut line = 0;

        for (i, &byte) in data.iter().enumerate() {
            match byte {
                b'\r' if data.get(i + 1) == Some(&b'\n') => {}
                b'\n' if i > 0 && data[i - 1] == b'\r' => {
                    stats.longest_line = stats.longest_line.max(line);
                    line = 0;
                }
                b'\r' | b'\n' => {
                    stats.bare_line_breaks += 1;
                    stats.longest_line = stats.longest_line.max(line);
                    line = 0;
                }
                _ => {
                    line += 1;
                    if byte == 0 {
                        stats.has_nul = true;
                    }
                    if byte >= 0x80 {
                        stats.non_ascii += 1;
                        stats.unsafe_bytes += 1;
                    } else if byte.is_ascii_control() && byte != b'\t' {
                        stats.unsafe_bytes += 1;
                    }
                }
            }
        }
        stats.longest_line = stats.longest_line.max(line);

        stats
    }
}

/// Encodes a body, choosing the transfer encoding when none is requested.
///
/// A requested `7bit` that the data cannot satisfy degrades to the detected
/// encoding instead of producing an invalid part.
#[must_use]
pub fn encode(
    data: &[u8],
    requested: Option<TransferEncoding>,
    policy: &EncodingPolicy,
    is_text: bool,
) -> (TransferEncoding, Vec<u8>) {
    let encoding = match requested {
        Some(TransferEncoding::SevenBit) if !policy.is_seven_bit(&ContentStats::scan(data), is_text) => {
            let detected = policy.detect(data, is_text);
            warn!("Content is not 7bit clean, using {detected} instead");
            detected
        }
        Some(encoding) => encoding,
        None => policy.detect(data, is_text),
    };

    let body = match encoding {
        TransferEncoding::SevenBit if is_text => normalize_line_endings(data),
        TransferEncoding::SevenBit => data.to_vec(),
        TransferEncoding::QuotedPrintable => encode_quoted_printable(data).into_bytes(),
        TransferEncoding::Base64 => encode_base64_wrapped(data).into_bytes(),
    };

    (encoding, body)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!("7bit".parse::<TransferEncoding>().unwrap(), TransferEncoding::SevenBit);
        assert_eq!("BASE64".parse::<TransferEncoding>().unwrap(), TransferEncoding::Base64);
        assert_eq!(
            " quoted-printable ".parse::<TransferEncoding>().unwrap(),
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_transfer_encoding_unsupported() {
        let err = "8bit".parse::<TransferEncoding>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding(ref s) if s == "8bit"));
        assert!("uuencode".parse::<TransferEncoding>().is_err());
    }

    #[test]
    fn test_detect_ascii_is_seven_bit() {
        let policy = EncodingPolicy::default();
        assert_eq!(policy.detect(b"abc", true), TransferEncoding::SevenBit);
        assert_eq!(policy.detect(b"", true), TransferEncoding::SevenBit);
        assert_eq!(policy.detect(b"a\nb", true), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_detect_long_line_is_quoted_printable() {
        let policy = EncodingPolicy::default();
        let long = "a".repeat(1000);
        assert_eq!(policy.detect(long.as_bytes(), true), TransferEncoding::QuotedPrintable);
    }

    #[test]
    fn test_detect_latin_text_is_quoted_printable() {
        let policy = EncodingPolicy::default();
        let text = "Tere õhtust, kuidas läheb?";
        assert_eq!(policy.detect(text.as_bytes(), true), TransferEncoding::QuotedPrintable);
    }

    #[test]
    fn test_detect_mostly_non_ascii_is_base64() {
        let policy = EncodingPolicy::default();
        let text = "こんにちは世界";
        assert_eq!(policy.detect(text.as_bytes(), true), TransferEncoding::Base64);
    }

    #[test]
    fn test_detect_binary_is_base64() {
        let policy = EncodingPolicy::default();
        assert_eq!(policy.detect(&[0xff, 0xd8, 0xff, 0xe0], false), TransferEncoding::Base64);
        assert_eq!(policy.detect(b"a\0b", false), TransferEncoding::Base64);
    }

    #[test]
    fn test_detect_bare_newline_in_binary_is_base64() {
        let policy = EncodingPolicy::default();
        assert_eq!(policy.detect(b"a\nb", false), TransferEncoding::Base64);
        assert_eq!(policy.detect(b"a\r\nb", false), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_custom_threshold() {
        let policy = EncodingPolicy {
            base64_threshold: 0.0,
            ..EncodingPolicy::default()
        };
        assert_eq!(policy.detect("é".as_bytes(), true), TransferEncoding::Base64);
    }

    #[test]
    fn test_encode_seven_bit_normalizes_text() {
        let policy = EncodingPolicy::default();
        let (encoding, body) = encode(b"a\nb", None, &policy, true);
        assert_eq!(encoding, TransferEncoding::SevenBit);
        assert_eq!(body, b"a\r\nb");
    }

    #[test]
    fn test_encode_requested_base64() {
        let policy = EncodingPolicy::default();
        let (encoding, body) = encode(b"abc", Some(TransferEncoding::Base64), &policy, true);
        assert_eq!(encoding, TransferEncoding::Base64);
        assert_eq!(body, b"YWJj");
    }

    #[test]
    fn test_encode_requested_seven_bit_degrades() {
        let policy = EncodingPolicy::default();
        let (encoding, body) = encode("ä".as_bytes(), Some(TransferEncoding::SevenBit), &policy, true);
        assert_eq!(encoding, TransferEncoding::QuotedPrintable);
        assert_eq!(body, b"=C3=A4");
    }
}
