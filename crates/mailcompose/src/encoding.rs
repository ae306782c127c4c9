//! Byte-level encoders.
//!
//! Base64, Quoted-Printable (RFC 2045) and RFC 2047 encoded words. These are
//! pure functions; choosing between them is the job of [`crate::transfer`].

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum line length for Quoted-Printable and Base64 bodies.
pub const MAX_LINE_LENGTH: usize = 76;

/// Maximum length of a single RFC 2047 encoded word.
pub const MAX_WORD_LENGTH: usize = 75;

/// Charset label used for every encoded word.
const CHARSET: &str = "UTF-8";

/// Encodes data as Base64 on a single line.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 wrapped to 76 columns with CRLF line breaks.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2);

    for (i, chunk) in encoded.as_bytes().chunks(MAX_LINE_LENGTH).enumerate() {
        if i > 0 {
            result.push_str("\r\n");
        }
        // Base64 output is pure ASCII
        result.push_str(&String::from_utf8_lossy(chunk));
    }

    result
}

/// Decodes Base64 data, ignoring embedded whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes a hexadecimal string.
///
/// # Errors
///
/// Returns an error on odd length or non-hex characters.
pub fn decode_hex(data: &str) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if cleaned.len() % 2 != 0 {
        return Err(Error::InvalidEncoding("Odd-length hex string".to_string()));
    }

    cleaned
        .chunks(2)
        .map(|pair| {
            let hex = std::str::from_utf8(pair)
                .map_err(|_| Error::InvalidEncoding("Non-ASCII hex digit".to_string()))?;
            u8::from_str_radix(hex, 16).map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))
        })
        .collect()
}

/// Encodes bytes using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks (`\r\n`, `\n` or a lone `\r`) in the input become CRLF hard
/// breaks. Longer lines get `=` soft breaks so that no physical line exceeds
/// 76 characters. Whitespace at the end of a line is always encoded.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 3 / 2);

    for (index, line) in split_lines(data).into_iter().enumerate() {
        if index > 0 {
            result.push_str("\r\n");
        }
        encode_qp_line(line, &mut result);
    }

    result
}

fn encode_qp_line(line: &[u8], result: &mut String) {
    let mut line_length = 0;

    for (i, byte) in line.iter().enumerate() {
        let last = i + 1 == line.len();
        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            b' ' | b'\t' => !last,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // Room for the trailing '=' of a soft break, unless this is the end of the line
        let limit = if last { MAX_LINE_LENGTH } else { MAX_LINE_LENGTH - 1 };
        if line_length + width > limit {
            result.push_str("=\r\n");
            line_length = 0;
        }

        if literal {
            result.push(char::from(*byte));
        } else {
            let _ = write!(result, "={byte:02X}");
        }
        line_length += width;
    }
}

/// Splits data into lines, accepting CRLF, LF and lone CR as terminators.
fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < data.len() {
        match data[i] {
            b'\r' => {
                lines.push(&data[start..i]);
                if data.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                start = i + 1;
            }
            b'\n' => {
                lines.push(&data[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    lines.push(&data[start..]);

    lines
}

/// Normalizes every line break in `data` to CRLF.
#[must_use]
pub fn normalize_line_endings(data: &[u8]) -> Vec<u8> {
    let lines = split_lines(data);
    let mut result = Vec::with_capacity(data.len() + lines.len());
    for (index, line) in lines.into_iter().enumerate() {
        if index > 0 {
            result.extend_from_slice(b"\r\n");
        }
        result.extend_from_slice(line);
    }
    result
}

/// RFC 2047 encoded-word flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordEncoding {
    /// Q encoding (Quoted-Printable variant).
    #[default]
    Q,
    /// B encoding (Base64).
    B,
}

impl WordEncoding {
    const fn label(self) -> char {
        match self {
            Self::Q => 'Q',
            Self::B => 'B',
        }
    }

    fn encoded_len(self, ch: char) -> usize {
        match self {
            Self::Q => {
                if is_q_safe(ch) || ch == ' ' {
                    1
                } else {
                    ch.len_utf8() * 3
                }
            }
            Self::B => ch.len_utf8(),
        }
    }
}

/// Characters that may appear literally inside a Q-encoded word in any
/// header position, including display-name phrases (RFC 2047 section 5).
const fn is_q_safe(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '!' | '*' | '+' | '-' | '/')
}

/// Returns true if the text contains characters outside 7-bit ASCII.
#[must_use]
pub fn has_non_ascii(text: &str) -> bool {
    !text.is_ascii()
}

/// Encodes text as one or more RFC 2047 encoded words.
///
/// Text that is pure ASCII is returned unchanged. Otherwise the whole value
/// is encoded and split into words of at most `max_length` characters each,
/// separated by a single space. Words never split a UTF-8 sequence.
#[must_use]
pub fn encode_mime_word(text: &str, encoding: WordEncoding, max_length: usize) -> String {
    encode_mime_word_after(text, encoding, max_length, 0)
}

/// Encodes text as RFC 2047 encoded words that start `offset` characters
/// into a header line.
///
/// The first word is shortened so that it ends within `max_length + 1`
/// characters of the line start; later words are at most `max_length`
/// long, which keeps them within the same limit once folded onto a
/// continuation line behind a single space.
#[must_use]
pub fn encode_mime_word_after(
    text: &str,
    encoding: WordEncoding,
    max_length: usize,
    offset: usize,
) -> String {
    if !has_non_ascii(text) {
        return text.to_string();
    }

    let overhead = CHARSET.len() + 7; // "=?" + charset + "?X?" + "?="
    let word_budget = |length: usize| length.saturating_sub(overhead).max(12);
    let first_length = (max_length + 1).saturating_sub(offset).min(max_length);
    let mut budget = word_budget(first_length);

    let mut words = Vec::new();
    let mut chunk = String::new();
    let mut chunk_len = 0;

    for ch in text.chars() {
        let next_len = match encoding {
            WordEncoding::Q => chunk_len + encoding.encoded_len(ch),
            WordEncoding::B => (chunk.len() + ch.len_utf8()).div_ceil(3) * 4,
        };
        if next_len > budget && !chunk.is_empty() {
            words.push(encode_word(&chunk, encoding));
            chunk.clear();
            chunk_len = 0;
            budget = word_budget(max_length);
        }
        chunk.push(ch);
        chunk_len += encoding.encoded_len(ch);
    }
    if !chunk.is_empty() {
        words.push(encode_word(&chunk, encoding));
    }

    words.join(" ")
}

fn encode_word(text: &str, encoding: WordEncoding) -> String {
    let payload = match encoding {
        WordEncoding::Q => {
            let mut encoded = String::with_capacity(text.len() * 3);
            for ch in text.chars() {
                if is_q_safe(ch) {
                    encoded.push(ch);
                } else if ch == ' ' {
                    encoded.push('_');
                } else {
                    let mut buf = [0u8; 4];
                    for byte in ch.encode_utf8(&mut buf).bytes() {
                        let _ = write!(encoded, "={byte:02X}");
                    }
                }
            }
            encoded
        }
        WordEncoding::B => encode_base64(text.as_bytes()),
    };

    format!("=?{CHARSET}?{}?{payload}?=", encoding.label())
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
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_wrapped() {
        let data = vec![0u8; 120];
        let encoded = encode_base64_wrapped(&data);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines[1].len(), 76);
        assert_eq!(lines[2].len(), 8);
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("74657265").unwrap(), b"tere");
        assert!(decode_hex("746").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_quoted_printable_encode() {
        assert_eq!(encode_quoted_printable(b"Hello, World!"), "Hello, World!");

        let encoded = encode_quoted_printable("Héllo, Wørld!".as_bytes());
        assert_eq!(encoded, "H=C3=A9llo, W=C3=B8rld!");
    }

    #[test]
    fn test_quoted_printable_line_breaks() {
        assert_eq!(encode_quoted_printable(b"a\nb\r\nc"), "a\r\nb\r\nc");
        assert_eq!(encode_quoted_printable(b"a = b"), "a =3D b");
    }

    #[test]
    fn test_quoted_printable_trailing_whitespace() {
        assert_eq!(encode_quoted_printable(b"end \nnext\t"), "end=20\r\nnext=09");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        let text = "x".repeat(100);
        let encoded = encode_quoted_printable(text.as_bytes());
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert_eq!(lines[0].len(), 76);
        assert!(lines[0].ends_with('='));
        assert_eq!(lines[1], "x".repeat(25));
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings(b"a\nb\rc\r\nd"), b"a\r\nb\r\nc\r\nd");
        assert_eq!(normalize_line_endings(b"abc"), b"abc");
    }

    #[test]
    fn test_mime_word_ascii_passthrough() {
        assert_eq!(encode_mime_word("Tere", WordEncoding::Q, MAX_WORD_LENGTH), "Tere");
        assert_eq!(encode_mime_word("Tere", WordEncoding::B, MAX_WORD_LENGTH), "Tere");
    }

    #[test]
    fn test_mime_word_q() {
        assert_eq!(
            encode_mime_word("äss", WordEncoding::Q, MAX_WORD_LENGTH),
            "=?UTF-8?Q?=C3=A4ss?="
        );
        assert_eq!(
            encode_mime_word("Tere õkva!", WordEncoding::Q, MAX_WORD_LENGTH),
            "=?UTF-8?Q?Tere_=C3=B5kva!?="
        );
    }

    #[test]
    fn test_mime_word_b() {
        let expected = format!("=?UTF-8?B?{}?=", encode_base64("äss".as_bytes()));
        assert_eq!(encode_mime_word("äss", WordEncoding::B, MAX_WORD_LENGTH), expected);
    }

    #[test]
    fn test_mime_word_split() {
        let encoded = encode_mime_word("äss tekst on see siin või kuidas?", WordEncoding::Q, 30);
        let words: Vec<&str> = encoded.split(' ').collect();
        assert!(words.len() > 1);
        for word in words {
            assert!(word.starts_with("=?UTF-8?Q?"));
            assert!(word.ends_with("?="));
            assert!(word.len() <= 30, "{word} too long");
        }
    }

    #[test]
    fn test_mime_word_after_prefix() {
        let text = "Tere õhtust, see on üks väga pikk teema mis läheb kaugele";
        let encoded = encode_mime_word_after(text, WordEncoding::Q, MAX_WORD_LENGTH, "Subject: ".len());
        let words: Vec<&str> = encoded.split(' ').collect();
        assert!(words.len() > 1);
        assert!("Subject: ".len() + words[0].len() <= MAX_LINE_LENGTH);
        for word in &words[1..] {
            assert!(word.len() <= MAX_WORD_LENGTH);
        }
        assert_eq!(
            encode_mime_word_after(text, WordEncoding::Q, MAX_WORD_LENGTH, 0),
            encode_mime_word(text, WordEncoding::Q, MAX_WORD_LENGTH)
        );
    }

    proptest! {
        #[test]
        fn qp_lines_never_exceed_limit(text in "\\PC{0,400}") {
            let encoded = encode_quoted_printable(text.as_bytes());
            for line in encoded.split("\r\n") {
                prop_assert!(line.len() <= MAX_LINE_LENGTH);
            }
        }

        #[test]
        fn mime_words_respect_length(text in "[a-zäöüõ ]{1,200}") {
            prop_assume!(has_non_ascii(&text));
            let encoded = encode_mime_word(&text, WordEncoding::Q, MAX_WORD_LENGTH);
            for word in encoded.split(' ') {
                prop_assert!(word.len() <= MAX_WORD_LENGTH);
            }
        }
    }
}
