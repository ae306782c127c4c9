//! Header collection and formatting.
//!
//! Headers keep insertion order and never merge duplicates: every value
//! added becomes its own `Name: value` line when rendered.

use crate::encoding::{MAX_LINE_LENGTH, MAX_WORD_LENGTH, WordEncoding, encode_mime_word_after};
use std::fmt;

/// A single header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// Plain value: sanitized, word-encoded if non-ASCII, then folded.
    Text(String),
    /// Pre-formatted value, emitted verbatim with no encoding or folding.
    Prepared(String),
}

impl HeaderValue {
    /// Returns the unrendered value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(value) | Self::Prepared(value) => value,
        }
    }
}

/// Ordered collection of email headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, HeaderValue)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header value.
    pub fn add(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.add_value(name, HeaderValue::Text(value.into()));
    }

    /// Appends a value that is emitted verbatim.
    pub fn add_prepared(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.add_value(name, HeaderValue::Prepared(value.into()));
    }

    /// Appends an already classified value.
    ///
    /// Empty names and blank text values are ignored.
    pub fn add_value(&mut self, name: impl AsRef<str>, value: HeaderValue) {
        let name = normalize_name(name.as_ref());
        if name.is_empty() {
            return;
        }
        let value = match value {
            HeaderValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return;
                }
                HeaderValue::Text(trimmed.to_string())
            }
            prepared @ HeaderValue::Prepared(_) => prepared,
        };
        self.entries.push((name, value));
    }

    /// Sets a header value, replacing any existing values.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.remove(name.as_ref());
        self.add(name, value);
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = normalize_name(name);
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header, in insertion order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        let name = normalize_name(name);
        self.entries
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Checks whether a header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        let name = normalize_name(name);
        self.entries.retain(|(n, _)| *n != name);
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of header lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the header block including the terminating blank line.
    #[must_use]
    pub fn to_block(&self) -> Vec<u8> {
        let mut block = self.to_string().into_bytes();
        block.extend_from_slice(b"\r\n");
        block
    }
}

impl Extend<(String, HeaderValue)> for Headers {
    fn extend<T: IntoIterator<Item = (String, HeaderValue)>>(&mut self, iter: T) {
        for (name, value) in iter {
            self.add_value(name, value);
        }
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{}\r\n", render_line(name, value))?;
        }
        Ok(())
    }
}

/// Renders one header line, folded if needed (without the trailing CRLF).
#[must_use]
pub fn render_line(name: &str, value: &HeaderValue) -> String {
    match value {
        HeaderValue::Prepared(raw) => format!("{name}: {raw}"),
        HeaderValue::Text(text) => {
            let cleaned = sanitize_value(text);
            let prefix = format!("{name}: ");
            let encoded = encode_mime_word_after(&cleaned, WordEncoding::Q, MAX_WORD_LENGTH, prefix.len());
            fold_line(&format!("{prefix}{encoded}"), MAX_LINE_LENGTH)
        }
    }
}

/// Normalizes a header name by capitalizing the first letter of each word.
///
/// `x-mailer` becomes `X-Mailer`; a leading `MIME-` is kept uppercase.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut word_start = true;

    for ch in name.trim().chars() {
        if word_start {
            normalized.extend(ch.to_uppercase());
        } else {
            normalized.extend(ch.to_lowercase());
        }
        word_start = ch == '-' || ch.is_whitespace();
    }

    if normalized
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("mime-"))
    {
        normalized.replace_range(..5, "MIME-");
    }

    normalized
}

/// Replaces line breaks with spaces and drops other control characters.
#[must_use]
pub fn sanitize_value(value: &str) -> String {
    let mut cleaned = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                cleaned.push(' ');
            }
            '\n' => cleaned.push(' '),
            '\t' => cleaned.push('\t'),
            c if c.is_control() => {}
            c => cleaned.push(c),
        }
    }

    cleaned
}

/// Folds a header line at spaces so that physical lines stay within
/// `max_length` where possible.
///
/// Continuation lines start with the space the line was broken at, so
/// removing every CRLF restores the original line. Words longer than the
/// limit are never split. The header name is never left alone on a line.
#[must_use]
pub fn fold_line(line: &str, max_length: usize) -> String {
    if line.len() <= max_length {
        return line.to_string();
    }

    let mut result = String::with_capacity(line.len() + line.len() / max_length * 3);
    let mut current = 0;
    let mut words_on_line = 0;
    let mut first_line = true;

    for (i, word) in line.split(' ').enumerate() {
        if i == 0 {
            result.push_str(word);
            current = word.len();
            words_on_line = 1;
            continue;
        }

        let min_words = if first_line { 2 } else { 1 };
        if !word.is_empty() && current + 1 + word.len() > max_length && words_on_line >= min_words {
            result.push_str("\r\n");
            current = 0;
            words_on_line = 0;
            first_line = false;
        }

        result.push(' ');
        result.push_str(word);
        current += 1 + word.len();
        if !word.is_empty() {
            words_on_line += 1;
        }
    }

    result
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
    fn test_normalize_name() {
        assert_eq!(normalize_name("abc"), "Abc");
        assert_eq!(normalize_name("aBC"), "Abc");
        assert_eq!(normalize_name("ABC"), "Abc");
        assert_eq!(normalize_name("a-b-c"), "A-B-C");
        assert_eq!(normalize_name("ab-bc-cd"), "Ab-Bc-Cd");
        assert_eq!(normalize_name("AB-BC-CD"), "Ab-Bc-Cd");
        assert_eq!(normalize_name("x-mailer"), "X-Mailer");
        assert_eq!(normalize_name("mime-version"), "MIME-Version");
        assert_eq!(normalize_name("Message-ID"), "Message-Id");
    }

    #[test]
    fn test_headers_add_keeps_duplicates() {
        let mut headers = Headers::new();
        headers.add("test-key", "first");
        headers.add("Test-Key", "second");
        headers.add("TEST-KEY", "third");
        assert_eq!(headers.get_all("test-key"), vec!["first", "second", "third"]);
        assert_eq!(headers.get("Test-Key"), Some("first"));
        assert_eq!(
            headers.to_string(),
            "Test-Key: first\r\nTest-Key: second\r\nTest-Key: third\r\n"
        );
    }

    #[test]
    fn test_headers_ignore_empty() {
        let mut headers = Headers::new();
        headers.add("Subject", "  ");
        headers.add("", "value");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_set_and_remove() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("To", "bob@example.com");
        headers.set("To", "charlie@example.com");
        assert_eq!(headers.get_all("To"), vec!["charlie@example.com"]);

        headers.remove("to");
        assert!(!headers.contains("To"));
    }

    #[test]
    fn test_headers_preserve_order() {
        let mut headers = Headers::new();
        headers.add("x-b", "2");
        headers.add("x-a", "1");
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["X-B", "X-A"]);
    }

    #[test]
    fn test_to_block() {
        let mut headers = Headers::new();
        headers.add("mime-version", "1.0");
        assert_eq!(headers.to_block(), b"MIME-Version: 1.0\r\n\r\n");
    }

    #[test]
    fn test_non_ascii_value_is_word_encoded() {
        let mut headers = Headers::new();
        headers.add("Subject", "Tere õkva!");
        assert_eq!(headers.to_string(), "Subject: =?UTF-8?Q?Tere_=C3=B5kva!?=\r\n");
    }

    #[test]
    fn test_line_breaks_are_removed() {
        let mut headers = Headers::new();
        headers.add("Subject", "tere\ntere!");
        assert_eq!(headers.to_string(), "Subject: tere tere!\r\n");
    }

    #[test]
    fn test_prepared_value_is_verbatim() {
        let mut headers = Headers::new();
        let value = format!("{}ä", "word ".repeat(20));
        headers.add_prepared("X-Raw", value.clone());
        assert_eq!(headers.to_string(), format!("X-Raw: {value}\r\n"));
    }

    #[test]
    fn test_long_line_is_folded() {
        let line = "From: a very log line, \"=?UTF-8?Q?Jaanuar_Veebruar,_M=C3=A4rts?=\" <=?UTF-8?Q?m=C3=A4rts?=@xn--mrts-loa.eu>";
        let folded = fold_line(line, MAX_LINE_LENGTH);
        assert!(folded.contains("\r\n "));
        assert_eq!(folded.replace("\r\n", ""), line);
        for physical in folded.split("\r\n") {
            assert!(physical.len() <= MAX_LINE_LENGTH);
        }
    }

    #[test]
    fn test_long_encoded_subject_stays_within_limit() {
        let subject = "Tere õhtust, see on üks väga pikk teema mis läheb kaugele ja veel kaugemale";
        let line = render_line("Subject", &HeaderValue::Text(subject.to_string()));
        assert!(line.starts_with("Subject: =?UTF-8?Q?Tere_=C3=B5htust"));
        assert!(line.contains("\r\n "));
        for physical in line.split("\r\n") {
            assert!(physical.len() <= MAX_LINE_LENGTH, "{physical} too long");
        }
    }

    #[test]
    fn test_fold_keeps_name_with_value() {
        let line = format!("Subject: {}", "x".repeat(100));
        assert_eq!(fold_line(&line, MAX_LINE_LENGTH), line);
    }

    proptest! {
        #[test]
        fn folding_is_reversible(words in prop::collection::vec("[a-zA-Z0-9=?_.-]{1,30}", 1..40)) {
            let line = format!("X-Test: {}", words.join(" "));
            let folded = fold_line(&line, MAX_LINE_LENGTH);
            prop_assert_eq!(folded.replace("\r\n", ""), line);
            for physical in folded.split("\r\n") {
                prop_assert!(physical.len() <= MAX_LINE_LENGTH);
                prop_assert!(!physical.trim().is_empty());
            }
        }
    }
}
