//! Address normalization and the SMTP envelope.
//!
//! Turns human-entered address lists into the form used in header lines
//! (punycode domains, RFC 2047 encoded display names) and into bare
//! envelope addresses for the transport.

use crate::description::AddressInput;
use crate::encoding::{MAX_WORD_LENGTH, WordEncoding, encode_mime_word, encode_mime_word_after, has_non_ascii};
use crate::error::{Error, Result};
use crate::header::sanitize_value;
use tracing::warn;

/// Longest address field prefix (`Reply-To: `); an entry may start right
/// after it.
const FIELD_PREFIX_LENGTH: usize = "Reply-To: ".len();

/// Display name plus address, as parsed from an address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (optional).
    pub name: Option<String>,
    /// Address in `local@domain` form.
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox with just an address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Creates a mailbox with a display name and address.
    #[must_use]
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Parses a single list entry such as `"Name" <user@host>`,
    /// `Name <user@host>`, `<user@host>`, `user@host (Name)` or `user@host`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddressSyntax`] if no `local@domain` address
    /// can be found in the entry.
    pub fn parse(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        let invalid = || Error::InvalidAddressSyntax(entry.to_string());

        let (name, address) = if let Some(open) = find_unquoted(entry, '<') {
            let rest = &entry[open + 1..];
            let close = rest.find('>').ok_or_else(invalid)?;
            let name = strip_comments(&entry[..open]);
            (unquote(name.trim()), rest[..close].trim().to_string())
        } else {
            let comment = extract_comment(entry);
            let plain = strip_comments(entry);
            let mut address = None;
            let mut name_words = Vec::new();
            for word in plain.split_whitespace() {
                if address.is_none() && word.contains('@') {
                    address = Some(word.to_string());
                } else {
                    name_words.push(word);
                }
            }
            let name = if name_words.is_empty() {
                comment.unwrap_or_default()
            } else {
                unquote(&name_words.join(" "))
            };
            (name, address.ok_or_else(invalid)?)
        };

        let valid = address
            .rsplit_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
        if !valid {
            return Err(invalid());
        }

        Ok(Self {
            name: (!name.is_empty()).then_some(name),
            address,
        })
    }

    /// Address with a punycode domain, for the envelope.
    #[must_use]
    pub fn envelope_address(&self) -> String {
        to_punycode(&self.address)
    }

    /// Canonical header form: `"Name" <addr>`, `=?UTF-8?Q?…?= <addr>` or `addr`.
    ///
    /// Non-ASCII local parts become encoded words and non-ASCII domains
    /// punycode, so the result is always 7-bit.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let address = match self.address.rsplit_once('@') {
            Some((local, _)) => {
                let local = encode_mime_word(local, WordEncoding::Q, MAX_WORD_LENGTH);
                let domain = punycode_domain(&self.address);
                format!("{local}@{domain}")
            }
            None => self.address.clone(),
        };

        match self.name.as_deref().map(str::trim) {
            None | Some("") => address,
            Some(name) if has_non_ascii(name) => {
                let encoded = encode_mime_word_after(name, WordEncoding::Q, MAX_WORD_LENGTH, FIELD_PREFIX_LENGTH);
                format!("{encoded} <{address}>")
            }
            Some(name) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\" <{address}>")
            }
        }
    }
}

/// Addresses resolved for one header field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedAddresses {
    /// Comma-separated header value; empty when there is nothing to emit.
    pub header: String,
    /// Bare envelope addresses, in input order.
    pub envelope: Vec<String>,
}

impl NormalizedAddresses {
    /// Returns true if the field produced no header value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }
}

/// Normalizes a list of address inputs for one header field.
///
/// Entries that cannot be parsed are passed through to the header value
/// with control characters removed (non-ASCII text as encoded words), and
/// left out of the envelope.
#[must_use]
pub fn normalize(inputs: &[AddressInput]) -> NormalizedAddresses {
    let mut values = Vec::new();
    let mut envelope = Vec::new();

    for input in inputs {
        let mailboxes: Vec<std::result::Result<Mailbox, (Error, String)>> = match input {
            AddressInput::Mailbox { name, address } => {
                let mailbox = Mailbox {
                    name: name.as_deref().map(sanitize_value),
                    address: sanitize_value(address).trim().to_string(),
                };
                vec![Ok(mailbox)]
            }
            AddressInput::Raw(text) => split_list(&sanitize_value(text))
                .into_iter()
                .map(|entry| Mailbox::parse(&entry).map_err(|e| (e, entry)))
                .collect(),
        };

        for mailbox in mailboxes {
            match mailbox {
                Ok(mailbox) if mailbox.address.contains('@') => {
                    values.push(mailbox.to_header_value());
                    envelope.push(mailbox.envelope_address());
                }
                Ok(mailbox) => {
                    warn!("Passing through address without domain: {}", mailbox.address);
                    values.push(pass_through(&mailbox.address));
                }
                Err((e, entry)) => {
                    warn!("{e}, passing it through unchanged");
                    values.push(pass_through(&entry));
                }
            }
        }
    }

    NormalizedAddresses {
        header: values.join(", "),
        envelope,
    }
}

/// Header form of an entry that is not an address.
fn pass_through(entry: &str) -> String {
    encode_mime_word_after(entry.trim(), WordEncoding::Q, MAX_WORD_LENGTH, FIELD_PREFIX_LENGTH)
}

/// Converts the domain part of an address to punycode.
///
/// Addresses with an ASCII domain are returned unchanged.
#[must_use]
pub fn to_punycode(address: &str) -> String {
    match address.rsplit_once('@') {
        Some((local, _)) => format!("{local}@{}", punycode_domain(address)),
        None => address.to_string(),
    }
}

fn punycode_domain(address: &str) -> String {
    let domain = address.rsplit_once('@').map_or(address, |(_, domain)| domain);
    if !has_non_ascii(domain) {
        return domain.to_string();
    }
    idna::domain_to_ascii(domain).unwrap_or_else(|e| {
        warn!("Failed to convert domain {domain} to punycode: {e:?}");
        encode_mime_word(domain, WordEncoding::Q, MAX_WORD_LENGTH)
    })
}

/// Splits an address list into entries at top-level commas and semicolons.
///
/// Separators inside quotes, angle brackets and comments are ignored.
/// Group syntax (`Team: a@b, c@d;`) is flattened into its members.
#[must_use]
pub fn split_list(input: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut escaped = false;
    let mut angle = 0usize;
    let mut paren = 0usize;

    for ch in input.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quote || paren > 0 => {
                escaped = true;
                current.push(ch);
            }
            '"' if paren == 0 => {
                in_quote = !in_quote;
                current.push(ch);
            }
            '(' if !in_quote => {
                paren += 1;
                current.push(ch);
            }
            ')' if !in_quote && paren > 0 => {
                paren -= 1;
                current.push(ch);
            }
            '<' if !in_quote && paren == 0 => {
                angle += 1;
                current.push(ch);
            }
            '>' if !in_quote && paren == 0 && angle > 0 => {
                angle -= 1;
                current.push(ch);
            }
            ',' | ';' if !in_quote && paren == 0 && angle == 0 => {
                push_entry(&mut entries, &mut current);
            }
            ':' if !in_quote && paren == 0 && angle == 0 && !current.contains('@') => {
                // Group display name
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_entry(&mut entries, &mut current);

    entries
}

fn push_entry(entries: &mut Vec<String>, current: &mut String) {
    let entry = current.trim();
    if !entry.is_empty() {
        entries.push(entry.to_string());
    }
    current.clear();
}

/// Finds `needle` outside of a quoted string.
fn find_unquoted(text: &str, needle: char) -> Option<usize> {
    let mut in_quote = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' && in_quote {
            escaped = true;
        } else if ch == '"' {
            in_quote = !in_quote;
        } else if ch == needle && !in_quote {
            return Some(i);
        }
    }
    None
}

/// Removes `(comments)` outside of quoted strings.
fn strip_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            escaped = false;
            if depth == 0 {
                result.push(ch);
            }
            continue;
        }
        match ch {
            '\\' if in_quote => {
                escaped = true;
                result.push(ch);
            }
            '"' if depth == 0 => {
                in_quote = !in_quote;
                result.push(ch);
            }
            '(' if !in_quote => depth += 1,
            ')' if !in_quote && depth > 0 => depth -= 1,
            _ if depth == 0 => result.push(ch),
            _ => {}
        }
    }
    result
}

/// Returns the text of the first top-level comment.
fn extract_comment(text: &str) -> Option<String> {
    let start = find_unquoted(text, '(')?;
    let end = text[start..].find(')')? + start;
    let comment = text[start + 1..end].trim();
    (!comment.is_empty()).then(|| comment.to_string())
}

/// Removes surrounding double quotes and backslash escapes.
fn unquote(text: &str) -> String {
    let text = text.trim();
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);

    let mut result = String::with_capacity(inner.len());
    let mut escaped = false;
    for ch in inner.chars() {
        if escaped || ch != '\\' {
            result.push(ch);
            escaped = false;
        } else {
            escaped = true;
        }
    }
    result.trim().to_string()
}

/// Addresses handed to the transport; never serialized into the message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Envelope {
    /// Sender: the first `From` address, if any.
    pub from: Option<String>,
    /// Recipients from To, Cc and Bcc in that order, without duplicates.
    pub to: Vec<String>,
}

impl Envelope {
    /// Builds an envelope from normalized address fields.
    #[must_use]
    pub fn new(from: &NormalizedAddresses, recipients: &[&NormalizedAddresses]) -> Self {
        let mut to: Vec<String> = Vec::new();
        for address in recipients.iter().flat_map(|field| &field.envelope) {
            if !to.contains(address) {
                to.push(address.clone());
            }
        }

        Self {
            from: from.envelope.first().cloned(),
            to,
        }
    }
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

    fn raw(text: &str) -> Vec<AddressInput> {
        vec![AddressInput::Raw(text.to_string())]
    }

    #[test]
    fn test_punycode() {
        assert_eq!(to_punycode("andris@age.ee"), "andris@age.ee");
        assert_eq!(to_punycode("andris@äge.ee"), "andris@xn--ge-uia.ee");
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            Mailbox::parse("aavik <aavik@node.ee>").unwrap(),
            Mailbox::with_name("aavik", "aavik@node.ee")
        );
        assert_eq!(Mailbox::parse("<aavik@node.ee>").unwrap(), Mailbox::new("aavik@node.ee"));
        assert_eq!(Mailbox::parse("aavik@node.ee").unwrap(), Mailbox::new("aavik@node.ee"));
        assert_eq!(
            Mailbox::parse("aavik@node.ee (Aavik)").unwrap(),
            Mailbox::with_name("Aavik", "aavik@node.ee")
        );
        assert_eq!(
            Mailbox::parse("\"Node, \\\"Master\\\"\" <node@node.ee>").unwrap(),
            Mailbox::with_name("Node, \"Master\"", "node@node.ee")
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            Mailbox::parse("not an address"),
            Err(Error::InvalidAddressSyntax(_))
        ));
        assert!(Mailbox::parse("<missing-domain@>").is_err());
        assert!(Mailbox::parse("Name <unterminated@node.ee").is_err());
    }

    #[test]
    fn test_split_list() {
        let entries = split_list("<aavik@märts.eu>, juulius@node.ee, \"Node, Master\" <node@node.ee>");
        assert_eq!(
            entries,
            vec!["<aavik@märts.eu>", "juulius@node.ee", "\"Node, Master\" <node@node.ee>"]
        );
    }

    #[test]
    fn test_split_group() {
        let entries = split_list("Team: a@example.com, b@example.com;, c@example.com");
        assert_eq!(entries, vec!["a@example.com", "b@example.com", "c@example.com"]);
    }

    #[test]
    fn test_normalize_unicode() {
        let normalized = normalize(&raw("\"Jaanuar Veebruar, Märts\" <märts@märts.eu>"));
        assert_eq!(
            normalized.header,
            "=?UTF-8?Q?Jaanuar_Veebruar=2C_M=C3=A4rts?= <=?UTF-8?Q?m=C3=A4rts?=@xn--mrts-loa.eu>"
        );
        assert_eq!(normalized.envelope, vec!["märts@xn--mrts-loa.eu"]);
        assert!(normalized.header.is_ascii());
    }

    #[test]
    fn test_normalize_mixed_valid_and_invalid() {
        let normalized = normalize(&raw("alice@example.com, Jõgi"));
        assert_eq!(normalized.header, "alice@example.com, =?UTF-8?Q?J=C3=B5gi?=");
        assert_eq!(normalized.envelope, vec!["alice@example.com"]);

        let normalized = normalize(&raw("not an address, bob@example.com"));
        assert_eq!(normalized.header, "not an address, bob@example.com");
        assert_eq!(normalized.envelope, vec!["bob@example.com"]);
    }

    #[test]
    fn test_long_unicode_name_fits_after_field_name() {
        let name = "Väga Pika Nimega Inimene, kelle nimi ei mahu ühele reale ära";
        let normalized = normalize(&[AddressInput::Mailbox {
            name: Some(name.to_string()),
            address: "pikk@example.com".to_string(),
        }]);
        let first_word = normalized.header.split(' ').next().unwrap();
        assert!("Reply-To: ".len() + first_word.len() <= 76);
        assert!(normalized.header.ends_with(" <pikk@example.com>"));
        assert!(normalized.header.is_ascii());
    }

    #[test]
    fn test_normalize_ascii_forms() {
        assert_eq!(normalize(&raw("aavik <aavik@node.ee>")).header, "\"aavik\" <aavik@node.ee>");
        assert_eq!(normalize(&raw("<aavik@node.ee>")).header, "aavik@node.ee");
        assert_eq!(normalize(&raw("<aavik@märts.eu>")).header, "aavik@xn--mrts-loa.eu");
    }

    #[test]
    fn test_normalize_multiple() {
        let normalized = normalize(&raw(
            "<aavik@märts.eu>, juulius@node.ee, \"Node, Master\" <node@node.ee>",
        ));
        assert_eq!(
            normalized.header,
            "aavik@xn--mrts-loa.eu, juulius@node.ee, \"Node, Master\" <node@node.ee>"
        );
        assert_eq!(
            normalized.envelope,
            vec!["aavik@xn--mrts-loa.eu", "juulius@node.ee", "node@node.ee"]
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for canonical in ["aavik@node.ee", "\"aavik\" <aavik@node.ee>", "\"Node, Master\" <node@node.ee>"] {
            let once = normalize(&raw(canonical)).header;
            assert_eq!(once, canonical);
            assert_eq!(normalize(&raw(&once)).header, canonical);
        }
    }

    #[test]
    fn test_normalize_structured_mailbox() {
        let normalized = normalize(&[AddressInput::Mailbox {
            name: Some("Jõgi".to_string()),
            address: "jogi@example.com".to_string(),
        }]);
        assert_eq!(normalized.header, "=?UTF-8?Q?J=C3=B5gi?= <jogi@example.com>");
        assert_eq!(normalized.envelope, vec!["jogi@example.com"]);
    }

    #[test]
    fn test_normalize_invalid_passes_through() {
        let normalized = normalize(&raw("undisclosed-recipients\n"));
        assert_eq!(normalized.header, "undisclosed-recipients");
        assert!(normalized.envelope.is_empty());
    }

    #[test]
    fn test_normalize_strips_line_breaks() {
        let normalized = normalize(&raw("Line\r\nBreak <lb@example.com>"));
        assert_eq!(normalized.header, "\"Line Break\" <lb@example.com>");
    }

    #[test]
    fn test_envelope() {
        let from = normalize(&raw("\"Jaanuar Veebruar, Märts\" <märts@märts.eu>, karu@ahven.ee"));
        let to = normalize(&raw("<aavik@märts.eu>, juulius@node.ee"));
        let cc = normalize(&raw("\"Node, Master\" <node@node.ee>, juulius@node.ee"));
        let envelope = Envelope::new(&from, &[&to, &cc]);

        assert_eq!(envelope.from.as_deref(), Some("märts@xn--mrts-loa.eu"));
        assert_eq!(
            envelope.to,
            vec!["aavik@xn--mrts-loa.eu", "juulius@node.ee", "node@node.ee"]
        );
    }
}
