//! Declarative message description.
//!
//! A [`MessageDescription`] says what a message contains; the
//! [`Composer`](crate::Composer) decides how it is laid out as MIME.

use crate::encoding::{decode_base64, decode_hex};
use crate::error::{Error, Result};

/// Body of a text part, alternative or attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// UTF-8 text.
    Text(String),
    /// Arbitrary bytes.
    Bytes(Vec<u8>),
    /// Text carrying bytes in a declared source encoding
    /// (`base64`, `hex`, or `utf-8`/`binary`/`ascii` for literal text).
    Encoded {
        /// Encoded payload.
        content: String,
        /// Source encoding name.
        encoding: String,
    },
    /// Pre-formatted part (headers, blank line and body) emitted verbatim.
    Raw(Vec<u8>),
}

impl Content {
    /// Decodes the content into the bytes it stands for.
    ///
    /// # Errors
    ///
    /// Returns an error if an [`Content::Encoded`] payload does not match its
    /// declared encoding, or the encoding is unknown.
    pub fn decode(&self) -> Result<Vec<u8>> {
        match self {
            Self::Text(text) => Ok(text.as_bytes().to_vec()),
            Self::Bytes(bytes) | Self::Raw(bytes) => Ok(bytes.clone()),
            Self::Encoded { content, encoding } => {
                match encoding.trim().to_lowercase().as_str() {
                    "base64" => decode_base64(content),
                    "hex" => decode_hex(content),
                    "" | "utf-8" | "utf8" | "binary" | "ascii" | "latin1" => {
                        Ok(content.as_bytes().to_vec())
                    }
                    other => Err(Error::InvalidEncoding(format!(
                        "Unknown source encoding: {other}"
                    ))),
                }
            }
        }
    }

    /// Returns true for pass-through content.
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    /// Converts the content into pass-through content.
    #[must_use]
    pub fn into_raw(self) -> Self {
        match self {
            Self::Text(text) => Self::Raw(text.into_bytes()),
            Self::Bytes(bytes) => Self::Raw(bytes),
            Self::Encoded { content, .. } => Self::Raw(content.into_bytes()),
            raw @ Self::Raw(_) => raw,
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// One entry of an address field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressInput {
    /// Human-entered text, possibly a comma-separated list.
    Raw(String),
    /// Already separated display name and address.
    Mailbox {
        /// Display name.
        name: Option<String>,
        /// Address in `local@domain` form.
        address: String,
    },
}

impl From<&str> for AddressInput {
    fn from(text: &str) -> Self {
        Self::Raw(text.to_string())
    }
}

impl From<String> for AddressInput {
    fn from(text: String) -> Self {
        Self::Raw(text)
    }
}

/// Value of a caller-supplied header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderInput {
    /// Single value, word-encoded if non-ASCII.
    Text(String),
    /// Several values, each emitted as its own header line.
    List(Vec<String>),
    /// Value inserted verbatim, skipping encoding and folding.
    Prepared(String),
}

impl From<&str> for HeaderInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for HeaderInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for HeaderInput {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

/// Attachment filename setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filename {
    /// Filename used in Content-Disposition and for content type lookup.
    Name(String),
    /// Explicitly no filename, even if one could be derived.
    Suppressed,
}

/// A file or inline resource attached to the message.
///
/// Attachments with a `cid` are placed next to the HTML body in a
/// `multipart/related` block when the message has HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment body.
    pub content: Content,
    /// Filename, if any.
    pub filename: Option<Filename>,
    /// Explicit content type; derived from the filename when absent.
    pub content_type: Option<String>,
    /// Content-ID without angle brackets.
    pub cid: Option<String>,
    /// Content-Disposition override (default `attachment`).
    pub content_disposition: Option<String>,
    /// Transfer encoding override.
    pub content_transfer_encoding: Option<String>,
    /// Extra part headers.
    pub headers: Vec<(String, HeaderInput)>,
}

impl Attachment {
    /// Creates an attachment from its content.
    #[must_use]
    pub fn new(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            filename: None,
            content_type: None,
            cid: None,
            content_disposition: None,
            content_transfer_encoding: None,
            headers: Vec::new(),
        }
    }

    /// Sets the filename.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(Filename::Name(filename.into()));
        self
    }

    /// Suppresses the filename.
    #[must_use]
    pub fn no_filename(mut self) -> Self {
        self.filename = Some(Filename::Suppressed);
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the Content-ID, making this an inline resource.
    #[must_use]
    pub fn cid(mut self, cid: impl Into<String>) -> Self {
        self.cid = Some(cid.into());
        self
    }

    /// Overrides the Content-Disposition type.
    #[must_use]
    pub fn disposition(mut self, disposition: impl Into<String>) -> Self {
        self.content_disposition = Some(disposition.into());
        self
    }

    /// Overrides the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_transfer_encoding = Some(encoding.into());
        self
    }

    /// Adds an extra part header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderInput>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Marks the content as pre-formatted.
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.content = self.content.into_raw();
        self
    }

    /// Filename to use, unless suppressed or missing.
    #[must_use]
    pub fn filename_str(&self) -> Option<&str> {
        match &self.filename {
            Some(Filename::Name(name)) if !name.trim().is_empty() => Some(name),
            _ => None,
        }
    }
}

/// Extra alternative rendering, appended after the built-in ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    /// Body.
    pub content: Content,
    /// Content type (default `text/plain`).
    pub content_type: Option<String>,
    /// Transfer encoding override.
    pub content_transfer_encoding: Option<String>,
    /// Extra part headers.
    pub headers: Vec<(String, HeaderInput)>,
}

impl Alternative {
    /// Creates an alternative with the given content type.
    #[must_use]
    pub fn new(content: impl Into<Content>, content_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: Some(content_type.into()),
            content_transfer_encoding: None,
            headers: Vec::new(),
        }
    }
}

/// Calendar event rendered as a `text/calendar` alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcalEvent {
    /// iCalendar data.
    pub content: Content,
    /// iTIP method (default `PUBLISH`).
    pub method: Option<String>,
}

impl IcalEvent {
    /// Creates an event with the default method.
    #[must_use]
    pub fn new(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            method: None,
        }
    }

    /// Uppercased method name.
    #[must_use]
    pub fn method(&self) -> String {
        self.method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("PUBLISH")
            .to_uppercase()
    }
}

/// Everything a message is composed from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDescription {
    /// Plain text body.
    pub text: Option<Content>,
    /// HTML body.
    pub html: Option<Content>,
    /// HTML variant for smart watches.
    pub watch_html: Option<Content>,
    /// Calendar event.
    pub ical_event: Option<IcalEvent>,
    /// Attachments, in order.
    pub attachments: Vec<Attachment>,
    /// Extra alternatives, in order.
    pub alternatives: Vec<Alternative>,
    /// From field.
    pub from: Vec<AddressInput>,
    /// Sender field.
    pub sender: Vec<AddressInput>,
    /// To field.
    pub to: Vec<AddressInput>,
    /// Cc field.
    pub cc: Vec<AddressInput>,
    /// Bcc field.
    pub bcc: Vec<AddressInput>,
    /// Reply-To field.
    pub reply_to: Vec<AddressInput>,
    /// Subject.
    pub subject: Option<String>,
    /// In-Reply-To value.
    pub in_reply_to: Option<String>,
    /// References value.
    pub references: Option<String>,
    /// Extra top-level headers, in order.
    pub headers: Vec<(String, HeaderInput)>,
    /// Message-ID, with or without angle brackets.
    pub message_id: Option<String>,
    /// Date header value.
    pub date: Option<String>,
    /// Fixed base token for boundaries.
    pub base_boundary: Option<String>,
    /// Transfer encoding forced on text, HTML and watch HTML bodies.
    pub text_encoding: Option<String>,
}

impl MessageDescription {
    /// Creates an empty description.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<Content>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html(mut self, html: impl Into<Content>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Sets the watch HTML body.
    #[must_use]
    pub fn watch_html(mut self, html: impl Into<Content>) -> Self {
        self.watch_html = Some(html.into());
        self
    }

    /// Sets the calendar event.
    #[must_use]
    pub fn ical_event(mut self, event: IcalEvent) -> Self {
        self.ical_event = Some(event);
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Adds an alternative.
    #[must_use]
    pub fn alternative(mut self, alternative: Alternative) -> Self {
        self.alternatives.push(alternative);
        self
    }

    /// Adds a From entry.
    #[must_use]
    pub fn from(mut self, address: impl Into<AddressInput>) -> Self {
        self.from.push(address.into());
        self
    }

    /// Adds a To entry.
    #[must_use]
    pub fn to(mut self, address: impl Into<AddressInput>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Adds a Cc entry.
    #[must_use]
    pub fn cc(mut self, address: impl Into<AddressInput>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Adds a Bcc entry.
    #[must_use]
    pub fn bcc(mut self, address: impl Into<AddressInput>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Adds a Reply-To entry.
    #[must_use]
    pub fn reply_to(mut self, address: impl Into<AddressInput>) -> Self {
        self.reply_to.push(address.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds an extra top-level header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderInput>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the Message-ID.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Sets the Date header value.
    #[must_use]
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Fixes the boundary base token.
    #[must_use]
    pub fn base_boundary(mut self, base: impl Into<String>) -> Self {
        self.base_boundary = Some(base.into());
        self
    }

    /// Forces a transfer encoding for the text bodies.
    #[must_use]
    pub fn text_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.text_encoding = Some(encoding.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encoded_base64() {
        let content = Content::Encoded {
            content: "dGVyZSB0ZXJl".to_string(),
            encoding: "base64".to_string(),
        };
        assert_eq!(content.decode().unwrap(), b"tere tere");
    }

    #[test]
    fn test_decode_unknown_encoding() {
        let content = Content::Encoded {
            content: "abc".to_string(),
            encoding: "rot13".to_string(),
        };
        assert!(matches!(content.decode(), Err(Error::InvalidEncoding(_))));
    }

    #[test]
    fn test_into_raw() {
        assert_eq!(Content::from("abc").into_raw(), Content::Raw(b"abc".to_vec()));
        assert!(Attachment::new("x").raw().content.is_raw());
    }

    #[test]
    fn test_filename_suppressed() {
        let attachment = Attachment::new("x").filename("a.txt").no_filename();
        assert_eq!(attachment.filename_str(), None);
        assert_eq!(Attachment::new("x").filename("a.txt").filename_str(), Some("a.txt"));
    }

    #[test]
    fn test_ical_method() {
        assert_eq!(IcalEvent::new("x").method(), "PUBLISH");
        let event = IcalEvent {
            content: "x".into(),
            method: Some("request".to_string()),
        };
        assert_eq!(event.method(), "REQUEST");
    }
}
