//! JSON message description.
//!
//! Mirrors [`MessageDescription`] and adds the external references the
//! library never sees: attachment `path`s and `href`s are read here, before
//! composition starts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mailcompose::{
    AddressInput, Alternative, Attachment, Content, Filename, HeaderInput, IcalEvent,
    MessageDescription,
};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

/// A single value or a list of values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// Single value.
    One(T),
    /// List of values.
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// Address entry: free text or a name/address pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AddressEntry {
    /// `"Name <user@example.com>"`, possibly a comma-separated list.
    Raw(String),
    /// `{"name": "Name", "address": "user@example.com"}`.
    Mailbox {
        /// Display name.
        #[serde(default)]
        name: Option<String>,
        /// Address.
        address: String,
    },
}

impl From<AddressEntry> for AddressInput {
    fn from(entry: AddressEntry) -> Self {
        match entry {
            AddressEntry::Raw(text) => Self::Raw(text),
            AddressEntry::Mailbox { name, address } => Self::Mailbox { name, address },
        }
    }
}

/// Where the bytes of a body or attachment come from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Source {
    /// Inline content.
    pub content: Option<String>,
    /// Encoding of `content` (`base64`, `hex`, ...).
    pub encoding: Option<String>,
    /// Local file to read.
    pub path: Option<PathBuf>,
    /// `data:` or `file://` URL.
    pub href: Option<String>,
    /// Pre-formatted part, emitted verbatim.
    pub raw: Option<String>,
}

/// Source resolved to content.
#[derive(Debug)]
struct Resolved {
    content: Content,
    media_type: Option<String>,
    file_name: Option<String>,
}

impl Source {
    fn resolve(self) -> Result<Resolved> {
        if let Some(raw) = self.raw {
            return Ok(Resolved {
                content: Content::Raw(raw.into_bytes()),
                media_type: None,
                file_name: None,
            });
        }

        if let Some(path) = self.path {
            return Ok(Resolved {
                content: Content::Bytes(read_file(&path)?),
                media_type: None,
                file_name: file_name(&path),
            });
        }

        if let Some(href) = self.href {
            return resolve_href(&href);
        }

        let content = match (self.content, self.encoding) {
            (Some(content), Some(encoding)) => Content::Encoded { content, encoding },
            (Some(content), None) => Content::Text(content),
            (None, _) => Content::Text(String::new()),
        };
        Ok(Resolved {
            content,
            media_type: None,
            file_name: None,
        })
    }
}

/// Text, HTML or watch HTML body.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BodyInput {
    /// Literal text.
    Text(String),
    /// Content from elsewhere.
    Source(Source),
}

impl BodyInput {
    fn into_content(self) -> Result<Content> {
        match self {
            Self::Text(text) => Ok(Content::Text(text)),
            Self::Source(source) => Ok(source.resolve()?.content),
        }
    }
}

/// Calendar event with its iTIP method.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IcalSource {
    /// Event data.
    #[serde(flatten)]
    pub source: Source,
    /// iTIP method.
    pub method: Option<String>,
}

/// Calendar event.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IcalInput {
    /// Literal iCalendar data.
    Text(String),
    /// Event with method.
    Event(IcalSource),
}

impl IcalInput {
    fn into_event(self) -> Result<IcalEvent> {
        match self {
            Self::Text(text) => Ok(IcalEvent::new(text)),
            Self::Event(event) => Ok(IcalEvent {
                content: event.source.resolve()?.content,
                method: event.method,
            }),
        }
    }
}

/// `filename` is a name, or `false` to suppress one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilenameInput {
    /// Filename.
    Name(String),
    /// `false` suppresses the filename.
    Flag(bool),
}

/// Attachment entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttachmentInput {
    /// Attachment bytes.
    #[serde(flatten)]
    pub source: Source,
    /// Filename; defaults to the name of a `path` or `file://` source.
    pub filename: Option<FilenameInput>,
    /// Content type.
    pub content_type: Option<String>,
    /// Content-ID.
    pub cid: Option<String>,
    /// Content-Disposition type.
    pub content_disposition: Option<String>,
    /// Transfer encoding.
    pub content_transfer_encoding: Option<String>,
    /// Extra part headers.
    pub headers: Map<String, Value>,
}

impl AttachmentInput {
    fn into_attachment(self) -> Result<Attachment> {
        let resolved = self.source.resolve()?;
        let filename = match self.filename {
            Some(FilenameInput::Name(name)) => Some(Filename::Name(name)),
            Some(FilenameInput::Flag(false)) => Some(Filename::Suppressed),
            Some(FilenameInput::Flag(true)) | None => resolved.file_name.map(Filename::Name),
        };

        Ok(Attachment {
            content: resolved.content,
            filename,
            content_type: self.content_type.or(resolved.media_type),
            cid: self.cid,
            content_disposition: self.content_disposition,
            content_transfer_encoding: self.content_transfer_encoding,
            headers: header_inputs(self.headers)?,
        })
    }
}

/// Extra alternative entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlternativeInput {
    /// Alternative body.
    #[serde(flatten)]
    pub source: Source,
    /// Content type.
    pub content_type: Option<String>,
    /// Transfer encoding.
    pub content_transfer_encoding: Option<String>,
    /// Extra part headers.
    pub headers: Map<String, Value>,
}

impl AlternativeInput {
    fn into_alternative(self) -> Result<Alternative> {
        let resolved = self.source.resolve()?;
        Ok(Alternative {
            content: resolved.content,
            content_type: self.content_type.or(resolved.media_type),
            content_transfer_encoding: self.content_transfer_encoding,
            headers: header_inputs(self.headers)?,
        })
    }
}

/// Complete message description as read from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageInput {
    /// Plain text body.
    pub text: Option<BodyInput>,
    /// HTML body.
    pub html: Option<BodyInput>,
    /// Watch HTML body.
    pub watch_html: Option<BodyInput>,
    /// Calendar event.
    pub ical_event: Option<IcalInput>,
    /// Attachments.
    pub attachments: Vec<AttachmentInput>,
    /// Extra alternatives.
    pub alternatives: Vec<AlternativeInput>,
    /// From.
    pub from: Option<OneOrMany<AddressEntry>>,
    /// Sender.
    pub sender: Option<OneOrMany<AddressEntry>>,
    /// To.
    pub to: Option<OneOrMany<AddressEntry>>,
    /// Cc.
    pub cc: Option<OneOrMany<AddressEntry>>,
    /// Bcc.
    pub bcc: Option<OneOrMany<AddressEntry>>,
    /// Reply-To.
    pub reply_to: Option<OneOrMany<AddressEntry>>,
    /// Subject.
    pub subject: Option<String>,
    /// In-Reply-To.
    pub in_reply_to: Option<String>,
    /// References, joined with spaces when given as a list.
    pub references: Option<OneOrMany<String>>,
    /// Extra headers in document order.
    pub headers: Map<String, Value>,
    /// Message-ID.
    pub message_id: Option<String>,
    /// Date header value.
    pub date: Option<String>,
    /// Boundary base token.
    pub base_boundary: Option<String>,
    /// Transfer encoding for the text bodies.
    pub text_encoding: Option<String>,
}

impl MessageInput {
    /// Resolves external references and converts into a description.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced file cannot be read, a URL is
    /// malformed or uses an unsupported scheme, or a header value has an
    /// unsupported shape.
    pub fn into_description(self) -> Result<MessageDescription> {
        let body = |input: Option<BodyInput>, what: &str| {
            input
                .map(BodyInput::into_content)
                .transpose()
                .with_context(|| format!("Failed to resolve {what} body"))
        };

        let attachments: Vec<Attachment> = self
            .attachments
            .into_iter()
            .enumerate()
            .map(|(i, attachment)| {
                attachment
                    .into_attachment()
                    .with_context(|| format!("Failed to resolve attachment #{}", i + 1))
            })
            .collect::<Result<_>>()?;
        let alternatives: Vec<Alternative> = self
            .alternatives
            .into_iter()
            .enumerate()
            .map(|(i, alternative)| {
                alternative
                    .into_alternative()
                    .with_context(|| format!("Failed to resolve alternative #{}", i + 1))
            })
            .collect::<Result<_>>()?;

        Ok(MessageDescription {
            text: body(self.text, "text")?,
            html: body(self.html, "html")?,
            watch_html: body(self.watch_html, "watch html")?,
            ical_event: self
                .ical_event
                .map(IcalInput::into_event)
                .transpose()
                .context("Failed to resolve calendar event")?,
            attachments,
            alternatives,
            from: addresses(self.from),
            sender: addresses(self.sender),
            to: addresses(self.to),
            cc: addresses(self.cc),
            bcc: addresses(self.bcc),
            reply_to: addresses(self.reply_to),
            subject: self.subject,
            in_reply_to: self.in_reply_to,
            references: self.references.map(|r| r.into_vec().join(" ")),
            headers: header_inputs(self.headers)?,
            message_id: self.message_id,
            date: self.date,
            base_boundary: self.base_boundary,
            text_encoding: self.text_encoding,
        })
    }
}

fn addresses(field: Option<OneOrMany<AddressEntry>>) -> Vec<AddressInput> {
    field
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(AddressInput::from)
        .collect()
}

/// Converts a JSON header object.
///
/// Strings become text values, arrays repeated lines, and
/// `{"prepared": true, "value": "..."}` a verbatim value.
fn header_inputs(headers: Map<String, Value>) -> Result<Vec<(String, HeaderInput)>> {
    let mut inputs = Vec::with_capacity(headers.len());

    for (name, value) in headers {
        let input = match value {
            Value::Null => continue,
            Value::Array(values) => HeaderInput::List(
                values
                    .into_iter()
                    .map(|value| scalar(&name, value))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(mut object) => {
                let prepared = object.get("prepared").and_then(Value::as_bool).unwrap_or(false);
                let value = object
                    .remove("value")
                    .ok_or_else(|| anyhow!("Header {name} has no value"))?;
                let value = scalar(&name, value)?;
                if prepared {
                    HeaderInput::Prepared(value)
                } else {
                    HeaderInput::Text(value)
                }
            }
            value => HeaderInput::Text(scalar(&name, value)?),
        };
        inputs.push((name, input));
    }

    Ok(inputs)
}

fn scalar(name: &str, value: Value) -> Result<String> {
    match value {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => bail!("Unsupported value for header {name}: {other}"),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

fn resolve_href(href: &str) -> Result<Resolved> {
    if href.get(..5).is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:")) {
        let (bytes, media_type) = decode_data_url(&href[5..])?;
        return Ok(Resolved {
            content: Content::Bytes(bytes),
            media_type,
            file_name: None,
        });
    }

    let url = Url::parse(href).with_context(|| format!("Invalid URL: {href}"))?;
    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|()| anyhow!("Not a local file URL: {href}"))?;
            Ok(Resolved {
                content: Content::Bytes(read_file(&path)?),
                media_type: None,
                file_name: file_name(&path),
            })
        }
        scheme => bail!("Unsupported URL scheme {scheme} in {href}"),
    }
}

/// Decodes the part of a `data:` URL after the scheme.
fn decode_data_url(rest: &str) -> Result<(Vec<u8>, Option<String>)> {
    let (meta, data) = rest
        .split_once(',')
        .context("Malformed data URL: missing ','")?;

    let (media_type, is_base64) = match meta.len().checked_sub(7) {
        Some(split) if meta.get(split..).is_some_and(|s| s.eq_ignore_ascii_case(";base64")) => {
            (&meta[..split], true)
        }
        _ => (meta, false),
    };

    let bytes: Vec<u8> = percent_decode_str(data).collect();
    let bytes = if is_base64 {
        let cleaned: Vec<u8> = bytes.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
        STANDARD
            .decode(cleaned)
            .context("Malformed data URL: invalid base64")?
    } else {
        bytes
    };

    let media_type = Some(media_type.trim())
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    Ok((bytes, media_type))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(json: &str) -> MessageDescription {
        serde_json::from_str::<MessageInput>(json)
            .unwrap()
            .into_description()
            .unwrap()
    }

    #[test]
    fn test_bodies_and_addresses() {
        let description = parse(
            r#"{
                "text": "abc",
                "html": {"content": "ZGVm", "encoding": "base64"},
                "from": "a@example.com",
                "to": ["b@example.com", {"name": "Cee", "address": "c@example.com"}],
                "references": ["<1@x>", "<2@x>"]
            }"#,
        );
        assert_eq!(description.text, Some(Content::Text("abc".to_string())));
        assert_eq!(description.html.unwrap().decode().unwrap(), b"def");
        assert_eq!(description.from, vec![AddressInput::Raw("a@example.com".to_string())]);
        assert_eq!(
            description.to[1],
            AddressInput::Mailbox {
                name: Some("Cee".to_string()),
                address: "c@example.com".to_string()
            }
        );
        assert_eq!(description.references.as_deref(), Some("<1@x> <2@x>"));
    }

    #[test]
    fn test_headers_keep_document_order() {
        let description = parse(
            r#"{"headers": {
                "X-Zeta": "z",
                "X-Alpha": ["a1", "a2"],
                "X-Raw": {"prepared": true, "value": "kept as is"},
                "X-Count": 3
            }}"#,
        );
        assert_eq!(
            description.headers,
            vec![
                ("X-Zeta".to_string(), HeaderInput::Text("z".to_string())),
                (
                    "X-Alpha".to_string(),
                    HeaderInput::List(vec!["a1".to_string(), "a2".to_string()])
                ),
                ("X-Raw".to_string(), HeaderInput::Prepared("kept as is".to_string())),
                ("X-Count".to_string(), HeaderInput::Text("3".to_string())),
            ]
        );
    }

    #[test]
    fn test_attachment_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::File::create(&path).unwrap().write_all(b"%PDF").unwrap();

        let json = serde_json::json!({ "attachments": [{ "path": path }] }).to_string();
        let description = parse(&json);
        let attachment = &description.attachments[0];
        assert_eq!(attachment.content, Content::Bytes(b"%PDF".to_vec()));
        assert_eq!(attachment.filename_str(), Some("report.pdf"));
    }

    #[test]
    fn test_attachment_from_file_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let href = Url::from_file_path(file.path()).unwrap().to_string();

        let json = serde_json::json!({ "attachments": [{ "href": href, "filename": "greeting.txt" }] }).to_string();
        let description = parse(&json);
        assert_eq!(description.attachments[0].content, Content::Bytes(b"hello".to_vec()));
        assert_eq!(description.attachments[0].filename_str(), Some("greeting.txt"));
    }

    #[test]
    fn test_attachment_from_data_url() {
        let description = parse(
            r#"{"attachments": [
                {"href": "data:text/plain;base64,dGVyZSB0ZXJl"},
                {"href": "data:,hello%20world", "filename": false}
            ]}"#,
        );
        let first = &description.attachments[0];
        assert_eq!(first.content, Content::Bytes(b"tere tere".to_vec()));
        assert_eq!(first.content_type.as_deref(), Some("text/plain"));

        let second = &description.attachments[1];
        assert_eq!(second.content, Content::Bytes(b"hello world".to_vec()));
        assert_eq!(second.content_type, None);
        assert_eq!(second.filename, Some(Filename::Suppressed));
    }

    #[test]
    fn test_unsupported_scheme() {
        let input: MessageInput =
            serde_json::from_str(r#"{"attachments": [{"href": "https://example.com/a.png"}]}"#).unwrap();
        let err = input.into_description().unwrap_err();
        assert!(format!("{err:#}").contains("Unsupported URL scheme https"));
    }

    #[test]
    fn test_missing_file() {
        let input: MessageInput =
            serde_json::from_str(r#"{"attachments": [{"path": "/nonexistent/mailcompose/file"}]}"#).unwrap();
        assert!(input.into_description().is_err());
    }

    #[test]
    fn test_raw_and_calendar() {
        let description = parse(
            r#"{
                "attachments": [{"raw": "Content-Type: text/plain\r\n\r\nhi"}],
                "icalEvent": {"content": "BEGIN:VCALENDAR", "method": "request"}
            }"#,
        );
        assert!(description.attachments[0].content.is_raw());
        assert_eq!(description.ical_event.unwrap().method(), "REQUEST");
    }

    #[test]
    fn test_composes_golden_message() {
        let description = parse(
            r#"{
                "text": "abc",
                "html": "def",
                "baseBoundary": "test",
                "messageId": "<zzzzzz>",
                "date": "Sat, 21 Jun 2014 10:52:44 +0000"
            }"#,
        );
        let message = mailcompose::compose(&description).unwrap().to_string();
        assert!(message.starts_with(
            "Content-Type: multipart/alternative; boundary=\"----mailcompose-?=_1-test\"\r\n"
        ));
        assert!(message.ends_with("def\r\n------mailcompose-?=_1-test--\r\n"));
    }
}
