//! MIME structure decisions.
//!
//! The [`Composer`] turns a [`MessageDescription`] into a [`Composition`]:
//! it normalizes addresses, encodes every body, decides how the parts nest
//! and collects the top-level headers. Nothing is written until the
//! composition is serialized.

use crate::address::{self, Envelope, NormalizedAddresses};
use crate::boundary::BoundaryGenerator;
use crate::content_type::ContentType;
use crate::description::{Alternative, Attachment, Content, HeaderInput, IcalEvent, MessageDescription};
use crate::encoding::{MAX_WORD_LENGTH, WordEncoding, encode_mime_word, has_non_ascii};
use crate::error::Result;
use crate::header::{Headers, sanitize_value};
use crate::node::{ContentNode, MultipartKind, MultipartNode, Node};
use crate::serializer::Composition;
use crate::transfer::{self, EncodingPolicy, TransferEncoding};
use chrono::Utc;
use rand::Rng;
use tracing::{debug, warn};

/// Headers the composer always generates itself.
const RESERVED_HEADERS: &[&str] = &["Content-Type", "Content-Transfer-Encoding", "MIME-Version"];

/// Composition settings.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ComposeOptions {
    /// Emit a `Bcc:` header. Bcc recipients are in the envelope either way.
    pub keep_bcc: bool,
    /// Dot-stuff the output for direct use in an SMTP `DATA` command.
    pub escape_smtp: bool,
    /// Transfer encoding auto-detection thresholds.
    pub policy: EncodingPolicy,
}

impl ComposeOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether a `Bcc:` header is emitted.
    #[must_use]
    pub const fn keep_bcc(mut self, keep_bcc: bool) -> Self {
        self.keep_bcc = keep_bcc;
        self
    }

    /// Sets whether the output is dot-stuffed.
    #[must_use]
    pub const fn escape_smtp(mut self, escape_smtp: bool) -> Self {
        self.escape_smtp = escape_smtp;
        self
    }

    /// Sets the encoding policy.
    #[must_use]
    pub const fn policy(mut self, policy: EncodingPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Builds MIME messages from descriptions.
///
/// A composer holds no per-message state and can be shared freely; every
/// call to [`Composer::compose`] gets its own boundary counter.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    options: ComposeOptions,
}

/// Part layout before boundaries are assigned.
enum Layout {
    Leaf(ContentNode),
    Group(MultipartKind, Vec<Layout>),
}

impl Layout {
    /// Wraps parts in a container; a single part is returned as is.
    fn group(kind: MultipartKind, mut parts: Vec<Self>) -> Option<Self> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Self::Group(kind, parts)),
        }
    }

    /// Converts into nodes, numbering boundaries outermost first.
    fn into_node(self, boundaries: &mut BoundaryGenerator) -> Node {
        match self {
            Self::Leaf(node) => Node::Content(node),
            Self::Group(kind, parts) => {
                let boundary = boundaries.next();
                let children = parts.into_iter().map(|part| part.into_node(boundaries)).collect();
                Node::Multipart(MultipartNode::new(kind, boundary, children))
            }
        }
    }
}

impl Composer {
    /// Creates a composer.
    #[must_use]
    pub const fn new(options: ComposeOptions) -> Self {
        Self { options }
    }

    /// Returns the options in use.
    #[must_use]
    pub const fn options(&self) -> &ComposeOptions {
        &self.options
    }

    /// Composes a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedEncoding`](crate::Error::UnsupportedEncoding)
    /// if a transfer encoding other than `7bit`, `quoted-printable` or
    /// `base64` is requested anywhere in the description. Every other
    /// problem degrades to a safe representation with a warning.
    pub fn compose(&self, description: &MessageDescription) -> Result<Composition> {
        let text_encoding = parse_encoding(description.text_encoding.as_deref())?;

        let mut alternatives = Vec::new();
        for (body, sub_type) in [
            (&description.text, "plain"),
            (&description.watch_html, "watch-html"),
            (&description.html, "html"),
        ] {
            if let Some(body) = body {
                let node = self.text_node(body, ContentType::new("text", sub_type), text_encoding);
                alternatives.push(Layout::Leaf(node));
            }
        }
        if let Some(event) = &description.ical_event {
            alternatives.push(Layout::Leaf(self.calendar_node(event)));
        }
        for alternative in &description.alternatives {
            alternatives.push(Layout::Leaf(self.alternative_node(alternative)?));
        }

        let has_html = description.html.is_some();
        let mut related = Vec::new();
        let mut mixed = Vec::new();
        for attachment in &description.attachments {
            let node = Layout::Leaf(self.attachment_node(attachment)?);
            if has_html && attachment.cid.is_some() {
                related.push(node);
            } else {
                mixed.push(node);
            }
        }

        let alternative_block = Layout::group(MultipartKind::Alternative, alternatives);
        let related_block = if related.is_empty() {
            alternative_block
        } else {
            let parts = alternative_block.into_iter().chain(related).collect();
            Layout::group(MultipartKind::Related, parts)
        };
        let root = if mixed.is_empty() {
            related_block
        } else {
            let parts = related_block.into_iter().chain(mixed).collect();
            Layout::group(MultipartKind::Mixed, parts)
        };

        let mut boundaries = description
            .base_boundary
            .as_deref()
            .map_or_else(BoundaryGenerator::from_clock, BoundaryGenerator::new);
        let root = root
            .unwrap_or_else(|| Layout::Leaf(ContentNode::empty()))
            .into_node(&mut boundaries);
        debug!(
            root = %root.content_type().essence(),
            multiparts = boundaries.current(),
            "Message structure"
        );

        let from = address::normalize(&description.from);
        let to = address::normalize(&description.to);
        let cc = address::normalize(&description.cc);
        let bcc = address::normalize(&description.bcc);
        let envelope = Envelope::new(&from, &[&to, &cc, &bcc]);
        let message_id = message_id(description.message_id.as_deref(), &from);

        let mut headers = Headers::new();
        headers.add("From", &from.header);
        headers.add("Sender", address::normalize(&description.sender).header);
        headers.add("To", &to.header);
        headers.add("Cc", &cc.header);
        if self.options.keep_bcc {
            headers.add("Bcc", &bcc.header);
        }
        headers.add("Reply-To", address::normalize(&description.reply_to).header);
        if let Some(in_reply_to) = &description.in_reply_to {
            headers.add("In-Reply-To", in_reply_to.as_str());
        }
        if let Some(references) = &description.references {
            headers.add("References", references.as_str());
        }
        if let Some(subject) = &description.subject {
            headers.add("Subject", sanitize_value(subject));
        }
        headers.add("Message-Id", message_id.as_str());
        headers.add(
            "Date",
            description
                .date
                .as_deref()
                .map_or_else(|| Utc::now().to_rfc2822(), sanitize_value),
        );
        for (name, value) in &description.headers {
            add_header_input(&mut headers, name, value);
        }

        Ok(Composition::new(
            root,
            headers,
            envelope,
            message_id,
            self.options.escape_smtp,
        ))
    }

    fn text_node(
        &self,
        body: &Content,
        content_type: ContentType,
        requested: Option<TransferEncoding>,
    ) -> ContentNode {
        if let Content::Raw(bytes) = body {
            return ContentNode::raw(content_type, bytes.clone());
        }
        let data = decode_content(body);
        let content_type = if data.is_ascii() {
            content_type
        } else {
            content_type.with_parameter("charset", "utf-8")
        };
        self.encoded_node(content_type, &data, requested, true)
    }

    fn calendar_node(&self, event: &IcalEvent) -> ContentNode {
        let content_type = ContentType::new("text", "calendar")
            .with_parameter("charset", "utf-8")
            .with_parameter("method", event.method());
        if let Content::Raw(bytes) = &event.content {
            return ContentNode::raw(content_type, bytes.clone());
        }
        self.encoded_node(content_type, &decode_content(&event.content), None, true)
    }

    fn alternative_node(&self, alternative: &Alternative) -> Result<ContentNode> {
        let requested = parse_encoding(alternative.content_transfer_encoding.as_deref())?;
        let content_type = alternative
            .content_type
            .as_deref()
            .map_or_else(|| ContentType::new("text", "plain"), parse_content_type);
        if let Content::Raw(bytes) = &alternative.content {
            return Ok(ContentNode::raw(content_type, bytes.clone()));
        }

        let data = decode_content(&alternative.content);
        let content_type = if content_type.is_text() && content_type.charset().is_none() && !data.is_ascii() {
            content_type.with_parameter("charset", "utf-8")
        } else {
            content_type
        };
        let is_text = content_type.is_textual();
        let node = self.encoded_node(content_type, &data, requested, is_text);
        Ok(node.with_headers(part_headers(&alternative.headers)))
    }

    fn attachment_node(&self, attachment: &Attachment) -> Result<ContentNode> {
        let requested = parse_encoding(attachment.content_transfer_encoding.as_deref())?;
        let filename = attachment.filename_str();
        let content_type = match (&attachment.content_type, filename) {
            (Some(content_type), _) => parse_content_type(content_type),
            (None, Some(filename)) => ContentType::from_filename(filename),
            (None, None) => ContentType::octet_stream(),
        };
        if let Content::Raw(bytes) = &attachment.content {
            return Ok(ContentNode::raw(content_type, bytes.clone()));
        }

        let data = decode_content(&attachment.content);
        let is_text = content_type.is_textual();
        let node = self.encoded_node(content_type, &data, requested, is_text);

        let mut headers = Headers::new();
        let disposition = attachment
            .content_disposition
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or("attachment");
        headers.add("Content-Disposition", disposition_value(disposition, filename));
        if let Some(cid) = &attachment.cid {
            let cid = cid.trim().trim_start_matches('<').trim_end_matches('>');
            headers.add("Content-Id", format!("<{cid}>"));
        }
        headers.extend(part_headers(&attachment.headers).iter().map(|(n, v)| (n.to_string(), v.clone())));

        Ok(node.with_headers(headers))
    }

    fn encoded_node(
        &self,
        content_type: ContentType,
        data: &[u8],
        requested: Option<TransferEncoding>,
        is_text: bool,
    ) -> ContentNode {
        let (encoding, body) = transfer::encode(data, requested, &self.options.policy, is_text);
        debug!(content_type = %content_type.essence(), %encoding, size = data.len(), "Encoded part");
        ContentNode::new(content_type, encoding, body)
    }
}

/// Composes a message with default options.
///
/// # Errors
///
/// See [`Composer::compose`].
pub fn compose(description: &MessageDescription) -> Result<Composition> {
    Composer::default().compose(description)
}

fn parse_encoding(requested: Option<&str>) -> Result<Option<TransferEncoding>> {
    requested
        .filter(|encoding| !encoding.trim().is_empty())
        .map(str::parse)
        .transpose()
}

fn parse_content_type(value: &str) -> ContentType {
    ContentType::parse(value).unwrap_or_else(|e| {
        warn!("{e}, using application/octet-stream");
        ContentType::octet_stream()
    })
}

fn decode_content(content: &Content) -> Vec<u8> {
    content.decode().unwrap_or_else(|e| {
        warn!("{e}, using the content as literal text");
        match content {
            Content::Encoded { content, .. } => content.as_bytes().to_vec(),
            Content::Text(text) => text.as_bytes().to_vec(),
            Content::Bytes(bytes) | Content::Raw(bytes) => bytes.clone(),
        }
    })
}

fn disposition_value(disposition: &str, filename: Option<&str>) -> String {
    match filename {
        Some(filename) => {
            let filename = sanitize_value(filename);
            let filename = if has_non_ascii(&filename) {
                encode_mime_word(&filename, WordEncoding::Q, MAX_WORD_LENGTH)
            } else {
                filename.replace('\\', "\\\\").replace('"', "\\\"")
            };
            format!("{disposition}; filename=\"{filename}\"")
        }
        None => disposition.to_string(),
    }
}

fn part_headers(inputs: &[(String, HeaderInput)]) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in inputs {
        add_header_input(&mut headers, name, value);
    }
    headers
}

/// Adds a caller header; names the composer generates itself are dropped.
fn add_header_input(headers: &mut Headers, name: &str, value: &HeaderInput) {
    if RESERVED_HEADERS.iter().any(|reserved| reserved.eq_ignore_ascii_case(name.trim())) {
        warn!(header = %name, "Ignoring header generated by the composer");
        return;
    }
    match value {
        HeaderInput::Text(text) => headers.add(name, text.as_str()),
        HeaderInput::List(values) => {
            for value in values {
                headers.add(name, value.as_str());
            }
        }
        HeaderInput::Prepared(value) => headers.add_prepared(name, value.as_str()),
    }
}

/// Wraps a caller supplied Message-ID in angle brackets, or generates one.
fn message_id(requested: Option<&str>, from: &NormalizedAddresses) -> String {
    let requested = requested
        .map(sanitize_value)
        .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        .filter(|id| !id.is_empty());
    if let Some(id) = requested {
        return format!("<{id}>");
    }

    let domain = from
        .envelope
        .first()
        .and_then(|address| address.rsplit_once('@'))
        .map_or("localhost", |(_, domain)| domain);
    let random = rand::thread_rng().r#gen::<u64>();
    format!("<{random:016x}-{}@{domain}>", Utc::now().timestamp_millis())
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
    use crate::Error;

    fn essence(node: &Node) -> String {
        node.content_type().essence()
    }

    fn child_types(node: &Node) -> Vec<String> {
        node.children().iter().map(essence).collect()
    }

    #[test]
    fn test_text_only_has_no_boundary() {
        let composition = compose(&MessageDescription::new().text("abc")).unwrap();
        assert_eq!(essence(composition.root()), "text/plain");
        assert!(composition.root().boundaries().is_empty());
    }

    #[test]
    fn test_alternative_order() {
        let description = MessageDescription::new()
            .html("<p>h</p>")
            .text("t")
            .watch_html("<p>w</p>")
            .ical_event(IcalEvent::new("BEGIN:VCALENDAR"));
        let composition = compose(&description).unwrap();
        assert_eq!(essence(composition.root()), "multipart/alternative");
        assert_eq!(
            child_types(composition.root()),
            vec!["text/plain", "text/watch-html", "text/html", "text/calendar"]
        );
    }

    #[test]
    fn test_calendar_content_type() {
        let event = IcalEvent {
            content: "BEGIN:VCALENDAR".into(),
            method: Some("request".to_string()),
        };
        let composition = compose(&MessageDescription::new().ical_event(event)).unwrap();
        assert_eq!(
            composition.root().content_type().to_string(),
            "text/calendar; charset=utf-8; method=REQUEST"
        );
    }

    #[test]
    fn test_non_ascii_text_gets_charset() {
        let composition = compose(&MessageDescription::new().text("tere õkva")).unwrap();
        assert_eq!(composition.root().content_type().charset(), Some("utf-8"));
    }

    #[test]
    fn test_related_requires_html() {
        let inline = Attachment::new("img").filename("a.png").cid("logo");

        let with_html = MessageDescription::new().text("t").html("<img src=cid:logo>").attach(inline.clone());
        let composition = compose(&with_html).unwrap();
        assert_eq!(essence(composition.root()), "multipart/related");
        assert_eq!(child_types(composition.root()), vec!["multipart/alternative", "image/png"]);

        let text_only = MessageDescription::new().text("t").attach(inline);
        let composition = compose(&text_only).unwrap();
        assert_eq!(essence(composition.root()), "multipart/mixed");
        assert_eq!(child_types(composition.root()), vec!["text/plain", "image/png"]);
    }

    #[test]
    fn test_mixed_wraps_related() {
        let description = MessageDescription::new()
            .html("<img src=cid:logo>")
            .attach(Attachment::new("a").filename("a.txt"))
            .attach(Attachment::new("img").filename("a.png").cid("logo"));
        let composition = compose(&description).unwrap();
        let root = composition.root();
        assert_eq!(essence(root), "multipart/mixed");
        assert_eq!(child_types(root), vec!["multipart/related", "text/plain"]);
        assert_eq!(child_types(&root.children()[0]), vec!["text/html", "image/png"]);
    }

    #[test]
    fn test_boundaries_assigned_outermost_first() {
        let description = MessageDescription::new()
            .text("t")
            .html("h")
            .attach(Attachment::new("a"))
            .base_boundary("test");
        let composition = compose(&description).unwrap();
        assert_eq!(
            composition.root().boundaries(),
            vec!["----mailcompose-?=_1-test", "----mailcompose-?=_2-test"]
        );
    }

    #[test]
    fn test_single_attachment_is_root() {
        let description = MessageDescription::new().attach(Attachment::new("abc").filename("a.txt"));
        let composition = compose(&description).unwrap();
        let root = composition.root();
        assert_eq!(essence(root), "text/plain");
        let Node::Content(node) = root else {
            panic!("expected a content node");
        };
        assert_eq!(
            node.headers.get("Content-Disposition"),
            Some("attachment; filename=\"a.txt\"")
        );
    }

    #[test]
    fn test_empty_message() {
        let composition = compose(&MessageDescription::new()).unwrap();
        let Node::Content(node) = composition.root() else {
            panic!("expected a content node");
        };
        assert_eq!(node.content_type.essence(), "text/plain");
        assert!(node.body.is_empty());
    }

    #[test]
    fn test_attachment_headers() {
        let attachment = Attachment::new("x")
            .filename("õun.txt")
            .content_type("text/plain")
            .cid("<abc@def>")
            .disposition("inline")
            .header("X-Tag", vec!["one".to_string(), "two".to_string()]);
        let composition = compose(&MessageDescription::new().attach(attachment)).unwrap();
        let Node::Content(node) = composition.root() else {
            panic!("expected a content node");
        };
        assert_eq!(
            node.headers.get("Content-Disposition"),
            Some("inline; filename=\"=?UTF-8?Q?=C3=B5un=2Etxt?=\"")
        );
        assert_eq!(node.headers.get("Content-Id"), Some("<abc@def>"));
        assert_eq!(node.headers.get_all("X-Tag"), vec!["one", "two"]);
    }

    #[test]
    fn test_suppressed_filename() {
        let attachment = Attachment::new("x").filename("a.txt").no_filename();
        let composition = compose(&MessageDescription::new().attach(attachment)).unwrap();
        let Node::Content(node) = composition.root() else {
            panic!("expected a content node");
        };
        assert_eq!(node.content_type.essence(), "application/octet-stream");
        assert_eq!(node.headers.get("Content-Disposition"), Some("attachment"));
    }

    #[test]
    fn test_invalid_content_type_degrades() {
        let attachment = Attachment::new("x").content_type("nonsense");
        let composition = compose(&MessageDescription::new().attach(attachment)).unwrap();
        assert_eq!(essence(composition.root()), "application/octet-stream");
    }

    #[test]
    fn test_unsupported_encoding_is_fatal() {
        let description = MessageDescription::new().text("abc").text_encoding("8bit");
        assert!(matches!(compose(&description), Err(Error::UnsupportedEncoding(_))));

        let description = MessageDescription::new().attach(Attachment::new("x").transfer_encoding("uuencode"));
        assert!(matches!(compose(&description), Err(Error::UnsupportedEncoding(_))));
    }

    #[test]
    fn test_text_encoding_forced() {
        let description = MessageDescription::new().text("abc").text_encoding("base64");
        let composition = compose(&description).unwrap();
        let Node::Content(node) = composition.root() else {
            panic!("expected a content node");
        };
        assert_eq!(node.transfer_encoding, Some(TransferEncoding::Base64));
        assert_eq!(node.body, b"YWJj");
    }

    #[test]
    fn test_message_id() {
        let from = NormalizedAddresses {
            header: String::new(),
            envelope: vec!["a@example.com".to_string()],
        };
        assert_eq!(message_id(Some("abc@def"), &from), "<abc@def>");
        assert_eq!(message_id(Some("<abc@def>"), &from), "<abc@def>");
        let generated = message_id(None, &from);
        assert!(generated.starts_with('<'));
        assert!(generated.ends_with("@example.com>"));
        assert!(message_id(None, &NormalizedAddresses::default()).ends_with("@localhost>"));
    }

    #[test]
    fn test_reserved_headers_are_ignored() {
        let description = MessageDescription::new()
            .text("abc")
            .header("content-type", "text/html")
            .header("X-Mailer", "test");
        let composition = compose(&description).unwrap();
        assert!(!composition.headers().contains("Content-Type"));
        assert_eq!(composition.headers().get("X-Mailer"), Some("test"));
    }

    #[test]
    fn test_reserved_part_headers_are_ignored() {
        let attachment = Attachment::new("a")
            .filename("a.txt")
            .header("Content-Type", "text/html")
            .header("content-transfer-encoding", "base64")
            .header("X-Tag", "kept");
        let mut alternative = Alternative::new("b", "text/x-custom");
        alternative.headers.push(("MIME-Version".to_string(), "2.0".into()));
        let description = MessageDescription::new()
            .text("t")
            .alternative(alternative)
            .attach(attachment);
        let composition = compose(&description).unwrap();

        let attachment = &composition.root().children()[1];
        let headers = attachment.part_headers();
        assert_eq!(headers.get_all("Content-Type"), vec!["text/plain"]);
        assert_eq!(headers.get_all("Content-Transfer-Encoding"), vec!["7bit"]);
        assert_eq!(headers.get("X-Tag"), Some("kept"));

        let alternative = &composition.root().children()[0].children()[1];
        assert!(!alternative.part_headers().contains("MIME-Version"));
    }
}
