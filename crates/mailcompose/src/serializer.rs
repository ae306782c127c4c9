//! Streaming serialization of a composed message.
//!
//! [`Composition::chunks`] walks the part tree depth-first and yields the
//! message as a sequence of byte chunks. Bodies are borrowed from the tree,
//! so pulling the whole message never holds more than one copy of it.

use crate::address::Envelope;
use crate::error::Result;
use crate::header::Headers;
use crate::node::Node;
use std::borrow::Cow;
use std::fmt;
use std::io::Write;

/// A composed message, ready to be serialized any number of times.
#[derive(Debug, Clone)]
pub struct Composition {
    root: Node,
    headers: Headers,
    envelope: Envelope,
    message_id: String,
    escape_smtp: bool,
}

impl Composition {
    pub(crate) const fn new(
        root: Node,
        headers: Headers,
        envelope: Envelope,
        message_id: String,
        escape_smtp: bool,
    ) -> Self {
        Self {
            root,
            headers,
            envelope,
            message_id,
            escape_smtp,
        }
    }

    /// Root of the part tree.
    #[must_use]
    pub const fn root(&self) -> &Node {
        &self.root
    }

    /// Message-level headers (addresses, subject, Message-Id, Date and
    /// caller headers), without the root part's own headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Transport envelope.
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Message-ID header value, including angle brackets.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Complete header block of the message.
    ///
    /// The root part's Content-Type comes first, then the message-level
    /// headers, the root's remaining part headers and `MIME-Version`.
    #[must_use]
    pub fn message_headers(&self) -> Headers {
        let mut headers = Headers::new();
        let raw = self.root.is_raw();
        if !raw {
            headers.add("Content-Type", self.root.content_type().to_string());
        }
        headers.extend(self.headers.iter().map(|(n, v)| (n.to_string(), v.clone())));
        if !raw {
            headers.extend(self.root.trailing_headers().iter().map(|(n, v)| (n.to_string(), v.clone())));
        }
        headers.add("MIME-Version", "1.0");
        headers
    }

    /// Returns a lazy iterator over the serialized message.
    #[must_use]
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            composition: self,
            stack: vec![Frame {
                node: &self.root,
                state: State::Init,
            }],
            line_start: true,
        }
    }

    /// Writes the message to `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        for chunk in self.chunks() {
            writer.write_all(&chunk)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Serializes the whole message into one buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for chunk in self.chunks() {
            bytes.extend_from_slice(&chunk);
        }
        bytes
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    HeadersEmitted,
    /// Index of the next child to open.
    Children(usize),
    Closed,
}

#[derive(Debug)]
struct Frame<'a> {
    node: &'a Node,
    state: State,
}

/// Iterator over the serialized chunks of a [`Composition`].
#[derive(Debug)]
pub struct Chunks<'a> {
    composition: &'a Composition,
    stack: Vec<Frame<'a>>,
    line_start: bool,
}

impl<'a> Chunks<'a> {
    fn next_raw(&mut self) -> Option<Cow<'a, [u8]>> {
        loop {
            let depth = self.stack.len();
            let frame = self.stack.last_mut()?;
            let node = frame.node;

            match (frame.state, node) {
                (State::Init, _) => {
                    frame.state = State::HeadersEmitted;
                    let block = if depth == 1 {
                        let headers = self.composition.message_headers();
                        if node.is_raw() {
                            headers.to_string().into_bytes()
                        } else {
                            headers.to_block()
                        }
                    } else if node.is_raw() {
                        continue;
                    } else {
                        node.part_headers().to_block()
                    };
                    return Some(Cow::Owned(block));
                }
                (State::HeadersEmitted, Node::Content(content)) => {
                    frame.state = State::Closed;
                    if !content.body.is_empty() {
                        return Some(Cow::Borrowed(&content.body));
                    }
                }
                (State::HeadersEmitted, Node::Multipart(multipart)) => {
                    frame.state = State::Children(0);
                    if let Some(first) = multipart.children().first() {
                        self.open(first, 1);
                        return Some(Cow::Owned(format!("--{}\r\n", multipart.boundary()).into_bytes()));
                    }
                }
                (State::Children(next), Node::Multipart(multipart)) if next < multipart.children().len() => {
                    self.open(&multipart.children()[next], next + 1);
                    return Some(Cow::Owned(format!("\r\n--{}\r\n", multipart.boundary()).into_bytes()));
                }
                (State::Children(_), Node::Multipart(multipart)) => {
                    frame.state = State::Closed;
                    return Some(Cow::Owned(format!("\r\n--{}--\r\n", multipart.boundary()).into_bytes()));
                }
                (State::Closed | State::Children(_), _) => {
                    self.stack.pop();
                }
            }
        }
    }

    /// Records progress on the current container and descends into `child`.
    fn open(&mut self, child: &'a Node, next: usize) {
        if let Some(parent) = self.stack.last_mut() {
            parent.state = State::Children(next);
        }
        self.stack.push(Frame {
            node: child,
            state: State::Init,
        });
    }

    /// Doubles every dot that starts a line, continuing across chunks.
    fn dot_stuff(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut stuffed = Vec::with_capacity(chunk.len() + 8);
        for &byte in chunk {
            if self.line_start && byte == b'.' {
                stuffed.push(b'.');
            }
            stuffed.push(byte);
            self.line_start = byte == b'\n';
        }
        stuffed
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Cow<'a, [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.next_raw()?;
        if self.composition.escape_smtp {
            Some(Cow::Owned(self.dot_stuff(&chunk)))
        } else {
            Some(chunk)
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
    use crate::content_type::ContentType;
    use crate::node::{ContentNode, MultipartKind, MultipartNode};
    use crate::transfer::TransferEncoding;

    fn composition(root: Node, escape_smtp: bool) -> Composition {
        let mut headers = Headers::new();
        headers.add("Message-Id", "<zzzzzz>");
        Composition::new(root, headers, Envelope::default(), "<zzzzzz>".to_string(), escape_smtp)
    }

    fn text(sub_type: &str, body: &str) -> Node {
        ContentNode::new(
            ContentType::new("text", sub_type),
            TransferEncoding::SevenBit,
            body.as_bytes().to_vec(),
        )
        .into()
    }

    #[test]
    fn test_single_part() {
        let message = composition(text("plain", "abc"), false);
        assert_eq!(
            message.to_string(),
            "Content-Type: text/plain\r\n\
             Message-Id: <zzzzzz>\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             MIME-Version: 1.0\r\n\
             \r\n\
             abc"
        );
    }

    #[test]
    fn test_nested_multipart_framing() {
        let inner: Node = MultipartNode::new(MultipartKind::Alternative, "b2", vec![text("plain", "a"), text("html", "b")]).into();
        let root: Node = MultipartNode::new(MultipartKind::Mixed, "b1", vec![inner, text("plain", "c")]).into();
        let message = composition(root, false);
        assert_eq!(
            message.to_string(),
            "Content-Type: multipart/mixed; boundary=b1\r\n\
             Message-Id: <zzzzzz>\r\n\
             MIME-Version: 1.0\r\n\
             \r\n\
             --b1\r\n\
             Content-Type: multipart/alternative; boundary=b2\r\n\
             \r\n\
             --b2\r\n\
             Content-Type: text/plain\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             a\r\n\
             --b2\r\n\
             Content-Type: text/html\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             b\r\n\
             --b2--\r\n\
             \r\n\
             --b1\r\n\
             Content-Type: text/plain\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             c\r\n\
             --b1--\r\n"
        );
    }

    #[test]
    fn test_raw_root() {
        let root: Node = ContentNode::raw(ContentType::octet_stream(), b"Content-Type: text/plain\r\n\r\nhi".to_vec()).into();
        let message = composition(root, false);
        assert_eq!(
            message.to_string(),
            "Message-Id: <zzzzzz>\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             hi"
        );
    }

    #[test]
    fn test_raw_child_has_no_headers() {
        let raw: Node = ContentNode::raw(ContentType::octet_stream(), b"X-Raw: 1\r\n\r\nbody".to_vec()).into();
        let root: Node = MultipartNode::new(MultipartKind::Mixed, "b", vec![text("plain", "a"), raw]).into();
        let message = composition(root, false).to_string();
        assert!(message.contains("\r\n--b\r\nX-Raw: 1\r\n\r\nbody\r\n--b--\r\n"));
    }

    #[test]
    fn test_dot_stuffing() {
        let message = composition(text("plain", ".first\r\nmid.dle\r\n.\r\n..two"), true);
        let bytes = message.to_bytes();
        let body = String::from_utf8(bytes).unwrap();
        assert!(body.ends_with("\r\n\r\n..first\r\nmid.dle\r\n..\r\n...two"));
    }

    #[test]
    fn test_chunks_match_write_to() {
        let root: Node = MultipartNode::new(MultipartKind::Alternative, "b", vec![text("plain", "a"), text("html", "b")]).into();
        let message = composition(root, false);
        let mut written = Vec::new();
        message.write_to(&mut written).unwrap();
        assert_eq!(written, message.to_bytes());
        assert!(message.chunks().count() > 3);
    }

    #[test]
    fn test_composition_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Composition>();
    }
}
