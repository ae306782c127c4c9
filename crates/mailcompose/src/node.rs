//! MIME part tree.
//!
//! The builder produces a [`Node`] tree once per composition; nothing is
//! mutated afterwards, so a tree can be serialized repeatedly and shared
//! between threads.

use crate::content_type::ContentType;
use crate::header::Headers;
use crate::transfer::TransferEncoding;
use std::fmt;

/// Multipart container flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultipartKind {
    /// Unrelated parts, typically a body plus attachments.
    Mixed,
    /// Equivalent renderings of the same content.
    Alternative,
    /// A body plus the inline resources it references.
    Related,
}

impl MultipartKind {
    /// Returns the multipart subtype.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Alternative => "alternative",
            Self::Related => "related",
        }
    }
}

impl fmt::Display for MultipartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "multipart/{}", self.as_str())
    }
}

/// Leaf part with an already encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentNode {
    /// Content type of the part.
    pub content_type: ContentType,
    /// Transfer encoding applied to `body`; `None` for raw parts.
    pub transfer_encoding: Option<TransferEncoding>,
    /// Additional part headers (disposition, Content-ID, caller headers).
    pub headers: Headers,
    /// Encoded body, or the complete part for raw nodes.
    pub body: Vec<u8>,
    /// Emit `body` verbatim without a header block.
    pub raw: bool,
}

impl ContentNode {
    /// Creates a content node from an encoded body.
    #[must_use]
    pub fn new(content_type: ContentType, encoding: TransferEncoding, body: Vec<u8>) -> Self {
        Self {
            content_type,
            transfer_encoding: Some(encoding),
            headers: Headers::new(),
            body,
            raw: false,
        }
    }

    /// Creates a pass-through node.
    #[must_use]
    pub fn raw(content_type: ContentType, body: Vec<u8>) -> Self {
        Self {
            content_type,
            transfer_encoding: None,
            headers: Headers::new(),
            body,
            raw: true,
        }
    }

    /// Creates an empty `text/plain` node.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(ContentType::new("text", "plain"), TransferEncoding::SevenBit, Vec::new())
    }

    /// Attaches additional part headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// Container part whose body is a sequence of child parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartNode {
    kind: MultipartKind,
    boundary: String,
    headers: Headers,
    children: Vec<Node>,
}

impl MultipartNode {
    /// Creates a multipart node.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two children are given: a single part is never
    /// wrapped, so this indicates a bug in the tree builder.
    #[must_use]
    pub fn new(kind: MultipartKind, boundary: impl Into<String>, children: Vec<Node>) -> Self {
        assert!(
            children.len() >= 2,
            "{kind} node built with {} child(ren), at least 2 required",
            children.len()
        );
        Self {
            kind,
            boundary: boundary.into(),
            headers: Headers::new(),
            children,
        }
    }

    /// Multipart flavour.
    #[must_use]
    pub const fn kind(&self) -> MultipartKind {
        self.kind
    }

    /// Boundary delimiting the children.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Additional part headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Child parts in emission order.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

/// A node of the MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Leaf part.
    Content(ContentNode),
    /// Container part.
    Multipart(MultipartNode),
}

impl Node {
    /// Content type, including the boundary parameter for containers.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Content(node) => node.content_type.clone(),
            Self::Multipart(node) => ContentType::multipart(node.kind.as_str(), &node.boundary),
        }
    }

    /// Child parts; empty for leaves.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match self {
            Self::Content(_) => &[],
            Self::Multipart(node) => node.children(),
        }
    }

    /// Returns true for container nodes.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }

    /// Returns true for pass-through leaves.
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        matches!(self, Self::Content(ContentNode { raw: true, .. }))
    }

    /// Part headers in emission order: Content-Type,
    /// Content-Transfer-Encoding, then the additional headers.
    #[must_use]
    pub fn part_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.add("Content-Type", self.content_type().to_string());
        headers.extend(self.trailing_headers().iter().map(|(n, v)| (n.to_string(), v.clone())));
        headers
    }

    /// Part headers that follow Content-Type.
    #[must_use]
    pub fn trailing_headers(&self) -> Headers {
        let mut headers = Headers::new();
        let extra = match self {
            Self::Content(node) => {
                if let Some(encoding) = node.transfer_encoding {
                    headers.add("Content-Transfer-Encoding", encoding.as_str());
                }
                &node.headers
            }
            Self::Multipart(node) => &node.headers,
        };
        headers.extend(extra.iter().map(|(n, v)| (n.to_string(), v.clone())));
        headers
    }

    /// All boundaries in the subtree, in pre-order.
    #[must_use]
    pub fn boundaries(&self) -> Vec<&str> {
        let mut boundaries = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Self::Multipart(multipart) = node {
                boundaries.push(multipart.boundary());
                stack.extend(multipart.children().iter().rev());
            }
        }
        boundaries
    }
}

impl From<ContentNode> for Node {
    fn from(node: ContentNode) -> Self {
        Self::Content(node)
    }
}

impl From<MultipartNode> for Node {
    fn from(node: MultipartNode) -> Self {
        Self::Multipart(node)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn leaf(sub_type: &str) -> Node {
        ContentNode::new(ContentType::new("text", sub_type), TransferEncoding::SevenBit, b"x".to_vec()).into()
    }

    #[test]
    fn test_part_headers_order() {
        let mut extra = Headers::new();
        extra.add("Content-Disposition", "attachment");
        let node: Node = ContentNode::new(ContentType::octet_stream(), TransferEncoding::Base64, Vec::new())
            .with_headers(extra)
            .into();
        assert_eq!(
            node.part_headers().to_string(),
            "Content-Type: application/octet-stream\r\n\
             Content-Transfer-Encoding: base64\r\n\
             Content-Disposition: attachment\r\n"
        );
    }

    #[test]
    fn test_multipart_content_type() {
        let node: Node = MultipartNode::new(MultipartKind::Alternative, "b1", vec![leaf("plain"), leaf("html")]).into();
        assert_eq!(node.content_type().to_string(), "multipart/alternative; boundary=b1");
        assert_eq!(node.children().len(), 2);
        assert!(node.is_multipart());
    }

    #[test]
    fn test_boundaries_preorder() {
        let inner: Node = MultipartNode::new(MultipartKind::Alternative, "b2", vec![leaf("plain"), leaf("html")]).into();
        let outer: Node = MultipartNode::new(MultipartKind::Mixed, "b1", vec![inner, leaf("plain")]).into();
        assert_eq!(outer.boundaries(), vec!["b1", "b2"]);
    }

    #[test]
    fn test_raw_node_has_no_encoding_header() {
        let node: Node = ContentNode::raw(ContentType::octet_stream(), b"X: y\r\n\r\nz".to_vec()).into();
        assert!(node.is_raw());
        assert!(node.trailing_headers().is_empty());
    }

    #[test]
    #[should_panic(expected = "at least 2 required")]
    fn test_single_child_multipart_panics() {
        let _ = MultipartNode::new(MultipartKind::Mixed, "b", vec![leaf("plain")]);
    }
}
