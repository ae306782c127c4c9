//! # mailcompose
//!
//! MIME message composition for email.
//!
//! ## Features
//!
//! - **Structure decisions**: picks `multipart/mixed`, `multipart/alternative`
//!   or `multipart/related` nesting (or none) from a declarative description
//! - **Transfer encodings**: 7bit, Quoted-Printable or Base64, detected or forced
//! - **Headers**: canonical names, RFC 2047 encoded words, folding
//! - **Addresses**: punycode domains, encoded display names, SMTP envelope
//! - **Streaming output**: lazy chunk iterator, `io::Write` sink or one buffer
//!
//! ## Quick Start
//!
//! ### Composing a Message
//!
//! ```ignore
//! use mailcompose::{MessageDescription, compose};
//!
//! let description = MessageDescription::new()
//!     .from("sender@example.com")
//!     .to("recipient@example.com")
//!     .subject("Test Message")
//!     .text("Hello, World!")
//!     .html("<p>Hello, World!</p>"); // Creates multipart/alternative
//!
//! let message = compose(&description)?;
//! println!("{message}");
//! ```
//!
//! ### Working with Attachments
//!
//! ```ignore
//! use mailcompose::{Attachment, MessageDescription, compose};
//!
//! let description = MessageDescription::new()
//!     .from("sender@example.com")
//!     .to("recipient@example.com")
//!     .html("<img src=\"cid:logo\">")
//!     .attach(Attachment::new(logo_bytes).filename("logo.png").cid("logo"))
//!     .attach(Attachment::new(pdf_bytes).filename("document.pdf"));
//!
//! let message = compose(&description)?;
//! ```
//!
//! ### Streaming to a Transport
//!
//! ```ignore
//! use mailcompose::{ComposeOptions, Composer};
//!
//! let composer = Composer::new(ComposeOptions::new().escape_smtp(true));
//! let message = composer.compose(&description)?;
//!
//! for recipient in &message.envelope().to {
//!     println!("RCPT TO:<{recipient}>");
//! }
//! for chunk in message.chunks() {
//!     socket.write_all(&chunk)?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod boundary;
mod builder;
mod content_type;
mod description;
mod error;
mod serializer;

pub mod address;
pub mod encoding;
pub mod header;
pub mod node;
pub mod transfer;

pub use address::{Envelope, Mailbox};
pub use boundary::{BOUNDARY_PREFIX, BoundaryGenerator};
pub use builder::{ComposeOptions, Composer, compose};
pub use content_type::{ContentType, OCTET_STREAM};
pub use description::{
    AddressInput, Alternative, Attachment, Content, Filename, HeaderInput, IcalEvent,
    MessageDescription,
};
pub use error::{Error, Result};
pub use header::{HeaderValue, Headers};
pub use node::{ContentNode, MultipartKind, MultipartNode, Node};
pub use serializer::{Chunks, Composition};
pub use transfer::{EncodingPolicy, TransferEncoding};
