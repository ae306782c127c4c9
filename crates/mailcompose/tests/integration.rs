//! Integration tests for message composition.
//!
//! Golden outputs use a fixed boundary base, Message-ID and date so the
//! composed bytes are fully deterministic.

use mailcompose::{
    Alternative, Attachment, ComposeOptions, Composer, Content, HeaderInput, MessageDescription,
    Node, OCTET_STREAM, compose,
};
use proptest::prelude::*;

const DATE: &str = "Sat, 21 Jun 2014 10:52:44 +0000";

fn fixed() -> MessageDescription {
    MessageDescription::new()
        .base_boundary("test")
        .message_id("zzzzzz")
        .date(DATE)
}

fn essence(node: &Node) -> String {
    node.content_type().essence()
}

fn header_block(message: &str) -> &str {
    message.split_once("\r\n\r\n").map_or(message, |(headers, _)| headers)
}

fn body(message: &str) -> &str {
    message.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

#[test]
fn test_alternative_golden() {
    let description = fixed().text("abc").html("def");
    let message = compose(&description).unwrap().to_string();

    assert_eq!(
        message,
        "Content-Type: multipart/alternative; boundary=\"----mailcompose-?=_1-test\"\r\n\
         Message-Id: <zzzzzz>\r\n\
         Date: Sat, 21 Jun 2014 10:52:44 +0000\r\n\
         MIME-Version: 1.0\r\n\
         \r\n\
         ------mailcompose-?=_1-test\r\n\
         Content-Type: text/plain\r\n\
         Content-Transfer-Encoding: 7bit\r\n\
         \r\n\
         abc\r\n\
         ------mailcompose-?=_1-test\r\n\
         Content-Type: text/html\r\n\
         Content-Transfer-Encoding: 7bit\r\n\
         \r\n\
         def\r\n\
         ------mailcompose-?=_1-test--\r\n"
    );
}

#[test]
fn test_bcc_discarded_by_default() {
    let description = fixed()
        .from("test1@example.com")
        .to("test2@example.com")
        .bcc("test3@example.com")
        .text("def");
    let composition = compose(&description).unwrap();

    assert_eq!(
        composition.to_string(),
        "Content-Type: text/plain\r\n\
         From: test1@example.com\r\n\
         To: test2@example.com\r\n\
         Message-Id: <zzzzzz>\r\n\
         Date: Sat, 21 Jun 2014 10:52:44 +0000\r\n\
         Content-Transfer-Encoding: 7bit\r\n\
         MIME-Version: 1.0\r\n\
         \r\n\
         def"
    );
    assert_eq!(composition.envelope().from.as_deref(), Some("test1@example.com"));
    assert_eq!(
        composition.envelope().to,
        vec!["test2@example.com", "test3@example.com"]
    );
}

#[test]
fn test_bcc_kept() {
    let description = fixed()
        .from("test1@example.com")
        .to("test2@example.com")
        .bcc("test3@example.com")
        .text("def");
    let discarded = compose(&description).unwrap().to_string();
    let kept = Composer::new(ComposeOptions::new().keep_bcc(true))
        .compose(&description)
        .unwrap()
        .to_string();

    assert!(kept.contains("To: test2@example.com\r\nBcc: test3@example.com\r\nMessage-Id"));
    assert!(!discarded.contains("Bcc:"));
    assert_eq!(body(&kept), body(&discarded));
}

#[test]
fn test_text_only_root() {
    let composition = compose(&fixed().text("abc")).unwrap();
    assert_eq!(essence(composition.root()), "text/plain");
    assert!(composition.root().boundaries().is_empty());
    assert!(!composition.to_string().contains("boundary="));
}

#[test]
fn test_watch_html_order() {
    let description = fixed().html("<p>html</p>").watch_html("<p>watch</p>").text("text");
    let composition = compose(&description).unwrap();
    let types: Vec<String> = composition.root().children().iter().map(essence).collect();
    assert_eq!(types, vec!["text/plain", "text/watch-html", "text/html"]);
}

#[test]
fn test_extra_alternatives_follow_builtin_ones() {
    let description = fixed()
        .alternative(Alternative::new("# md", "text/markdown"))
        .text("text");
    let composition = compose(&description).unwrap();
    let types: Vec<String> = composition.root().children().iter().map(essence).collect();
    assert_eq!(types, vec!["text/plain", "text/markdown"]);
}

#[test]
fn test_attachment_without_cid_gives_mixed_root() {
    for description in [
        fixed().attach(Attachment::new("a").filename("a.txt")).text("t"),
        fixed().attach(Attachment::new("a").filename("a.txt")).text("t").html("h"),
        fixed()
            .attach(Attachment::new("a").filename("a.txt"))
            .attach(Attachment::new("b").filename("b.txt")),
    ] {
        let composition = compose(&description).unwrap();
        assert_eq!(essence(composition.root()), "multipart/mixed");
    }
}

#[test]
fn test_related_root_order() {
    let description = fixed()
        .html("<img src=\"cid:one\"><img src=\"cid:two\">")
        .attach(Attachment::new(vec![0x89, b'P', b'N', b'G']).filename("one.png").cid("one"))
        .attach(Attachment::new(vec![b'G', b'I', b'F', 0xff]).filename("two.gif").cid("two"));
    let composition = compose(&description).unwrap();
    let root = composition.root();

    assert_eq!(essence(root), "multipart/related");
    let types: Vec<String> = root.children().iter().map(essence).collect();
    assert_eq!(types, vec!["text/html", "image/png", "image/gif"]);

    let message = composition.to_string();
    assert!(message.contains("Content-Id: <one>\r\n"));
    assert!(message.contains("Content-Id: <two>\r\n"));
}

#[test]
fn test_full_nesting() {
    let description = fixed()
        .text("t")
        .html("<img src=\"cid:logo\">")
        .attach(Attachment::new("logo").filename("logo.png").cid("logo"))
        .attach(Attachment::new("report").filename("report.pdf"));
    let composition = compose(&description).unwrap();
    let root = composition.root();

    assert_eq!(essence(root), "multipart/mixed");
    let related = &root.children()[0];
    assert_eq!(essence(related), "multipart/related");
    assert_eq!(essence(&related.children()[0]), "multipart/alternative");
    assert_eq!(
        root.boundaries(),
        vec![
            "----mailcompose-?=_1-test",
            "----mailcompose-?=_2-test",
            "----mailcompose-?=_3-test"
        ]
    );

    let message = composition.to_string();
    assert!(message.starts_with("Content-Type: multipart/mixed; boundary=\"----mailcompose-?=_1-test\"\r\n"));
    assert!(message.ends_with("\r\n------mailcompose-?=_1-test--\r\n"));
}

#[test]
fn test_empty_message() {
    let message = compose(&fixed()).unwrap().to_string();
    assert_eq!(
        message,
        "Content-Type: text/plain\r\n\
         Message-Id: <zzzzzz>\r\n\
         Date: Sat, 21 Jun 2014 10:52:44 +0000\r\n\
         Content-Transfer-Encoding: 7bit\r\n\
         MIME-Version: 1.0\r\n\
         \r\n"
    );
}

#[test]
fn test_single_attachment_root() {
    let description = fixed().attach(Attachment::new(vec![0, 1, 2, 255]).filename("data.bin"));
    let message = compose(&description).unwrap().to_string();
    assert_eq!(
        message,
        "Content-Type: application/octet-stream\r\n\
         Message-Id: <zzzzzz>\r\n\
         Date: Sat, 21 Jun 2014 10:52:44 +0000\r\n\
         Content-Transfer-Encoding: base64\r\n\
         Content-Disposition: attachment; filename=\"data.bin\"\r\n\
         MIME-Version: 1.0\r\n\
         \r\n\
         AAEC/w=="
    );
}

#[test]
fn test_encoded_text_content() {
    let description = fixed().text(Content::Encoded {
        content: "dGVyZSB0ZXJl".to_string(),
        encoding: "base64".to_string(),
    });
    let message = compose(&description).unwrap().to_string();
    assert_eq!(body(&message), "tere tere");
}

#[test]
fn test_non_ascii_text_uses_quoted_printable() {
    let message = compose(&fixed().text("tere õkva")).unwrap().to_string();
    assert!(message.starts_with("Content-Type: text/plain; charset=utf-8\r\n"));
    assert!(message.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
    assert_eq!(body(&message), "tere =C3=B5kva");
}

#[test]
fn test_non_ascii_headers_are_encoded_words() {
    let description = fixed()
        .from("\"Jõgi Mägi\" <jogi@märts.eu>")
        .to("Ülle <ülle@example.com>")
        .subject("Tere õkva! Kõik on korras")
        .header("X-Note", "öö")
        .text("abc");
    let composition = compose(&description).unwrap();
    let message = composition.to_string();
    let headers = header_block(&message);

    assert!(headers.is_ascii());
    assert!(headers.contains("Subject: =?UTF-8?Q?Tere_=C3=B5kva!_K=C3=B5ik_on_korras?=\r\n"));
    assert!(headers.contains("From: =?UTF-8?Q?J=C3=B5gi_M=C3=A4gi?= <jogi@xn--mrts-loa.eu>\r\n"));
    assert!(headers.contains("X-Note: =?UTF-8?Q?=C3=B6=C3=B6?=\r\n"));
    assert_eq!(composition.envelope().from.as_deref(), Some("jogi@xn--mrts-loa.eu"));
}

#[test]
fn test_long_encoded_headers_stay_within_line_limit() {
    let description = fixed()
        .from("\"Väga Pika Nimega Saatja, kelle nimi ei mahu kuidagi ühele reale\" <saatja@example.com>")
        .to("alice@example.com")
        .subject("Tere õhtust, see on üks väga pikk teema mis läheb kaugele ja veel kaugemale")
        .text("abc");
    let message = compose(&description).unwrap().to_string();
    let headers = header_block(&message);

    assert!(headers.contains("Subject: =?UTF-8?Q?Tere_=C3=B5htust"));
    for line in headers.split("\r\n") {
        assert!(line.len() <= 76, "{line} too long");
    }
}

#[test]
fn test_invalid_entry_keeps_other_addresses_readable() {
    let composition = compose(&fixed().to("alice@example.com, Jõgi").text("abc")).unwrap();
    let message = composition.to_string();

    assert!(header_block(&message).contains("To: alice@example.com, =?UTF-8?Q?J=C3=B5gi?=\r\n"));
    assert_eq!(composition.envelope().to, vec!["alice@example.com"]);
}

#[test]
fn test_attachment_cannot_override_generated_headers() {
    let attachment = Attachment::new("a")
        .filename("a.bin")
        .header("Content-Type", "text/html")
        .header("Content-Transfer-Encoding", "8bit");
    let message = compose(&fixed().attach(attachment)).unwrap().to_string();
    let headers = header_block(&message);

    assert_eq!(headers.matches("Content-Type:").count(), 1);
    assert!(headers.contains(&format!("Content-Type: {OCTET_STREAM}\r\n")));
    assert_eq!(headers.matches("Content-Transfer-Encoding:").count(), 1);
}

#[test]
fn test_header_lists_and_prepared_values() {
    let prepared = format!("{}x", "word ".repeat(20));
    let description = fixed()
        .header("X-List", vec!["one".to_string(), "two".to_string()])
        .header("X-Prepared", HeaderInput::Prepared(prepared.clone()))
        .text("abc");
    let message = compose(&description).unwrap().to_string();

    assert!(message.contains("X-List: one\r\nX-List: two\r\n"));
    assert!(message.contains(&format!("X-Prepared: {prepared}\r\n")));
}

#[test]
fn test_raw_attachment_passthrough() {
    let raw = "Content-Type: message/rfc822\r\n\r\nSubject: inner\r\n\r\nhello";
    let description = fixed().text("abc").attach(Attachment::new(raw).raw());
    let message = compose(&description).unwrap().to_string();

    assert!(message.contains(&format!("------mailcompose-?=_1-test\r\n{raw}\r\n------mailcompose-?=_1-test--\r\n")));
}

#[test]
fn test_raw_root_passthrough() {
    let description = fixed().text(Content::Raw(b"Content-Type: text/plain\r\n\r\nverbatim".to_vec()));
    let message = compose(&description).unwrap().to_string();
    assert_eq!(
        message,
        "Message-Id: <zzzzzz>\r\n\
         Date: Sat, 21 Jun 2014 10:52:44 +0000\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         verbatim"
    );
}

#[test]
fn test_escape_smtp() {
    let description = fixed().text(".hidden\r\nline\r\n.");
    let composition = Composer::new(ComposeOptions::new().escape_smtp(true))
        .compose(&description)
        .unwrap();
    assert_eq!(body(&composition.to_string()), "..hidden\r\nline\r\n..");
}

#[test]
fn test_unsupported_encoding_fails_before_output() {
    let description = fixed().text("abc").text_encoding("8bit");
    let err = compose(&description).unwrap_err();
    assert!(matches!(err, mailcompose::Error::UnsupportedEncoding(ref e) if e == "8bit"));
}

#[test]
fn test_message_id_accessor() {
    let composition = compose(&fixed().text("abc")).unwrap();
    assert_eq!(composition.message_id(), "<zzzzzz>");

    let generated = compose(&MessageDescription::new().from("a@example.com").text("abc")).unwrap();
    assert!(generated.message_id().ends_with("@example.com>"));
    assert!(generated.to_string().contains(&format!("Message-Id: {}\r\n", generated.message_id())));
}

#[test]
fn test_write_to_matches_to_bytes() {
    let composition = compose(&fixed().text("abc").html("def")).unwrap();
    let mut written = Vec::new();
    composition.write_to(&mut written).unwrap();
    assert_eq!(written, composition.to_bytes());
}

#[test]
fn test_concurrent_serialization() {
    let composition = std::sync::Arc::new(compose(&fixed().text("abc").html("def")).unwrap());
    let expected = composition.to_bytes();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let composition = std::sync::Arc::clone(&composition);
            std::thread::spawn(move || composition.to_bytes())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

proptest! {
    #[test]
    fn composition_is_deterministic(text in "\\PC{0,200}", html in "\\PC{0,200}", attach in any::<bool>()) {
        let mut description = fixed().text(text).html(html);
        if attach {
            description = description.attach(Attachment::new(vec![1, 2, 3]).filename("a.bin"));
        }
        let first = compose(&description).unwrap().to_bytes();
        let second = compose(&description).unwrap().to_bytes();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn dot_stuffing_is_reversible(lines in prop::collection::vec("[.a-z]{0,6}", 1..12)) {
        let description = fixed().text(lines.join("\r\n"));
        let plain = compose(&description).unwrap().to_string();
        let stuffed = Composer::new(ComposeOptions::new().escape_smtp(true))
            .compose(&description)
            .unwrap()
            .to_string();

        let mut restored = Vec::new();
        for line in stuffed.split("\r\n") {
            if line.starts_with('.') {
                prop_assert!(line.starts_with(".."));
                restored.push(&line[1..]);
            } else {
                restored.push(line);
            }
        }
        prop_assert_eq!(restored.join("\r\n"), plain);
    }
}
