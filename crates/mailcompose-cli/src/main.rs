//! `mailcompose` - compose a MIME message from a JSON description.
//!
//! Reads the description from a file or stdin and writes the message (or
//! its SMTP envelope) to a file or stdout. Logs go to stderr.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod input;

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use mailcompose::{Composer, Composition, Envelope};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use input::MessageInput;

#[derive(Debug, Parser)]
#[command(name = "mailcompose", version, about = "Compose a MIME message from a JSON description")]
struct Cli {
    /// JSON message description (stdin when omitted)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Write the message to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Keep the Bcc header in the message
    #[arg(long, overrides_with = "no_keep_bcc")]
    keep_bcc: bool,

    /// Drop the Bcc header even if the settings file keeps it
    #[arg(long, overrides_with = "keep_bcc")]
    no_keep_bcc: bool,

    /// Dot-stuff lines for use in an SMTP DATA command
    #[arg(long, overrides_with = "no_escape_smtp")]
    escape_smtp: bool,

    /// Do not dot-stuff even if the settings file asks for it
    #[arg(long, overrides_with = "escape_smtp")]
    no_escape_smtp: bool,

    /// Fixed boundary base token, for reproducible output
    #[arg(long, value_name = "TOKEN")]
    base_boundary: Option<String>,

    /// Print the envelope and Message-ID as JSON instead of the message
    #[arg(long)]
    envelope: bool,

    /// Settings file (default: <config dir>/mailcompose/settings.json)
    #[arg(short, long, value_name = "FILE", env = "MAILCOMPOSE_CONFIG")]
    config: Option<PathBuf>,
}

/// Envelope report printed with `--envelope`.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeReport<'a> {
    envelope: &'a Envelope,
    message_id: &'a str,
}

fn main() -> Result<()> {
    // Initialize logging; stdout carries the message
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailcompose=info,mailcompose_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    run(&Cli::parse())
}

fn run(cli: &Cli) -> Result<()> {
    let settings = config::load(cli.config.as_deref())?;
    let json = read_input(cli.input.as_deref())?;

    let input: MessageInput =
        serde_json::from_str(&json).context("Invalid message description")?;
    let mut description = input.into_description()?;
    if let Some(base) = &cli.base_boundary {
        description.base_boundary = Some(base.clone());
    } else if description.base_boundary.is_none() {
        description.base_boundary.clone_from(&settings.base_boundary);
    }

    let options = settings.options(
        flag(cli.keep_bcc, cli.no_keep_bcc),
        flag(cli.escape_smtp, cli.no_escape_smtp),
    );
    let composer = Composer::new(options);
    let composition = composer.compose(&description).context("Failed to compose message")?;
    info!(
        message_id = composition.message_id(),
        recipients = composition.envelope().to.len(),
        "Composed message"
    );

    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            emit(cli, &composition, BufWriter::new(file))
        }
        None => emit(cli, &composition, io::stdout().lock()),
    }
}

/// Resolves a `--x` / `--no-x` pair; `None` when neither was given.
const fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut json = String::new();
            io::stdin()
                .read_to_string(&mut json)
                .context("Failed to read stdin")?;
            Ok(json)
        }
    }
}

fn emit<W: Write>(cli: &Cli, composition: &Composition, mut writer: W) -> Result<()> {
    if cli.envelope {
        let report = EnvelopeReport {
            envelope: composition.envelope(),
            message_id: composition.message_id(),
        };
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writeln!(writer)?;
        writer.flush()?;
    } else {
        composition.write_to(writer).context("Failed to write message")?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flag_pairs() {
        let cli = Cli::parse_from(["mailcompose", "--keep-bcc", "--no-keep-bcc"]);
        assert_eq!(flag(cli.keep_bcc, cli.no_keep_bcc), Some(false));
        let cli = Cli::parse_from(["mailcompose", "--no-escape-smtp", "--escape-smtp"]);
        assert_eq!(flag(cli.escape_smtp, cli.no_escape_smtp), Some(true));
        let cli = Cli::parse_from(["mailcompose"]);
        assert_eq!(flag(cli.keep_bcc, cli.no_keep_bcc), None);
    }

    #[test]
    fn test_run_writes_message_and_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("message.json");
        let settings = dir.path().join("settings.json");
        let output = dir.path().join("message.eml");
        std::fs::write(
            &input,
            r#"{
                "from": "test1@example.com",
                "to": "test2@example.com",
                "bcc": "test3@example.com",
                "text": "def",
                "messageId": "zzzzzz",
                "date": "Sat, 21 Jun 2014 10:52:44 +0000"
            }"#,
        )
        .unwrap();
        std::fs::write(&settings, r#"{"keepBcc": true}"#).unwrap();

        let mut cli = Cli::parse_from([
            "mailcompose",
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--config",
            settings.to_str().unwrap(),
        ]);
        run(&cli).unwrap();
        let message = std::fs::read_to_string(&output).unwrap();
        assert!(message.contains("Bcc: test3@example.com\r\n"));
        assert!(message.ends_with("\r\n\r\ndef"));

        cli.no_keep_bcc = true;
        run(&cli).unwrap();
        let message = std::fs::read_to_string(&output).unwrap();
        assert!(!message.contains("Bcc:"));
        cli.no_keep_bcc = false;

        cli.envelope = true;
        run(&cli).unwrap();
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report["messageId"], "<zzzzzz>");
        assert_eq!(report["envelope"]["from"], "test1@example.com");
        assert_eq!(
            report["envelope"]["to"],
            serde_json::json!(["test2@example.com", "test3@example.com"])
        );
    }
}
