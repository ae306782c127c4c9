//! Settings file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mailcompose::{ComposeOptions, EncodingPolicy};

/// Settings that persist across invocations.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Emit the Bcc header.
    pub keep_bcc: bool,
    /// Dot-stuff the output.
    pub escape_smtp: bool,
    /// Boundary base used when the description has none.
    pub base_boundary: Option<String>,
    /// Transfer encoding thresholds.
    pub policy: EncodingPolicy,
}

impl Settings {
    /// Builds composer options; flags set on the command line win, unset
    /// flags fall back to the file.
    #[must_use]
    pub fn options(&self, keep_bcc: Option<bool>, escape_smtp: Option<bool>) -> ComposeOptions {
        ComposeOptions::new()
            .keep_bcc(keep_bcc.unwrap_or(self.keep_bcc))
            .escape_smtp(escape_smtp.unwrap_or(self.escape_smtp))
            .policy(self.policy)
    }
}

/// Default settings location.
#[must_use]
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailcompose")
        .join("settings.json")
}

/// Loads settings.
///
/// An explicitly given file must exist; a missing default file yields the
/// default settings.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let (settings_path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (default_path(), false),
    };

    if !required && !settings_path.exists() {
        return Ok(Settings::default());
    }

    let contents = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("Failed to read settings from {}", settings_path.display()))?;
    let settings = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid settings in {}", settings_path.display()))?;

    tracing::debug!("Loaded settings from {:?}", settings_path);
    Ok(settings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"keepBcc": true, "policy": {{"base64_threshold": 0.2}}}}"#).unwrap();

        let settings = load(Some(file.path())).unwrap();
        assert!(settings.keep_bcc);
        assert!(!settings.escape_smtp);
        assert!((settings.policy.base64_threshold - 0.2).abs() < f64::EPSILON);
        assert_eq!(settings.policy.max_line_length, 998);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("missing.json"))).is_err());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load(Some(file.path())).is_err());
    }

    #[test]
    fn test_flags_override_settings() {
        let settings = Settings {
            escape_smtp: true,
            ..Settings::default()
        };
        let options = settings.options(Some(true), None);
        assert!(options.keep_bcc);
        assert!(options.escape_smtp);

        let options = settings.options(None, Some(false));
        assert!(!options.keep_bcc);
        assert!(!options.escape_smtp);
    }
}
