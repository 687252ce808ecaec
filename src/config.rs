//! Configuration loader.
//!
//! `defaults/clausemark.default.toml` is embedded into the library so the
//! documented defaults and [`Settings::default`] never drift apart. Callers
//! layer their own files and overrides through [`Loader`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TOML: &str = include_str!("../defaults/clausemark.default.toml");

/// Runtime knobs shared by parse and draft mode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub identifiers: IdentifierSettings,
    pub parsing: ParsingSettings,
    pub rendering: RenderingSettings,
}

/// Names of the identifier fields written into records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentifierSettings {
    pub clause: String,
    pub contract: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParsingSettings {
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenderingSettings {
    pub bullet: char,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            identifiers: IdentifierSettings {
                clause: "clauseId".to_string(),
                contract: "contractId".to_string(),
            },
            parsing: ParsingSettings {
                utc_offset_minutes: 0,
            },
            rendering: RenderingSettings { bullet: '-' },
        }
    }
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Apply a single key/value override, e.g. `parsing.utc_offset_minutes`.
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Apply a `key=value` assignment as typed on the command line. Integer
    /// values are stored as integers, anything else as a string.
    pub fn with_assignment(self, assignment: &str) -> Result<Self, ConfigError> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            ConfigError::Message(format!("expected key=value, got `{assignment}`"))
        })?;
        let (key, value) = (key.trim(), value.trim());
        match value.parse::<i64>() {
            Ok(number) => self.set_override(key, number),
            Err(_) => self.set_override(key, value),
        }
    }

    pub fn build(self) -> Result<Settings, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_match_settings_default() {
        let settings = Loader::new().build().expect("defaults to deserialize");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn supports_overrides() {
        let settings = Loader::new()
            .set_override("parsing.utc_offset_minutes", 120i64)
            .expect("override to apply")
            .set_override("identifiers.clause", "id")
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(settings.parsing.utc_offset_minutes, 120);
        assert_eq!(settings.identifiers.clause, "id");
        assert_eq!(settings.identifiers.contract, "contractId");
    }

    #[test]
    fn command_line_assignments() {
        let settings = Loader::new()
            .with_assignment("parsing.utc_offset_minutes=-300")
            .and_then(|loader| loader.with_assignment("rendering.bullet = *"))
            .and_then(|loader| loader.with_assignment("identifiers.contract=agreementId"))
            .expect("assignments to apply")
            .build()
            .expect("config to build");
        assert_eq!(settings.parsing.utc_offset_minutes, -300);
        assert_eq!(settings.rendering.bullet, '*');
        assert_eq!(settings.identifiers.contract, "agreementId");
        assert!(Loader::new().with_assignment("parsing").is_err());
    }

    #[test]
    fn missing_optional_file_is_ignored() {
        let settings = Loader::new()
            .with_optional_file("does-not-exist.toml")
            .build()
            .expect("config to build");
        assert_eq!(settings.rendering.bullet, '-');
    }
}
