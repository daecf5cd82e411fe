//! Canvas and persistence tuning.
//!
//! # Responsibility
//! - Hold placement margins, text limits and the save debounce delay.
//! - Load overrides from an optional TOML file.
//!
//! # Invariants
//! - `validate()` passes for every config handed to the engine.
//! - Fields missing from a file keep their default values.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAX_THOUGHT_LENGTH: usize = 200;
pub const DEFAULT_NOTE_PADDING: f64 = 50.0;
pub const DEFAULT_NOTE_WIDTH: f64 = 300.0;
pub const DEFAULT_INPUT_GUARD_HEIGHT: f64 = 400.0;
pub const DEFAULT_MAX_ROTATION_DEGREES: f64 = 5.0;
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 500;

/// Engine settings shared by placement, text normalization and saving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Upper bound on thought text, in chars.
    pub max_thought_length: usize,
    /// Edge margin kept free on every side of the canvas.
    pub note_padding: f64,
    /// Horizontal space reserved for a note when spawning.
    pub note_width: f64,
    /// Bottom band reserved for the input control.
    pub input_guard_height: f64,
    pub max_rotation_degrees: f64,
    pub save_debounce_ms: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            max_thought_length: DEFAULT_MAX_THOUGHT_LENGTH,
            note_padding: DEFAULT_NOTE_PADDING,
            note_width: DEFAULT_NOTE_WIDTH,
            input_guard_height: DEFAULT_INPUT_GUARD_HEIGHT,
            max_rotation_degrees: DEFAULT_MAX_ROTATION_DEGREES,
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
        }
    }
}

/// Config loading and validation failures.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl CanvasConfig {
    /// Parses TOML text; absent keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise returns defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_thought_length == 0 {
            return Err(ConfigError::Invalid(
                "max_thought_length must be positive".to_string(),
            ));
        }
        let margins = [
            ("note_padding", self.note_padding),
            ("note_width", self.note_width),
            ("input_guard_height", self.input_guard_height),
            ("max_rotation_degrees", self.max_rotation_degrees),
        ];
        for (name, value) in margins {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}
