//! Session and port configuration
//!
//! Serializes with the same field names the browser serial options use
//! (`baudRate`, `dataBits`, ...), so saved settings can be shared with a web
//! front end.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::error::SessionError;

/// Default baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read buffer size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Largest accepted read buffer size (16 MiB)
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Flow control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    /// No flow control
    #[default]
    None,
    /// RTS/CTS hardware flow control
    Hardware,
}

/// Options used to open a serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerialOptions {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity mode
    pub parity: Parity,
    /// Read buffer size in bytes
    pub buffer_size: usize,
    /// Flow control mode
    pub flow_control: FlowControl,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialOptions {
    /// Options with the given baud rate and defaults for everything else
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    /// Check that every field is in range for opening a port
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.baud_rate == 0 {
            return Err(SessionError::InvalidOptions(
                "baud rate must be greater than zero".to_string(),
            ));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(SessionError::InvalidOptions(format!(
                "data bits must be 5-8, got {}",
                self.data_bits
            )));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(SessionError::InvalidOptions(format!(
                "stop bits must be 1 or 2, got {}",
                self.stop_bits
            )));
        }
        if self.buffer_size == 0 || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(SessionError::InvalidOptions(format!(
                "buffer size must be 1-{MAX_BUFFER_SIZE}, got {}",
                self.buffer_size
            )));
        }
        Ok(())
    }
}

/// Errors loading a session configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid config JSON
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The config parsed but its values are out of range
    #[error(transparent)]
    Invalid(#[from] SessionError),
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Port options applied on connect
    pub options: SerialOptions,
    /// Line delimiter
    pub delimiter: String,
    /// Do not hand empty lines to the read callback
    pub skip_empty_lines: bool,
    /// Limit on read loop re-activations after the first (None = unlimited)
    pub max_read_restarts: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            options: SerialOptions::default(),
            delimiter: crate::DEFAULT_DELIMITER.to_string(),
            skip_empty_lines: true,
            max_read_restarts: None,
        }
    }
}

impl SessionConfig {
    /// Configuration with custom port options and the default delimiter
    pub fn with_options(options: SerialOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Replace the line delimiter
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Check the port options and the delimiter
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.delimiter.is_empty() {
            return Err(SessionError::InvalidOptions(
                "line delimiter must not be empty".to_string(),
            ));
        }
        self.options.validate()
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}
