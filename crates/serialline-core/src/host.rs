//! Host serial capability
//!
//! A session never talks to the operating system directly. Everything it
//! needs (port selection, enumeration, open/read/write/close) goes through
//! these traits so tests and other platforms can supply their own ports.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::SerialOptions;

/// Readable side of an open port
pub type PortReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable side of an open port
pub type PortWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Information about a serial port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub usb_vendor_id: Option<u16>,

    /// USB product ID (if USB device)
    pub usb_product_id: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Info for a port known only by name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// USB identifiers a requested port must match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortFilter {
    /// Required USB vendor ID
    pub usb_vendor_id: Option<u16>,
    /// Required USB product ID
    pub usb_product_id: Option<u16>,
}

impl PortFilter {
    /// Filter on vendor ID only
    pub fn vendor(usb_vendor_id: u16) -> Self {
        Self {
            usb_vendor_id: Some(usb_vendor_id),
            usb_product_id: None,
        }
    }

    /// Whether `info` satisfies every identifier set on this filter
    pub fn matches(&self, info: &PortInfo) -> bool {
        let vendor_ok = self
            .usb_vendor_id
            .map_or(true, |vid| info.usb_vendor_id == Some(vid));
        let product_ok = self
            .usb_product_id
            .map_or(true, |pid| info.usb_product_id == Some(pid));
        vendor_ok && product_ok
    }
}

/// Options for [`SerialHost::request_port`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortRequestOptions {
    /// Accepted devices; empty accepts any port
    pub filters: Vec<PortFilter>,
}

impl PortRequestOptions {
    /// Whether `info` matches any filter (or there are no filters)
    pub fn matches(&self, info: &PortInfo) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f.matches(info))
    }
}

/// A serial port handle owned by the host platform
#[async_trait]
pub trait SerialPort: Send {
    /// Identifying information
    fn info(&self) -> PortInfo;

    /// Open the port with the given options
    async fn open(&mut self, options: &SerialOptions) -> io::Result<()>;

    /// Take the current readable stream, if the port has one.
    ///
    /// Returning `None` means the port cannot be read any more. A port may
    /// hand out a new stream after a previous one ended.
    fn readable(&mut self) -> Option<PortReader>;

    /// Take the writable stream, if the port has one
    fn writable(&mut self) -> Option<PortWriter>;

    /// Close the port, releasing the device
    async fn close(&mut self) -> io::Result<()>;
}

/// The host's serial capability
#[async_trait]
pub trait SerialHost: Send + Sync {
    /// Whether the host supports serial ports at all
    fn is_available(&self) -> bool {
        true
    }

    /// Ask the host for a port matching `options`
    async fn request_port(&self, options: &PortRequestOptions) -> io::Result<Box<dyn SerialPort>>;

    /// Ports the host already grants access to
    async fn ports(&self) -> io::Result<Vec<Box<dyn SerialPort>>>;
}
