//! # SerialLine Core Library
//!
//! Line-oriented serial port sessions.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A buffering line splitter with a configurable delimiter
//! - Streaming text codecs for the inbound and outbound byte streams
//! - A serial session that opens a port, delivers decoded lines to a callback,
//!   sends text and tears everything down in a fixed order
//! - Port discovery helpers over an injectable host capability
//! - A native host backed by the operating system's serial ports
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serialline_core::{native::NativeSerialHost, SerialSession};
//!
//! let host = Arc::new(NativeSerialHost::new());
//! let mut session = SerialSession::new(host, |line| println!("<- {line}"));
//!
//! let port = session.get_port_by_vendor_id(0x2341).await.expect("no Arduino attached");
//! session.connect(port).await?;
//! session.send_data("status\n").await?;
//! session.close().await?;
//! ```

pub mod codec;
pub mod config;
pub mod discovery;
mod error;
pub mod host;
pub mod native;
pub mod session;
pub mod splitter;

pub use codec::{LineCodec, TextEncoder};
pub use config::{ConfigError, FlowControl, Parity, SerialOptions, SessionConfig};
pub use discovery::{get_port_by_vendor_id, request_port};
pub use error::{ConnectError, SessionError};
pub use host::{PortFilter, PortInfo, PortReader, PortRequestOptions, PortWriter, SerialHost, SerialPort};
pub use session::{SerialSession, SessionState};
pub use splitter::LineSplitter;

/// Default line delimiter
pub const DEFAULT_DELIMITER: &str = "\n";

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
