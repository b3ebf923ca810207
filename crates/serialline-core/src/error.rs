//! Session errors

use std::fmt;
use thiserror::Error;

use crate::host::SerialPort;
use crate::session::SessionState;

/// Errors that can occur while driving a serial session
#[derive(Error, Debug)]
pub enum SessionError {
    /// The host offers no serial access
    #[error("Serial capability is not available on this host")]
    CapabilityUnavailable,

    /// The port refused to open
    #[error("Failed to open port: {0}")]
    PortOpen(#[source] std::io::Error),

    /// The opened port exposes no writable stream
    #[error("Port has no writable stream")]
    PortNotWritable,

    /// Writing to the port failed
    #[error("Write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Reading from the port failed
    #[error("Read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Releasing the port failed
    #[error("Failed to close port: {0}")]
    PortClose(#[source] std::io::Error),

    /// The operation is not allowed in the current session state
    #[error("Cannot {operation} while session is {state:?}")]
    InvalidState {
        /// What was attempted
        operation: &'static str,
        /// State the session was in
        state: SessionState,
    },

    /// Port options or session settings are out of range
    #[error("Invalid serial options: {0}")]
    InvalidOptions(String),
}

/// A failed `connect`, handing the port back to the caller
pub struct ConnectError {
    port: Box<dyn SerialPort>,
    error: SessionError,
}

impl ConnectError {
    pub(crate) fn new(port: Box<dyn SerialPort>, error: SessionError) -> Self {
        Self { port, error }
    }

    /// Why the connection failed
    pub fn error(&self) -> &SessionError {
        &self.error
    }

    /// Take the port back, e.g. to retry with another session
    pub fn into_port(self) -> Box<dyn SerialPort> {
        self.port
    }

    /// Split into the port and the error
    pub fn into_parts(self) -> (Box<dyn SerialPort>, SessionError) {
        (self.port, self.error)
    }
}

impl fmt::Debug for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectError")
            .field("port", &self.port.info().name)
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.port.info().name, self.error)
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<ConnectError> for SessionError {
    fn from(err: ConnectError) -> Self {
        err.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SerialOptions;
    use crate::host::{PortInfo, PortReader, PortWriter};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::error::Error as _;

    struct IdlePort;

    #[async_trait]
    impl SerialPort for IdlePort {
        fn info(&self) -> PortInfo {
            PortInfo::named("/dev/ttyUSB1")
        }

        async fn open(&mut self, _options: &SerialOptions) -> std::io::Result<()> {
            Ok(())
        }

        fn readable(&mut self) -> Option<PortReader> {
            None
        }

        fn writable(&mut self) -> Option<PortWriter> {
            None
        }

        async fn close(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_invalid_state_message() {
        let err = SessionError::InvalidState {
            operation: "send data",
            state: SessionState::Closed,
        };
        assert_eq!(err.to_string(), "Cannot send data while session is Closed");
    }

    #[test]
    fn test_connect_error_keeps_port_and_cause() {
        let err = ConnectError::new(Box::new(IdlePort), SessionError::PortNotWritable);
        assert_eq!(err.to_string(), "/dev/ttyUSB1: Port has no writable stream");
        assert!(err.source().is_some());

        let (port, cause) = err.into_parts();
        assert_eq!(port.info().name, "/dev/ttyUSB1");
        assert!(matches!(cause, SessionError::PortNotWritable));
    }
}
