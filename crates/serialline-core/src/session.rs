//! Serial session management
//!
//! Handles the lifecycle of one serial connection: opening the port, the
//! inbound read loop that delivers lines to a callback, outbound writes and
//! the ordered teardown.

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{LineCodec, TextEncoder};
use crate::config::SessionConfig;
use crate::discovery;
use crate::error::{ConnectError, SessionError};
use crate::host::{PortInfo, PortRequestOptions, PortWriter, SerialHost, SerialPort};

/// Callback receiving each decoded line
///
/// `Sync` keeps `&SerialSession` shareable across tasks, so futures such as
/// [`SerialSession::send_data`] stay `Send`. The session only ever calls it
/// from the read loop task.
pub type LineCallback = Box<dyn FnMut(String) + Send + Sync + 'static>;

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// Outstanding writes queued for the outbound pipeline
const WRITE_QUEUE_DEPTH: usize = 32;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, not connected
    Idle,
    /// Port open in progress
    Opening,
    /// Connected, reading and writing
    Open,
    /// Teardown in progress
    Closing,
    /// Torn down; the session cannot be reused
    Closed,
}

struct WriteRequest {
    text: String,
    done: oneshot::Sender<io::Result<()>>,
}

/// Handle to the outbound pipeline task
struct Writer {
    requests: mpsc::Sender<WriteRequest>,
    pipeline: JoinHandle<io::Result<()>>,
}

impl Writer {
    fn spawn(sink: PortWriter) -> Self {
        let (requests, rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let pipeline = tokio::spawn(run_writer(sink, rx));
        Self { requests, pipeline }
    }

    async fn write(&self, text: String) -> io::Result<()> {
        let (done, result) = oneshot::channel();
        self.requests
            .send(WriteRequest { text, done })
            .await
            .map_err(|_| pipeline_closed())?;
        result.await.map_err(|_| pipeline_closed())?
    }
}

fn pipeline_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "outbound pipeline is closed")
}

/// Encode queued text onto the port until the sender side is dropped.
///
/// The first failed write ends the pipeline; later writes see it closed.
async fn run_writer(sink: PortWriter, mut requests: mpsc::Receiver<WriteRequest>) -> io::Result<()> {
    let mut framed = FramedWrite::new(sink, TextEncoder);
    while let Some(WriteRequest { text, done }) = requests.recv().await {
        match framed.send(text).await {
            Ok(()) => {
                let _ = done.send(Ok(()));
            }
            Err(e) => {
                let kind = e.kind();
                let _ = done.send(Err(e));
                return Err(io::Error::new(kind, "outbound pipeline aborted by write error"));
            }
        }
    }
    framed.close().await
}

/// Handle to the running read loop
struct Reader {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Everything the read loop task owns
struct ReadLoop {
    port: SharedPort,
    port_name: String,
    keep_reading: Arc<AtomicBool>,
    cancel: CancellationToken,
    delimiter: String,
    buffer_size: usize,
    skip_empty_lines: bool,
    max_restarts: Option<u32>,
}

impl ReadLoop {
    async fn run(self, mut on_line: LineCallback) {
        let mut activations: u32 = 0;

        while self.keep_reading.load(Ordering::SeqCst) && !self.cancel.is_cancelled() {
            // Checked before asking for a stream so the port keeps it
            if let Some(max) = self.max_restarts {
                if activations > max {
                    warn!(port = %self.port_name, max, "read loop restart limit reached");
                    break;
                }
            }

            let readable = self.port.lock().await.readable();
            let Some(reader) = readable else {
                debug!(port = %self.port_name, "port has no readable stream");
                break;
            };
            activations += 1;
            debug!(port = %self.port_name, activation = activations, "read loop started");

            let codec = LineCodec::new(self.delimiter.as_str());
            let mut lines = FramedRead::with_capacity(reader, codec, self.buffer_size);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    next = lines.next() => next,
                };

                match next {
                    Some(Ok(line)) => {
                        if line.is_empty() && self.skip_empty_lines {
                            continue;
                        }
                        on_line(line);
                    }
                    Some(Err(e)) => {
                        let err = SessionError::Read(e);
                        warn!(port = %self.port_name, error = %err, "read loop error, device likely disconnected");
                        break;
                    }
                    None => {
                        debug!(port = %self.port_name, "readable stream ended");
                        break;
                    }
                }
            }
        }

        debug!(port = %self.port_name, activations, "read loop finished");
    }
}

/// Connect attempt in progress.
///
/// Rolls the session back to `Idle` unless committed, which also covers a
/// `connect` future dropped while the port is opening.
struct OpeningGuard<'a> {
    state: &'a mut SessionState,
    keep_reading: &'a AtomicBool,
    committed: bool,
}

impl<'a> OpeningGuard<'a> {
    fn begin(state: &'a mut SessionState, keep_reading: &'a AtomicBool) -> Self {
        keep_reading.store(true, Ordering::SeqCst);
        *state = SessionState::Opening;
        Self {
            state,
            keep_reading,
            committed: false,
        }
    }

    fn commit(mut self) {
        *self.state = SessionState::Open;
        self.committed = true;
    }
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.keep_reading.store(false, Ordering::SeqCst);
            *self.state = SessionState::Idle;
            debug!("connect attempt abandoned, session back to idle");
        }
    }
}

/// A serial connection delivering text lines to a callback.
///
/// One session drives one port through one lifecycle:
/// `Idle -> Opening -> Open -> Closing -> Closed`. A failed [`connect`]
/// returns to `Idle` so it can be retried; `Closed` is final.
///
/// [`connect`]: SerialSession::connect
pub struct SerialSession {
    host: Arc<dyn SerialHost>,
    config: SessionConfig,
    // Swapped for a no-op when the read loop takes it
    on_line: LineCallback,
    state: SessionState,
    port: Option<SharedPort>,
    port_info: Option<PortInfo>,
    writer: Option<Writer>,
    reader: Option<Reader>,
    keep_reading: Arc<AtomicBool>,
}

impl SerialSession {
    /// Create a session with the default configuration
    pub fn new<F>(host: Arc<dyn SerialHost>, on_line: F) -> Self
    where
        F: FnMut(String) + Send + Sync + 'static,
    {
        Self::with_config(host, on_line, SessionConfig::default())
    }

    /// Create a session with custom port options and delimiter
    pub fn with_config<F>(host: Arc<dyn SerialHost>, on_line: F, config: SessionConfig) -> Self
    where
        F: FnMut(String) + Send + Sync + 'static,
    {
        Self {
            host,
            config,
            on_line: Box::new(on_line),
            state: SessionState::Idle,
            port: None,
            port_info: None,
            writer: None,
            reader: None,
            keep_reading: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the read loop is allowed to keep running
    pub fn keep_reading(&self) -> bool {
        self.keep_reading.load(Ordering::SeqCst)
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Info of the connected port
    pub fn port_info(&self) -> Option<&PortInfo> {
        self.port_info.as_ref()
    }

    /// Ask the host to select a port, see [`discovery::request_port`]
    pub async fn request_port(&self, options: &PortRequestOptions) -> Option<Box<dyn SerialPort>> {
        discovery::request_port(self.host.as_ref(), options).await
    }

    /// Find an authorized port by USB vendor ID, see [`discovery::get_port_by_vendor_id`]
    pub async fn get_port_by_vendor_id(&self, vendor_id: u16) -> Option<Box<dyn SerialPort>> {
        discovery::get_port_by_vendor_id(self.host.as_ref(), vendor_id).await
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state,
        }
    }

    /// Open `port`, start the read loop and the outbound pipeline.
    ///
    /// On failure the port is handed back inside the [`ConnectError`] and the
    /// session stays usable for another attempt. Dropping the returned future
    /// before it completes also leaves the session `Idle`.
    pub async fn connect(&mut self, mut port: Box<dyn SerialPort>) -> Result<PortInfo, ConnectError> {
        let info = port.info();

        if self.state != SessionState::Idle {
            return Err(ConnectError::new(port, self.invalid_state("connect")));
        }

        if !self.host.is_available() {
            error!(port = %info.name, "serial capability is not available on this host");
            return Err(ConnectError::new(port, SessionError::CapabilityUnavailable));
        }

        if let Err(e) = self.config.validate() {
            error!(port = %info.name, error = %e, "refusing to open port");
            return Err(ConnectError::new(port, e));
        }

        let opening = OpeningGuard::begin(&mut self.state, &self.keep_reading);

        let options = &self.config.options;
        info!(
            port = %info.name,
            baud_rate = options.baud_rate,
            data_bits = options.data_bits,
            parity = ?options.parity,
            "opening serial port"
        );

        if let Err(e) = port.open(options).await {
            error!(port = %info.name, error = %e, "opening port failed");
            return Err(ConnectError::new(port, SessionError::PortOpen(e)));
        }

        let Some(sink) = port.writable() else {
            error!(port = %info.name, "port has no writable stream");
            if let Err(e) = port.close().await {
                warn!(port = %info.name, error = %e, "closing unwritable port failed");
            }
            return Err(ConnectError::new(port, SessionError::PortNotWritable));
        };

        let writer = Writer::spawn(sink);
        let port: SharedPort = Arc::new(Mutex::new(port));
        let cancel = CancellationToken::new();
        let read_loop = ReadLoop {
            port: port.clone(),
            port_name: info.name.clone(),
            keep_reading: self.keep_reading.clone(),
            cancel: cancel.clone(),
            delimiter: self.config.delimiter.clone(),
            buffer_size: self.config.options.buffer_size,
            skip_empty_lines: self.config.skip_empty_lines,
            max_restarts: self.config.max_read_restarts,
        };
        let on_line = std::mem::replace(&mut self.on_line, Box::new(|_| {}));
        let task = tokio::spawn(read_loop.run(on_line));

        self.port = Some(port);
        self.port_info = Some(info.clone());
        self.writer = Some(writer);
        self.reader = Some(Reader { cancel, task });
        opening.commit();

        info!(port = %info.name, "serial port open");
        Ok(info)
    }

    /// Encode `text` and write it to the port.
    ///
    /// Resolves once the bytes have been flushed to the port.
    pub async fn send_data(&self, text: impl Into<String>) -> Result<(), SessionError> {
        if self.state != SessionState::Open {
            return Err(self.invalid_state("send data"));
        }
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| self.invalid_state("send data"))?;

        writer.write(text.into()).await.map_err(|e| {
            warn!(error = %e, "serial write failed");
            SessionError::Write(e)
        })
    }

    /// Tear the connection down.
    ///
    /// Steps run strictly in order: stop the read loop from restarting,
    /// cancel the reader, wait for the read loop, close the writer, wait for
    /// the outbound pipeline, close the port.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Open {
            return Err(self.invalid_state("close"));
        }
        self.state = SessionState::Closing;
        let name = self
            .port_info
            .as_ref()
            .map(|info| info.name.clone())
            .unwrap_or_default();
        debug!(port = %name, "closing serial session");

        self.keep_reading.store(false, Ordering::SeqCst);

        if let Some(Reader { cancel, task }) = self.reader.take() {
            cancel.cancel();
            if let Err(e) = task.await {
                debug!(port = %name, error = %e, "read loop ended abnormally");
            }
        }

        if let Some(Writer { requests, pipeline }) = self.writer.take() {
            drop(requests);
            match pipeline.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(port = %name, error = %e, "outbound pipeline finished with error"),
                Err(e) => warn!(port = %name, error = %e, "outbound pipeline task failed"),
            }
        }

        let result = match self.port.take() {
            Some(port) => {
                let mut port = port.lock().await;
                let closed = port.close().await;
                closed.map_err(SessionError::PortClose)
            }
            None => Ok(()),
        };
        self.state = SessionState::Closed;

        match &result {
            Ok(()) => info!(port = %name, "serial port closed"),
            Err(e) => error!(port = %name, error = %e, "serial port close failed"),
        }
        result
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.keep_reading.store(false, Ordering::SeqCst);
            reader.cancel.cancel();
            warn!("serial session dropped while open; port was not closed");
        }
    }
}

impl std::fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSession")
            .field("state", &self.state)
            .field("port", &self.port_info.as_ref().map(|info| &info.name))
            .field("keep_reading", &self.keep_reading())
            .finish_non_exhaustive()
    }
}
