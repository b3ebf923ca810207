//! In-memory serial host used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serialline_core::{
    PortInfo, PortReader, PortRequestOptions, PortWriter, SerialHost, SerialOptions, SerialPort,
};
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;

/// Shared record of what happened to a mock port, in order
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<&'static str>>>);

impl EventLog {
    pub fn push(&self, event: &'static str) {
        self.0.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

/// Reader that records when the session lets go of it
pub struct TrackedReader {
    inner: PortReader,
    events: EventLog,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.events.push("reader_released");
    }
}

/// Writer that records when it is shut down
pub struct TrackedWriter {
    inner: PortWriter,
    events: EventLog,
}

impl AsyncWrite for TrackedWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = Pin::new(&mut self.inner).poll_shutdown(cx);
        if result.is_ready() {
            self.events.push("writer_shutdown");
        }
        result
    }
}

/// Reader whose every read fails, like an unplugged device
pub struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "device disconnected",
        )))
    }
}

/// Writer whose every write fails
pub struct BrokenWriter;

impl AsyncWrite for BrokenWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "device disconnected",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Scriptable port
pub struct MockPort {
    info: PortInfo,
    readers: VecDeque<PortReader>,
    writer: Option<PortWriter>,
    fail_open: bool,
    open_delay: Option<Duration>,
    is_open: bool,
    events: EventLog,
}

impl MockPort {
    pub fn new(info: PortInfo) -> Self {
        Self {
            info,
            readers: VecDeque::new(),
            writer: None,
            fail_open: false,
            open_delay: None,
            is_open: false,
            events: EventLog::default(),
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new(PortInfo::named(name))
    }

    pub fn events(&self) -> EventLog {
        self.events.clone()
    }

    /// Queue a readable stream; each read loop activation takes the next one.
    /// Only streams actually handed out are tracked.
    pub fn with_reader<R>(mut self, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.readers.push_back(Box::new(reader));
        self
    }

    pub fn with_writer<W>(mut self, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.writer = Some(Box::new(TrackedWriter {
            inner: Box::new(writer),
            events: self.events.clone(),
        }));
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make `open` take `delay` before it completes
    pub fn slow_open(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn boxed(self) -> Box<dyn SerialPort> {
        Box::new(self)
    }
}

#[async_trait]
impl SerialPort for MockPort {
    fn info(&self) -> PortInfo {
        self.info.clone()
    }

    async fn open(&mut self, _options: &SerialOptions) -> io::Result<()> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_open {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied",
            ));
        }
        if self.is_open {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "already open"));
        }
        self.is_open = true;
        self.events.push("open");
        Ok(())
    }

    fn readable(&mut self) -> Option<PortReader> {
        if !self.is_open {
            return None;
        }
        let inner = self.readers.pop_front()?;
        Some(Box::new(TrackedReader {
            inner,
            events: self.events.clone(),
        }))
    }

    fn writable(&mut self) -> Option<PortWriter> {
        if !self.is_open {
            return None;
        }
        self.writer.take()
    }

    async fn close(&mut self) -> io::Result<()> {
        self.is_open = false;
        self.events.push("port_closed");
        Ok(())
    }
}

/// Device side of a port wired with duplex pipes
pub struct Device {
    /// One pipe per read loop activation; write here to send to the host
    pub feeds: Vec<DuplexStream>,
    /// Bytes the session wrote to the port
    pub received: DuplexStream,
}

/// A port with `activations` readable streams and a writable stream
pub fn linked_port(name: &str, activations: usize) -> (MockPort, Device) {
    let mut port = MockPort::named(name);
    let mut feeds = Vec::new();
    for _ in 0..activations {
        let (host_side, device_side) = tokio::io::duplex(256);
        port = port.with_reader(host_side);
        feeds.push(device_side);
    }
    let (host_side, received) = tokio::io::duplex(256);
    port = port.with_writer(host_side);
    (port, Device { feeds, received })
}

/// Host whose availability can be toggled
#[derive(Default)]
pub struct MockHost {
    unavailable: AtomicBool,
    known: Mutex<Vec<PortInfo>>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_ports(ports: Vec<PortInfo>) -> Arc<Self> {
        let host = Self::default();
        *host.known.lock().unwrap() = ports;
        Arc::new(host)
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

#[async_trait]
impl SerialHost for MockHost {
    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn request_port(&self, options: &PortRequestOptions) -> io::Result<Box<dyn SerialPort>> {
        let known = self.known.lock().unwrap().clone();
        known
            .into_iter()
            .find(|info| options.matches(info))
            .map(|info| MockPort::new(info).boxed())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no port selected"))
    }

    async fn ports(&self) -> io::Result<Vec<Box<dyn SerialPort>>> {
        let known = self.known.lock().unwrap().clone();
        Ok(known.into_iter().map(|info| MockPort::new(info).boxed()).collect())
    }
}

/// Callback forwarding lines into a channel
pub fn line_channel() -> (
    impl FnMut(String) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<String>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = move |line: String| {
        let _ = tx.send(line);
    };
    (callback, rx)
}

/// Next delivered line, or None if nothing arrives within a second
pub async fn next_line(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .ok()
        .flatten()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
