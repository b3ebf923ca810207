//! Native serial ports
//!
//! Implements the host capability on the operating system's serial ports via
//! `serialport` (enumeration) and `tokio-serial` (async I/O).

use async_trait::async_trait;
use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io;
use tokio::io::{ReadHalf, WriteHalf};
use tokio_serial::{SerialPort as _, SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

use crate::config::{FlowControl, Parity, SerialOptions};
use crate::host::{PortInfo, PortReader, PortRequestOptions, PortWriter, SerialHost, SerialPort};

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (usb_vendor_id, usb_product_id, manufacturer, product, serial_number) =
            match info.port_type {
                SerialPortType::UsbPort(usb_info) => (
                    Some(usb_info.vid),
                    Some(usb_info.pid),
                    usb_info.manufacturer,
                    usb_info.product,
                    usb_info.serial_number,
                ),
                _ => (None, None, None, None, None),
            };

        Self {
            name: info.port_name,
            usb_vendor_id,
            usb_product_id,
            manufacturer,
            product,
            serial_number,
        }
    }
}

/// Device families in listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DeviceFamily {
    /// USB CDC ACM, e.g. Arduino-style boards (`ttyACM*`)
    UsbCdc,
    /// USB to serial bridges (`ttyUSB*`)
    UsbBridge,
    Other,
}

/// Listing rank of a device path: family, then unit number, then file name.
///
/// `ttyACM10` sorts after `ttyACM2`; a family prefix without a number ranks
/// last within its family.
fn listing_rank(path: &str) -> (DeviceFamily, u32, &str) {
    let file = path.rsplit('/').next().unwrap_or(path);
    let unit = |suffix: &str| suffix.parse::<u32>().unwrap_or(u32::MAX);
    match (file.strip_prefix("ttyACM"), file.strip_prefix("ttyUSB")) {
        (Some(suffix), _) => (DeviceFamily::UsbCdc, unit(suffix), file),
        (_, Some(suffix)) => (DeviceFamily::UsbBridge, unit(suffix), file),
        _ => (DeviceFamily::Other, 0, file),
    }
}

/// Merge enumerated ports with bare device nodes, one entry per path.
///
/// Enumeration carries USB descriptors, so it wins over a node of the same
/// path.
fn merge_ports(
    enumerated: impl IntoIterator<Item = PortInfo>,
    nodes: impl IntoIterator<Item = String>,
) -> Vec<PortInfo> {
    let mut by_path: HashMap<String, PortInfo> = enumerated
        .into_iter()
        .map(|port| (port.name.clone(), port))
        .collect();
    for node in nodes {
        by_path
            .entry(node.clone())
            .or_insert_with(|| PortInfo::named(node));
    }

    let mut ports: Vec<PortInfo> = by_path.into_values().collect();
    ports.sort_by(|a, b| listing_rank(&a.name).cmp(&listing_rank(&b.name)));
    ports
}

/// USB serial nodes under /dev that enumeration can miss (no udev metadata)
#[cfg(target_os = "linux")]
fn usb_device_nodes() -> Vec<String> {
    let Ok(dir) = fs::read_dir("/dev") else {
        return Vec::new();
    };
    dir.flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|file| file.starts_with("ttyACM") || file.starts_with("ttyUSB"))
        .map(|file| format!("/dev/{file}"))
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn usb_device_nodes() -> Vec<String> {
    Vec::new()
}

/// Every serial port on this machine, USB CDC devices first
pub fn list_ports() -> Vec<PortInfo> {
    let enumerated = serialport::available_ports().unwrap_or_else(|e| {
        warn!(error = %e, "serial port enumeration failed");
        Vec::new()
    });
    let ports = merge_ports(enumerated.into_iter().map(PortInfo::from), usb_device_nodes());
    debug!(count = ports.len(), "listed serial ports");
    ports
}

async fn list_ports_blocking() -> io::Result<Vec<PortInfo>> {
    tokio::task::spawn_blocking(list_ports)
        .await
        .map_err(io::Error::other)
}

/// Serial capability backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSerialHost;

impl NativeSerialHost {
    /// Create the native host
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SerialHost for NativeSerialHost {
    fn is_available(&self) -> bool {
        serialport::available_ports().is_ok()
    }

    /// There is no selection prompt on the native host: the first listed
    /// port accepted by `options` is returned.
    async fn request_port(&self, options: &PortRequestOptions) -> io::Result<Box<dyn SerialPort>> {
        list_ports_blocking()
            .await?
            .into_iter()
            .find(|info| options.matches(info))
            .map(|info| Box::new(NativePort::new(info)) as Box<dyn SerialPort>)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "no serial port matches the request")
            })
    }

    async fn ports(&self) -> io::Result<Vec<Box<dyn SerialPort>>> {
        Ok(list_ports_blocking()
            .await?
            .into_iter()
            .map(|info| Box::new(NativePort::new(info)) as Box<dyn SerialPort>)
            .collect())
    }
}

fn data_bits(bits: u8) -> io::Result<tokio_serial::DataBits> {
    match bits {
        5 => Ok(tokio_serial::DataBits::Five),
        6 => Ok(tokio_serial::DataBits::Six),
        7 => Ok(tokio_serial::DataBits::Seven),
        8 => Ok(tokio_serial::DataBits::Eight),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported data bits: {other}"),
        )),
    }
}

fn stop_bits(bits: u8) -> io::Result<tokio_serial::StopBits> {
    match bits {
        1 => Ok(tokio_serial::StopBits::One),
        2 => Ok(tokio_serial::StopBits::Two),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported stop bits: {other}"),
        )),
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// An operating system serial port
pub struct NativePort {
    info: PortInfo,
    reader: Option<ReadHalf<SerialStream>>,
    writer: Option<WriteHalf<SerialStream>>,
    open: bool,
}

impl NativePort {
    /// Port handle for `info`; nothing is opened yet
    pub fn new(info: PortInfo) -> Self {
        Self {
            info,
            reader: None,
            writer: None,
            open: false,
        }
    }

    /// Port handle for a device path such as "/dev/ttyUSB0" or "COM3"
    pub fn from_name(name: impl Into<String>) -> Self {
        Self::new(PortInfo::named(name))
    }

    /// Whether the port is currently open
    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl std::fmt::Debug for NativePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativePort")
            .field("info", &self.info)
            .field("open", &self.open)
            .finish()
    }
}

#[async_trait]
impl SerialPort for NativePort {
    fn info(&self) -> PortInfo {
        self.info.clone()
    }

    async fn open(&mut self, options: &SerialOptions) -> io::Result<()> {
        if self.open {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is already open", self.info.name),
            ));
        }

        let mut stream = tokio_serial::new(&self.info.name, options.baud_rate)
            .data_bits(data_bits(options.data_bits)?)
            .stop_bits(stop_bits(options.stop_bits)?)
            .parity(options.parity.into())
            .flow_control(options.flow_control.into())
            .open_native_async()
            .map_err(io::Error::from)?;

        // Opening usually toggles DTR; keep DTR and RTS asserted so boards
        // with auto-reset circuits do not reboot mid-session
        if let Err(e) = stream.write_data_terminal_ready(true) {
            debug!(port = %self.info.name, error = %e, "failed to set DTR high (continuing)");
        }
        if let Err(e) = stream.write_request_to_send(true) {
            debug!(port = %self.info.name, error = %e, "failed to set RTS high (continuing)");
        }

        let (reader, writer) = tokio::io::split(stream);
        self.reader = Some(reader);
        self.writer = Some(writer);
        self.open = true;
        Ok(())
    }

    fn readable(&mut self) -> Option<PortReader> {
        self.reader.take().map(|r| Box::new(r) as PortReader)
    }

    fn writable(&mut self) -> Option<PortWriter> {
        self.writer.take().map(|w| Box::new(w) as PortWriter)
    }

    async fn close(&mut self) -> io::Result<()> {
        if !self.open {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} is not open", self.info.name),
            ));
        }
        self.reader = None;
        self.writer = None;
        self.open = false;
        Ok(())
    }
}
