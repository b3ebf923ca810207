//! Serial Line Monitor
//!
//! Prints every line received from a serial device and sends each line typed
//! on stdin. Ctrl-C closes the session.
//!
//! Usage:
//!   cargo run --example monitor -- [OPTIONS] [PORT]
//!
//! Options:
//!   --port PORT       Serial port (default: first port found)
//!   --vid ID          Pick the first port with this USB vendor ID (hex)
//!   --baud RATE       Baud rate (default: 9600)
//!   --crlf            Split and send lines with "\r\n" instead of "\n"
//!   --config FILE     Load session settings from a JSON file

use anyhow::{anyhow, Context};
use serialline_core::{
    native::{NativePort, NativeSerialHost},
    PortRequestOptions, SerialOptions, SerialPort, SerialSession, SessionConfig, SessionError,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut port_name: Option<String> = None;
    let mut vendor_id: Option<u16> = None;
    let mut baud_rate: Option<u32> = None;
    let mut crlf = false;
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                port_name = args.get(i).cloned();
            }
            "--vid" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    let digits = v.trim_start_matches("0x");
                    vendor_id = Some(u16::from_str_radix(digits, 16).context("invalid vendor ID")?);
                }
            }
            "--baud" | "-b" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    baud_rate = Some(v.parse().context("invalid baud rate")?);
                }
            }
            "--crlf" => crlf = true,
            "--config" | "-c" => {
                i += 1;
                config_path = args.get(i).cloned();
            }
            other if !other.starts_with('-') => port_name = Some(other.to_string()),
            other => return Err(anyhow!("unknown option: {other}")),
        }
        i += 1;
    }

    let mut config = match &config_path {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::with_options(SerialOptions::default()),
    };
    if let Some(baud) = baud_rate {
        config.options.baud_rate = baud;
    }
    if crlf {
        config.delimiter = "\r\n".to_string();
    }
    let delimiter = config.delimiter.clone();

    let host = Arc::new(NativeSerialHost::new());
    let mut session = SerialSession::with_config(host, |line| println!("<- {line}"), config);

    let port: Box<dyn SerialPort> = match (port_name, vendor_id) {
        (Some(name), _) => Box::new(NativePort::from_name(name)),
        (None, Some(vid)) => session
            .get_port_by_vendor_id(vid)
            .await
            .ok_or_else(|| anyhow!("no port with vendor ID {vid:#06x}"))?,
        (None, None) => session
            .request_port(&PortRequestOptions::default())
            .await
            .ok_or_else(|| anyhow!("no serial port found"))?,
    };

    let info = session.connect(port).await.map_err(SessionError::from)?;
    println!("Connected to {} (Ctrl-C to quit)", info.name);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin.next_line() => match line? {
                Some(text) => session.send_data(format!("{text}{delimiter}")).await?,
                None => break,
            },
        }
    }

    session.close().await?;
    println!("Closed");
    Ok(())
}
