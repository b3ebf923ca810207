//! Port discovery
//!
//! Both helpers swallow host errors: they log and return `None`.

use tracing::{debug, error, warn};

use crate::host::{PortRequestOptions, SerialHost, SerialPort};

/// Ask the host to pick a port matching `options`.
///
/// Returns `None` when the host has no serial capability, the user cancels
/// the selection or the host fails.
pub async fn request_port(
    host: &dyn SerialHost,
    options: &PortRequestOptions,
) -> Option<Box<dyn SerialPort>> {
    if !host.is_available() {
        warn!("request_port: serial capability not available");
        return None;
    }

    match host.request_port(options).await {
        Ok(port) => {
            debug!(port = %port.info().name, "request_port: port selected");
            Some(port)
        }
        Err(e) => {
            error!(error = %e, ?options, "request_port failed");
            None
        }
    }
}

/// Find the first already-authorized port whose USB vendor ID is `vendor_id`
pub async fn get_port_by_vendor_id(
    host: &dyn SerialHost,
    vendor_id: u16,
) -> Option<Box<dyn SerialPort>> {
    if !host.is_available() {
        return None;
    }

    let ports = match host.ports().await {
        Ok(ports) => ports,
        Err(e) => {
            warn!(error = %e, "get_port_by_vendor_id: listing ports failed");
            return None;
        }
    };

    let found = ports
        .into_iter()
        .find(|port| port.info().usb_vendor_id == Some(vendor_id));
    if found.is_none() {
        debug!(vendor_id = %format!("{vendor_id:#06x}"), "no port with vendor id");
    }
    found
}
