//! hidapi-backed transport over the device's interrupt endpoint pair

use std::ffi::CString;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::protocol::{MAX_PACKETS, PACKET_SIZE};
use crate::types::{DiscoveredDevice, TransportDeviceInfo};
use crate::Transport;

/// Upper bound on stale packets dropped by one reset
const MAX_DRAINED_PACKETS: usize = 4 * MAX_PACKETS;

/// Call `read_one` until it reports an empty queue or `limit` packets were
/// dropped. Returns the number dropped.
fn drain_pending(
    limit: usize,
    mut read_one: impl FnMut() -> Result<bool, TransportError>,
) -> Result<usize, TransportError> {
    let mut drained = 0;
    while drained < limit && read_one()? {
        drained += 1;
    }
    Ok(drained)
}

/// List HID interfaces matching `vid`/`pid`, interface 0 first
pub fn list_devices(api: &HidApi, vid: u16, pid: u16) -> Vec<DiscoveredDevice> {
    let mut devices: Vec<DiscoveredDevice> = api
        .device_list()
        .filter(|d| d.vendor_id() == vid && d.product_id() == pid)
        .map(|d| DiscoveredDevice {
            info: TransportDeviceInfo {
                vid: d.vendor_id(),
                pid: d.product_id(),
                device_path: d.path().to_string_lossy().into_owned(),
                interface_number: d.interface_number(),
                serial: d.serial_number().map(str::to_string),
                product_name: d.product_string().map(str::to_string),
            },
        })
        .collect();
    devices.sort_by_key(|d| d.info.interface_number != 0);
    debug!("Found {} interface(s) for {:04X}:{:04X}", devices.len(), vid, pid);
    devices
}

/// Raw 64-byte packet transport over a HID interface
pub struct HidTransport {
    device: Mutex<Option<HidDevice>>,
    info: TransportDeviceInfo,
}

impl HidTransport {
    /// Open a discovered device
    pub fn open(api: &HidApi, device: &DiscoveredDevice) -> Result<Self, TransportError> {
        let path = CString::new(device.info.device_path.as_str())
            .map_err(|e| TransportError::Internal(e.to_string()))?;
        let handle = api.open_path(&path)?;
        info!(
            "Opened {:04X}:{:04X} {}",
            device.info.vid,
            device.info.pid,
            device.info.product_name.as_deref().unwrap_or("")
        );
        Ok(Self {
            device: Mutex::new(Some(handle)),
            info: device.info.clone(),
        })
    }

    /// Open the first interface matching `vid`/`pid`
    pub fn open_first(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let api = HidApi::new()?;
        let device = list_devices(&api, vid, pid)
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::DeviceNotFound(format!("{:04X}:{:04X}", vid, pid)))?;
        Self::open(&api, &device)
    }
}

impl Transport for HidTransport {
    fn send_packet(&self, packet: &[u8]) -> Result<(), TransportError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(TransportError::Disconnected)?;

        // Report ID 0 prefix, packet padded to the endpoint size
        let mut buf = [0u8; PACKET_SIZE + 1];
        let len = packet.len().min(PACKET_SIZE);
        buf[1..=len].copy_from_slice(&packet[..len]);
        device.write(&buf)?;
        Ok(())
    }

    fn read_packet(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(TransportError::Disconnected)?;

        let mut buf = vec![0u8; PACKET_SIZE];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let n = device.read_timeout(&mut buf, timeout_ms)?;
        if n == 0 {
            return Err(TransportError::Timeout);
        }
        buf.truncate(n);
        Ok(buf)
    }

    /// Drop input reports still queued from before
    fn reset(&self) -> Result<(), TransportError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(TransportError::Disconnected)?;

        let mut buf = [0u8; PACKET_SIZE];
        let drained = drain_pending(MAX_DRAINED_PACKETS, || {
            Ok(device.read_timeout(&mut buf, 0)? > 0)
        })?;
        if drained == MAX_DRAINED_PACKETS {
            warn!(
                "Reset {}: device still streaming after {} packets",
                self.info.device_path, drained
            );
        } else {
            debug!("Reset {}: drained {} stale packet(s)", self.info.device_path, drained);
        }
        Ok(())
    }

    fn dispose(&self) -> Result<(), TransportError> {
        if self.device.lock().take().is_some() {
            debug!("Closed {}", self.info.device_path);
        }
        Ok(())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_stops_at_empty_queue() {
        let mut queued = 3;
        let drained = drain_pending(MAX_DRAINED_PACKETS, || {
            if queued == 0 {
                return Ok(false);
            }
            queued -= 1;
            Ok(true)
        })
        .unwrap();
        assert_eq!(drained, 3);
    }

    #[test]
    fn test_drain_is_bounded() {
        let mut reads = 0;
        let drained = drain_pending(MAX_DRAINED_PACKETS, || {
            reads += 1;
            Ok(true)
        })
        .unwrap();
        assert_eq!(drained, MAX_DRAINED_PACKETS);
        assert_eq!(reads, MAX_DRAINED_PACKETS);
    }

    #[test]
    fn test_drain_propagates_errors() {
        let result = drain_pending(MAX_DRAINED_PACKETS, || Err(TransportError::Disconnected));
        assert!(matches!(result, Err(TransportError::Disconnected)));
    }
}
