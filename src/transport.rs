//! Physical HID transport.
//!
//! The session only needs half-duplex request/reply over a byte pipe, so the
//! device is reached through [`HidTransport`]; [`HidapiTransport`] is the
//! production implementation.

use hidapi::{DeviceInfo, HidApi, HidDevice};
use tracing::debug;

use crate::{
    constants::{NINTENDO_VID, PRO_CONTROLLER_PID, USB_SERIAL},
    error::TransportError,
};

pub trait HidTransport {
    /// USB product id reported for the opened device.
    fn product_id(&self) -> u16;

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read one report, waiting at most `timeout_ms`. Returns 0 on timeout.
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;
}

pub struct HidapiTransport {
    device: HidDevice,
    product_id: u16,
}

impl HidapiTransport {
    pub fn open(api: &HidApi, info: &DeviceInfo) -> Result<Self, TransportError> {
        let device = info.open_device(api)?;
        Ok(Self {
            device,
            product_id: info.product_id(),
        })
    }
}

impl HidTransport for HidapiTransport {
    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(self.device.write(data)?)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        Ok(self.device.read_timeout(buf, timeout_ms)?)
    }
}

/// Pro Controllers attached over USB. hidapi can hand back non-matching
/// devices, so the ids are checked again here.
pub fn find_pro_controllers(api: &HidApi) -> Vec<&DeviceInfo> {
    api.device_list()
        .filter(|info| {
            info.vendor_id() == NINTENDO_VID && info.product_id() == PRO_CONTROLLER_PID
        })
        .filter(|info| {
            let usb = info.serial_number() == Some(USB_SERIAL);
            if !usb {
                debug!(path = ?info.path(), "skipping controller not connected via USB");
            }
            usb
        })
        .collect()
}
