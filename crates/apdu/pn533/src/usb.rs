//! USB bulk pipe over `nusb`

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use nusb::transfer::RequestBuffer;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::bulk::BulkIo;
use crate::error::{Pn533Error, Result};
use crate::frame::MAX_FRAME_SIZE;

const ENDPOINT_OUT: u8 = 0x04;
const ENDPOINT_IN: u8 = 0x84;

/// Supported devices as (vendor id, product id, name)
pub const KNOWN_DEVICES: [(u16, u16, &str); 3] = [
    (0x04CC, 0x2533, "NXP PN533"),
    (0x04E6, 0x5591, "SCM SCL3711"),
    (0x054C, 0x02E1, "Sony RC-S956"),
];

/// A supported device found on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    /// Model name
    pub name: &'static str,
    /// Bus number
    pub bus: u8,
    /// Device address on the bus
    pub address: u8,
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
}

impl fmt::Display for UsbDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x}) at {:03}:{:03}",
            self.name, self.vendor_id, self.product_id, self.bus, self.address
        )
    }
}

fn known_name(vendor_id: u16, product_id: u16) -> Option<&'static str> {
    KNOWN_DEVICES
        .iter()
        .find(|(vid, pid, _)| *vid == vendor_id && *pid == product_id)
        .map(|(_, _, name)| *name)
}

/// Bulk endpoints of a claimed PN533-family device
pub struct UsbBulk {
    info: UsbDeviceInfo,
    interface: nusb::Interface,
    runtime: Runtime,
}

impl fmt::Debug for UsbBulk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbBulk").field("info", &self.info).finish()
    }
}

impl UsbBulk {
    /// List supported devices currently plugged in
    pub fn list() -> Result<Vec<UsbDeviceInfo>> {
        Ok(nusb::list_devices()?
            .filter_map(|device| {
                let name = known_name(device.vendor_id(), device.product_id())?;
                Some(UsbDeviceInfo {
                    name,
                    bus: device.bus_number(),
                    address: device.device_address(),
                    vendor_id: device.vendor_id(),
                    product_id: device.product_id(),
                })
            })
            .collect())
    }

    /// Open the first supported device
    pub fn open_first() -> Result<Self> {
        let info = Self::list()?
            .into_iter()
            .next()
            .ok_or(Pn533Error::DeviceNotFound)?;
        Self::open(info)
    }

    /// Open and claim a listed device
    pub fn open(info: UsbDeviceInfo) -> Result<Self> {
        let device = nusb::list_devices()?
            .find(|device| {
                device.bus_number() == info.bus && device.device_address() == info.address
            })
            .ok_or(Pn533Error::DeviceNotFound)?
            .open()?;
        let interface = device.detach_and_claim_interface(0)?;
        let runtime = Builder::new_current_thread().enable_time().build()?;
        debug!(device = %info, "Opened PN533 device");

        Ok(Self {
            info,
            interface,
            runtime,
        })
    }

    /// The device this pipe is bound to
    pub const fn info(&self) -> &UsbDeviceInfo {
        &self.info
    }
}

impl BulkIo for UsbBulk {
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        let transfer = self.interface.bulk_out(ENDPOINT_OUT, data.to_vec());
        let completion = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, transfer).await })
            .map_err(|_| Pn533Error::Timeout)?;
        completion.status?;
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        let transfer = self
            .interface
            .bulk_in(ENDPOINT_IN, RequestBuffer::new(MAX_FRAME_SIZE + 8));
        // Dropping the transfer future on timeout cancels it
        match self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, transfer).await })
        {
            Ok(completion) => {
                completion.status?;
                Ok(Some(Bytes::from(completion.data)))
            }
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_devices() {
        assert_eq!(known_name(0x04E6, 0x5591), Some("SCM SCL3711"));
        assert_eq!(known_name(0x054C, 0x02E1), Some("Sony RC-S956"));
        assert_eq!(known_name(0x072F, 0x2200), None);
    }
}
