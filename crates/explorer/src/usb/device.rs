//! S1500 device handle
//!
//! Wraps an rusb handle that has been reset, configured and claimed for the
//! scanner's vendor-specific bulk interface. The claimed device lives in a
//! [`DeviceSlot`] so the interrupt handler can release it before a forced
//! exit.

use super::transfers::{read_bulk, write_bulk};
use common::{BulkTransport, Endpoints, TransportError};
use rusb::{Context, DeviceHandle, UsbContext};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fujitsu
pub const VENDOR_ID: u16 = 0x04C5;
/// ScanSnap S1500
pub const PRODUCT_ID: u16 = 0x11A2;
/// The only interface; vendor class FF:FF:FF with two bulk endpoints
pub const INTERFACE: u8 = 0;
/// Configuration selected after reset
pub const CONFIGURATION: u8 = 1;

pub const S1500_ENDPOINTS: Endpoints = Endpoints {
    bulk_out: 0x02,
    bulk_in: 0x81,
};

/// Settle time after a port reset before the device is looked up again
const RESET_SETTLE: Duration = Duration::from_millis(500);

/// Errors while opening the scanner
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("ScanSnap S1500 ({vendor_id:04x}:{product_id:04x}) not found. Is the lid open?")]
    NotFound { vendor_id: u16, product_id: u16 },

    #[error("Device disappeared after reset")]
    Disappeared,

    #[error("Failed to claim interface {interface}: {source}")]
    Claim { interface: u8, source: rusb::Error },

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

/// Claimed S1500
///
/// Dropping it releases the interface and hands the device back to the
/// kernel driver.
pub struct ScannerDevice {
    handle: DeviceHandle<Context>,
}

impl ScannerDevice {
    /// Find, reset and claim the scanner
    ///
    /// Sequence: detach kernel driver, reset, wait, re-open, detach again,
    /// select configuration 1, claim interface 0, clear halts on both bulk
    /// endpoints.
    pub fn open() -> Result<Self, DeviceError> {
        let context = Context::new()?;

        let mut handle = find(&context).ok_or(DeviceError::NotFound {
            vendor_id: VENDOR_ID,
            product_id: PRODUCT_ID,
        })?;
        debug!(
            "Found scanner on bus {} address {}",
            handle.device().bus_number(),
            handle.device().address()
        );

        detach_kernel_driver(&mut handle);

        info!("Resetting USB device");
        if let Err(e) = handle.reset() {
            // a reset that re-enumerates the device reports NotFound
            debug!("Reset returned: {}", e);
        }
        drop(handle);
        std::thread::sleep(RESET_SETTLE);

        let mut handle = find(&context).ok_or(DeviceError::Disappeared)?;
        detach_kernel_driver(&mut handle);

        if let Err(e) = handle.set_active_configuration(CONFIGURATION) {
            warn!("Failed to set configuration {}: {}", CONFIGURATION, e);
        }

        handle
            .claim_interface(INTERFACE)
            .map_err(|source| DeviceError::Claim {
                interface: INTERFACE,
                source,
            })?;
        debug!("Claimed interface {}", INTERFACE);

        clear_halts(&mut handle, S1500_ENDPOINTS);

        Ok(Self { handle })
    }
}

impl BulkTransport for ScannerDevice {
    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        write_bulk(&mut self.handle, endpoint, data, timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        read_bulk(&mut self.handle, endpoint, max_len, timeout)
    }
}

impl Drop for ScannerDevice {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(INTERFACE) {
            warn!("Failed to release interface {}: {}", INTERFACE, e);
        }

        if let Err(e) = self.handle.attach_kernel_driver(INTERFACE) {
            debug!(
                "Could not reattach kernel driver to interface {} (may not have been detached): {}",
                INTERFACE, e
            );
        } else {
            debug!("Reattached kernel driver to interface {}", INTERFACE);
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    device: Option<ScannerDevice>,
}

/// Shared home for the claimed scanner
///
/// Each [`DeviceSlot::open`] hands out a [`ClaimedScanner`] that transfers
/// through the slot. Clones share the device, so [`DeviceSlot::release`]
/// works from any thread.
#[derive(Clone, Default)]
pub struct DeviceSlot {
    inner: Arc<Mutex<Slot>>,
}

impl DeviceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the scanner into this slot
    pub fn open(&self) -> Result<ClaimedScanner, DeviceError> {
        let device = ScannerDevice::open()?;
        let mut slot = self.lock();
        slot.generation += 1;
        slot.device = Some(device);
        Ok(ClaimedScanner {
            slot: self.clone(),
            generation: slot.generation,
        })
    }

    /// Release the interface and reattach the kernel driver, if a device is held
    pub fn release(&self) {
        if self.lock().device.take().is_some() {
            debug!("Released scanner");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Transport over the scanner held in a [`DeviceSlot`]
///
/// Fails with [`TransportError::NoDevice`] once the slot has been released or
/// reopened. Dropping it releases the device it was opened with.
pub struct ClaimedScanner {
    slot: DeviceSlot,
    generation: u64,
}

impl ClaimedScanner {
    fn with_device<R>(
        &self,
        transfer: impl FnOnce(&mut ScannerDevice) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let mut slot = self.slot.lock();
        if slot.generation != self.generation {
            return Err(TransportError::NoDevice);
        }
        match slot.device.as_mut() {
            Some(device) => transfer(device),
            None => Err(TransportError::NoDevice),
        }
    }
}

impl BulkTransport for ClaimedScanner {
    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.with_device(|device| device.write_bulk(endpoint, data, timeout))
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.with_device(|device| device.read_bulk(endpoint, max_len, timeout))
    }
}

impl Drop for ClaimedScanner {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.generation == self.generation && slot.device.take().is_some() {
            debug!("Released scanner");
        }
    }
}

fn find(context: &Context) -> Option<DeviceHandle<Context>> {
    context.open_device_with_vid_pid(VENDOR_ID, PRODUCT_ID)
}

/// Detach whatever kernel driver holds the interface, if any
fn detach_kernel_driver(handle: &mut DeviceHandle<Context>) {
    match handle.kernel_driver_active(INTERFACE) {
        Ok(true) => match handle.detach_kernel_driver(INTERFACE) {
            Ok(()) => info!("Detached kernel driver from interface {}", INTERFACE),
            Err(e) => warn!(
                "Failed to detach kernel driver from interface {}: {}",
                INTERFACE, e
            ),
        },
        Ok(false) => debug!("No kernel driver active on interface {}", INTERFACE),
        Err(e) => debug!(
            "Could not check kernel driver status for interface {}: {}",
            INTERFACE, e
        ),
    }
}

/// Clear stalls left by an earlier user; endpoints that are not stalled error out harmlessly
fn clear_halts(handle: &mut DeviceHandle<Context>, endpoints: Endpoints) {
    for endpoint in [endpoints.bulk_out, endpoints.bulk_in] {
        if let Err(e) = handle.clear_halt(endpoint) {
            debug!("Clear halt on {:#04x}: {}", endpoint, e);
        }
    }
}
