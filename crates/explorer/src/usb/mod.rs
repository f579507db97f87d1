//! USB subsystem
//!
//! Opens and claims the S1500 through rusb and exposes it as a
//! [`common::BulkTransport`]. Everything above this module is rusb-free.

pub mod device;
pub mod transfers;

pub use device::{
    ClaimedScanner, DeviceError, DeviceSlot, INTERFACE, PRODUCT_ID, S1500_ENDPOINTS,
    ScannerDevice, VENDOR_ID,
};
