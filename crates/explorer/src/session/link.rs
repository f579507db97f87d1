//! Device link
//!
//! Closing the ADF lid powers down the scanner's USB side: the device drops
//! off the bus and every transfer on the old handle fails with
//! [`TransportError::NoDevice`]. A [`DeviceLink`] owns the current handle,
//! drops it when the device goes away, and reopens the scanner through its
//! [`Connector`] once it is back.

use super::transaction::{StatusRead, TransactionExecutor, TransactionTimeouts};
use common::{BulkTransport, Endpoints, TransportError};
use std::fmt;
use tracing::{debug, info};

/// Opens a fresh transport to the scanner
pub trait Connector {
    type Transport: BulkTransport;
    type Error: fmt::Display;

    fn connect(&mut self) -> Result<Self::Transport, Self::Error>;
}

impl<F, T, E> Connector for F
where
    F: FnMut() -> Result<T, E>,
    T: BulkTransport,
    E: fmt::Display,
{
    type Transport = T;
    type Error = E;

    fn connect(&mut self) -> Result<T, E> {
        self()
    }
}

/// What the polling loops read status through
///
/// A bare [`TransactionExecutor`] never reconnects: a vanished device is just
/// another fault. [`DeviceLink`] waits for the device to come back.
pub trait StatusLink {
    fn poll_status(&mut self) -> Result<StatusRead, TransportError>;

    /// Whether a vanished device is worth waiting for
    fn reconnects(&self) -> bool {
        false
    }

    /// Drop the handle to a vanished device
    fn disconnect(&mut self) {}

    /// One attempt to reopen the device; true once it is attached
    fn try_reconnect(&mut self) -> bool {
        false
    }
}

impl<T: BulkTransport> StatusLink for TransactionExecutor<T> {
    fn poll_status(&mut self) -> Result<StatusRead, TransportError> {
        self.read_status()
    }
}

/// Reopenable connection to the scanner
pub struct DeviceLink<C: Connector> {
    connector: C,
    endpoints: Endpoints,
    timeouts: TransactionTimeouts,
    executor: Option<TransactionExecutor<C::Transport>>,
}

impl<C: Connector> DeviceLink<C> {
    /// Create a link; nothing is opened until [`DeviceLink::connect`]
    pub fn new(connector: C, endpoints: Endpoints) -> Self {
        Self {
            connector,
            endpoints,
            timeouts: TransactionTimeouts::default(),
            executor: None,
        }
    }

    /// Timeouts applied to every executor the link opens
    pub fn with_timeouts(mut self, timeouts: TransactionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.executor.is_some()
    }

    /// Open the device unless it is already open
    pub fn connect(&mut self) -> Result<&mut TransactionExecutor<C::Transport>, C::Error> {
        let executor = match self.executor.take() {
            Some(executor) => executor,
            None => {
                let transport = self.connector.connect()?;
                TransactionExecutor::new(transport, self.endpoints).with_timeouts(self.timeouts)
            }
        };
        Ok(self.executor.insert(executor))
    }

    /// Executor for the open device
    pub fn executor(&mut self) -> Result<&mut TransactionExecutor<C::Transport>, TransportError> {
        self.executor.as_mut().ok_or(TransportError::NoDevice)
    }
}

impl<C: Connector> StatusLink for DeviceLink<C> {
    fn poll_status(&mut self) -> Result<StatusRead, TransportError> {
        self.executor()?.read_status()
    }

    fn reconnects(&self) -> bool {
        true
    }

    fn disconnect(&mut self) {
        if self.executor.take().is_some() {
            debug!("Dropped handle to vanished scanner");
        }
    }

    fn try_reconnect(&mut self) -> bool {
        match self.connect() {
            Ok(_) => {
                info!("Scanner is back");
                true
            }
            Err(e) => {
                debug!("Scanner still absent: {}", e);
                false
            }
        }
    }
}
