use crate::{BusInfo, BusSelector, CanFrame, Result};

/// A minimal blocking CAN interface (one physical bus).
pub trait CanBus {
    /// Open a CAN interface by name (e.g., "mock0", "/dev/ttyACM0").
    fn open(name: &str) -> Result<Self>
    where
        Self: Sized;

    /// Attempt to list available interfaces for this backend.
    fn list() -> Result<Vec<BusInfo>>;

    /// Receive one frame (blocking with optional timeout in milliseconds).
    fn recv(&mut self, timeout_ms: Option<u64>) -> Result<CanFrame>;

    /// Send one frame.
    fn send(&mut self, frame: &CanFrame) -> Result<()>;
}

/// Outbound side of the two-bus transport used by motor drivers.
///
/// Implementations own any bounded wait on a full transmit queue and report
/// it as [`TransportError::Timeout`](crate::TransportError::Timeout); callers
/// decide whether to retry.
pub trait BusTransport {
    fn send(&self, bus: BusSelector, frame: &CanFrame) -> Result<()>;
}

impl<T: BusTransport + ?Sized> BusTransport for &T {
    fn send(&self, bus: BusSelector, frame: &CanFrame) -> Result<()> {
        (**self).send(bus, frame)
    }
}

impl<T: BusTransport + ?Sized> BusTransport for std::sync::Arc<T> {
    fn send(&self, bus: BusSelector, frame: &CanFrame) -> Result<()> {
        (**self).send(bus, frame)
    }
}
