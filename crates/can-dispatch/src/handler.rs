use crate::DecodeError;
use can_transport::CanFrame;

/// A device that consumes frames routed to it by the registry.
///
/// `on_frame` runs in the receive context (the RX interrupt on target, the pump
/// loop on a host). It must not block; it may call back into the registry.
pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, frame: &CanFrame) -> Result<(), DecodeError>;
}
