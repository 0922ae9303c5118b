use crate::{BusRegistry, DispatchOutcome};
use can_transport::{BusSelector, CanBus, CanFrame, TransportError};
use tracing::trace;

/// Receive at most one frame from `iface` and route it through `registry`.
///
/// A receive timeout is not an error: it yields `Ok(None)`.
pub fn pump_once<B: CanBus>(
    registry: &BusRegistry,
    bus: BusSelector,
    iface: &mut B,
    timeout_ms: Option<u64>,
) -> Result<Option<(CanFrame, DispatchOutcome)>, TransportError> {
    match iface.recv(timeout_ms) {
        Ok(frame) => {
            let outcome = registry.dispatch(bus, &frame);
            trace!(%bus, id = %frame.id, ?outcome, "frame pumped");
            Ok(Some((frame, outcome)))
        }
        Err(TransportError::Timeout) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Pump until the interface times out or `max` frames were handled.
/// Returns the number of frames dispatched.
pub fn drain<B: CanBus>(
    registry: &BusRegistry,
    bus: BusSelector,
    iface: &mut B,
    max: usize,
) -> Result<usize, TransportError> {
    let mut n = 0;
    while n < max {
        if pump_once(registry, bus, iface, Some(0))?.is_none() {
            break;
        }
        n += 1;
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DecodeError, FrameHandler};
    use can_transport::{CanId, IdType, MockBus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl FrameHandler for Counter {
        fn on_frame(&self, _frame: &CanFrame) -> Result<(), DecodeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_drains_injected_frames() -> anyhow::Result<()> {
        let registry = BusRegistry::new();
        let counter = Arc::new(Counter::default());
        registry.add(BusSelector::Can1, IdType::Standard, 0x201, 0x7FF, &counter)?;

        let mut bus = MockBus::open("mock0")?;
        let id = CanId::standard(0x201).ok_or_else(|| anyhow::anyhow!("id"))?;
        let other = CanId::standard(0x301).ok_or_else(|| anyhow::anyhow!("id"))?;
        for _ in 0..3 {
            bus.inject(CanFrame::new(id, &[0; 8]).ok_or_else(|| anyhow::anyhow!("len"))?);
        }
        bus.inject(CanFrame::new(other, &[0; 8]).ok_or_else(|| anyhow::anyhow!("len"))?);

        assert_eq!(drain(&registry, BusSelector::Can1, &mut bus, 16)?, 4);
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
        assert_eq!(registry.stats().snapshot().unmatched, 1);
        assert!(pump_once(&registry, BusSelector::Can1, &mut bus, Some(1))?.is_none());
        Ok(())
    }

    #[test]
    fn test_drain_respects_limit() -> anyhow::Result<()> {
        let registry = BusRegistry::new();
        let mut bus = MockBus::open("mock0")?;
        let id = CanId::extended(0x92A).ok_or_else(|| anyhow::anyhow!("id"))?;
        for _ in 0..5 {
            bus.inject(CanFrame::new(id, &[]).ok_or_else(|| anyhow::anyhow!("len"))?);
        }
        assert_eq!(drain(&registry, BusSelector::Can2, &mut bus, 2)?, 2);
        assert_eq!(bus.pending_rx(), 3);
        Ok(())
    }
}
