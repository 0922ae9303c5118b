use crate::{BusSelector, BusTransport, CanBus, CanFrame, Result, TransportError};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Two physical interfaces joined into the CAN1/CAN2 transport.
///
/// Either slot may be left empty; sending on it yields
/// [`TransportError::BusNotAttached`].
pub struct BusPair<B> {
    buses: [Option<Mutex<B>>; 2],
}

impl<B: CanBus> BusPair<B> {
    pub fn new(can1: Option<B>, can2: Option<B>) -> Self {
        Self {
            buses: [can1.map(Mutex::new), can2.map(Mutex::new)],
        }
    }

    pub fn single(bus: BusSelector, iface: B) -> Self {
        match bus {
            BusSelector::Can1 => Self::new(Some(iface), None),
            BusSelector::Can2 => Self::new(None, Some(iface)),
        }
    }

    pub fn is_attached(&self, bus: BusSelector) -> bool {
        self.buses[bus.index()].is_some()
    }

    /// Exclusive access to one interface, e.g. for a receive loop.
    pub fn lock(&self, bus: BusSelector) -> Result<MutexGuard<'_, B>> {
        let slot = self.buses[bus.index()]
            .as_ref()
            .ok_or(TransportError::BusNotAttached(bus))?;
        Ok(slot.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl<B: CanBus> BusTransport for BusPair<B> {
    fn send(&self, bus: BusSelector, frame: &CanFrame) -> Result<()> {
        let mut iface = self.lock(bus)?;
        iface.send(frame).inspect_err(|e| {
            debug!(%bus, id = %frame.id, error = %e, "send failed");
        })
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::{CanId, MockBus};

    #[test]
    fn test_routes_by_selector() -> anyhow::Result<()> {
        let can1 = MockBus::open("mock0")?;
        let can2 = MockBus::open("mock1")?;
        let pair = BusPair::new(Some(can1.clone()), Some(can2.clone()));
        let id = CanId::standard(0x200).ok_or_else(|| anyhow::anyhow!("id"))?;
        let frame = CanFrame::new(id, &[0; 8]).ok_or_else(|| anyhow::anyhow!("len"))?;

        pair.send(BusSelector::Can2, &frame)?;
        assert!(can1.sent().is_empty());
        assert_eq!(can2.sent().len(), 1);
        Ok(())
    }

    #[test]
    fn test_empty_slot_is_an_error() -> anyhow::Result<()> {
        let pair = BusPair::single(BusSelector::Can1, MockBus::open("mock0")?);
        let id = CanId::standard(0x200).ok_or_else(|| anyhow::anyhow!("id"))?;
        let frame = CanFrame::new(id, &[]).ok_or_else(|| anyhow::anyhow!("len"))?;
        assert!(matches!(
            pair.send(BusSelector::Can2, &frame),
            Err(TransportError::BusNotAttached(BusSelector::Can2))
        ));
        Ok(())
    }
}
