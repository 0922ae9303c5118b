use crate::{BusInfo, CanBus, CanFrame, Result, Timestamp, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;

#[derive(Debug, Default)]
struct MockState {
    rx: VecDeque<CanFrame>,
    tx: Vec<CanFrame>,
    fail_sends: bool,
}

/// A simple in-process mock bus.
///
/// Each `open` creates an independent bus; clones share it, so a test can keep
/// one clone to inject inbound frames and inspect what was transmitted.
#[derive(Clone, Debug)]
pub struct MockBus {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a frame to be returned by the next `recv`.
    pub fn inject(&self, frame: CanFrame) {
        self.state().rx.push_back(frame);
    }

    /// Frames accepted by `send` so far.
    pub fn sent(&self) -> Vec<CanFrame> {
        self.state().tx.clone()
    }

    pub fn take_sent(&self) -> Vec<CanFrame> {
        std::mem::take(&mut self.state().tx)
    }

    /// Make every following `send` fail as if the transmit mailboxes never drained.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    pub fn pending_rx(&self) -> usize {
        self.state().rx.len()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CanBus for MockBus {
    fn open(name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        })
    }

    fn list() -> Result<Vec<BusInfo>> {
        Ok(vec![
            BusInfo {
                name: "mock0".to_string(),
                driver: "mock".to_string(),
            },
            BusInfo {
                name: "mock1".to_string(),
                driver: "mock".to_string(),
            },
        ])
    }

    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<CanFrame> {
        let mut frame = self.state().rx.pop_front().ok_or(TransportError::Timeout)?;
        if frame.timestamp.is_none() {
            frame.timestamp = Some(Timestamp(OffsetDateTime::now_utc()));
        }
        Ok(frame)
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        let mut state = self.state();
        if state.fail_sends {
            return Err(TransportError::Timeout);
        }
        state.tx.push(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CanId;

    #[test]
    fn test_clones_share_queues() -> anyhow::Result<()> {
        let mut bus = MockBus::open("mock0")?;
        let probe = bus.clone();
        let id = CanId::standard(0x123).ok_or_else(|| anyhow::anyhow!("id"))?;
        let frame = CanFrame::new(id, &[1, 2]).ok_or_else(|| anyhow::anyhow!("len"))?;

        probe.inject(frame.clone());
        let got = bus.recv(Some(10))?;
        assert_eq!(got.payload(), frame.payload());
        assert!(got.timestamp.is_some());
        assert!(matches!(bus.recv(Some(10)), Err(TransportError::Timeout)));

        bus.send(&frame)?;
        assert_eq!(probe.sent().len(), 1);
        Ok(())
    }

    #[test]
    fn test_failing_sends_report_timeout() -> anyhow::Result<()> {
        let mut bus = MockBus::open("mock0")?;
        bus.set_fail_sends(true);
        let id = CanId::standard(0x200).ok_or_else(|| anyhow::anyhow!("id"))?;
        let frame = CanFrame::new(id, &[0; 8]).ok_or_else(|| anyhow::anyhow!("len"))?;
        assert!(matches!(bus.send(&frame), Err(TransportError::Timeout)));
        assert!(bus.take_sent().is_empty());
        Ok(())
    }
}
