use can_dispatch::DispatchOutcome;
use can_transport::{BusSelector, BusTransport, CanFrame, Result as TransportResult};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct BusMetrics {
    pub rx_frames: IntCounter,
    pub tx_frames: IntCounter,
    pub tx_errors: IntCounter,
    pub rx_unmatched: IntCounter,
    pub rx_malformed: IntCounter,
    pub stale_entries: IntCounter,
    pub motors_bound: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub bus: BusMetrics,
}

impl MetricsHub {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let bus = BusMetrics {
            rx_frames: IntCounter::new("mc_can_rx_frames", "CAN frames received")?,
            tx_frames: IntCounter::new("mc_can_tx_frames", "CAN frames sent")?,
            tx_errors: IntCounter::new("mc_can_tx_errors", "CAN sends that failed")?,
            rx_unmatched: IntCounter::new(
                "mc_can_rx_unmatched",
                "Received frames no motor was registered for",
            )?,
            rx_malformed: IntCounter::new(
                "mc_can_rx_malformed",
                "Received frames a motor driver rejected",
            )?,
            stale_entries: IntCounter::new(
                "mc_dispatch_stale_entries",
                "Dispatch entries pruned because their motor was dropped",
            )?,
            motors_bound: IntGauge::new("mc_motors_bound", "Motors registered for dispatch")?,
        };
        registry.register(Box::new(bus.rx_frames.clone()))?;
        registry.register(Box::new(bus.tx_frames.clone()))?;
        registry.register(Box::new(bus.tx_errors.clone()))?;
        registry.register(Box::new(bus.rx_unmatched.clone()))?;
        registry.register(Box::new(bus.rx_malformed.clone()))?;
        registry.register(Box::new(bus.stale_entries.clone()))?;
        registry.register(Box::new(bus.motors_bound.clone()))?;
        Ok(Self { registry, bus })
    }

    /// Count one received frame by what the registry did with it.
    pub fn observe(&self, outcome: &DispatchOutcome) {
        self.bus.rx_frames.inc();
        match outcome {
            DispatchOutcome::Delivered => {}
            DispatchOutcome::Unmatched => self.bus.rx_unmatched.inc(),
            DispatchOutcome::Malformed(_) => self.bus.rx_malformed.inc(),
            DispatchOutcome::Stale => self.bus.stale_entries.inc(),
        }
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

/// Transport wrapper that counts every send attempt.
pub struct MeteredTransport<T> {
    inner: T,
    metrics: MetricsHub,
}

impl<T: BusTransport> MeteredTransport<T> {
    pub fn new(inner: T, metrics: MetricsHub) -> Self {
        Self { inner, metrics }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn metrics(&self) -> &MetricsHub {
        &self.metrics
    }
}

impl<T: BusTransport> BusTransport for MeteredTransport<T> {
    fn send(&self, bus: BusSelector, frame: &CanFrame) -> TransportResult<()> {
        let res = self.inner.send(bus, frame);
        match &res {
            Ok(()) => self.metrics.bus.tx_frames.inc(),
            Err(_) => self.metrics.bus.tx_errors.inc(),
        }
        res
    }
}
