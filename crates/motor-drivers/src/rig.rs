use crate::ak::AkMotor;
use crate::config::{DriverConfig, MotorConfig, RigConfig};
use crate::dji::DjiMotor;
use crate::mlds::MldsMotor;
use crate::vesc::VescMotor;
use crate::{DriverError, Result};
use can_dispatch::BusRegistry;
use can_transport::BusSelector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

/// A motor built from configuration. The rig owns the devices; the registry
/// only refers to them.
#[derive(Debug, Clone)]
pub enum MotorHandle {
    Dji(Arc<DjiMotor>),
    Ak(Arc<AkMotor>),
    Vesc(Arc<VescMotor>),
    Mlds(MldsMotor),
}

impl MotorHandle {
    pub fn bind(cfg: &MotorConfig, registry: &BusRegistry) -> Result<Self> {
        let narrow = |id: u32| u8::try_from(id).map_err(|_| DriverError::InvalidMotorId(id));
        Ok(match cfg.driver {
            DriverConfig::Dji { model, id } => {
                let id = u16::try_from(id).map_err(|_| DriverError::InvalidMotorId(id))?;
                MotorHandle::Dji(DjiMotor::init(registry, cfg.bus, model, id)?)
            }
            DriverConfig::Ak { model, mode, id } => {
                MotorHandle::Ak(AkMotor::init(registry, cfg.bus, model, mode, narrow(id)?)?)
            }
            DriverConfig::Vesc { id } => {
                MotorHandle::Vesc(VescMotor::init(registry, cfg.bus, narrow(id)?)?)
            }
            DriverConfig::Mlds { id } => MotorHandle::Mlds(MldsMotor::new(cfg.bus, narrow(id)?)),
        })
    }

    pub fn unbind(&self, registry: &BusRegistry) -> Result<()> {
        match self {
            MotorHandle::Dji(m) => m.deinit(registry),
            MotorHandle::Ak(m) => m.deinit(registry),
            MotorHandle::Vesc(m) => m.deinit(registry),
            MotorHandle::Mlds(_) => Ok(()),
        }
    }

    pub fn bus(&self) -> BusSelector {
        match self {
            MotorHandle::Dji(m) => m.bus(),
            MotorHandle::Ak(m) => m.bus(),
            MotorHandle::Vesc(m) => m.bus(),
            MotorHandle::Mlds(m) => m.bus(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MotorHandle::Dji(_) => "dji",
            MotorHandle::Ak(_) => "ak",
            MotorHandle::Vesc(_) => "vesc",
            MotorHandle::Mlds(_) => "mlds",
        }
    }

    /// Latest decoded state as JSON; `None` for send-only drives.
    pub fn state_json(&self) -> Option<serde_json::Value> {
        let value = match self {
            MotorHandle::Dji(m) => serde_json::to_value(&*m.state()),
            MotorHandle::Ak(m) => serde_json::to_value(&*m.state()),
            MotorHandle::Vesc(m) => serde_json::to_value(&*m.state()),
            MotorHandle::Mlds(_) => return None,
        };
        value.ok()
    }

    /// Feedback frames decoded so far.
    pub fn frames(&self) -> u64 {
        match self {
            MotorHandle::Dji(m) => m.state().frames,
            MotorHandle::Ak(m) => m.state().frames,
            MotorHandle::Vesc(m) => m.state().frames,
            MotorHandle::Mlds(_) => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundMotor {
    pub name: String,
    pub handle: MotorHandle,
}

/// One line of `monitor` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub name: String,
    pub driver: String,
    pub bus: BusSelector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    pub state: serde_json::Value,
}

/// All motors of a [`RigConfig`], registered on one [`BusRegistry`].
#[derive(Debug, Default)]
pub struct Rig {
    motors: Vec<BoundMotor>,
}

impl Rig {
    /// Bind every motor. If one fails, the ones already bound are removed
    /// again before the error is returned.
    pub fn bind(config: &RigConfig, registry: &BusRegistry) -> anyhow::Result<Self> {
        let mut rig = Rig::default();
        for cfg in &config.motors {
            match MotorHandle::bind(cfg, registry) {
                Ok(handle) => rig.motors.push(BoundMotor {
                    name: cfg.name.clone(),
                    handle,
                }),
                Err(e) => {
                    rig.unbind(registry);
                    return Err(anyhow::Error::new(e).context(format!("binding motor {}", cfg.name)));
                }
            }
        }
        info!(motors = rig.motors.len(), "rig bound");
        Ok(rig)
    }

    /// Remove every motor from the registry. Failures are logged and skipped.
    pub fn unbind(&mut self, registry: &BusRegistry) {
        for m in self.motors.drain(..) {
            if let Err(e) = m.handle.unbind(registry) {
                warn!(motor = %m.name, error = %e, "unbind failed");
            }
        }
    }

    pub fn motors(&self) -> &[BoundMotor] {
        &self.motors
    }

    pub fn get(&self, name: &str) -> Option<&MotorHandle> {
        self.motors.iter().find(|m| m.name == name).map(|m| &m.handle)
    }

    pub fn len(&self) -> usize {
        self.motors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }

    /// Snapshot of every motor that reports feedback.
    pub fn telemetry(&self) -> Vec<TelemetryRecord> {
        let ts = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .ok();
        self.motors
            .iter()
            .filter_map(|m| {
                Some(TelemetryRecord {
                    name: m.name.clone(),
                    driver: m.handle.kind().to_string(),
                    bus: m.handle.bus(),
                    ts: ts.clone(),
                    state: m.handle.state_json()?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_rig;

    #[test]
    fn test_bind_registers_receiving_motors() -> anyhow::Result<()> {
        let cfg = parse_rig(
            r#"
motors:
  - { name: lf, bus: can1, driver: dji, model: m3508, id: 0x201 }
  - { name: knee, bus: can2, driver: ak, model: ak80-9, mode: servo, id: 3 }
  - { name: wheel, bus: can1, driver: vesc, id: 42 }
  - { name: lift, bus: can2, driver: mlds, id: 5 }
"#,
        )?;
        let registry = BusRegistry::new();
        let mut rig = Rig::bind(&cfg, &registry)?;
        assert_eq!(rig.len(), 4);
        assert_eq!(registry.len(BusSelector::Can1), 2);
        assert_eq!(registry.len(BusSelector::Can2), 1);
        assert_eq!(rig.telemetry().len(), 3);
        assert_eq!(rig.get("lift").map(MotorHandle::kind), Some("mlds"));

        rig.unbind(&registry);
        assert!(registry.is_empty(BusSelector::Can1));
        assert!(registry.is_empty(BusSelector::Can2));
        Ok(())
    }

    #[test]
    fn test_failed_bind_rolls_back() -> anyhow::Result<()> {
        let cfg = parse_rig(
            r#"
motors:
  - { name: a, bus: can1, driver: dji, model: m2006, id: 0x201 }
  - { name: b, bus: can1, driver: dji, model: gm6020, id: 0x204 }
"#,
        )?;
        let registry = BusRegistry::new();
        let err = Rig::bind(&cfg, &registry).unwrap_err();
        assert!(format!("{err:#}").contains("binding motor b"));
        assert!(registry.is_empty(BusSelector::Can1));
        Ok(())
    }
}
