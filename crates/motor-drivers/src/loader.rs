use crate::config::{DriverConfig, RigConfig};
use anyhow::{bail, Context};
use can_transport::BusSelector;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub fn load_rig_file(path: impl AsRef<Path>) -> anyhow::Result<RigConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading rig config: {}", path.display()))?;
    parse_rig(&raw).with_context(|| format!("loading rig config: {}", path.display()))
}

pub fn parse_rig(yaml: &str) -> anyhow::Result<RigConfig> {
    let rig: RigConfig = serde_yaml::from_str(yaml).context("parsing yaml")?;
    validate(&rig)?;
    Ok(rig)
}

/// Checks that can be made without touching a registry: unique names, ids that
/// fit the driver's addressing, and motors only on configured buses.
pub fn validate(rig: &RigConfig) -> anyhow::Result<()> {
    let mut names = HashSet::new();
    let mut addrs = HashSet::new();
    for m in &rig.motors {
        if !names.insert(m.name.as_str()) {
            bail!("duplicate motor name: {}", m.name);
        }
        if !no_buses(rig) && rig.bus(m.bus).is_none() {
            bail!("motor {} is on {}, which has no interface configured", m.name, m.bus);
        }
        let limit = match m.driver {
            DriverConfig::Dji { .. } => 0x7FF,
            _ => 0xFF,
        };
        let id = m.driver.id();
        if id > limit {
            bail!("motor {}: id 0x{id:X} exceeds 0x{limit:X}", m.name);
        }
        if !addrs.insert((m.bus, m.driver.kind(), id)) {
            bail!("motor {}: {} id 0x{id:X} already used on {}", m.name, m.driver.kind(), m.bus);
        }
    }
    Ok(())
}

// A rig without a `buses` section is bound onto whatever transport the caller provides.
fn no_buses(rig: &RigConfig) -> bool {
    BusSelector::ALL.iter().all(|b| rig.bus(*b).is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::dji::DjiModel;

    const RIG: &str = r#"
buses:
  can1: { backend: mock, device: mock0 }
  can2: { backend: slcan, device: /dev/ttyACM0, bitrate: 1m }
motors:
  - { name: chassis_lf, bus: can1, driver: dji, model: m3508, id: "0x201" }
  - { name: knee, bus: can2, driver: ak, model: ak80-9, mode: mit, id: 3 }
  - { name: wheel, bus: can1, driver: vesc, id: 42 }
  - { name: lift, bus: can2, driver: mlds, id: 5 }
"#;

    #[test]
    fn test_parses_sample_rig() -> anyhow::Result<()> {
        let rig = parse_rig(RIG)?;
        assert_eq!(rig.motors.len(), 4);
        let can2 = rig.bus(BusSelector::Can2).ok_or_else(|| anyhow::anyhow!("can2"))?;
        assert_eq!(can2.backend, Backend::Slcan);
        assert_eq!(can2.bitrate.as_deref(), Some("1m"));
        let lf = rig.motor("chassis_lf").ok_or_else(|| anyhow::anyhow!("motor"))?;
        assert!(matches!(
            lf.driver,
            DriverConfig::Dji {
                model: DjiModel::M3508,
                id: 0x201
            }
        ));
        Ok(())
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let yaml = r#"
motors:
  - { name: a, bus: can1, driver: vesc, id: 1 }
  - { name: a, bus: can1, driver: vesc, id: 2 }
"#;
        let err = parse_rig(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate motor name"));
    }

    #[test]
    fn test_rejects_unconfigured_bus_and_wide_ids() {
        let yaml = r#"
buses:
  can1: { backend: mock, device: mock0 }
motors:
  - { name: a, bus: can2, driver: vesc, id: 1 }
"#;
        assert!(parse_rig(yaml).is_err());
        let yaml = "motors:\n  - { name: a, bus: can1, driver: vesc, id: 300 }\n";
        assert!(parse_rig(yaml).is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = load_rig_file("/nonexistent/rig.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("reading rig config"));
    }
}
