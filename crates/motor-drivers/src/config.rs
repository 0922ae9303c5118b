use crate::ak::{AkMode, AkModel};
use crate::dji::DjiModel;
use can_transport::BusSelector;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// A complete motor rig: which interface backs each bus and which motors hang off them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default)]
    pub buses: BusesConfig,
    #[serde(default)]
    pub motors: Vec<MotorConfig>,
}

impl RigConfig {
    pub fn bus(&self, bus: BusSelector) -> Option<&BusConfig> {
        match bus {
            BusSelector::Can1 => self.buses.can1.as_ref(),
            BusSelector::Can2 => self.buses.can2.as_ref(),
        }
    }

    pub fn motor(&self, name: &str) -> Option<&MotorConfig> {
        self.motors.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusesConfig {
    #[serde(default)]
    pub can1: Option<BusConfig>,
    #[serde(default)]
    pub can2: Option<BusConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub backend: Backend,
    pub device: String,
    /// SLCAN bitrate such as `1m` or `500k`; adapter default when absent.
    #[serde(default)]
    pub bitrate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Mock,
    Slcan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorConfig {
    pub name: String,
    pub bus: BusSelector,
    #[serde(flatten)]
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum DriverConfig {
    Dji {
        model: DjiModel,
        #[serde(deserialize_with = "de_id")]
        id: u32,
    },
    Ak {
        model: AkModel,
        mode: AkMode,
        #[serde(deserialize_with = "de_id")]
        id: u32,
    },
    Vesc {
        #[serde(deserialize_with = "de_id")]
        id: u32,
    },
    Mlds {
        #[serde(deserialize_with = "de_id")]
        id: u32,
    },
}

impl DriverConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            DriverConfig::Dji { .. } => "dji",
            DriverConfig::Ak { .. } => "ak",
            DriverConfig::Vesc { .. } => "vesc",
            DriverConfig::Mlds { .. } => "mlds",
        }
    }

    pub fn id(&self) -> u32 {
        match *self {
            DriverConfig::Dji { id, .. }
            | DriverConfig::Ak { id, .. }
            | DriverConfig::Vesc { id }
            | DriverConfig::Mlds { id } => id,
        }
    }
}

/// Decimal or `0x`-prefixed hex.
pub fn parse_id(s: &str) -> Option<u32> {
    let t = s.trim();
    match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => t.parse::<u32>().ok(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(u32),
    Text(String),
}

fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    match RawId::deserialize(d)? {
        RawId::Num(n) => Ok(n),
        RawId::Text(s) => parse_id(&s).ok_or_else(|| D::Error::custom(format!("invalid id: {s}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_forms() {
        assert_eq!(parse_id("0x201"), Some(0x201));
        assert_eq!(parse_id(" 42 "), Some(42));
        assert_eq!(parse_id("0xZZ"), None);
        assert_eq!(parse_id(""), None);
    }

    #[test]
    fn test_driver_tag_selects_variant() -> anyhow::Result<()> {
        let m: MotorConfig = serde_yaml::from_str(
            "{ name: knee, bus: can2, driver: ak, model: ak80-9, mode: mit, id: \"0x03\" }",
        )?;
        assert_eq!(m.bus, BusSelector::Can2);
        assert!(matches!(
            m.driver,
            DriverConfig::Ak {
                model: AkModel::Ak80_9,
                mode: AkMode::Mit,
                id: 3
            }
        ));
        assert_eq!(m.driver.kind(), "ak");
        Ok(())
    }
}
