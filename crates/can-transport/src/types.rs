use core::fmt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identifier framing on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    /// 11-bit identifier
    Standard,
    /// 29-bit identifier
    Extended,
}

/// 11-bit or 29-bit CAN identifier
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CanId {
    raw: u32,
    extended: bool,
}

impl CanId {
    pub const STANDARD_MAX: u32 = 0x7FF;
    pub const EXTENDED_MAX: u32 = 0x1FFF_FFFF;

    pub fn standard(id11: u16) -> Option<Self> {
        if u32::from(id11) <= Self::STANDARD_MAX {
            Some(Self {
                raw: u32::from(id11),
                extended: false,
            })
        } else {
            None
        }
    }

    pub fn extended(id29: u32) -> Option<Self> {
        if id29 <= Self::EXTENDED_MAX {
            Some(Self {
                raw: id29,
                extended: true,
            })
        } else {
            None
        }
    }

    /// Build an id of the given framing, rejecting values that do not fit.
    pub fn new(id_type: IdType, raw: u32) -> Option<Self> {
        match id_type {
            IdType::Standard => u16::try_from(raw).ok().and_then(Self::standard),
            IdType::Extended => Self::extended(raw),
        }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn id_type(&self) -> IdType {
        if self.extended {
            IdType::Extended
        } else {
            IdType::Standard
        }
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "0x{raw:08X}", raw = self.raw)
        } else {
            write!(f, "0x{raw:03X}", raw = self.raw)
        }
    }
}

/// A classic CAN data frame, at most 8 payload bytes
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CanFrame {
    pub id: CanId,
    pub len: u8,
    pub data: [u8; 8],
    pub rtr: bool,
    pub timestamp: Option<Timestamp>,
}

impl CanFrame {
    pub fn new(id: CanId, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id,
            len: data.len() as u8,
            data: buf,
            rtr: false,
            timestamp: None,
        })
    }

    /// Valid payload bytes only.
    pub fn payload(&self) -> &[u8] {
        let len = usize::from(self.len).min(self.data.len());
        &self.data[..len]
    }

    pub fn with_timestamp(mut self, ts: OffsetDateTime) -> Self {
        self.timestamp = Some(Timestamp(ts));
        self
    }
}

/// Which of the two independent physical buses a device or frame belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusSelector {
    Can1,
    Can2,
}

impl BusSelector {
    pub const ALL: [BusSelector; 2] = [BusSelector::Can1, BusSelector::Can2];

    pub fn index(self) -> usize {
        match self {
            BusSelector::Can1 => 0,
            BusSelector::Can2 => 1,
        }
    }
}

impl fmt::Display for BusSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusSelector::Can1 => f.write_str("can1"),
            BusSelector::Can2 => f.write_str("can2"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(pub OffsetDateTime);

#[derive(Clone, Debug)]
pub struct BusInfo {
    pub name: String,
    pub driver: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_ranges_are_enforced() {
        assert!(CanId::standard(0x7FF).is_some());
        assert!(CanId::standard(0x800).is_none());
        assert!(CanId::extended(0x1FFF_FFFF).is_some());
        assert!(CanId::extended(0x2000_0000).is_none());
        assert!(CanId::new(IdType::Standard, 0x1_0000).is_none());
        assert_eq!(
            CanId::new(IdType::Extended, 0x92A).map(|id| id.id_type()),
            Some(IdType::Extended)
        );
    }

    #[test]
    fn test_payload_is_trimmed_to_len() {
        let id = CanId::standard(0x201).unwrap();
        let frame = CanFrame::new(id, &[1, 2, 3]).unwrap();
        assert_eq!(frame.payload(), &[1, 2, 3]);
        assert!(CanFrame::new(id, &[0; 9]).is_none());
    }

    #[test]
    fn test_display_pads_by_framing() {
        assert_eq!(CanId::standard(0x1F).unwrap().to_string(), "0x01F");
        assert_eq!(CanId::extended(0x92A).unwrap().to_string(), "0x0000092A");
        assert_eq!(BusSelector::Can2.to_string(), "can2");
    }
}
