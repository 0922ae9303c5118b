//! DJI M3508 / M2006 / GM6020 over standard-id CAN.
//!
//! Every motor broadcasts an 8-byte feedback frame on `0x200 + n`. Commands go
//! out in groups: one frame carries four big-endian `i16` setpoints for four
//! consecutive motor ids.

use crate::codec::{frame, BufferWriter};
use crate::{DriverError, Result, SnapshotCell};
use can_dispatch::{BusRegistry, DecodeError, FrameHandler};
use can_transport::{BusSelector, BusTransport, CanFrame, CanId, IdType};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::info;

/// Encoder counts per mechanical revolution of the rotor.
pub const ENCODER_COUNTS: i32 = 8192;
/// Added to `total_angle` per counted revolution.
pub const ROUND_SPAN: i32 = 4096 * 2;

/// Current setpoints for motors 0x201-0x204.
pub const GROUP_CURRENT_LOW: u16 = 0x200;
/// Current setpoints for motors 0x205-0x208.
pub const GROUP_CURRENT_HIGH: u16 = 0x1FF;
pub const GM6020_VOLTAGE_LOW: u16 = 0x1FF;
pub const GM6020_VOLTAGE_HIGH: u16 = 0x2FF;
pub const GM6020_CURRENT_LOW: u16 = 0x1FE;
pub const GM6020_CURRENT_HIGH: u16 = 0x2FE;

const FEEDBACK_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DjiModel {
    M3508,
    M2006,
    Gm6020,
}

impl DjiModel {
    /// Output shaft reduction, `None` for the direct-drive GM6020.
    pub fn gear_ratio(self) -> Option<f32> {
        match self {
            DjiModel::M3508 => Some(19.0),
            DjiModel::M2006 => Some(36.0),
            DjiModel::Gm6020 => None,
        }
    }

    /// Feedback ids the model can be configured for.
    pub fn id_range(self) -> RangeInclusive<u16> {
        match self {
            DjiModel::M3508 | DjiModel::M2006 => 0x201..=0x208,
            DjiModel::Gm6020 => 0x205..=0x20B,
        }
    }
}

/// How a GM6020 is driven; the C620/C610 ESCs only take current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Current,
    Gm6020Voltage,
    Gm6020Current,
}

impl ControlKind {
    fn groups(self) -> [u16; 2] {
        match self {
            ControlKind::Current => [GROUP_CURRENT_LOW, GROUP_CURRENT_HIGH],
            ControlKind::Gm6020Voltage => [GM6020_VOLTAGE_LOW, GM6020_VOLTAGE_HIGH],
            ControlKind::Gm6020Current => [GM6020_CURRENT_LOW, GM6020_CURRENT_HIGH],
        }
    }

    fn first_id(self) -> u16 {
        match self {
            ControlKind::Current => 0x201,
            ControlKind::Gm6020Voltage | ControlKind::Gm6020Current => 0x205,
        }
    }
}

/// Command group and slot (0..4) that address `motor_id`.
pub fn command_slot(kind: ControlKind, motor_id: u16) -> Result<(u16, usize)> {
    let offset = motor_id
        .checked_sub(kind.first_id())
        .map(usize::from)
        .filter(|o| *o < 8)
        .ok_or(DriverError::InvalidMotorId(u32::from(motor_id)))?;
    let groups = kind.groups();
    if kind != ControlKind::Current && offset == 7 {
        return Err(DriverError::InvalidMotorId(u32::from(motor_id)));
    }
    Ok((groups[offset / 4], offset % 4))
}

/// Decoded feedback of one motor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DjiState {
    pub motor_id: u16,
    pub bus: BusSelector,
    pub model: DjiModel,
    /// Raw encoder angle, 0..8191.
    pub angle: u16,
    pub last_angle: u16,
    pub round_count: i32,
    pub total_angle: i32,
    /// Output shaft degrees since power-up (M3508/M2006) or absolute rotor
    /// degrees 0..360 (GM6020).
    pub rotor_degree: f32,
    pub speed_rpm: i16,
    pub real_current: f32,
    pub given_current: i16,
    pub torque_current: i16,
    pub temperature: u8,
    pub hall: u8,
    pub got_offset: bool,
    pub offset_angle: u16,
    pub frames: u64,
}

impl DjiState {
    pub fn new(bus: BusSelector, model: DjiModel, motor_id: u16) -> Self {
        Self {
            motor_id,
            bus,
            model,
            angle: 0,
            last_angle: 0,
            round_count: 0,
            total_angle: 0,
            rotor_degree: 0.0,
            speed_rpm: 0,
            real_current: 0.0,
            given_current: 0,
            torque_current: 0,
            temperature: 0,
            hall: 0,
            got_offset: false,
            offset_angle: 0,
            frames: 0,
        }
    }

    /// Next state after one feedback payload.
    ///
    /// Revolutions are counted by watching for a jump of more than half the
    /// encoder range between samples, so the rotor must turn less than half a
    /// revolution between two consecutive frames.
    pub fn apply(&self, data: &[u8]) -> Result<Self, DecodeError> {
        DecodeError::check_len(data, FEEDBACK_LEN)?;
        let be = |i: usize| i16::from_be_bytes([data[i], data[i + 1]]);
        // Current fields are taken as unsigned, as the ESC firmware reports them.
        let raw = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);

        let mut next = self.clone();
        next.last_angle = self.angle;
        next.angle = u16::from_be_bytes([data[0], data[1]]);
        if !next.got_offset {
            next.offset_angle = next.angle;
            next.last_angle = next.angle;
            next.round_count = 0;
            next.got_offset = true;
        }

        match self.model {
            DjiModel::M3508 => {
                next.speed_rpm = be(2);
                next.real_current = f32::from(raw(2));
                next.given_current = (f32::from(raw(4)) / -5.0) as i16;
            }
            DjiModel::M2006 => {
                next.speed_rpm = be(2);
                next.real_current = f32::from(raw(4)) * 5.0 / 16384.0;
            }
            DjiModel::Gm6020 => {
                next.speed_rpm = be(2);
                next.torque_current = be(4);
                next.temperature = data[6];
            }
        }
        next.hall = data[6];

        let delta = i32::from(next.angle) - i32::from(next.last_angle);
        if delta > ENCODER_COUNTS / 2 {
            next.round_count -= 1;
        } else if delta < -ENCODER_COUNTS / 2 {
            next.round_count += 1;
        }
        next.total_angle =
            next.round_count * ROUND_SPAN + i32::from(next.angle) - i32::from(next.offset_angle);

        next.rotor_degree = match self.model.gear_ratio() {
            Some(ratio) => next.total_angle as f32 / (ratio * ENCODER_COUNTS as f32) * 360.0,
            None => f32::from(next.angle) / 22.75,
        };
        next.frames += 1;
        Ok(next)
    }
}

/// One DJI motor registered for feedback on a bus.
#[derive(Debug)]
pub struct DjiMotor {
    bus: BusSelector,
    model: DjiModel,
    motor_id: u16,
    state: SnapshotCell<DjiState>,
}

impl DjiMotor {
    /// Create the motor and register it for its feedback id.
    pub fn init(
        registry: &BusRegistry,
        bus: BusSelector,
        model: DjiModel,
        motor_id: u16,
    ) -> Result<Arc<Self>> {
        if !model.id_range().contains(&motor_id) {
            return Err(DriverError::InvalidMotorId(u32::from(motor_id)));
        }
        let motor = Arc::new(Self {
            bus,
            model,
            motor_id,
            state: SnapshotCell::new(DjiState::new(bus, model, motor_id)),
        });
        registry.add(bus, IdType::Standard, u32::from(motor_id), 0x7FF, &motor)?;
        info!(%bus, ?model, motor_id, "dji motor bound");
        Ok(motor)
    }

    pub fn deinit(&self, registry: &BusRegistry) -> Result<()> {
        registry.remove_by_id(self.bus, IdType::Standard, u32::from(self.motor_id))?;
        Ok(())
    }

    pub fn state(&self) -> Arc<DjiState> {
        self.state.load()
    }

    pub fn bus(&self) -> BusSelector {
        self.bus
    }

    pub fn model(&self) -> DjiModel {
        self.model
    }

    pub fn motor_id(&self) -> u16 {
        self.motor_id
    }
}

impl FrameHandler for DjiMotor {
    fn on_frame(&self, frame: &CanFrame) -> Result<(), DecodeError> {
        if frame.id.is_extended() {
            return Err(DecodeError::UnexpectedIdType(IdType::Extended));
        }
        self.state.publish_with(|prev| prev.apply(frame.payload()))
    }
}

fn group_frame(kind: ControlKind, group: u16, values: [i16; 4]) -> Result<CanFrame> {
    if !kind.groups().contains(&group) {
        return Err(DriverError::InvalidGroup(group));
    }
    let id = CanId::standard(group).ok_or(DriverError::InvalidGroup(group))?;
    let mut w = BufferWriter::new();
    for v in values {
        w.put_i16(v);
    }
    Ok(frame(id, w.as_slice()))
}

/// Current command for M3508/M2006, group 0x200 or 0x1FF.
pub fn current_frame(group: u16, currents: [i16; 4]) -> Result<CanFrame> {
    group_frame(ControlKind::Current, group, currents)
}

/// GM6020 voltage command, group 0x1FF or 0x2FF.
pub fn gm6020_voltage_frame(group: u16, voltages: [i16; 4]) -> Result<CanFrame> {
    group_frame(ControlKind::Gm6020Voltage, group, voltages)
}

/// GM6020 current command, group 0x1FE or 0x2FE.
pub fn gm6020_current_frame(group: u16, currents: [i16; 4]) -> Result<CanFrame> {
    group_frame(ControlKind::Gm6020Current, group, currents)
}

pub fn set_current(
    tx: &impl BusTransport,
    bus: BusSelector,
    group: u16,
    currents: [i16; 4],
) -> Result<()> {
    tx.send(bus, &current_frame(group, currents)?)?;
    Ok(())
}

pub fn gm6020_voltage_control(
    tx: &impl BusTransport,
    bus: BusSelector,
    group: u16,
    voltages: [i16; 4],
) -> Result<()> {
    tx.send(bus, &gm6020_voltage_frame(group, voltages)?)?;
    Ok(())
}

pub fn gm6020_current_control(
    tx: &impl BusTransport,
    bus: BusSelector,
    group: u16,
    currents: [i16; 4],
) -> Result<()> {
    tx.send(bus, &gm6020_current_frame(group, currents)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(angle: u16, b23: i16, b45: i16, b6: u8) -> [u8; 8] {
        let a = angle.to_be_bytes();
        let s = b23.to_be_bytes();
        let c = b45.to_be_bytes();
        [a[0], a[1], s[0], s[1], c[0], c[1], b6, 0]
    }

    #[test]
    fn test_unwrap_backward_then_forward() -> Result<(), DecodeError> {
        let mut st = DjiState::new(BusSelector::Can1, DjiModel::M3508, 0x201);
        let mut rounds = Vec::new();
        for angle in [100, 8100, 100] {
            st = st.apply(&feedback(angle, 0, 0, 0))?;
            rounds.push(st.round_count);
        }
        assert_eq!(rounds, vec![0, -1, 0]);
        assert_eq!(st.total_angle, 0);
        assert_eq!(st.offset_angle, 100);
        assert_eq!(st.frames, 3);
        Ok(())
    }

    #[test]
    fn test_first_frame_sets_offset() -> Result<(), DecodeError> {
        let st = DjiState::new(BusSelector::Can1, DjiModel::M2006, 0x202)
            .apply(&feedback(5000, 0, 0, 0))?;
        assert!(st.got_offset);
        assert_eq!(st.last_angle, 5000);
        assert_eq!(st.total_angle, 0);
        assert_eq!(st.rotor_degree, 0.0);
        Ok(())
    }

    #[test]
    fn test_forward_revolution_accumulates() -> Result<(), DecodeError> {
        let mut st = DjiState::new(BusSelector::Can1, DjiModel::M3508, 0x201);
        for angle in [0, 3000, 6000, 1000] {
            st = st.apply(&feedback(angle, 0, 0, 0))?;
        }
        assert_eq!(st.round_count, 1);
        assert_eq!(st.total_angle, ROUND_SPAN + 1000);
        let expected = (ROUND_SPAN + 1000) as f32 / (19.0 * 8192.0) * 360.0;
        assert!((st.rotor_degree - expected).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_model_specific_fields() -> Result<(), DecodeError> {
        let m3508 = DjiState::new(BusSelector::Can1, DjiModel::M3508, 0x201)
            .apply(&feedback(0, -1200, 1000, 7))?;
        assert_eq!(m3508.speed_rpm, -1200);
        assert_eq!(m3508.real_current, 64336.0);
        assert_eq!(m3508.given_current, -200);
        assert_eq!(m3508.hall, 7);

        let reversed = DjiState::new(BusSelector::Can1, DjiModel::M3508, 0x201)
            .apply(&feedback(0, 0, -1000, 0))?;
        assert_eq!(reversed.given_current, -12907);

        let m2006 = DjiState::new(BusSelector::Can1, DjiModel::M2006, 0x201)
            .apply(&feedback(0, 300, 16384, 0))?;
        assert_eq!(m2006.speed_rpm, 300);
        assert_eq!(m2006.real_current, 5.0);
        let m2006 = DjiState::new(BusSelector::Can1, DjiModel::M2006, 0x201)
            .apply(&feedback(0, 0, -16384, 0))?;
        assert_eq!(m2006.real_current, 15.0);

        let gm = DjiState::new(BusSelector::Can2, DjiModel::Gm6020, 0x205)
            .apply(&feedback(4096, 60, -500, 41))?;
        assert_eq!(gm.torque_current, -500);
        assert_eq!(gm.temperature, 41);
        assert!((gm.rotor_degree - 4096.0 / 22.75).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_gm6020_angle_is_absolute() -> Result<(), DecodeError> {
        let mut st = DjiState::new(BusSelector::Can1, DjiModel::Gm6020, 0x205);
        for angle in [8000, 100, 200] {
            st = st.apply(&feedback(angle, 0, 0, 0))?;
        }
        assert_eq!(st.round_count, 1);
        assert!((st.rotor_degree - 200.0 / 22.75).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_short_frame_leaves_state_untouched() {
        let motor = DjiMotor {
            bus: BusSelector::Can1,
            model: DjiModel::M3508,
            motor_id: 0x201,
            state: SnapshotCell::new(DjiState::new(BusSelector::Can1, DjiModel::M3508, 0x201)),
        };
        let id = CanId::standard(0x201).unwrap();
        let short = CanFrame::new(id, &[0, 100, 0]).unwrap();
        assert_eq!(
            motor.on_frame(&short),
            Err(DecodeError::TooShort {
                expected: 7,
                actual: 3
            })
        );
        assert_eq!(motor.state().frames, 0);
        assert!(!motor.state().got_offset);
    }

    #[test]
    fn test_group_validation() {
        assert!(matches!(
            current_frame(0x1FE, [0; 4]),
            Err(DriverError::InvalidGroup(0x1FE))
        ));
        assert!(matches!(
            gm6020_voltage_frame(0x200, [0; 4]),
            Err(DriverError::InvalidGroup(0x200))
        ));
        let f = current_frame(0x200, [1000, -1000, 0, 0x1234]).unwrap();
        assert_eq!(f.id.raw(), 0x200);
        assert_eq!(f.payload(), &[0x03, 0xE8, 0xFC, 0x18, 0, 0, 0x12, 0x34]);
        assert_eq!(gm6020_current_frame(0x2FE, [0; 4]).unwrap().id.raw(), 0x2FE);
    }

    #[test]
    fn test_command_slot() {
        assert_eq!(command_slot(ControlKind::Current, 0x201).unwrap(), (0x200, 0));
        assert_eq!(command_slot(ControlKind::Current, 0x206).unwrap(), (0x1FF, 1));
        assert_eq!(command_slot(ControlKind::Gm6020Voltage, 0x20B).unwrap(), (0x2FF, 2));
        assert_eq!(command_slot(ControlKind::Gm6020Current, 0x205).unwrap(), (0x1FE, 0));
        assert!(command_slot(ControlKind::Current, 0x209).is_err());
        assert!(command_slot(ControlKind::Gm6020Voltage, 0x20C).is_err());
        assert!(command_slot(ControlKind::Gm6020Voltage, 0x204).is_err());
    }

    #[test]
    fn test_init_checks_id_range() {
        let registry = BusRegistry::new();
        assert!(matches!(
            DjiMotor::init(&registry, BusSelector::Can1, DjiModel::M3508, 0x209),
            Err(DriverError::InvalidMotorId(0x209))
        ));
        let gm = DjiMotor::init(&registry, BusSelector::Can1, DjiModel::Gm6020, 0x20B).unwrap();
        assert_eq!(registry.len(BusSelector::Can1), 1);
        gm.deinit(&registry).unwrap();
        assert!(registry.is_empty(BusSelector::Can1));
    }
}
