//! VESC motor controllers on extended-id CAN.
//!
//! Both directions put the controller id in bits 0..8 and the packet type in
//! bits 8..16 of the extended id.

use crate::codec::{BufferReader, BufferWriter};
use crate::{DriverError, Result, SnapshotCell};
use can_dispatch::{BusRegistry, DecodeError, FrameHandler};
use can_transport::{BusSelector, BusTransport, CanFrame, CanId, IdType};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Packet types used by this driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VescPacket {
    SetDuty = 0,
    SetCurrent = 1,
    SetCurrentBrake = 2,
    SetRpm = 3,
    SetPos = 4,
    Status = 9,
    SetCurrentRel = 10,
    SetCurrentBrakeRel = 11,
    Status2 = 14,
    Status3 = 15,
    Status4 = 16,
    ConfCurrentLimitsIn = 23,
    ConfStoreCurrentLimitsIn = 24,
    Status5 = 27,
}

pub fn vesc_id(controller: u8, packet: VescPacket) -> u32 {
    u32::from(controller) | (packet as u32) << 8
}

/// Telemetry assembled from the periodic status broadcasts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VescState {
    pub controller_id: u8,
    pub erpm: f32,
    pub total_current: f32,
    pub duty: f32,
    pub amp_hours: f32,
    pub amp_hours_charged: f32,
    pub watt_hours: f32,
    pub watt_hours_charged: f32,
    pub mosfet_temperature: f32,
    pub motor_temperature: f32,
    pub input_current: f32,
    pub pid_pos: f32,
    pub tachometer: i32,
    pub input_voltage: f32,
    pub frames: u64,
}

impl VescState {
    /// Fold one status frame into the state. Each status packet only touches
    /// its own fields.
    pub fn apply(&self, frame: &CanFrame) -> Result<Self, DecodeError> {
        let tag = ((frame.id.raw() >> 8) & 0xFF) as u8;
        let mut r = BufferReader::new(frame.payload());
        let mut next = self.clone();
        match tag {
            t if t == VescPacket::Status as u8 => {
                next.erpm = r.f32(1.0)?;
                next.total_current = r.f16(10.0)?;
                next.duty = r.f16(1000.0)?;
            }
            t if t == VescPacket::Status2 as u8 => {
                next.amp_hours = r.f32(10000.0)?;
                next.amp_hours_charged = r.f32(10000.0)?;
            }
            t if t == VescPacket::Status3 as u8 => {
                next.watt_hours = r.f32(10000.0)?;
                next.watt_hours_charged = r.f32(10000.0)?;
            }
            t if t == VescPacket::Status4 as u8 => {
                next.mosfet_temperature = r.f16(10.0)?;
                next.motor_temperature = r.f16(10.0)?;
                next.input_current = r.f16(10.0)?;
                next.pid_pos = r.f16(50.0)?;
            }
            t if t == VescPacket::Status5 as u8 => {
                next.tachometer = r.i32()?;
                next.input_voltage = r.f16(10.0)?;
            }
            other => return Err(DecodeError::UnknownCommand(other)),
        }
        next.frames += 1;
        Ok(next)
    }
}

#[derive(Debug)]
pub struct VescMotor {
    bus: BusSelector,
    controller_id: u8,
    state: SnapshotCell<VescState>,
}

impl VescMotor {
    pub fn init(registry: &BusRegistry, bus: BusSelector, controller_id: u8) -> Result<Arc<Self>> {
        let motor = Arc::new(Self {
            bus,
            controller_id,
            state: SnapshotCell::new(VescState {
                controller_id,
                ..VescState::default()
            }),
        });
        registry.add(bus, IdType::Extended, u32::from(controller_id), 0xFF, &motor)?;
        info!(%bus, controller_id, "vesc bound");
        Ok(motor)
    }

    /// Removes this controller's entry by identity.
    pub fn deinit(self: &Arc<Self>, registry: &BusRegistry) -> Result<()> {
        registry.remove_by_context(self.bus, self)?;
        Ok(())
    }

    pub fn state(&self) -> Arc<VescState> {
        self.state.load()
    }

    pub fn bus(&self) -> BusSelector {
        self.bus
    }

    pub fn controller_id(&self) -> u8 {
        self.controller_id
    }

    fn command(&self, packet: VescPacket, w: &BufferWriter) -> Result<CanFrame> {
        let raw = vesc_id(self.controller_id, packet);
        let id = CanId::extended(raw).ok_or(DriverError::InvalidMotorId(raw))?;
        Ok(w.frame(id))
    }

    fn scaled(&self, packet: VescPacket, value: f32, scale: f32) -> Result<CanFrame> {
        let mut w = BufferWriter::new();
        w.put_f32(value, scale);
        self.command(packet, &w)
    }

    pub fn duty_frame(&self, duty: f32) -> Result<CanFrame> {
        self.scaled(VescPacket::SetDuty, duty, 100000.0)
    }

    /// Amps.
    pub fn current_frame(&self, current: f32) -> Result<CanFrame> {
        self.scaled(VescPacket::SetCurrent, current, 1000.0)
    }

    pub fn brake_current_frame(&self, current: f32) -> Result<CanFrame> {
        self.scaled(VescPacket::SetCurrentBrake, current, 1000.0)
    }

    pub fn erpm_frame(&self, erpm: f32) -> Result<CanFrame> {
        self.scaled(VescPacket::SetRpm, erpm, 1.0)
    }

    pub fn pos_frame(&self, pos: f32) -> Result<CanFrame> {
        self.scaled(VescPacket::SetPos, pos, 1.0)
    }

    /// Fraction of the configured current limit, -1..1.
    pub fn relative_current_frame(&self, current: f32) -> Result<CanFrame> {
        self.scaled(VescPacket::SetCurrentRel, current, 100000.0)
    }

    pub fn relative_brake_current_frame(&self, current: f32) -> Result<CanFrame> {
        self.scaled(VescPacket::SetCurrentBrakeRel, current, 100000.0)
    }

    /// Input current limits in amps, optionally persisted by the controller.
    pub fn current_limit_frame(&self, min: f32, max: f32, store: bool) -> Result<CanFrame> {
        let mut w = BufferWriter::new();
        w.put_f32(min, 1000.0).put_f32(max, 1000.0);
        let packet = if store {
            VescPacket::ConfStoreCurrentLimitsIn
        } else {
            VescPacket::ConfCurrentLimitsIn
        };
        self.command(packet, &w)
    }

    pub fn set_duty(&self, tx: &impl BusTransport, duty: f32) -> Result<()> {
        self.send(tx, self.duty_frame(duty)?)
    }

    pub fn set_current(&self, tx: &impl BusTransport, current: f32) -> Result<()> {
        self.send(tx, self.current_frame(current)?)
    }

    pub fn set_brake_current(&self, tx: &impl BusTransport, current: f32) -> Result<()> {
        self.send(tx, self.brake_current_frame(current)?)
    }

    pub fn set_erpm(&self, tx: &impl BusTransport, erpm: f32) -> Result<()> {
        self.send(tx, self.erpm_frame(erpm)?)
    }

    pub fn set_pos(&self, tx: &impl BusTransport, pos: f32) -> Result<()> {
        self.send(tx, self.pos_frame(pos)?)
    }

    pub fn set_relative_current(&self, tx: &impl BusTransport, current: f32) -> Result<()> {
        self.send(tx, self.relative_current_frame(current)?)
    }

    pub fn set_relative_brake_current(&self, tx: &impl BusTransport, current: f32) -> Result<()> {
        self.send(tx, self.relative_brake_current_frame(current)?)
    }

    pub fn set_current_limit(
        &self,
        tx: &impl BusTransport,
        min: f32,
        max: f32,
        store: bool,
    ) -> Result<()> {
        self.send(tx, self.current_limit_frame(min, max, store)?)
    }

    fn send(&self, tx: &impl BusTransport, frame: CanFrame) -> Result<()> {
        tx.send(self.bus, &frame)?;
        Ok(())
    }
}

impl FrameHandler for VescMotor {
    fn on_frame(&self, frame: &CanFrame) -> Result<(), DecodeError> {
        if !frame.id.is_extended() {
            return Err(DecodeError::UnexpectedIdType(IdType::Standard));
        }
        self.state.publish_with(|prev| prev.apply(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(controller: u8, packet: VescPacket, w: &BufferWriter) -> anyhow::Result<CanFrame> {
        let id = CanId::extended(vesc_id(controller, packet)).ok_or_else(|| anyhow::anyhow!("id"))?;
        Ok(w.frame(id))
    }

    fn motor(controller_id: u8) -> VescMotor {
        VescMotor {
            bus: BusSelector::Can1,
            controller_id,
            state: SnapshotCell::default(),
        }
    }

    #[test]
    fn test_status_decodes_exactly() -> anyhow::Result<()> {
        let mut w = BufferWriter::new();
        w.put_i32(1000).put_i16(50).put_i16(500);
        let st = VescState::default().apply(&status(42, VescPacket::Status, &w)?)?;
        assert_eq!(st.erpm, 1000.0);
        assert_eq!(st.total_current, 5.0);
        assert_eq!(st.duty, 0.5);
        Ok(())
    }

    #[test]
    fn test_status_2_to_5() -> anyhow::Result<()> {
        let mut st = VescState::default();

        let mut w = BufferWriter::new();
        w.put_i32(25_000).put_i32(5_000);
        st = st.apply(&status(1, VescPacket::Status2, &w)?)?;
        assert_eq!((st.amp_hours, st.amp_hours_charged), (2.5, 0.5));

        let mut w = BufferWriter::new();
        w.put_i32(120_000).put_i32(0);
        st = st.apply(&status(1, VescPacket::Status3, &w)?)?;
        assert_eq!(st.watt_hours, 12.0);

        let mut w = BufferWriter::new();
        w.put_i16(355).put_i16(402).put_i16(-15).put_i16(9000);
        st = st.apply(&status(1, VescPacket::Status4, &w)?)?;
        assert_eq!(st.mosfet_temperature, 35.5);
        assert_eq!(st.motor_temperature, 40.2);
        assert_eq!(st.input_current, -1.5);
        assert_eq!(st.pid_pos, 180.0);

        let mut w = BufferWriter::new();
        w.put_i32(-12345).put_i16(241);
        st = st.apply(&status(1, VescPacket::Status5, &w)?)?;
        assert_eq!(st.tachometer, -12345);
        assert_eq!(st.input_voltage, 24.1);
        assert_eq!(st.frames, 4);
        Ok(())
    }

    #[test]
    fn test_unknown_packet_is_rejected() -> anyhow::Result<()> {
        let m = motor(42);
        let frame = status(42, VescPacket::SetDuty, &BufferWriter::new())?;
        assert_eq!(m.on_frame(&frame), Err(DecodeError::UnknownCommand(0)));
        assert_eq!(m.state().frames, 0);
        Ok(())
    }

    #[test]
    fn test_truncated_status_is_rejected() -> anyhow::Result<()> {
        let mut w = BufferWriter::new();
        w.put_i32(1000);
        let m = motor(42);
        assert!(matches!(
            m.on_frame(&status(42, VescPacket::Status, &w)?),
            Err(DecodeError::TooShort { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_command_ids_and_scaling() -> Result<()> {
        let m = motor(0x2A);
        let f = m.duty_frame(0.25)?;
        assert_eq!(f.id.raw(), 0x002A);
        assert_eq!(f.payload(), &25_000i32.to_be_bytes());

        assert_eq!(m.current_frame(-2.0)?.payload(), &(-2000i32).to_be_bytes());
        assert_eq!(m.brake_current_frame(1.0)?.id.raw(), 0x022A);
        assert_eq!(m.erpm_frame(3000.0)?.id.raw(), 0x032A);
        assert_eq!(m.pos_frame(90.0)?.id.raw(), 0x042A);
        assert_eq!(m.relative_current_frame(0.5)?.id.raw(), 0x0A2A);
        assert_eq!(m.relative_brake_current_frame(0.5)?.id.raw(), 0x0B2A);

        let f = m.current_limit_frame(-10.0, 20.0, false)?;
        assert_eq!(f.id.raw(), 0x172A);
        assert_eq!(&f.payload()[..4], &(-10_000i32).to_be_bytes());
        assert_eq!(&f.payload()[4..], &20_000i32.to_be_bytes());
        assert_eq!(m.current_limit_frame(0.0, 1.0, true)?.id.raw(), 0x182A);
        Ok(())
    }
}
