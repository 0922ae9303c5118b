//! CubeMars AK series.
//!
//! The same motor speaks two protocols. Servo mode uses extended ids with the
//! command packet in bits 8..16 and plainly scaled integers; MIT mode uses the
//! bare standard id and a dense bit-packed position/speed/gain/torque frame.

use crate::codec::{clamp, float_to_uint, frame, uint_to_float, BufferReader, BufferWriter};
use crate::{DriverError, Result, SnapshotCell};
use can_dispatch::{BusRegistry, DecodeError, FrameHandler};
use can_transport::{BusSelector, BusTransport, CanFrame, CanId, IdType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const MIT_POSITION_LIMIT: f32 = 12.5;
pub const MIT_KP_LIMIT: f32 = 500.0;
pub const MIT_KD_LIMIT: f32 = 5.0;

const SERVO_MAX_DUTY: f32 = 1.0;
const SERVO_MAX_CURRENT: f32 = 60000.0;
const SERVO_MAX_RPM: f32 = 100000.0;
const SERVO_MAX_POSITION: f32 = 36000.0;
const SERVO_MIN_POS_SPEED: f32 = -32768.0;
const SERVO_MAX_POS_SPEED: f32 = 32767.0;
const SERVO_MAX_ACCEL: f32 = 32767.0;

const MIT_ENTER: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC];
const MIT_EXIT: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFD];
const MIT_ZERO: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AkModel {
    #[serde(rename = "ak10-9")]
    Ak10_9,
    #[serde(rename = "ak60-6")]
    Ak60_6,
    #[serde(rename = "ak70-10")]
    Ak70_10,
    #[serde(rename = "ak80-6")]
    Ak80_6,
    #[serde(rename = "ak80-9")]
    Ak80_9,
    #[serde(rename = "ak80-80/64")]
    Ak80_80_64,
    #[serde(rename = "ak80-8")]
    Ak80_8,
}

impl AkModel {
    /// MIT-mode speed limit (rad/s) and torque limit (Nm).
    pub fn mit_limits(self) -> (f32, f32) {
        match self {
            AkModel::Ak10_9 => (50.0, 65.0),
            AkModel::Ak60_6 => (45.0, 15.0),
            AkModel::Ak70_10 => (50.0, 25.0),
            AkModel::Ak80_6 => (76.0, 12.0),
            AkModel::Ak80_9 => (50.0, 18.0),
            AkModel::Ak80_80_64 => (8.0, 144.0),
            AkModel::Ak80_8 => (37.5, 32.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AkMode {
    Mit,
    Servo,
}

impl AkMode {
    pub fn id_type(self) -> IdType {
        match self {
            AkMode::Mit => IdType::Standard,
            AkMode::Servo => IdType::Extended,
        }
    }
}

/// Servo-mode command packets, carried in bits 8..16 of the extended id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServoPacket {
    SetDuty = 0,
    SetCurrent = 1,
    SetBrakeCurrent = 2,
    SetRpm = 3,
    SetPos = 4,
    SetOrigin = 5,
    SetPosSpd = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum OriginMode {
    /// Cleared on power loss.
    Temporary = 0,
    Permanent = 1,
    RestoreDefault = 2,
}

/// Fault code reported in byte 7 of every feedback frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AkFault {
    None,
    OverTemperature,
    OverCurrent,
    OverVoltage,
    UnderVoltage,
    Encoder,
    MosfetOverTemperature,
    RotorLock,
    Other(u8),
}

impl From<u8> for AkFault {
    fn from(code: u8) -> Self {
        match code {
            0 => AkFault::None,
            1 => AkFault::OverTemperature,
            2 => AkFault::OverCurrent,
            3 => AkFault::OverVoltage,
            4 => AkFault::UnderVoltage,
            5 => AkFault::Encoder,
            6 => AkFault::MosfetOverTemperature,
            7 => AkFault::RotorLock,
            other => AkFault::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AkState {
    pub id: u8,
    pub bus: BusSelector,
    pub model: AkModel,
    pub mode: AkMode,
    pub pos: f32,
    pub spd: f32,
    /// Phase current in servo mode, torque in MIT mode.
    pub current_torque: f32,
    pub temperature: i8,
    pub fault: AkFault,
    pub frames: u64,
}

impl AkState {
    pub fn new(bus: BusSelector, model: AkModel, mode: AkMode, id: u8) -> Self {
        Self {
            id,
            bus,
            model,
            mode,
            pos: 0.0,
            spd: 0.0,
            current_torque: 0.0,
            temperature: 0,
            fault: AkFault::None,
            frames: 0,
        }
    }

    /// Decode one feedback frame. The framing of the id selects the layout.
    pub fn apply(&self, frame: &CanFrame) -> Result<Self, DecodeError> {
        let data = frame.payload();
        DecodeError::check_len(data, 8)?;
        let mut next = self.clone();
        if frame.id.is_extended() {
            let mut r = BufferReader::new(data);
            next.pos = r.f16(10.0)?;
            next.spd = r.f16(0.01)?;
            next.current_torque = r.f16(10.0)?;
        } else {
            let (v_max, t_max) = self.model.mit_limits();
            let pos = u32::from(data[1]) << 8 | u32::from(data[2]);
            let spd = u32::from(data[3]) << 4 | u32::from(data[4]) >> 4;
            let torque = u32::from(data[4] & 0x0F) << 8 | u32::from(data[5]);
            next.pos = uint_to_float(pos, -MIT_POSITION_LIMIT, MIT_POSITION_LIMIT, 16);
            next.spd = uint_to_float(spd, -v_max, v_max, 12);
            next.current_torque = uint_to_float(torque, -t_max, t_max, 12);
        }
        next.temperature = data[6] as i8;
        next.fault = AkFault::from(data[7]);
        next.frames += 1;
        Ok(next)
    }
}

/// MIT-mode setpoint. Every field is clamped to its range before packing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MitCommand {
    pub pos: f32,
    pub spd: f32,
    pub kp: f32,
    pub kd: f32,
    pub torque: f32,
}

/// Pack a MIT command: p16 v12 kp12 kd12 t12, MSB first.
pub fn mit_payload(model: AkModel, cmd: &MitCommand) -> [u8; 8] {
    let (v_max, t_max) = model.mit_limits();
    let p = float_to_uint(cmd.pos, -MIT_POSITION_LIMIT, MIT_POSITION_LIMIT, 16);
    let v = float_to_uint(cmd.spd, -v_max, v_max, 12);
    let kp = float_to_uint(cmd.kp, 0.0, MIT_KP_LIMIT, 12);
    let kd = float_to_uint(cmd.kd, 0.0, MIT_KD_LIMIT, 12);
    let t = float_to_uint(cmd.torque, -t_max, t_max, 12);
    [
        (p >> 8) as u8,
        p as u8,
        (v >> 4) as u8,
        ((v & 0x0F) << 4 | kp >> 8) as u8,
        kp as u8,
        (kd >> 4) as u8,
        ((kd & 0x0F) << 4 | t >> 8) as u8,
        t as u8,
    ]
}

/// Inverse of [`mit_payload`], up to quantisation.
pub fn mit_unpack(model: AkModel, data: &[u8; 8]) -> MitCommand {
    let (v_max, t_max) = model.mit_limits();
    let p = u32::from(data[0]) << 8 | u32::from(data[1]);
    let v = u32::from(data[2]) << 4 | u32::from(data[3]) >> 4;
    let kp = u32::from(data[3] & 0x0F) << 8 | u32::from(data[4]);
    let kd = u32::from(data[5]) << 4 | u32::from(data[6]) >> 4;
    let t = u32::from(data[6] & 0x0F) << 8 | u32::from(data[7]);
    MitCommand {
        pos: uint_to_float(p, -MIT_POSITION_LIMIT, MIT_POSITION_LIMIT, 16),
        spd: uint_to_float(v, -v_max, v_max, 12),
        kp: uint_to_float(kp, 0.0, MIT_KP_LIMIT, 12),
        kd: uint_to_float(kd, 0.0, MIT_KD_LIMIT, 12),
        torque: uint_to_float(t, -t_max, t_max, 12),
    }
}

pub fn servo_id(id: u8, packet: ServoPacket) -> u32 {
    u32::from(id) | (packet as u32) << 8
}

/// One AK motor, registered in the id framing of its mode.
#[derive(Debug)]
pub struct AkMotor {
    bus: BusSelector,
    id: u8,
    model: AkModel,
    mode: AkMode,
    state: SnapshotCell<AkState>,
}

impl AkMotor {
    pub fn init(
        registry: &BusRegistry,
        bus: BusSelector,
        model: AkModel,
        mode: AkMode,
        id: u8,
    ) -> Result<Arc<Self>> {
        let motor = Arc::new(Self {
            bus,
            id,
            model,
            mode,
            state: SnapshotCell::new(AkState::new(bus, model, mode, id)),
        });
        registry.add(bus, mode.id_type(), u32::from(id), 0xFF, &motor)?;
        info!(%bus, ?model, ?mode, id, "ak motor bound");
        Ok(motor)
    }

    pub fn deinit(&self, registry: &BusRegistry) -> Result<()> {
        registry.remove_by_id(self.bus, self.mode.id_type(), u32::from(self.id))?;
        Ok(())
    }

    pub fn state(&self) -> Arc<AkState> {
        self.state.load()
    }

    pub fn bus(&self) -> BusSelector {
        self.bus
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn model(&self) -> AkModel {
        self.model
    }

    pub fn mode(&self) -> AkMode {
        self.mode
    }

    fn servo_frame(&self, packet: ServoPacket, w: &BufferWriter) -> Result<CanFrame> {
        let raw = servo_id(self.id, packet);
        let id = CanId::extended(raw).ok_or(DriverError::InvalidMotorId(raw))?;
        Ok(w.frame(id))
    }

    fn mit_frame(&self, payload: &[u8; 8]) -> Result<CanFrame> {
        let id = CanId::standard(u16::from(self.id))
            .ok_or(DriverError::InvalidMotorId(u32::from(self.id)))?;
        Ok(frame(id, payload))
    }

    /// Duty cycle 0..1.
    pub fn duty_frame(&self, duty: f32) -> Result<CanFrame> {
        let mut w = BufferWriter::new();
        w.put_f32(clamp(duty, 0.0, SERVO_MAX_DUTY), 100000.0);
        self.servo_frame(ServoPacket::SetDuty, &w)
    }

    /// Phase current in mA, ±60000. Torque follows `iq * Kt`.
    pub fn current_frame(&self, current: f32) -> Result<CanFrame> {
        let mut w = BufferWriter::new();
        w.put_f32(clamp(current, -SERVO_MAX_CURRENT, SERVO_MAX_CURRENT), 1000.0);
        self.servo_frame(ServoPacket::SetCurrent, &w)
    }

    pub fn brake_current_frame(&self, current: f32) -> Result<CanFrame> {
        let mut w = BufferWriter::new();
        w.put_f32(clamp(current, -SERVO_MAX_CURRENT, SERVO_MAX_CURRENT), 1000.0);
        self.servo_frame(ServoPacket::SetBrakeCurrent, &w)
    }

    /// Electrical rpm, ±100000.
    pub fn rpm_frame(&self, erpm: f32) -> Result<CanFrame> {
        let mut w = BufferWriter::new();
        w.put_f32(clamp(erpm, -SERVO_MAX_RPM, SERVO_MAX_RPM), 1.0);
        self.servo_frame(ServoPacket::SetRpm, &w)
    }

    /// Degrees, ±36000.
    pub fn pos_frame(&self, pos: f32) -> Result<CanFrame> {
        let mut w = BufferWriter::new();
        w.put_f32(clamp(pos, -SERVO_MAX_POSITION, SERVO_MAX_POSITION), 10000.0);
        self.servo_frame(ServoPacket::SetPos, &w)
    }

    pub fn origin_frame(&self, mode: OriginMode) -> Result<CanFrame> {
        let mut w = BufferWriter::new();
        w.put_u8(mode as u8);
        self.servo_frame(ServoPacket::SetOrigin, &w)
    }

    /// Position with a speed (erpm / 10) and acceleration (erpm/s² / 10) limit.
    pub fn pos_spd_frame(&self, pos: f32, spd: f32, rpa: f32) -> Result<CanFrame> {
        let mut w = BufferWriter::new();
        w.put_f32(clamp(pos, -SERVO_MAX_POSITION, SERVO_MAX_POSITION), 10000.0)
            .put_i16((clamp(spd, SERVO_MIN_POS_SPEED, SERVO_MAX_POS_SPEED) / 10.0) as i16)
            .put_i16((clamp(rpa, 0.0, SERVO_MAX_ACCEL) / 10.0) as i16);
        self.servo_frame(ServoPacket::SetPosSpd, &w)
    }

    pub fn mit_enter_frame(&self) -> Result<CanFrame> {
        self.mit_frame(&MIT_ENTER)
    }

    pub fn mit_exit_frame(&self) -> Result<CanFrame> {
        self.mit_frame(&MIT_EXIT)
    }

    pub fn mit_origin_frame(&self) -> Result<CanFrame> {
        self.mit_frame(&MIT_ZERO)
    }

    pub fn mit_command_frame(&self, cmd: &MitCommand) -> Result<CanFrame> {
        self.mit_frame(&mit_payload(self.model, cmd))
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

    pub fn set_rpm(&self, tx: &impl BusTransport, erpm: f32) -> Result<()> {
        self.send(tx, self.rpm_frame(erpm)?)
    }

    pub fn set_pos(&self, tx: &impl BusTransport, pos: f32) -> Result<()> {
        self.send(tx, self.pos_frame(pos)?)
    }

    pub fn set_origin(&self, tx: &impl BusTransport, mode: OriginMode) -> Result<()> {
        self.send(tx, self.origin_frame(mode)?)
    }

    pub fn set_pos_spd(&self, tx: &impl BusTransport, pos: f32, spd: f32, rpa: f32) -> Result<()> {
        self.send(tx, self.pos_spd_frame(pos, spd, rpa)?)
    }

    /// Must be sent before MIT commands take effect.
    pub fn mit_enter(&self, tx: &impl BusTransport) -> Result<()> {
        self.send(tx, self.mit_enter_frame()?)
    }

    pub fn mit_exit(&self, tx: &impl BusTransport) -> Result<()> {
        self.send(tx, self.mit_exit_frame()?)
    }

    pub fn mit_set_origin(&self, tx: &impl BusTransport) -> Result<()> {
        self.send(tx, self.mit_origin_frame()?)
    }

    pub fn mit_send(&self, tx: &impl BusTransport, cmd: &MitCommand) -> Result<()> {
        self.send(tx, self.mit_command_frame(cmd)?)
    }

    fn send(&self, tx: &impl BusTransport, frame: CanFrame) -> Result<()> {
        tx.send(self.bus, &frame)?;
        Ok(())
    }
}

impl FrameHandler for AkMotor {
    fn on_frame(&self, frame: &CanFrame) -> Result<(), DecodeError> {
        self.state.publish_with(|prev| prev.apply(frame))
    }
}
