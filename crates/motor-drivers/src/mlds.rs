//! MLDS3605 servo drive. Command-only: the drive's replies are not decoded.
//!
//! Every frame goes to the drive's standard id and carries
//! `[len, id, cmd, 0, value (little-endian)...]`.

use crate::{DriverError, Result};
use can_transport::{BusSelector, BusTransport, CanFrame, CanId};
use serde::{Deserialize, Serialize};

/// Encoder counts per degree of output angle.
pub const COUNTS_PER_DEGREE: f32 = 117.76;

const CMD_SET_MODE: u8 = 0x2A;
const CMD_RUN_SPEED: u8 = 0x90;
const CMD_SET_ABSOLUTE_ORIGIN: u8 = 0x98;
const CMD_RUN_ABSOLUTE_ANGLE: u8 = 0x99;
const CMD_RUN_RELATIVE_ANGLE: u8 = 0x9A;

/// Where the drive takes its setpoint from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SignalSource {
    Digital = 0x00,
    Differential = 0x01,
    Pwm = 0x02,
    Pulse = 0x03,
    Analog = 0x05,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ControlMode {
    Speed = 0x0,
    Position = 0x1,
    Current = 0x2,
    Amplifier = 0x3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidTerm {
    Kp,
    Ki,
    Kd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidLoop {
    Speed,
    Angle,
}

impl PidLoop {
    fn command(self, term: PidTerm) -> u8 {
        match (self, term) {
            (PidLoop::Speed, PidTerm::Kp) => 0x60,
            (PidLoop::Speed, PidTerm::Ki) => 0x62,
            (PidLoop::Speed, PidTerm::Kd) => 0x64,
            (PidLoop::Angle, PidTerm::Kp) => 0x66,
            (PidLoop::Angle, PidTerm::Ki) => 0x6A,
            (PidLoop::Angle, PidTerm::Kd) => 0x6C,
        }
    }
}

/// Handle to one drive. Holds no feedback state, so it is not registered for
/// receive dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MldsMotor {
    bus: BusSelector,
    id: u8,
}

impl MldsMotor {
    pub fn new(bus: BusSelector, id: u8) -> Self {
        Self { bus, id }
    }

    pub fn bus(&self) -> BusSelector {
        self.bus
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    fn frame(&self, len: u8, cmd: u8, value: &[u8]) -> Result<CanFrame> {
        let can_id = CanId::standard(u16::from(self.id))
            .ok_or(DriverError::InvalidMotorId(u32::from(self.id)))?;
        let mut data = [0u8; 8];
        data[0] = len;
        data[1] = self.id;
        data[2] = cmd;
        data[4..4 + value.len()].copy_from_slice(value);
        Ok(crate::codec::frame(can_id, &data))
    }

    pub fn mode_frame(&self, source: SignalSource, mode: ControlMode) -> Result<CanFrame> {
        let word = u32::from(source as u8) | u32::from(mode as u8) << 8;
        self.frame(8, CMD_SET_MODE, &word.to_le_bytes())
    }

    pub fn speed_frame(&self, speed: i32) -> Result<CanFrame> {
        self.frame(8, CMD_RUN_SPEED, &speed.to_le_bytes())
    }

    pub fn absolute_origin_frame(&self) -> Result<CanFrame> {
        self.frame(4, CMD_SET_ABSOLUTE_ORIGIN, &[])
    }

    /// Degrees from the absolute origin.
    pub fn absolute_angle_frame(&self, degrees: f32) -> Result<CanFrame> {
        let counts = (degrees * COUNTS_PER_DEGREE) as i32;
        self.frame(8, CMD_RUN_ABSOLUTE_ANGLE, &counts.to_le_bytes())
    }

    pub fn relative_angle_frame(&self, degrees: f32) -> Result<CanFrame> {
        let counts = (degrees * COUNTS_PER_DEGREE) as i32;
        self.frame(8, CMD_RUN_RELATIVE_ANGLE, &counts.to_le_bytes())
    }

    pub fn pid_frame(&self, pid: PidLoop, term: PidTerm, value: i16) -> Result<CanFrame> {
        self.frame(8, pid.command(term), &value.to_le_bytes())
    }

    pub fn set_mode(
        &self,
        tx: &impl BusTransport,
        source: SignalSource,
        mode: ControlMode,
    ) -> Result<()> {
        self.send(tx, self.mode_frame(source, mode)?)
    }

    pub fn run_speed(&self, tx: &impl BusTransport, speed: i32) -> Result<()> {
        self.send(tx, self.speed_frame(speed)?)
    }

    pub fn set_absolute_origin(&self, tx: &impl BusTransport) -> Result<()> {
        self.send(tx, self.absolute_origin_frame()?)
    }

    pub fn run_absolute_angle(&self, tx: &impl BusTransport, degrees: f32) -> Result<()> {
        self.send(tx, self.absolute_angle_frame(degrees)?)
    }

    pub fn run_relative_angle(&self, tx: &impl BusTransport, degrees: f32) -> Result<()> {
        self.send(tx, self.relative_angle_frame(degrees)?)
    }

    pub fn set_speed_pid(&self, tx: &impl BusTransport, term: PidTerm, value: i16) -> Result<()> {
        self.send(tx, self.pid_frame(PidLoop::Speed, term, value)?)
    }

    pub fn set_angle_pid(&self, tx: &impl BusTransport, term: PidTerm, value: i16) -> Result<()> {
        self.send(tx, self.pid_frame(PidLoop::Angle, term, value)?)
    }

    fn send(&self, tx: &impl BusTransport, frame: CanFrame) -> Result<()> {
        tx.send(self.bus, &frame)?;
        Ok(())
    }
}
