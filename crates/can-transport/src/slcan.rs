use crate::{BusInfo, CanBus, CanFrame, CanId, IdType, Result, Timestamp, TransportError};
use serialport::{SerialPort, SerialPortType};
use std::fmt::Write as _;
use std::io::{Read, Write};
use std::time::Duration;
use time::OffsetDateTime;

/// SLCAN text protocol over serial (USB-CAN adapters)
pub struct SlcanBus {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SlcanBus {
    pub fn open_with(path: &str, bitrate: Option<SlcanBitrate>) -> Result<Self> {
        let mut port = serialport::new(path, 115200)
            .timeout(Duration::from_millis(200))
            .open()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        // Close, set bitrate, then open. The adapter may NAK the close when already closed.
        let _ = Self::write_cmd(&mut *port, b"C\r");
        let code = bitrate.unwrap_or(SlcanBitrate::B1M).code();
        Self::write_cmd(&mut *port, &[b'S', code, b'\r'])?;
        Self::write_cmd(&mut *port, b"O\r")?;
        Ok(SlcanBus {
            port,
            pending: Vec::with_capacity(64),
        })
    }

    fn encode_frame(frame: &CanFrame) -> Result<String> {
        if frame.rtr {
            return Err(TransportError::Unsupported("RTR not implemented"));
        }
        if frame.len > 8 {
            return Err(TransportError::InvalidFrame("dlc > 8"));
        }
        let mut out = String::with_capacity(32);
        let res = if frame.id.is_extended() {
            write!(out, "T{:08X}{}", frame.id.raw(), frame.len)
        } else {
            write!(out, "t{:03X}{}", frame.id.raw(), frame.len)
        };
        res.map_err(|_| TransportError::InvalidFrame("format"))?;
        for b in frame.payload() {
            write!(out, "{b:02X}").map_err(|_| TransportError::InvalidFrame("format"))?;
        }
        out.push('\r');
        Ok(out)
    }

    fn parse_frame(line: &[u8]) -> Result<CanFrame> {
        let (&kind, rest) = line
            .split_first()
            .ok_or(TransportError::InvalidFrame("empty"))?;
        let (id_type, id_digits, rtr) = match kind {
            b't' => (IdType::Standard, 3, false),
            b'r' => (IdType::Standard, 3, true),
            b'T' => (IdType::Extended, 8, false),
            b'R' => (IdType::Extended, 8, true),
            _ => return Err(TransportError::InvalidFrame("unknown header")),
        };
        if rest.len() < id_digits + 1 {
            return Err(TransportError::InvalidFrame("short header"));
        }
        let raw = hex_u32(&rest[..id_digits])?;
        let id = CanId::new(id_type, raw).ok_or(TransportError::InvalidFrame("id range"))?;

        let dlc = rest[id_digits].wrapping_sub(b'0');
        if dlc > 8 {
            return Err(TransportError::InvalidFrame("dlc > 8"));
        }
        let body = &rest[id_digits + 1..];
        let mut data = [0u8; 8];
        if !rtr {
            for (i, slot) in data.iter_mut().take(usize::from(dlc)).enumerate() {
                let pair = body
                    .get(i * 2..i * 2 + 2)
                    .ok_or(TransportError::InvalidFrame("short data"))?;
                *slot = hex_u32(pair)? as u8;
            }
        }
        Ok(CanFrame {
            id,
            len: dlc,
            data,
            rtr,
            timestamp: Some(Timestamp(OffsetDateTime::now_utc())),
        })
    }

    fn write_cmd(port: &mut dyn SerialPort, cmd: &[u8]) -> Result<()> {
        port.write_all(cmd)
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

fn hex_u32(digits: &[u8]) -> Result<u32> {
    let s = std::str::from_utf8(digits).map_err(|_| TransportError::InvalidFrame("utf8"))?;
    u32::from_str_radix(s, 16).map_err(|_| TransportError::InvalidFrame("hex"))
}

impl CanBus for SlcanBus {
    fn open(path: &str) -> Result<Self> {
        Self::open_with(path, None)
    }

    fn list() -> Result<Vec<BusInfo>> {
        let ports = serialport::available_ports().map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(ports
            .into_iter()
            .map(|p| BusInfo {
                driver: match p.port_type {
                    SerialPortType::UsbPort(_) => "slcan-serial".to_string(),
                    _ => "serial".to_string(),
                },
                name: p.port_name,
            })
            .collect())
    }

    fn recv(&mut self, timeout_ms: Option<u64>) -> Result<CanFrame> {
        if let Some(ms) = timeout_ms {
            self.port.set_timeout(Duration::from_millis(ms)).ok();
        }
        let mut buf = [0u8; 128];
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\r') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                let trimmed = &line[..line.len() - 1];
                // Bare CR acknowledges a command; BEL (0x07) is a NAK.
                if trimmed.is_empty() || trimmed == [0x07] {
                    continue;
                }
                return Self::parse_frame(trimmed);
            }
            match self.port.read(&mut buf) {
                Ok(n) if n > 0 => self.pending.extend_from_slice(&buf[..n]),
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout)
                }
                Err(e) => return Err(TransportError::Io(e.to_string())),
            }
        }
    }

    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        let line = Self::encode_frame(frame)?;
        self.port
            .write_all(line.as_bytes())
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

/// Supported SLCAN bitrates (mapped to Sx codes)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlcanBitrate {
    B10k,  // S0
    B20k,  // S1
    B50k,  // S2
    B100k, // S3
    B125k, // S4
    B250k, // S5
    B500k, // S6
    B800k, // S7
    B1M,   // S8
}

impl SlcanBitrate {
    pub fn code(self) -> u8 {
        match self {
            SlcanBitrate::B10k => b'0',
            SlcanBitrate::B20k => b'1',
            SlcanBitrate::B50k => b'2',
            SlcanBitrate::B100k => b'3',
            SlcanBitrate::B125k => b'4',
            SlcanBitrate::B250k => b'5',
            SlcanBitrate::B500k => b'6',
            SlcanBitrate::B800k => b'7',
            SlcanBitrate::B1M => b'8',
        }
    }
}
