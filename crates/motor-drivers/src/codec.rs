//! Wire encodings shared by the drivers.
//!
//! Two families exist and a command uses exactly one of them:
//!
//! * bit-field normalisation ([`float_to_uint`] / [`uint_to_float`]): a value in
//!   `[min, max]` is mapped linearly onto `0..=2^bits-1` (AK MIT mode);
//! * plain scaling ([`BufferWriter`] / [`BufferReader`]): `value * scale` is
//!   truncated to a big-endian `i16`/`i32` (VESC and AK servo mode).

use can_dispatch::DecodeError;
use can_transport::{CanFrame, CanId};

/// Clamp into `[min, max]`. NaN maps to `min`.
pub fn clamp(x: f32, min: f32, max: f32) -> f32 {
    if x.is_nan() {
        min
    } else {
        x.max(min).min(max)
    }
}

/// Normalise `x` onto an unsigned `bits`-wide integer. Out-of-range input is
/// clamped, never rejected.
pub fn float_to_uint(x: f32, min: f32, max: f32, bits: u32) -> u32 {
    if !(min < max) {
        return 0;
    }
    let hi = ((1u64 << bits) - 1) as f32;
    let y = (clamp(x, min, max) - min) / (max - min);
    (y * hi).round() as u32
}

pub fn uint_to_float(u: u32, min: f32, max: f32, bits: u32) -> f32 {
    if !(min < max) {
        return min;
    }
    let hi = ((1u64 << bits) - 1) as f32;
    min + (u as f32) / hi * (max - min)
}

/// Big-endian payload builder for one classic CAN frame.
#[derive(Debug, Default, Clone)]
pub struct BufferWriter {
    buf: [u8; 8],
    len: usize,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.extend(&[v])
    }

    pub fn put_i16(&mut self, v: i16) -> &mut Self {
        self.extend(&v.to_be_bytes())
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.extend(&v.to_be_bytes())
    }

    /// `v * scale` truncated to `i16`.
    pub fn put_f16(&mut self, v: f32, scale: f32) -> &mut Self {
        self.put_i16((v * scale) as i16)
    }

    /// `v * scale` truncated to `i32`.
    pub fn put_f32(&mut self, v: f32, scale: f32) -> &mut Self {
        self.put_i32((v * scale) as i32)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn frame(&self, id: CanId) -> CanFrame {
        frame(id, self.as_slice())
    }

    // Commands never exceed eight bytes; anything past the end is dropped.
    fn extend(&mut self, bytes: &[u8]) -> &mut Self {
        let end = (self.len + bytes.len()).min(self.buf.len());
        let n = end - self.len;
        self.buf[self.len..end].copy_from_slice(&bytes[..n]);
        self.len = end;
        self
    }
}

/// Big-endian cursor over a received payload.
#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    pub fn f16(&mut self, scale: f32) -> Result<f32, DecodeError> {
        Ok(f32::from(self.i16()?) / scale)
    }

    pub fn f32(&mut self, scale: f32) -> Result<f32, DecodeError> {
        Ok(self.i32()? as f32 / scale)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.pos + N;
        let mut out = [0u8; N];
        out.copy_from_slice(self.data.get(self.pos..end).ok_or(DecodeError::TooShort {
            expected: end,
            actual: self.data.len(),
        })?);
        self.pos = end;
        Ok(out)
    }
}

/// Frame from a payload known to fit in eight bytes.
pub(crate) fn frame(id: CanId, payload: &[u8]) -> CanFrame {
    let len = payload.len().min(8);
    let mut data = [0u8; 8];
    data[..len].copy_from_slice(&payload[..len]);
    CanFrame {
        id,
        len: len as u8,
        data,
        rtr: false,
        timestamp: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mid_scale_round_trip_within_one_lsb() {
        let u = float_to_uint(0.0, -12.5, 12.5, 16);
        let back = uint_to_float(u, -12.5, 12.5, 16);
        assert!((back - 0.0).abs() <= 25.0 / 65535.0);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(float_to_uint(600.0, 0.0, 500.0, 12), 4095);
        assert_eq!(float_to_uint(500.0, 0.0, 500.0, 12), 4095);
        assert_eq!(float_to_uint(-1.0, 0.0, 5.0, 12), 0);
        assert_eq!(float_to_uint(f32::NAN, 0.0, 5.0, 12), 0);
        assert_eq!(float_to_uint(1.0, 5.0, 5.0, 12), 0);
    }

    #[test]
    fn test_writer_truncates_toward_zero() {
        let mut w = BufferWriter::new();
        w.put_f32(0.123456, 100000.0).put_f16(-1.99, 10.0);
        assert_eq!(w.as_slice(), &[0x00, 0x00, 0x30, 0x39, 0xFF, 0xED]);
    }

    #[test]
    fn test_writer_stops_at_eight_bytes() {
        let mut w = BufferWriter::new();
        w.put_i32(1).put_i32(2).put_i16(3);
        assert_eq!(w.as_slice().len(), 8);
    }

    #[test]
    fn test_reader_reports_short_payload() {
        let mut r = BufferReader::new(&[0x03, 0xE8, 0x00]);
        assert_eq!(r.f16(10.0), Ok(100.0));
        assert_eq!(
            r.i16(),
            Err(DecodeError::TooShort {
                expected: 4,
                actual: 3
            })
        );
    }
}
