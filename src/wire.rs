//! Device-side wire codec: USB command frames going out, input reports and
//! SPI read replies coming back. Pure encode/decode, no I/O.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Cursor;

use crate::{
    constants::{REPORT_ID_FIRST, REPORT_ID_LAST, REPORT_IMU_LEN, REPORT_MIN_LEN, cmd, spi},
    error::WireError,
};

/// Raw 12-bit stick position as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StickPoint {
    pub x: u16,
    pub y: u16,
}

/// One accelerometer + gyroscope sample, raw device units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImuSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

/// A full-mode input report (ids 0x30..=0x33).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReport {
    pub report_id: u8,
    pub timer: u8,
    pub info: u8,
    pub right_buttons: u8,
    pub middle_buttons: u8,
    pub left_buttons: u8,
    pub sticks: [u8; 6],
    pub vibrator: u8,
    pub imu: Option<[ImuSample; 3]>,
}

impl RawReport {
    /// Decode an input report. The IMU block is optional and only read when
    /// the buffer is long enough to hold all three samples.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < REPORT_MIN_LEN {
            return Err(WireError::MalformedPacket("input report too short"));
        }
        if !(REPORT_ID_FIRST..=REPORT_ID_LAST).contains(&buf[0]) {
            return Err(WireError::MalformedPacket("unrecognized input report id"));
        }

        let mut sticks = [0u8; 6];
        sticks.copy_from_slice(&buf[6..12]);

        let imu = (buf.len() >= REPORT_IMU_LEN).then(|| {
            let mut samples = [ImuSample::default(); 3];
            for (i, sample) in samples.iter_mut().enumerate() {
                let base = REPORT_MIN_LEN + i * 12;
                for axis in 0..3 {
                    sample.accel[axis] = LittleEndian::read_i16(&buf[base + axis * 2..]);
                    sample.gyro[axis] = LittleEndian::read_i16(&buf[base + 6 + axis * 2..]);
                }
            }
            samples
        });

        Ok(Self {
            report_id: buf[0],
            timer: buf[1],
            info: buf[2],
            right_buttons: buf[3],
            middle_buttons: buf[4],
            left_buttons: buf[5],
            sticks,
            vibrator: buf[12],
            imu,
        })
    }

    /// Serialize back to the device layout.
    pub fn encode(&self) -> Vec<u8> {
        let len = if self.imu.is_some() { REPORT_IMU_LEN } else { REPORT_MIN_LEN };
        let mut buf = vec![0u8; len];
        buf[0] = self.report_id;
        buf[1] = self.timer;
        buf[2] = self.info;
        buf[3] = self.right_buttons;
        buf[4] = self.middle_buttons;
        buf[5] = self.left_buttons;
        buf[6..12].copy_from_slice(&self.sticks);
        buf[12] = self.vibrator;

        if let Some(samples) = &self.imu {
            let mut cursor = Cursor::new(&mut buf[REPORT_MIN_LEN..]);
            for sample in samples {
                for v in sample.accel.iter().chain(sample.gyro.iter()) {
                    let _ = cursor.write_i16::<LittleEndian>(*v);
                }
            }
        }
        buf
    }

    pub fn left_stick(&self) -> StickPoint {
        unpack_stick(&self.sticks[0..3])
    }

    pub fn right_stick(&self) -> StickPoint {
        unpack_stick(&self.sticks[3..6])
    }
}

/// Two 12-bit values packed into three bytes, low nibble first.
pub fn unpack_stick(b: &[u8]) -> StickPoint {
    StickPoint {
        x: u16::from(b[0]) | (u16::from(b[1] & 0xF) << 8),
        y: u16::from(b[1] >> 4) | (u16::from(b[2]) << 4),
    }
}

pub fn pack_stick(p: StickPoint) -> [u8; 3] {
    [
        (p.x & 0xFF) as u8,
        (((p.x >> 8) & 0xF) as u8) | (((p.y & 0xF) as u8) << 4),
        ((p.y >> 4) & 0xFF) as u8,
    ]
}

/// 4-bit rolling packet number placed at the front of every subcommand and
/// rumble frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandCounter {
    value: u8,
}

impl CommandCounter {
    pub fn next(&mut self) -> u8 {
        self.value = self.value.wrapping_add(1) & 0xF;
        self.value
    }
}

/// USB-wrapped command frame: `80 92 00 31 00 00 00 00 <command> <payload..>`.
pub fn encode_command(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 9 + payload.len()];
    buf[0] = 0x80;
    buf[1] = 0x92;
    buf[3] = 0x31;
    buf[8] = command;
    buf[9..].copy_from_slice(payload);
    buf
}

const NEUTRAL_RUMBLE: [u8; 8] = [0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40];

/// Subcommand frame carried inside a command 0x01 frame, prefixed with the
/// packet number and neutral rumble data.
pub fn encode_subcommand(counter: u8, subcommand: u8, payload: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(10 + payload.len());
    inner.push(counter & 0xF);
    inner.extend_from_slice(&NEUTRAL_RUMBLE);
    inner.push(subcommand);
    inner.extend_from_slice(payload);
    encode_command(cmd::SUBCOMMAND, &inner)
}

/// Rumble-only frame. A non-zero `large` wins over `small`.
pub fn encode_rumble(counter: u8, large: u8, small: u8) -> Vec<u8> {
    let mut buf = [
        counter & 0xF,
        0x80,
        0x00,
        0x40,
        0x40,
        0x80,
        0x00,
        0x40,
        0x40,
    ];
    if large != 0 {
        buf[1] = 0x08;
        buf[5] = 0x08;
        buf[2] = large;
        buf[6] = large;
    } else if small != 0 {
        buf[1] = 0x10;
        buf[5] = 0x10;
        buf[2] = small;
        buf[6] = small;
    }
    encode_command(cmd::RUMBLE_ONLY, &buf)
}

/// Arguments of an SPI flash read subcommand.
pub fn spi_read_payload(offset: u32, len: u8) -> [u8; 5] {
    let mut payload = [0u8; 5];
    LittleEndian::write_u32(&mut payload[..4], offset);
    payload[4] = len;
    payload
}

/// Extract the data of an SPI read reply, provided it answers a read at
/// `offset`. Replies to other requests yield `None`.
pub fn parse_spi_reply(reply: &[u8], offset: u32, len: u8) -> Option<&[u8]> {
    let end = spi::REPLY_DATA_AT + usize::from(len);
    if reply.len() < end {
        return None;
    }
    let marker = LittleEndian::read_u16(&reply[spi::REPLY_MARKER_AT..]);
    let echoed = LittleEndian::read_u32(&reply[spi::REPLY_OFFSET_AT..]);
    (marker == spi::REPLY_MARKER && echoed == offset).then(|| &reply[spi::REPLY_DATA_AT..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> RawReport {
        let mut sticks = [0u8; 6];
        sticks[..3].copy_from_slice(&pack_stick(StickPoint { x: 0x7A3, y: 0x812 }));
        sticks[3..].copy_from_slice(&pack_stick(StickPoint { x: 0x001, y: 0xFFF }));
        RawReport {
            report_id: 0x30,
            timer: 0x42,
            info: 0x91,
            right_buttons: 0b0000_1000,
            middle_buttons: 0b0001_0000,
            left_buttons: 0b1000_0001,
            sticks,
            vibrator: 0x0C,
            imu: Some([
                ImuSample { accel: [-12, 4096, -300], gyro: [7, -8, 9] },
                ImuSample { accel: [1, 2, 3], gyro: [4, 5, 6] },
                ImuSample { accel: [i16::MIN, i16::MAX, 0], gyro: [-1, -2, -3] },
            ]),
        }
    }

    #[test]
    fn report_encode_then_decode_recovers_fields() {
        let report = sample_report();
        let decoded = RawReport::decode(&report.encode()).unwrap();
        assert_eq!(decoded, report);
        assert_eq!(decoded.left_stick(), StickPoint { x: 0x7A3, y: 0x812 });
        assert_eq!(decoded.right_stick(), StickPoint { x: 0x001, y: 0xFFF });
    }

    #[test]
    fn short_report_without_imu_still_decodes() {
        let mut report = sample_report();
        report.imu = None;
        let bytes = report.encode();
        assert_eq!(bytes.len(), REPORT_MIN_LEN);
        assert_eq!(RawReport::decode(&bytes).unwrap().imu, None);
    }

    #[test]
    fn rejects_short_and_foreign_reports() {
        assert!(matches!(
            RawReport::decode(&[0x30; 12]),
            Err(WireError::MalformedPacket(_))
        ));
        let mut bytes = sample_report().encode();
        bytes[0] = 0x21;
        assert!(matches!(RawReport::decode(&bytes), Err(WireError::MalformedPacket(_))));
        bytes[0] = 0x3F;
        assert!(RawReport::decode(&bytes).is_err());
        bytes[0] = 0x33;
        assert!(RawReport::decode(&bytes).is_ok());
    }

    #[test]
    fn stick_unpack_matches_nibble_layout() {
        assert_eq!(
            unpack_stick(&[0x34, 0x12, 0xAB]),
            StickPoint { x: 0x234, y: 0xAB1 }
        );
    }

    #[test]
    fn subcommand_frame_layout() {
        let frame = encode_subcommand(0x13, cmd::SET_PLAYER_LED, &[0x01]);
        assert_eq!(
            frame,
            vec![
                0x80, 0x92, 0x00, 0x31, 0x00, 0x00, 0x00, 0x00, 0x01, // usb prefix
                0x03, 0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40, // counter + rumble
                0x30, 0x01,
            ]
        );
    }

    #[test]
    fn counter_wraps_at_four_bits() {
        let mut counter = CommandCounter::default();
        let seen: Vec<u8> = (0..17).map(|_| counter.next()).collect();
        assert_eq!(seen[0], 1);
        assert_eq!(seen[14], 15);
        assert_eq!(seen[15], 0);
        assert_eq!(seen[16], 1);
    }

    #[test]
    fn rumble_prefers_large_motor() {
        let frame = encode_rumble(2, 0x60, 0x20);
        assert_eq!(frame[8], cmd::RUMBLE_ONLY);
        assert_eq!(&frame[9..], &[0x02, 0x08, 0x60, 0x40, 0x40, 0x08, 0x60, 0x40, 0x40]);

        let frame = encode_rumble(2, 0, 0x20);
        assert_eq!(&frame[10..12], &[0x10, 0x20]);

        let idle = encode_rumble(2, 0, 0);
        assert_eq!(&idle[10..12], &[0x80, 0x00]);
    }

    #[test]
    fn spi_reply_must_echo_offset() {
        let mut reply = vec![0u8; 0x40];
        reply[0x17] = 0x90;
        reply[0x18] = 0x10;
        reply[0x19..0x1D].copy_from_slice(&0x603Du32.to_le_bytes());
        reply[0x1E] = 0xAA;

        assert_eq!(parse_spi_reply(&reply, 0x603D, 1), Some(&[0xAA][..]));
        assert_eq!(parse_spi_reply(&reply, 0x6020, 1), None);

        reply[0x17] = 0x00;
        assert_eq!(parse_spi_reply(&reply, 0x603D, 1), None);
        assert_eq!(parse_spi_reply(&reply[..0x10], 0x603D, 1), None);
    }

    #[test]
    fn spi_payload_is_little_endian() {
        assert_eq!(spi_read_payload(0x6020, 0x18), [0x20, 0x60, 0x00, 0x00, 0x18]);
    }
}
