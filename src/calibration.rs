//! Stick and motion-sensor calibration.
//!
//! Factory calibration lives in two SPI flash blocks: 18 bytes of packed
//! 12-bit stick values at 0x603D and 24 bytes of IMU origins at 0x6020.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{STICK_RAW_CENTER, STICK_RAW_MAX},
    wire::StickPoint,
};

/// Where stick ranges come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMode {
    /// Read the factory blocks from SPI flash during configuration.
    #[default]
    Factory,
    /// Learn the range from observed samples.
    Adaptive,
    /// Keep the built-in uncalibrated defaults.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub min: u16,
    pub max: u16,
}

impl AxisRange {
    pub fn width(&self) -> u16 {
        self.max - self.min
    }

    fn include(&mut self, v: u16) {
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickCalibration {
    pub x: AxisRange,
    pub y: AxisRange,
    pub center: StickPoint,
}

impl Default for StickCalibration {
    fn default() -> Self {
        let c = AxisRange { min: STICK_RAW_CENTER, max: STICK_RAW_CENTER };
        Self {
            x: c,
            y: c,
            center: StickPoint { x: STICK_RAW_CENTER, y: STICK_RAW_CENTER },
        }
    }
}

impl StickCalibration {
    /// Build from a center and the distances to the extremes, saturating at
    /// the edges of the 12-bit domain.
    pub fn from_deltas(center: StickPoint, below: StickPoint, above: StickPoint) -> Self {
        Self {
            x: AxisRange {
                min: center.x.saturating_sub(below.x),
                max: center.x.saturating_add(above.x),
            },
            y: AxisRange {
                min: center.y.saturating_sub(below.y),
                max: center.y.saturating_add(above.y),
            },
            center,
        }
    }

    /// Move the center to `point`. The range grows to contain it so the
    /// ordering `min <= center <= max` survives.
    pub fn set_center(&mut self, point: StickPoint) {
        self.center = point;
        observe_and_expand_range(point, self);
    }

    pub fn normalize(&self, raw: StickPoint) -> (i16, i16) {
        (
            normalize_stick(raw.x, self.x, self.center.x),
            normalize_stick(raw.y, self.y, self.center.y),
        )
    }
}

/// Per-axis scale factors turning raw IMU counts into g and deg/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorCalibration {
    pub accel_coeff: [f32; 3],
    pub gyro_coeff: [f32; 3],
}

impl SensorCalibration {
    pub fn from_origins(accel: [i16; 3], gyro: [i16; 3]) -> Self {
        Self {
            accel_coeff: accel.map(|o| (1.0 / (16384 - i32::from(o)) as f32) * 4.0),
            gyro_coeff: gyro.map(|o| 936.0 / (13371 - i32::from(o)) as f32),
        }
    }

    pub fn accel(&self, raw: [i16; 3]) -> [f32; 3] {
        [0, 1, 2].map(|i| f32::from(raw[i]) * self.accel_coeff[i])
    }

    pub fn gyro(&self, raw: [i16; 3]) -> [f32; 3] {
        [0, 1, 2].map(|i| f32::from(raw[i]) * self.gyro_coeff[i])
    }
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self::from_origins([0; 3], [0; 3])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationData {
    pub left: StickCalibration,
    pub right: StickCalibration,
    pub motion: SensorCalibration,
}

// (b[i+1] << 8) & 0xF00 | b[i]
fn low12(b: &[u8], i: usize) -> u16 {
    ((u16::from(b[i + 1]) << 8) & 0xF00) | u16::from(b[i])
}

// (b[i+2] << 4) | (b[i+1] >> 4)
fn high12(b: &[u8], i: usize) -> u16 {
    (u16::from(b[i + 2]) << 4) | (u16::from(b[i + 1]) >> 4)
}

fn packed_point(b: &[u8], i: usize) -> StickPoint {
    StickPoint { x: low12(b, i), y: high12(b, i) }
}

/// Decode the 18-byte factory stick block. Returns `(left, right)`.
///
/// The left stick stores max-delta, center, min-delta; the right stick stores
/// center, min-delta, max-delta.
pub fn parse_stick_calibration(block: &[u8; 18]) -> (StickCalibration, StickCalibration) {
    let left = StickCalibration::from_deltas(
        packed_point(block, 3),
        packed_point(block, 6),
        packed_point(block, 0),
    );
    let right = StickCalibration::from_deltas(
        packed_point(block, 9),
        packed_point(block, 12),
        packed_point(block, 15),
    );
    (left, right)
}

/// Decode the 24-byte factory IMU block: accel origins at 0x00, gyro origins
/// at 0x0C.
pub fn parse_motion_calibration(block: &[u8; 24]) -> SensorCalibration {
    let read = |at: usize| LittleEndian::read_i16(&block[at..]);
    SensorCalibration::from_origins(
        [read(0x00), read(0x02), read(0x04)],
        [read(0x0C), read(0x0E), read(0x10)],
    )
}

/// Map a raw sample to the signed output domain. A zero-width range means
/// "not calibrated yet" and yields a centered axis.
pub fn normalize_stick(raw: u16, range: AxisRange, center: u16) -> i16 {
    if range.max <= range.min {
        return 0;
    }
    let t = (f64::from(raw) - f64::from(center)) / f64::from(range.width()) * 2.0;
    (f64::from(i16::MAX) * t.clamp(-1.0, 1.0)) as i16
}

/// Grow the stored bounds to include `point`. Bounds never shrink.
pub fn observe_and_expand_range(point: StickPoint, cal: &mut StickCalibration) {
    cal.x.include(point.x.min(STICK_RAW_MAX));
    cal.y.include(point.y.min(STICK_RAW_MAX));
}
