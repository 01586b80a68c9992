use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    calibration::CalibrationData,
    wire::{RawReport, StickPoint},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    DPadUp,
    DPadDown,
    DPadRight,
    DPadLeft,
    A,
    B,
    X,
    Y,
    Plus,
    Minus,
    L,
    ZL,
    R,
    ZR,
    LStick,
    RStick,
    Home,
    Share,
}

/// Button per bit, lowest bit first, for each of the three button bytes.
const RIGHT_BITS: [Option<Button>; 8] = [
    Some(Button::Y),
    Some(Button::X),
    Some(Button::B),
    Some(Button::A),
    None,
    None,
    Some(Button::R),
    Some(Button::ZR),
];

const MIDDLE_BITS: [Option<Button>; 8] = [
    Some(Button::Minus),
    Some(Button::Plus),
    Some(Button::RStick),
    Some(Button::LStick),
    Some(Button::Home),
    Some(Button::Share),
    None,
    None,
];

const LEFT_BITS: [Option<Button>; 8] = [
    Some(Button::DPadDown),
    Some(Button::DPadUp),
    Some(Button::DPadRight),
    Some(Button::DPadLeft),
    None,
    None,
    Some(Button::L),
    Some(Button::ZL),
];

fn pull_buttons(byte: u8, map: &[Option<Button>; 8], out: &mut Vec<(Button, bool)>) {
    for (bit, button) in map.iter().enumerate() {
        if let Some(b) = button {
            out.push((*b, byte & (1 << bit) != 0));
        }
    }
}

/// Decoded, calibrated snapshot of one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct InputState {
    pub left_raw: StickPoint,
    pub right_raw: StickPoint,
    pub left_x: i16,
    pub left_y: i16,
    pub right_x: i16,
    pub right_y: i16,
    pub buttons: Vec<(Button, bool)>,
    /// g
    pub accel: [f32; 3],
    /// deg/s
    pub gyro: [f32; 3],
    pub share_pressed: bool,
    /// Microseconds since the Unix epoch at the time of the poll.
    pub timestamp_us: u64,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            left_raw: StickPoint::default(),
            right_raw: StickPoint::default(),
            left_x: 0,
            left_y: 0,
            right_x: 0,
            right_y: 0,
            buttons: Vec::new(),
            accel: [0.0; 3],
            gyro: [0.0; 3],
            share_pressed: false,
            timestamp_us: 0,
        }
    }
}

impl InputState {
    /// Build a fresh state from one report. Nothing carries over from earlier
    /// polls, so a released button always reads as released.
    pub fn decode(report: &RawReport, cal: &CalibrationData, timestamp_us: u64) -> Self {
        let left_raw = report.left_stick();
        let right_raw = report.right_stick();
        let (left_x, left_y) = cal.left.normalize(left_raw);
        let (right_x, right_y) = cal.right.normalize(right_raw);

        let mut buttons = Vec::with_capacity(18);
        pull_buttons(report.left_buttons, &LEFT_BITS, &mut buttons);
        pull_buttons(report.right_buttons, &RIGHT_BITS, &mut buttons);
        pull_buttons(report.middle_buttons, &MIDDLE_BITS, &mut buttons);

        let (accel, gyro) = match &report.imu {
            Some(samples) => (
                cal.motion.accel(samples[0].accel),
                cal.motion.gyro(samples[0].gyro),
            ),
            None => ([0.0; 3], [0.0; 3]),
        };

        let share_pressed = buttons.contains(&(Button::Share, true));

        Self {
            left_raw,
            right_raw,
            left_x,
            left_y,
            right_x,
            right_y,
            buttons,
            accel,
            gyro,
            share_pressed,
            timestamp_us,
        }
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons.iter().any(|&(b, pressed)| b == button && pressed)
    }

    pub fn pressed(&self) -> impl Iterator<Item = Button> + '_ {
        self.buttons.iter().filter(|(_, p)| *p).map(|(b, _)| *b)
    }
}

pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ImuSample, pack_stick};

    fn report(right: u8, middle: u8, left: u8) -> RawReport {
        let mut sticks = [0u8; 6];
        sticks[..3].copy_from_slice(&pack_stick(StickPoint { x: 0x900, y: 0x700 }));
        sticks[3..].copy_from_slice(&pack_stick(StickPoint { x: 0x800, y: 0x800 }));
        RawReport {
            report_id: 0x30,
            timer: 0,
            info: 0,
            right_buttons: right,
            middle_buttons: middle,
            left_buttons: left,
            sticks,
            vibrator: 0,
            imu: Some([ImuSample { accel: [4096, 0, 0], gyro: [0, 0, 13371] }; 3]),
        }
    }

    #[test]
    fn every_mapped_button_is_listed_once() {
        let state = InputState::decode(&report(0, 0, 0), &CalibrationData::default(), 0);
        assert_eq!(state.buttons.len(), 18);
        assert_eq!(state.pressed().count(), 0);
    }

    #[test]
    fn decodes_button_bytes() {
        let state = InputState::decode(
            &report(0b1000_1000, 0b0010_0001, 0b0100_0010),
            &CalibrationData::default(),
            0,
        );
        let mut pressed: Vec<Button> = state.pressed().collect();
        pressed.sort_by_key(|b| *b as u8);
        assert_eq!(
            pressed,
            vec![Button::DPadUp, Button::A, Button::Minus, Button::L, Button::ZR, Button::Share]
        );
        assert!(state.share_pressed);
    }

    #[test]
    fn sticks_and_motion_use_calibration() {
        let mut cal = CalibrationData::default();
        cal.left.x.min = 0x400;
        cal.left.x.max = 0xC00;
        let state = InputState::decode(&report(0, 0, 0), &cal, 77);
        assert_eq!(state.left_raw, StickPoint { x: 0x900, y: 0x700 });
        assert_eq!(state.left_x, (32767.0 * 0.25) as i16);
        assert_eq!(state.left_y, 0); // y still uncalibrated
        assert!((state.accel[0] - 1.0).abs() < 1e-6);
        assert!((state.gyro[2] - 936.0).abs() < 1e-3);
        assert_eq!(state.timestamp_us, 77);
    }
}
