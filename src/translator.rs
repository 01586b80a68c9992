//! Maps a decoded [`InputState`] onto the report shapes consumers expect.

use serde::{Deserialize, Serialize};

use crate::{
    constants::{ds4_bits, xinput_bits},
    dsu_wire::Ds4Report,
    pad_state::{Button, InputState},
};

/// Which A/B/X/Y bit ordering the XInput report uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonLayout {
    /// Positional: Nintendo A lands on the Xbox B bit, X on Y.
    #[default]
    Current,
    /// Label-matching: Nintendo A lands on the Xbox A bit.
    LegacySwapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    XInput(ButtonLayout),
    Ds4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XInputReport {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputReport {
    XInput(XInputReport),
    Ds4(Ds4Report),
}

pub fn translate(state: &InputState, shape: OutputShape) -> OutputReport {
    match shape {
        OutputShape::XInput(layout) => OutputReport::XInput(to_xinput(state, layout)),
        OutputShape::Ds4 => OutputReport::Ds4(to_ds4(state)),
    }
}

/// Report bit for `b`, or 0 for buttons that only drive triggers or nothing.
pub const fn xinput_bit(b: Button, layout: ButtonLayout) -> u16 {
    use xinput_bits::*;
    match (b, layout) {
        (Button::DPadUp, _) => DPAD_UP,
        (Button::DPadDown, _) => DPAD_DOWN,
        (Button::DPadLeft, _) => DPAD_LEFT,
        (Button::DPadRight, _) => DPAD_RIGHT,
        (Button::Plus, _) => START,
        (Button::Minus, _) => BACK,
        (Button::LStick, _) => LEFT_THUMB,
        (Button::RStick, _) => RIGHT_THUMB,
        (Button::L, _) => LEFT_SHOULDER,
        (Button::R, _) => RIGHT_SHOULDER,
        (Button::Home, _) => GUIDE,

        (Button::A, ButtonLayout::Current) => B,
        (Button::B, ButtonLayout::Current) => A,
        (Button::X, ButtonLayout::Current) => Y,
        (Button::Y, ButtonLayout::Current) => X,

        (Button::A, ButtonLayout::LegacySwapped) => A,
        (Button::B, ButtonLayout::LegacySwapped) => B,
        (Button::X, ButtonLayout::LegacySwapped) => X,
        (Button::Y, ButtonLayout::LegacySwapped) => Y,

        (Button::ZL | Button::ZR | Button::Share, _) => 0,
    }
}

pub fn to_xinput(state: &InputState, layout: ButtonLayout) -> XInputReport {
    let mut report = XInputReport {
        thumb_lx: state.left_x,
        thumb_ly: state.left_y,
        thumb_rx: state.right_x,
        thumb_ry: state.right_y,
        ..Default::default()
    };
    for b in state.pressed() {
        match b {
            Button::ZL => report.left_trigger = u8::MAX,
            Button::ZR => report.right_trigger = u8::MAX,
            other => report.buttons |= xinput_bit(other, layout),
        }
    }
    report
}

fn analog(pressed: bool) -> u8 {
    if pressed { u8::MAX } else { 0 }
}

/// Signed axis to the DSU byte range, 128 at rest.
fn stick_byte(v: i16) -> u8 {
    ((i32::from(v) >> 8) + 128) as u8
}

pub fn to_ds4(state: &InputState) -> Ds4Report {
    let p = |b| state.is_pressed(b);
    let bit = |b, mask: u8| if p(b) { mask } else { 0 };

    let buttons1 = bit(Button::Minus, ds4_bits::SHARE)
        | bit(Button::LStick, ds4_bits::L3)
        | bit(Button::RStick, ds4_bits::R3)
        | bit(Button::Plus, ds4_bits::OPTIONS)
        | bit(Button::DPadUp, ds4_bits::DPAD_UP)
        | bit(Button::DPadRight, ds4_bits::DPAD_RIGHT)
        | bit(Button::DPadDown, ds4_bits::DPAD_DOWN)
        | bit(Button::DPadLeft, ds4_bits::DPAD_LEFT);
    let buttons2 = bit(Button::ZL, ds4_bits::L2)
        | bit(Button::ZR, ds4_bits::R2)
        | bit(Button::L, ds4_bits::L1)
        | bit(Button::R, ds4_bits::R1)
        | bit(Button::X, ds4_bits::NORTH)
        | bit(Button::A, ds4_bits::EAST)
        | bit(Button::B, ds4_bits::SOUTH)
        | bit(Button::Y, ds4_bits::WEST);

    let [ax, ay, az] = state.accel;
    let [gx, gy, gz] = state.gyro;

    Ds4Report {
        buttons1,
        buttons2,
        home: u8::from(p(Button::Home)),
        touch: u8::from(state.share_pressed),
        left_x: stick_byte(state.left_x),
        left_y: stick_byte(state.left_y),
        right_x: stick_byte(state.right_x),
        right_y: stick_byte(state.right_y),
        dpad_left: analog(p(Button::DPadLeft)),
        dpad_down: analog(p(Button::DPadDown)),
        dpad_right: analog(p(Button::DPadRight)),
        dpad_up: analog(p(Button::DPadUp)),
        west: analog(p(Button::Y)),
        south: analog(p(Button::B)),
        east: analog(p(Button::A)),
        north: analog(p(Button::X)),
        r1: analog(p(Button::R)),
        l1: analog(p(Button::L)),
        r2: analog(p(Button::ZR)),
        l2: analog(p(Button::ZL)),
        timestamp_us: state.timestamp_us,
        accel: [ay, -az, ax],
        gyro: [-gy, -gz, gx],
    }
}
