#![allow(dead_code)]

use std::{cell::RefCell, collections::{HashMap, VecDeque}, rc::Rc};

use byteorder::{ByteOrder, LittleEndian};
use procon_bridge::{
    constants::{PRO_CONTROLLER_PID, cmd, spi},
    error::{SinkError, TransportError},
    sink::{Feedback, GamepadSink},
    transport::HidTransport,
    translator::XInputReport,
    wire::{ImuSample, RawReport, StickPoint, pack_stick},
};

/// Scripted USB controller: answers handshake frames and SPI reads the way
/// real hardware does, and replays queued input reports on read.
#[derive(Debug)]
pub struct Device {
    pub product_id: u16,
    pub writes: Vec<Vec<u8>>,
    pub queue: VecDeque<Vec<u8>>,
    pub flash: HashMap<u32, Vec<u8>>,
    /// Input reports interleaved before each SPI answer.
    pub stale_spi_replies: usize,
    pub mute: bool,
    /// Frames answered before the device goes quiet. `None` answers all.
    pub reply_budget: Option<usize>,
    pub unplugged: bool,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            product_id: PRO_CONTROLLER_PID,
            writes: Vec::new(),
            queue: VecDeque::new(),
            flash: HashMap::new(),
            stale_spi_replies: 0,
            mute: false,
            reply_budget: None,
            unplugged: false,
        }
    }
}

impl Device {
    fn respond(&mut self, frame: &[u8]) {
        if self.mute {
            return;
        }
        match &mut self.reply_budget {
            Some(0) => return,
            Some(left) => *left -= 1,
            None => {}
        }
        match frame {
            [0x80, 0x05] => {}
            [0x80, step] => {
                let mut reply = vec![0u8; 64];
                reply[0] = 0x81;
                reply[1] = *step;
                self.queue.push_back(reply);
            }
            [0x80, 0x92, _, _, _, _, _, _, cmd::SUBCOMMAND, rest @ ..] if rest.len() >= 10 => {
                let subcommand = rest[9];
                if subcommand == cmd::SPI_READ && rest.len() >= 15 {
                    let offset = LittleEndian::read_u32(&rest[10..]);
                    let len = usize::from(rest[14]);
                    for _ in 0..self.stale_spi_replies {
                        self.queue.push_back(input_report(&Pad::default()));
                    }
                    let mut reply = vec![0u8; 64];
                    reply[0] = 0x81;
                    LittleEndian::write_u16(&mut reply[spi::REPLY_MARKER_AT..], spi::REPLY_MARKER);
                    LittleEndian::write_u32(&mut reply[spi::REPLY_OFFSET_AT..], offset);
                    let data = self.flash.get(&offset).cloned().unwrap_or_else(|| vec![0xFF; len]);
                    reply[spi::REPLY_DATA_AT..spi::REPLY_DATA_AT + len].copy_from_slice(&data[..len]);
                    self.queue.push_back(reply);
                } else {
                    let mut ack = vec![0u8; 64];
                    ack[0] = 0x81;
                    ack[10] = 0x21;
                    self.queue.push_back(ack);
                }
            }
            _ => {}
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeTransport(pub Rc<RefCell<Device>>);

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self) -> std::cell::RefMut<'_, Device> {
        self.0.borrow_mut()
    }

    pub fn push_input(&self, pad: &Pad) {
        self.device().queue.push_back(input_report(pad));
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.0.borrow().writes.clone()
    }
}

impl HidTransport for FakeTransport {
    fn product_id(&self) -> u16 {
        self.0.borrow().product_id
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut dev = self.0.borrow_mut();
        if dev.unplugged {
            return Err(TransportError::Disconnected);
        }
        dev.writes.push(data.to_vec());
        dev.respond(data);
        Ok(data.len())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize, TransportError> {
        let mut dev = self.0.borrow_mut();
        if dev.unplugged {
            return Err(TransportError::Disconnected);
        }
        match dev.queue.pop_front() {
            Some(reply) => {
                let n = reply.len().min(buf.len());
                buf[..n].copy_from_slice(&reply[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }
}

/// Physical pad state used to synthesise input reports.
#[derive(Debug, Clone, Copy)]
pub struct Pad {
    pub right: u8,
    pub middle: u8,
    pub left: u8,
    pub left_stick: StickPoint,
    pub right_stick: StickPoint,
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

impl Default for Pad {
    fn default() -> Self {
        let center = StickPoint { x: 0x800, y: 0x800 };
        Self {
            right: 0,
            middle: 0,
            left: 0,
            left_stick: center,
            right_stick: center,
            accel: [0; 3],
            gyro: [0; 3],
        }
    }
}

pub fn input_report(pad: &Pad) -> Vec<u8> {
    let mut sticks = [0u8; 6];
    sticks[..3].copy_from_slice(&pack_stick(pad.left_stick));
    sticks[3..].copy_from_slice(&pack_stick(pad.right_stick));
    RawReport {
        report_id: 0x30,
        timer: 0,
        info: 0x8E,
        right_buttons: pad.right,
        middle_buttons: pad.middle,
        left_buttons: pad.left,
        sticks,
        vibrator: 0,
        imu: Some([ImuSample { accel: pad.accel, gyro: pad.gyro }; 3]),
    }
    .encode()
}

/// Factory stick block with both sticks centered at 0x800 and a ±0x600 range.
pub fn stick_calibration_block() -> Vec<u8> {
    let d = pack_stick(StickPoint { x: 0x600, y: 0x600 });
    let c = pack_stick(StickPoint { x: 0x800, y: 0x800 });
    // left: max-delta, center, min-delta; right: center, min-delta, max-delta
    [d, c, d, c, d, d].concat()
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub registered: Vec<u8>,
    pub unregistered: Vec<u8>,
    pub reports: Vec<(u8, XInputReport)>,
    pub feedback: Option<Feedback>,
    pub refuse_register: bool,
    pub refuse_push: bool,
}

impl GamepadSink for RecordingSink {
    fn register_slot(&mut self, slot: u8) -> Result<(), SinkError> {
        if self.refuse_register {
            return Err(SinkError::NoFreeSlot);
        }
        self.registered.push(slot);
        Ok(())
    }

    fn push_report(&mut self, slot: u8, report: &XInputReport) -> Result<(), SinkError> {
        if self.refuse_push {
            return Err(SinkError::Rejected(0xE000_0001));
        }
        self.reports.push((slot, *report));
        Ok(())
    }

    fn unregister_slot(&mut self, slot: u8) {
        self.unregistered.push(slot);
    }

    fn feedback(&mut self, _slot: u8) -> Option<Feedback> {
        self.feedback
    }
}
