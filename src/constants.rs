use std::time::Duration;

// Device identity
pub const NINTENDO_VID: u16 = 0x057E;
pub const PRO_CONTROLLER_PID: u16 = 0x2009;
pub const USB_SERIAL: &str = "000000000001";

// Exchange sizes
pub const EXCHANGE_LEN: usize = 0x400;
pub const REPORT_MIN_LEN: usize = 13;
pub const REPORT_IMU_LEN: usize = 49;

// Input report ids carrying full button/stick state
pub const REPORT_ID_FIRST: u8 = 0x30;
pub const REPORT_ID_LAST: u8 = 0x33;

// Raw 12-bit stick sample domain
pub const STICK_RAW_MAX: u16 = 0xFFF;
pub const STICK_RAW_CENTER: u16 = 0x800;

// Feedback (rumble / LED) coalescing window
pub const FEEDBACK_INTERVAL: Duration = Duration::from_millis(100);

// USB handshake frames, sent as-is
pub mod usb {
    pub const HANDSHAKE: [u8; 2] = [0x80, 0x02];
    pub const SWITCH_BAUDRATE: [u8; 2] = [0x80, 0x03];
    pub const HID_ONLY_MODE: [u8; 2] = [0x80, 0x04];
    pub const DISCONNECT: [u8; 2] = [0x80, 0x05];
}

// Output report commands and subcommands
pub mod cmd {
    pub const SUBCOMMAND: u8 = 0x01;
    pub const RUMBLE_ONLY: u8 = 0x10;

    pub const SET_REPORT_MODE: u8 = 0x03;
    pub const SPI_READ: u8 = 0x10;
    pub const SET_PLAYER_LED: u8 = 0x30;
    pub const ENABLE_IMU: u8 = 0x40;

    pub const FULL_REPORT_MODE: u8 = 0x30;
}

// Factory calibration blocks in SPI flash
pub mod spi {
    pub const STICK_CAL_OFFSET: u32 = 0x603D;
    pub const STICK_CAL_LEN: u8 = 0x12;
    pub const MOTION_CAL_OFFSET: u32 = 0x6020;
    pub const MOTION_CAL_LEN: u8 = 0x18;

    // Layout of a USB-wrapped SPI read reply
    pub const REPLY_MARKER_AT: usize = 0x17;
    pub const REPLY_MARKER: u16 = 0x1090;
    pub const REPLY_OFFSET_AT: usize = 0x19;
    pub const REPLY_DATA_AT: usize = 0x1E;
}

// DSU (cemuhook) UDP protocol
pub mod dsu {
    pub const DEFAULT_PORT: u16 = 26760;
    pub const CLIENT_MAGIC: [u8; 4] = *b"DSUC";
    pub const SERVER_MAGIC: [u8; 4] = *b"DSUS";
    pub const MAX_PROTOCOL_VERSION: u16 = 1001;
    pub const DEFAULT_SERVER_ID: u32 = 1337;

    pub const HEADER_LEN: usize = 20;
    // The length field counts everything after the first 16 bytes
    pub const LENGTH_EXCLUDED: usize = 16;
    pub const CRC_RANGE: std::ops::Range<usize> = 8..12;

    pub const MSG_VERSION: u32 = 0x10_0000;
    pub const MSG_PORTS: u32 = 0x10_0001;
    pub const MSG_DATA: u32 = 0x10_0002;

    pub const MAX_SLOTS: usize = 4;
    pub const RECV_BUFFER_LEN: usize = 512;
    pub const PAD_DATA_LEN: usize = 100;
}

// XInput-style report button bits
pub mod xinput_bits {
    pub const DPAD_UP: u16 = 0x0001;
    pub const DPAD_DOWN: u16 = 0x0002;
    pub const DPAD_LEFT: u16 = 0x0004;
    pub const DPAD_RIGHT: u16 = 0x0008;
    pub const START: u16 = 0x0010;
    pub const BACK: u16 = 0x0020;
    pub const LEFT_THUMB: u16 = 0x0040;
    pub const RIGHT_THUMB: u16 = 0x0080;
    pub const LEFT_SHOULDER: u16 = 0x0100;
    pub const RIGHT_SHOULDER: u16 = 0x0200;
    pub const GUIDE: u16 = 0x0400; // undocumented
    pub const A: u16 = 0x1000;
    pub const B: u16 = 0x2000;
    pub const X: u16 = 0x4000;
    pub const Y: u16 = 0x8000;
}

// DS4-style bitfields used by DSU pad data
pub mod ds4_bits {
    pub const SHARE: u8 = 0x01;
    pub const L3: u8 = 0x02;
    pub const R3: u8 = 0x04;
    pub const OPTIONS: u8 = 0x08;
    pub const DPAD_UP: u8 = 0x10;
    pub const DPAD_RIGHT: u8 = 0x20;
    pub const DPAD_DOWN: u8 = 0x40;
    pub const DPAD_LEFT: u8 = 0x80;

    pub const L2: u8 = 0x01;
    pub const R2: u8 = 0x02;
    pub const L1: u8 = 0x04;
    pub const R1: u8 = 0x08;
    pub const NORTH: u8 = 0x10;
    pub const EAST: u8 = 0x20;
    pub const SOUTH: u8 = 0x40;
    pub const WEST: u8 = 0x80;
}
