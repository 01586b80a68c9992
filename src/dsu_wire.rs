//! DSU (cemuhook) datagram codec.
//!
//! Every packet starts with a 20-byte header:
//!
//! ```text
//! 0  magic      "DSUC" from clients, "DSUS" from the server
//! 4  version    u16
//! 6  length     u16, bytes following offset 16 (message type + payload)
//! 8  crc32      u32, CRC-32 of the packet with this field zeroed
//! 12 id         u32, client or server id
//! 16 type       u32, message type
//! ```
//!
//! All multi-byte fields are little-endian.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use std::io::{Cursor, Write};

use crate::{
    constants::dsu::{
        CLIENT_MAGIC, CRC_RANGE, HEADER_LEN, LENGTH_EXCLUDED, MAX_PROTOCOL_VERSION, MAX_SLOTS,
        MSG_DATA, MSG_PORTS, MSG_VERSION, PAD_DATA_LEN, SERVER_MAGIC,
    },
    error::WireError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub length: u16,
    pub crc32: u32,
    pub id: u32,
    pub message_type: u32,
}

impl WireHeader {
    /// Size of the whole packet as declared by the length field.
    pub fn packet_len(&self) -> usize {
        LENGTH_EXCLUDED + usize::from(self.length)
    }
}

/// Parse and sanity-check a header. The magic must equal `expected`, and the
/// declared length must fit in `buf`.
pub fn decode_header(buf: &[u8], expected: [u8; 4]) -> Result<WireHeader, WireError> {
    if buf.len() < HEADER_LEN {
        return Err(WireError::MalformedPacket("datagram shorter than header"));
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&buf[..4]);
    if magic != expected {
        return Err(WireError::BadMagic(magic));
    }

    let header = WireHeader {
        magic,
        version: LittleEndian::read_u16(&buf[4..]),
        length: LittleEndian::read_u16(&buf[6..]),
        crc32: LittleEndian::read_u32(&buf[8..]),
        id: LittleEndian::read_u32(&buf[12..]),
        message_type: LittleEndian::read_u32(&buf[16..]),
    };
    if header.packet_len() < HEADER_LEN || header.packet_len() > buf.len() {
        return Err(WireError::MalformedPacket("length field disagrees with datagram"));
    }
    Ok(header)
}

/// CRC-32 of `packet` with the checksum field read as zero.
pub fn checksum(packet: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&packet[..CRC_RANGE.start]);
    hasher.update(&[0u8; 4]);
    hasher.update(&packet[CRC_RANGE.end..]);
    hasher.finalize()
}

/// Check the embedded checksum of a complete packet.
pub fn verify(packet: &[u8]) -> Result<(), WireError> {
    if packet.len() < HEADER_LEN {
        return Err(WireError::MalformedPacket("datagram shorter than header"));
    }
    let embedded = LittleEndian::read_u32(&packet[CRC_RANGE]);
    let computed = checksum(packet);
    if embedded != computed {
        return Err(WireError::ChecksumMismatch { embedded, computed });
    }
    Ok(())
}

/// Zero-filled packet of `payload_len` bytes after the header, with everything
/// but the checksum filled in.
pub fn begin_packet(magic: [u8; 4], id: u32, message_type: u32, payload_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_LEN + payload_len];
    buf[..4].copy_from_slice(&magic);
    LittleEndian::write_u16(&mut buf[4..], MAX_PROTOCOL_VERSION);
    LittleEndian::write_u32(&mut buf[12..], id);
    LittleEndian::write_u32(&mut buf[16..], message_type);
    buf
}

/// Write the length field, then the checksum over the finished bytes.
pub fn finish_packet(buf: &mut [u8]) {
    let length = (buf.len() - LENGTH_EXCLUDED) as u16;
    LittleEndian::write_u16(&mut buf[6..], length);
    LittleEndian::write_u32(&mut buf[CRC_RANGE], 0);
    let crc = checksum(buf);
    LittleEndian::write_u32(&mut buf[CRC_RANGE], crc);
}

/// Requests a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    VersionQuery,
    PortsQuery { slots: Vec<u8> },
    DataRegister { flags: u8, slot: u8, mac: [u8; 6] },
    Unknown(u32),
}

/// Validate (magic, length, checksum) and decode a client datagram.
pub fn decode_client_message(datagram: &[u8]) -> Result<(WireHeader, ClientMessage), WireError> {
    let header = decode_header(datagram, CLIENT_MAGIC)?;
    let packet = &datagram[..header.packet_len()];
    verify(packet)?;

    let body = &packet[HEADER_LEN..];
    let message = match header.message_type {
        MSG_VERSION => ClientMessage::VersionQuery,
        MSG_PORTS => {
            if body.len() < 4 {
                return Err(WireError::MalformedPacket("port query without count"));
            }
            let count = LittleEndian::read_i32(body);
            let count = usize::try_from(count)
                .map_err(|_| WireError::MalformedPacket("negative port count"))?;
            let listed = &body[4..];
            if listed.len() < count {
                return Err(WireError::MalformedPacket("port query truncated"));
            }
            ClientMessage::PortsQuery {
                slots: listed[..count.min(MAX_SLOTS)].to_vec(),
            }
        }
        MSG_DATA => {
            if body.len() < 8 {
                return Err(WireError::MalformedPacket("data registration truncated"));
            }
            let mut mac = [0u8; 6];
            mac.copy_from_slice(&body[2..8]);
            ClientMessage::DataRegister {
                flags: body[0],
                slot: body[1],
                mac,
            }
        }
        other => ClientMessage::Unknown(other),
    };
    Ok((header, message))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    Disconnected = 0x00,
    Reserved = 0x01,
    Connected = 0x02,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceModel {
    None = 0x00,
    Ds3 = 0x01,
    Ds4 = 0x02,
    Generic = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionType {
    None = 0x00,
    Usb = 0x01,
    Bluetooth = 0x02,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Battery {
    None = 0x00,
    Dying = 0x01,
    Low = 0x02,
    Medium = 0x03,
    High = 0x04,
    Full = 0x05,
    Charging = 0xEE,
    Charged = 0xEF,
}

/// Per-slot controller description shared by port-info and pad-data replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadMeta {
    pub slot: u8,
    pub state: SlotState,
    pub model: DeviceModel,
    pub connection: ConnectionType,
    pub mac: [u8; 6],
    pub battery: Battery,
}

impl PadMeta {
    pub fn connected(slot: u8) -> Self {
        Self {
            slot,
            state: SlotState::Connected,
            model: DeviceModel::Ds4,
            connection: ConnectionType::Usb,
            mac: [0x00, 0x00, 0x00, 0x00, 0x01, 0x00],
            battery: Battery::High,
        }
    }

    pub fn disconnected(slot: u8) -> Self {
        Self {
            slot,
            state: SlotState::Disconnected,
            model: DeviceModel::None,
            connection: ConnectionType::None,
            mac: [0; 6],
            battery: Battery::None,
        }
    }

    fn write_to<W: Write>(&self, w: &mut W, active: bool) {
        let _ = w.write_u8(self.slot);
        let _ = w.write_u8(self.state as u8);
        let _ = w.write_u8(self.model as u8);
        let _ = w.write_u8(self.connection as u8);
        let _ = w.write_all(&self.mac);
        let _ = w.write_u8(self.battery as u8);
        let _ = w.write_u8(u8::from(active));
    }
}

/// DS4-shaped pad state carried by pad-data packets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ds4Report {
    pub buttons1: u8,
    pub buttons2: u8,
    pub home: u8,
    pub touch: u8,
    pub left_x: u8,
    pub left_y: u8,
    pub right_x: u8,
    pub right_y: u8,
    pub dpad_left: u8,
    pub dpad_down: u8,
    pub dpad_right: u8,
    pub dpad_up: u8,
    pub west: u8,
    pub south: u8,
    pub east: u8,
    pub north: u8,
    pub r1: u8,
    pub l1: u8,
    pub r2: u8,
    pub l2: u8,
    pub timestamp_us: u64,
    /// Accelerometer in g, already remapped to the DS4 axis convention.
    pub accel: [f32; 3],
    /// Gyroscope in deg/s as pitch, yaw, roll.
    pub gyro: [f32; 3],
}

pub fn encode_version_reply(server_id: u32) -> Vec<u8> {
    let mut buf = begin_packet(SERVER_MAGIC, server_id, MSG_VERSION, 4);
    LittleEndian::write_u16(&mut buf[HEADER_LEN..], MAX_PROTOCOL_VERSION);
    finish_packet(&mut buf);
    buf
}

pub fn encode_port_info(server_id: u32, meta: &PadMeta) -> Vec<u8> {
    let mut buf = begin_packet(SERVER_MAGIC, server_id, MSG_PORTS, 12);
    meta.write_to(&mut Cursor::new(&mut buf[HEADER_LEN..]), false);
    finish_packet(&mut buf);
    buf
}

pub fn encode_pad_data(server_id: u32, meta: &PadMeta, counter: u32, r: &Ds4Report) -> Vec<u8> {
    let mut buf = begin_packet(SERVER_MAGIC, server_id, MSG_DATA, PAD_DATA_LEN - HEADER_LEN);
    {
        let mut c = Cursor::new(&mut buf[HEADER_LEN..]);
        meta.write_to(&mut c, true);
        let _ = c.write_u32::<LittleEndian>(counter);
        let _ = c.write_all(&[r.buttons1, r.buttons2, r.home, r.touch]);
        let _ = c.write_all(&[r.left_x, r.left_y, r.right_x, r.right_y]);
        let _ = c.write_all(&[
            r.dpad_left,
            r.dpad_down,
            r.dpad_right,
            r.dpad_up,
            r.west,
            r.south,
            r.east,
            r.north,
            r.r1,
            r.l1,
            r.r2,
            r.l2,
        ]);
        // two inactive touch points, ids 0 and 1
        let _ = c.write_all(&[0, 0, 0, 0, 0, 0]);
        let _ = c.write_all(&[0, 1, 0, 0, 0, 0]);
        let _ = c.write_u64::<LittleEndian>(r.timestamp_us);
        for v in r.accel.iter().chain(r.gyro.iter()) {
            let _ = c.write_f32::<LittleEndian>(*v);
        }
    }
    finish_packet(&mut buf);
    buf
}

/// Build a client request. Used by tests and diagnostic tooling.
pub fn encode_client_message(client_id: u32, message: &ClientMessage) -> Vec<u8> {
    let (message_type, payload) = match message {
        ClientMessage::VersionQuery => (MSG_VERSION, Vec::new()),
        ClientMessage::PortsQuery { slots } => {
            let mut p = Vec::with_capacity(4 + slots.len());
            let _ = p.write_i32::<LittleEndian>(slots.len() as i32);
            p.extend_from_slice(slots);
            (MSG_PORTS, p)
        }
        ClientMessage::DataRegister { flags, slot, mac } => {
            let mut p = vec![*flags, *slot];
            p.extend_from_slice(mac);
            (MSG_DATA, p)
        }
        ClientMessage::Unknown(code) => (*code, Vec::new()),
    };
    let mut buf = begin_packet(CLIENT_MAGIC, client_id, message_type, payload.len());
    buf[HEADER_LEN..].copy_from_slice(&payload);
    finish_packet(&mut buf);
    buf
}
