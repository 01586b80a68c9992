//! Error types shared across the bridge.
//!
//! Device-side failures ([`SessionError`]) are fatal to the session that raised
//! them and to nothing else. Wire-level failures on inbound UDP traffic
//! ([`WireError`]) are always recovered locally by dropping the datagram.

use thiserror::Error;

/// Decode failures for device reports and DSU datagrams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("bad magic tag {0:02X?}")]
    BadMagic([u8; 4]),

    #[error("checksum mismatch: embedded {embedded:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { embedded: u32, computed: u32 },
}

/// Failures of the physical HID transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("hid i/o failed: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("device disconnected")]
    Disconnected,
}

/// Failures reported by a virtual-gamepad sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("no free virtual gamepad slot")]
    NoFreeSlot,

    #[error("slot {0} is not registered")]
    UnknownSlot(u8),

    #[error("sink rejected the request with code {0}")]
    Rejected(u32),
}

/// Session-fatal errors raised by a [`DeviceSession`](crate::session::DeviceSession).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unable to open controller: {0}")]
    Open(String),

    #[error("handshake timed out: controller sent no reply")]
    HandshakeTimeout,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("virtual gamepad plug-in failed: {0}")]
    PlugInFailed(SinkError),

    #[error("virtual gamepad push failed: {0}")]
    OutputPush(SinkError),

    #[error("session is not streaming")]
    NotStreaming,
}
