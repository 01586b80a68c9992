//! DSU telemetry relay.
//!
//! [`DsuResponder`] holds the protocol state and turns datagrams into replies
//! without touching a socket; [`UdpRelayServer`] pumps it over a
//! non-blocking UDP socket from the control loop.

use std::{
    collections::HashMap,
    io::ErrorKind,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
};

use anyhow::Context;
use tracing::{debug, info, trace};

use crate::{
    constants::dsu::RECV_BUFFER_LEN,
    dsu_wire::{
        ClientMessage, Ds4Report, PadMeta, decode_client_message, encode_pad_data,
        encode_port_info, encode_version_reply,
    },
};

/// Datagrams handled per [`UdpRelayServer::receive_and_dispatch`] call.
const MAX_DATAGRAMS_PER_TICK: usize = 16;

/// Only slot 0 is ever published.
const PUBLISHED_SLOT: u8 = 0;

pub struct DsuResponder {
    server_id: u32,
    /// Subscriber endpoint and the MAC it registered with. One entry per
    /// endpoint; re-registering only refreshes the MAC.
    subscribers: HashMap<SocketAddr, [u8; 6]>,
    packet_counter: u32,
    connected: bool,
}

impl DsuResponder {
    pub fn new(server_id: u32) -> Self {
        Self {
            server_id,
            subscribers: HashMap::new(),
            packet_counter: 0,
            connected: false,
        }
    }

    /// Whether a controller is streaming into the published slot.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn meta(&self, slot: u8) -> PadMeta {
        if self.connected && slot == PUBLISHED_SLOT {
            PadMeta::connected(slot)
        } else {
            PadMeta::disconnected(slot)
        }
    }

    /// Replies owed to `from` for one inbound datagram. Anything malformed,
    /// mis-addressed or unknown yields no reply.
    pub fn handle_datagram(&mut self, from: SocketAddr, datagram: &[u8]) -> Vec<Vec<u8>> {
        let (header, message) = match decode_client_message(datagram) {
            Ok(decoded) => decoded,
            Err(e) => {
                trace!(%from, error = %e, "dropping datagram");
                return Vec::new();
            }
        };

        match message {
            ClientMessage::VersionQuery => vec![encode_version_reply(self.server_id)],
            ClientMessage::PortsQuery { slots } => slots
                .iter()
                .map(|&slot| encode_port_info(self.server_id, &self.meta(slot)))
                .collect(),
            ClientMessage::DataRegister { mac, .. } => {
                if self.subscribers.insert(from, mac).is_none() {
                    info!(%from, client_id = header.id, "telemetry subscriber registered");
                }
                Vec::new()
            }
            ClientMessage::Unknown(code) => {
                trace!(%from, message_type = format_args!("{code:#x}"), "ignoring message type");
                Vec::new()
            }
        }
    }

    /// One pad-data packet per subscriber. Nothing is sent while the slot is
    /// disconnected.
    pub fn data_push(&mut self, report: &Ds4Report) -> Vec<(SocketAddr, Vec<u8>)> {
        if !self.connected || self.subscribers.is_empty() {
            return Vec::new();
        }
        let meta = self.meta(PUBLISHED_SLOT);
        let packet = encode_pad_data(self.server_id, &meta, self.packet_counter, report);
        self.packet_counter = self.packet_counter.wrapping_add(1);
        self.subscribers
            .keys()
            .map(|addr| (*addr, packet.clone()))
            .collect()
    }
}

pub struct UdpRelayServer {
    sock: UdpSocket,
    responder: DsuResponder,
    buf: [u8; RECV_BUFFER_LEN],
}

impl UdpRelayServer {
    pub fn bind(addr: impl ToSocketAddrs, server_id: u32) -> anyhow::Result<Self> {
        let sock = UdpSocket::bind(addr).context("binding DSU relay socket")?;
        sock.set_nonblocking(true)
            .context("switching DSU relay socket to non-blocking")?;
        info!(addr = %sock.local_addr()?, "DSU relay listening");
        Ok(Self {
            sock,
            responder: DsuResponder::new(server_id),
            buf: [0u8; RECV_BUFFER_LEN],
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    pub fn responder(&self) -> &DsuResponder {
        &self.responder
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.responder.set_connected(connected);
    }

    /// Answer pending requests without blocking. Returns the number of
    /// datagrams read.
    pub fn receive_and_dispatch(&mut self) -> usize {
        let mut handled = 0;
        while handled < MAX_DATAGRAMS_PER_TICK {
            let (n, from) = match self.sock.recv_from(&mut self.buf) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    // ICMP port-unreachable from a vanished client shows up here
                    trace!(error = %e, "recv failed");
                    handled += 1;
                    continue;
                }
            };
            handled += 1;
            for reply in self.responder.handle_datagram(from, &self.buf[..n]) {
                if let Err(e) = self.sock.send_to(&reply, from) {
                    debug!(%from, error = %e, "failed to send reply");
                }
            }
        }
        handled
    }

    pub fn push_state(&mut self, report: &Ds4Report) {
        for (addr, packet) in self.responder.data_push(report) {
            if let Err(e) = self.sock.send_to(&packet, addr) {
                debug!(%addr, error = %e, "failed to send pad data");
            }
        }
    }
}
