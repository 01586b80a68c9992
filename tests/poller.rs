mod common;

use std::{
    net::UdpSocket,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use byteorder::{ByteOrder, LittleEndian};
use common::{FakeTransport, Pad};
use procon_bridge::{
    calibration::CalibrationMode,
    constants::{ds4_bits, dsu::PAD_DATA_LEN, usb},
    dsu_wire::{ClientMessage, encode_client_message},
    network::UdpRelayServer,
    poller_worker::PollerWorker,
    session::{DeviceSession, SessionSettings},
    sink::{GamepadSink, SinkKind},
    wire::StickPoint,
};

fn open_sessions(
    transports: &[FakeTransport],
    sink: &mut dyn GamepadSink,
) -> Vec<DeviceSession<FakeTransport>> {
    transports
        .iter()
        .enumerate()
        .map(|(slot, t)| {
            let settings = SessionSettings {
                calibration: CalibrationMode::Default,
                ..Default::default()
            };
            let mut s = DeviceSession::new(t.clone(), slot as u8, settings);
            s.open(sink).unwrap();
            s
        })
        .collect()
}

#[test]
fn failed_sessions_are_dropped() {
    let transports = [FakeTransport::new(), FakeTransport::new()];
    let mut sink = SinkKind::Null.build();
    let sessions = open_sessions(&transports, sink.as_mut());
    let running = Arc::new(AtomicBool::new(true));
    let mut worker = PollerWorker::new(sessions, sink, None, running);

    transports[0].push_input(&Pad::default());
    worker.tick();
    assert_eq!(worker.session_count(), 2);

    transports[1].device().unplugged = true;
    worker.tick();
    assert_eq!(worker.session_count(), 1);
}

#[test]
fn run_stops_on_flag_and_disconnects() {
    let transports = [FakeTransport::new()];
    let mut sink = SinkKind::Null.build();
    let sessions = open_sessions(&transports, sink.as_mut());
    let running = Arc::new(AtomicBool::new(true));
    let mut worker = PollerWorker::new(sessions, sink, None, running.clone());

    running.store(false, Ordering::SeqCst);
    worker.run();
    assert_eq!(worker.session_count(), 0);
    assert_eq!(transports[0].writes().last().unwrap(), &usb::DISCONNECT.to_vec());
}

#[test]
fn run_ends_when_every_controller_is_gone() {
    let transports = [FakeTransport::new()];
    let mut sink = SinkKind::Null.build();
    let sessions = open_sessions(&transports, sink.as_mut());
    let mut worker = PollerWorker::new(sessions, sink, None, Arc::new(AtomicBool::new(true)));

    transports[0].device().unplugged = true;
    worker.run();
    assert_eq!(worker.session_count(), 0);
}

#[test]
fn slot_zero_is_relayed_to_subscribers() {
    let transports = [FakeTransport::new()];
    let mut sink = SinkKind::Null.build();
    let sessions = open_sessions(&transports, sink.as_mut());
    let relay = UdpRelayServer::bind("127.0.0.1:0", 1337).unwrap();
    let relay_addr = relay.local_addr().unwrap();
    let mut worker = PollerWorker::new(sessions, sink, Some(relay), Arc::new(AtomicBool::new(true)));

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let reg = ClientMessage::DataRegister { flags: 0, slot: 0, mac: [0; 6] };
    client.send_to(&encode_client_message(7, &reg), relay_addr).unwrap();

    for _ in 0..200 {
        worker.tick();
        if worker.relay().unwrap().responder().subscriber_count() == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(worker.relay().unwrap().responder().subscriber_count(), 1);

    // Plus and B
    transports[0].push_input(&Pad { right: 0x04, middle: 0x02, ..Default::default() });
    worker.tick();

    let mut buf = [0u8; 256];
    let (n, _) = client.recv_from(&mut buf).unwrap();
    assert_eq!(n, PAD_DATA_LEN);
    assert_eq!(buf[21], 0x02); // connected
    assert_eq!(LittleEndian::read_u32(&buf[32..]), 0);
    assert_eq!(buf[36], ds4_bits::OPTIONS);
    assert_eq!(buf[37], ds4_bits::SOUTH);
    assert_eq!(&buf[40..44], &[128, 128, 128, 128]);
}

#[test]
fn capture_home_chord_recenters_on_press() {
    let transports = [FakeTransport::new()];
    let mut sink = SinkKind::Null.build();
    let sessions = open_sessions(&transports, sink.as_mut());
    let mut worker = PollerWorker::new(sessions, sink, None, Arc::new(AtomicBool::new(true)));
    let chord = 0x10 | 0x20; // Home | Capture
    let first = StickPoint { x: 0x830, y: 0x7C0 };
    let second = StickPoint { x: 0x7A0, y: 0x850 };

    transports[0].push_input(&Pad { middle: chord, left_stick: first, ..Default::default() });
    worker.tick();
    assert_eq!(worker.sessions()[0].calibration().left.center, first);

    // still held: no second recenter
    transports[0].push_input(&Pad { middle: chord, left_stick: second, ..Default::default() });
    worker.tick();
    assert_eq!(worker.sessions()[0].calibration().left.center, first);

    transports[0].push_input(&Pad { left_stick: second, ..Default::default() });
    worker.tick();
    transports[0].push_input(&Pad { middle: chord, left_stick: second, ..Default::default() });
    worker.tick();
    assert_eq!(worker.sessions()[0].calibration().left.center, second);
}
