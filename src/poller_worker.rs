use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{error, info};

use crate::{
    network::UdpRelayServer,
    pad_state::{Button, InputState},
    session::{DeviceSession, SessionState},
    sink::GamepadSink,
    translator::to_ds4,
    transport::HidTransport,
};

/// Held together, recenter both sticks on that controller.
pub const RECENTER_CHORD: [Button; 2] = [Button::Share, Button::Home];

fn chord_held(input: &InputState) -> bool {
    RECENTER_CHORD.iter().all(|b| input.is_pressed(*b))
}

/// Drives every open session from one thread: poll, publish, answer relay
/// clients, repeat until stopped.
pub struct PollerWorker<T: HidTransport> {
    sessions: Vec<DeviceSession<T>>,
    sink: Box<dyn GamepadSink>,
    relay: Option<UdpRelayServer>,
    running: Arc<AtomicBool>,
    /// Slots whose recenter chord is currently held.
    chord_down: HashSet<u8>,
}

impl<T: HidTransport> PollerWorker<T> {
    pub fn new(
        sessions: Vec<DeviceSession<T>>,
        sink: Box<dyn GamepadSink>,
        relay: Option<UdpRelayServer>,
        running: Arc<AtomicBool>,
    ) -> Self {
        PollerWorker {
            sessions,
            sink,
            relay,
            running,
            chord_down: HashSet::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions(&self) -> &[DeviceSession<T>] {
        &self.sessions
    }

    pub fn relay(&self) -> Option<&UdpRelayServer> {
        self.relay.as_ref()
    }

    /// One pass over all sessions followed by one relay pump.
    pub fn tick(&mut self) {
        self.sync_relay();
        for session in &mut self.sessions {
            let slot = session.slot();
            let held = match session.poll(self.sink.as_mut()) {
                Ok(Some(input)) => {
                    if slot == 0 {
                        if let Some(relay) = &mut self.relay {
                            relay.push_state(&to_ds4(input));
                        }
                    }
                    chord_held(input)
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(slot, error = %e, "controller dropped");
                    continue;
                }
            };
            // act on the press edge only
            if !held {
                self.chord_down.remove(&slot);
            } else if self.chord_down.insert(slot) {
                session.recenter();
            }
        }

        let sink = self.sink.as_mut();
        let chord_down = &mut self.chord_down;
        self.sessions.retain_mut(|s| {
            if s.state() == SessionState::Failed {
                s.close(sink);
                chord_down.remove(&s.slot());
                false
            } else {
                true
            }
        });

        self.sync_relay();
        if let Some(relay) = &mut self.relay {
            relay.receive_and_dispatch();
        }
    }

    fn sync_relay(&mut self) {
        if let Some(relay) = &mut self.relay {
            let streaming = self
                .sessions
                .iter()
                .any(|s| s.slot() == 0 && s.state() == SessionState::Streaming);
            relay.set_connected(streaming);
        }
    }

    /// Loop until the stop flag clears or every controller is gone, then
    /// close what is left.
    pub fn run(&mut self) {
        info!(controllers = self.sessions.len(), "poller running");
        while self.running.load(Ordering::SeqCst) && !self.sessions.is_empty() {
            self.tick();
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        for session in &mut self.sessions {
            session.close(self.sink.as_mut());
        }
        self.sessions.clear();
        if let Some(relay) = &mut self.relay {
            relay.set_connected(false);
        }
        info!("poller stopped");
    }
}
