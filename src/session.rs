//! One physical controller, from handshake to teardown.
//!
//! ```text
//! Unopened ──open──► Handshaking ──► Configuring ──► Streaming ──close──► Closed
//!     └───────────────────┴────────────────┴──────────────┴──► Failed
//! ```
//!
//! A session never retries or reconnects on its own; once it fails the owner
//! closes and drops it.

use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::{
    calibration::{
        CalibrationData, CalibrationMode, observe_and_expand_range, parse_motion_calibration,
        parse_stick_calibration,
    },
    constants::{EXCHANGE_LEN, FEEDBACK_INTERVAL, PRO_CONTROLLER_PID, cmd, spi, usb},
    error::SessionError,
    pad_state::{InputState, now_micros},
    sink::{Feedback, GamepadSink},
    translator::{ButtonLayout, to_xinput},
    transport::HidTransport,
    wire::{
        CommandCounter, RawReport, encode_rumble, encode_subcommand, parse_spi_reply,
        spi_read_payload,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Handshaking,
    Configuring,
    Streaming,
    Closed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub calibration: CalibrationMode,
    pub layout: ButtonLayout,
    /// Player LED bit pattern set during configuration.
    pub player_led: u8,
    pub read_timeout_ms: i32,
    pub handshake_timeout_ms: i32,
    pub spi_read_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            calibration: CalibrationMode::Factory,
            layout: ButtonLayout::Current,
            player_led: 0x01,
            read_timeout_ms: 16,
            handshake_timeout_ms: 500,
            spi_read_attempts: 32,
        }
    }
}

#[derive(Debug, Default)]
struct PendingFeedback {
    led: Option<u8>,
    rumble: Option<(u8, u8)>,
}

pub struct DeviceSession<T: HidTransport> {
    transport: T,
    slot: u8,
    settings: SessionSettings,
    state: SessionState,
    calibration: CalibrationData,
    input: InputState,
    counter: CommandCounter,
    pending: PendingFeedback,
    last_feedback: Option<Instant>,
    host_feedback: Option<Feedback>,
    plugged: bool,
    talking: bool,
    disconnect_sent: bool,
    buf: Vec<u8>,
}

impl<T: HidTransport> DeviceSession<T> {
    pub fn new(transport: T, slot: u8, settings: SessionSettings) -> Self {
        Self {
            transport,
            slot,
            settings,
            state: SessionState::Unopened,
            calibration: CalibrationData::default(),
            input: InputState::default(),
            counter: CommandCounter::default(),
            pending: PendingFeedback::default(),
            last_feedback: None,
            host_feedback: None,
            plugged: false,
            talking: false,
            disconnect_sent: false,
            buf: vec![0u8; EXCHANGE_LEN],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn calibration(&self) -> &CalibrationData {
        &self.calibration
    }

    /// State decoded by the most recent successful poll.
    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Run the handshake, configure the controller and plug it into `sink`.
    pub fn open(&mut self, sink: &mut dyn GamepadSink) -> Result<(), SessionError> {
        if self.state != SessionState::Unopened {
            return Err(SessionError::Open(format!(
                "session is {:?}, expected Unopened",
                self.state
            )));
        }
        if let Err(e) = self.establish(sink) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    fn establish(&mut self, sink: &mut dyn GamepadSink) -> Result<(), SessionError> {
        let pid = self.transport.product_id();
        if pid != PRO_CONTROLLER_PID {
            return Err(SessionError::Open(format!(
                "product id {pid:#06x} is not a Pro Controller"
            )));
        }

        self.state = SessionState::Handshaking;
        info!(slot = self.slot, "starting handshake");
        self.handshake()?;

        self.state = SessionState::Configuring;
        self.configure()?;

        sink.register_slot(self.slot)
            .map_err(SessionError::PlugInFailed)?;
        self.plugged = true;
        self.state = SessionState::Streaming;
        info!(slot = self.slot, "controller streaming");
        Ok(())
    }

    fn handshake(&mut self) -> Result<(), SessionError> {
        let timeout = self.settings.handshake_timeout_ms;
        if self.exchange(&usb::HANDSHAKE, timeout)? == 0 {
            return Err(SessionError::HandshakeTimeout);
        }
        // Later steps are best-effort; some units stay quiet here.
        for frame in [usb::SWITCH_BAUDRATE, usb::HANDSHAKE, usb::HID_ONLY_MODE] {
            if self.exchange(&frame, timeout)? == 0 {
                debug!(frame = ?frame, "no reply to handshake step");
            }
        }
        Ok(())
    }

    fn configure(&mut self) -> Result<(), SessionError> {
        self.subcommand(cmd::SET_REPORT_MODE, &[cmd::FULL_REPORT_MODE, 0x00])?;
        self.subcommand(cmd::ENABLE_IMU, &[0x01])?;
        self.subcommand(cmd::SET_PLAYER_LED, &[self.settings.player_led])?;

        if self.settings.calibration == CalibrationMode::Factory {
            self.load_factory_calibration()?;
        }
        debug!(slot = self.slot, calibration = ?self.calibration, "configured");
        Ok(())
    }

    fn load_factory_calibration(&mut self) -> Result<(), SessionError> {
        let sticks: [u8; 18] = self
            .read_spi(spi::STICK_CAL_OFFSET, spi::STICK_CAL_LEN)?
            .try_into()
            .map_err(|_| SessionError::Protocol("stick calibration block size".into()))?;
        let motion: [u8; 24] = self
            .read_spi(spi::MOTION_CAL_OFFSET, spi::MOTION_CAL_LEN)?
            .try_into()
            .map_err(|_| SessionError::Protocol("motion calibration block size".into()))?;

        let (left, right) = parse_stick_calibration(&sticks);
        self.calibration.left = left;
        self.calibration.right = right;
        self.calibration.motion = parse_motion_calibration(&motion);
        Ok(())
    }

    /// Issue SPI reads until a reply echoes `offset`. Input reports and
    /// answers to earlier requests can arrive in between.
    fn read_spi(&mut self, offset: u32, len: u8) -> Result<Vec<u8>, SessionError> {
        let payload = spi_read_payload(offset, len);
        for attempt in 1..=self.settings.spi_read_attempts {
            let frame = encode_subcommand(self.counter.next(), cmd::SPI_READ, &payload);
            let n = self.exchange(&frame, self.settings.handshake_timeout_ms)?;
            if let Some(data) = parse_spi_reply(&self.buf[..n], offset, len) {
                return Ok(data.to_vec());
            }
            trace!(attempt, offset = format_args!("{offset:#06x}"), "reply did not match spi read");
        }
        Err(SessionError::Protocol(format!(
            "no reply for spi read at {offset:#06x} after {} attempts",
            self.settings.spi_read_attempts
        )))
    }

    fn subcommand(&mut self, subcommand: u8, payload: &[u8]) -> Result<usize, SessionError> {
        let frame = encode_subcommand(self.counter.next(), subcommand, payload);
        let n = self.exchange(&frame, self.settings.handshake_timeout_ms)?;
        debug!(subcommand = format_args!("{subcommand:#04x}"), reply_len = n, "subcommand");
        Ok(n)
    }

    fn exchange(&mut self, frame: &[u8], timeout_ms: i32) -> Result<usize, SessionError> {
        self.talking = true;
        self.transport.write(frame)?;
        Ok(self.transport.read_timeout(&mut self.buf, timeout_ms)?)
    }

    /// Read and publish one input report.
    ///
    /// `Ok(None)` means nothing new arrived (timeout, or a buffer that was not
    /// a full input report); the previous state stays in place.
    pub fn poll(&mut self, sink: &mut dyn GamepadSink) -> Result<Option<&InputState>, SessionError> {
        if self.state != SessionState::Streaming {
            return Err(SessionError::NotStreaming);
        }

        if let Some(fb) = sink.feedback(self.slot) {
            if self.host_feedback != Some(fb) {
                self.request_rumble(fb.large_motor, fb.small_motor);
                self.request_led(1 << (fb.led_number % 4));
                self.host_feedback = Some(fb);
            }
        }
        if let Err(e) = self.flush_feedback(Instant::now()) {
            return Err(self.fail(e));
        }

        let n = match self
            .transport
            .read_timeout(&mut self.buf, self.settings.read_timeout_ms)
        {
            Ok(n) => n,
            Err(e) => return Err(self.fail(e.into())),
        };
        if n == 0 {
            return Ok(None);
        }

        let report = match RawReport::decode(&self.buf[..n]) {
            Ok(report) => report,
            Err(e) => {
                trace!(slot = self.slot, error = %e, "skipping buffer");
                return Ok(None);
            }
        };

        if self.settings.calibration == CalibrationMode::Adaptive {
            observe_and_expand_range(report.left_stick(), &mut self.calibration.left);
            observe_and_expand_range(report.right_stick(), &mut self.calibration.right);
        }

        self.input = InputState::decode(&report, &self.calibration, now_micros());

        let out = to_xinput(&self.input, self.settings.layout);
        if let Err(e) = sink.push_report(self.slot, &out) {
            return Err(self.fail(SessionError::OutputPush(e)));
        }
        Ok(Some(&self.input))
    }

    /// Use the current stick positions as their centers.
    /// Returns false when no report has been decoded yet.
    pub fn recenter(&mut self) -> bool {
        if self.input.buttons.is_empty() {
            return false;
        }
        self.calibration.left.set_center(self.input.left_raw);
        self.calibration.right.set_center(self.input.right_raw);
        info!(slot = self.slot, left = ?self.input.left_raw, right = ?self.input.right_raw, "sticks recentered");
        true
    }

    /// Queue a player LED pattern. Replaces any unsent pattern.
    pub fn request_led(&mut self, pattern: u8) {
        self.pending.led = Some(pattern);
    }

    /// Queue a rumble update. Replaces any unsent update.
    pub fn request_rumble(&mut self, large: u8, small: u8) {
        self.pending.rumble = Some((large, small));
    }

    /// Send queued rumble/LED updates, at most once per [`FEEDBACK_INTERVAL`].
    pub fn flush_feedback(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.pending.led.is_none() && self.pending.rumble.is_none() {
            return Ok(());
        }
        if let Some(last) = self.last_feedback {
            if now.saturating_duration_since(last) < FEEDBACK_INTERVAL {
                return Ok(());
            }
        }

        if let Some((large, small)) = self.pending.rumble.take() {
            self.talking = true;
            self.transport
                .write(&encode_rumble(self.counter.next(), large, small))?;
        }
        if let Some(pattern) = self.pending.led.take() {
            self.talking = true;
            self.transport.write(&encode_subcommand(
                self.counter.next(),
                cmd::SET_PLAYER_LED,
                &[pattern],
            ))?;
        }
        self.last_feedback = Some(now);
        Ok(())
    }

    /// Unplug from `sink` and tell the controller to drop back to its default
    /// mode. A failed session stays `Failed`.
    pub fn close(&mut self, sink: &mut dyn GamepadSink) {
        if self.plugged {
            sink.unregister_slot(self.slot);
            self.plugged = false;
        }
        self.send_disconnect();
        if self.state != SessionState::Failed {
            self.state = SessionState::Closed;
            info!(slot = self.slot, "session closed");
        }
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!(slot = self.slot, state = ?self.state, error = %err, "session failed");
        self.state = SessionState::Failed;
        self.send_disconnect();
        err
    }

    fn send_disconnect(&mut self) {
        if self.talking && !self.disconnect_sent {
            self.disconnect_sent = true;
            if let Err(e) = self.transport.write(&usb::DISCONNECT) {
                debug!(slot = self.slot, error = %e, "disconnect not delivered");
            }
        }
    }
}

impl<T: HidTransport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        self.send_disconnect();
    }
}
