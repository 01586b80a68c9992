//! Virtual-gamepad sinks.
//!
//! A sink is whatever presents the translated report to the host (a virtual
//! bus driver, a logger, nothing at all). The backend is chosen once at
//! startup; sessions only see `dyn GamepadSink`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{constants::dsu::MAX_SLOTS, error::SinkError, translator::XInputReport};

/// Host-side feedback for a slot (rumble motors and player LED index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Feedback {
    pub large_motor: u8,
    pub small_motor: u8,
    pub led_number: u8,
}

pub trait GamepadSink {
    fn register_slot(&mut self, slot: u8) -> Result<(), SinkError>;

    fn push_report(&mut self, slot: u8, report: &XInputReport) -> Result<(), SinkError>;

    fn unregister_slot(&mut self, slot: u8);

    /// Latest feedback the host sent for `slot`, if any.
    fn feedback(&mut self, _slot: u8) -> Option<Feedback> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Log,
    Null,
}

impl SinkKind {
    pub fn build(self) -> Box<dyn GamepadSink> {
        match self {
            SinkKind::Log => Box::new(LogSink::default()),
            SinkKind::Null => Box::new(NullSink::default()),
        }
    }
}

/// Fixed table of plugged-in slots, as on an XInput bus.
#[derive(Debug, Default)]
pub struct SlotTable {
    used: [bool; MAX_SLOTS],
}

impl SlotTable {
    pub fn plug(&mut self, slot: u8) -> Result<(), SinkError> {
        match self.used.get_mut(usize::from(slot)) {
            Some(used) if !*used => {
                *used = true;
                Ok(())
            }
            _ => Err(SinkError::NoFreeSlot),
        }
    }

    pub fn unplug(&mut self, slot: u8) {
        if let Some(used) = self.used.get_mut(usize::from(slot)) {
            *used = false;
        }
    }

    pub fn check(&self, slot: u8) -> Result<(), SinkError> {
        match self.used.get(usize::from(slot)) {
            Some(true) => Ok(()),
            _ => Err(SinkError::UnknownSlot(slot)),
        }
    }
}

/// Traces every report. Useful on hosts without a virtual bus driver.
#[derive(Debug, Default)]
pub struct LogSink {
    slots: SlotTable,
    last: [Option<XInputReport>; MAX_SLOTS],
}

impl GamepadSink for LogSink {
    fn register_slot(&mut self, slot: u8) -> Result<(), SinkError> {
        self.slots.plug(slot)?;
        info!(slot, "virtual gamepad plugged in");
        Ok(())
    }

    fn push_report(&mut self, slot: u8, report: &XInputReport) -> Result<(), SinkError> {
        self.slots.check(slot)?;
        let last = &mut self.last[usize::from(slot)];
        if last.as_ref() != Some(report) {
            debug!(
                slot,
                buttons = format_args!("{:04X}", report.buttons),
                lt = report.left_trigger,
                rt = report.right_trigger,
                lx = report.thumb_lx,
                ly = report.thumb_ly,
                rx = report.thumb_rx,
                ry = report.thumb_ry,
                "report"
            );
            *last = Some(*report);
        }
        Ok(())
    }

    fn unregister_slot(&mut self, slot: u8) {
        self.slots.unplug(slot);
        if let Some(last) = self.last.get_mut(usize::from(slot)) {
            *last = None;
        }
        info!(slot, "virtual gamepad unplugged");
    }
}

/// Accepts and discards everything.
#[derive(Debug, Default)]
pub struct NullSink {
    slots: SlotTable,
}

impl GamepadSink for NullSink {
    fn register_slot(&mut self, slot: u8) -> Result<(), SinkError> {
        self.slots.plug(slot)
    }

    fn push_report(&mut self, slot: u8, _report: &XInputReport) -> Result<(), SinkError> {
        self.slots.check(slot)
    }

    fn unregister_slot(&mut self, slot: u8) {
        self.slots.unplug(slot);
    }
}
