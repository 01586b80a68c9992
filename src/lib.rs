//! Bridge a USB Switch Pro Controller to a virtual gamepad, with an optional
//! DSU (cemuhook) telemetry relay for motion-aware emulators.

pub mod calibration;
pub mod cli_app;
pub mod config;
pub mod constants;
pub mod dsu_wire;
pub mod error;
pub mod network;
pub mod pad_state;
pub mod poller_worker;
pub mod session;
pub mod sink;
pub mod translator;
pub mod transport;
pub mod wire;
