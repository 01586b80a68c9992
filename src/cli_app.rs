use anyhow::{Context, bail};
use hidapi::HidApi;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    config::{AppConfig, config_path},
    network::UdpRelayServer,
    poller_worker::PollerWorker,
    session::DeviceSession,
    transport::{HidapiTransport, find_pro_controllers},
};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Opens every USB Pro Controller, then hands them to a [`PollerWorker`] on
/// the calling thread until Ctrl+C.
pub struct CliApp {
    cfg: AppConfig,
    running_signal: Arc<AtomicBool>,
}

impl CliApp {
    pub fn new() -> Self {
        let mut cfg = AppConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "config unreadable, using defaults");
            AppConfig::default()
        });

        if matches!(config_path(), Ok(path) if !path.exists()) {
            match cfg.save() {
                Ok(()) => info!("wrote default config"),
                Err(e) => warn!(error = %e, "could not write default config"),
            }
        }
        cfg.apply_args(std::env::args().skip(1));

        CliApp {
            cfg,
            running_signal: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let r = self.running_signal.clone();
        ctrlc::set_handler(move || {
            if r.swap(false, Ordering::SeqCst) {
                info!("Ctrl+C pressed, stopping");
            } else {
                info!("Ctrl+C pressed again, already stopping");
            }
        })
        .context("installing Ctrl+C handler")?;

        info!(
            layout = ?self.cfg.button_layout(),
            calibration = ?self.cfg.calibration,
            sink = ?self.cfg.sink,
            udp = self.cfg.udp_enabled,
            "starting"
        );

        let api = HidApi::new().context("initializing hidapi")?;
        let devices = find_pro_controllers(&api);
        if devices.is_empty() {
            bail!("no Pro Controller connected over USB");
        }

        let mut sink = self.cfg.sink.build();
        let settings = self.cfg.session_settings();
        let mut sessions = Vec::new();
        for info in devices {
            if sessions.len() >= self.cfg.max_controllers {
                warn!(max = self.cfg.max_controllers, "ignoring extra controllers");
                break;
            }
            let transport = match HidapiTransport::open(&api, info) {
                Ok(t) => t,
                Err(e) => {
                    error!(path = ?info.path(), error = %e, "could not open device");
                    continue;
                }
            };
            let slot = sessions.len() as u8;
            let mut session = DeviceSession::new(transport, slot, settings.clone());
            match session.open(sink.as_mut()) {
                Ok(()) => sessions.push(session),
                Err(e) => error!(slot, error = %e, "controller setup failed"),
            }
        }
        if sessions.is_empty() {
            bail!("no controller could be set up");
        }

        let relay = if self.cfg.udp_enabled {
            let addr = (self.cfg.udp_bind.as_str(), self.cfg.udp_port);
            Some(UdpRelayServer::bind(addr, self.cfg.server_id)?)
        } else {
            None
        };

        info!("running, press Ctrl+C to stop");
        PollerWorker::new(sessions, sink, relay, self.running_signal.clone()).run();
        Ok(())
    }
}
