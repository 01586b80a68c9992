use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::PathBuf};

use crate::{
    calibration::CalibrationMode,
    constants::dsu::{DEFAULT_PORT, DEFAULT_SERVER_ID, MAX_SLOTS},
    session::SessionSettings,
    sink::SinkKind,
    translator::ButtonLayout,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Map A/B/X/Y by printed label instead of position.
    pub match_button_labels: bool,
    pub calibration: CalibrationMode,
    pub player_led: u8,
    pub udp_enabled: bool,
    pub udp_bind: String,
    pub udp_port: u16,
    pub server_id: u32,
    pub read_timeout_ms: i32,
    pub handshake_timeout_ms: i32,
    pub spi_read_attempts: u32,
    pub sink: SinkKind,
    pub max_controllers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            match_button_labels: false,
            calibration: CalibrationMode::Factory,
            player_led: 0x01,
            udp_enabled: true,
            udp_bind: "127.0.0.1".into(),
            udp_port: DEFAULT_PORT,
            server_id: DEFAULT_SERVER_ID,
            read_timeout_ms: 16,
            handshake_timeout_ms: 500,
            spi_read_attempts: 32,
            sink: SinkKind::Log,
            max_controllers: MAX_SLOTS,
        }
    }
}

pub fn config_path() -> io::Result<PathBuf> {
    ProjectDirs::from("com", "ProconBridge", "procon-bridge")
        .map(|d| d.config_dir().join("config.toml"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Could not determine config dir"))
}

impl AppConfig {
    pub fn load() -> io::Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::parse(&fs::read_to_string(&path)?)
    }

    pub fn parse(txt: &str) -> io::Result<Self> {
        toml::from_str(txt).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("TOML parse error: {e}"))
        })
    }

    pub fn save(&self) -> io::Result<()> {
        let path = config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, toml)
    }

    pub fn button_layout(&self) -> ButtonLayout {
        if self.match_button_labels {
            ButtonLayout::LegacySwapped
        } else {
            ButtonLayout::Current
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            calibration: self.calibration,
            layout: self.button_layout(),
            player_led: self.player_led,
            read_timeout_ms: self.read_timeout_ms,
            handshake_timeout_ms: self.handshake_timeout_ms,
            spi_read_attempts: self.spi_read_attempts,
        }
    }

    /// Apply command-line overrides on top of the file.
    pub fn apply_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            match arg.as_ref() {
                "--no-udp" => self.udp_enabled = false,
                "--adaptive" => self.calibration = CalibrationMode::Adaptive,
                _ => {}
            }
        }
    }
}
