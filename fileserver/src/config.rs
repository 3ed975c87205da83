//! Boot-time configuration: the majors statically known and bound when the file
//! server starts, before any driver has registered itself through a `devctl`
//! (spec.md §4.2's Driver Map; mirrors the original's compile-time `dmap[]` table,
//! minus the majors that only ever get bound dynamically at runtime).

use crate::errors::ConfigError;
use devmux_multiplexer::driver_map::{DriverStyle, IoHandler, OpenCloseHandler};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Full file-server configuration, loaded from TOML.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// One statically-known major, with the endpoint it is already bound to at boot.
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    pub major: u8,
    pub endpoint: i32,
    pub open_close: OpenCloseKind,
    pub io: IoKind,
    #[serde(default)]
    pub scatter_gather: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OpenCloseKind {
    Generic,
    Tty,
    ControllingTty,
    Clone,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IoKind {
    Generic,
    ControllingTty,
}

impl DeviceConfig {
    pub fn open_close_handler(&self) -> OpenCloseHandler {
        match self.open_close {
            OpenCloseKind::Generic => OpenCloseHandler::Generic,
            OpenCloseKind::Tty => OpenCloseHandler::Tty,
            OpenCloseKind::ControllingTty => OpenCloseHandler::ControllingTty,
            OpenCloseKind::Clone => OpenCloseHandler::Clone,
        }
    }

    pub fn io_handler(&self) -> IoHandler {
        match self.io {
            IoKind::Generic => IoHandler::Generic,
            IoKind::ControllingTty => IoHandler::ControllingTty,
        }
    }

    pub fn style(&self) -> DriverStyle {
        if self.scatter_gather {
            DriverStyle::SCATTER_GATHER
        } else {
            DriverStyle::empty()
        }
    }
}

impl Config {
    /// Load, parse, and validate a `Config` from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.to_path_buf(), source: e })?;
        let cfg: Config = toml::from_str(&s).map_err(ConfigError::Parse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for dev in &self.devices {
            if dev.major as usize >= devmux_shared::constants::NR_DEVICES {
                return Err(ConfigError::Validation(format!(
                    "device major {} is out of range (the driver map holds {} slots)",
                    dev.major,
                    devmux_shared::constants::NR_DEVICES
                )));
            }
            if !seen.insert(dev.major) {
                return Err(ConfigError::Validation(format!(
                    "major {} is bound more than once in this config",
                    dev.major
                )));
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn from_str(toml: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(toml).map_err(ConfigError::Parse)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Live snapshot of the loaded config. A lighter-weight `ConfigManager` than the
/// file-watching kind: this process picks up a new `config.toml` on restart rather
/// than mid-flight, since nothing in this stack pulls in a file-watching crate.
pub struct ConfigManager {
    inner: Arc<RwLock<Config>>,
}

impl ConfigManager {
    pub fn new(path: &Path) -> Result<Self, ConfigError> {
        Ok(ConfigManager { inner: Arc::new(RwLock::new(Config::load(path)?)) })
    }

    /// Snapshot-like read of the current config.
    pub fn get(&self) -> Config {
        self.inner.read().unwrap().clone()
    }
}
