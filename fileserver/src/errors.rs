//! Configuration error taxonomy, distinct from `devmux_shared::DeviceError`: these are
//! boot-time failures (a bad `config.toml`), never surfaced to a driver-facing caller.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error while accessing `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}
