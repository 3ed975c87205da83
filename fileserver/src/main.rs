//! Entry point for the resident file-server process.
//!
//! Wires up logging and configuration, builds the `Multiplexer`, and statically binds
//! whatever majors `config.toml` already knows about at boot. Everything after that —
//! the request loop that actually feeds the multiplexer driver traffic — waits on a
//! live `Transport`/`AuthorityChannel` pair from the underlying IPC primitive, which
//! this crate assumes rather than implements (spec.md §1 Non-goals).

mod config;
mod errors;
mod logger;

use config::ConfigManager;
use devmux_multiplexer::Multiplexer;
use log::info;
use std::env;
use std::path::PathBuf;
use std::thread;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logger::init_logger()?;

    let config_path = find_config_file();
    let cfg_mgr = ConfigManager::new(&config_path)?;
    info!("configuration loaded from {}", config_path.display());

    let mut mux = Multiplexer::new();
    let cfg = cfg_mgr.get();
    for dev in &cfg.devices {
        mux.bind(dev.major, dev.endpoint, dev.open_close_handler(), dev.io_handler(), dev.style());
        info!("major {} statically bound to endpoint {}", dev.major, dev.endpoint);
    }
    info!("multiplexer ready with {} statically bound major(s)", cfg.devices.len());

    // TODO: drive `mux` from the real kernel IPC primitive once that binding exists;
    // `char_io`/`block_io`/`open`/`close`/`status_received` are all ready to be called
    // from that loop, they just need a live `Transport` to read requests off of.
    thread::park();
    #[allow(unreachable_code)]
    Ok(())
}

/// Finds the `config.toml` path by checking an override environment variable first and
/// falling back to a file next to the running executable.
fn find_config_file() -> PathBuf {
    if let Some(cfg) = env::var_os("FILESERVER_CONFIG") {
        return PathBuf::from(cfg);
    }

    let mut exe_path = env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    exe_path.pop();
    exe_path.push("config.toml");
    exe_path
}
