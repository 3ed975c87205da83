//! Logger initialization: timestamp, level, source file/line, and thread name on every
//! line, matching the shape of the teacher's own logger setup.

use std::thread;

/// Initializes the logger with custom formatting. Keep the returned guard-free setup
/// alive for the process lifetime by calling this once, early in `main`.
pub fn init_logger() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{:<5}] [{}:{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.file().unwrap_or("<unknown>"),
                record.line().unwrap_or(0),
                thread::current().name().unwrap_or("<unnamed>"),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(fern::log_file("fileserver.log")?)
        .apply()?;
    Ok(())
}
