pub mod config;
mod core;

use std::io::{self, BufReader};
use std::sync::Arc;

pub use crate::config::Config;
pub use crate::core::error::PtyError;

use crate::core::activity::ActivitySignal;
use crate::core::platform;
use crate::core::reader::NonblockingLineReader;
use crate::core::supervisor::Supervisor;

/// Entry point for the server binary.
///
/// Initializes logging, parses configuration from argv, installs
/// SIGINT/SIGTERM handlers, and runs the supervisor loop to completion over
/// stdin/stdout (§4.L).
pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::parse(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("invalid arguments: {e}");
            std::process::exit(2);
        }
    };
    log::info!("starting with chunk_size={}", config.chunk_size);
    if let Some(max) = config.max_sessions {
        log::info!("soft session cap: {max}");
    }

    let activity = Arc::new(ActivitySignal::new());
    let shutdown_requested = platform::install_shutdown_handler(activity.clone());

    let stdin = BufReader::new(io::stdin());
    let control = NonblockingLineReader::spawn(Box::new(stdin), activity.clone());

    let supervisor = Supervisor::new(
        control,
        activity,
        shutdown_requested,
        config.chunk_size,
        config.max_sessions,
        io::stdout(),
    );
    supervisor.run();
}
