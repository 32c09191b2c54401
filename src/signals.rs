//! Ctrl-C / SIGTERM handling for the CLI.
//!
//! The first SIGINT or SIGTERM raises the batch's cancel flag. A second one
//! while the stop is still in progress ends the process with status 130.
use lod2_pipeline::CancelToken;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::sync::Arc;

const EXIT_INTERRUPTED: i32 = 130;

pub fn install(cancel: &CancelToken) -> std::io::Result<()> {
    let stop = cancel.shared_flag();
    for signal in [SIGINT, SIGTERM] {
        // Registered first so it sees the flag as it was before this signal.
        flag::register_conditional_shutdown(signal, EXIT_INTERRUPTED, Arc::clone(&stop))?;
        flag::register(signal, Arc::clone(&stop))?;
    }
    Ok(())
}
