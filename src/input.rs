//! Stop/pause input collaborators.
//!
//! Headless stand-ins for a UI keyboard callback: ctrl-c requests a
//! stop, stdin lines toggle pause (`p`) or stop (`q`). Both tasks write
//! through the [`ControlHandle`]; the control loop only ever reads the
//! flags.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::pipeline::events::ControlHandle;

pub fn spawn_listeners(handle: ControlHandle) {
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Stop requested (ctrl-c)");
                signal_handle.request_stop();
            }
            Err(e) => warn!("Cannot listen for ctrl-c: {e}"),
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match line.trim() {
                    "p" | "pause" => {
                        let paused = handle.toggle_pause();
                        info!(
                            "Pause {} from console",
                            if paused { "requested" } else { "released" }
                        );
                    }
                    "q" | "quit" | "stop" => {
                        info!("Stop requested from console");
                        handle.request_stop();
                        return;
                    }
                    "" => {}
                    other => debug!("Ignoring console input {other:?}"),
                },
                // stdin closed; the signal listener still covers stop.
                Ok(None) => return,
                Err(e) => {
                    warn!("Console read failed: {e}");
                    return;
                }
            }
        }
    });
}
