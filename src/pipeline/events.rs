//! Stop/pause event flags shared between the input collaborator and the
//! control loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct EventFlags {
    stop: AtomicBool,
    pause: AtomicBool,
}

/// Writer half, held by the input collaborator (keyboard/signal tasks).
#[derive(Debug, Clone)]
pub struct ControlHandle {
    flags: Arc<EventFlags>,
}

/// Read-only half, held by the pipeline controller.
#[derive(Debug, Clone)]
pub struct ControlView {
    flags: Arc<EventFlags>,
}

/// One stable reading of the flags, taken once per loop iteration so a
/// flag flipping mid-iteration cannot leave the loop half-paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSnapshot {
    pub stop: bool,
    pub pause: bool,
}

/// Create a connected writer/reader pair.
pub fn control_pair() -> (ControlHandle, ControlView) {
    let flags = Arc::new(EventFlags::default());
    (
        ControlHandle {
            flags: Arc::clone(&flags),
        },
        ControlView { flags },
    )
}

impl ControlHandle {
    pub fn request_stop(&self) {
        self.flags.stop.store(true, Ordering::Release);
    }

    pub fn set_pause(&self, paused: bool) {
        self.flags.pause.store(paused, Ordering::Release);
    }

    pub fn toggle_pause(&self) -> bool {
        // fetch_xor returns the previous value
        !self.flags.pause.fetch_xor(true, Ordering::AcqRel)
    }
}

impl ControlView {
    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot {
            stop: self.flags.stop.load(Ordering::Acquire),
            pause: self.flags.pause.load(Ordering::Acquire),
        }
    }
}
