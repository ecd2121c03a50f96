//! SIGINT/SIGTERM handling.
//!
//! The handlers only flip the shared stop flag; everything else (draining
//! the event queue, persisting the index) happens on the normal shutdown
//! path once the main loop observes the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static STOP_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Install SIGINT/SIGTERM handlers that set `flag`.
#[cfg(unix)]
pub fn install(flag: Arc<AtomicBool>) {
    let _ = STOP_FLAG.set(flag);
    unsafe {
        libc::signal(libc::SIGINT, handle as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle as libc::sighandler_t);
    }
}

#[cfg(unix)]
extern "C" fn handle(_signal: libc::c_int) {
    if let Some(flag) = STOP_FLAG.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

/// On non-unix platforms console interrupts terminate the process; the
/// flag is still registered so future platform hooks can use it.
#[cfg(not(unix))]
pub fn install(flag: Arc<AtomicBool>) {
    let _ = STOP_FLAG.set(flag);
}
