//! Resume-from-suspend notification.
//!
//! The handler must be async-signal-safe: it does nothing but store a
//! flag, which the scheduler drains on its next cadence decision.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static RESUME: AtomicBool = AtomicBool::new(false);

/// The process-wide resume flag the SIGCONT handler writes.
pub fn resume_flag() -> &'static AtomicBool {
    &RESUME
}

extern "C" fn handle_resume(_sig: libc::c_int) {
    RESUME.store(true, Ordering::Relaxed);
}

/// Registers the SIGCONT handler.
///
/// SA_RESTART is deliberately left off: a blocking sleep must come back
/// with `EINTR` so the scheduler can re-measure the remaining wait.
pub fn install_resume_handler() -> io::Result<()> {
    let handler: extern "C" fn(libc::c_int) = handle_resume;
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;
        if libc::sigaction(libc::SIGCONT, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
