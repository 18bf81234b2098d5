//! Shutdown collaborator: traps SIGINT and SIGTERM and wakes the loop.
//!
//! The handler performs only an async-signal-safe eventfd write. The
//! event loop observes the wake as a `Wakeup` completion and tears the
//! driver down; the trap itself touches nothing else.

use std::io;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::driver::ShutdownHandle;

static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_signal(_signo: libc::c_int) {
    let fd = WAKE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let val: u64 = 1;
        // Safety: write(2) is async-signal-safe.
        unsafe {
            libc::write(fd, &val as *const u64 as *const libc::c_void, 8);
        }
    }
}

/// Install SIGINT/SIGTERM handlers that trigger the given shutdown handle.
pub fn install(handle: &ShutdownHandle) -> io::Result<()> {
    WAKE_FD.store(handle.eventfd(), Ordering::Relaxed);
    // The handler can fire at any point in the process lifetime, so the
    // eventfd must never be closed once published: keep a clone alive
    // forever.
    std::mem::forget(handle.clone());

    let handler: extern "C" fn(libc::c_int) = on_signal;
    for signo in [libc::SIGINT, libc::SIGTERM] {
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = handler as usize;
        // No SA_RESTART: an interrupted wait returns EINTR and re-enters
        // in time to pick up the wake completion.
        action.sa_flags = 0;
        unsafe {
            libc::sigemptyset(&mut action.sa_mask);
        }
        let ret = unsafe { libc::sigaction(signo, &action, std::ptr::null_mut()) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
