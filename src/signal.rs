//! Two-stage SIGINT handling.
//!
//! The first Ctrl-C re-arms the handler to the brutal variant and asks the
//! scheduler to drain gracefully; a second Ctrl-C restores the original
//! disposition and kills in-flight children.  Handlers only store atomics
//! and re-register dispositions, both async-signal-safe; the scheduler
//! polls the level from its dispatch loop.

use std::sync::atomic::{AtomicUsize, Ordering};

static INTERRUPT_LEVEL: AtomicUsize = AtomicUsize::new(0);
static PREVIOUS_HANDLER: AtomicUsize = AtomicUsize::new(0);

extern "C" fn first_handler(_sig: libc::c_int) {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = second_handler as libc::sighandler_t;
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
    }
    INTERRUPT_LEVEL.store(1, Ordering::SeqCst);
}

extern "C" fn second_handler(_sig: libc::c_int) {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = PREVIOUS_HANDLER.load(Ordering::SeqCst) as libc::sighandler_t;
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
    }
    INTERRUPT_LEVEL.store(2, Ordering::SeqCst);
}

/// Arm the two-stage handler and reset the interrupt level.
pub fn install() {
    INTERRUPT_LEVEL.store(0, Ordering::SeqCst);
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = first_handler as libc::sighandler_t;
        let mut old: libc::sigaction = std::mem::zeroed();
        libc::sigaction(libc::SIGINT, &sa, &mut old);
        PREVIOUS_HANDLER.store(old.sa_sigaction as usize, Ordering::SeqCst);
    }
}

/// 0 = no interrupt seen, 1 = drain requested, 2 = kill requested.
pub fn interrupt_level() -> usize {
    INTERRUPT_LEVEL.load(Ordering::SeqCst)
}
