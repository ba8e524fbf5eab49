//! Cooperative cancellation of render requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(unix)]
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
#[cfg(unix)]
use std::sync::atomic::AtomicPtr;

/// Shared flag asking a running request to stop.
///
/// Clones share the flag, so a token handed to a request can be cancelled
/// from another thread or from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Clear a previous request so the token can be reused.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }

    /// Route SIGTERM into this token until the guard is dropped.
    ///
    /// While the guard lives, a SIGTERM sent to this process sets the token
    /// instead of terminating the process. Dropping the guard reinstalls
    /// whatever SIGTERM disposition was in place before. Nested guards must
    /// be dropped in reverse order of creation.
    #[cfg(unix)]
    pub fn route_sigterm(&self) -> std::io::Result<SignalGuard> {
        SignalGuard::install(Arc::clone(&self.flag))
    }
}

/// Flag the SIGTERM handler sets; owned by the innermost live [`SignalGuard`].
#[cfg(unix)]
static ROUTED: AtomicPtr<AtomicBool> = AtomicPtr::new(std::ptr::null_mut());

#[cfg(unix)]
extern "C" fn on_sigterm(_: std::ffi::c_int) {
    let flag = ROUTED.load(Ordering::SeqCst);
    if !flag.is_null() {
        // SAFETY: the guard that published the pointer holds the Arc until
        // after it has reinstalled the previous handler.
        unsafe { (*flag).store(true, Ordering::SeqCst) };
    }
}

/// Keeps SIGTERM routed into a [`CancellationToken`]; dropping it restores
/// the previous handler.
#[cfg(unix)]
pub struct SignalGuard {
    flag: Arc<AtomicBool>,
    previous: SigAction,
    previous_flag: *mut AtomicBool,
}

#[cfg(unix)]
impl SignalGuard {
    fn install(flag: Arc<AtomicBool>) -> std::io::Result<Self> {
        let previous_flag = ROUTED.swap(Arc::as_ptr(&flag).cast_mut(), Ordering::SeqCst);
        let action = SigAction::new(
            SigHandler::Handler(on_sigterm),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handler only performs an atomic load and store.
        let previous = match unsafe { sigaction(Signal::SIGTERM, &action) } {
            Ok(previous) => previous,
            Err(errno) => {
                ROUTED.store(previous_flag, Ordering::SeqCst);
                return Err(errno.into());
            }
        };
        log::trace!("SIGTERM routed to cancellation token");
        Ok(Self {
            flag,
            previous,
            previous_flag,
        })
    }
}

#[cfg(unix)]
impl Drop for SignalGuard {
    fn drop(&mut self) {
        // SAFETY: reinstalls the action the kernel handed back at install time.
        if let Err(errno) = unsafe { sigaction(Signal::SIGTERM, &self.previous) } {
            log::warn!("could not restore SIGTERM handler: {}", errno);
        }
        ROUTED.store(self.previous_flag, Ordering::SeqCst);
        log::trace!(
            "SIGTERM route removed (token cancelled: {})",
            self.flag.load(Ordering::Relaxed)
        );
    }
}

#[cfg(unix)]
impl std::fmt::Debug for SignalGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalGuard")
            .field("cancelled", &self.flag.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        other.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_from_thread() {
        let token = CancellationToken::new();
        let remote = token.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }

    /// SIGTERM disposition is process-wide; tests that touch it take turns.
    #[cfg(unix)]
    static SIGNAL_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[cfg(unix)]
    fn current_handler() -> SigHandler {
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        unsafe {
            let current = sigaction(Signal::SIGTERM, &default).unwrap();
            sigaction(Signal::SIGTERM, &current).unwrap();
            current.handler()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_sigterm_sets_token() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let token = CancellationToken::new();
        let guard = token.route_sigterm().unwrap();
        nix::sys::signal::raise(Signal::SIGTERM).unwrap();
        assert!(token.is_cancelled());
        drop(guard);
    }

    #[cfg(unix)]
    #[test]
    fn test_dropping_guard_restores_previous_handler() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let before = current_handler();

        let token = CancellationToken::new();
        let guard = token.route_sigterm().unwrap();
        assert_eq!(current_handler(), SigHandler::Handler(on_sigterm));
        drop(guard);
        assert_eq!(current_handler(), before);

        // routing again after a restore still reaches the new token
        let second = CancellationToken::new();
        let guard = second.route_sigterm().unwrap();
        nix::sys::signal::raise(Signal::SIGTERM).unwrap();
        drop(guard);
        assert!(second.is_cancelled());
        assert!(!token.is_cancelled());
        assert_eq!(current_handler(), before);
    }

    #[cfg(unix)]
    #[test]
    fn test_nested_guards_unwind_in_order() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let before = current_handler();

        let outer = CancellationToken::new();
        let inner = CancellationToken::new();
        let outer_guard = outer.route_sigterm().unwrap();
        let inner_guard = inner.route_sigterm().unwrap();
        drop(inner_guard);

        nix::sys::signal::raise(Signal::SIGTERM).unwrap();
        assert!(outer.is_cancelled());
        assert!(!inner.is_cancelled());

        drop(outer_guard);
        assert_eq!(current_handler(), before);
    }
}
