//! Per-thread signal masking.
//!
//! Thin wrappers over the platform thread-signal-mask primitive. The
//! mask applies to the calling thread only; a runner that wants to be
//! woken by [`Thread::kill`](super::Thread::kill) typically unblocks the
//! chosen signal here and blocks everything else.

use spindle_core::{Error, Result};

fn build_set(signals: &[i32]) -> Result<libc::sigset_t> {
    unsafe {
        let mut set = std::mem::zeroed::<libc::sigset_t>();
        if libc::sigemptyset(&mut set) != 0 {
            return Err(Error::System("sigemptyset() failed".to_string()));
        }
        for signal in signals {
            if libc::sigaddset(&mut set, *signal) != 0 {
                return Err(Error::System(format!(
                    "sigaddset({}) failed, is this a valid signal number?",
                    signal
                )));
            }
        }
        Ok(set)
    }
}

fn full_set() -> Result<libc::sigset_t> {
    unsafe {
        let mut set = std::mem::zeroed::<libc::sigset_t>();
        if libc::sigfillset(&mut set) != 0 {
            return Err(Error::System("sigfillset() failed".to_string()));
        }
        Ok(set)
    }
}

fn apply(how: libc::c_int, set: &libc::sigset_t) -> Result<()> {
    let err = unsafe { libc::pthread_sigmask(how, set, std::ptr::null_mut()) };
    if err != 0 {
        return Err(Error::System(format!(
            "pthread_sigmask() failed with error #{}",
            err
        )));
    }
    Ok(())
}

/// Block the given signals on the calling thread.
pub fn block_signals(signals: &[i32]) -> Result<()> {
    apply(libc::SIG_BLOCK, &build_set(signals)?)
}

/// Unblock the given signals on the calling thread.
pub fn unblock_signals(signals: &[i32]) -> Result<()> {
    apply(libc::SIG_UNBLOCK, &build_set(signals)?)
}

/// Block every signal on the calling thread.
pub fn block_all_signals() -> Result<()> {
    apply(libc::SIG_BLOCK, &full_set()?)
}

/// Unblock every signal on the calling thread.
pub fn unblock_all_signals() -> Result<()> {
    apply(libc::SIG_UNBLOCK, &full_set()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_and_unblock_round_trip() {
        // run on a dedicated thread so the test runner's mask stays
        // untouched
        std::thread::spawn(|| {
            block_signals(&[libc::SIGUSR1, libc::SIGUSR2]).unwrap();
            unblock_signals(&[libc::SIGUSR1, libc::SIGUSR2]).unwrap();
            block_all_signals().unwrap();
            unblock_all_signals().unwrap();
        })
        .join()
        .unwrap();
    }
}
