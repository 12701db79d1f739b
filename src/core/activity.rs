use std::sync::{Condvar, Mutex};

/// Level-triggered, coalescing wakeup for the supervisor loop.
///
/// Any number of `signal()` calls before the next `wait()` collapse into a
/// single wakeup — this is why a condition variable guarding a boolean flag
/// is used rather than a counting semaphore, which would instead accumulate
/// one wakeup per `signal()` and let the supervisor fall behind.
pub struct ActivitySignal {
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl Default for ActivitySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivitySignal {
    pub fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Marks activity. Idempotent: calling this any number of times before
    /// the next `wait()` has the same effect as calling it once.
    pub fn signal(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(|e| e.into_inner());
        *flag = true;
        self.condvar.notify_one();
    }

    /// Blocks until `signal()` has been called, then clears the flag so the
    /// next `wait()` blocks again until fresh activity arrives.
    pub fn wait(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(|e| e.into_inner());
        while !*flag {
            flag = self
                .condvar
                .wait(flag)
                .unwrap_or_else(|e| e.into_inner());
        }
        *flag = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_blocks_until_signalled() {
        let signal = Arc::new(ActivitySignal::new());
        let waiter = signal.clone();
        let handle = thread::spawn(move || {
            waiter.wait();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        signal.signal();
        handle.join().expect("waiter thread panicked");
    }

    #[test]
    fn coalesces_multiple_signals() {
        let signal = ActivitySignal::new();
        signal.signal();
        signal.signal();
        signal.signal();
        // A single wait() drains all three into one wakeup.
        signal.wait();

        // The flag is now false again; a second wait would block, so we only
        // assert the first one returned promptly by reaching this point.
    }
}
