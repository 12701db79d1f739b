use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use super::activity::ActivitySignal;
use super::error::PtyError;

struct State {
    pending: VecDeque<String>,
    credits: VecDeque<u32>,
}

/// Background writer of a queue of strings to one file object.
///
/// Each accepted string is written in full before the next is started
/// (write-submission order is preserved), and produces exactly one credit —
/// the string's length in UTF-16 code units, the unit the controller uses
/// for its own buffer accounting (§4.D). Using UTF-8 byte length or Unicode
/// scalar-value count here would desynchronize flow control from the
/// controller's bookkeeping.
pub struct NonblockingWriter {
    state: Arc<Mutex<State>>,
    condvar: Arc<Condvar>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NonblockingWriter {
    /// `session_id` is used only to label errors logged from the worker
    /// thread (§4.M `PtyError::Write`); the writer itself has no notion of
    /// sessions.
    pub fn spawn(
        session_id: u32,
        mut sink: Box<dyn Write + Send>,
        activity: Arc<ActivitySignal>,
    ) -> Self {
        let state = Arc::new(Mutex::new(State {
            pending: VecDeque::new(),
            credits: VecDeque::new(),
        }));
        let condvar = Arc::new(Condvar::new());

        let worker_state = state.clone();
        let worker_condvar = condvar.clone();
        let handle = std::thread::Builder::new()
            .name("pty-writer".to_string())
            .spawn(move || loop {
                let string = {
                    let mut guard = worker_state.lock().unwrap_or_else(|e| e.into_inner());
                    while guard.pending.is_empty() {
                        guard = worker_condvar.wait(guard).unwrap_or_else(|e| e.into_inner());
                    }
                    guard.pending.pop_front().expect("just checked non-empty")
                };

                // Treated as EOF for this direction (§7): the session will
                // be reaped and its `closed` event emitted once its child
                // is observed not alive, without retry.
                if let Err(e) = sink.write_all(string.as_bytes()) {
                    log::warn!("{}", PtyError::Write(session_id, e.to_string()));
                    break;
                }
                if let Err(e) = sink.flush() {
                    log::warn!("{}", PtyError::Write(session_id, e.to_string()));
                    break;
                }

                let chars = utf16_code_unit_len(&string);
                {
                    let mut guard = worker_state.lock().unwrap_or_else(|e| e.into_inner());
                    guard.credits.push_back(chars);
                }
                activity.signal();
            })
            .expect("failed to spawn PTY writer thread");

        Self {
            state,
            condvar,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Enqueues `s` for writing. Returns immediately; the write happens on
    /// the worker thread.
    pub fn write(&self, s: String) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.pending.push_back(s);
        self.condvar.notify_one();
    }

    /// Returns and removes the oldest credit, or `None` if there is none.
    pub fn next_chars_written(&self) -> Option<u32> {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.credits.pop_front()
    }

    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

/// The number of 16-bit units `s` would occupy when encoded as UTF-16 —
/// equal to the code-point count except that characters outside the Basic
/// Multilingual Plane consume two units (a surrogate pair).
pub fn utf16_code_unit_len(s: &str) -> u32 {
    s.encode_utf16().count() as u32
}
