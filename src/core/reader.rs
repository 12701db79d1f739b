use std::collections::VecDeque;
use std::io::{BufRead, Read};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use super::activity::ActivitySignal;

/// Default chunk size for PTY output readers, overridable via `--chunk-size`
/// (§4.L). Kept modest so credit accounting stays fine-grained and the
/// fairness round-robin in the supervisor doesn't let one session's chunk
/// dominate a pass.
pub const PTY_CHUNK_SIZE: usize = 1_024;

struct Buffer<T> {
    items: VecDeque<T>,
    eof: bool,
}

impl<T> Buffer<T> {
    fn new() -> Self {
        Self {
            items: VecDeque::new(),
            eof: false,
        }
    }
}

/// Background reader of one byte-oriented file object into a queue of
/// chunks, throttled by a credit valve.
///
/// The worker thread blocks on the valve (`permit > 0`) before every read, so
/// a controller that never grants permit leaves bytes sitting in the
/// kernel's PTY buffer rather than this process's memory (§5 Backpressure).
pub struct NonblockingByteReader {
    buffer: Arc<Mutex<Buffer<Vec<u8>>>>,
    permit: Arc<(Mutex<i64>, Condvar)>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NonblockingByteReader {
    /// Spawns the worker thread. `source` is moved onto the worker thread;
    /// `permit` starts closed (0), matching the spec's documented initial
    /// state — a session is silent until the controller sends
    /// `permit-data-size`.
    pub fn spawn(
        mut source: Box<dyn Read + Send>,
        chunk_size: usize,
        activity: Arc<ActivitySignal>,
    ) -> Self {
        let buffer = Arc::new(Mutex::new(Buffer::new()));
        let permit = Arc::new((Mutex::new(0i64), Condvar::new()));

        let worker_buffer = buffer.clone();
        let worker_permit = permit.clone();
        let handle = std::thread::Builder::new()
            .name("pty-byte-reader".to_string())
            .spawn(move || {
                loop {
                    {
                        let (lock, condvar) = &*worker_permit;
                        let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
                        while *guard <= 0 {
                            guard = condvar.wait(guard).unwrap_or_else(|e| e.into_inner());
                        }
                    }

                    let mut buf = vec![0u8; chunk_size];
                    match source.read(&mut buf) {
                        Ok(0) => {
                            mark_eof(&worker_buffer);
                            activity.signal();
                            break;
                        }
                        Ok(n) => {
                            buf.truncate(n);
                            {
                                let mut b = worker_buffer.lock().unwrap_or_else(|e| e.into_inner());
                                b.items.push_back(buf);
                            }
                            {
                                let (lock, _) = &*worker_permit;
                                let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
                                *guard -= n as i64;
                            }
                            activity.signal();
                        }
                        Err(_) => {
                            mark_eof(&worker_buffer);
                            activity.signal();
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn PTY reader thread");

        Self {
            buffer,
            permit,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Returns the oldest buffered chunk, or `None` if nothing is available.
    /// Never merges or splits chunks.
    pub fn read(&self) -> Option<Vec<u8>> {
        let mut b = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        b.items.pop_front()
    }

    /// True iff the buffer is drained *and* the source has reached EOF.
    pub fn is_eof(&self) -> bool {
        let b = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        b.items.is_empty() && b.eof
    }

    /// Sets the permit to an absolute value. Any value `<= 0` closes the
    /// valve; the controller is expected to send absolute values, never
    /// deltas (§9 open question).
    pub fn permit_data_size(&self, size: i64) {
        let (lock, condvar) = &*self.permit;
        let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        *guard = size;
        if size > 0 {
            condvar.notify_one();
        }
    }

    /// Joins the worker thread if it has not already been joined. Used
    /// opportunistically during session teardown; harmless to call more
    /// than once (a second call finds `None` and is a no-op).
    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

fn mark_eof<T>(buffer: &Arc<Mutex<Buffer<T>>>) {
    let mut b = buffer.lock().unwrap_or_else(|e| e.into_inner());
    b.eof = true;
}

/// Background reader of one line-oriented file object into a queue of
/// complete lines. Used solely for the control channel: the valve is
/// permanently open since throttling stdin from the controller would make
/// no sense, and line boundaries (not arbitrary chunks) are the unit that
/// matters there.
pub struct NonblockingLineReader {
    buffer: Arc<Mutex<Buffer<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NonblockingLineReader {
    pub fn spawn(mut source: Box<dyn BufRead + Send>, activity: Arc<ActivitySignal>) -> Self {
        let buffer = Arc::new(Mutex::new(Buffer::new()));
        let worker_buffer = buffer.clone();

        let handle = std::thread::Builder::new()
            .name("pty-line-reader".to_string())
            .spawn(move || loop {
                let mut line = String::new();
                match source.read_line(&mut line) {
                    Ok(0) => {
                        mark_eof(&worker_buffer);
                        activity.signal();
                        break;
                    }
                    Ok(_) => {
                        {
                            let mut b = worker_buffer.lock().unwrap_or_else(|e| e.into_inner());
                            b.items.push_back(line);
                        }
                        activity.signal();
                    }
                    Err(_) => {
                        mark_eof(&worker_buffer);
                        activity.signal();
                        break;
                    }
                }
            })
            .expect("failed to spawn control line reader thread");

        Self {
            buffer,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn read(&self) -> Option<String> {
        let mut b = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        b.items.pop_front()
    }

    pub fn is_eof(&self) -> bool {
        let b = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        b.items.is_empty() && b.eof
    }

    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }
}
