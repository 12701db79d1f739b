use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::activity::ActivitySignal;
use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::events::EventEmitter;
use super::reader::NonblockingLineReader;
use super::registry::SessionRegistry;

/// Poll interval while draining sessions on shutdown — the same cadence
/// `platform::terminate`'s own grace-period poll uses.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on how long shutdown will wait for a session that refuses to
/// die (e.g. stuck in uninterruptible sleep) before giving up on it and
/// reaping it anyway, so the process still exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives the whole server: waits for activity, drains the control channel,
/// pumps at most one chunk of output per session per pass, reports write
/// credits, reaps dead sessions, and repeats (§4.J).
///
/// Single-threaded by design — the registry has exactly one owner, this
/// loop, so no session state needs locking once it's off the reader/writer
/// worker threads.
pub struct Supervisor<W: Write> {
    activity: Arc<ActivitySignal>,
    shutdown_requested: Arc<AtomicBool>,
    control: NonblockingLineReader,
    dispatcher: Dispatcher,
    registry: SessionRegistry,
    emitter: EventEmitter<W>,
}

impl<W: Write> Supervisor<W> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        control: NonblockingLineReader,
        activity: Arc<ActivitySignal>,
        shutdown_requested: Arc<AtomicBool>,
        chunk_size: usize,
        max_sessions: Option<usize>,
        out: W,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(activity.clone(), chunk_size, max_sessions),
            activity,
            shutdown_requested,
            control,
            registry: SessionRegistry::new(),
            emitter: EventEmitter::new(out),
        }
    }

    /// Runs until the control channel hits EOF, a `terminate` command is
    /// processed, or SIGINT/SIGTERM arrives. Returns normally in all three
    /// cases (§4.J, §4.L, §6 exit status).
    pub fn run(mut self) {
        'outer: loop {
            self.activity.wait();

            if self.shutdown_requested.load(Ordering::SeqCst) {
                log::info!("shutdown signal received, terminating sessions");
                break;
            }

            // Steps 2-5 repeat without going back to `wait()` as long as
            // each pass produces work (§4.J step 6) — a burst of buffered
            // chunks must drain within this wakeup, not trickle out one per
            // unrelated future signal.
            loop {
                if self.drain_control() == DispatchOutcome::Stop {
                    break 'outer;
                }
                if self.control.is_eof() {
                    log::info!("control channel closed, shutting down");
                    break 'outer;
                }

                let did_work = self.pump_output() | self.pump_credits() | self.reap_dead();
                if !did_work {
                    break;
                }
            }
        }

        self.drain_and_exit();
    }

    fn drain_control(&mut self) -> DispatchOutcome {
        while let Some(line) = self.control.read() {
            let outcome = self
                .dispatcher
                .dispatch(&line, &mut self.registry, &mut self.emitter);
            if outcome == DispatchOutcome::Stop {
                return DispatchOutcome::Stop;
            }
        }
        DispatchOutcome::Continue
    }

    /// Takes at most one chunk from each session and emits it as `output`.
    /// Never drains a session's reader fully before moving to the next, so
    /// one chattery session can't starve the others within a pass (§4.J
    /// fairness rule).
    fn pump_output(&mut self) -> bool {
        let mut did_work = false;
        for session in self.registry.iter_mut() {
            if let Some(text) = session.take_output() {
                if !text.is_empty() {
                    self.emitter.output(session.id(), text);
                    did_work = true;
                }
            }
        }
        did_work
    }

    fn pump_credits(&mut self) -> bool {
        let mut did_work = false;
        for session in self.registry.iter() {
            let chars = session.drain_chars_written();
            if chars > 0 {
                self.emitter.output_written(session.id(), chars);
                did_work = true;
            }
        }
        did_work
    }

    /// Removes sessions whose child has exited, emitting `closed` for each.
    ///
    /// Reaping is gated on process liveness alone, not on the reader
    /// reaching EOF: a session whose permit stayed closed would otherwise
    /// never drain and could wedge the registry open forever after its
    /// child died.
    fn reap_dead(&mut self) -> bool {
        let dead_ids: Vec<u32> = self
            .registry
            .iter_mut()
            .filter(|s| !s.is_alive())
            .map(|s| s.id())
            .collect();

        let mut did_work = false;
        for id in dead_ids {
            if let Some(session) = self.registry.remove(id) {
                session.join_reader();
                self.emitter.closed(id);
                did_work = true;
            }
        }
        did_work
    }

    /// Terminates every still-running session, then pumps output/credits and
    /// reaps sessions — emitting `closed` for each — until the registry is
    /// empty, so every open session gets its `closed` event before the
    /// process exits (§4.H `terminate`'s fan-out, §8 property 1). Reached
    /// from all three shutdown paths: an explicit `terminate` command (whose
    /// sessions the dispatcher has already terminated and opened the valve
    /// on), control-channel EOF, and SIGINT/SIGTERM — the latter two haven't
    /// terminated anything yet, so this does it here.
    fn drain_and_exit(&mut self) {
        for session in self.registry.iter_mut() {
            if session.is_alive() {
                if let Err(e) = session.terminate() {
                    log::warn!("failed to terminate session {} on shutdown: {e}", session.id());
                }
            }
            // Open the valve so any output still sitting behind a dying
            // child can drain before it's reaped, rather than being
            // discarded (idempotent if `terminate` already did this).
            session.drain_permit();
        }

        let start = Instant::now();
        while !self.registry.is_empty() {
            let did_work = self.pump_output() | self.pump_credits() | self.reap_dead();
            if self.registry.is_empty() {
                break;
            }
            if !did_work {
                if start.elapsed() > DRAIN_TIMEOUT {
                    log::error!(
                        "timed out waiting for {} session(s) to exit; reaping anyway",
                        self.registry.ids().len()
                    );
                    for id in self.registry.ids() {
                        if let Some(session) = self.registry.remove(id) {
                            session.join_reader();
                            self.emitter.closed(id);
                        }
                    }
                    break;
                }
                std::thread::sleep(DRAIN_POLL_INTERVAL);
            }
        }
    }
}
