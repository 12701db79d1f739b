//! End-to-end tests against the real `pty-host` binary: real child
//! processes (`/bin/echo`, `/bin/cat`, `sh`) driven over actual stdio pipes,
//! exercising the wire protocol exactly as a real controller would.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

struct Harness {
    child: Child,
    stdin: Option<ChildStdin>,
    events: Receiver<String>,
}

impl Harness {
    fn spawn() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_pty-host"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn pty-host binary");

        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            child,
            stdin: Some(stdin),
            events: rx,
        }
    }

    fn send(&mut self, json: &str) {
        let stdin = self.stdin.as_mut().expect("stdin already closed");
        writeln!(stdin, "{json}").expect("write to pty-host stdin");
        stdin.flush().expect("flush pty-host stdin");
    }

    /// Drops the write end of the child's stdin, so its control reader
    /// observes EOF the way a controller disconnecting would.
    fn close_stdin(&mut self) {
        self.stdin = None;
    }

    fn next_event(&self, timeout: Duration) -> Option<serde_json::Value> {
        self.events
            .recv_timeout(timeout)
            .ok()
            .map(|line| serde_json::from_str(&line).expect("event line must be valid JSON"))
    }

    /// Polls for the next event whose `type` matches `event_type`, skipping
    /// any other events seen in the meantime (e.g. stray `output` chunks).
    fn wait_for(&self, event_type: &str, timeout: Duration) -> serde_json::Value {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                panic!("timed out waiting for event type {event_type}");
            }
            match self.next_event(remaining) {
                Some(event) if event["type"] == event_type => return event,
                Some(_) => continue,
                None => panic!("timed out waiting for event type {event_type}"),
            }
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn echo_command_round_trips_its_output() {
    let mut harness = Harness::spawn();

    harness.send(r#"{"type":"create","argv":["/bin/echo","hi"],"rows":24,"columns":80}"#);
    let created = harness.wait_for("created", Duration::from_secs(5));
    let id = created["id"].as_u64().unwrap();

    harness.send(&format!(
        r#"{{"type":"permit-data-size","id":{id},"size":1000000}}"#
    ));

    let output = harness.wait_for("output", Duration::from_secs(5));
    assert_eq!(output["id"].as_u64().unwrap(), id);
    assert!(
        output["data"].as_str().unwrap().contains("hi"),
        "expected echoed output to contain 'hi', got {output:?}"
    );

    harness.wait_for("closed", Duration::from_secs(5));

    harness.send(r#"{"type":"terminate"}"#);
    let status = harness.child.wait().expect("wait on pty-host");
    assert!(status.success());
}

#[test]
fn write_credits_are_counted_in_utf16_code_units() {
    let mut harness = Harness::spawn();

    harness.send(r#"{"type":"create","argv":["/bin/cat"],"rows":24,"columns":80}"#);
    let created = harness.wait_for("created", Duration::from_secs(5));
    let id = created["id"].as_u64().unwrap();

    harness.send(&format!(
        r#"{{"type":"permit-data-size","id":{id},"size":1000000}}"#
    ));

    // "é𝄞" round trips as one BMP char (1 unit) plus one
    // astral surrogate pair (2 units) = 3 UTF-16 code units total.
    harness.send(&format!(
        r#"{{"type":"write","id":{id},"data":"é𝄞"}}"#
    ));

    let written = harness.wait_for("output-written", Duration::from_secs(5));
    assert_eq!(written["id"].as_u64().unwrap(), id);
    assert_eq!(written["chars"].as_u64().unwrap(), 3);

    harness.send(r#"{"type":"terminate"}"#);
    let status = harness.child.wait().expect("wait on pty-host");
    assert!(status.success());
}

#[test]
fn closed_permit_withholds_output_until_granted() {
    let mut harness = Harness::spawn();

    harness.send(r#"{"type":"create","argv":["/bin/echo","hello-there"],"rows":24,"columns":80}"#);
    let created = harness.wait_for("created", Duration::from_secs(5));
    let id = created["id"].as_u64().unwrap();

    // No permit-data-size sent yet: nothing should arrive for a while.
    assert!(
        harness.next_event(Duration::from_millis(300)).is_none(),
        "output should not arrive before a permit is granted"
    );

    harness.send(&format!(
        r#"{{"type":"permit-data-size","id":{id},"size":1000000}}"#
    ));
    harness.wait_for("output", Duration::from_secs(5));

    harness.send(r#"{"type":"terminate"}"#);
    let status = harness.child.wait().expect("wait on pty-host");
    assert!(status.success());
}

#[test]
fn write_to_unknown_session_is_silently_ignored() {
    let mut harness = Harness::spawn();

    harness.send(r#"{"type":"write","id":999,"data":"hello"}"#);

    // The server should still be alive and responsive afterward.
    harness.send(r#"{"type":"create","argv":["/bin/echo","ok"],"rows":24,"columns":80}"#);
    harness.wait_for("created", Duration::from_secs(5));

    harness.send(r#"{"type":"terminate"}"#);
    let status = harness.child.wait().expect("wait on pty-host");
    assert!(status.success());
}

#[test]
fn malformed_command_line_is_silently_ignored() {
    let mut harness = Harness::spawn();

    harness.send("{this is not valid json");

    harness.send(r#"{"type":"create","argv":["/bin/echo","ok"],"rows":24,"columns":80}"#);
    harness.wait_for("created", Duration::from_secs(5));

    harness.send(r#"{"type":"terminate"}"#);
    let status = harness.child.wait().expect("wait on pty-host");
    assert!(status.success());
}

#[test]
fn terminate_command_reaps_a_long_running_session_and_exits_cleanly() {
    let mut harness = Harness::spawn();

    harness.send(r#"{"type":"create","argv":["sh","-c","sleep 60"],"rows":24,"columns":80}"#);
    let created = harness.wait_for("created", Duration::from_secs(5));
    let id = created["id"].as_u64().unwrap();

    harness.send(r#"{"type":"terminate"}"#);

    // E5: every open session gets a `closed` event as part of `terminate`,
    // not just a clean process exit.
    let closed = harness.wait_for("closed", Duration::from_secs(5));
    assert_eq!(closed["id"].as_u64().unwrap(), id);

    let status = harness.child.wait().expect("wait on pty-host");
    assert!(status.success());
}

#[test]
fn terminate_command_closes_every_open_session() {
    let mut harness = Harness::spawn();

    harness.send(r#"{"type":"create","argv":["sh","-c","sleep 60"],"rows":24,"columns":80}"#);
    let first = harness.wait_for("created", Duration::from_secs(5));
    let first_id = first["id"].as_u64().unwrap();

    harness.send(r#"{"type":"create","argv":["sh","-c","sleep 60"],"rows":24,"columns":80}"#);
    let second = harness.wait_for("created", Duration::from_secs(5));
    let second_id = second["id"].as_u64().unwrap();

    harness.send(r#"{"type":"terminate"}"#);

    let mut closed_ids = std::collections::HashSet::new();
    closed_ids.insert(harness.wait_for("closed", Duration::from_secs(5))["id"].as_u64().unwrap());
    closed_ids.insert(harness.wait_for("closed", Duration::from_secs(5))["id"].as_u64().unwrap());
    assert_eq!(closed_ids, [first_id, second_id].into_iter().collect());

    let status = harness.child.wait().expect("wait on pty-host");
    assert!(status.success());
}

#[test]
fn control_channel_eof_also_closes_open_sessions_before_exit() {
    let mut harness = Harness::spawn();

    harness.send(r#"{"type":"create","argv":["sh","-c","sleep 60"],"rows":24,"columns":80}"#);
    let created = harness.wait_for("created", Duration::from_secs(5));
    let id = created["id"].as_u64().unwrap();

    // Dropping stdin (no `terminate` sent) mimics the controller process
    // exiting or disconnecting; the server must still reap and close every
    // open session before it exits, not just on an explicit `terminate`.
    harness.close_stdin();

    let closed = harness.wait_for("closed", Duration::from_secs(5));
    assert_eq!(closed["id"].as_u64().unwrap(), id);

    let status = harness.child.wait().expect("wait on pty-host");
    assert!(status.success());
}
