use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use serde::Deserialize;

use super::activity::ActivitySignal;
use super::error::PtyError;
use super::events::EventEmitter;
use super::registry::SessionRegistry;
use super::session::PtySession;

/// One parsed command line (§4.H). Field names match the wire protocol
/// exactly except `columns`, which the wire calls `columns` too — kept
/// here verbatim rather than renamed to `cols` so the struct is a direct
/// mirror of the JSON shape.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Command {
    #[serde(rename = "create")]
    Create {
        argv: Vec<String>,
        rows: u16,
        columns: u16,
        env: Option<HashMap<String, String>>,
        #[serde(default, rename = "extraEnv")]
        extra_env: HashMap<String, String>,
    },
    #[serde(rename = "write")]
    Write { id: u32, data: String },
    #[serde(rename = "resize")]
    Resize { id: u32, rows: u16, columns: u16 },
    #[serde(rename = "permit-data-size")]
    PermitDataSize { id: u32, size: i64 },
    #[serde(rename = "terminate")]
    Terminate {},
}

/// What the supervisor should do after processing one command.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    Stop,
}

/// Parses and applies one command line against the registry (§4.H).
///
/// Every failure mode here — bad JSON, an unknown `type`, a reference to a
/// session id that doesn't exist, a failed spawn — is logged and absorbed;
/// none of them changes the dispatch outcome or reaches the controller as
/// an event (§7).
pub struct Dispatcher {
    activity: Arc<ActivitySignal>,
    chunk_size: usize,
    max_sessions: Option<usize>,
}

impl Dispatcher {
    pub fn new(activity: Arc<ActivitySignal>, chunk_size: usize, max_sessions: Option<usize>) -> Self {
        Self {
            activity,
            chunk_size,
            max_sessions,
        }
    }

    pub fn dispatch<W: Write>(
        &self,
        line: &str,
        registry: &mut SessionRegistry,
        emitter: &mut EventEmitter<W>,
    ) -> DispatchOutcome {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            return DispatchOutcome::Continue;
        }

        let command: Command = match serde_json::from_str(trimmed) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("ignoring malformed command ({e}): {trimmed}");
                return DispatchOutcome::Continue;
            }
        };

        match command {
            Command::Create {
                argv,
                rows,
                columns,
                env,
                extra_env,
            } => self.handle_create(registry, emitter, argv, rows, columns, env, extra_env),
            Command::Write { id, data } => {
                match registry.get(id) {
                    Some(session) => session.enqueue_write(data),
                    None => log::warn!("{}", PtyError::SessionNotFound(id)),
                }
                DispatchOutcome::Continue
            }
            Command::Resize { id, rows, columns } => {
                if rows == 0 || columns == 0 {
                    log::warn!("resize: rows and columns must be > 0");
                    return DispatchOutcome::Continue;
                }
                match registry.get(id) {
                    Some(session) => {
                        if let Err(e) = session.resize(rows, columns) {
                            log::warn!("session {id}: {e}");
                        }
                    }
                    None => log::warn!("{}", PtyError::SessionNotFound(id)),
                }
                DispatchOutcome::Continue
            }
            Command::PermitDataSize { id, size } => {
                match registry.get(id) {
                    Some(session) => session.permit_data_size(size),
                    None => log::warn!("{}", PtyError::SessionNotFound(id)),
                }
                DispatchOutcome::Continue
            }
            Command::Terminate {} => {
                for session in registry.iter_mut() {
                    if let Err(e) = session.terminate() {
                        log::warn!("failed to terminate session {}: {e}", session.id());
                    }
                    // Open the valve so any output still sitting behind the
                    // dying child can drain before the supervisor reaps it.
                    session.drain_permit();
                }
                DispatchOutcome::Stop
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_create<W: Write>(
        &self,
        registry: &mut SessionRegistry,
        emitter: &mut EventEmitter<W>,
        argv: Vec<String>,
        rows: u16,
        columns: u16,
        env: Option<HashMap<String, String>>,
        extra_env: HashMap<String, String>,
    ) -> DispatchOutcome {
        if argv.is_empty() || rows == 0 || columns == 0 {
            log::warn!("create: argv must be non-empty and rows/columns must be > 0");
            return DispatchOutcome::Continue;
        }

        if let Some(max) = self.max_sessions {
            if registry.iter().count() >= max {
                log::warn!(
                    "session count already at the configured soft cap ({max}); creating anyway"
                );
            }
        }

        let mut merged = env.unwrap_or_else(|| std::env::vars().collect());
        merged.extend(extra_env);
        apply_platform_path_fixup(&mut merged);

        let id = match registry.next_id() {
            Ok(id) => id,
            Err(e) => {
                log::error!("create: {e}");
                return DispatchOutcome::Continue;
            }
        };

        match PtySession::spawn(
            id,
            &argv,
            rows,
            columns,
            &merged,
            self.chunk_size,
            self.activity.clone(),
        ) {
            Ok(session) => {
                log::info!("spawned session {id} (pid={:?}, argv={argv:?})", session.pid());
                registry.insert(session);
                emitter.created(id);
            }
            Err(e) => log::error!("create: failed to spawn session {id}: {e}"),
        }

        DispatchOutcome::Continue
    }
}

/// On the POSIX-over-Windows-emulation platform, renames a bare `Path` to
/// `PATH` if needed and rewrites it to POSIX form via the platform adapter
/// (§4.K, §6). A no-op everywhere else.
#[cfg(target_os = "cygwin")]
fn apply_platform_path_fixup(env: &mut HashMap<String, String>) {
    use super::platform;

    if !env.contains_key("PATH") {
        if let Some(path) = env.remove("Path") {
            env.insert("PATH".to_string(), path);
        }
    }

    if let Some(path) = env.get("PATH").cloned() {
        match platform::convert_path_variable(&path) {
            Ok(converted) => {
                env.insert("PATH".to_string(), converted);
            }
            Err(e) => log::warn!("create: failed to convert PATH for child environment: {e}"),
        }
    }
}

#[cfg(not(target_os = "cygwin"))]
fn apply_platform_path_fixup(_env: &mut HashMap<String, String>) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitter() -> EventEmitter<Vec<u8>> {
        EventEmitter::new(Vec::new())
    }

    #[test]
    fn unknown_type_is_ignored_not_fatal() {
        let dispatcher = Dispatcher::new(Arc::new(ActivitySignal::new()), 1024, None);
        let mut registry = SessionRegistry::new();
        let mut emitter = emitter();
        let outcome = dispatcher.dispatch(
            r#"{"type":"frobnicate"}"#,
            &mut registry,
            &mut emitter,
        );
        assert_eq!(outcome, DispatchOutcome::Continue);
    }

    #[test]
    fn invalid_json_is_ignored_not_fatal() {
        let dispatcher = Dispatcher::new(Arc::new(ActivitySignal::new()), 1024, None);
        let mut registry = SessionRegistry::new();
        let mut emitter = emitter();
        let outcome = dispatcher.dispatch("{not json", &mut registry, &mut emitter);
        assert_eq!(outcome, DispatchOutcome::Continue);
    }

    #[test]
    fn write_to_unknown_session_is_ignored() {
        let dispatcher = Dispatcher::new(Arc::new(ActivitySignal::new()), 1024, None);
        let mut registry = SessionRegistry::new();
        let mut emitter = emitter();
        let outcome = dispatcher.dispatch(
            r#"{"type":"write","id":999,"data":"x"}"#,
            &mut registry,
            &mut emitter,
        );
        assert_eq!(outcome, DispatchOutcome::Continue);
    }

    #[test]
    fn only_terminate_returns_stop() {
        let dispatcher = Dispatcher::new(Arc::new(ActivitySignal::new()), 1024, None);
        let mut registry = SessionRegistry::new();
        let mut emitter = emitter();
        let outcome = dispatcher.dispatch(r#"{"type":"terminate"}"#, &mut registry, &mut emitter);
        assert_eq!(outcome, DispatchOutcome::Stop);
    }
}
