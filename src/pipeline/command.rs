//! External engine processes: spawn, wait (optionally bounded), report.
//!
//! Engines exchange data through files, never through pipes: stdout is
//! discarded and stderr goes to an anonymous temp file. A chatty engine
//! (tabula's JVM warnings) therefore cannot fill a pipe buffer and stall
//! the wait loop.

use crate::error::EngineError;
use std::io::{self, Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest stderr excerpt carried in [`EngineError::Failed`].
const STDERR_TAIL_CHARS: usize = 2000;

/// Run `cmd` to completion.
///
/// With `timeout = None` the call blocks until the process exits. With a
/// limit, the process is killed and reaped once it is exceeded.
pub fn run(engine: &str, cmd: &mut Command, timeout: Option<Duration>) -> Result<(), EngineError> {
    let mut stderr_file = tempfile::tempfile().map_err(|e| EngineError::Spawn {
        engine: engine.to_string(),
        detail: format!("stderr capture: {e}"),
    })?;
    let stderr_handle = stderr_file.try_clone().map_err(|e| EngineError::Spawn {
        engine: engine.to_string(),
        detail: format!("stderr capture: {e}"),
    })?;

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_handle));

    debug!("{}: spawning {:?}", engine, cmd.get_program());
    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        // Uninstalled since the capability probe, or never installed.
        io::ErrorKind::NotFound => EngineError::Unavailable {
            engine: engine.to_string(),
        },
        _ => EngineError::Spawn {
            engine: engine.to_string(),
            detail: e.to_string(),
        },
    })?;

    let status = match timeout {
        None => child.wait().map_err(|e| EngineError::Spawn {
            engine: engine.to_string(),
            detail: format!("wait failed: {e}"),
        })?,
        Some(limit) => {
            let start = Instant::now();
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => break status,
                    Ok(None) => {
                        if start.elapsed() > limit {
                            warn!("{}: timed out after {:?}, killing", engine, limit);
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(EngineError::Timeout {
                                engine: engine.to_string(),
                                secs: limit.as_secs(),
                            });
                        }
                        std::thread::sleep(POLL_INTERVAL);
                    }
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(EngineError::Spawn {
                            engine: engine.to_string(),
                            detail: format!("wait failed: {e}"),
                        });
                    }
                }
            }
        }
    };

    if status.success() {
        return Ok(());
    }

    let mut raw = Vec::new();
    if stderr_file.seek(SeekFrom::Start(0)).is_ok() {
        let _ = stderr_file.read_to_end(&mut raw);
    }
    Err(EngineError::Failed {
        engine: engine.to_string(),
        status: status.to_string(),
        stderr: tail(&String::from_utf8_lossy(&raw), STDERR_TAIL_CHARS),
    })
}

/// Last `max` characters of `s`, trimmed. Tracebacks put the cause at the end.
fn tail(s: &str, max: usize) -> String {
    let s = s.trim();
    let count = s.chars().count();
    if count <= max {
        s.to_string()
    } else {
        s.chars().skip(count - max).collect()
    }
}
