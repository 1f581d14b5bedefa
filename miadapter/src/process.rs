/// Debugger process management
///
/// Spawns an MI debugger with piped standard streams and attaches a session
/// to them. The process is tied to the session: when it exits the session is
/// torn down, and when the session ends the process is killed.

use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::config::LaunchConfig;
use crate::session::{DebugSession, WeakDebugSession};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start debugger process: {0}")]
    StartError(#[from] std::io::Error),
    #[error("Debugger process has no {0} pipe")]
    MissingPipe(&'static str),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Launch the debugger described by `config` and start a session on it
pub async fn spawn_debugger(config: &LaunchConfig) -> Result<DebugSession> {
    let program = config.program();
    let args = config.arguments();

    log::debug!("Starting debugger process: {} {}", program.display(), args.join(" "));

    let mut child = Command::new(&program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let pid = child.id();
    log::debug!("Debugger process started with PID: {:?}", pid);

    let stdin = child.stdin.take().ok_or(ProcessError::MissingPipe("stdin"))?;
    let stdout = child.stdout.take().ok_or(ProcessError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(ProcessError::MissingPipe("stderr"))?;

    let mut session = DebugSession::with_config(stdout, stdin, config.debugger, &config.session);
    session.set_pid(pid);

    tokio::spawn(forward_stderr(stderr));
    tokio::spawn(watch_process(child, session.downgrade()));

    Ok(session)
}

/// Log everything the debugger writes to stderr
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if !line.is_empty() {
                    log::warn!("Debugger stderr: {}", line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::debug!("Debugger stderr read error: {}", e);
                break;
            }
        }
    }

    log::debug!("Debugger stderr reader finished");
}

/// End the session when the process exits and kill the process when the
/// session ends first
async fn watch_process(mut child: Child, mut session: WeakDebugSession) {
    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => log::debug!("Debugger process exited: {}", status),
                Err(e) => log::error!("Failed to wait for debugger process: {}", e),
            }
            session.end().await;
        }
        _ = session.closed() => {
            log::debug!("Session ended, stopping debugger process");
            if let Err(e) = child.kill().await {
                log::debug!("Failed to kill debugger process: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebuggerKind;

    #[tokio::test]
    async fn test_missing_binary_is_a_start_error() {
        let config = LaunchConfig {
            debugger: DebuggerKind::Gdb,
            path: Some("/nonexistent/path/to/debugger".into()),
            ..Default::default()
        };

        match spawn_debugger(&config).await {
            Err(ProcessError::StartError(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
            }
            Err(other) => panic!("Unexpected error {:?}", other),
            Ok(_) => panic!("Spawning a missing binary should fail"),
        }
    }
}
