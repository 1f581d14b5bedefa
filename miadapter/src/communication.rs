/// Command queue and output demultiplexing for an MI debugger
///
/// A single task owns the debugger's input and output streams along with the
/// queue of pending commands. Only the command at the head of the queue is
/// ever written; the next one goes out once the head's completion record has
/// been read back. Everything else the debugger prints is turned into events.

use std::collections::{HashSet, VecDeque};
use std::ops::ControlFlow;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use crate::commands::{self, CommandError, CommandFailedError};
use crate::events::{translate_exec, translate_notify, translate_stream, DebugEvent};
use crate::extract::string_field;
use crate::parser::{is_prompt, parse_record};
use crate::types::{Record, RecordKind, Response, ResultClass, ResultRecord};

#[derive(Error, Debug)]
pub enum CommunicationError {
    #[error("Failed to talk to the debugger: {0}")]
    Io(#[from] std::io::Error),
    #[error("Debugger exited")]
    DebuggerExited,
    #[error("Debug session has ended")]
    SessionEnded,
}

impl CommunicationError {
    /// Copy of the error for each command that has to be rejected with it
    fn duplicate(&self) -> Self {
        match self {
            CommunicationError::Io(e) => {
                CommunicationError::Io(std::io::Error::new(e.kind(), e.to_string()))
            }
            CommunicationError::DebuggerExited => CommunicationError::DebuggerExited,
            CommunicationError::SessionEnded => CommunicationError::SessionEnded,
        }
    }
}

pub type CommandResult = std::result::Result<Response, CommandError>;

type ExitResult = Result<(), CommandError>;

/// Copy of a `gdb-exit` outcome for every `end` caller waiting on it
fn duplicate_outcome(outcome: &ExitResult) -> ExitResult {
    let error = match outcome {
        Ok(()) => return Ok(()),
        Err(error) => error,
    };

    Err(match error {
        CommandError::Failed(e) => CommandError::Failed(e.clone()),
        CommandError::Malformed(e) => CommandError::Malformed(e.clone()),
        CommandError::TimedOut { command, token } => CommandError::TimedOut {
            command: command.clone(),
            token: *token,
        },
        CommandError::Communication(e) => CommandError::Communication(e.duplicate()),
    })
}

/// How the output of a command is framed
#[derive(Debug)]
pub(crate) enum CommandMode {
    /// Completed by the next result record
    Normal,
    /// A CLI command whose output lines are collected verbatim until `^done`
    Raw { lines: Vec<String> },
}

pub(crate) enum Completion {
    Caller(oneshot::Sender<CommandResult>),
    /// `gdb-exit` sent by `end`; the session stops once it completes
    Exit(oneshot::Sender<Result<(), CommandError>>),
}

pub(crate) struct Command {
    pub token: Option<u32>,
    pub text: String,
    pub mode: CommandMode,
    pub completion: Completion,
}

impl Command {
    fn wire_text(&self) -> String {
        match (&self.mode, self.token) {
            (CommandMode::Raw { .. }, _) => format!("{}\n", self.text),
            (CommandMode::Normal, Some(token)) => format!("{}-{}\n", token, self.text),
            (CommandMode::Normal, None) => format!("-{}\n", self.text),
        }
    }

    fn reject(self, error: CommandError) {
        match self.completion {
            Completion::Caller(reply) => {
                let _ = reply.send(Err(error));
            }
            Completion::Exit(reply) => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

pub(crate) enum Request {
    Enqueue(Command),
    End {
        notify_debugger: bool,
        reply: oneshot::Sender<Result<(), CommandError>>,
    },
}

/// Why the connection stopped
enum Shutdown {
    Ended,
    Failed(CommunicationError),
}

/// Task state for one debugger connection
pub(crate) struct Connection<R, W> {
    lines: Lines<BufReader<R>>,
    writer: W,
    queue: VecDeque<Command>,
    events: broadcast::Sender<DebugEvent>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    /// Tokens of timed out commands whose completion may still show up
    stale_tokens: HashSet<u32>,
    /// Untokened timed out commands whose completion may still show up
    stale_untokened: usize,
    exit_requested: bool,
    /// Later `end` callers, answered with the outcome of the queued `gdb-exit`
    exit_waiters: Vec<oneshot::Sender<ExitResult>>,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(
        reader: R,
        writer: W,
        events: broadcast::Sender<DebugEvent>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            queue: VecDeque::new(),
            events,
            timeout,
            deadline: None,
            stale_tokens: HashSet::new(),
            stale_untokened: 0,
            exit_requested: false,
            exit_waiters: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        log::debug!("Debugger connection started");

        let reason = loop {
            let deadline = self.deadline;

            let flow = tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    // Every session handle is gone
                    None => ControlFlow::Break(Shutdown::Ended),
                },
                line = self.lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_line(line).await,
                    Ok(None) => {
                        log::debug!("Debugger output: EOF reached");
                        ControlFlow::Break(Shutdown::Failed(CommunicationError::DebuggerExited))
                    }
                    Err(e) => {
                        log::error!("Debugger output read error: {}", e);
                        ControlFlow::Break(Shutdown::Failed(CommunicationError::Io(e)))
                    }
                },
                _ = async {
                    match deadline {
                        Some(deadline) => sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => self.expire_head().await,
            };

            if let ControlFlow::Break(reason) = flow {
                break reason;
            }
        };

        requests.close();
        self.shutdown(reason).await;

        // Requests that raced the shutdown get the same answer as late callers
        while let Ok(request) = requests.try_recv() {
            match request {
                Request::Enqueue(command) => {
                    command.reject(CommunicationError::SessionEnded.into());
                }
                Request::End { reply, .. } => {
                    let _ = reply.send(Ok(()));
                }
            }
        }

        log::debug!("Debugger connection finished");
    }

    async fn handle_request(&mut self, request: Request) -> ControlFlow<Shutdown> {
        match request {
            Request::Enqueue(command) => {
                if self.exit_requested {
                    command.reject(CommunicationError::SessionEnded.into());
                    return ControlFlow::Continue(());
                }
                self.enqueue(command).await
            }
            Request::End {
                notify_debugger,
                reply,
            } => {
                if !notify_debugger {
                    let _ = reply.send(Ok(()));
                    return ControlFlow::Break(Shutdown::Ended);
                }

                if self.exit_requested {
                    self.exit_waiters.push(reply);
                    return ControlFlow::Continue(());
                }

                self.exit_requested = true;
                self.enqueue(Command {
                    token: None,
                    text: commands::gdb_exit(),
                    mode: CommandMode::Normal,
                    completion: Completion::Exit(reply),
                })
                .await
            }
        }
    }

    async fn enqueue(&mut self, command: Command) -> ControlFlow<Shutdown> {
        log::debug!("QUEUE: {} (pending: {})", command.text, self.queue.len());
        self.queue.push_back(command);

        if self.queue.len() == 1 {
            self.write_head().await
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Write the command at the head of the queue, if any
    async fn write_head(&mut self) -> ControlFlow<Shutdown> {
        let Some(command) = self.queue.front() else {
            return ControlFlow::Continue(());
        };

        let wire_text = command.wire_text();
        match command.token {
            Some(token) => log::debug!("SEND[{}]: {}", token, command.text),
            None => log::debug!("SEND: {}", command.text),
        }

        let written = async {
            self.writer.write_all(wire_text.as_bytes()).await?;
            self.writer.flush().await
        }
        .await;

        if let Err(e) = written {
            log::error!("Failed to write command: {}", e);
            return ControlFlow::Break(Shutdown::Failed(CommunicationError::Io(e)));
        }

        self.deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        ControlFlow::Continue(())
    }

    async fn handle_line(&mut self, line: String) -> ControlFlow<Shutdown> {
        let line = line.trim_end_matches('\r');

        if line.trim().is_empty() || is_prompt(line) {
            return ControlFlow::Continue(());
        }

        if let Some(Command {
            mode: CommandMode::Raw { lines },
            ..
        }) = self.queue.front_mut()
        {
            if line.trim() != "^done" {
                log::trace!("RAW: {}", line);
                lines.push(line.to_string());
                return ControlFlow::Continue(());
            }

            let lines = std::mem::take(lines);
            return self.complete_head(Ok(Response::Lines(lines))).await;
        }

        let record = match parse_record(line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("{}", e);
                self.emit(DebugEvent::UnparsedOutput(line.to_string()));
                return ControlFlow::Continue(());
            }
        };

        let kind = record.kind();
        log::trace!("RECV {:?}: {}", kind, line);

        match (kind, record) {
            (_, Record::Result(record)) => self.handle_result(record).await,
            (RecordKind::AsyncExec, Record::Async(record)) => {
                for event in translate_exec(&record) {
                    self.emit(event);
                }
                ControlFlow::Continue(())
            }
            (RecordKind::AsyncNotify, Record::Async(record)) => {
                if let Some(event) = translate_notify(&record) {
                    self.emit(event);
                }
                ControlFlow::Continue(())
            }
            (_, Record::Async(record)) => {
                log::debug!("STATUS: {}", record.class.name());
                ControlFlow::Continue(())
            }
            (_, Record::Stream(record)) => {
                self.emit(translate_stream(record));
                ControlFlow::Continue(())
            }
        }
    }

    async fn handle_result(&mut self, record: ResultRecord) -> ControlFlow<Shutdown> {
        match record.token {
            Some(token) if self.stale_tokens.remove(&token) => {
                log::debug!("RECV[{}]: discarding late response", token);
                return ControlFlow::Continue(());
            }
            None if self.stale_untokened > 0 => {
                self.stale_untokened -= 1;
                log::debug!("RECV: discarding late response");
                return ControlFlow::Continue(());
            }
            _ => {}
        }

        let Some(head) = self.queue.front() else {
            log::warn!("RECV: {:?} with no command pending", record.class);
            return ControlFlow::Continue(());
        };

        if record.token.is_some() && record.token != head.token {
            log::warn!(
                "RECV[{:?}]: token doesn't match pending command {:?}",
                record.token,
                head.token
            );
        }

        let result = match record.class {
            ResultClass::Error => {
                let message = string_field(&record.results, "msg")
                    .unwrap_or_else(|| "Unknown error".to_string());
                log::debug!("RECV[{:?}]: ERROR -> {}", record.token, message);

                Err(CommandFailedError {
                    message,
                    code: string_field(&record.results, "code"),
                    command: head.text.clone(),
                    token: head.token,
                }
                .into())
            }
            class => {
                log::debug!("RECV[{:?}]: {:?}", record.token, class);
                Ok(Response::Results(record.results))
            }
        };

        self.complete_head(result).await
    }

    /// Pop the head with `result` and move on to the next command
    async fn complete_head(&mut self, result: CommandResult) -> ControlFlow<Shutdown> {
        let Some(command) = self.queue.pop_front() else {
            return ControlFlow::Continue(());
        };
        self.deadline = None;

        match command.completion {
            Completion::Caller(reply) => {
                let _ = reply.send(result);
            }
            Completion::Exit(reply) => {
                let outcome = result.map(|_| ());
                self.settle_exit_waiters(&outcome);
                let _ = reply.send(outcome);
                return ControlFlow::Break(Shutdown::Ended);
            }
        }

        self.write_head().await
    }

    async fn expire_head(&mut self) -> ControlFlow<Shutdown> {
        self.deadline = None;

        let Some(command) = self.queue.pop_front() else {
            return ControlFlow::Continue(());
        };

        log::warn!("Command '{}' timed out", command.text);

        match command.token {
            Some(token) => {
                self.stale_tokens.insert(token);
            }
            None => self.stale_untokened += 1,
        }

        let is_exit = matches!(command.completion, Completion::Exit(_));
        let error = CommandError::TimedOut {
            command: command.text.clone(),
            token: command.token,
        };

        if is_exit {
            let outcome = Err(error);
            self.settle_exit_waiters(&outcome);
            if let Completion::Exit(reply) = command.completion {
                let _ = reply.send(outcome);
            }
            return ControlFlow::Break(Shutdown::Ended);
        }

        command.reject(error);

        self.write_head().await
    }

    fn settle_exit_waiters(&mut self, outcome: &ExitResult) {
        for reply in self.exit_waiters.drain(..) {
            let _ = reply.send(duplicate_outcome(outcome));
        }
    }

    fn emit(&self, event: DebugEvent) {
        log::trace!("EVENT: {}", event.name());
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn shutdown(&mut self, reason: Shutdown) {
        let error = match reason {
            Shutdown::Ended => CommunicationError::SessionEnded,
            Shutdown::Failed(e) => e,
        };

        if !self.queue.is_empty() {
            log::debug!("Rejecting {} pending command(s): {}", self.queue.len(), error);
        }

        // The session going away is what gdb-exit asked for
        let exit_outcome: ExitResult = match error {
            CommunicationError::Io(_) => Err(error.duplicate().into()),
            _ => Ok(()),
        };

        for command in self.queue.drain(..) {
            match command.completion {
                Completion::Exit(reply) => {
                    let _ = reply.send(duplicate_outcome(&exit_outcome));
                }
                _ => command.reject(error.duplicate().into()),
            }
        }
        self.settle_exit_waiters(&exit_outcome);

        if let Err(e) = self.writer.shutdown().await {
            log::debug!("Closing debugger input failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(token: Option<u32>, text: &str, mode: CommandMode) -> (Command, oneshot::Receiver<CommandResult>) {
        let (reply, receiver) = oneshot::channel();
        (
            Command {
                token,
                text: text.to_string(),
                mode,
                completion: Completion::Caller(reply),
            },
            receiver,
        )
    }

    #[test]
    fn test_wire_text() {
        let (tokened, _rx) = command(Some(7), "break-list", CommandMode::Normal);
        assert_eq!(tokened.wire_text(), "7-break-list\n");

        let (untokened, _rx) = command(None, "exec-run", CommandMode::Normal);
        assert_eq!(untokened.wire_text(), "-exec-run\n");

        let (raw, _rx) = command(Some(3), "fr v -T -D1", CommandMode::Raw { lines: Vec::new() });
        assert_eq!(raw.wire_text(), "fr v -T -D1\n");
    }

    #[test]
    fn test_duplicate_keeps_io_kind() {
        let error = CommunicationError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe closed",
        ));

        match error.duplicate() {
            CommunicationError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe);
                assert!(e.to_string().contains("pipe closed"));
            }
            other => panic!("Unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_outcome_keeps_error_kind() {
        assert!(duplicate_outcome(&Ok(())).is_ok());

        let timed_out: ExitResult = Err(CommandError::TimedOut {
            command: "gdb-exit".to_string(),
            token: None,
        });
        match duplicate_outcome(&timed_out) {
            Err(CommandError::TimedOut { command, token: None }) => assert_eq!(command, "gdb-exit"),
            other => panic!("Unexpected outcome {:?}", other),
        }

        let ended: ExitResult = Err(CommunicationError::DebuggerExited.into());
        assert!(matches!(
            duplicate_outcome(&ended),
            Err(CommandError::Communication(CommunicationError::DebuggerExited))
        ));
    }

    #[tokio::test]
    async fn test_rejected_command_reports_error() {
        let (cmd, rx) = command(None, "exec-run", CommandMode::Normal);
        cmd.reject(CommunicationError::SessionEnded.into());

        match rx.await.unwrap() {
            Err(CommandError::Communication(CommunicationError::SessionEnded)) => {}
            other => panic!("Unexpected result {:?}", other),
        }
    }
}
