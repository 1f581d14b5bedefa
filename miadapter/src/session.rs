/// High level debugger session
///
/// `DebugSession` is a cheap handle to the task that owns the debugger's
/// streams. Every operation builds an MI command, queues it behind whatever
/// is already pending and converts the result record into a value object.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::commands::{self, *};
use crate::communication::{
    Command, CommandMode, CommunicationError, Completion, Connection, Request,
};
use crate::config::{DebuggerKind, SessionConfig};
use crate::events::DebugEvent;
use crate::extract;
use crate::raw;
use crate::types::*;

/// Requests buffered between the handles and the connection task
const REQUEST_BUFFER: usize = 64;

fn results_of(response: &Response) -> std::result::Result<&Tuple, MalformedResponseError> {
    response
        .results()
        .ok_or_else(|| MalformedResponseError::new("Expected a result record.", &response.lines()))
}

fn raw_lines(response: Response) -> std::result::Result<Vec<String>, MalformedResponseError> {
    match response {
        Response::Lines(lines) => Ok(lines),
        Response::Results(results) => Err(MalformedResponseError::new(
            "Expected raw output lines.",
            &results,
        )),
    }
}

#[derive(Clone)]
pub struct DebugSession {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<DebugEvent>,
    finished: watch::Receiver<bool>,
    token_counter: Arc<AtomicU32>,
    auto_token: bool,
    debugger: DebuggerKind,
    pid: Option<u32>,
}

impl DebugSession {
    /// Start a session over the debugger's output (`reader`) and input (`writer`)
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_config(reader, writer, DebuggerKind::default(), &SessionConfig::default())
    }

    pub fn with_config<R, W>(
        reader: R,
        writer: W,
        debugger: DebuggerKind,
        config: &SessionConfig,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (requests, receiver) = mpsc::channel(REQUEST_BUFFER);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (finished_tx, finished) = watch::channel(false);

        let connection = Connection::new(reader, writer, events.clone(), config.command_timeout());
        tokio::spawn(async move {
            connection.run(receiver).await;
            let _ = finished_tx.send(true);
        });

        Self {
            requests,
            events,
            finished,
            token_counter: Arc::new(AtomicU32::new(1)),
            auto_token: config.auto_token,
            debugger,
            pid: None,
        }
    }

    pub(crate) fn set_pid(&mut self, pid: Option<u32>) {
        self.pid = pid;
    }

    /// Process id of the debugger, when it was spawned by this crate
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn debugger(&self) -> DebuggerKind {
        self.debugger
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DebugEvent> {
        self.events.subscribe()
    }

    /// True once the session has been torn down
    pub fn is_ended(&self) -> bool {
        *self.finished.borrow()
    }

    /// Wait until the session has been torn down
    pub async fn closed(&self) {
        let mut finished = self.finished.clone();
        while !*finished.borrow_and_update() {
            if finished.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn downgrade(&self) -> WeakDebugSession {
        WeakDebugSession {
            requests: self.requests.downgrade(),
            finished: self.finished.clone(),
        }
    }

    fn next_token(&self, token: Option<u32>) -> Option<u32> {
        token.or_else(|| {
            self.auto_token
                .then(|| self.token_counter.fetch_add(1, Ordering::SeqCst))
        })
    }

    async fn submit(&self, text: &str, token: Option<u32>, mode: CommandMode) -> Result<Response> {
        let (reply, receiver) = oneshot::channel();
        let command = Command {
            token,
            text: text.to_string(),
            mode,
            completion: Completion::Caller(reply),
        };

        self.requests
            .send(Request::Enqueue(command))
            .await
            .map_err(|_| CommunicationError::SessionEnded)?;

        receiver.await.map_err(|_| CommunicationError::SessionEnded)?
    }

    /// Run an MI command (without the leading dash), ignoring its results
    pub async fn execute_command(&self, command: &str, token: Option<u32>) -> Result<()> {
        self.submit(command, self.next_token(token), CommandMode::Normal)
            .await
            .map(|_| ())
    }

    /// Run an MI command and convert its response with `transform`
    pub async fn get_command_output<T, F>(
        &self,
        command: &str,
        token: Option<u32>,
        transform: F,
    ) -> Result<T>
    where
        F: FnOnce(Response) -> std::result::Result<T, MalformedResponseError>,
    {
        let token = self.next_token(token);
        let response = self.submit(command, token, CommandMode::Normal).await?;

        transform(response).map_err(|e| e.with_command(command, token).into())
    }

    /// Run a CLI command and convert the lines it printed before `^done`
    pub async fn raw_command_output<T, F>(&self, command: &str, transform: F) -> Result<T>
    where
        F: FnOnce(Vec<String>) -> std::result::Result<T, MalformedResponseError>,
    {
        let response = self
            .submit(command, None, CommandMode::Raw { lines: Vec::new() })
            .await?;

        raw_lines(response)
            .and_then(transform)
            .map_err(|e| e.with_command(command, None).into())
    }

    /// Shorthand for commands whose payload comes from one extraction helper
    async fn query<T>(
        &self,
        command: &str,
        extract: fn(&Tuple) -> std::result::Result<T, MalformedResponseError>,
    ) -> Result<T> {
        self.get_command_output(command, None, |response| extract(results_of(&response)?))
            .await
    }

    /// Tear the session down
    ///
    /// With `notify_debugger` the debugger is asked to exit first (after any
    /// commands already queued) and this resolves once it has acknowledged.
    /// Otherwise teardown is immediate. Calling this again is a no-op.
    pub async fn end(&self, notify_debugger: bool) -> Result<()> {
        let (reply, receiver) = oneshot::channel();

        let sent = self
            .requests
            .send(Request::End {
                notify_debugger,
                reply,
            })
            .await;

        if sent.is_err() {
            return Ok(());
        }

        receiver.await.unwrap_or(Ok(()))
    }

    //
    // Inferior setup
    //

    pub async fn set_executable_file(&self, file: &str) -> Result<()> {
        self.execute_command(&commands::file_exec_and_symbols(file), None).await
    }

    /// Route the inferior's terminal IO through the given tty
    pub async fn set_inferior_terminal(&self, slave_name: &str) -> Result<()> {
        self.execute_command(&commands::inferior_tty_set(slave_name), None).await
    }

    pub async fn connect_to_remote_target(&self, host: &str, port: u16) -> Result<()> {
        self.execute_command(&commands::target_select_remote(host, port), None).await
    }

    pub async fn set_inferior_arguments(&self, args: &str) -> Result<()> {
        self.execute_command(&commands::exec_arguments(args), None).await
    }

    //
    // Breakpoints
    //

    /// Add a breakpoint at `location`: `file:line`, a function name or `*address`
    pub async fn add_breakpoint(
        &self,
        location: &str,
        options: &BreakpointOptions,
    ) -> Result<BreakpointInfo> {
        self.query(&commands::break_insert(location, options), extract::extract_breakpoint_info)
            .await
    }

    pub async fn remove_breakpoint(&self, id: u32) -> Result<()> {
        self.remove_breakpoints(&[id]).await
    }

    /// An empty id list sends nothing
    pub async fn remove_breakpoints(&self, ids: &[u32]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.execute_command(&commands::break_delete(ids), None).await
    }

    pub async fn enable_breakpoint(&self, id: u32) -> Result<()> {
        self.enable_breakpoints(&[id]).await
    }

    pub async fn enable_breakpoints(&self, ids: &[u32]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.execute_command(&commands::break_enable(ids), None).await
    }

    pub async fn disable_breakpoint(&self, id: u32) -> Result<()> {
        self.disable_breakpoints(&[id]).await
    }

    pub async fn disable_breakpoints(&self, ids: &[u32]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.execute_command(&commands::break_disable(ids), None).await
    }

    /// Skip the next `ignore_count` hits of a breakpoint
    pub async fn ignore_breakpoint(&self, id: u32, ignore_count: u32) -> Result<BreakpointInfo> {
        self.query(&commands::break_after(id, ignore_count), extract::extract_breakpoint_info)
            .await
    }

    pub async fn set_breakpoint_condition(&self, id: u32, condition: &str) -> Result<()> {
        self.execute_command(&commands::break_condition(id, condition), None).await
    }

    pub async fn list_breakpoints(&self) -> Result<Vec<BreakpointInfo>> {
        self.query(&commands::break_list(), extract::extract_breakpoint_table).await
    }

    //
    // Execution control
    //
    // These resolve once the debugger has accepted the command; the
    // outcome arrives later as a `TargetStopped` event.
    //

    pub async fn start_inferior(&self, options: &StartOptions) -> Result<()> {
        self.execute_command(&commands::exec_run(options), None).await
    }

    pub async fn start_all_inferiors(&self, stop_at_start: bool) -> Result<()> {
        self.execute_command(&commands::exec_run_all(stop_at_start), None).await
    }

    pub async fn abort_inferior(&self) -> Result<()> {
        self.execute_command(&commands::exec_abort(), None).await
    }

    pub async fn resume_inferior(&self, options: &ResumeOptions) -> Result<()> {
        self.execute_command(&commands::exec_continue(options), None).await
    }

    pub async fn resume_all_inferiors(&self, reverse: bool) -> Result<()> {
        self.execute_command(&commands::exec_continue_all(reverse), None).await
    }

    pub async fn interrupt_inferior(&self, thread_group: Option<&str>) -> Result<()> {
        self.execute_command(&commands::exec_interrupt(thread_group), None).await
    }

    pub async fn interrupt_all_inferiors(&self) -> Result<()> {
        self.execute_command(&commands::exec_interrupt_all(), None).await
    }

    pub async fn step_into_line(&self, options: &ExecOptions) -> Result<()> {
        self.execute_command(&commands::exec_stepping("exec-step", options), None).await
    }

    pub async fn step_over_line(&self, options: &ExecOptions) -> Result<()> {
        self.execute_command(&commands::exec_stepping("exec-next", options), None).await
    }

    pub async fn step_into_instruction(&self, options: &ExecOptions) -> Result<()> {
        self.execute_command(&commands::exec_stepping("exec-step-instruction", options), None)
            .await
    }

    pub async fn step_over_instruction(&self, options: &ExecOptions) -> Result<()> {
        self.execute_command(&commands::exec_stepping("exec-next-instruction", options), None)
            .await
    }

    pub async fn step_out(&self, options: &ExecOptions) -> Result<()> {
        self.execute_command(&commands::exec_stepping("exec-finish", options), None).await
    }

    //
    // Stack inspection
    //

    pub async fn get_stack_frame(&self, selector: &FrameSelector) -> Result<StackFrameInfo> {
        self.query(&commands::stack_info_frame(selector), |data| {
            let frame = extract::required(data, "frame")?
                .as_tuple()
                .ok_or_else(|| MalformedResponseError::new("Expected \"frame\" to be a tuple.", data))?;
            extract::extract_stack_frame_info(frame)
        })
        .await
    }

    pub async fn get_stack_depth(&self, options: &StackDepthOptions) -> Result<u32> {
        self.query(&commands::stack_info_depth(options), |data| {
            extract::required_number(data, "depth")
        })
        .await
    }

    pub async fn get_stack_frames(
        &self,
        options: &StackFramesOptions,
    ) -> Result<Vec<StackFrameInfo>> {
        self.query(&commands::stack_list_frames(options), extract::extract_stack_frames)
            .await
    }

    pub async fn get_stack_frame_args(
        &self,
        detail: VariableDetailLevel,
        options: &StackArgsOptions,
    ) -> Result<Vec<StackFrameArgsInfo>> {
        self.query(
            &commands::stack_list_arguments(detail, options),
            extract::extract_stack_frame_args,
        )
        .await
    }

    pub async fn get_stack_frame_variables(
        &self,
        detail: VariableDetailLevel,
        options: &StackVariablesOptions,
    ) -> Result<StackFrameVariablesInfo> {
        self.query(
            &commands::stack_list_variables(detail, options),
            extract::extract_stack_frame_variables,
        )
        .await
    }

    //
    // Watches (variable objects)
    //

    pub async fn add_watch(&self, expression: &str, options: &WatchOptions) -> Result<WatchInfo> {
        self.query(&commands::var_create(expression, options), extract::extract_watch_info)
            .await
    }

    pub async fn remove_watch(&self, id: &str) -> Result<()> {
        self.execute_command(&commands::var_delete(id), None).await
    }

    pub async fn update_watch(
        &self,
        id: &str,
        detail: Option<VariableDetailLevel>,
    ) -> Result<Vec<WatchUpdateInfo>> {
        self.query(&commands::var_update(id, detail), extract::extract_watch_updates)
            .await
    }

    pub async fn get_watch_children(
        &self,
        id: &str,
        options: &WatchChildrenOptions,
    ) -> Result<Vec<WatchChildInfo>> {
        self.query(&commands::var_list_children(id, options), extract::extract_watch_children)
            .await
    }

    /// Change how a watch is formatted, returning the reformatted value
    pub async fn set_watch_value_format(&self, id: &str, format: WatchFormatSpec) -> Result<String> {
        self.query(&commands::var_set_format(id, format), extract::extract_formatted_value)
            .await
    }

    pub async fn get_watch_value(&self, id: &str, format: Option<WatchFormatSpec>) -> Result<String> {
        self.query(&commands::var_evaluate_expression(id, format), |data| {
            extract::required_string(data, "value")
        })
        .await
    }

    /// Assign `expression` to a watch, returning its new value
    pub async fn set_watch_value(&self, id: &str, expression: &str) -> Result<String> {
        self.query(&commands::var_assign(id, expression), |data| {
            extract::required_string(data, "value")
        })
        .await
    }

    pub async fn get_watch_attributes(&self, id: &str) -> Result<Vec<WatchAttribute>> {
        self.query(&commands::var_show_attributes(id), extract::extract_watch_attributes)
            .await
    }

    /// Expression that evaluates to the watched member, e.g. `((parent).child)`
    pub async fn get_watch_expression(&self, id: &str) -> Result<String> {
        self.query(&commands::var_info_path_expression(id), |data| {
            extract::required_string(data, "path_expr")
        })
        .await
    }

    //
    // Data
    //

    pub async fn evaluate_expression(
        &self,
        expression: &str,
        selector: &FrameSelector,
    ) -> Result<String> {
        self.query(&commands::data_evaluate_expression(expression, selector), |data| {
            extract::required_string(data, "value")
        })
        .await
    }

    /// Read `count` bytes at `address`, skipping regions that can't be read
    pub async fn read_memory(
        &self,
        address: &str,
        count: u64,
        byte_offset: Option<i64>,
    ) -> Result<Vec<MemoryBlock>> {
        self.query(
            &commands::data_read_memory_bytes(address, count, byte_offset),
            extract::extract_memory_blocks,
        )
        .await
    }

    pub async fn get_register_names(&self, registers: &[u32]) -> Result<Vec<String>> {
        self.query(&commands::data_list_register_names(registers), extract::extract_register_names)
            .await
    }

    pub async fn get_register_values(
        &self,
        format: RegisterValueFormatSpec,
        options: &RegisterValueOptions,
    ) -> Result<BTreeMap<u32, String>> {
        self.query(
            &commands::data_list_register_values(format, options),
            extract::extract_register_values,
        )
        .await
    }

    //
    // Disassembly
    //

    pub async fn disassemble_address_range(
        &self,
        start: &str,
        end: &str,
        show_opcodes: bool,
    ) -> Result<Vec<AsmInstruction>> {
        self.query(
            &commands::data_disassemble_range(start, end, false, show_opcodes),
            extract::extract_asm_instructions,
        )
        .await
    }

    pub async fn disassemble_address_range_by_line(
        &self,
        start: &str,
        end: &str,
        show_opcodes: bool,
    ) -> Result<Vec<SourceLineAsm>> {
        self.query(
            &commands::data_disassemble_range(start, end, true, show_opcodes),
            extract::extract_asm_by_source_line,
        )
        .await
    }

    pub async fn disassemble_file(
        &self,
        filename: &str,
        line: u32,
        options: &DisassembleOptions,
    ) -> Result<Vec<AsmInstruction>> {
        self.query(
            &commands::data_disassemble_file(filename, line, false, options),
            extract::extract_asm_instructions,
        )
        .await
    }

    pub async fn disassemble_file_by_line(
        &self,
        filename: &str,
        line: u32,
        options: &DisassembleOptions,
    ) -> Result<Vec<SourceLineAsm>> {
        self.query(
            &commands::data_disassemble_file(filename, line, true, options),
            extract::extract_asm_by_source_line,
        )
        .await
    }

    //
    // Threads
    //

    pub async fn get_thread(&self, id: u32) -> Result<ThreadInfo> {
        self.query(&commands::thread_info(Some(id)), extract::extract_single_thread)
            .await
    }

    pub async fn get_threads(&self) -> Result<MultiThreadInfo> {
        self.query(&commands::thread_info(None), extract::extract_threads).await
    }

    //
    // LLDB CLI listings
    //

    pub async fn get_global_variables(&self) -> Result<Vec<VariableInfo>> {
        self.raw_command_output(&commands::target_variables(), |lines| {
            Ok(raw::parse_global_variables(&lines))
        })
        .await
    }

    /// Variables of the selected frame
    pub async fn get_frame_variables(&self) -> Result<Vec<VariableInfo>> {
        self.raw_command_output(&commands::frame_variables(), |lines| {
            Ok(raw::parse_variables(&lines))
        })
        .await
    }

    /// A variable of the selected frame with two levels of members
    pub async fn get_variable_content(&self, name: &str) -> Result<Vec<VariableInfo>> {
        self.raw_command_output(&commands::variable_content(name), |lines| {
            Ok(raw::parse_variables(&lines))
        })
        .await
    }

    /// LLDB reports stepping out of a function as an ordinary step
    pub fn can_emit_function_finished_notification(&self) -> bool {
        self.debugger == DebuggerKind::Gdb
    }
}

/// Handle that doesn't keep the session alive
pub(crate) struct WeakDebugSession {
    requests: mpsc::WeakSender<Request>,
    finished: watch::Receiver<bool>,
}

impl WeakDebugSession {
    /// Tear the session down without notifying the debugger, if still running
    pub(crate) async fn end(&self) {
        let Some(requests) = self.requests.upgrade() else {
            return;
        };

        let (reply, receiver) = oneshot::channel();
        let request = Request::End {
            notify_debugger: false,
            reply,
        };

        if requests.send(request).await.is_ok() {
            let _ = receiver.await;
        }
    }

    pub(crate) async fn closed(&mut self) {
        while !*self.finished.borrow_and_update() {
            if self.finished.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_lines_accepts_only_collected_lines() {
        let lines = raw_lines(Response::Lines(vec!["(int) x = 1".to_string()])).unwrap();
        assert_eq!(lines, vec!["(int) x = 1"]);

        let mut results = Tuple::new();
        results.insert("depth".to_string(), Value::String("1".to_string()));
        let err = raw_lines(Response::Results(results)).unwrap_err();
        assert_eq!(err.message, "Expected raw output lines.");
        assert!(err.response.contains("depth"));
    }
}
