/// MI command construction
///
/// Every debugger operation is an MI command string built from a few
/// positional arguments plus an options record. Each option that is set
/// appends its flag; options left unset are omitted entirely.

use std::fmt::Display;

use serde::Serialize;

use crate::communication::CommunicationError;
use crate::types::{RegisterValueFormatSpec, VariableDetailLevel, WatchFormatSpec};

pub type Result<T> = std::result::Result<T, CommandError>;

/// The debugger answered a command with an `^error` record
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("'{command}' failed: {message}")]
pub struct CommandFailedError {
    /// Error message sent back by the debugger
    pub message: String,
    /// Optional error code sent back by the debugger
    pub code: Option<String>,
    /// Command text minus the token and dash prefix
    pub command: String,
    pub token: Option<u32>,
}

/// A command succeeded but its payload lacked something the caller needed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Malformed response: {message}")]
pub struct MalformedResponseError {
    pub message: String,
    /// The relevant part of the response, rendered as JSON
    pub response: String,
    pub command: Option<String>,
    pub token: Option<u32>,
}

impl MalformedResponseError {
    pub fn new(message: impl Into<String>, response: &impl Serialize) -> Self {
        Self {
            message: message.into(),
            response: serde_json::to_string(response).unwrap_or_default(),
            command: None,
            token: None,
        }
    }

    /// Attach the command the response belongs to
    pub fn with_command(mut self, command: &str, token: Option<u32>) -> Self {
        self.command.get_or_insert_with(|| command.to_string());
        if self.token.is_none() {
            self.token = token;
        }
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Debugger command failed: {0}")]
    Failed(#[from] CommandFailedError),
    #[error(transparent)]
    Malformed(#[from] MalformedResponseError),
    #[error("No response to '{command}' before the deadline")]
    TimedOut { command: String, token: Option<u32> },
    #[error("Communication error: {0}")]
    Communication(#[from] CommunicationError),
}

/// Incremental builder for a single MI command line
#[derive(Debug, Clone)]
pub(crate) struct CommandLine {
    text: String,
}

impl CommandLine {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            text: name.to_string(),
        }
    }

    pub(crate) fn arg(mut self, arg: impl Display) -> Self {
        self.text.push(' ');
        self.text.push_str(&arg.to_string());
        self
    }

    pub(crate) fn arg_opt(self, arg: Option<impl Display>) -> Self {
        match arg {
            Some(arg) => self.arg(arg),
            None => self,
        }
    }

    pub(crate) fn flag(self, enabled: bool, flag: &str) -> Self {
        if enabled {
            self.arg(flag)
        } else {
            self
        }
    }

    pub(crate) fn option<T: Display>(self, flag: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value),
            None => self,
        }
    }

    pub(crate) fn build(self) -> String {
        self.text
    }
}

/// Quote `text` as a C string
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

/// Quote `text` only when it would otherwise split into several arguments
pub fn quote_if_needed(text: &str) -> String {
    if text.is_empty() || text.chars().any(|c| c.is_whitespace() || c == '"') {
        quote(text)
    } else {
        text.to_string()
    }
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreakpointOptions {
    /// Delete the breakpoint once it has been hit
    pub is_temp: bool,
    pub is_hardware: bool,
    /// Create the breakpoint even if the location can't be resolved yet
    pub is_pending: bool,
    pub is_disabled: bool,
    pub is_tracepoint: bool,
    pub condition: Option<String>,
    pub ignore_count: Option<u32>,
    pub thread_id: Option<u32>,
}

/// Options shared by the stepping commands
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecOptions {
    pub thread_id: Option<u32>,
    pub reverse: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartOptions {
    pub thread_group: Option<String>,
    /// Stop at the start of the main function
    pub stop_at_start: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumeOptions {
    pub thread_group: Option<String>,
    pub reverse: bool,
}

/// Selects the thread and frame a command is evaluated in
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameSelector {
    pub thread_id: Option<u32>,
    /// Requires `thread_id` to be set as well
    pub frame_level: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StackDepthOptions {
    pub thread_id: Option<u32>,
    pub max_depth: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StackFramesOptions {
    pub thread_id: Option<u32>,
    pub no_frame_filters: bool,
    /// With only one of `low_frame`/`high_frame` set, only that frame is listed
    pub low_frame: Option<u32>,
    pub high_frame: Option<u32>,
}

/// Inclusive range of frame levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRange {
    pub low: u32,
    pub high: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StackArgsOptions {
    pub thread_id: Option<u32>,
    pub no_frame_filters: bool,
    pub skip_unavailable: bool,
    pub frames: Option<FrameRange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StackVariablesOptions {
    pub thread_id: Option<u32>,
    pub frame_level: Option<u32>,
    pub no_frame_filters: bool,
    pub skip_unavailable: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchOptions {
    /// Auto-generated (`varN`) when unset
    pub id: Option<String>,
    pub thread_id: Option<u32>,
    pub thread_group: Option<String>,
    pub frame_level: Option<u32>,
    pub frame_address: Option<String>,
    /// Re-evaluate in whatever frame is current instead of binding to one
    pub is_floating: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WatchChildrenOptions {
    pub detail: Option<VariableDetailLevel>,
    /// Children `from..to`; both ends must be set to take effect
    pub from: Option<i32>,
    pub to: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterValueOptions {
    pub registers: Vec<u32>,
    pub skip_unavailable: bool,
    pub thread_id: Option<u32>,
    pub frame_level: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DisassembleOptions {
    /// Disassemble the whole function when unset
    pub max_instructions: Option<u32>,
    pub show_opcodes: bool,
}

/// data-disassemble mode for the given output shape
fn disassembly_mode(by_line: bool, show_opcodes: bool) -> u8 {
    match (by_line, show_opcodes) {
        (false, false) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (true, true) => 3,
    }
}

pub fn file_exec_and_symbols(file: &str) -> String {
    CommandLine::new("file-exec-and-symbols").arg(quote_if_needed(file)).build()
}

pub fn inferior_tty_set(slave_name: &str) -> String {
    CommandLine::new("inferior-tty-set").arg(slave_name).build()
}

pub fn target_select_remote(host: &str, port: u16) -> String {
    CommandLine::new("target-select remote").arg(format!("{}:{}", host, port)).build()
}

pub fn exec_arguments(args: &str) -> String {
    CommandLine::new("exec-arguments").arg(args).build()
}

pub fn break_insert(location: &str, options: &BreakpointOptions) -> String {
    CommandLine::new("break-insert")
        .flag(options.is_temp, "-t")
        .flag(options.is_hardware, "-h")
        .flag(options.is_pending, "-f")
        .flag(options.is_disabled, "-d")
        .flag(options.is_tracepoint, "-a")
        .option("-c", options.condition.as_deref().map(quote_if_needed))
        .option("-i", options.ignore_count)
        .option("-p", options.thread_id)
        .arg(location)
        .build()
}

pub fn break_delete(ids: &[u32]) -> String {
    CommandLine::new("break-delete").arg(join_ids(ids)).build()
}

pub fn break_enable(ids: &[u32]) -> String {
    CommandLine::new("break-enable").arg(join_ids(ids)).build()
}

pub fn break_disable(ids: &[u32]) -> String {
    CommandLine::new("break-disable").arg(join_ids(ids)).build()
}

pub fn break_after(id: u32, ignore_count: u32) -> String {
    CommandLine::new("break-after").arg(id).arg(ignore_count).build()
}

pub fn break_condition(id: u32, condition: &str) -> String {
    CommandLine::new("break-condition").arg(id).arg(condition).build()
}

pub fn break_list() -> String {
    "break-list".to_string()
}

pub fn exec_run(options: &StartOptions) -> String {
    CommandLine::new("exec-run")
        .option("--thread-group", options.thread_group.as_deref())
        .flag(options.stop_at_start, "--start")
        .build()
}

pub fn exec_run_all(stop_at_start: bool) -> String {
    CommandLine::new("exec-run --all").flag(stop_at_start, "--start").build()
}

pub fn exec_abort() -> String {
    "exec-abort".to_string()
}

pub fn exec_continue(options: &ResumeOptions) -> String {
    CommandLine::new("exec-continue")
        .option("--thread-group", options.thread_group.as_deref())
        .flag(options.reverse, "--reverse")
        .build()
}

pub fn exec_continue_all(reverse: bool) -> String {
    CommandLine::new("exec-continue --all").flag(reverse, "--reverse").build()
}

pub fn exec_interrupt(thread_group: Option<&str>) -> String {
    CommandLine::new("exec-interrupt").option("--thread-group", thread_group).build()
}

pub fn exec_interrupt_all() -> String {
    "exec-interrupt --all".to_string()
}

/// A stepping command (exec-step, exec-next, exec-finish, ...)
pub fn exec_stepping(command: &str, options: &ExecOptions) -> String {
    CommandLine::new(command)
        .option("--thread", options.thread_id)
        .flag(options.reverse, "--reverse")
        .build()
}

pub fn stack_info_frame(selector: &FrameSelector) -> String {
    CommandLine::new("stack-info-frame")
        .option("--thread", selector.thread_id)
        .option("--frame", selector.frame_level)
        .build()
}

pub fn stack_info_depth(options: &StackDepthOptions) -> String {
    let cmd = CommandLine::new("stack-info-depth").option("--thread", options.thread_id);
    match options.max_depth {
        Some(depth) => cmd.arg(depth).build(),
        None => cmd.build(),
    }
}

pub fn stack_list_frames(options: &StackFramesOptions) -> String {
    let cmd = CommandLine::new("stack-list-frames")
        .option("--thread", options.thread_id)
        .flag(options.no_frame_filters, "--no-frame-filters");

    match (options.low_frame, options.high_frame) {
        (Some(low), Some(high)) => cmd.arg(low).arg(high),
        (Some(level), None) | (None, Some(level)) => cmd.arg(level).arg(level),
        (None, None) => cmd,
    }
    .build()
}

pub fn stack_list_arguments(detail: VariableDetailLevel, options: &StackArgsOptions) -> String {
    let cmd = CommandLine::new("stack-list-arguments")
        .option("--thread", options.thread_id)
        .flag(options.no_frame_filters, "--no-frame-filters")
        .flag(options.skip_unavailable, "--skip-unavailable")
        .arg(detail.as_mi());

    match options.frames {
        Some(range) => cmd.arg(range.low).arg(range.high),
        None => cmd,
    }
    .build()
}

pub fn stack_list_variables(detail: VariableDetailLevel, options: &StackVariablesOptions) -> String {
    CommandLine::new("stack-list-variables")
        .option("--thread", options.thread_id)
        .option("--frame", options.frame_level)
        .flag(options.no_frame_filters, "--no-frame-filters")
        .flag(options.skip_unavailable, "--skip-unavailable")
        .arg(detail.as_mi())
        .build()
}

pub fn var_create(expression: &str, options: &WatchOptions) -> String {
    let id = options.id.as_deref().unwrap_or("-");
    let frame = if options.is_floating {
        "@"
    } else {
        options.frame_address.as_deref().unwrap_or("*")
    };

    CommandLine::new("var-create")
        .option("--thread", options.thread_id)
        .option("--thread-group", options.thread_group.as_deref())
        .option("--frame", options.frame_level)
        .arg(id)
        .arg(frame)
        .arg(expression)
        .build()
}

pub fn var_delete(id: &str) -> String {
    CommandLine::new("var-delete").arg(id).build()
}

pub fn var_update(id: &str, detail: Option<VariableDetailLevel>) -> String {
    CommandLine::new("var-update")
        .arg_opt(detail.map(|d| d.as_mi()))
        .arg(id)
        .build()
}

pub fn var_list_children(id: &str, options: &WatchChildrenOptions) -> String {
    let cmd = CommandLine::new("var-list-children")
        .arg_opt(options.detail.map(|d| d.as_mi()))
        .arg(id);

    match (options.from, options.to) {
        (Some(from), Some(to)) => cmd.arg(from).arg(to),
        _ => cmd,
    }
    .build()
}

pub fn var_set_format(id: &str, format: WatchFormatSpec) -> String {
    CommandLine::new("var-set-format").arg(id).arg(format.as_mi()).build()
}

pub fn var_evaluate_expression(id: &str, format: Option<WatchFormatSpec>) -> String {
    CommandLine::new("var-evaluate-expression")
        .option("-f", format.map(|f| f.as_mi()))
        .arg(id)
        .build()
}

pub fn var_assign(id: &str, expression: &str) -> String {
    CommandLine::new("var-assign").arg(id).arg(quote(expression)).build()
}

pub fn var_show_attributes(id: &str) -> String {
    CommandLine::new("var-show-attributes").arg(id).build()
}

pub fn var_info_path_expression(id: &str) -> String {
    CommandLine::new("var-info-path-expression").arg(id).build()
}

pub fn data_evaluate_expression(expression: &str, selector: &FrameSelector) -> String {
    CommandLine::new("data-evaluate-expression")
        .option("--thread", selector.thread_id)
        .option("--frame", selector.frame_level)
        .arg(quote(expression))
        .build()
}

pub fn data_read_memory_bytes(address: &str, count: u64, byte_offset: Option<i64>) -> String {
    CommandLine::new("data-read-memory-bytes")
        .option("-o", byte_offset)
        .arg(quote(address))
        .arg(count)
        .build()
}

pub fn data_list_register_names(registers: &[u32]) -> String {
    let cmd = CommandLine::new("data-list-register-names");
    if registers.is_empty() {
        cmd.build()
    } else {
        cmd.arg(join_ids(registers)).build()
    }
}

pub fn data_list_register_values(
    format: RegisterValueFormatSpec,
    options: &RegisterValueOptions,
) -> String {
    let cmd = CommandLine::new("data-list-register-values")
        .option("--thread", options.thread_id)
        .option("--frame", options.frame_level)
        .flag(options.skip_unavailable, "--skip-unavailable")
        .arg(format.as_mi());

    if options.registers.is_empty() {
        cmd.build()
    } else {
        cmd.arg(join_ids(&options.registers)).build()
    }
}

pub fn data_disassemble_range(start: &str, end: &str, by_line: bool, show_opcodes: bool) -> String {
    CommandLine::new("data-disassemble")
        .option("-s", Some(start))
        .option("-e", Some(end))
        .arg("--")
        .arg(disassembly_mode(by_line, show_opcodes))
        .build()
}

pub fn data_disassemble_file(
    filename: &str,
    line: u32,
    by_line: bool,
    options: &DisassembleOptions,
) -> String {
    CommandLine::new("data-disassemble")
        .option("-f", Some(filename))
        .option("-l", Some(line))
        .option("-n", options.max_instructions)
        .arg("--")
        .arg(disassembly_mode(by_line, options.show_opcodes))
        .build()
}

pub fn thread_info(thread_id: Option<u32>) -> String {
    CommandLine::new("thread-info").arg_opt(thread_id).build()
}

pub fn gdb_exit() -> String {
    "gdb-exit".to_string()
}

/// LLDB CLI: global variables with types, one level deep
pub fn target_variables() -> String {
    "ta v -T -D1".to_string()
}

/// LLDB CLI: variables of the selected frame with types, one level deep
pub fn frame_variables() -> String {
    "fr v -T -D1".to_string()
}

/// LLDB CLI: a single variable with its members two levels deep
pub fn variable_content(name: &str) -> String {
    format!("fr v -T -D2 {}", name)
}
