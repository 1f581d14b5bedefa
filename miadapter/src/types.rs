/// MI record and domain types
///
/// This module defines the records produced by the output parser and the
/// value objects the extraction helpers build out of their payloads.

use serde::Serialize;
use std::collections::HashMap;

/// Key/value payload of a record, tuple or list of results
pub type Tuple = HashMap<String, Value>;

/// One parsed line of debugger output
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Result(ResultRecord),
    Async(AsyncRecord),
    Stream(StreamRecord),
}

impl Record {
    /// Classify the record into the closed set of record kinds
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Result(result) => match result.class {
                ResultClass::Done => RecordKind::Done,
                ResultClass::Running => RecordKind::Running,
                ResultClass::Connected => RecordKind::Connected,
                ResultClass::Error => RecordKind::Error,
                ResultClass::Exit => RecordKind::Exit,
            },
            Record::Async(record) => match record.kind {
                AsyncKind::Exec => RecordKind::AsyncExec,
                AsyncKind::Status => RecordKind::AsyncStatus,
                AsyncKind::Notify => RecordKind::AsyncNotify,
            },
            Record::Stream(stream) => match stream.stream_type {
                StreamType::Console => RecordKind::ConsoleOutput,
                StreamType::Target => RecordKind::TargetOutput,
                StreamType::Log => RecordKind::LogOutput,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Done,
    Running,
    Connected,
    Error,
    Exit,
    AsyncExec,
    AsyncStatus,
    AsyncNotify,
    ConsoleOutput,
    TargetOutput,
    LogOutput,
}

/// Represents an MI result record
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub token: Option<u32>,
    pub class: ResultClass,
    pub results: Tuple,
}

/// MI result classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

/// Represents an MI async record
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncRecord {
    pub token: Option<u32>,
    pub kind: AsyncKind,
    pub class: AsyncClass,
    pub results: Tuple,
}

/// Prefix of an async record: `*` exec, `+` status, `=` notify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    Exec,
    Status,
    Notify,
}

/// MI async classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncClass {
    // Exec async records
    Running,
    Stopped,

    // Notify async records
    ThreadGroupAdded,
    ThreadGroupRemoved,
    ThreadGroupStarted,
    ThreadGroupExited,
    ThreadCreated,
    ThreadExited,
    ThreadSelected,
    LibraryLoaded,
    LibraryUnloaded,
    BreakpointCreated,
    BreakpointModified,
    BreakpointDeleted,
    CmdParamChanged,
    MemoryChanged,

    /// Any class name the translator has no mapping for
    Other(String),
}

impl AsyncClass {
    pub fn from_name(name: &str) -> Self {
        match name {
            "running" => AsyncClass::Running,
            "stopped" => AsyncClass::Stopped,
            "thread-group-added" => AsyncClass::ThreadGroupAdded,
            "thread-group-removed" => AsyncClass::ThreadGroupRemoved,
            "thread-group-started" => AsyncClass::ThreadGroupStarted,
            "thread-group-exited" => AsyncClass::ThreadGroupExited,
            "thread-created" => AsyncClass::ThreadCreated,
            "thread-exited" => AsyncClass::ThreadExited,
            "thread-selected" => AsyncClass::ThreadSelected,
            "library-loaded" => AsyncClass::LibraryLoaded,
            "library-unloaded" => AsyncClass::LibraryUnloaded,
            "breakpoint-created" => AsyncClass::BreakpointCreated,
            "breakpoint-modified" => AsyncClass::BreakpointModified,
            "breakpoint-deleted" => AsyncClass::BreakpointDeleted,
            "cmd-param-changed" => AsyncClass::CmdParamChanged,
            "memory-changed" => AsyncClass::MemoryChanged,
            other => AsyncClass::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AsyncClass::Running => "running",
            AsyncClass::Stopped => "stopped",
            AsyncClass::ThreadGroupAdded => "thread-group-added",
            AsyncClass::ThreadGroupRemoved => "thread-group-removed",
            AsyncClass::ThreadGroupStarted => "thread-group-started",
            AsyncClass::ThreadGroupExited => "thread-group-exited",
            AsyncClass::ThreadCreated => "thread-created",
            AsyncClass::ThreadExited => "thread-exited",
            AsyncClass::ThreadSelected => "thread-selected",
            AsyncClass::LibraryLoaded => "library-loaded",
            AsyncClass::LibraryUnloaded => "library-unloaded",
            AsyncClass::BreakpointCreated => "breakpoint-created",
            AsyncClass::BreakpointModified => "breakpoint-modified",
            AsyncClass::BreakpointDeleted => "breakpoint-deleted",
            AsyncClass::CmdParamChanged => "cmd-param-changed",
            AsyncClass::MemoryChanged => "memory-changed",
            AsyncClass::Other(name) => name,
        }
    }
}

/// Represents an MI stream record
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub stream_type: StreamType,
    pub content: String,
}

/// Types of MI streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Console,  // ~ prefix
    Target,   // @ prefix
    Log,      // & prefix
}

/// Represents values in MI output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    List(Vec<Value>),
    Tuple(Tuple),
}

impl Value {
    /// Get the value as a string, if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as a list, if possible
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Get the value as a tuple, if possible
    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Value::Tuple(tuple) => Some(tuple),
            _ => None,
        }
    }

    /// The value as a sequence of items.
    ///
    /// The protocol sends a plural field as a bare item when there is only one
    /// and as a list otherwise; both shapes come out of here the same way.
    pub fn items(&self) -> Vec<&Value> {
        match self {
            Value::List(list) => list.iter().collect(),
            other => vec![other],
        }
    }

    /// Tuple items of the value, skipping anything that isn't a tuple
    pub fn tuples(&self) -> Vec<&Tuple> {
        self.items().into_iter().filter_map(Value::as_tuple).collect()
    }
}

/// Success payload of a completed command
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Results of a regular MI command
    Results(Tuple),
    /// Lines collected for a raw command, terminator excluded
    Lines(Vec<String>),
}

impl Response {
    pub fn results(&self) -> Option<&Tuple> {
        match self {
            Response::Results(results) => Some(results),
            Response::Lines(_) => None,
        }
    }

    pub fn lines(&self) -> Option<&[String]> {
        match self {
            Response::Lines(lines) => Some(lines),
            Response::Results(_) => None,
        }
    }
}

/// Stop reason for stopped events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    BreakpointHit,
    EndSteppingRange,
    FunctionFinished,
    ExitedNormally,
    SignalReceived,
    ExceptionReceived,
    ExitedSignalled,
    Exited,
    /// Any reason outside the set above; the debugger's vocabulary is open
    Unrecognized,
}

impl StopReason {
    /// Parse a stop reason, mapping unknown text to `Unrecognized`
    pub fn from_reason(s: &str) -> Self {
        match s {
            "breakpoint-hit" => StopReason::BreakpointHit,
            "end-stepping-range" => StopReason::EndSteppingRange,
            "function-finished" => StopReason::FunctionFinished,
            "exited-normally" => StopReason::ExitedNormally,
            "signal-received" => StopReason::SignalReceived,
            "exception-received" => StopReason::ExceptionReceived,
            "exited-signalled" => StopReason::ExitedSignalled,
            "exited" => StopReason::Exited,
            _ => StopReason::Unrecognized,
        }
    }

    /// True for the reasons reported when the inferior terminates
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            StopReason::ExitedNormally | StopReason::ExitedSignalled | StopReason::Exited
        )
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::BreakpointHit => "breakpoint-hit",
            StopReason::EndSteppingRange => "end-stepping-range",
            StopReason::FunctionFinished => "function-finished",
            StopReason::ExitedNormally => "exited-normally",
            StopReason::SignalReceived => "signal-received",
            StopReason::ExceptionReceived => "exception-received",
            StopReason::ExitedSignalled => "exited-signalled",
            StopReason::Exited => "exited",
            StopReason::Unrecognized => "unrecognized",
        };
        write!(f, "{}", s)
    }
}

/// A single location of a breakpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakpointLocationInfo {
    /// `N` for a breakpoint with a single location, `N.M` otherwise
    pub id: String,
    pub is_enabled: Option<bool>,
    pub address: Option<String>,
    pub func: Option<String>,
    pub filename: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
    /// Address and symbol, set when the source file is unknown
    pub at: Option<String>,
}

/// Breakpoint information returned by break-insert, break-after and friends
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakpointInfo {
    pub id: u32,
    pub breakpoint_type: Option<String>,
    pub catchpoint_type: Option<String>,
    pub is_temp: Option<bool>,
    pub is_enabled: Option<bool>,
    /// Empty while the breakpoint is pending
    pub locations: Vec<BreakpointLocationInfo>,
    pub pending: Option<String>,
    pub evaluated_by: Option<String>,
    pub thread_id: Option<u32>,
    pub condition: Option<String>,
    pub ignore_count: Option<u32>,
    pub enable_count: Option<u32>,
    pub mask: Option<String>,
    pub pass_count: Option<u32>,
    pub original_location: Option<String>,
    pub hit_count: Option<u32>,
    pub is_installed: Option<bool>,
    pub what: Option<String>,
}

/// Frame information attached to stop notifications
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FrameInfo {
    pub func: Option<String>,
    pub args: Vec<VariableInfo>,
    pub address: Option<String>,
    pub filename: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
}

/// Frame information returned by the stack commands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackFrameInfo {
    /// Zero for the innermost frame
    pub level: u32,
    pub func: Option<String>,
    pub address: Option<String>,
    pub filename: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
    /// Binary the frame's code address belongs to
    pub from: Option<String>,
}

/// Frame information returned by thread-info
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadFrameInfo {
    pub level: Option<u32>,
    pub func: Option<String>,
    pub args: Vec<VariableInfo>,
    pub address: Option<String>,
    pub filename: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
}

/// A variable or argument, possibly with nested members
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub value: Option<String>,
    pub var_type: Option<String>,
    pub children: Vec<VariableInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackFrameArgsInfo {
    pub level: u32,
    pub args: Vec<VariableInfo>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StackFrameVariablesInfo {
    pub args: Vec<VariableInfo>,
    pub locals: Vec<VariableInfo>,
}

/// A newly created watch (variable object)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchInfo {
    pub id: String,
    pub child_count: Option<u32>,
    pub value: Option<String>,
    pub expression_type: Option<String>,
    pub thread_id: Option<u32>,
    pub has_more_children: bool,
    pub is_dynamic: bool,
    pub display_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchChildInfo {
    #[serde(flatten)]
    pub watch: WatchInfo,
    /// What a front-end should display to identify the child
    pub expression: Option<String>,
    pub is_frozen: bool,
}

/// Change in the state of a watch reported by var-update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchUpdateInfo {
    pub id: String,
    /// Set only when the number of children changed
    pub child_count: Option<u32>,
    pub value: Option<String>,
    /// Set only when the type changed
    pub expression_type: Option<String>,
    pub is_in_scope: bool,
    /// The value is gone for good; the watch should be removed
    pub is_obsolete: bool,
    pub has_type_changed: bool,
    pub is_dynamic: bool,
    pub display_hint: Option<String>,
    pub has_more_children: bool,
    pub new_children: Vec<WatchChildInfo>,
}

/// Output format of a watch value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchFormatSpec {
    Binary,
    Decimal,
    Hexadecimal,
    Octal,
    /// Let the debugger pick based on the expression type
    Default,
}

impl WatchFormatSpec {
    pub fn as_mi(&self) -> &'static str {
        match self {
            WatchFormatSpec::Binary => "binary",
            WatchFormatSpec::Decimal => "decimal",
            WatchFormatSpec::Hexadecimal => "hexadecimal",
            WatchFormatSpec::Octal => "octal",
            WatchFormatSpec::Default => "natural",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatchAttribute {
    Editable,
    NonEditable,
}

impl WatchAttribute {
    pub fn from_mi(s: &str) -> Option<Self> {
        match s {
            "editable" => Some(WatchAttribute::Editable),
            "noneditable" => Some(WatchAttribute::NonEditable),
            _ => None,
        }
    }
}

/// How much information to retrieve for each variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableDetailLevel {
    /// Names only
    None,
    /// Names and values
    All,
    /// Names and types, values only for simple types
    Simple,
}

impl VariableDetailLevel {
    pub fn as_mi(&self) -> &'static str {
        match self {
            VariableDetailLevel::None => "0",
            VariableDetailLevel::All => "1",
            VariableDetailLevel::Simple => "2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterValueFormatSpec {
    Binary,
    Decimal,
    Hexadecimal,
    Octal,
    Raw,
    Default,
}

impl RegisterValueFormatSpec {
    pub fn as_mi(&self) -> &'static str {
        match self {
            RegisterValueFormatSpec::Binary => "t",
            RegisterValueFormatSpec::Decimal => "d",
            RegisterValueFormatSpec::Hexadecimal => "x",
            RegisterValueFormatSpec::Octal => "o",
            RegisterValueFormatSpec::Raw => "r",
            RegisterValueFormatSpec::Default => "N",
        }
    }
}

/// A block of target memory, as hex literals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryBlock {
    pub begin: String,
    pub end: String,
    /// Offset from the requested start address
    pub offset: Option<String>,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsmInstruction {
    pub address: String,
    pub func: Option<String>,
    /// Offset from the start of `func`, in bytes
    pub offset: Option<u32>,
    pub inst: String,
    pub opcodes: Option<String>,
    pub size: Option<u32>,
}

/// Instructions belonging to one source line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceLineAsm {
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
    pub instructions: Vec<AsmInstruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadInfo {
    /// Debugger-side identifier
    pub id: u32,
    /// Target-side identifier
    pub target_id: Option<String>,
    pub name: Option<String>,
    pub frame: Option<ThreadFrameInfo>,
    pub is_stopped: Option<bool>,
    pub processor_core: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiThreadInfo {
    pub all: Vec<ThreadInfo>,
    pub current: Option<ThreadInfo>,
}
