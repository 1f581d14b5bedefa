/// Typed events for out-of-band debugger notifications
///
/// Exec and notify async records are translated into `DebugEvent`s here.
/// Stream records pass through as plain text events.

use serde::Serialize;

use crate::extract::{
    decode_stopped_threads, extract_breakpoint_info, extract_frame_info, number_field,
    string_field,
};
use crate::types::{
    AsyncClass, AsyncRecord, BreakpointInfo, FrameInfo, StopReason, StreamRecord, StreamType,
    Tuple, Value,
};

/// Payload of the generic stop event, repeated in every specialized one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStoppedEvent {
    pub reason: StopReason,
    pub thread_id: Option<u32>,
    /// Empty when every thread stopped
    pub stopped_threads: Vec<u32>,
    pub processor_core: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryEvent {
    pub id: Option<String>,
    pub target_name: Option<String>,
    pub host_name: Option<String>,
    pub thread_group: Option<String>,
    pub symbols_path: Option<String>,
    pub load_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum DebugEvent {
    ThreadGroupAdded {
        id: Option<String>,
    },
    ThreadGroupRemoved {
        id: Option<String>,
    },
    ThreadGroupStarted {
        id: Option<String>,
        pid: Option<String>,
    },
    ThreadGroupExited {
        id: Option<String>,
        exit_code: Option<String>,
    },
    ThreadCreated {
        id: Option<u32>,
        group_id: Option<String>,
    },
    ThreadExited {
        id: Option<u32>,
        group_id: Option<String>,
    },
    ThreadSelected {
        id: Option<u32>,
    },
    LibraryLoaded(LibraryEvent),
    LibraryUnloaded(LibraryEvent),
    /// Text from the debugger's own console stream
    ConsoleOutput(String),
    /// Text written by the inferior
    TargetOutput(String),
    /// Debugger diagnostics
    LogOutput(String),
    TargetRunning {
        /// A thread id or `all`
        thread_id: Option<String>,
    },
    TargetStopped(TargetStoppedEvent),
    BreakpointHit {
        stop: TargetStoppedEvent,
        breakpoint_id: Option<u32>,
        frame: FrameInfo,
    },
    StepFinished {
        stop: TargetStoppedEvent,
        frame: FrameInfo,
    },
    FunctionFinished {
        stop: TargetStoppedEvent,
        frame: FrameInfo,
        /// Name of the debugger variable holding the return value (GDB only)
        result_var: Option<String>,
        return_value: Option<String>,
    },
    SignalReceived {
        stop: TargetStoppedEvent,
        signal_code: Option<String>,
        signal_name: Option<String>,
        signal_meaning: Option<String>,
    },
    ExceptionReceived {
        stop: TargetStoppedEvent,
        exception: Option<String>,
    },
    BreakpointModified(BreakpointInfo),
    /// A line the record parser couldn't make sense of
    UnparsedOutput(String),
}

impl DebugEvent {
    /// Stable public name of the event
    pub fn name(&self) -> &'static str {
        match self {
            DebugEvent::ThreadGroupAdded { .. } => "thread-group-added",
            DebugEvent::ThreadGroupRemoved { .. } => "thread-group-removed",
            DebugEvent::ThreadGroupStarted { .. } => "thread-group-started",
            DebugEvent::ThreadGroupExited { .. } => "thread-group-exited",
            DebugEvent::ThreadCreated { .. } => "thread-created",
            DebugEvent::ThreadExited { .. } => "thread-exited",
            DebugEvent::ThreadSelected { .. } => "thread-selected",
            DebugEvent::LibraryLoaded(_) => "library-loaded",
            DebugEvent::LibraryUnloaded(_) => "library-unloaded",
            DebugEvent::ConsoleOutput(_) => "console-output",
            DebugEvent::TargetOutput(_) => "target-output",
            DebugEvent::LogOutput(_) => "log-output",
            DebugEvent::TargetRunning { .. } => "target-running",
            DebugEvent::TargetStopped(_) => "target-stopped",
            DebugEvent::BreakpointHit { .. } => "breakpoint-hit",
            DebugEvent::StepFinished { .. } => "step-finished",
            DebugEvent::FunctionFinished { .. } => "function-finished",
            DebugEvent::SignalReceived { .. } => "signal-received",
            DebugEvent::ExceptionReceived { .. } => "exception-received",
            DebugEvent::BreakpointModified(_) => "breakpoint-modified",
            DebugEvent::UnparsedOutput(_) => "unparsed-output",
        }
    }

    /// The stop payload carried by stop events
    pub fn stop_info(&self) -> Option<&TargetStoppedEvent> {
        match self {
            DebugEvent::TargetStopped(stop)
            | DebugEvent::BreakpointHit { stop, .. }
            | DebugEvent::StepFinished { stop, .. }
            | DebugEvent::FunctionFinished { stop, .. }
            | DebugEvent::SignalReceived { stop, .. }
            | DebugEvent::ExceptionReceived { stop, .. } => Some(stop),
            _ => None,
        }
    }
}

fn frame_of(data: &Tuple) -> FrameInfo {
    data.get("frame")
        .and_then(Value::as_tuple)
        .map(extract_frame_info)
        .unwrap_or_default()
}

/// Events for an exec async record
///
/// `stopped` always yields `TargetStopped` first, followed by at most one
/// specialized event for the stop reason. Exit reasons get no specialized
/// event.
pub fn translate_exec(record: &AsyncRecord) -> Vec<DebugEvent> {
    let data = &record.results;

    match record.class {
        AsyncClass::Running => vec![DebugEvent::TargetRunning {
            thread_id: string_field(data, "thread-id"),
        }],
        AsyncClass::Stopped => {
            let stop = TargetStoppedEvent {
                reason: data
                    .get("reason")
                    .and_then(Value::as_string)
                    .map_or(StopReason::Unrecognized, StopReason::from_reason),
                thread_id: number_field(data, "thread-id"),
                stopped_threads: decode_stopped_threads(data.get("stopped-threads")),
                processor_core: string_field(data, "core"),
            };

            let specialized = match stop.reason {
                StopReason::BreakpointHit => Some(DebugEvent::BreakpointHit {
                    stop: stop.clone(),
                    breakpoint_id: number_field(data, "bkptno"),
                    frame: frame_of(data),
                }),
                StopReason::EndSteppingRange => Some(DebugEvent::StepFinished {
                    stop: stop.clone(),
                    frame: frame_of(data),
                }),
                StopReason::FunctionFinished => Some(DebugEvent::FunctionFinished {
                    stop: stop.clone(),
                    frame: frame_of(data),
                    result_var: string_field(data, "gdb-result-var"),
                    return_value: string_field(data, "return-value"),
                }),
                StopReason::SignalReceived => Some(DebugEvent::SignalReceived {
                    stop: stop.clone(),
                    signal_code: string_field(data, "signal"),
                    signal_name: string_field(data, "signal-name"),
                    signal_meaning: string_field(data, "signal-meaning"),
                }),
                StopReason::ExceptionReceived => Some(DebugEvent::ExceptionReceived {
                    stop: stop.clone(),
                    exception: string_field(data, "exception"),
                }),
                _ => None,
            };

            let mut events = vec![DebugEvent::TargetStopped(stop)];
            events.extend(specialized);
            events
        }
        ref other => {
            log::warn!("Unhandled exec notification: {}", other.name());
            Vec::new()
        }
    }
}

fn library_event(data: &Tuple) -> LibraryEvent {
    LibraryEvent {
        id: string_field(data, "id"),
        target_name: string_field(data, "target-name"),
        host_name: string_field(data, "host-name"),
        thread_group: string_field(data, "thread-group"),
        symbols_path: string_field(data, "symbols-path"),
        load_address: string_field(data, "loaded_addr"),
    }
}

/// Event for a notify async record, `None` for notifications without one
pub fn translate_notify(record: &AsyncRecord) -> Option<DebugEvent> {
    let data = &record.results;

    let event = match &record.class {
        AsyncClass::ThreadGroupAdded => DebugEvent::ThreadGroupAdded {
            id: string_field(data, "id"),
        },
        AsyncClass::ThreadGroupRemoved => DebugEvent::ThreadGroupRemoved {
            id: string_field(data, "id"),
        },
        AsyncClass::ThreadGroupStarted => DebugEvent::ThreadGroupStarted {
            id: string_field(data, "id"),
            pid: string_field(data, "pid"),
        },
        AsyncClass::ThreadGroupExited => DebugEvent::ThreadGroupExited {
            id: string_field(data, "id"),
            exit_code: string_field(data, "exit-code"),
        },
        AsyncClass::ThreadCreated => DebugEvent::ThreadCreated {
            id: number_field(data, "id"),
            group_id: string_field(data, "group-id"),
        },
        AsyncClass::ThreadExited => DebugEvent::ThreadExited {
            id: number_field(data, "id"),
            group_id: string_field(data, "group-id"),
        },
        AsyncClass::ThreadSelected => DebugEvent::ThreadSelected {
            id: number_field(data, "id"),
        },
        AsyncClass::LibraryLoaded => DebugEvent::LibraryLoaded(library_event(data)),
        AsyncClass::LibraryUnloaded => DebugEvent::LibraryUnloaded(library_event(data)),
        AsyncClass::BreakpointModified => match extract_breakpoint_info(data) {
            Ok(breakpoint) => DebugEvent::BreakpointModified(breakpoint),
            Err(e) => {
                log::warn!("Dropping breakpoint-modified notification: {}", e);
                return None;
            }
        },
        other => {
            log::warn!("Unhandled notification: {}", other.name());
            return None;
        }
    };

    Some(event)
}

/// Passthrough event for a stream record
pub fn translate_stream(record: StreamRecord) -> DebugEvent {
    match record.stream_type {
        StreamType::Console => DebugEvent::ConsoleOutput(record.content),
        StreamType::Target => DebugEvent::TargetOutput(record.content),
        StreamType::Log => DebugEvent::LogOutput(record.content),
    }
}
