/// MI debugger client
///
/// Drives a GDB or LLDB compatible debugger through its Machine Interface:
/// commands are queued and written one at a time, responses are matched back
/// to them, and asynchronous notifications are published as typed events.

pub mod commands;
pub mod communication;
pub mod config;
pub mod events;
pub mod extract;
pub mod parser;
pub mod process;
pub mod raw;
pub mod session;
pub mod types;

pub use commands::{
    BreakpointOptions, CommandError, CommandFailedError, DisassembleOptions, ExecOptions,
    FrameRange, FrameSelector, MalformedResponseError, RegisterValueOptions, ResumeOptions,
    StackArgsOptions, StackDepthOptions, StackFramesOptions, StackVariablesOptions, StartOptions,
    WatchChildrenOptions, WatchOptions,
};
pub use communication::CommunicationError;
pub use config::{ConfigError, DebuggerKind, LaunchConfig, SessionConfig};
pub use events::{DebugEvent, LibraryEvent, TargetStoppedEvent};
pub use process::{spawn_debugger, ProcessError};
pub use session::DebugSession;
pub use types::*;
