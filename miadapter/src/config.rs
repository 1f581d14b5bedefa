/// Launch and session settings
///
/// Both structs deserialize from JSON with every field optional, so a
/// config file only needs to mention what it changes.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flavor of MI debugger on the other end of the pipes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebuggerKind {
    #[default]
    Lldb,
    Gdb,
}

impl DebuggerKind {
    pub fn default_binary(&self) -> &'static str {
        match self {
            DebuggerKind::Lldb => "lldb-mi",
            DebuggerKind::Gdb => "gdb",
        }
    }

    pub fn default_args(&self) -> Vec<String> {
        match self {
            DebuggerKind::Lldb => vec!["--interpreter".to_string()],
            DebuggerKind::Gdb => vec!["--interpreter".to_string(), "mi".to_string()],
        }
    }
}

impl FromStr for DebuggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lldb" | "lldb-mi" => Ok(DebuggerKind::Lldb),
            "gdb" => Ok(DebuggerKind::Gdb),
            other => Err(format!("Unknown debugger '{}', expected 'lldb' or 'gdb'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fail the pending command after this long without a response
    pub command_timeout_ms: Option<u64>,
    /// Events buffered per subscriber before a slow one starts lagging
    pub event_capacity: usize,
    /// Prefix every MI command with a numeric token
    pub auto_token: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: None,
            event_capacity: 256,
            auto_token: true,
        }
    }
}

impl SessionConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub debugger: DebuggerKind,
    /// Debugger binary; looked up on `PATH` by its default name when unset
    pub path: Option<PathBuf>,
    /// Replaces the default interpreter arguments when set
    pub args: Option<Vec<String>>,
    pub session: SessionConfig,
}

impl LaunchConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn program(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.debugger.default_binary()))
    }

    pub fn arguments(&self) -> Vec<String> {
        self.args
            .clone()
            .unwrap_or_else(|| self.debugger.default_args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LaunchConfig::default();
        assert_eq!(config.debugger, DebuggerKind::Lldb);
        assert_eq!(config.program(), PathBuf::from("lldb-mi"));
        assert_eq!(config.arguments(), vec!["--interpreter"]);
        assert!(config.session.auto_token);
        assert_eq!(config.session.command_timeout(), None);
    }

    #[test]
    fn test_partial_json() {
        let config = LaunchConfig::from_json(
            r#"{"debugger": "gdb", "session": {"command_timeout_ms": 1500}}"#,
        )
        .unwrap();

        assert_eq!(config.debugger, DebuggerKind::Gdb);
        assert_eq!(config.arguments(), vec!["--interpreter", "mi"]);
        assert_eq!(config.session.command_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.session.event_capacity, 256);
    }

    #[test]
    fn test_explicit_path_and_args() {
        let config = LaunchConfig::from_json(
            r#"{"path": "/opt/gdb/bin/gdb", "args": ["--interpreter=mi2", "-q"]}"#,
        )
        .unwrap();

        assert_eq!(config.program(), PathBuf::from("/opt/gdb/bin/gdb"));
        assert_eq!(config.arguments(), vec!["--interpreter=mi2", "-q"]);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            LaunchConfig::from_json(r#"{"debugger": "windbg"}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_debugger_kind_from_str() {
        assert_eq!("GDB".parse::<DebuggerKind>(), Ok(DebuggerKind::Gdb));
        assert_eq!("lldb-mi".parse::<DebuggerKind>(), Ok(DebuggerKind::Lldb));
        assert!("windbg".parse::<DebuggerKind>().is_err());
    }
}
