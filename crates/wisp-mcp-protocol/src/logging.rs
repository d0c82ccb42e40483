//! Logging levels and the `notifications/message` / `logging/setLevel`
//! parameter shapes. Levels map to RFC-5424 severities.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LoggingLevel {
    /// Numeric syslog grade; lower is more severe.
    pub fn severity(&self) -> u8 {
        match self {
            LoggingLevel::Emergency => 0,
            LoggingLevel::Alert => 1,
            LoggingLevel::Critical => 2,
            LoggingLevel::Error => 3,
            LoggingLevel::Warning => 4,
            LoggingLevel::Notice => 5,
            LoggingLevel::Info => 6,
            LoggingLevel::Debug => 7,
        }
    }

    /// Whether a message at `self` passes a session whose current level is
    /// `threshold`: pass iff the message is at least as severe.
    pub fn passes(&self, threshold: LoggingLevel) -> bool {
        self.severity() <= threshold.severity()
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(LoggingLevel::Debug),
            "info" => Some(LoggingLevel::Info),
            "notice" => Some(LoggingLevel::Notice),
            "warning" => Some(LoggingLevel::Warning),
            "error" => Some(LoggingLevel::Error),
            "critical" => Some(LoggingLevel::Critical),
            "alert" => Some(LoggingLevel::Alert),
            "emergency" => Some(LoggingLevel::Emergency),
            _ => None,
        }
    }
}

/// `notifications/message` params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingMessageParams {
    pub level: LoggingLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub data: Value,
}

impl LoggingMessageParams {
    pub fn new(level: LoggingLevel, data: Value) -> Self {
        Self {
            level,
            logger: None,
            data,
        }
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }
}

/// `logging/setLevel` params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelParams {
    pub level: LoggingLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(LoggingLevel::Emergency.severity() < LoggingLevel::Debug.severity());
        assert!(LoggingLevel::Error.severity() < LoggingLevel::Warning.severity());
    }

    #[test]
    fn test_passes_threshold() {
        // Session at warning: errors pass, info is dropped.
        assert!(LoggingLevel::Error.passes(LoggingLevel::Warning));
        assert!(LoggingLevel::Warning.passes(LoggingLevel::Warning));
        assert!(!LoggingLevel::Info.passes(LoggingLevel::Warning));
        // Session at debug: everything passes.
        assert!(LoggingLevel::Debug.passes(LoggingLevel::Debug));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&LoggingLevel::Warning).unwrap(),
            "\"warning\""
        );
        assert_eq!(LoggingLevel::parse("emergency"), Some(LoggingLevel::Emergency));
        assert_eq!(LoggingLevel::parse("verbose"), None);
    }
}
