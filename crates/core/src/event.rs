use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One frame of a reported stack trace.
///
/// All fields are optional on the wire; normalization for fingerprinting
/// treats missing fields as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_app: Option<bool>,
}

impl StackFrame {
    /// Canonical `file:line:column:function` form used for fingerprinting.
    #[must_use]
    pub fn normalized(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.file.as_deref().unwrap_or(""),
            self.line.map(|l| l.to_string()).unwrap_or_default(),
            self.column.map(|c| c.to_string()).unwrap_or_default(),
            self.function.as_deref().unwrap_or(""),
        )
    }
}

/// A raw error report as received from a client SDK.
///
/// The optional fields keep their presence through sanitization so that
/// downstream issue updates never overwrite data the client did not send.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub message: String,
    #[serde(default)]
    pub stack_trace: Vec<StackFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ErrorEvent {
    /// Create a minimal event with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// The environment label, defaulting to `production` when absent.
    #[must_use]
    pub fn environment_or_default(&self) -> &str {
        self.environment.as_deref().unwrap_or("production")
    }

    /// First non-empty `file` among the stack frames, if any.
    #[must_use]
    pub fn first_frame_file(&self) -> Option<&str> {
        self.stack_trace
            .iter()
            .filter_map(|f| f.file.as_deref())
            .find(|f| !f.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_normalization_fills_missing_fields() {
        let frame = StackFrame {
            file: Some("src/app.js".into()),
            line: Some(42),
            column: None,
            function: Some("handler".into()),
            in_app: None,
        };
        assert_eq!(frame.normalized(), "src/app.js:42::handler");

        let empty = StackFrame::default();
        assert_eq!(empty.normalized(), ":::");
    }

    #[test]
    fn event_deserializes_from_camel_case_wire_format() {
        let json = r#"{
            "message": "boom",
            "stackTrace": [{"file": "a.js", "line": 1, "inApp": true}],
            "environment": "staging",
            "userContext": {"id": "u1"}
        }"#;
        let event: ErrorEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.message, "boom");
        assert_eq!(event.stack_trace.len(), 1);
        assert_eq!(event.stack_trace[0].in_app, Some(true));
        assert!(event.user_context.is_some());
        assert!(event.metadata.is_none());
    }

    #[test]
    fn environment_defaults_to_production() {
        assert_eq!(ErrorEvent::new("x").environment_or_default(), "production");
    }

    #[test]
    fn first_frame_file_skips_empty_entries() {
        let event = ErrorEvent {
            stack_trace: vec![
                StackFrame {
                    file: Some(String::new()),
                    ..StackFrame::default()
                },
                StackFrame {
                    file: Some("lib/db.js".into()),
                    ..StackFrame::default()
                },
            ],
            ..ErrorEvent::new("x")
        };
        assert_eq!(event.first_frame_file(), Some("lib/db.js"));
    }
}
