use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::FrameError;

/// One parsed progress event from a generation stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Free-text progress line
    Progress {
        message: String,
        timestamp: Option<String>,
    },
    /// The generator switched to another tool (`tool`)
    Tool {
        tool: Option<String>,
        message: Option<String>,
    },
    /// A generation step started (`callStart`)
    CallStart { tool: Option<String> },
    /// Incremental output; the last chunk holds the current text (`callProgress`)
    CallProgress {
        tool: Option<String>,
        output: Vec<CallOutput>,
    },
    /// Generation completed successfully (`runFinish`)
    RunFinish { end: Option<String> },
    /// Upstream failure that ends the run (`error`, `contentFilterError`)
    Error(ErrorEvent),
    /// Any other tagged payload, passed through untouched
    Other { kind: String, payload: Value },
}

/// Output chunk of a generation step
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallOutput {
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "subCalls")]
    pub sub_calls: BTreeMap<String, SubCall>,
}

/// Nested tool invocation inside a step's output
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubCall {
    #[serde(default, rename = "toolID")]
    pub tool_id: String,
    #[serde(default)]
    pub input: String,
}

/// Which kind of upstream failure an error event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Generic failure (`error`)
    Error,
    /// The prompt or output was rejected by the content filter (`contentFilterError`)
    ContentFilter,
}

/// Upstream failure reported inside the stream
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
    pub code: Option<String>,
    pub details: Option<Value>,
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Error => f.write_str(&self.message)?,
            ErrorKind::ContentFilter => write!(f, "content filter: {}", self.message)?,
        }
        if let Some(code) = &self.code {
            write!(f, " ({code})")?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ProgressPayload {
    message: String,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Deserialize)]
struct ToolPayload {
    #[serde(default)]
    tool: Option<ToolField>,
    #[serde(default)]
    message: Option<String>,
}

/// `tool` arrives as a bare name or as an object carrying a description and/or name
#[derive(Deserialize)]
#[serde(untagged)]
enum ToolField {
    Name(String),
    Described {
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    Unrecognized(serde::de::IgnoredAny),
}

impl ToolField {
    /// Label to show for the tool, preferring its description
    fn into_label(self) -> Option<String> {
        match self {
            Self::Name(name) => Some(name),
            Self::Described { description, name } => description.or(name),
            Self::Unrecognized(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct CallProgressPayload {
    #[serde(default)]
    tool: Option<ToolField>,
    #[serde(default)]
    output: Vec<CallOutput>,
}

impl StreamEvent {
    /// Parse one frame payload
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not JSON, has no `type` tag, or
    /// does not match the shape its tag requires
    pub fn parse(json: &str) -> Result<Self, FrameError> {
        let payload: Value = serde_json::from_str(json)?;
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?
            .to_owned();

        let event = match kind.as_str() {
            "progress" => {
                let ProgressPayload { message, timestamp } = serde_json::from_value(payload)?;
                Self::Progress { message, timestamp }
            }
            "tool" => {
                let ToolPayload { tool, message } = serde_json::from_value(payload)?;
                Self::Tool {
                    tool: tool.and_then(ToolField::into_label),
                    message,
                }
            }
            "callStart" => {
                let ToolPayload { tool, .. } = serde_json::from_value(payload)?;
                Self::CallStart {
                    tool: tool.and_then(ToolField::into_label),
                }
            }
            "callProgress" => {
                let CallProgressPayload { tool, output } = serde_json::from_value(payload)?;
                Self::CallProgress {
                    tool: tool.and_then(ToolField::into_label),
                    output,
                }
            }
            "runFinish" => Self::RunFinish {
                end: payload.get("end").and_then(Value::as_str).map(str::to_owned),
            },
            "error" => Self::Error(ErrorEvent::from_payload(ErrorKind::Error, &payload)),
            "contentFilterError" => Self::Error(ErrorEvent::from_payload(ErrorKind::ContentFilter, &payload)),
            _ => Self::Other { kind, payload },
        };

        Ok(event)
    }

    /// The `type` tag this event was parsed from
    pub fn kind(&self) -> &str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Tool { .. } => "tool",
            Self::CallStart { .. } => "callStart",
            Self::CallProgress { .. } => "callProgress",
            Self::RunFinish { .. } => "runFinish",
            Self::Error(ErrorEvent {
                kind: ErrorKind::Error,
                ..
            }) => "error",
            Self::Error(ErrorEvent {
                kind: ErrorKind::ContentFilter,
                ..
            }) => "contentFilterError",
            Self::Other { kind, .. } => kind,
        }
    }

    /// Whether this event ends the run
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinish { .. } | Self::Error(_))
    }

    /// Text of the last output chunk of a `callProgress` event
    pub fn current_text(&self) -> Option<&str> {
        match self {
            Self::CallProgress { output, .. } => output.last().map(|chunk| chunk.content.as_str()),
            _ => None,
        }
    }

    /// Human-readable progress line for this event
    ///
    /// `callProgress` has no line of its own; callers show its
    /// [`current_text`](Self::current_text) instead.
    pub fn describe(&self) -> Option<String> {
        let line = match self {
            Self::Progress { message, .. } => message.clone(),
            Self::Tool { tool, message } => match (tool, message) {
                (Some(tool), _) => format!("Using tool: {tool}"),
                (None, Some(message)) => message.clone(),
                (None, None) => "Using tool".to_owned(),
            },
            Self::CallStart { tool } => format!("Tool Starting: {}", tool.as_deref().unwrap_or_default()),
            Self::CallProgress { .. } => return None,
            Self::RunFinish { .. } => "Story generation complete!".to_owned(),
            Self::Error(error) => match error.kind {
                ErrorKind::ContentFilter => format!("Content Filter: {}", error.message),
                ErrorKind::Error => format!("Error: {}", error.message),
            },
            Self::Other { kind, payload } => describe_other(kind, payload),
        };

        Some(line)
    }
}

impl ErrorEvent {
    fn from_payload(kind: ErrorKind, payload: &Value) -> Self {
        let message = ["message", "error"]
            .iter()
            .find_map(|field| payload.get(*field).and_then(Value::as_str))
            .unwrap_or("unknown error")
            .to_owned();

        let code = payload.get("code").and_then(|code| match code {
            Value::Null => None,
            Value::String(code) => Some(code.clone()),
            other => Some(other.to_string()),
        });

        let details = payload.get("details").filter(|details| !details.is_null()).cloned();

        Self {
            kind,
            message,
            code,
            details,
        }
    }
}

fn describe_other(kind: &str, payload: &Value) -> String {
    let text = |field: &str| match payload.get(field) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    match kind {
        "runStart" => format!("Run started at {}", text("start")),
        "callChat" => format!("Chat in progress with your input >> {}", text("input")),
        "callFinish" => with_outputs("Call finished:", payload, false),
        "callSubCalls" => with_outputs("Sub-calls in progress:", payload, true),
        "callContinue" => with_outputs("Call continues:", payload, true),
        "callConfirm" => with_outputs("Call confirm:", payload, true),
        _ => "Unknown event".to_owned(),
    }
}

/// Render a heading followed by each output chunk, optionally with its sub-calls
fn with_outputs(heading: &str, payload: &Value, sub_calls: bool) -> String {
    let outputs = payload
        .get("output")
        .cloned()
        .and_then(|output| serde_json::from_value::<Vec<CallOutput>>(output).ok())
        .unwrap_or_default();

    let mut lines = vec![heading.to_owned()];
    for output in outputs {
        lines.push(output.content);
        if sub_calls {
            for (key, call) in output.sub_calls {
                lines.push(format!("SubCall {key}: Tool ID: {}, Input: {}", call.tool_id, call.input));
            }
        }
    }

    lines.join("\n")
}
