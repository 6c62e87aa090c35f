use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Stages of the function create pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionStage {
    Fetch,
    Unpack,
    Deploy,
    Register,
}

impl FunctionStage {
    pub const ALL: [FunctionStage; 4] = [
        FunctionStage::Fetch,
        FunctionStage::Unpack,
        FunctionStage::Deploy,
        FunctionStage::Register,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionStage::Fetch => "fetch",
            FunctionStage::Unpack => "unpack",
            FunctionStage::Deploy => "deploy",
            FunctionStage::Register => "register",
        }
    }
}

impl fmt::Display for FunctionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by controller operations.
///
/// Collaborator messages (HTTP bodies, captured tool output) are carried
/// verbatim so the orchestrator can show them to the user.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("{operation} failed (HTTP {status}): {body}")]
    Protocol {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {operation}: {message}")]
    Decode { operation: String, message: String },

    #[error("`{command}` {}: {output}", describe_exit(.status))]
    ToolExecution {
        command: String,
        status: Option<i32>,
        output: String,
    },

    #[error("Failed to extract archive entry '{entry}': {reason}")]
    Extraction { entry: String, reason: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    #[error("IO error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: FunctionStage,
        #[source]
        source: Box<ProviderError>,
    },
}

fn describe_exit(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exited with status {code}"),
        None => "did not run to completion".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    pub fn transport(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn protocol(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Protocol {
            operation: operation.into(),
            status,
            body: body.into(),
        }
    }

    pub fn decode(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Decode {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn extraction(entry: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Extraction {
            entry: entry.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Attach a pipeline stage label to an error.
    pub fn at_stage(self, stage: FunctionStage) -> Self {
        Self::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The pipeline stage this error was raised in, if any.
    pub fn stage(&self) -> Option<FunctionStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error with any stage labels peeled off.
    pub fn root(&self) -> &ProviderError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Transient failures that may succeed when an idempotent request is repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Self::Transport { .. } | Self::Timeout { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::ToolExecution { .. } => ErrorKind::ToolExecution,
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Io { .. } => ErrorKind::Io,
            Self::InvalidResource(_) => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Stage { source, .. } => source.kind(),
        }
    }
}

/// Error classification for logging and callers that branch on failure type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Decode,
    ToolExecution,
    Extraction,
    Timeout,
    Cancelled,
    Io,
    Validation,
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Decode => "decode",
            ErrorKind::ToolExecution => "tool_execution",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "io",
            ErrorKind::Validation => "validation",
            ErrorKind::Configuration => "configuration",
        };
        f.write_str(s)
    }
}
