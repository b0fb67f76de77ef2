//! Error types for Mailguard

/// Result type alias using Mailguard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Mailguard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The decision policy produced something that is not a valid action
    #[error("invalid action: {0}")]
    ActionParse(String),

    /// A tool raised while executing an action
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution {
        /// Name of the tool that failed
        tool: String,
        /// Failure description
        message: String,
    },

    /// The decision policy itself failed (transport, script exhausted, ...)
    #[error("decision policy error: {0}")]
    DecisionPolicy(String),

    /// The event sink is gone or a write to it failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Event stream decoding errors
    #[error("stream error: {0}")]
    Stream(String),

    /// Pattern table / detector construction errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new action parse error
    pub fn action_parse(msg: impl Into<String>) -> Self {
        Self::ActionParse(msg.into())
    }

    /// Create a new tool execution error
    pub fn tool(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Create a new decision policy error
    pub fn decision(msg: impl Into<String>) -> Self {
        Self::DecisionPolicy(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short machine-readable kind, used for metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ActionParse(_) => "action_parse",
            Self::ToolExecution { .. } => "tool_execution",
            Self::DecisionPolicy(_) => "decision_policy",
            Self::Transport(_) => "transport",
            Self::Stream(_) => "stream",
            Self::Classifier(_) => "classifier",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether the failure means the consumer can no longer receive events
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
