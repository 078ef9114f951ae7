use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistError {
    #[error("not a command: '{0}' (commands start with '/')")]
    NotACommand(String),

    #[error("unknown command: /{0}")]
    UnknownCommand(String),

    #[error("missing required argument '{argument}' for /{command}")]
    MissingArgument { command: String, argument: String },

    #[error("invalid value '{value}' for argument '{argument}': expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("command /{command} failed: {message}")]
    Handler { command: String, message: String },

    #[error("completion service error: {0}")]
    ExternalService(String),

    #[error("unknown quick action: {0}")]
    UnknownAction(String),

    #[error("no proactive message at index {index} (queue holds {len})")]
    ProactiveIndex { index: usize, len: usize },

    #[error("proactive message at index {0} cannot be dismissed")]
    NotDismissable(usize),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    #[error("invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used when deciding how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unknown command, missing argument. Shown with suggestions.
    Usage,
    /// A command or trigger handler failed.
    Handler,
    /// The injected completion function failed.
    ExternalService,
    Internal,
}

impl AssistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssistError::NotACommand(_)
            | AssistError::UnknownCommand(_)
            | AssistError::MissingArgument { .. }
            | AssistError::InvalidArgument { .. } => ErrorKind::Usage,
            AssistError::Handler { .. } | AssistError::Backend(_) => ErrorKind::Handler,
            AssistError::ExternalService(_) => ErrorKind::ExternalService,
            _ => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistError>;
