use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("1 argument required: {usage}")]
    MissingArgument { usage: &'static str },

    #[error("Error: port must be an integer")]
    InvalidPort(String),

    #[error("Invalid command: '{0}' is not recognized")]
    Unrecognized(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Transport(String),

    #[error("Invalid command: '{0}' is not recognized")]
    Unrecognized(String),
}

impl ChatError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Usage(_) => "usage",
            Self::InvalidState(_) => "invalid_state",
            Self::Transport(_) => "transport",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

impl From<CommandError> for ChatError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Unrecognized(raw) => Self::Unrecognized(raw),
            other => Self::Usage(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
