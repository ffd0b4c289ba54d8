use std::fmt;

use crate::util::{CommandError, FileError};

#[derive(Debug)]
pub enum GoerError {
    Resolution(String),
    UnknownJob(String),
    Config(String),
    Io(std::io::Error),
    File(FileError),
    Command(CommandError),
    Parse(String),
}

impl fmt::Display for GoerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoerError::Resolution(msg) => write!(f, "Resolution error: {}", msg),
            GoerError::UnknownJob(id) => write!(f, "Unknown job: '{}'", id),
            GoerError::Config(msg) => write!(f, "Config error: {}", msg),
            GoerError::Io(err) => write!(f, "IO error: {}", err),
            GoerError::File(err) => write!(f, "File error: {}", err),
            GoerError::Command(err) => write!(f, "Command error: {}", err),
            GoerError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for GoerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GoerError::Io(err) => Some(err),
            GoerError::File(err) => Some(err),
            GoerError::Command(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GoerError {
    fn from(err: std::io::Error) -> Self {
        GoerError::Io(err)
    }
}

impl From<FileError> for GoerError {
    fn from(err: FileError) -> Self {
        GoerError::File(err)
    }
}

impl From<CommandError> for GoerError {
    fn from(err: CommandError) -> Self {
        GoerError::Command(err)
    }
}

impl From<toml::de::Error> for GoerError {
    fn from(err: toml::de::Error) -> Self {
        GoerError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GoerError>;
