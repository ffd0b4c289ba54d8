use glob::{GlobError, PatternError, glob};
use std::{
    fmt,
    io::Error as IoError,
    path::{Path, PathBuf},
    process::Stdio,
    time::SystemTime,
};
use tokio::process::Command as TokioCommand;

#[derive(Debug)]
pub enum FileError {
    GlobPattern(PatternError),
    GlobExpansion(GlobError),
    NoMatches(String),
    Metadata { path: PathBuf, source: IoError },
}

#[derive(Debug)]
pub enum CommandError {
    Io(IoError),
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::GlobPattern(e) => write!(f, "Invalid glob pattern: {}", e),
            FileError::GlobExpansion(e) => write!(f, "Failed to expand glob: {}", e),
            FileError::NoMatches(pattern) => {
                write!(f, "Glob pattern '{}' did not match any files", pattern)
            }
            FileError::Metadata { path, source } => {
                write!(f, "Could not read metadata of '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::GlobPattern(e) => Some(e),
            FileError::GlobExpansion(e) => Some(e),
            FileError::NoMatches(_) => None,
            FileError::Metadata { source, .. } => Some(source),
        }
    }
}

impl From<PatternError> for FileError {
    fn from(err: PatternError) -> Self {
        FileError::GlobPattern(err)
    }
}

impl From<GlobError> for FileError {
    fn from(err: GlobError) -> Self {
        FileError::GlobExpansion(err)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Io(e) => write!(f, "Command execution error: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Io(e) => Some(e),
        }
    }
}

impl From<IoError> for CommandError {
    fn from(err: IoError) -> Self {
        CommandError::Io(err)
    }
}

pub fn is_glob_pattern(path: &str) -> bool {
    path.contains('*') || path.contains('?') || path.contains('[')
}

/// Expands `pattern` to the regular files it matches, in glob order.
///
/// An empty match is an error: a rule pointing at nothing is misconfigured.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>, FileError> {
    let mut files = Vec::new();

    for entry in glob(pattern)? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(FileError::NoMatches(pattern.to_string()));
    }

    Ok(files)
}

pub fn modified_time(path: &Path) -> Result<SystemTime, FileError> {
    path.metadata()
        .and_then(|metadata| metadata.modified())
        .map_err(|source| FileError::Metadata {
            path: path.to_path_buf(),
            source,
        })
}

pub fn newest_modified_time(paths: &[PathBuf]) -> Result<Option<SystemTime>, FileError> {
    let mut newest: Option<SystemTime> = None;

    for path in paths {
        let time = modified_time(path)?;
        if newest.is_none_or(|current| time > current) {
            newest = Some(time);
        }
    }

    Ok(newest)
}

/// Builds the platform shell invocation for a single step, with both output
/// streams piped and stdin closed.
pub fn shell_command(command: &str) -> TokioCommand {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = TokioCommand::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = TokioCommand::new("sh");
        c.args(["-c", command]);
        c
    };

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true);

    cmd
}
