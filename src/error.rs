//! A single error type for the whole engine, in the spirit of the teacher's
//! hand-rolled `GitError`: one enum, a manual `Display` impl, no `thiserror`.

use std::fmt;

/// Every way an engine operation can fail.
#[derive(Debug)]
pub enum EngineError {
    /// The given path is not inside a git repository.
    NotAGitRepo(String),
    /// No environment with this ID exists.
    EnvironmentNotFound(String),
    /// A user-supplied name failed the §6.1 naming rules.
    InvalidName(String),
    /// `git` exited non-zero.
    GitFailure { exit_code: Option<i32>, output: String },
    /// The container runtime failed a build/run/export/etc. operation.
    ContainerFailure(String),
    /// A git-notes fetch was rejected (non-fast-forward) and retry also failed.
    ConflictingState(String),
    /// Wraps `std::io::Error`.
    Io(std::io::Error),
    /// The operation was cancelled by the caller.
    Cancelled,
    /// A `version` argument was not a non-negative integer (§9 Open Question).
    InvalidVersion(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotAGitRepo(path) => {
                write!(f, "not a git repository: {path}")
            }
            EngineError::EnvironmentNotFound(id) => {
                write!(f, "no environment named '{id}'")
            }
            EngineError::InvalidName(name) => {
                write!(f, "invalid environment name: '{name}'")
            }
            EngineError::GitFailure { exit_code, output } => match exit_code {
                Some(code) => write!(f, "git exited with status {code}: {output}"),
                None => write!(f, "git terminated by signal: {output}"),
            },
            EngineError::ContainerFailure(msg) => write!(f, "container runtime error: {msg}"),
            EngineError::ConflictingState(msg) => {
                write!(f, "conflicting git-notes state: {msg}")
            }
            EngineError::Io(e) => write!(f, "I/O error: {e}"),
            EngineError::Cancelled => write!(f, "operation cancelled"),
            EngineError::InvalidVersion(v) => {
                write!(f, "version must be a non-negative integer, got '{v}'")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e)
    }
}

/// Distinguishes a not-found remote/branch (exit code 2 on `git remote
/// get-url`) from any other git failure, per §4.1.
pub fn is_not_found_exit(exit_code: Option<i32>) -> bool {
    exit_code == Some(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_failure_displays_exit_code() {
        let err = EngineError::GitFailure {
            exit_code: Some(128),
            output: "fatal: not a git repository".to_string(),
        };
        assert!(err.to_string().contains("128"));
    }

    #[test]
    fn not_found_exit_is_exactly_two() {
        assert!(is_not_found_exit(Some(2)));
        assert!(!is_not_found_exit(Some(1)));
        assert!(!is_not_found_exit(None));
    }
}
