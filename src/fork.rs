//! Maintains the side-channel bare "fork" repository per user repo and the
//! `container-use` remote wiring (§4.4).

use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::git::{normalize_git_url, GitShell};

const REMOTE_NAME: &str = "container-use";

/// A user repository paired with its bare fork.
#[derive(Debug, Clone)]
pub struct Fork {
    pub user_repo_path: PathBuf,
    pub fork_repo_path: PathBuf,
}

impl Fork {
    /// Discover or create the fork for the user repo containing `path`,
    /// rooted under `repos_root` (typically `<state_root>/repos`).
    pub fn open(path: &Path, repos_root: &Path) -> Result<Self, EngineError> {
        let probe = GitShell::at(path);
        let toplevel = probe.run(&["rev-parse", "--show-toplevel"]).map_err(|_| {
            EngineError::NotAGitRepo(path.display().to_string())
        })?;
        let user_repo_path = dunce::canonicalize(&toplevel).unwrap_or_else(|_| PathBuf::from(&toplevel));

        let user_shell = GitShell::at(&user_repo_path);
        let fork_repo_path = match user_shell.remote_url(REMOTE_NAME)? {
            Some(url) => PathBuf::from(url),
            None => Self::derive_fork_path(&user_shell, &user_repo_path, repos_root)?,
        };

        if !fork_repo_path.exists() {
            if let Some(parent) = fork_repo_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            GitShell::at(std::env::temp_dir()).run(&[
                "clone",
                "--bare",
                &user_repo_path.display().to_string(),
                &fork_repo_path.display().to_string(),
            ])?;
        }

        match user_shell.remote_url(REMOTE_NAME)? {
            Some(existing) if existing == fork_repo_path.display().to_string() => {}
            Some(_) => {
                user_shell.run(&[
                    "remote",
                    "set-url",
                    REMOTE_NAME,
                    &fork_repo_path.display().to_string(),
                ])?;
            }
            None => {
                user_shell.run(&[
                    "remote",
                    "add",
                    REMOTE_NAME,
                    &fork_repo_path.display().to_string(),
                ])?;
            }
        }

        Ok(Self {
            user_repo_path,
            fork_repo_path,
        })
    }

    fn derive_fork_path(
        user_shell: &GitShell,
        user_repo_path: &Path,
        repos_root: &Path,
    ) -> Result<PathBuf, EngineError> {
        let token = match user_shell.remote_url("origin")? {
            Some(origin_url) => normalize_git_url(&origin_url).unwrap_or_else(|_| {
                literal_path_token(user_repo_path)
            }),
            None => literal_path_token(user_repo_path),
        };
        Ok(repos_root.join(token))
    }

    pub fn shell(&self) -> GitShell {
        GitShell::at(&self.fork_repo_path)
    }

    pub fn user_shell(&self) -> GitShell {
        GitShell::at(&self.user_repo_path)
    }
}

/// Fallback fork-directory token for repos with no `origin`: the absolute
/// path with its leading separator stripped, so it composes cleanly under
/// `repos_root`.
fn literal_path_token(path: &Path) -> String {
    path.display().to_string().trim_start_matches(['/', '\\']).to_string()
}
