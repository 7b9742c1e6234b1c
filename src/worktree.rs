//! Provisions one git worktree per environment branch and propagates
//! uncommitted user changes into it (§4.5).

use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::fork::Fork;
use crate::git::GitShell;

/// Idempotently ensure a worktree exists for `id`, returning its path. Safe
/// to call repeatedly — a partial failure on a previous call (branch pushed
/// but worktree never added, say) is reconciled on the next call rather
/// than erroring.
pub fn initialize_worktree(
    fork: &Fork,
    id: &str,
    worktrees_root: &Path,
) -> Result<PathBuf, EngineError> {
    let path = worktrees_root.join(id);
    if path.exists() {
        return Ok(path);
    }

    let user_shell = fork.user_shell();
    let fork_shell = fork.shell();

    let sha = user_shell.run(&["rev-parse", "HEAD"])?;
    user_shell.run(&[
        "push",
        "container-use",
        &format!("{sha}:refs/heads/{id}"),
        "--force",
    ])?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let branch_ref = format!("refs/heads/{id}");
    let branch_exists = fork_shell.run(&["rev-parse", "--verify", &branch_ref]).is_ok();

    if branch_exists {
        fork_shell.run(&["worktree", "add", &path.display().to_string(), id])?;
    } else {
        fork_shell.run(&[
            "worktree",
            "add",
            "-b",
            id,
            &path.display().to_string(),
            &sha,
        ])?;
    }

    user_shell.run(&["fetch", "container-use", id])?;

    let local_branch_ref = format!("refs/heads/{id}");
    if user_shell.run(&["rev-parse", "--verify", &local_branch_ref]).is_err() {
        user_shell.run(&["branch", "--track", id, &format!("container-use/{id}")])?;
    }

    Ok(path)
}

/// Copy the user's uncommitted working-tree deltas into the worktree so
/// every environment starts exactly from the user's working state (§4.5).
pub fn apply_uncommitted_changes(
    fork: &Fork,
    worktree_path: &Path,
) -> Result<(), EngineError> {
    let user_shell = fork.user_shell();
    let worktree_shell = GitShell::at(worktree_path);

    let diff = user_shell.run(&["diff", "HEAD"])?;
    if !diff.trim().is_empty() {
        worktree_shell.run_with_stdin(&["apply"], diff.as_bytes())?;
    }

    let untracked = user_shell.run(&["ls-files", "--others", "--exclude-standard"])?;
    for rel_path in untracked.lines().filter(|l| !l.is_empty()) {
        let src = fork.user_repo_path.join(rel_path);
        let dst = worktree_path.join(rel_path);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&src, &dst)?;
    }

    worktree_shell.run(&["add", "-A"])?;
    let staged = worktree_shell.run(&["diff", "--cached", "--name-only"])?;
    if !staged.trim().is_empty() {
        worktree_shell.run(&["commit", "-q", "-m", "Copy uncommitted changes"])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_user_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let shell = GitShell::at(dir.path());
        shell.run(&["init", "-q"]).unwrap();
        shell.run(&["config", "user.email", "t@t.t"]).unwrap();
        shell.run(&["config", "user.name", "T"]).unwrap();
        std::fs::write(dir.path().join("README.md"), "# t").unwrap();
        shell.run(&["add", "."]).unwrap();
        shell.run(&["commit", "-q", "-m", "init"]).unwrap();
        dir
    }

    #[test]
    fn initialize_worktree_is_idempotent() {
        let user_dir = init_user_repo();
        let repos_root = TempDir::new().unwrap();
        let worktrees_root = TempDir::new().unwrap();

        let fork = Fork::open(user_dir.path(), repos_root.path()).unwrap();
        let path1 = initialize_worktree(&fork, "brave-otter", worktrees_root.path()).unwrap();
        let path2 = initialize_worktree(&fork, "brave-otter", worktrees_root.path()).unwrap();
        assert_eq!(path1, path2);
        assert!(path1.join("README.md").exists());
    }

    #[test]
    fn apply_uncommitted_changes_copies_untracked_and_modified_files() {
        let user_dir = init_user_repo();
        std::fs::write(user_dir.path().join("README.md"), "# t\nmore").unwrap();
        std::fs::write(user_dir.path().join("new.py"), "print(1)").unwrap();

        let repos_root = TempDir::new().unwrap();
        let worktrees_root = TempDir::new().unwrap();
        let fork = Fork::open(user_dir.path(), repos_root.path()).unwrap();
        let path = initialize_worktree(&fork, "demo", worktrees_root.path()).unwrap();

        apply_uncommitted_changes(&fork, &path).unwrap();

        let readme = std::fs::read_to_string(path.join("README.md")).unwrap();
        assert_eq!(readme, "# t\nmore");
        assert!(path.join("new.py").exists());

        let log = GitShell::at(&path).run(&["log", "--oneline"]).unwrap();
        assert!(log.contains("Copy uncommitted changes"));
    }

    #[test]
    fn apply_uncommitted_changes_is_a_no_op_on_a_clean_repo() {
        let user_dir = init_user_repo();
        let repos_root = TempDir::new().unwrap();
        let worktrees_root = TempDir::new().unwrap();
        let fork = Fork::open(user_dir.path(), repos_root.path()).unwrap();
        let path = initialize_worktree(&fork, "demo", worktrees_root.path()).unwrap();

        let before = GitShell::at(&path).run(&["rev-parse", "HEAD"]).unwrap();
        apply_uncommitted_changes(&fork, &path).unwrap();
        let after = GitShell::at(&path).run(&["rev-parse", "HEAD"]).unwrap();

        assert_eq!(before.trim(), after.trim());
    }
}
