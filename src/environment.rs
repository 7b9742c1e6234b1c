//! In-memory object binding an ID, config, state, worktree path, and a
//! container session; applies operations and stages them into the
//! worktree (§4.8).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SecretsConfig;
use crate::container::{ContainerRuntime, Endpoint, ImageSnapshot, ResolvedSecret};
use crate::error::EngineError;
use crate::fork::Fork;
use crate::git::{is_binary, should_skip, GitShell};
use crate::naming::validate_name;
use crate::petname;
use crate::secrets::resolve_all;
use crate::state::{
    append_log, has_state, load_state, propagate_notes, save_state, EnvironmentConfig,
    EnvironmentState, StateSnapshot, LOG_REF, STATE_REF,
};
use crate::utils::now_iso8601;
use crate::worktree::{apply_uncommitted_changes, initialize_worktree};

/// Parse a protocol-supplied version argument. Per §9's Open Question
/// resolution: a version that isn't a non-negative integer is a hard
/// error, never silently dropped.
pub fn parse_version(raw: &str) -> Result<u64, EngineError> {
    raw.parse::<u64>()
        .map_err(|_| EngineError::InvalidVersion(raw.to_string()))
}

/// `New -> Configured -> Running* -> Deleted` (§4.8). `Running` isn't
/// tracked as a distinct phase here — it's a multiplicity label on
/// concurrent command execution, not a state that excludes other
/// operations — so this enum only distinguishes the phases that actually
/// gate what's callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    New,
    Configured,
    Deleted,
}

/// The structured payload every successful Agent Protocol tool call
/// returns for environment-scoped operations (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentResponse {
    pub id: String,
    pub base_image: String,
    pub setup_commands: Vec<String>,
    pub instructions: String,
    pub workdir: String,
    pub branch: String,
    pub tracking_branch: String,
    pub checkout_command_for_human: String,
    pub host_worktree_path: String,
}

/// An environment: the pairing of a container session and a dedicated
/// branch in the fork repo, checked out into its own worktree.
pub struct Environment {
    pub id: String,
    pub worktree_path: PathBuf,
    pub config: EnvironmentConfig,
    pub state: EnvironmentState,
    phase: Phase,
    image: Option<ImageSnapshot>,
    fork: Fork,
    runtime: Arc<dyn ContainerRuntime>,
    secrets_config: SecretsConfig,
    /// Plain `NAME=VALUE` pairs set via `environment_set_env`, merged into
    /// the resolved secret list on the next rebuild. Non-persistent (§3) —
    /// unlike `config.secrets` these never go through the `file://`/`env://`/
    /// `op://` schema resolver and are never written to the state note.
    extra_env: Vec<ResolvedSecret>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("worktree_path", &self.worktree_path)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Parameters accepted by [`Environment::open_or_create`] and
/// [`Environment::update`] — grouped so call sites (and the Agent Protocol
/// handlers) don't pass eight positional strings.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSpec {
    pub base_image: String,
    pub setup_commands: Vec<String>,
    pub instructions: String,
    pub workdir: String,
    pub secrets: Vec<String>,
    pub title: String,
}

impl Environment {
    /// §4.8 `open_or_create`: if `name` already exists (has a state note),
    /// load it; otherwise generate or validate an ID, provision its
    /// worktree, build its container, and commit the initial snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn open_or_create(
        fork: &Fork,
        worktrees_root: &Path,
        runtime: Arc<dyn ContainerRuntime>,
        secrets_config: SecretsConfig,
        existing_ids: &[String],
        name: Option<&str>,
        spec: EnvironmentSpec,
        explanation: &str,
    ) -> Result<Self, EngineError> {
        let id = match name {
            Some(n) => {
                validate_name(n)?;
                n.to_string()
            }
            None => petname::generate(existing_ids),
        };

        if has_state(fork, &id) {
            return Self::load(fork, worktrees_root, runtime, secrets_config, &id);
        }

        let worktree_path = initialize_worktree(fork, &id, worktrees_root)?;
        apply_uncommitted_changes(fork, &worktree_path)?;

        let now = now_iso8601();
        let config = EnvironmentConfig {
            base_image: spec.base_image,
            setup_commands: spec.setup_commands,
            instructions: spec.instructions,
            workdir: spec.workdir,
            secrets: spec.secrets,
        };
        let state = EnvironmentState {
            title: spec.title,
            created_at: now.clone(),
            updated_at: now,
            notes: Vec::new(),
        };

        let mut env = Self {
            id,
            worktree_path,
            config,
            state,
            phase: Phase::New,
            image: None,
            fork: fork.clone(),
            runtime,
            secrets_config,
            extra_env: Vec::new(),
        };

        env.export_and_commit(explanation)?;
        Ok(env)
    }

    /// Rehydrate an already-existing environment from its state note.
    pub fn load(
        fork: &Fork,
        worktrees_root: &Path,
        runtime: Arc<dyn ContainerRuntime>,
        secrets_config: SecretsConfig,
        id: &str,
    ) -> Result<Self, EngineError> {
        let worktree_path = initialize_worktree(fork, id, worktrees_root)?;
        let snapshot = load_state(fork, id)?;
        Ok(Self {
            id: id.to_string(),
            worktree_path,
            config: snapshot.config,
            state: snapshot.state,
            phase: Phase::Configured,
            image: None,
            fork: fork.clone(),
            runtime,
            secrets_config,
            extra_env: Vec::new(),
        })
    }

    fn ensure_not_deleted(&self) -> Result<(), EngineError> {
        if self.phase == Phase::Deleted {
            return Err(EngineError::EnvironmentNotFound(self.id.clone()));
        }
        Ok(())
    }

    /// Build (or reuse) this environment's container, seeding a freshly
    /// created one with the worktree's current contents.
    fn ensure_image(&mut self) -> Result<ImageSnapshot, EngineError> {
        self.ensure_not_deleted()?;
        let mut secrets = resolve_all(&self.config.secrets, &self.secrets_config)?;
        secrets.extend(self.extra_env.iter().cloned());
        let (image, freshly_created) =
            self.runtime
                .build(&self.config.base_image, &self.config.setup_commands, &secrets)?;
        if freshly_created {
            self.runtime.import(&image, &self.config.workdir, &self.worktree_path)?;
        }
        self.image = Some(image.clone());
        self.phase = Phase::Configured;
        Ok(image)
    }

    /// Stage every non-binary path that changed on disk, committing only
    /// if the stage actually differs from `HEAD` — an export that
    /// reproduces the current worktree exactly must not manufacture an
    /// empty commit.
    fn stage_and_maybe_commit(&self, explanation: &str) -> Result<(), EngineError> {
        let shell = GitShell::at(&self.worktree_path);
        stage_non_binary_files(&self.worktree_path)?;

        match shell.run(&["diff", "--cached", "--quiet"]) {
            Ok(_) => Ok(()),
            Err(EngineError::GitFailure { exit_code: Some(1), .. }) => {
                shell.run(&["commit", "-q", "-m", explanation])?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Overwrite the state note, append the log note, and propagate both
    /// into the user repo. Called by every operation the Agent Protocol
    /// exposes, mutating or not, since every tool call carries an
    /// `explanation` that belongs in the log (§4.10).
    fn stamp_and_log(&mut self, explanation: &str) -> Result<(), EngineError> {
        self.state.updated_at = now_iso8601();
        let snapshot = StateSnapshot {
            config: self.config.clone(),
            state: self.state.clone(),
        };
        save_state(&self.fork, &self.id, &snapshot)?;
        append_log(&self.fork, &self.id, explanation)?;
        propagate_notes(&self.fork, STATE_REF)?;
        propagate_notes(&self.fork, LOG_REF)?;
        Ok(())
    }

    fn export_and_commit(&mut self, explanation: &str) -> Result<(), EngineError> {
        let image = self.ensure_image()?;
        self.runtime.export(&image, &self.config.workdir, &self.worktree_path)?;
        self.stage_and_maybe_commit(explanation)?;
        self.stamp_and_log(explanation)
    }

    /// §4.8 `update`: replace config, rebuild, re-export. Always stamps a
    /// new state note, even when the resulting container is byte-identical
    /// to the previous one, so operation order is preserved.
    pub fn update(
        &mut self,
        instructions: Option<String>,
        base_image: Option<String>,
        setup_commands: Option<Vec<String>>,
        secrets: Option<Vec<String>>,
        explanation: &str,
    ) -> Result<(), EngineError> {
        self.ensure_not_deleted()?;
        if let Some(v) = instructions {
            self.config.instructions = v;
        }
        if let Some(v) = base_image {
            self.config.base_image = v;
        }
        if let Some(v) = setup_commands {
            self.config.setup_commands = v;
        }
        if let Some(v) = secrets {
            self.config.secrets = v;
        }
        self.image = None;
        self.export_and_commit(explanation)
    }

    /// `environment_set_env`: set plain `NAME=VALUE` environment variables
    /// for the container, without going through the `file://`/`env://`/
    /// `op://` secret schema and without touching the persisted
    /// `config.secrets` list (§3 non-persistent container session data).
    /// Forces a rebuild so the new variables take effect.
    pub fn set_env(&mut self, vars: Vec<(String, String)>, explanation: &str) -> Result<(), EngineError> {
        self.ensure_not_deleted()?;
        self.extra_env = vars
            .into_iter()
            .map(|(name, value)| ResolvedSecret { name, value })
            .collect();
        self.image = None;
        self.export_and_commit(explanation)
    }

    /// §4.8 `run`: execute foreground, then export+commit, returning stdout.
    pub fn run(
        &mut self,
        command: &str,
        shell: &str,
        use_entrypoint: bool,
        explanation: &str,
    ) -> Result<Vec<u8>, EngineError> {
        self.ensure_not_deleted()?;
        let image = self.ensure_image()?;
        let stdout = self
            .runtime
            .run(&image, &self.config.workdir, command, shell, use_entrypoint)?;
        self.runtime.export(&image, &self.config.workdir, &self.worktree_path)?;
        self.stage_and_maybe_commit(explanation)?;
        self.stamp_and_log(explanation)?;
        Ok(stdout)
    }

    /// §4.8 `run_background`: execute, do NOT re-export — background side
    /// effects are explicitly not tracked.
    pub fn run_background(
        &mut self,
        command: &str,
        shell: &str,
        ports: &[u16],
        use_entrypoint: bool,
        explanation: &str,
    ) -> Result<Vec<Endpoint>, EngineError> {
        self.ensure_not_deleted()?;
        let image = self.ensure_image()?;
        let endpoints =
            self.runtime
                .run_background(&image, &self.config.workdir, command, shell, ports, use_entrypoint)?;
        self.stamp_and_log(explanation)?;
        Ok(endpoints)
    }

    pub fn file_read(
        &mut self,
        path: &str,
        whole: bool,
        start_line: Option<u32>,
        end_line: Option<u32>,
    ) -> Result<String, EngineError> {
        self.ensure_not_deleted()?;
        let image = self.ensure_image()?;
        let bytes = self.runtime.file_read(&image, &self.config.workdir, path)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if whole {
            return Ok(text);
        }

        let start = start_line.unwrap_or(1).max(1) as usize;
        let end = end_line.map(|e| e as usize).unwrap_or(usize::MAX);
        let selected: Vec<&str> = text
            .lines()
            .enumerate()
            .filter(|(i, _)| {
                let line_no = i + 1;
                line_no >= start && line_no <= end
            })
            .map(|(_, l)| l)
            .collect();
        Ok(selected.join("\n"))
    }

    pub fn file_write(&mut self, path: &str, contents: &[u8], explanation: &str) -> Result<(), EngineError> {
        self.ensure_not_deleted()?;
        let image = self.ensure_image()?;
        self.runtime.file_write(&image, &self.config.workdir, path, contents)?;
        self.runtime.export(&image, &self.config.workdir, &self.worktree_path)?;
        self.stage_and_maybe_commit(explanation)?;
        self.stamp_and_log(explanation)
    }

    /// `environment_upload`: copy a file from the host into the container
    /// workdir, built atop [`Environment::file_write`].
    pub fn upload(&mut self, local_path: &Path, container_path: &str, explanation: &str) -> Result<(), EngineError> {
        let contents = std::fs::read(local_path)?;
        self.file_write(container_path, &contents, explanation)
    }

    /// `environment_download`: copy a file out of the container workdir onto
    /// the host, built atop [`Environment::file_read`].
    pub fn download(&mut self, container_path: &str, local_path: &Path) -> Result<(), EngineError> {
        self.ensure_not_deleted()?;
        let image = self.ensure_image()?;
        let bytes = self.runtime.file_read(&image, &self.config.workdir, container_path)?;
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local_path, bytes)?;
        Ok(())
    }

    pub fn file_delete(&mut self, path: &str, explanation: &str) -> Result<(), EngineError> {
        self.ensure_not_deleted()?;
        let image = self.ensure_image()?;
        self.runtime.file_delete(&image, &self.config.workdir, path)?;
        self.runtime.export(&image, &self.config.workdir, &self.worktree_path)?;
        self.stage_and_maybe_commit(explanation)?;
        self.stamp_and_log(explanation)
    }

    pub fn file_list(&mut self, path: &str) -> Result<Vec<String>, EngineError> {
        self.ensure_not_deleted()?;
        let image = self.ensure_image()?;
        self.runtime.file_list(&image, &self.config.workdir, path)
    }

    pub fn terminal(&mut self) -> Result<(), EngineError> {
        self.ensure_not_deleted()?;
        let image = self.ensure_image()?;
        self.runtime.terminal(&image, &self.config.workdir)
    }

    pub fn remote_diff(&mut self, source: &Path, target: &str) -> Result<String, EngineError> {
        self.ensure_not_deleted()?;
        let image = self.ensure_image()?;
        self.runtime.remote_diff(source, &image, target)
    }

    fn resolve_version(&self, version: Option<u64>) -> Result<String, EngineError> {
        let fork_shell = self.fork.shell();
        match version {
            None => fork_shell.run(&["rev-parse", &self.id]),
            Some(n) => fork_shell.run(&["rev-parse", &format!("{}~{n}", self.id)]),
        }
    }

    /// §4.8 `fork`: create a new environment whose initial HEAD is the
    /// chosen ancestor commit of this one (defaulting to latest).
    pub fn fork(
        &self,
        worktrees_root: &Path,
        existing_ids: &[String],
        new_name: Option<&str>,
        version: Option<u64>,
    ) -> Result<Environment, EngineError> {
        self.ensure_not_deleted()?;
        let commit = self.resolve_version(version)?;
        let new_id = match new_name {
            Some(n) => {
                validate_name(n)?;
                n.to_string()
            }
            None => petname::generate(existing_ids),
        };

        let fork_shell = self.fork.shell();
        fork_shell.run(&["branch", &new_id, &commit])?;

        let worktree_path = worktrees_root.join(&new_id);
        fork_shell.run(&["worktree", "add", &worktree_path.display().to_string(), &new_id])?;

        self.fork.user_shell().run(&["fetch", "container-use", &new_id])?;

        let snapshot = load_state(&self.fork, &self.id)?;
        save_state(&self.fork, &new_id, &snapshot)?;
        propagate_notes(&self.fork, STATE_REF)?;

        Ok(Environment {
            id: new_id,
            worktree_path,
            config: snapshot.config,
            state: snapshot.state,
            phase: Phase::Configured,
            image: None,
            fork: self.fork.clone(),
            runtime: Arc::clone(&self.runtime),
            secrets_config: self.secrets_config.clone(),
            extra_env: Vec::new(),
        })
    }

    /// §4.8 `revert`: reset the branch to the commit identified by
    /// `version` (`HEAD~N` against this environment's own log).
    pub fn revert(&mut self, version: u64, explanation: &str) -> Result<(), EngineError> {
        self.ensure_not_deleted()?;
        let sha = self
            .fork
            .shell()
            .run(&["rev-parse", &format!("{}~{version}", self.id)])?;

        self.fork
            .shell()
            .run(&["update-ref", &format!("refs/heads/{}", self.id), &sha])?;

        let worktree_shell = GitShell::at(&self.worktree_path);
        worktree_shell.run(&["reset", "--hard", &sha])?;

        self.fork.user_shell().run(&["fetch", "container-use", &self.id])?;

        // The container's filesystem no longer matches the reverted tree
        // until it is reseeded.
        self.image = None;
        self.stamp_and_log(explanation)
    }

    /// §4.8 `history`: ordered commits on this environment's branch since
    /// its merge-base with the user's current branch.
    pub fn history(&self) -> Result<Vec<String>, EngineError> {
        let user_shell = self.fork.user_shell();
        let current_branch = user_shell.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let tracking = format!("container-use/{}", self.id);
        let range = match user_shell.run(&["merge-base", &current_branch, &tracking]) {
            Ok(mb) if !mb.is_empty() => format!("{mb}..{}", self.id),
            _ => self.id.clone(),
        };

        let log = self.fork.shell().run(&["log", "--pretty=format:%H %s", &range])?;
        Ok(log.lines().map(str::to_string).collect())
    }

    /// §4.8 `revision_diff`: `git diff` between two commits, scoped to `path`.
    pub fn revision_diff(
        &self,
        path: &str,
        from_version: u64,
        to_version: Option<u64>,
    ) -> Result<String, EngineError> {
        let from_rev = format!("{}~{from_version}", self.id);
        let to_rev = match to_version {
            Some(v) => format!("{}~{v}", self.id),
            None => self.id.clone(),
        };
        self.fork
            .shell()
            .run(&["diff", &format!("{from_rev}..{to_rev}"), "--", path])
    }

    pub fn to_response(&self) -> EnvironmentResponse {
        EnvironmentResponse {
            id: self.id.clone(),
            base_image: self.config.base_image.clone(),
            setup_commands: self.config.setup_commands.clone(),
            instructions: self.config.instructions.clone(),
            workdir: self.config.workdir.clone(),
            branch: self.id.clone(),
            tracking_branch: format!("container-use/{}", self.id),
            checkout_command_for_human: format!("container-use checkout {}", self.id),
            host_worktree_path: self.worktree_path.display().to_string(),
        }
    }
}

/// `git add -A`, then unstage every path the Binary Filter rejects, so it
/// ends up untracked (`?? path`) rather than committed — this mirrors the
/// stage-then-reset shape `git status` is expected to show in S2.
fn stage_non_binary_files(worktree_path: &Path) -> Result<(), EngineError> {
    let shell = GitShell::at(worktree_path);
    shell.run(&["add", "-A"])?;

    let status = shell.run(&["status", "--porcelain"])?;
    let mut to_unstage = Vec::new();
    for line in status.lines() {
        if line.len() < 4 {
            continue;
        }
        let rel = line[3..].trim_matches('"');
        let abs = worktree_path.join(rel);
        let binary = abs.is_file() && is_binary(&abs);
        if should_skip(rel) || binary {
            to_unstage.push(rel.to_string());
        }
    }

    if !to_unstage.is_empty() {
        let mut args: Vec<String> = vec!["reset".into(), "HEAD".into(), "--".into()];
        args.extend(to_unstage);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        shell.run(&refs)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_accepts_non_negative_integers() {
        assert_eq!(parse_version("0").unwrap(), 0);
        assert_eq!(parse_version("42").unwrap(), 42);
    }

    #[test]
    fn parse_version_rejects_non_numeric_values() {
        assert!(parse_version("latest").is_err());
        assert!(parse_version("-1").is_err());
        assert!(parse_version("1.5").is_err());
        assert!(parse_version("").is_err());
    }

    #[test]
    fn stage_non_binary_files_leaves_binaries_untracked() {
        let dir = tempfile::TempDir::new().unwrap();
        let shell = GitShell::at(dir.path());
        shell.run(&["init", "-q"]).unwrap();
        shell.run(&["config", "user.email", "t@t.t"]).unwrap();
        shell.run(&["config", "user.name", "T"]).unwrap();
        std::fs::write(dir.path().join("README.md"), "# t").unwrap();
        shell.run(&["add", "."]).unwrap();
        shell.run(&["commit", "-q", "-m", "init"]).unwrap();

        std::fs::write(dir.path().join("main.py"), "print(1)").unwrap();
        std::fs::create_dir_all(dir.path().join("__pycache__")).unwrap();
        std::fs::write(dir.path().join("__pycache__/x.pyc"), [0u8; 150]).unwrap();

        stage_non_binary_files(dir.path()).unwrap();

        let status = shell.run(&["status", "--porcelain"]).unwrap();
        assert!(status.contains("A  main.py"));
        assert!(status.contains("?? __pycache__/"));
    }

    fn init_user_repo() -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        let shell = GitShell::at(dir.path());
        shell.run(&["init", "-q"]).unwrap();
        shell.run(&["config", "user.email", "t@t.t"]).unwrap();
        shell.run(&["config", "user.name", "T"]).unwrap();
        std::fs::write(dir.path().join("README.md"), "# t").unwrap();
        shell.run(&["add", "."]).unwrap();
        shell.run(&["commit", "-q", "-m", "init"]).unwrap();
        dir
    }

    fn fake_runtime() -> Arc<dyn ContainerRuntime> {
        Arc::new(crate::container::fake::FakeContainerRuntime::new())
    }

    /// §8: `run` returns the command's captured stdout and always stamps
    /// an append-only log note with the call's explanation, even when the
    /// command itself left the container's filesystem unchanged (so no new
    /// commit was needed).
    #[test]
    fn run_returns_stdout_and_always_stamps_the_log_note() {
        let user_dir = init_user_repo();
        let repos_root = tempfile::TempDir::new().unwrap();
        let worktrees_root = tempfile::TempDir::new().unwrap();
        let fork = Fork::open(user_dir.path(), repos_root.path()).unwrap();

        let mut env = Environment::open_or_create(
            &fork,
            worktrees_root.path(),
            fake_runtime(),
            SecretsConfig::default(),
            &[],
            Some("demo"),
            EnvironmentSpec::default(),
            "create demo",
        )
        .unwrap();

        let stdout = env.run("echo hi", "sh", false, "say hi").unwrap();
        assert_eq!(stdout, b"ran: echo hi\n");

        let log = fork.shell().run(&["notes", "--ref", "container-use", "show", "demo"]).unwrap();
        assert!(log.contains("say hi"));
    }

    /// §8: writing then reading a file round-trips through the fake
    /// container's virtual filesystem and lands in the worktree on disk.
    #[test]
    fn file_write_then_file_read_round_trips() {
        let user_dir = init_user_repo();
        let repos_root = tempfile::TempDir::new().unwrap();
        let worktrees_root = tempfile::TempDir::new().unwrap();
        let fork = Fork::open(user_dir.path(), repos_root.path()).unwrap();

        let mut env = Environment::open_or_create(
            &fork,
            worktrees_root.path(),
            fake_runtime(),
            SecretsConfig::default(),
            &[],
            Some("demo"),
            EnvironmentSpec::default(),
            "create demo",
        )
        .unwrap();

        env.file_write("a.py", b"print(1)", "add a.py").unwrap();
        let text = env.file_read("a.py", true, None, None).unwrap();
        assert_eq!(text, "print(1)");
        assert_eq!(std::fs::read(env.worktree_path.join("a.py")).unwrap(), b"print(1)");
    }

    /// §4.8 `revert`: resetting to `HEAD~1` restores the prior commit's tree
    /// and drops the cached image so the next operation reseeds it.
    #[test]
    fn revert_resets_branch_and_worktree_to_the_prior_commit() {
        let user_dir = init_user_repo();
        let repos_root = tempfile::TempDir::new().unwrap();
        let worktrees_root = tempfile::TempDir::new().unwrap();
        let fork = Fork::open(user_dir.path(), repos_root.path()).unwrap();

        let mut env = Environment::open_or_create(
            &fork,
            worktrees_root.path(),
            fake_runtime(),
            SecretsConfig::default(),
            &[],
            Some("demo"),
            EnvironmentSpec::default(),
            "create demo",
        )
        .unwrap();

        env.file_write("a.py", b"print(1)", "add a.py").unwrap();
        assert!(env.worktree_path.join("a.py").exists());

        env.revert(1, "back out a.py").unwrap();

        assert!(!env.worktree_path.join("a.py").exists());
        assert!(env.image.is_none());
    }

    /// §8 S5: forking at the default (latest) version produces a sibling
    /// branch whose tree matches the source and whose state snapshot is a
    /// copy, not a shared reference.
    #[test]
    fn fork_copies_state_onto_an_independent_branch() {
        let user_dir = init_user_repo();
        let repos_root = tempfile::TempDir::new().unwrap();
        let worktrees_root = tempfile::TempDir::new().unwrap();
        let fork = Fork::open(user_dir.path(), repos_root.path()).unwrap();

        let source = Environment::open_or_create(
            &fork,
            worktrees_root.path(),
            fake_runtime(),
            SecretsConfig::default(),
            &[],
            Some("source"),
            EnvironmentSpec::default(),
            "create source",
        )
        .unwrap();

        let forked = source
            .fork(worktrees_root.path(), &["source".to_string()], Some("forked"), None)
            .unwrap();

        assert_eq!(forked.id, "forked");
        assert!(forked.worktree_path.join("README.md").exists());

        let source_tree = fork.shell().run(&["rev-parse", "source^{tree}"]).unwrap();
        let forked_tree = fork.shell().run(&["rev-parse", "forked^{tree}"]).unwrap();
        assert_eq!(source_tree, forked_tree);
    }
}
