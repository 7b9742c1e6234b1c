//! Top-level façade: `Open`, `Create`, `Get`, `List`, `Update`, `Delete`,
//! `Checkout`, `Diff`, `Log` (§4.9). Owns the Fork and the in-memory
//! environment registry; every method that mutates shared git state
//! (fork branches, the user repo's `container-use` remote, notes) takes
//! the registry's mutex, which doubles as the per-repo lock §5 requires
//! to serialize `push`/`fetch`/`worktree add`/`notes` against each other.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::EngineConfig;
use crate::container::{ContainerRuntime, ShellContainerRuntime};
use crate::environment::{Environment, EnvironmentResponse, EnvironmentSpec};
use crate::error::EngineError;
use crate::fork::Fork;
use crate::git::GitShell;
use crate::petname;

const REMOTE_NAME: &str = "container-use";

/// An environment once loaded is kept resident for the life of the
/// `Repository`, or replaced with `Deleted` once removed — this is what
/// lets a second `Delete` of the same ID resolve as a no-op (§7, §8 S6)
/// instead of indistinguishably looking like an environment that never
/// existed.
enum Slot {
    Live(Environment),
    Deleted,
}

/// Façade over one user repo's fork, worktrees, and environment registry.
pub struct Repository {
    fork: Fork,
    worktrees_root: PathBuf,
    runtime: Arc<dyn ContainerRuntime>,
    secrets_config: crate::config::SecretsConfig,
    environments: Mutex<std::collections::HashMap<String, Slot>>,
}

impl Repository {
    /// §4.4 `Open`: discover/create the fork for the user repo containing
    /// `path`, and prepare the registry. Doesn't provision any environment
    /// worktrees yet — those are created lazily on first use.
    pub fn open(path: &Path, config: &EngineConfig) -> Result<Self, EngineError> {
        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(ShellContainerRuntime::with_preference(&config.container_runtime)?);
        Self::open_with_runtime(path, config, runtime)
    }

    /// Like [`Repository::open`], but with the container runtime injected
    /// rather than resolved from `config.container_runtime`. Production code
    /// always goes through `open`; this exists so environment-lifecycle
    /// tests can drive the full façade against an in-memory
    /// [`crate::container::fake::FakeContainerRuntime`] without a real
    /// `docker`/`podman` daemon.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn open_with_runtime(
        path: &Path,
        config: &EngineConfig,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, EngineError> {
        let state_root = config.resolved_state_root().ok_or_else(|| {
            EngineError::Io(std::io::Error::other("could not determine a state root directory"))
        })?;
        let repos_root = state_root.join("repos");
        let worktrees_root = state_root.join("worktrees");

        let fork = Fork::open(path, &repos_root)?;

        Ok(Self {
            fork,
            worktrees_root,
            runtime,
            secrets_config: config.secrets.clone(),
            environments: Mutex::new(std::collections::HashMap::new()),
        })
    }

    pub fn user_repo_path(&self) -> &Path {
        &self.fork.user_repo_path
    }

    pub fn fork_repo_path(&self) -> &Path {
        &self.fork.fork_repo_path
    }

    /// All branch names currently in the fork, used by the petname
    /// generator to avoid collisions.
    fn existing_branch_names(&self) -> Vec<String> {
        self.fork
            .shell()
            .run(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .map(|out| out.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// §4.8 `open_or_create`, exposed at façade level: create a new
    /// environment (or load `name` if it already exists).
    pub fn create(
        &self,
        name: Option<&str>,
        spec: EnvironmentSpec,
        explanation: &str,
    ) -> Result<EnvironmentResponse, EngineError> {
        let mut registry = self.environments.lock().expect("registry mutex poisoned");
        // Only needed for petname collision-avoidance when generating an ID;
        // a caller-supplied `name` must be validated before anything touches
        // git (§8 invariant 4), so don't shell out here when `name` is set.
        let existing = if name.is_none() { self.existing_branch_names() } else { Vec::new() };
        let env = Environment::open_or_create(
            &self.fork,
            &self.worktrees_root,
            self.runtime.clone(),
            self.secrets_config.clone(),
            &existing,
            name,
            spec,
            explanation,
        )?;
        let response = env.to_response();
        registry.insert(env.id.clone(), Slot::Live(env));
        Ok(response)
    }

    /// Run `f` against the environment named `id`, loading it from the fork
    /// (hydrating its worktree and state note) if it isn't already
    /// resident in the registry.
    fn with_env<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Environment) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let mut registry = self.environments.lock().expect("registry mutex poisoned");

        if !registry.contains_key(id) {
            if !crate::state::has_state(&self.fork, id) {
                return Err(EngineError::EnvironmentNotFound(id.to_string()));
            }
            let env = Environment::load(
                &self.fork,
                &self.worktrees_root,
                self.runtime.clone(),
                self.secrets_config.clone(),
                id,
            )?;
            registry.insert(id.to_string(), Slot::Live(env));
        }

        match registry.get_mut(id) {
            Some(Slot::Live(env)) => f(env),
            Some(Slot::Deleted) | None => Err(EngineError::EnvironmentNotFound(id.to_string())),
        }
    }

    pub fn get(&self, id: &str) -> Result<EnvironmentResponse, EngineError> {
        self.with_env(id, |env| Ok(env.to_response()))
    }

    /// §4.9 `List`: enumerate fork branches, hydrating only those that
    /// carry a state note — branches without one are user branches cloned
    /// incidentally into the bare mirror, not environments.
    pub fn list(&self) -> Result<Vec<EnvironmentResponse>, EngineError> {
        let mut out = Vec::new();
        for name in self.existing_branch_names() {
            if !crate::state::has_state(&self.fork, &name) {
                continue;
            }
            match self.get(&name) {
                Ok(response) => out.push(response),
                Err(EngineError::EnvironmentNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &self,
        id: &str,
        instructions: Option<String>,
        base_image: Option<String>,
        setup_commands: Option<Vec<String>>,
        secrets: Option<Vec<String>>,
        explanation: &str,
    ) -> Result<EnvironmentResponse, EngineError> {
        self.with_env(id, |env| {
            env.update(instructions, base_image, setup_commands, secrets, explanation)?;
            Ok(env.to_response())
        })
    }

    pub fn run(
        &self,
        id: &str,
        command: &str,
        shell: &str,
        use_entrypoint: bool,
        explanation: &str,
    ) -> Result<Vec<u8>, EngineError> {
        self.with_env(id, |env| env.run(command, shell, use_entrypoint, explanation))
    }

    pub fn run_background(
        &self,
        id: &str,
        command: &str,
        shell: &str,
        ports: &[u16],
        use_entrypoint: bool,
        explanation: &str,
    ) -> Result<Vec<crate::container::Endpoint>, EngineError> {
        self.with_env(id, |env| env.run_background(command, shell, ports, use_entrypoint, explanation))
    }

    pub fn set_env(&self, id: &str, vars: Vec<(String, String)>, explanation: &str) -> Result<EnvironmentResponse, EngineError> {
        self.with_env(id, |env| {
            env.set_env(vars, explanation)?;
            Ok(env.to_response())
        })
    }

    pub fn upload(&self, id: &str, local_path: &Path, container_path: &str, explanation: &str) -> Result<(), EngineError> {
        self.with_env(id, |env| env.upload(local_path, container_path, explanation))
    }

    pub fn download(&self, id: &str, container_path: &str, local_path: &Path) -> Result<(), EngineError> {
        self.with_env(id, |env| env.download(container_path, local_path))
    }

    pub fn file_read(
        &self,
        id: &str,
        path: &str,
        whole: bool,
        start_line: Option<u32>,
        end_line: Option<u32>,
    ) -> Result<String, EngineError> {
        self.with_env(id, |env| env.file_read(path, whole, start_line, end_line))
    }

    pub fn file_write(&self, id: &str, path: &str, contents: &[u8], explanation: &str) -> Result<(), EngineError> {
        self.with_env(id, |env| env.file_write(path, contents, explanation))
    }

    pub fn file_delete(&self, id: &str, path: &str, explanation: &str) -> Result<(), EngineError> {
        self.with_env(id, |env| env.file_delete(path, explanation))
    }

    pub fn file_list(&self, id: &str, path: &str) -> Result<Vec<String>, EngineError> {
        self.with_env(id, |env| env.file_list(path))
    }

    pub fn terminal(&self, id: &str) -> Result<(), EngineError> {
        self.with_env(id, |env| env.terminal())
    }

    pub fn remote_diff(&self, id: &str, source: &Path, target: &str) -> Result<String, EngineError> {
        self.with_env(id, |env| env.remote_diff(source, target))
    }

    pub fn history(&self, id: &str) -> Result<Vec<String>, EngineError> {
        self.with_env(id, |env| env.history())
    }

    pub fn revert(&self, id: &str, version: u64, explanation: &str) -> Result<EnvironmentResponse, EngineError> {
        self.with_env(id, |env| {
            env.revert(version, explanation)?;
            Ok(env.to_response())
        })
    }

    pub fn revision_diff(
        &self,
        id: &str,
        path: &str,
        from_version: u64,
        to_version: Option<u64>,
    ) -> Result<String, EngineError> {
        self.with_env(id, |env| env.revision_diff(path, from_version, to_version))
    }

    /// §4.8 `fork`: create a new environment descending from `id`'s history.
    pub fn fork_environment(
        &self,
        id: &str,
        new_name: Option<&str>,
        version: Option<u64>,
    ) -> Result<EnvironmentResponse, EngineError> {
        let mut registry = self.environments.lock().expect("registry mutex poisoned");

        if !registry.contains_key(id) {
            if !crate::state::has_state(&self.fork, id) {
                return Err(EngineError::EnvironmentNotFound(id.to_string()));
            }
            let env = Environment::load(
                &self.fork,
                &self.worktrees_root,
                self.runtime.clone(),
                self.secrets_config.clone(),
                id,
            )?;
            registry.insert(id.to_string(), Slot::Live(env));
        }

        let existing = self.existing_branch_names();
        let forked = match registry.get(id) {
            Some(Slot::Live(env)) => env.fork(&self.worktrees_root, &existing, new_name, version)?,
            _ => return Err(EngineError::EnvironmentNotFound(id.to_string())),
        };

        let response = forked.to_response();
        registry.insert(forked.id.clone(), Slot::Live(forked));
        Ok(response)
    }

    /// §4.9 `Delete`: tolerate a missing worktree or branch; idempotent —
    /// a second call on the same ID is a no-op success (§8 S6).
    pub fn delete(&self, id: &str) -> Result<(), EngineError> {
        let mut registry = self.environments.lock().expect("registry mutex poisoned");

        if matches!(registry.get(id), Some(Slot::Deleted)) {
            return Ok(());
        }

        let known_to_registry = registry.contains_key(id);
        let branch_exists = self.fork.shell().run(&["rev-parse", "--verify", id]).is_ok();
        let worktree_path = self.worktrees_root.join(id);

        if !known_to_registry && !branch_exists && !worktree_path.exists() {
            return Err(EngineError::EnvironmentNotFound(id.to_string()));
        }

        if worktree_path.exists() {
            let _ = self.fork.shell().run(&[
                "worktree",
                "remove",
                "--force",
                &worktree_path.display().to_string(),
            ]);
            let _ = std::fs::remove_dir_all(&worktree_path);
        }
        let _ = self.fork.shell().run(&["worktree", "prune"]);
        let _ = self.fork.shell().run(&["branch", "-D", id]);

        let user_shell = self.fork.user_shell();
        let _ = user_shell.run(&["branch", "-D", id]);
        let _ = user_shell.run(&["remote", "prune", REMOTE_NAME]);

        registry.insert(id.to_string(), Slot::Deleted);
        Ok(())
    }

    /// §4.9 `Checkout`: ensure a local branch tracks `container-use/<id>`
    /// and switch to it. Fails if the user's worktree is dirty.
    pub fn checkout(&self, id: &str, branch_name: Option<&str>) -> Result<(), EngineError> {
        if !crate::state::has_state(&self.fork, id) {
            return Err(EngineError::EnvironmentNotFound(id.to_string()));
        }

        let user_shell = self.fork.user_shell();
        let status = user_shell.run(&["status", "--porcelain"])?;
        if !status.trim().is_empty() {
            return Err(EngineError::ContainerFailure(
                "checkout refused: working tree has uncommitted changes".to_string(),
            ));
        }

        let branch = branch_name.unwrap_or(id);
        let tracking = format!("{REMOTE_NAME}/{id}");
        user_shell.run(&["fetch", REMOTE_NAME, id])?;

        if user_shell
            .run(&["rev-parse", "--verify", branch])
            .is_ok()
        {
            user_shell.run(&["checkout", branch])?;
        } else {
            user_shell.run(&["checkout", "-b", branch, "--track", &tracking])?;
        }
        Ok(())
    }

    /// §4.9 `Diff`: `merge-base(current_user_branch, container-use/<id>)`,
    /// then diff that range into `w`.
    pub fn diff(&self, id: &str, w: &mut impl std::io::Write) -> Result<(), EngineError> {
        if !crate::state::has_state(&self.fork, id) {
            return Err(EngineError::EnvironmentNotFound(id.to_string()));
        }

        let user_shell = self.fork.user_shell();
        user_shell.run(&["fetch", REMOTE_NAME, id])?;
        let tracking = format!("{REMOTE_NAME}/{id}");
        let current_branch = user_shell.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let merge_base = user_shell.run(&["merge-base", &current_branch, &tracking])?;
        user_shell.run_streaming(&["diff", &format!("{merge_base}..{tracking}")], w)
    }

    /// §4.9 `Log`: `git log [--patch] <revision_range>`, with the log-notes
    /// ref shown so operation explanations surface alongside commits.
    pub fn log(&self, id: &str, patch: bool, w: &mut impl std::io::Write) -> Result<(), EngineError> {
        if !crate::state::has_state(&self.fork, id) {
            return Err(EngineError::EnvironmentNotFound(id.to_string()));
        }

        let shell: GitShell = self.fork.shell();
        let notes_arg = format!("--notes={}", crate::state::LOG_REF);
        let mut args: Vec<&str> = vec!["log", &notes_arg];
        if patch {
            args.push("--patch");
        }
        args.push(id);
        shell.run_streaming(&args, w)
    }
}
