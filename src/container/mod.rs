//! Contract for building, running, exporting, and terminal-attaching
//! containers (§4.7). The engine is agnostic to the backing runtime; this
//! crate ships one concrete adapter ([`shell::ShellContainerRuntime`]) that
//! drives a local `docker`/`podman` CLI, but any implementation of
//! [`ContainerRuntime`] can be substituted.

#[cfg(test)]
pub(crate) mod fake;
pub mod shell;

use std::path::Path;

use crate::error::EngineError;

/// Opaque identifier for a built/running container instance. The shipped
/// shell adapter uses a content-addressed container name so that repeat
/// builds of an identical `(base_image, setup_commands, secrets)` tuple
/// resolve to the same snapshot instead of rebuilding.
pub type ImageSnapshot = String;

/// One side of a forwarded port returned by [`ContainerRuntime::run_background`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub internal_endpoint: String,
    pub external_endpoint: String,
}

/// A secret already resolved to its plaintext value (§3's `NAME=schema://value`
/// strings, resolved by [`crate::secrets`]). The runtime never sees the raw
/// schema string, only the final name/value pair to inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub name: String,
    pub value: String,
}

/// Capability contract consumed by the Environment state machine (C8).
/// Implementations must be deterministic given identical
/// `(base_image, setup_commands, secrets)` so that repeat builds hit the
/// runtime's content cache.
pub trait ContainerRuntime: std::fmt::Debug + Send + Sync {
    /// Build (or reuse a cached) container for `base_image` with
    /// `setup_commands` run in order and `secrets` injected as environment
    /// variables. The `bool` reports whether a new container was created
    /// (`true`) or an existing one with the same content hash was reused
    /// (`false`) — callers use this to decide whether the worktree's
    /// contents need seeding into the freshly created container via
    /// [`ContainerRuntime::import`].
    fn build(
        &self,
        base_image: &str,
        setup_commands: &[String],
        secrets: &[ResolvedSecret],
    ) -> Result<(ImageSnapshot, bool), EngineError>;

    /// Seed `image`'s `workdir` with the contents of host directory
    /// `source` (mirrors [`ContainerRuntime::export`] in reverse). Called
    /// once, right after a freshly built container, so the container's
    /// filesystem starts from the same state as the git worktree the
    /// engine is tracking.
    fn import(&self, image: &ImageSnapshot, workdir: &str, source: &Path) -> Result<(), EngineError>;

    /// Run `command` to completion inside `image`'s workdir, returning
    /// captured stdout. Suspends the caller until the process exits.
    fn run(
        &self,
        image: &ImageSnapshot,
        workdir: &str,
        command: &str,
        shell: &str,
        use_entrypoint: bool,
    ) -> Result<Vec<u8>, EngineError>;

    /// Start `command` detached inside `image`'s workdir and return once
    /// the process has been daemonized, along with any requested port
    /// forwards. Background side effects are intentionally not exported
    /// back into the worktree (§4.8).
    fn run_background(
        &self,
        image: &ImageSnapshot,
        workdir: &str,
        command: &str,
        shell: &str,
        ports: &[u16],
        use_entrypoint: bool,
    ) -> Result<Vec<Endpoint>, EngineError>;

    /// Wipe `dest` (preserving `.git`) and write `image`'s `workdir`
    /// contents into it.
    fn export(&self, image: &ImageSnapshot, workdir: &str, dest: &Path) -> Result<(), EngineError>;

    fn file_read(&self, image: &ImageSnapshot, workdir: &str, path: &str) -> Result<Vec<u8>, EngineError>;
    fn file_write(
        &self,
        image: &ImageSnapshot,
        workdir: &str,
        path: &str,
        contents: &[u8],
    ) -> Result<(), EngineError>;
    fn file_list(&self, image: &ImageSnapshot, workdir: &str, path: &str) -> Result<Vec<String>, EngineError>;
    fn file_delete(&self, image: &ImageSnapshot, workdir: &str, path: &str) -> Result<(), EngineError>;

    /// Attach an interactive TTY to `image`; blocks until the session exits.
    fn terminal(&self, image: &ImageSnapshot, workdir: &str) -> Result<(), EngineError>;

    /// Diff a host path/URL against a container path.
    fn remote_diff(&self, source: &Path, image: &ImageSnapshot, target: &str) -> Result<String, EngineError>;
}
