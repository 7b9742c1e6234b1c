//! Serializes environment config/state into git notes at two disjoint refs
//! and propagates them between the fork and the user repo (§4.6).

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::fork::Fork;

pub const STATE_REF: &str = "container-use-state";
pub const LOG_REF: &str = "container-use";

/// Mutable configuration for an environment (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EnvironmentConfig {
    pub base_image: String,
    pub setup_commands: Vec<String>,
    pub instructions: String,
    pub workdir: String,
    pub secrets: Vec<String>,
}

/// Mutable state for an environment (§3). `notes` is the in-memory,
/// append-only buffer of operation explanations awaiting a flush to the
/// log ref; it is cleared once those entries have been appended there.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EnvironmentState {
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// The combined payload written to the state note ref.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub config: EnvironmentConfig,
    pub state: EnvironmentState,
}

/// Overwrite the state note for `id`'s branch tip with `snapshot`.
pub fn save_state(fork: &Fork, id: &str, snapshot: &StateSnapshot) -> Result<(), EngineError> {
    let json = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| EngineError::ContainerFailure(format!("state serialization failed: {e}")))?;

    let mut file = tempfile::NamedTempFile::new()?;
    std::io::Write::write_all(&mut file, &json)?;

    fork.shell().run(&[
        "notes",
        "--ref",
        STATE_REF,
        "add",
        "-f",
        "-F",
        &file.path().display().to_string(),
        id,
    ])?;

    Ok(())
}

/// Read back and deserialize the state note for `id`'s branch tip.
pub fn load_state(fork: &Fork, id: &str) -> Result<StateSnapshot, EngineError> {
    let raw = fork
        .shell()
        .run(&["notes", "--ref", STATE_REF, "show", id])?;
    serde_json::from_str(&raw)
        .map_err(|e| EngineError::ContainerFailure(format!("state note is corrupt: {e}")))
}

/// True when `id`'s branch tip has a state note — used by `List` to
/// distinguish environments from incidental user branches cloned into the
/// bare mirror.
pub fn has_state(fork: &Fork, id: &str) -> bool {
    fork.shell()
        .run(&["notes", "--ref", STATE_REF, "show", id])
        .is_ok()
}

/// Append one free-text operation explanation to the log note for `id`.
pub fn append_log(fork: &Fork, id: &str, explanation: &str) -> Result<(), EngineError> {
    fork.shell()
        .run(&["notes", "--ref", LOG_REF, "append", "-m", explanation, id])?;
    Ok(())
}

/// Fetch `refs/notes/<note_ref>` from the fork into the user repo. On
/// `[rejected]` (non-fast-forward — typical after the engine rewrote
/// notes), delete the local ref and retry once; a second failure is
/// surfaced as [`EngineError::ConflictingState`].
pub fn propagate_notes(fork: &Fork, note_ref: &str) -> Result<(), EngineError> {
    let refspec = format!("refs/notes/{note_ref}:refs/notes/{note_ref}");
    let user_shell = fork.user_shell();

    match user_shell.run(&["fetch", "container-use", &refspec]) {
        Ok(_) => Ok(()),
        Err(EngineError::GitFailure { output, .. }) if output.contains("[rejected]") => {
            let full_ref = format!("refs/notes/{note_ref}");
            let _ = user_shell.run(&["update-ref", "-d", &full_ref]);
            user_shell
                .run(&["fetch", "container-use", &refspec])
                .map_err(|e| {
                    EngineError::ConflictingState(format!(
                        "notes fetch rejected twice for {note_ref}: {e}"
                    ))
                })?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitShell;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir, Fork) {
        let user_dir = TempDir::new().unwrap();
        let shell = GitShell::at(user_dir.path());
        shell.run(&["init", "-q"]).unwrap();
        shell.run(&["config", "user.email", "t@t.t"]).unwrap();
        shell.run(&["config", "user.name", "T"]).unwrap();
        std::fs::write(user_dir.path().join("README.md"), "# t").unwrap();
        shell.run(&["add", "."]).unwrap();
        shell.run(&["commit", "-q", "-m", "init"]).unwrap();

        let repos_root = TempDir::new().unwrap();
        let fork = Fork::open(user_dir.path(), repos_root.path()).unwrap();

        let sha = GitShell::at(user_dir.path()).run(&["rev-parse", "HEAD"]).unwrap();
        fork.user_shell()
            .run(&["push", "container-use", &format!("{sha}:refs/heads/demo"), "--force"])
            .unwrap();

        (user_dir, repos_root, fork)
    }

    #[test]
    fn state_round_trips_through_notes() {
        let (_user_dir, _repos_root, fork) = setup();
        let snapshot = StateSnapshot {
            config: EnvironmentConfig {
                base_image: "busybox".to_string(),
                ..Default::default()
            },
            state: EnvironmentState {
                title: "Demo".to_string(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
                notes: vec![],
            },
        };

        save_state(&fork, "demo", &snapshot).unwrap();
        let loaded = load_state(&fork, "demo").unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn has_state_is_false_before_any_note_is_written() {
        let (_user_dir, _repos_root, fork) = setup();
        assert!(!has_state(&fork, "demo"));
    }

    #[test]
    fn append_log_accumulates_entries() {
        let (_user_dir, _repos_root, fork) = setup();
        append_log(&fork, "demo", "created environment").unwrap();
        append_log(&fork, "demo", "ran a command").unwrap();

        let log = fork
            .shell()
            .run(&["notes", "--ref", LOG_REF, "show", "demo"])
            .unwrap();
        assert!(log.contains("created environment"));
        assert!(log.contains("ran a command"));
    }

    #[test]
    fn propagate_notes_recovers_from_rejected_fetch() {
        let (_user_dir, _repos_root, fork) = setup();
        let snapshot = StateSnapshot::default();
        save_state(&fork, "demo", &snapshot).unwrap();
        propagate_notes(&fork, STATE_REF).unwrap();

        // Overwrite the note again on the fork side — the user repo's local
        // copy is now stale and a second plain fetch would be rejected.
        let mut updated = snapshot.clone();
        updated.state.title = "Updated".to_string();
        save_state(&fork, "demo", &updated).unwrap();

        propagate_notes(&fork, STATE_REF).unwrap();

        let raw = fork
            .user_shell()
            .run(&["notes", "--ref", STATE_REF, "show", "demo"])
            .unwrap();
        let loaded: StateSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded.state.title, "Updated");
    }
}
