//! Invokes the external `git` binary, classifying exit codes.
//!
//! This is the only place in the crate that spawns `git` directly; every
//! other module goes through [`GitShell`] so tracing and error
//! classification stay consistent.

use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::EngineError;
use crate::shell_exec::run;

/// A `git` invocation scoped to a working directory.
#[derive(Debug, Clone)]
pub struct GitShell {
    dir: std::path::PathBuf,
}

impl GitShell {
    pub fn at(dir: impl Into<std::path::PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `git <args>`, capturing combined output. Returns stdout (trimmed)
    /// on success; on non-zero exit, an [`EngineError::GitFailure`] carrying
    /// the exit code and combined stdout+stderr.
    pub fn run(&self, args: &[&str]) -> Result<String, EngineError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.dir).args(args);
        let output = run(&mut cmd, Some(&self.dir.display().to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            Err(EngineError::GitFailure {
                exit_code: output.status.code(),
                output: combined,
            })
        }
    }

    /// Like [`GitShell::run`], but feeds `stdin` to the child (used for
    /// `git apply`, `git notes ... -F -`-style invocations).
    pub fn run_with_stdin(&self, args: &[&str], stdin: &[u8]) -> Result<String, EngineError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.dir)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::debug!("$ git {} [{}]", args.join(" "), self.dir.display());
        let t0 = std::time::Instant::now();
        let mut child = cmd.spawn()?;
        child
            .stdin
            .take()
            .expect("stdin was piped")
            .write_all(stdin)?;
        let output = child.wait_with_output()?;
        log::debug!(
            "[trace] context={} cmd=\"git {}\" dur={:.1}ms ok={}",
            self.dir.display(),
            args.join(" "),
            t0.elapsed().as_secs_f64() * 1000.0,
            output.status.success()
        );

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            Err(EngineError::GitFailure {
                exit_code: output.status.code(),
                output: combined,
            })
        }
    }

    /// Streams the child's stdout to `writer` incrementally as it's
    /// produced, used by `log`/`diff` callers (§4.1) that want output as
    /// the command generates it rather than buffered into a `String`
    /// first, e.g. `git log -p`/`git diff` on a large repo. Stderr is read
    /// on a separate thread concurrently with the stdout copy so neither
    /// pipe can fill up and deadlock the child; it's only surfaced if the
    /// command exits non-zero.
    pub fn run_streaming(
        &self,
        args: &[&str],
        mut writer: impl std::io::Write,
    ) -> Result<(), EngineError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.dir)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::debug!("$ git {} [{}]", args.join(" "), self.dir.display());
        let t0 = std::time::Instant::now();
        let mut child = cmd.spawn()?;

        let mut stderr = child.stderr.take().expect("stderr was piped");
        let stderr_reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = std::io::Read::read_to_end(&mut stderr, &mut buf);
            buf
        });

        let mut stdout = child.stdout.take().expect("stdout was piped");
        let copy_result = std::io::copy(&mut stdout, &mut writer);

        let status = child.wait()?;
        let stderr_buf = stderr_reader.join().unwrap_or_default();

        log::debug!(
            "[trace] context={} cmd=\"git {}\" dur={:.1}ms ok={}",
            self.dir.display(),
            args.join(" "),
            t0.elapsed().as_secs_f64() * 1000.0,
            status.success()
        );

        copy_result?;

        if status.success() {
            Ok(())
        } else {
            Err(EngineError::GitFailure {
                exit_code: status.code(),
                output: String::from_utf8_lossy(&stderr_buf).into_owned(),
            })
        }
    }

    /// Exit code 2 on `git remote get-url <name>` means the remote does not
    /// exist; any other non-zero exit is a real failure.
    pub fn remote_url(&self, name: &str) -> Result<Option<String>, EngineError> {
        match self.run(&["remote", "get-url", name]) {
            Ok(url) => Ok(Some(url)),
            Err(EngineError::GitFailure { exit_code, .. })
                if crate::error::is_not_found_exit(exit_code) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let shell = GitShell::at(dir.path());
        shell.run(&["init", "-q"]).unwrap();
        shell.run(&["config", "user.email", "test@test.test"]).unwrap();
        shell.run(&["config", "user.name", "Test"]).unwrap();
        dir
    }

    #[test]
    fn run_captures_stdout_on_success() {
        let dir = init_repo();
        let shell = GitShell::at(dir.path());
        let out = shell.run(&["rev-parse", "--is-bare-repository"]).unwrap();
        assert_eq!(out, "false");
    }

    #[test]
    fn run_classifies_failure_exit_code() {
        let dir = init_repo();
        let shell = GitShell::at(dir.path());
        let err = shell.run(&["rev-parse", "--verify", "nonexistent"]).unwrap_err();
        match err {
            EngineError::GitFailure { exit_code, .. } => assert_eq!(exit_code, Some(128)),
            other => panic!("expected GitFailure, got {other:?}"),
        }
    }

    #[test]
    fn remote_url_is_none_when_remote_missing() {
        let dir = init_repo();
        let shell = GitShell::at(dir.path());
        assert_eq!(shell.remote_url("container-use").unwrap(), None);
    }

    #[test]
    fn remote_url_returns_configured_url() {
        let dir = init_repo();
        let shell = GitShell::at(dir.path());
        shell
            .run(&["remote", "add", "origin", "https://example.com/a/b.git"])
            .unwrap();
        assert_eq!(
            shell.remote_url("origin").unwrap(),
            Some("https://example.com/a/b.git".to_string())
        );
    }

    #[test]
    fn run_streaming_writes_stdout_to_the_given_writer() {
        let dir = init_repo();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let shell = GitShell::at(dir.path());
        shell.run(&["add", "."]).unwrap();
        shell.run(&["commit", "-q", "-m", "add a.txt"]).unwrap();

        let mut out = Vec::new();
        shell.run_streaming(&["log", "--oneline"], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("add a.txt"));
    }

    #[test]
    fn run_streaming_surfaces_stderr_on_failure() {
        let dir = init_repo();
        let shell = GitShell::at(dir.path());

        let mut out = Vec::new();
        let err = shell
            .run_streaming(&["log", "--oneline", "does-not-exist"], &mut out)
            .unwrap_err();
        match err {
            EngineError::GitFailure { output, .. } => {
                assert!(!output.is_empty(), "expected stderr to be captured on failure")
            }
            other => panic!("expected GitFailure, got {other:?}"),
        }
    }
}
