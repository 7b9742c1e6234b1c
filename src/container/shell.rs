//! Drives a local `docker`/`podman` CLI as the shipped [`ContainerRuntime`]
//! implementation, the same way [`crate::git::GitShell`] drives `git`:
//! every invocation goes through the shared [`crate::shell_exec::run`]
//! helper for consistent logging, timing, and error classification.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::process::Command;

use crate::error::EngineError;
use crate::shell_exec::run as run_traced;

use super::{ContainerRuntime, Endpoint, ImageSnapshot, ResolvedSecret};

/// Drives either `docker` or `podman`, auto-detected via `which` unless a
/// specific binary is requested (`EngineConfig::container_runtime`).
#[derive(Debug, Clone)]
pub struct ShellContainerRuntime {
    binary: String,
}

impl ShellContainerRuntime {
    /// Resolve the runtime binary from `preference` (`"docker"`, `"podman"`,
    /// or `"auto"` to probe both via `which`).
    pub fn with_preference(preference: &str) -> Result<Self, EngineError> {
        let binary = match preference {
            "docker" => "docker".to_string(),
            "podman" => "podman".to_string(),
            _ => which::which("docker")
                .map(|_| "docker".to_string())
                .or_else(|_| which::which("podman").map(|_| "podman".to_string()))
                .map_err(|_| {
                    EngineError::ContainerFailure(
                        "neither docker nor podman found on PATH".to_string(),
                    )
                })?,
        };
        Ok(Self { binary })
    }

    fn cmd(&self, args: &[&str]) -> Result<String, EngineError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        let output = run_traced(&mut cmd, None)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(EngineError::ContainerFailure(format!(
                "{} {} failed: {}{}",
                self.binary,
                args.join(" "),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            )))
        }
    }

    fn is_running(&self, name: &str) -> bool {
        self.cmd(&["inspect", "-f", "{{.State.Running}}", name])
            .map(|out| out == "true")
            .unwrap_or(false)
    }

    fn exists(&self, name: &str) -> bool {
        self.cmd(&["inspect", "-f", "{{.Id}}", name]).is_ok()
    }
}

/// Deterministic container name for a `(base_image, setup_commands, secret
/// names)` tuple, so repeat builds with identical inputs reuse the same
/// container instead of rebuilding it. Secret *values* are deliberately
/// excluded from the hash so the container name never leaks them.
fn content_hash(base_image: &str, setup_commands: &[String], secrets: &[ResolvedSecret]) -> String {
    let mut hasher = DefaultHasher::new();
    base_image.hash(&mut hasher);
    setup_commands.hash(&mut hasher);
    for s in secrets {
        s.name.hash(&mut hasher);
    }
    format!("container-use-{:016x}", hasher.finish())
}

fn parent_dir(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "/".to_string())
}

impl ContainerRuntime for ShellContainerRuntime {
    fn build(
        &self,
        base_image: &str,
        setup_commands: &[String],
        secrets: &[ResolvedSecret],
    ) -> Result<(ImageSnapshot, bool), EngineError> {
        let name = content_hash(base_image, setup_commands, secrets);

        if self.is_running(&name) {
            return Ok((name, false));
        }
        if self.exists(&name) {
            self.cmd(&["start", &name])?;
            return Ok((name, false));
        }

        let mut args: Vec<String> = vec!["run".into(), "-d".into(), "--name".into(), name.clone()];
        for s in secrets {
            args.push("-e".into());
            args.push(format!("{}={}", s.name, s.value));
        }
        args.push(base_image.to_string());
        args.push("sh".into());
        args.push("-c".into());
        args.push("while :; do sleep 3600; done".into());

        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.cmd(&refs)?;

        for setup_command in setup_commands {
            self.cmd(&["exec", &name, "sh", "-c", setup_command])?;
        }

        Ok((name, true))
    }

    fn import(&self, image: &ImageSnapshot, workdir: &str, source: &Path) -> Result<(), EngineError> {
        self.cmd(&["exec", image, "mkdir", "-p", workdir])?;
        let dest = format!("{image}:{workdir}");
        // Trailing "/." copies the directory's contents rather than the
        // directory itself, matching `export`'s reverse-direction copy.
        let source_spec = format!("{}/.", source.display());
        self.cmd(&["cp", &source_spec, &dest])?;
        Ok(())
    }

    fn run(
        &self,
        image: &ImageSnapshot,
        workdir: &str,
        command: &str,
        shell: &str,
        use_entrypoint: bool,
    ) -> Result<Vec<u8>, EngineError> {
        let output = if use_entrypoint {
            self.cmd(&["exec", "-w", workdir, image, command])?
        } else {
            self.cmd(&["exec", "-w", workdir, image, shell, "-c", command])?
        };
        Ok(output.into_bytes())
    }

    fn run_background(
        &self,
        image: &ImageSnapshot,
        workdir: &str,
        command: &str,
        shell: &str,
        ports: &[u16],
        use_entrypoint: bool,
    ) -> Result<Vec<Endpoint>, EngineError> {
        if use_entrypoint {
            self.cmd(&["exec", "-d", "-w", workdir, image, command])?;
        } else {
            self.cmd(&["exec", "-d", "-w", workdir, image, shell, "-c", command])?;
        }

        Ok(ports
            .iter()
            .map(|port| Endpoint {
                internal_endpoint: format!("localhost:{port}"),
                external_endpoint: format!("localhost:{port}"),
            })
            .collect())
    }

    fn export(&self, image: &ImageSnapshot, workdir: &str, dest: &Path) -> Result<(), EngineError> {
        if dest.exists() {
            for entry in std::fs::read_dir(dest)? {
                let entry = entry?;
                if entry.file_name() == ".git" {
                    continue;
                }
                if entry.path().is_dir() {
                    std::fs::remove_dir_all(entry.path())?;
                } else {
                    std::fs::remove_file(entry.path())?;
                }
            }
        } else {
            std::fs::create_dir_all(dest)?;
        }

        let source = format!("{image}:{workdir}/.");
        self.cmd(&["cp", &source, &dest.display().to_string()])?;
        Ok(())
    }

    fn file_read(&self, image: &ImageSnapshot, workdir: &str, path: &str) -> Result<Vec<u8>, EngineError> {
        let full = format!("{workdir}/{path}");
        self.cmd(&["exec", image, "cat", &full]).map(|s| s.into_bytes())
    }

    fn file_write(
        &self,
        image: &ImageSnapshot,
        workdir: &str,
        path: &str,
        contents: &[u8],
    ) -> Result<(), EngineError> {
        let tmp = tempfile::NamedTempFile::new()?;
        std::fs::write(tmp.path(), contents)?;
        let full = format!("{workdir}/{path}");
        self.cmd(&["exec", image, "mkdir", "-p", &parent_dir(&full)])?;
        let dest = format!("{image}:{full}");
        self.cmd(&["cp", &tmp.path().display().to_string(), &dest])?;
        Ok(())
    }

    fn file_list(&self, image: &ImageSnapshot, workdir: &str, path: &str) -> Result<Vec<String>, EngineError> {
        let full = format!("{workdir}/{path}");
        let out = self.cmd(&["exec", image, "ls", "-1A", &full])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    fn file_delete(&self, image: &ImageSnapshot, workdir: &str, path: &str) -> Result<(), EngineError> {
        let full = format!("{workdir}/{path}");
        self.cmd(&["exec", image, "rm", "-rf", &full])?;
        Ok(())
    }

    fn terminal(&self, image: &ImageSnapshot, workdir: &str) -> Result<(), EngineError> {
        let status = Command::new(&self.binary)
            .args(["exec", "-it", "-w", workdir, image, "sh"])
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::ContainerFailure(format!(
                "terminal session exited with {status}"
            )))
        }
    }

    fn remote_diff(&self, source: &Path, image: &ImageSnapshot, target: &str) -> Result<String, EngineError> {
        let tmp = tempfile::tempdir()?;
        self.export(image, target, tmp.path())?;
        let output = Command::new("diff")
            .args([
                "-ruN",
                &source.display().to_string(),
                &tmp.path().display().to_string(),
            ])
            .output()?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
