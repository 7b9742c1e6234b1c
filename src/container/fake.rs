//! In-memory [`ContainerRuntime`] test double.
//!
//! Environment-lifecycle tests (fork, revert, file I/O, export/commit) need
//! to drive every `ContainerRuntime` call without a real `docker`/`podman`
//! daemon. This mirrors the virtual-filesystem-backed fakes the other pack
//! repos use in place of network-or-daemon-backed services under test.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::{ContainerRuntime, Endpoint, ImageSnapshot, ResolvedSecret};
use crate::error::EngineError;

type VirtualFs = HashMap<String, Vec<u8>>;

/// A container runtime backed by an in-memory map from image name to a
/// flat `path -> contents` filesystem. `build` is content-addressed exactly
/// like [`super::shell::ShellContainerRuntime`], so repeat builds with
/// identical `(base_image, setup_commands, secret names)` reuse the same
/// entry instead of creating a new one.
#[derive(Debug, Default)]
pub struct FakeContainerRuntime {
    images: Mutex<HashMap<ImageSnapshot, VirtualFs>>,
}

impl FakeContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn content_hash(base_image: &str, setup_commands: &[String], secrets: &[ResolvedSecret]) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        base_image.hash(&mut hasher);
        setup_commands.hash(&mut hasher);
        for s in secrets {
            s.name.hash(&mut hasher);
        }
        format!("fake-{:016x}", hasher.finish())
    }
}

fn walk_dir_into(fs: &mut VirtualFs, root: &Path, dir: &Path) -> Result<(), EngineError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_name() == ".git" {
            continue;
        }
        if path.is_dir() {
            walk_dir_into(fs, root, &path)?;
        } else {
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            fs.insert(rel, std::fs::read(&path)?);
        }
    }
    Ok(())
}

impl ContainerRuntime for FakeContainerRuntime {
    fn build(
        &self,
        base_image: &str,
        setup_commands: &[String],
        secrets: &[ResolvedSecret],
    ) -> Result<(ImageSnapshot, bool), EngineError> {
        let name = Self::content_hash(base_image, setup_commands, secrets);
        let mut images = self.images.lock().expect("fake runtime mutex poisoned");
        if images.contains_key(&name) {
            return Ok((name, false));
        }
        images.insert(name.clone(), VirtualFs::new());
        Ok((name, true))
    }

    fn import(&self, image: &ImageSnapshot, _workdir: &str, source: &Path) -> Result<(), EngineError> {
        let mut images = self.images.lock().expect("fake runtime mutex poisoned");
        let fs = images.entry(image.clone()).or_default();
        if source.exists() {
            walk_dir_into(fs, source, source)?;
        }
        Ok(())
    }

    fn run(
        &self,
        _image: &ImageSnapshot,
        _workdir: &str,
        command: &str,
        _shell: &str,
        _use_entrypoint: bool,
    ) -> Result<Vec<u8>, EngineError> {
        Ok(format!("ran: {command}\n").into_bytes())
    }

    fn run_background(
        &self,
        _image: &ImageSnapshot,
        _workdir: &str,
        _command: &str,
        _shell: &str,
        ports: &[u16],
        _use_entrypoint: bool,
    ) -> Result<Vec<Endpoint>, EngineError> {
        Ok(ports
            .iter()
            .map(|port| Endpoint {
                internal_endpoint: format!("localhost:{port}"),
                external_endpoint: format!("localhost:{port}"),
            })
            .collect())
    }

    fn export(&self, image: &ImageSnapshot, _workdir: &str, dest: &Path) -> Result<(), EngineError> {
        let images = self.images.lock().expect("fake runtime mutex poisoned");
        let fs = images.get(image).ok_or_else(|| {
            EngineError::ContainerFailure(format!("export: unknown image '{image}'"))
        })?;

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

        for (rel, contents) in fs {
            let target = dest.join(rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, contents)?;
        }
        Ok(())
    }

    fn file_read(&self, image: &ImageSnapshot, _workdir: &str, path: &str) -> Result<Vec<u8>, EngineError> {
        let images = self.images.lock().expect("fake runtime mutex poisoned");
        let fs = images.get(image).ok_or_else(|| {
            EngineError::ContainerFailure(format!("file_read: unknown image '{image}'"))
        })?;
        fs.get(path)
            .cloned()
            .ok_or_else(|| EngineError::ContainerFailure(format!("no such file: {path}")))
    }

    fn file_write(
        &self,
        image: &ImageSnapshot,
        _workdir: &str,
        path: &str,
        contents: &[u8],
    ) -> Result<(), EngineError> {
        let mut images = self.images.lock().expect("fake runtime mutex poisoned");
        let fs = images.entry(image.clone()).or_default();
        fs.insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    fn file_list(&self, image: &ImageSnapshot, _workdir: &str, path: &str) -> Result<Vec<String>, EngineError> {
        let images = self.images.lock().expect("fake runtime mutex poisoned");
        let fs = images.get(image).ok_or_else(|| {
            EngineError::ContainerFailure(format!("file_list: unknown image '{image}'"))
        })?;
        let prefix = if path.is_empty() || path == "." {
            String::new()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };
        Ok(fs
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .map(|k| k.trim_start_matches(&prefix as &str).to_string())
            .collect())
    }

    fn file_delete(&self, image: &ImageSnapshot, _workdir: &str, path: &str) -> Result<(), EngineError> {
        let mut images = self.images.lock().expect("fake runtime mutex poisoned");
        if let Some(fs) = images.get_mut(image) {
            fs.retain(|k, _| k != path && !k.starts_with(&format!("{path}/")));
        }
        Ok(())
    }

    fn terminal(&self, _image: &ImageSnapshot, _workdir: &str) -> Result<(), EngineError> {
        Ok(())
    }

    fn remote_diff(&self, _source: &Path, _image: &ImageSnapshot, _target: &str) -> Result<String, EngineError> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_is_content_addressed() {
        let runtime = FakeContainerRuntime::new();
        let (first, fresh) = runtime.build("busybox", &[], &[]).unwrap();
        assert!(fresh);
        let (second, fresh) = runtime.build("busybox", &[], &[]).unwrap();
        assert!(!fresh);
        assert_eq!(first, second);
    }

    #[test]
    fn write_then_read_round_trips() {
        let runtime = FakeContainerRuntime::new();
        let (image, _) = runtime.build("busybox", &[], &[]).unwrap();
        runtime.file_write(&image, "/work", "a.py", b"print(1)").unwrap();
        assert_eq!(runtime.file_read(&image, "/work", "a.py").unwrap(), b"print(1)");
    }

    #[test]
    fn delete_removes_the_file() {
        let runtime = FakeContainerRuntime::new();
        let (image, _) = runtime.build("busybox", &[], &[]).unwrap();
        runtime.file_write(&image, "/work", "a.py", b"x").unwrap();
        runtime.file_delete(&image, "/work", "a.py").unwrap();
        assert!(runtime.file_read(&image, "/work", "a.py").is_err());
    }

    #[test]
    fn export_writes_virtual_files_to_disk() {
        let runtime = FakeContainerRuntime::new();
        let (image, _) = runtime.build("busybox", &[], &[]).unwrap();
        runtime.file_write(&image, "/work", "a.py", b"print(1)").unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        runtime.export(&image, "/work", dir.path()).unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.py")).unwrap(), b"print(1)");
    }
}
