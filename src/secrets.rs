//! Resolves `NAME=schema://value` secret strings (§3) into the plaintext
//! environment variables handed to the container runtime. Resolved values
//! are never logged.

use std::path::Path;

use crate::config::SecretsConfig;
use crate::container::ResolvedSecret;
use crate::error::EngineError;

/// Resolve every `NAME=schema://value` string in `specs`, in order.
pub fn resolve_all(specs: &[String], config: &SecretsConfig) -> Result<Vec<ResolvedSecret>, EngineError> {
    specs.iter().map(|s| resolve_one(s, config)).collect()
}

fn resolve_one(spec: &str, config: &SecretsConfig) -> Result<ResolvedSecret, EngineError> {
    let (name, rest) = spec.split_once('=').ok_or_else(|| {
        EngineError::ContainerFailure(format!("malformed secret spec (missing '='): {spec}"))
    })?;

    let value = if let Some(path) = rest.strip_prefix("file://") {
        std::fs::read_to_string(Path::new(path))
            .map(|s| s.trim_end_matches('\n').to_string())
            .map_err(|e| EngineError::ContainerFailure(format!("secret '{name}': {e}")))?
    } else if let Some(var) = rest.strip_prefix("env://") {
        std::env::var(var).map_err(|_| {
            EngineError::ContainerFailure(format!("secret '{name}': env var '{var}' is not set"))
        })?
    } else if let Some(reference) = rest.strip_prefix("op://") {
        run_op(&config.op_binary, reference)?
    } else {
        return Err(EngineError::ContainerFailure(format!(
            "secret '{name}': unrecognized schema in '{rest}' (expected file://, env://, or op://)"
        )));
    };

    Ok(ResolvedSecret {
        name: name.to_string(),
        value,
    })
}

fn run_op(op_binary: &str, reference: &str) -> Result<String, EngineError> {
    let output = std::process::Command::new(op_binary)
        .args(["read", &format!("op://{reference}")])
        .output()
        .map_err(|e| EngineError::ContainerFailure(format!("failed to invoke '{op_binary}': {e}")))?;

    if !output.status.success() {
        return Err(EngineError::ContainerFailure(format!(
            "'{op_binary} read op://{reference}' failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .trim_end_matches('\n')
        .to_string())
}
