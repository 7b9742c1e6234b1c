//! MCP (Model Context Protocol) tool-call server exposing the §6.3
//! environment operations over stdio (§4.10).
//!
//! Grounded on the only pack example built against the official Rust MCP
//! SDK (`jmalicki/subagent-worktree-mcp`): the `tool_router`/`#[tool]`
//! macro shape, `Parameters<T>` argument wrapping, and fallible handlers
//! returning `Result<String, String>` so a failing tool call becomes a
//! tool-error content block rather than a transport-level failure.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, ServiceExt, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::environment::EnvironmentSpec;
use crate::repository::Repository;

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"response serialization failed: {e}\"}}"))
}

fn parse_envs(vars: &[String]) -> Result<Vec<(String, String)>, String> {
    vars.iter()
        .map(|v| {
            v.split_once('=')
                .map(|(k, val)| (k.to_string(), val.to_string()))
                .ok_or_else(|| format!("malformed NAME=VALUE pair: {v}"))
        })
        .collect()
}

/// Run a synchronous repository call on a blocking-pool thread (§5): every
/// `Repository`/`Environment` method shells out to `git`/the container CLI
/// via `std::process::Command::output()`, which blocks the calling thread
/// until the subprocess exits. Running that inline on the async task would
/// tie up a tokio worker thread for the duration — including the one
/// driving `shutdown_signal()` in `main.rs` — undermining cooperative
/// SIGINT/SIGTERM shutdown while a long `git`/`docker` call is in flight.
async fn blocking<T, F>(f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| format!("worker thread panicked: {e}"))
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentOpenArgs {
    /// Existing environment name to load, or a user-chosen name for a new
    /// one. Omit to let the engine generate a petname ID.
    pub name: Option<String>,
    pub title: Option<String>,
    pub base_image: Option<String>,
    pub setup_commands: Option<Vec<String>>,
    pub instructions: Option<String>,
    pub workdir: Option<String>,
    pub secrets: Option<Vec<String>>,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentIdArgs {
    pub environment_id: String,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentUpdateArgs {
    pub environment_id: String,
    pub instructions: Option<String>,
    pub base_image: Option<String>,
    pub setup_commands: Option<Vec<String>>,
    pub secrets: Option<Vec<String>>,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentForkArgs {
    pub environment_id: String,
    pub new_name: Option<String>,
    /// Ancestor commit index into the environment's history (0 = latest);
    /// omit for latest. Must be a non-negative integer (§9 Open Question).
    pub version: Option<u64>,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentRevertArgs {
    pub environment_id: String,
    pub version: u64,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentRunCmdArgs {
    pub environment_id: String,
    pub command: String,
    pub shell: Option<String>,
    pub background: Option<bool>,
    pub use_entrypoint: Option<bool>,
    pub ports: Option<Vec<u16>>,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentSetEnvArgs {
    pub environment_id: String,
    /// `NAME=VALUE` pairs to set as plain container environment variables.
    pub envs: Vec<String>,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentUploadArgs {
    pub environment_id: String,
    pub local_path: String,
    pub container_path: String,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentDownloadArgs {
    pub environment_id: String,
    pub container_path: String,
    pub local_path: String,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentRemoteDiffArgs {
    pub environment_id: String,
    pub source_path: String,
    pub target_path: String,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentFileReadArgs {
    pub environment_id: String,
    pub target_file: String,
    pub should_read_entire_file: bool,
    pub start_line_one_indexed: Option<u32>,
    pub end_line_one_indexed_inclusive: Option<u32>,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentFileListArgs {
    pub environment_id: String,
    pub path: String,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentFileWriteArgs {
    pub environment_id: String,
    pub path: String,
    pub contents: String,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentFileDeleteArgs {
    pub environment_id: String,
    pub path: String,
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentRevisionDiffArgs {
    pub environment_id: String,
    pub path: String,
    pub from_version: u64,
    pub to_version: Option<u64>,
    pub explanation: String,
}

/// The MCP server bound to one user repo's [`Repository`]. One process
/// serves exactly one repo, matching the stdio transport's single-session
/// model (§5: one agent session issues tool calls serially).
#[derive(Clone)]
pub struct AgentProtocolServer {
    repository: Arc<Repository>,
    tool_router: ToolRouter<Self>,
}

impl AgentProtocolServer {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self {
            repository,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl AgentProtocolServer {
    #[tool(description = "Open an existing environment by name, or create a new one")]
    async fn environment_open(&self, params: Parameters<EnvironmentOpenArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            let spec = EnvironmentSpec {
                base_image: args.base_image.unwrap_or_default(),
                setup_commands: args.setup_commands.unwrap_or_default(),
                instructions: args.instructions.unwrap_or_default(),
                workdir: args.workdir.unwrap_or_default(),
                secrets: args.secrets.unwrap_or_default(),
                title: args.title.unwrap_or_default(),
            };
            repo.create(args.name.as_deref(), spec, &args.explanation)
                .map(|r| to_json(&r))
                .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "Update an environment's configuration and rebuild its container")]
    async fn environment_update(&self, params: Parameters<EnvironmentUpdateArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.update(
                &args.environment_id,
                args.instructions,
                args.base_image,
                args.setup_commands,
                args.secrets,
                &args.explanation,
            )
            .map(|r| to_json(&r))
            .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "List all environments for this repository")]
    async fn environment_list(&self, params: Parameters<EnvironmentListArgs>) -> Result<String, String> {
        let _ = params.0.explanation;
        let repo = self.repository.clone();
        blocking(move || repo.list().map(|r| to_json(&r)).map_err(|e| e.to_string())).await?
    }

    #[tool(description = "Fork an environment at a given point in its history into a new one")]
    async fn environment_fork(&self, params: Parameters<EnvironmentForkArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.fork_environment(&args.environment_id, args.new_name.as_deref(), args.version)
                .map(|r| to_json(&r))
                .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "List the commit history of an environment since it diverged from the user's branch")]
    async fn environment_history(&self, params: Parameters<EnvironmentIdArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.history(&args.environment_id)
                .map(|r| to_json(&r))
                .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "Revert an environment to an earlier point in its history")]
    async fn environment_revert(&self, params: Parameters<EnvironmentRevertArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.revert(&args.environment_id, args.version, &args.explanation)
                .map(|r| to_json(&r))
                .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "Run a command inside an environment's container, foreground or background")]
    async fn environment_run_cmd(&self, params: Parameters<EnvironmentRunCmdArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            let shell = args.shell.unwrap_or_else(|| "sh".to_string());
            let use_entrypoint = args.use_entrypoint.unwrap_or(false);

            if args.background.unwrap_or(false) {
                let ports = args.ports.unwrap_or_default();
                repo.run_background(
                    &args.environment_id,
                    &args.command,
                    &shell,
                    &ports,
                    use_entrypoint,
                    &args.explanation,
                )
                .map(|endpoints| to_json(&endpoints))
                .map_err(|e| e.to_string())
            } else {
                repo.run(&args.environment_id, &args.command, &shell, use_entrypoint, &args.explanation)
                    .map(|stdout| String::from_utf8_lossy(&stdout).into_owned())
                    .map_err(|e| e.to_string())
            }
        })
        .await?
    }

    #[tool(description = "Set plain environment variables for an environment's container")]
    async fn environment_set_env(&self, params: Parameters<EnvironmentSetEnvArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            let vars = parse_envs(&args.envs)?;
            repo.set_env(&args.environment_id, vars, &args.explanation)
                .map(|r| to_json(&r))
                .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "Upload a file from the host into an environment's container")]
    async fn environment_upload(&self, params: Parameters<EnvironmentUploadArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.upload(
                &args.environment_id,
                &PathBuf::from(&args.local_path),
                &args.container_path,
                &args.explanation,
            )
            .map(|_| format!("uploaded {} to {}", args.local_path, args.container_path))
            .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "Download a file out of an environment's container onto the host")]
    async fn environment_download(&self, params: Parameters<EnvironmentDownloadArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.download(&args.environment_id, &args.container_path, &PathBuf::from(&args.local_path))
                .map(|_| format!("downloaded {} to {}", args.container_path, args.local_path))
                .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "Diff a host path/URL against a path inside an environment's container")]
    async fn environment_remote_diff(&self, params: Parameters<EnvironmentRemoteDiffArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.remote_diff(&args.environment_id, std::path::Path::new(&args.source_path), &args.target_path)
                .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "Read a file (or a line range of it) from an environment's container")]
    async fn environment_file_read(&self, params: Parameters<EnvironmentFileReadArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.file_read(
                &args.environment_id,
                &args.target_file,
                args.should_read_entire_file,
                args.start_line_one_indexed,
                args.end_line_one_indexed_inclusive,
            )
            .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "List the contents of a directory inside an environment's container")]
    async fn environment_file_list(&self, params: Parameters<EnvironmentFileListArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.file_list(&args.environment_id, &args.path)
                .map(|entries| entries.join("\n"))
                .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "Write a file inside an environment's container")]
    async fn environment_file_write(&self, params: Parameters<EnvironmentFileWriteArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.file_write(&args.environment_id, &args.path, args.contents.as_bytes(), &args.explanation)
                .map(|_| format!("wrote {}", args.path))
                .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "Delete a file inside an environment's container")]
    async fn environment_file_delete(&self, params: Parameters<EnvironmentFileDeleteArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.file_delete(&args.environment_id, &args.path, &args.explanation)
                .map(|_| format!("deleted {}", args.path))
                .map_err(|e| e.to_string())
        })
        .await?
    }

    #[tool(description = "Diff a path inside an environment between two points in its history")]
    async fn environment_revision_diff(&self, params: Parameters<EnvironmentRevisionDiffArgs>) -> Result<String, String> {
        let args = params.0;
        let repo = self.repository.clone();
        blocking(move || {
            repo.revision_diff(&args.environment_id, &args.path, args.from_version, args.to_version)
                .map_err(|e| e.to_string())
        })
        .await?
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentListArgs {
    pub explanation: String,
}

#[tool_handler]
impl ServerHandler for AgentProtocolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "container-use-agentd".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Tools for creating and driving isolated, containerized development \
                 environments backed by per-environment git branches. Every tool takes \
                 an `explanation` string recorded into the environment's operation log."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

/// Serve the Agent Protocol over stdio until the peer disconnects.
pub async fn serve(repository: Arc<Repository>) -> anyhow::Result<()> {
    let server = AgentProtocolServer::new(repository);
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
