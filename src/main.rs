//! `container-use-agentd`: the stdio Agent Protocol server binary (§4.10,
//! §6.5). The interactive CLI surface (`list`/`diff`/`checkout`/…) is an
//! external collaborator layered on the same [`Repository`] façade and is
//! out of scope for this crate (§1).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use container_use_engine::config::EngineConfig;
use container_use_engine::{EngineError, Repository};

fn init_logging(config: &EngineConfig) {
    let default_level = config.log_level.clone();
    let env = env_logger::Env::default().default_filter_or(default_level);
    env_logger::Builder::from_env(env).init();
}

/// Unix-only: on SIGUSR1, print the signal-listener thread's own backtrace
/// as a liveness probe ("the signal wiring is still alive"), the same
/// cooperative debugging hook the teacher wires up for its own long-lived
/// processes (§4.13, §5). `std::backtrace::Backtrace::force_capture()` has
/// no mechanism to inspect any thread other than the one calling it, so
/// this deliberately does NOT dump the worker/container-runtime threads
/// actually doing work — a real whole-process dump would need per-thread
/// signal broadcast and signal-handler-safe capture, which needs unsafe
/// code this crate's `forbid(unsafe_code)` lint rules out.
#[cfg(unix)]
fn install_signal_liveness_probe() -> anyhow::Result<()> {
    use signal_hook::consts::SIGUSR1;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGUSR1])?;
    std::thread::spawn(move || {
        for signal in signals.forever() {
            if signal == SIGUSR1 {
                let backtrace = std::backtrace::Backtrace::force_capture();
                eprintln!("=== container-use-agentd: signal-listener thread backtrace ===");
                eprintln!("{backtrace}");
                eprintln!("=== end backtrace (listener thread only, not a whole-process dump) ===");
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_liveness_probe() -> anyhow::Result<()> {
    Ok(())
}

/// Resolve the user repo this process serves: the current working
/// directory, which must be inside a git repository (§4.4 `Open`).
fn current_repo_path() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("failed to read current working directory")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::load().context("failed to load engine configuration")?;
    init_logging(&config);

    install_signal_liveness_probe().context("failed to install SIGUSR1 handler")?;

    let repo_path = current_repo_path()?;
    let repository = match Repository::open(&repo_path, &config) {
        Ok(repo) => Arc::new(repo),
        Err(EngineError::NotAGitRepo(path)) => {
            anyhow::bail!("not a git repository: {path}");
        }
        Err(e) => return Err(e.into()),
    };

    log::info!(
        "container-use-agentd serving {} (fork at {})",
        repository.user_repo_path().display(),
        repository.fork_repo_path().display()
    );

    tokio::select! {
        result = container_use_engine::protocol::serve(repository) => {
            result.context("agent protocol server exited with an error")?;
        }
        _ = shutdown_signal() => {
            log::info!("received shutdown signal, stopping cooperatively");
        }
    }

    Ok(())
}

/// SIGINT/SIGTERM cooperative shutdown (§5): the tool router holds no
/// buffered state across calls (every mutating operation stamps and
/// propagates its note before returning), so shutdown here is just
/// "stop accepting the next call" — nothing to flush.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
