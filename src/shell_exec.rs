//! Traced external-process execution.
//!
//! This is the **only** way to run external commands in the engine. All
//! command execution (git and container CLI alike) goes through
//! [`run`] so every invocation gets consistent debug-level logging and
//! timing, regardless of call site.

use std::process::Command;

/// Execute a command with timing and debug logging.
///
/// ```text
/// $ git status [worktree-name]           # with context
/// $ docker build .                       # without context
/// [trace] context=worktree cmd="..." dur=12.3ms ok=true
/// ```
///
/// The `context` parameter is typically a working directory or worktree
/// name, or `None` for standalone CLI tools.
pub fn run(cmd: &mut Command, context: Option<&str>) -> std::io::Result<std::process::Output> {
    use std::time::Instant;

    let program = cmd.get_program().to_string_lossy();
    let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy()).collect();
    let cmd_str = if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    };

    match context {
        Some(ctx) => log::debug!("$ {} [{}]", cmd_str, ctx),
        None => log::debug!("$ {}", cmd_str),
    }

    let t0 = Instant::now();
    let result = cmd.output();
    let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;

    match (&result, context) {
        (Ok(output), Some(ctx)) => {
            log::debug!(
                "[trace] context={} cmd=\"{}\" dur={:.1}ms ok={}",
                ctx,
                cmd_str,
                duration_ms,
                output.status.success()
            );
        }
        (Ok(output), None) => {
            log::debug!(
                "[trace] cmd=\"{}\" dur={:.1}ms ok={}",
                cmd_str,
                duration_ms,
                output.status.success()
            );
        }
        (Err(e), Some(ctx)) => {
            log::debug!(
                "[trace] context={} cmd=\"{}\" dur={:.1}ms err=\"{}\"",
                ctx,
                cmd_str,
                duration_ms,
                e
            );
        }
        (Err(e), None) => {
            log::debug!("[trace] cmd=\"{}\" dur={:.1}ms err=\"{}\"", cmd_str, duration_ms, e);
        }
    }

    result
}
