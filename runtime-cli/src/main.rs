//! # `tjsr` — Runtime Host Executable
//!
//! Thin glue: parses CLI flags and environment variables, installs the
//! `tracing` subscriber, constructs a [`runtime::Runtime`], evaluates the
//! requested script, and exits with the runtime's reported exit code. All
//! interesting behavior lives in the `runtime` library crate.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use runtime::modules::{bundle, ModuleRegistry};
use runtime::{Runtime, RuntimeOptions, UnhandledRejection};

/// Runs a JavaScript module on the embedded runtime.
#[derive(Parser, Debug)]
#[command(name = "tjsr", version, about)]
struct Cli {
    /// Path to the script to evaluate.
    script: PathBuf,

    /// What to do with an unhandled promise rejection.
    #[arg(long, value_enum, default_value_t = UnhandledRejectionArg::Log, env = "TJSR_UNHANDLED_REJECTION")]
    unhandled_rejection: UnhandledRejectionArg,

    /// Engine heap limit in bytes (0 = unlimited).
    #[arg(long, default_value_t = 0, env = "TJSR_MEMORY_LIMIT")]
    memory_limit: usize,

    /// Engine stack size in bytes.
    #[arg(long, default_value_t = 1024 * 1024, env = "TJSR_STACK_SIZE")]
    stack_size: usize,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum UnhandledRejectionArg {
    Log,
    Reject,
}

impl From<UnhandledRejectionArg> for UnhandledRejection {
    fn from(value: UnhandledRejectionArg) -> Self {
        match value {
            UnhandledRejectionArg::Log => UnhandledRejection::Log,
            UnhandledRejectionArg::Reject => UnhandledRejection::Reject,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let options = RuntimeOptions {
        unhandled_rejection: cli.unhandled_rejection.into(),
        memory_limit: cli.memory_limit,
        stack_size: cli.stack_size,
        ..RuntimeOptions::default()
    };

    let mut registry = ModuleRegistry::new();
    let exe = std::env::current_exe()?;
    let loaded = bundle::load_from_executable(&exe, &mut registry);
    tracing::debug!(loaded, "trailer-appended module bundle scan complete");

    let runtime = Runtime::new(options, registry).await?;

    let source = std::fs::read_to_string(&cli.script)?;
    let source = strip_shebang(source);
    let name = cli.script.to_string_lossy().into_owned();
    runtime.eval(&name, &source).await?;

    let code = runtime.run().await;
    std::process::exit(code);
}

/// Replaces a leading `#!` shebang line with `//`, per spec.md §4.2's
/// `evalFile` contract — keeping the line itself (now a comment) rather
/// than deleting it, so line numbers in later syntax errors still line up
/// with the original file.
fn strip_shebang(source: String) -> String {
    if let Some(rest) = source.strip_prefix("#!") {
        format!("//{rest}")
    } else {
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shebang_line_becomes_a_comment() {
        let src = "#!/usr/bin/env tjsr\nconsole.log(1);".to_string();
        assert_eq!(strip_shebang(src), "///usr/bin/env tjsr\nconsole.log(1);");
    }

    #[test]
    fn source_without_shebang_is_unchanged() {
        let src = "console.log(1);".to_string();
        assert_eq!(strip_shebang(src.clone()), src);
    }
}
