use std::io::IsTerminal as _;

use anyhow::Context as _;

/// Used when `RUST_LOG` is unset. HTTP client internals stay quiet unless
/// asked for explicitly.
const DEFAULT_DIRECTIVES: &str = "info,hyper_util=warn,reqwest=warn";

/// Installs the global subscriber. Logs go to stderr so stdout stays
/// machine-readable for the CLI's JSON output.
pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_DIRECTIVES))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
