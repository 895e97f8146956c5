//! tracing setup for the `reactmap` binary.
//!
//! Logs go to stderr so stdout stays the command's report. `RUST_LOG`, when
//! set, replaces the flag-derived filter entirely.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TARGET_PREFIX: &str = "reactmap::";
const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How much of the pipeline's progress is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    /// Stage summaries; per-reaction feature and store chatter hidden.
    #[default]
    Normal,
    Verbose,
    Debug,
    Trace,
}

impl Verbosity {
    /// `--quiet` beats `--trace` beats `--debug` beats `--verbose`.
    pub fn from_flags(verbose: bool, debug: bool, trace: bool, quiet: bool) -> Self {
        match (quiet, trace, debug, verbose) {
            (true, ..) => Verbosity::Quiet,
            (_, true, ..) => Verbosity::Trace,
            (_, _, true, _) => Verbosity::Debug,
            (_, _, _, true) => Verbosity::Verbose,
            _ => Verbosity::Normal,
        }
    }

    fn base_directives(self) -> &'static str {
        match self {
            Verbosity::Quiet => "reactmap=warn,ort=error",
            Verbosity::Normal => "reactmap=info,reactmap::features=warn,reactmap::store=warn,ort=warn",
            Verbosity::Verbose => "reactmap=info,ort=warn",
            Verbosity::Debug => "reactmap=debug,ort=info",
            Verbosity::Trace => "reactmap=trace,ort=debug",
        }
    }
}

/// `cluster=debug` becomes `reactmap::cluster=debug`; `ort` and already
/// qualified targets are kept. Anything without a known level is `None`.
fn qualify_override(entry: &str) -> Option<String> {
    let (target, level) = entry.split_once('=')?;
    let (target, level) = (target.trim(), level.trim().to_ascii_lowercase());
    if target.is_empty() || !LEVELS.contains(&level.as_str()) {
        return None;
    }
    if target == "ort" || target == "reactmap" || target.starts_with(TARGET_PREFIX) {
        Some(format!("{}={}", target, level))
    } else {
        Some(format!("{}{}={}", TARGET_PREFIX, target, level))
    }
}

/// Filter string for the verbosity plus every usable `--log` entry.
/// Entries may be comma separated; later ones win.
pub fn filter_directives(verbosity: Verbosity, overrides: &[String]) -> String {
    let mut directives = vec![verbosity.base_directives().to_string()];
    directives.extend(
        overrides
            .iter()
            .flat_map(|entry| entry.split(','))
            .filter_map(qualify_override),
    );
    directives.join(",")
}

/// Install the global subscriber.
pub fn init(verbosity: Verbosity, format: LogFormat, overrides: &[String]) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(filter_directives(verbosity, overrides))
            .unwrap_or_else(|_| EnvFilter::new(verbosity.base_directives()))
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
