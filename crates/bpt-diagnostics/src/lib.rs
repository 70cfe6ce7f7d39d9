//! Error taxonomy and exit-code mapping for bpt.
//!
//! Every error a subsystem can raise is one of eight kinds (§7). Each kind
//! maps to exactly one process exit code; the CLI top-level is the only
//! place that reads this mapping and calls `std::process::exit`.

pub use miette::{Diagnostic, Report, Result};
use thiserror::Error;

/// The exit code a `BptError` should cause the process to terminate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    UsageOrCancelled = 2,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// A classified bpt error with rich diagnostics.
#[derive(Error, Diagnostic, Debug)]
pub enum BptError {
    #[error("usage error: {message}")]
    #[diagnostic(code(bpt::usage), help("run with --help for usage"))]
    Usage { message: String },

    #[error("manifest error: {message}")]
    #[diagnostic(code(bpt::manifest))]
    Manifest {
        message: String,
        #[source_code]
        src: Option<String>,
        #[label("here")]
        span: Option<miette::SourceSpan>,
    },

    #[error("package not found: {name}")]
    #[diagnostic(code(bpt::resolve::package_not_found), help("did you mean '{suggestion}'?"))]
    PackageNotFound { name: String, suggestion: String },

    #[error("no version of '{package}' satisfies '{requirement}'")]
    #[diagnostic(code(bpt::resolve::no_matching_version), help("available versions: {available}"))]
    NoMatchingVersion { package: String, requirement: String, available: String },

    #[error("version conflict for {package}")]
    #[diagnostic(code(bpt::resolve::conflict), help("{derivation}"))]
    ResolveConflict { package: String, derivation: String, suggestions: Vec<String> },

    #[error("cyclic library usage: {cycle}")]
    #[diagnostic(code(bpt::resolve::cycle))]
    CyclicUsage { cycle: String },

    #[error("network error: {message}")]
    #[diagnostic(code(bpt::network), help("the remote has been marked unavailable for this run"))]
    Network { message: String },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(code(bpt::io))]
    Io { path: String, #[source] source: std::io::Error },

    #[error("{tool} exited with status {status:?}{signal}")]
    #[diagnostic(code(bpt::tool_failed))]
    ToolFailed {
        tool: String,
        command: String,
        status: Option<i32>,
        signal: String,
        output: String,
    },

    #[error("database error: {message}")]
    #[diagnostic(code(bpt::database))]
    Database { message: String, recreated: bool },

    #[error("cancelled")]
    #[diagnostic(code(bpt::cancelled))]
    Cancelled,

    #[error("{0}")]
    #[diagnostic(code(bpt::generic))]
    Generic(String),
}

impl BptError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            BptError::Usage { .. } | BptError::Cancelled => ExitCode::UsageOrCancelled,
            _ => ExitCode::Failure,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        BptError::Usage { message: message.into() }
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        BptError::Manifest { message: message.into(), src: None, span: None }
    }

    pub fn package_not_found(name: impl Into<String>, suggestion: impl Into<String>) -> Self {
        BptError::PackageNotFound { name: name.into(), suggestion: suggestion.into() }
    }

    pub fn no_matching_version(
        package: impl Into<String>,
        requirement: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        BptError::NoMatchingVersion {
            package: package.into(),
            requirement: requirement.into(),
            available: if available.is_empty() { "none".to_string() } else { available.join(", ") },
        }
    }

    pub fn resolve_conflict(
        package: impl Into<String>,
        derivation: impl Into<String>,
        suggestions: Vec<String>,
    ) -> Self {
        BptError::ResolveConflict {
            package: package.into(),
            derivation: derivation.into(),
            suggestions,
        }
    }

    pub fn cyclic_usage(cycle: impl IntoIterator<Item = String>) -> Self {
        BptError::CyclicUsage { cycle: cycle.into_iter().collect::<Vec<_>>().join(" -> ") }
    }

    pub fn network(message: impl Into<String>) -> Self {
        BptError::Network { message: message.into() }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        BptError::Io { path: path.into(), source }
    }

    pub fn tool_failed(
        tool: impl Into<String>,
        command: impl Into<String>,
        status: Option<i32>,
        signal: Option<i32>,
        output: impl Into<String>,
    ) -> Self {
        BptError::ToolFailed {
            tool: tool.into(),
            command: command.into(),
            status,
            signal: signal.map(|s| format!(" (signal {s})")).unwrap_or_default(),
            output: output.into(),
        }
    }

    pub fn database(message: impl Into<String>, recreated: bool) -> Self {
        BptError::Database { message: message.into(), recreated }
    }
}

/// A process-wide cancellation flag shared between the resolver and the
/// build executor (§5): one Ctrl-C sets it once, every long-running loop in
/// either subsystem polls it at its natural suspension points instead of
/// each owning a separate signal handler.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Cancellation(std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), BptError> {
        if self.is_cancelled() { Err(BptError::Cancelled) } else { Ok(()) }
    }
}

/// Installs the `miette` rendering hook. Call once from `main`.
pub fn setup() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_and_cancelled_exit_with_code_two() {
        assert_eq!(BptError::usage("bad flag").exit_code().code(), 2);
        assert_eq!(BptError::Cancelled.exit_code().code(), 2);
    }

    #[test]
    fn other_kinds_exit_with_code_one() {
        assert_eq!(BptError::manifest("bad key").exit_code().code(), 1);
        assert_eq!(BptError::network("timeout").exit_code().code(), 1);
    }

    #[test]
    fn cancellation_is_shared_across_clones() {
        let flag = Cancellation::new();
        let other = flag.clone();
        assert!(flag.check().is_ok());
        other.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(BptError::Cancelled)));
    }
}
