//! The rebalancer's error hierarchy.
//!
//! Four top-level kinds surface to the process (design notes §7): config,
//! safety, runtime (pure-component invariant violations), and execution
//! (broker/adapter failures, with `Pacing`/`Resolution`/`Connection`
//! sub-variants). Each carries a distinct process exit code (§6).

use std::path::PathBuf;

/// All errors that can occur during rebalancer operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad configuration, target file, or other input validation failure.
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("model portfolio file error: {0}")]
    Target(String),

    #[error("failed to read model portfolio file {path}: {source}")]
    TargetRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse target JSON: {0}")]
    TargetParse(#[from] serde_json::Error),

    /// Kill-switch, paper-only, RTH window, or confirmation precondition
    /// failed before any order was placed.
    #[error("safety check failed: {0}")]
    Safety(String),

    /// An invariant a pure component (blend/snapshot/plan/price) is
    /// supposed to guarantee did not hold.
    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("broker pacing limit exceeded: {0}")]
    Pacing(String),

    #[error("unable to resolve contract: {0}")]
    Resolution(String),

    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("reconciliation error: {0}")]
    Reconcile(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

/// Process exit codes (design notes §6): generic kinds 1-4, plus
/// executor-specific codes for the `Execution` sub-variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Unknown = 1,
    ConfigOrIo = 2,
    Safety = 3,
    Runtime = 4,
    Connection = 10,
    Pacing = 11,
    ResolutionFailure = 12,
    Execution = 13,
}

impl Error {
    /// The process exit code this error kind maps to.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Config(_)
            | Error::ConfigRead { .. }
            | Error::ConfigParse(_)
            | Error::Target(_)
            | Error::TargetRead { .. }
            | Error::TargetParse(_)
            | Error::Audit(_) => ExitCode::ConfigOrIo,
            Error::Safety(_) => ExitCode::Safety,
            Error::Runtime(_) | Error::Reconcile(_) => ExitCode::Runtime,
            Error::Connection(_) => ExitCode::Connection,
            Error::Pacing(_) => ExitCode::Pacing,
            Error::Resolution(_) => ExitCode::ResolutionFailure,
            Error::Execution(_) => ExitCode::Execution,
        }
    }

    /// The coarse kind name used in the single-line stderr report.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::Config(_)
            | Error::ConfigRead { .. }
            | Error::ConfigParse(_)
            | Error::Target(_)
            | Error::TargetRead { .. }
            | Error::TargetParse(_)
            | Error::Audit(_) => "ConfigError",
            Error::Safety(_) => "SafetyError",
            Error::Runtime(_) | Error::Reconcile(_) => "RuntimeError",
            Error::Connection(_) => "ConnectionError",
            Error::Pacing(_) => "PacingError",
            Error::Resolution(_) => "ResolutionError",
            Error::Execution(_) => "ExecutionError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
