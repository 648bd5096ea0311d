//! Error types shared across the scheduler core.

use thiserror::Error;

/// Errors that can surface from the scheduling engine itself.
///
/// Per the error handling design, most failure modes (registry misses,
/// unreachable push history, failed all-locales fetches) are policy
/// decisions that get logged and swallowed rather than propagated. The
/// variants here are the ones that do need to reach a caller: buildset
/// submission failures, config/registry-file loading errors, and
/// programmer-error invariant violations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to load tree registry file {path}: {source}")]
    TreeRegistryFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed tree registry section '{section}': {reason}")]
    TreeRegistrySection { section: String, reason: String },

    #[error("failed to submit buildset for tree '{tree}': {source}")]
    BuildsetSubmission {
        tree: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("scheduler invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
