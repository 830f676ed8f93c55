//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup and of the run, so
//! `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ripple_core::config::ConfigError,
    },

    /// The configured protocol could not be assembled.
    #[error("protocol error: {source}")]
    Protocol {
        /// The underlying protocol error.
        #[from]
        source: ripple_core::ProtocolError,
    },

    /// The synthetic network settings are unusable.
    #[error("network config error: {message}")]
    Network {
        /// Description of the problem.
        message: String,
    },

    /// The generated network was rejected.
    #[error("graph error: {source}")]
    Graph {
        /// The underlying graph error.
        #[from]
        source: ripple_graph::GraphError,
    },

    /// The worker pool could not be configured.
    #[error("thread pool error: {message}")]
    ThreadPool {
        /// Description of the failure.
        message: String,
    },

    /// The simulation run failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: ripple_core::runner::RunnerError,
    },

    /// The blocking run task did not complete.
    #[error("run task failed: {message}")]
    Task {
        /// Description of the failure.
        message: String,
    },

    /// The report could not be serialized.
    #[error("report error: {source}")]
    Report {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}
