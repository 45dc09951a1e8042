//! Error types for ripple-core

use thiserror::Error;

use crate::graph::NodeId;

/// Boxed error returned by user computations and effect callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reactive runtime error type
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A memo or linked signal computation returned an error
    #[error("computation of node {node} failed: {source}")]
    ComputationFailure {
        node: NodeId,
        #[source]
        source: BoxError,
    },

    /// An effect callback returned an error
    #[error("effect {effect} failed: {source}")]
    EffectFailure {
        effect: NodeId,
        #[source]
        source: BoxError,
    },

    /// A node read itself, directly or transitively, while being evaluated
    #[error("cyclic dependency detected at node {node}")]
    CyclicDependency { node: NodeId },

    /// A flush kept re-running effects without settling
    #[error("effects did not settle after {runs} runs")]
    RunawayEffects { runs: usize },

    /// Configuration could not be parsed
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

impl ReactiveError {
    /// Wrap an error produced by the computation of `node`.
    ///
    /// Reactive errors that bubbled up through the computation (for example a
    /// cycle detected in a nested read) are passed through unchanged.
    pub(crate) fn computation(node: NodeId, source: BoxError) -> Self {
        match source.downcast::<ReactiveError>() {
            Ok(inner) => *inner,
            Err(source) => Self::ComputationFailure { node, source },
        }
    }

    /// Wrap an error produced by the run of `effect`.
    pub(crate) fn effect(effect: NodeId, source: BoxError) -> Self {
        Self::EffectFailure { effect, source }
    }

    /// True for configuration errors that retrying can never fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CyclicDependency { .. } | Self::InvalidConfig(_)
        )
    }
}

/// Result type for reactive operations
pub type Result<T> = std::result::Result<T, ReactiveError>;
