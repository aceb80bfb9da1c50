//! Domain errors raised while speaking the multilang protocol.
//!
//! Every failure the adapter can hit is a variant of [`MultilangError`]. None
//! of them is recovered locally: the failing iteration is aborted and the
//! error is handed to the caller of the dispatch loop, which is expected to
//! terminate the process. I/O errors are wrapped in `Arc` to satisfy the
//! `result_large_err` Clippy lint.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Boxed failure reported by a record processor.
pub type BoxedProcessorError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors arising from protocol parsing, transport, checkpointing and
/// processor dispatch.
#[derive(Debug, Error)]
pub enum MultilangError {
    /// A line could not be parsed, or its structure did not match the shape
    /// required for its action.
    #[error("malformed protocol line: {message}")]
    Parse {
        /// Human-readable description of the parse failure.
        message: String,
        /// Underlying JSON error, when one exists.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The envelope's `action` tag is outside the closed set of actions.
    #[error("unsupported action type: {action}")]
    UnsupportedAction {
        /// Tag carried by the offending envelope.
        action: String,
    },

    /// A known action arrived where the protocol does not allow it.
    #[error("expected {expected} but received '{found}'")]
    UnexpectedAction {
        /// Description of what the protocol allows at this point.
        expected: String,
        /// Tag that was actually read.
        found: String,
    },

    /// The orchestrator answered a checkpoint request with an error.
    #[error("checkpoint rejected by orchestrator: {reason}")]
    CheckpointRejected {
        /// Error text returned in the acknowledgement.
        reason: String,
    },

    /// Reading from or writing to the shared streams failed.
    #[error("transport failure: {source}")]
    Transport {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// An outbound message could not be serialised.
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The record processor reported a failure.
    #[error("record processor failed: {source}")]
    Processor {
        /// Failure returned by the processor.
        #[source]
        source: BoxedProcessorError,
    },
}

impl MultilangError {
    /// Creates a parse error without an underlying JSON error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a parse error from a serde error.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::Parse {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates an unsupported action error for the given tag.
    #[must_use]
    pub fn unsupported_action(action: impl Into<String>) -> Self {
        Self::UnsupportedAction {
            action: action.into(),
        }
    }

    /// Creates an unexpected action error.
    #[must_use]
    pub fn unexpected_action(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedAction {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates a checkpoint rejection carrying the orchestrator's reason.
    #[must_use]
    pub fn checkpoint_rejected(reason: impl Into<String>) -> Self {
        Self::CheckpointRejected {
            reason: reason.into(),
        }
    }

    /// Wraps a processor failure.
    ///
    /// Accepts any error type as well as plain strings.
    ///
    /// # Example
    ///
    /// ```
    /// use kcl_multilang::MultilangError;
    ///
    /// let error = MultilangError::processor("downstream sink unavailable");
    /// assert!(error.to_string().contains("downstream sink unavailable"));
    /// ```
    #[must_use]
    pub fn processor(source: impl Into<BoxedProcessorError>) -> Self {
        Self::Processor {
            source: source.into(),
        }
    }

    /// Returns the rejection reason if this is a checkpoint rejection.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Self::CheckpointRejected { reason } => Some(reason.as_str()),
            _ => None,
        }
    }
}

impl From<io::Error> for MultilangError {
    fn from(source: io::Error) -> Self {
        Self::Transport {
            source: Arc::new(source),
        }
    }
}
