//! Construction-time configuration for a dispatcher.

use std::fmt;
use std::io::{self, StdinLock, StdoutLock};

use tracing::Dispatch;

/// Streams and observer a [`Dispatcher`](crate::dispatch::Dispatcher) runs
/// with.
///
/// The observer, when present, becomes the default `tracing` dispatcher only
/// while the dispatcher is stepping. Without one, events go to whichever
/// subscriber the host application has installed.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
///
/// use kcl_multilang::DispatcherConfig;
///
/// let config = DispatcherConfig::new(Cursor::new(Vec::<u8>::new()), Vec::<u8>::new())
///     .with_observer(tracing::Dispatch::none());
/// assert!(config.observer().is_some());
/// ```
pub struct DispatcherConfig<R, W> {
    input: R,
    output: W,
    observer: Option<Dispatch>,
}

impl<R, W> DispatcherConfig<R, W> {
    /// Creates a configuration over the given input and output streams.
    #[must_use]
    pub const fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            observer: None,
        }
    }

    /// Routes the dispatcher's diagnostic events to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Dispatch) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns the configured observer.
    #[must_use]
    pub const fn observer(&self) -> Option<&Dispatch> {
        self.observer.as_ref()
    }

    pub(crate) fn into_parts(self) -> (R, W, Option<Dispatch>) {
        (self.input, self.output, self.observer)
    }
}

impl DispatcherConfig<StdinLock<'static>, StdoutLock<'static>> {
    /// Creates a configuration over the locked process standard streams.
    ///
    /// The orchestrator owns the child process's stdin and stdout, so
    /// nothing else in the process may read stdin or print to stdout while
    /// the dispatcher is alive.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout().lock())
    }
}

impl<R, W> fmt::Debug for DispatcherConfig<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}
