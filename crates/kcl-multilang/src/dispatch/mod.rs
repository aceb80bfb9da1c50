//! The dispatch loop driving a [`RecordProcessor`].
//!
//! A session starts in [`DispatchState::AwaitingInit`], where only an
//! `initialize` action is accepted. It then moves to
//! [`DispatchState::Running`] and handles one action line per step until
//! `leaseLost`, `shardEnded` or the end of input moves it to
//! [`DispatchState::Terminated`]. Every successfully handled action is
//! acknowledged with a `status` line; a failed step writes nothing further
//! and returns its error to the caller.

use std::fmt;
use std::io::{BufRead, Write};

use tracing::{Dispatch, debug, dispatcher, info, warn};

use crate::action::{Action, InitAction};
use crate::config::DispatcherConfig;
use crate::error::MultilangError;
use crate::processor::RecordProcessor;
use crate::protocol::ActionKind;
use crate::transport::LineTransport;

/// Tracing target for dispatch loop operations.
const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Why a dispatch loop stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// The orchestrator reported that the lease was lost.
    LeaseLost,
    /// The orchestrator reported that the shard was fully consumed.
    ShardEnded,
    /// The input closed between actions.
    InputClosed,
}

impl Termination {
    /// Returns a short description used in diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LeaseLost => "lease lost",
            Self::ShardEnded => "shard ended",
            Self::InputClosed => "input closed",
        }
    }

    const fn after(kind: ActionKind) -> Option<Self> {
        match kind {
            ActionKind::LeaseLost => Some(Self::LeaseLost),
            ActionKind::ShardEnded => Some(Self::ShardEnded),
            ActionKind::Initialize | ActionKind::ProcessRecords | ActionKind::ShutdownRequested => {
                None
            }
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchState {
    /// Waiting for the `initialize` action that opens every session.
    AwaitingInit,
    /// Handling actions.
    Running,
    /// No further input will be read.
    Terminated(Termination),
}

impl DispatchState {
    /// Returns whether the loop has stopped.
    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

/// Reads actions from the orchestrator and routes them to a processor.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
///
/// use kcl_multilang::action::{InitAction, ProcessRecordsAction};
/// use kcl_multilang::checkpoint::Checkpointer;
/// use kcl_multilang::dispatch::Termination;
/// use kcl_multilang::{Dispatcher, DispatcherConfig, MultilangError, RecordProcessor};
///
/// struct Quiet;
///
/// impl RecordProcessor for Quiet {
///     fn initialize(&mut self, _init: &InitAction) -> Result<(), MultilangError> {
///         Ok(())
///     }
///     fn process_records(
///         &mut self,
///         _batch: &ProcessRecordsAction,
///         _checkpointer: &mut dyn Checkpointer,
///     ) -> Result<(), MultilangError> {
///         Ok(())
///     }
///     fn lease_lost(&mut self) -> Result<(), MultilangError> {
///         Ok(())
///     }
///     fn shard_ended(&mut self, _checkpointer: &mut dyn Checkpointer) -> Result<(), MultilangError> {
///         Ok(())
///     }
///     fn shutdown_requested(
///         &mut self,
///         _checkpointer: &mut dyn Checkpointer,
///     ) -> Result<(), MultilangError> {
///         Ok(())
///     }
/// }
///
/// let input = concat!(
///     r#"{"action":"initialize","shardId":"s","sequenceNumber":"1","subSequenceNumber":0}"#,
///     "\n",
///     r#"{"action":"leaseLost"}"#,
///     "\n",
/// );
/// let config = DispatcherConfig::new(Cursor::new(input.as_bytes().to_vec()), Vec::<u8>::new());
/// let mut dispatcher = Dispatcher::new(config, Quiet);
///
/// assert_eq!(dispatcher.run().expect("session completes"), Termination::LeaseLost);
/// ```
pub struct Dispatcher<P, R, W> {
    processor: P,
    transport: LineTransport<R, W>,
    observer: Option<Dispatch>,
    state: DispatchState,
}

impl<P, R, W> Dispatcher<P, R, W> {
    /// Creates a dispatcher awaiting its `initialize` action.
    #[must_use]
    pub fn new(config: DispatcherConfig<R, W>, processor: P) -> Self {
        let (input, output, observer) = config.into_parts();
        Self {
            processor,
            transport: LineTransport::new(input, output),
            observer,
            state: DispatchState::AwaitingInit,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> DispatchState {
        self.state
    }

    /// Returns the processor.
    #[must_use]
    pub const fn processor(&self) -> &P {
        &self.processor
    }

    /// Consumes the dispatcher, returning the processor and both streams.
    #[must_use]
    pub fn into_parts(self) -> (P, R, W) {
        let (input, output) = self.transport.into_inner();
        (self.processor, input, output)
    }
}

impl<P, R, W> Dispatcher<P, R, W>
where
    P: RecordProcessor,
    R: BufRead,
    W: Write,
{
    /// Handles one action line and returns the resulting state.
    ///
    /// Once the loop has terminated this returns immediately without
    /// reading.
    ///
    /// # Errors
    ///
    /// Returns any parse, transport, protocol or processor error raised
    /// while handling the line. No acknowledgement is written for a failed
    /// step.
    pub fn step(&mut self) -> Result<DispatchState, MultilangError> {
        self.observed(Self::advance)
    }

    /// Steps until the loop terminates.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`Dispatcher::step`].
    pub fn run(&mut self) -> Result<Termination, MultilangError> {
        self.observed(|dispatcher| {
            loop {
                if let DispatchState::Terminated(reason) = dispatcher.advance()? {
                    return Ok(reason);
                }
            }
        })
    }

    fn observed<T>(&mut self, operation: impl FnOnce(&mut Self) -> T) -> T {
        let observer = self
            .observer
            .clone()
            .unwrap_or_else(|| dispatcher::get_default(Dispatch::clone));
        dispatcher::with_default(&observer, || operation(self))
    }

    fn advance(&mut self) -> Result<DispatchState, MultilangError> {
        let outcome = match self.state {
            DispatchState::AwaitingInit => self.initialize(),
            DispatchState::Running => self.dispatch_next(),
            DispatchState::Terminated(_) => Ok(()),
        };
        if let Err(error) = &outcome {
            warn!(target: DISPATCH_TARGET, %error, state = ?self.state, "dispatch step failed");
        }
        outcome.map(|()| self.state)
    }

    fn initialize(&mut self) -> Result<(), MultilangError> {
        let envelope = self.transport.read_envelope()?;
        let kind = envelope.kind()?;
        if kind != ActionKind::Initialize {
            return Err(MultilangError::unexpected_action(
                format!("'{}' as the first action", ActionKind::Initialize),
                kind.as_str(),
            ));
        }

        let init = InitAction::from_envelope(&envelope)?;
        info!(
            target: DISPATCH_TARGET,
            shard_id = init.shard_id(),
            sequence_number = init.sequence_number(),
            sub_sequence_number = init.sub_sequence_number(),
            "initialising record processor"
        );
        self.processor.initialize(&init)?;
        self.transport.write_action_complete(kind)?;
        self.state = DispatchState::Running;
        Ok(())
    }

    fn dispatch_next(&mut self) -> Result<(), MultilangError> {
        let Some(envelope) = self.transport.try_read_envelope()? else {
            warn!(target: DISPATCH_TARGET, "input closed before a terminal action");
            self.state = DispatchState::Terminated(Termination::InputClosed);
            return Ok(());
        };

        let action = Action::decode(&envelope)?;
        let kind = action.kind();
        debug!(target: DISPATCH_TARGET, action = kind.as_str(), "dispatching action");

        match &action {
            Action::Initialize(_) => {
                return Err(MultilangError::unexpected_action(
                    "a processing action after initialisation",
                    kind.as_str(),
                ));
            }
            Action::ProcessRecords(batch) => {
                debug!(
                    target: DISPATCH_TARGET,
                    records = batch.records().len(),
                    millis_behind_latest = batch.millis_behind_latest(),
                    "processing records"
                );
                self.processor
                    .process_records(batch, &mut self.transport.checkpointer())?;
            }
            Action::LeaseLost => self.processor.lease_lost()?,
            Action::ShardEnded => self
                .processor
                .shard_ended(&mut self.transport.checkpointer())?,
            Action::ShutdownRequested => self
                .processor
                .shutdown_requested(&mut self.transport.checkpointer())?,
        }

        self.transport.write_action_complete(kind)?;
        if let Some(reason) = Termination::after(kind) {
            info!(target: DISPATCH_TARGET, %reason, "dispatch loop terminated");
            self.state = DispatchState::Terminated(reason);
        }
        Ok(())
    }
}

impl<P, R, W> fmt::Debug for Dispatcher<P, R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
