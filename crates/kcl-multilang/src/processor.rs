//! The capability a caller implements to handle actions.
//!
//! The dispatch loop invokes exactly one method per action line it reads.
//! Methods that may record progress receive a [`Checkpointer`]; the loop
//! does not read its next action until the method returns.

use crate::action::{InitAction, ProcessRecordsAction};
use crate::checkpoint::Checkpointer;
use crate::error::MultilangError;

/// User-supplied stream-processing logic for one shard.
///
/// Any error returned aborts the dispatch loop and is surfaced unchanged to
/// the caller of [`Dispatcher::run`](crate::dispatch::Dispatcher::run). No
/// completion acknowledgement is written for the failed action.
///
/// # Example
///
/// ```
/// use kcl_multilang::action::{InitAction, ProcessRecordsAction};
/// use kcl_multilang::checkpoint::Checkpointer;
/// use kcl_multilang::{MultilangError, RecordProcessor};
///
/// #[derive(Default)]
/// struct CountingProcessor {
///     seen: usize,
/// }
///
/// impl RecordProcessor for CountingProcessor {
///     fn initialize(&mut self, _init: &InitAction) -> Result<(), MultilangError> {
///         Ok(())
///     }
///
///     fn process_records(
///         &mut self,
///         batch: &ProcessRecordsAction,
///         checkpointer: &mut dyn Checkpointer,
///     ) -> Result<(), MultilangError> {
///         self.seen += batch.records().len();
///         checkpointer.checkpoint_batch()?;
///         Ok(())
///     }
///
///     fn lease_lost(&mut self) -> Result<(), MultilangError> {
///         Ok(())
///     }
///
///     fn shard_ended(&mut self, checkpointer: &mut dyn Checkpointer) -> Result<(), MultilangError> {
///         checkpointer.checkpoint_batch().map(drop)
///     }
///
///     fn shutdown_requested(
///         &mut self,
///         _checkpointer: &mut dyn Checkpointer,
///     ) -> Result<(), MultilangError> {
///         Ok(())
///     }
/// }
/// ```
pub trait RecordProcessor {
    /// Called once with the shard assignment before any records arrive.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor cannot start.
    fn initialize(&mut self, init: &InitAction) -> Result<(), MultilangError>;

    /// Called with each batch, records in delivery order.
    ///
    /// # Errors
    ///
    /// Returns an error if processing or checkpointing fails.
    fn process_records(
        &mut self,
        batch: &ProcessRecordsAction,
        checkpointer: &mut dyn Checkpointer,
    ) -> Result<(), MultilangError>;

    /// Called when another worker has taken the lease. Checkpointing is no
    /// longer possible.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup fails.
    fn lease_lost(&mut self) -> Result<(), MultilangError>;

    /// Called once the shard is fully consumed. Processors should checkpoint
    /// here so the orchestrator can move on to child shards.
    ///
    /// # Errors
    ///
    /// Returns an error if the final checkpoint or cleanup fails.
    fn shard_ended(&mut self, checkpointer: &mut dyn Checkpointer) -> Result<(), MultilangError>;

    /// Called when the orchestrator is shutting down, offering a last
    /// checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint or cleanup fails.
    fn shutdown_requested(
        &mut self,
        checkpointer: &mut dyn Checkpointer,
    ) -> Result<(), MultilangError>;
}
