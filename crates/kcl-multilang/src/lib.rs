//! Client side of the multilang record-processing protocol.
//!
//! An orchestrator process owns shard leases and checkpoint storage, and
//! drives a child process over that child's standard input and output using
//! newline-delimited JSON. This crate is the child's half: it parses each
//! action request, hands it to a caller-supplied [`RecordProcessor`], runs the
//! synchronous checkpoint exchange on the processor's behalf, and writes a
//! completion acknowledgement.
//!
//! # Stream multiplexing
//!
//! Action requests and checkpoint acknowledgements share the same input
//! stream and carry no correlation identifier. An acknowledgement is
//! recognised only because it is the line read immediately after a checkpoint
//! request was written. The orchestrator depends on this ordering, so the
//! crate preserves it as a compatibility constraint: the dispatch loop and the
//! [`Checkpointer`] read through one shared
//! [`LineTransport`](transport::LineTransport), and the checkpointer holds it
//! mutably while a processor method runs.
//!
//! # Example
//!
//! ```rust,no_run
//! use kcl_multilang::action::{InitAction, ProcessRecordsAction};
//! use kcl_multilang::{Checkpointer, Dispatcher, DispatcherConfig, MultilangError, RecordProcessor};
//!
//! struct Printer;
//!
//! impl RecordProcessor for Printer {
//!     fn initialize(&mut self, _init: &InitAction) -> Result<(), MultilangError> {
//!         Ok(())
//!     }
//!
//!     fn process_records(
//!         &mut self,
//!         batch: &ProcessRecordsAction,
//!         checkpointer: &mut dyn Checkpointer,
//!     ) -> Result<(), MultilangError> {
//!         for record in batch.records() {
//!             tracing::info!(partition_key = record.partition_key(), "record");
//!         }
//!         checkpointer.checkpoint_batch().map(drop)
//!     }
//!
//!     fn lease_lost(&mut self) -> Result<(), MultilangError> {
//!         Ok(())
//!     }
//!
//!     fn shard_ended(&mut self, checkpointer: &mut dyn Checkpointer) -> Result<(), MultilangError> {
//!         checkpointer.checkpoint_batch().map(drop)
//!     }
//!
//!     fn shutdown_requested(
//!         &mut self,
//!         checkpointer: &mut dyn Checkpointer,
//!     ) -> Result<(), MultilangError> {
//!         checkpointer.checkpoint_batch().map(drop)
//!     }
//! }
//!
//! let mut dispatcher = Dispatcher::new(DispatcherConfig::stdio(), Printer);
//! let reason = dispatcher.run()?;
//! tracing::info!(%reason, "record processor finished");
//! # Ok::<(), MultilangError>(())
//! ```

pub mod action;
pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod processor;
pub mod protocol;
pub mod transport;

#[cfg(test)]
mod tests;

pub use self::action::{Action, InitAction, ProcessRecordsAction, Record};
pub use self::checkpoint::{CheckpointAck, CheckpointRequest, Checkpointer};
pub use self::config::DispatcherConfig;
pub use self::dispatch::{DispatchState, Dispatcher, Termination};
pub use self::error::MultilangError;
pub use self::processor::RecordProcessor;
pub use self::protocol::{ActionKind, Envelope, OutboundMessage};
