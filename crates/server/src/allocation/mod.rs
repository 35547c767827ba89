//! Batch allocation engine.
//!
//! Consumes an order's line items, walks the batch store in FEFO order
//! (first-expired-first-out), records consumption facts, and synthesizes new
//! batches from resolver hints when existing stock falls short - all inside
//! one transaction.
//!
//! # Modules
//!
//! - [`planner`] - pure allocation policy: FEFO ordering, draw planning,
//!   synthesized batch parameters
//! - [`processor`] - the transactional `ProcessOrder` operation with its
//!   retry and idempotency scaffolding

pub mod planner;
pub mod processor;

pub use processor::{OrderOutcome, OrderProcessor, ProcessError, Shortfall};
