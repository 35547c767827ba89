//! Domain models for the allocation service.
//!
//! # Modules
//!
//! - `product` - catalog products, created lazily from external references
//! - `batch` - dated lots of a product with remaining stock
//! - `order` - processed orders, their consumptions and traceability rows

pub mod batch;
pub mod order;
pub mod product;

pub use batch::{Batch, BatchCorrection, NewBatch};
pub use order::{AllocationLine, Consumption, NewConsumption, NewOrder, Order, TraceRecord};
pub use product::Product;
