//! Lotwise Core - Shared types library.
//!
//! This crate provides common types used across all Lotwise components:
//! - `server` - Batch allocation service and HTTP boundary
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, the canonical order-submission shape, tenant
//!   identity, and resolver hint types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
