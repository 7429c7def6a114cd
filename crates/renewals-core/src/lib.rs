//! Core types and logic for tracking subscription renewal dates.
//!
//! This crate has no database dependencies. It holds the
//! recurrence engine, the schedule-change reconciler, the calculation-version
//! migration manager and the [`store::RecordStore`] trait that backends
//! implement.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod clock;
pub mod engine;
pub mod error;
pub mod migration;
pub mod reconcile;
pub mod record;
pub mod reminder;
pub mod schedule;
pub mod service;
pub mod store;

pub use error::{Error, Result};
