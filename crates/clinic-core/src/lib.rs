//! Core types and trait definitions for the clinic record service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The store, API and server crates depend on it.

// Native `async fn` in traits; the `Send` bounds are spelled out on the
// returned futures in `store.rs`.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod error;
pub mod patient;
pub mod reminder;
pub mod stats;
pub mod store;
pub mod user;
pub mod vitals;

pub use error::{Classify, Error, FailureKind, Result};
