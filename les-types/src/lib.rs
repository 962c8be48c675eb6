//! # les-types
//!
//! Core types for the load estimation service. This crate defines the
//! statistics record that the delay monitor maintains and the request server
//! reports, plus the small vocabulary of protocol message kinds and status
//! codes shared by servers and clients.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable the `serde` feature to serialize records as JSON
//! - **Transport agnostic**: Nothing here knows about sockets or serial lines
//! - **Ergonomic builders**: Fluent API for constructing records in tests and clients
//!
//! ## Example
//!
//! ```rust
//! use les_types::{LoadInfo, Status};
//!
//! let info = LoadInfo::builder()
//!     .status(Status::OK)
//!     .weighted_avg(135_000.0)
//!     .min(100)
//!     .max(900)
//!     .nsamples(42)
//!     .load_type(0.25)
//!     .build();
//!
//! assert!(info.status.is_ok());
//! assert_eq!(info.nsamples, 42);
//! ```

mod load;
mod message;

pub use load::*;
pub use message::*;

/// A one-way delay sample in nanoseconds.
///
/// Derived from the four timestamps of one device line; negative values
/// are representable but rejected before they reach the estimator.
pub type Sample = i64;
