//! Data model shared by the mapping engine and the driver boundary.
//!
//! # Responsibility
//! - Define dialect profiles, dynamic values and record metadata.
//!
//! # Invariants
//! - Nothing in this module talks to a database.

pub mod dialect;
pub mod meta;
pub mod value;
