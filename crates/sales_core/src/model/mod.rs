//! Sales domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by sale recording and read-back.
//!
//! # Invariants
//! - Records mirror stored rows; they are never partially populated.

pub mod sale;
