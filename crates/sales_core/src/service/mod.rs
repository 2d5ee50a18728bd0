//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate gateway and repository calls into use-case level APIs.
//! - Keep CLI callers decoupled from storage details.

pub mod sale_recorder;
