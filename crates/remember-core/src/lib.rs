//! # remember-core
//!
//! Core types, traits, and abstractions for the remember link crawler.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the database layer and the job workers depend on.

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
