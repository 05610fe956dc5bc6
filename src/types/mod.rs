//! Core types for Cora.

pub mod generation;
pub mod image;
pub mod message;
pub mod usage;

pub use generation::*;
pub use message::*;
pub use usage::*;
