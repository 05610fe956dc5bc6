//! Conversation loop: model round trips interleaved with tool execution.

pub mod events;
pub mod runner;
pub mod types;

pub use events::*;
pub use runner::*;
pub use types::*;
