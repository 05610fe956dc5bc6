//! Tool call routing.

pub mod router;

pub use router::ToolRouter;
