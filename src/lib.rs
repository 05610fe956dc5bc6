//! Cora: MCP tool orchestration for a chat model.
//!
//! Connects to a set of Model Context Protocol servers over stdio or
//! streamable HTTP, merges their tools into one catalog, and runs each user
//! turn as a loop of model requests and routed tool calls until the model
//! answers.
//!
//! # Quick Start
//!
//! ```no_run
//! use cora::config::{CoraConfig, ServerSpec};
//! use cora::service::{Orchestrator, TurnRequest};
//!
//! # async fn example() -> cora::error::Result<()> {
//! let mut config = CoraConfig::load(None)?;
//! config.servers.push(ServerSpec::stdio(
//!     "zava-customer-sales",
//!     "python",
//!     vec!["customer_sales.py".into(), "--stdio".into()],
//! ));
//!
//! let orchestrator = Orchestrator::from_config(config)?;
//! orchestrator.start().await;
//! let response = orchestrator
//!     .handle_turn(TurnRequest::new("I need paint for a bathroom"))
//!     .await;
//! println!("{}", response.answer_text);
//! orchestrator.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod mcp;
pub mod prelude;
pub mod provider;
pub mod service;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
