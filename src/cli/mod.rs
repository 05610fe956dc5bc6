//! CLI entry point for Cora.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cora CLI
#[derive(Parser, Debug)]
#[command(name = "cora", version, about = "Cora: MCP tool orchestration from the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask one question and print the answer
    Ask(AskArgs),
    /// List the tools offered by the configured MCP servers
    Tools(ToolsArgs),
}

/// Arguments for the `ask` subcommand.
#[derive(Parser, Debug)]
pub struct AskArgs {
    /// Question for the assistant
    pub text: String,

    /// Image to attach to the question
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Config file (defaults to CORA_CONFIG, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print tool calls to stderr as they happen
    #[arg(short, long)]
    pub verbose: bool,
}

/// Arguments for the `tools` subcommand.
#[derive(Parser, Debug)]
pub struct ToolsArgs {
    /// Config file (defaults to CORA_CONFIG, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
