//! Cora CLI binary entry point.

use std::sync::Arc;

use clap::Parser;
use cora::agent_loop::{LoopEvent, LoopEventPayload};
use cora::cli::{AskArgs, Cli, Commands, ToolsArgs};
use cora::config::CoraConfig;
use cora::service::{Orchestrator, TurnRequest};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ask(args) => handle_ask(args).await,
        Commands::Tools(args) => handle_tools(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cora=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn handle_ask(args: AskArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = CoraConfig::load(args.config.as_deref())?;
    let mut orchestrator = Orchestrator::from_config(config)?;

    if args.verbose {
        let sink = Arc::new(|event: LoopEvent| match &event.payload {
            LoopEventPayload::ToolCallStarted { call } => {
                eprintln!("-> {} {}", call.name, call.arguments);
            }
            LoopEventPayload::ToolCallFinished { result } => {
                let marker = if result.is_error { "!!" } else { "<-" };
                eprintln!("{marker} {}", truncate(&result.content, 200));
            }
            _ => {}
        });
        orchestrator = orchestrator.with_event_sink(sink);
    }

    let report = orchestrator.start().await;
    for (id, reason) in &report.failed {
        eprintln!("warning: server '{id}' unavailable: {reason}");
    }

    let mut request = TurnRequest::new(args.text);
    if let Some(path) = args.image {
        request = request.with_image_path(path).await;
    }

    let response = orchestrator.handle_turn(request).await;
    println!("{}", response.answer_text);

    orchestrator.stop().await;
    Ok(())
}

async fn handle_tools(args: ToolsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = CoraConfig::load(args.config.as_deref())?;
    let orchestrator = Orchestrator::from_config(config)?;

    let report = orchestrator.start().await;
    for (id, reason) in &report.failed {
        eprintln!("warning: server '{id}' unavailable: {reason}");
    }

    for tool in orchestrator.catalog().await {
        println!("{:<32} [{}] {}", tool.name, tool.server_id, tool.description);
    }

    orchestrator.stop().await;
    Ok(())
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
