//! Command-line interface for callbridge.
//!
//! Handles one telephony event per invocation against the local
//! journal-backed queue and workflow engine, and exposes the workflow-side
//! operations (posting actions, parking steps, reading history) needed to
//! drive a call by hand.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::adapters::{
    ActionQueue, ExecutionEventKind, FileActionQueue, FileWorkflowEngine, TaskOutcome,
};
use crate::config::{self, ResolvedConfig};
use crate::core::EventRouter;
use crate::domain::ActionBatch;

/// callbridge - Telephony call events to workflow steps
#[derive(Parser, Debug)]
#[command(name = "callbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process one call event and print the actions to return
    Handle {
        /// Event file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Post an action batch to a session's queue
    SendAction {
        /// Session id (e.g., call_flow_<transaction id>)
        session: String,

        /// Action batch file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Park a step of an execution and print its wait token
    WaitToken {
        /// Execution name (the session id)
        execution: String,
    },

    /// Show the journal of an execution
    History {
        /// Execution name (the session id)
        execution: String,

        /// Print raw JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List open session queues
    Sessions,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Handle { input } => handle_event(cfg, input).await,
            Commands::SendAction { session, input } => send_action(cfg, &session, input).await,
            Commands::WaitToken { execution } => issue_wait_token(cfg, &execution).await,
            Commands::History { execution, json } => show_history(cfg, &execution, json).await,
            Commands::Sessions => list_sessions(cfg).await,
            Commands::Config => show_config(cfg),
        }
    }
}

fn queue_backend(cfg: &ResolvedConfig) -> FileActionQueue {
    FileActionQueue::new(cfg.queues_dir())
}

fn workflow_backend(cfg: &ResolvedConfig) -> FileWorkflowEngine {
    FileWorkflowEngine::new(cfg.executions_dir())
}

/// Read a JSON document from a file, or from stdin when it is piped
fn read_json_input(input_file: Option<PathBuf>) -> Result<Value> {
    let input = if let Some(path) = input_file {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    } else {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    };

    if input.trim().is_empty() {
        anyhow::bail!("Input is empty");
    }

    serde_json::from_str(&input).context("Input is not valid JSON")
}

/// Route one event and print the response document
async fn handle_event(cfg: &ResolvedConfig, input: Option<PathBuf>) -> Result<()> {
    let event = read_json_input(input)?;

    let router = EventRouter::new(
        Arc::new(queue_backend(cfg)),
        Arc::new(workflow_backend(cfg)),
        cfg.call_flow_table()?,
        cfg.queue,
    );

    let batch = router.handle_event(event).await?;
    println!("{}", serde_json::to_string_pretty(batch.as_value())?);

    Ok(())
}

async fn send_action(cfg: &ResolvedConfig, session: &str, input: Option<PathBuf>) -> Result<()> {
    let batch = ActionBatch::from_value(read_json_input(input)?);
    if batch.actions().is_none() {
        anyhow::bail!("Action batch must have an \"Actions\" array");
    }

    let queues = queue_backend(cfg);
    let queue = queues.queue_ref_for(session);
    let message_id = queues
        .send_message(&queue, &serde_json::to_string(batch.as_value())?)
        .await
        .with_context(|| format!("Failed to post actions to session {}", session))?;

    eprintln!("[Posted message {} to {}]", message_id, queue);
    Ok(())
}

async fn issue_wait_token(cfg: &ResolvedConfig, execution: &str) -> Result<()> {
    let token = workflow_backend(cfg).issue_wait_token(execution).await?;
    println!("{}", token);
    Ok(())
}

async fn show_history(cfg: &ResolvedConfig, execution: &str, json: bool) -> Result<()> {
    let events = workflow_backend(cfg).history(execution).await?;

    if json {
        for event in &events {
            println!("{}", serde_json::to_string(event)?);
        }
        return Ok(());
    }

    println!("Execution: {}", execution);
    println!();
    for event in &events {
        let when = event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        match &event.kind {
            ExecutionEventKind::Started { call_flow, .. } => {
                println!("{}  started       {}", when, call_flow);
            }
            ExecutionEventKind::TokenIssued { token } => {
                println!("{}  waiting       {}", when, token);
            }
            ExecutionEventKind::TaskResumed { token, outcome } => match outcome {
                TaskOutcome::Success { output } => {
                    let event_type = output
                        .get("InvocationEventType")
                        .and_then(Value::as_str)
                        .unwrap_or("-");
                    println!("{}  success       {} ({})", when, token, event_type);
                }
                TaskOutcome::Failure { error, cause } => {
                    println!("{}  failure       {} ({}: {})", when, token, error, cause);
                }
            },
        }
    }

    Ok(())
}

async fn list_sessions(cfg: &ResolvedConfig) -> Result<()> {
    let sessions = queue_backend(cfg).list_queues().await?;

    if sessions.is_empty() {
        println!("No open sessions");
        return Ok(());
    }

    println!("{:<44} {:>8} {:>10}", "SESSION", "PENDING", "IN FLIGHT");
    println!("{}", "-".repeat(64));

    for session in sessions {
        println!(
            "{:<44} {:>8} {:>10}",
            session.name, session.pending, session.in_flight
        );
    }

    Ok(())
}

fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("callbridge configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Log level:   {}", cfg.log_level);
    println!();
    println!("Paths:");
    println!("  Home:       {}", cfg.home.display());
    println!("  Queues:     {}", cfg.queues_dir().display());
    println!("  Executions: {}", cfg.executions_dir().display());
    println!();
    println!("Session queues:");
    println!("  Receive wait:       {}s", cfg.queue.receive_wait.as_secs());
    println!("  Visibility timeout: {}s", cfg.queue.visibility_timeout.as_secs());
    println!();
    println!("Call flows:");
    if cfg.call_flows.is_empty() {
        println!("  (none configured)");
    } else {
        for entry in &cfg.call_flows {
            println!("  {} -> {}", entry.number, entry.call_flow);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handle_with_input() {
        let cli = Cli::try_parse_from(["callbridge", "handle", "--input", "event.json"]).unwrap();
        match cli.command {
            Commands::Handle { input } => assert_eq!(input, Some(PathBuf::from("event.json"))),
            other => panic!("Expected Handle, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_send_action() {
        let cli = Cli::try_parse_from(["callbridge", "send-action", "call_flow_T1"]).unwrap();
        match cli.command {
            Commands::SendAction { session, input } => {
                assert_eq!(session, "call_flow_T1");
                assert!(input.is_none());
            }
            other => panic!("Expected SendAction, got {:?}", other),
        }
    }

    #[test]
    fn test_history_requires_execution() {
        assert!(Cli::try_parse_from(["callbridge", "history"]).is_err());
    }
}
