use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use tandem::agent::{
    AgentState, AgentStateMachine, ApprovalGate, Executor, ReviewDecision, ToolCall, default_router,
};
use tandem::cli::{Cli, Commands};
use tandem::config::{self, AppConfig};
use tandem::diff::{DiffTracker, FileChange, format_diff_summary};
use tandem::exec::{SystemShellRunner, parse, tokenize};
use tandem::prompt::{
    InstructionStore, ResponseItem, TurnContext, build_messages_for_chat_api, build_prompt,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli)?;
    tracing::debug!(
        model = %config.model_id,
        project_root = %config.project_root.display(),
        "Config loaded"
    );

    match cli.command {
        Commands::Classify { command } => {
            let argv = tokenize(&command);
            let parsed = parse(&argv, &command);
            let out = json!({ "argv": argv, "parsed_command": parsed });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Exec {
            command,
            track,
            yes,
            timeout,
        } => {
            let timeout_secs = timeout.unwrap_or(config.shell_timeout_secs);
            run_exec(&config, &command, &track, yes, timeout_secs).await?;
        }
        Commands::Prompt { transcript, model } => {
            run_prompt(&config, &transcript, model)?;
        }
    }

    Ok(())
}

async fn run_exec(
    config: &AppConfig,
    command: &str,
    track: &[PathBuf],
    auto_approve: bool,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let root = &config.project_root;
    let runner = Arc::new(SystemShellRunner::new(root, timeout_secs));
    let executor = Executor::new(default_router(root, runner))
        .with_parallel_tool_calls(config.parallel_tool_calls);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let approver = tokio::spawn(answer_approvals(
        rx,
        Arc::clone(executor.approvals()),
        auto_approve,
    ));

    let mut machine = AgentStateMachine::new().with_observer(tx);
    let mut tracker = DiffTracker::new(root);
    for path in track {
        tracker.snapshot_file(path);
    }

    machine.begin_turn("Preparing agent...")?;
    machine.think("Running shell command")?;
    let call = ToolCall::new("shell", json!({ "command": command }));
    let executed = executor.execute(&[call], &mut machine, &mut tracker).await?;
    machine.finish()?;
    // Closing the observer channel ends the approver task.
    drop(machine);
    approver.await.context("approval prompt task failed")?;

    for call in &executed {
        println!("{}", call.result.message);
        if !call.result.success {
            if let Some(details) = &call.result.error_details {
                eprintln!("error: {details}");
            }
        }
    }

    let changes = tracker.generate_changes();
    for (path, change) in &changes {
        match change {
            FileChange::Add { .. } => println!("added {}", path.display()),
            FileChange::Delete { .. } => println!("deleted {}", path.display()),
            FileChange::Update { unified_diff } => println!("{unified_diff}"),
        }
    }
    println!("{}", format_diff_summary(&changes));
    Ok(())
}

/// Answer every approval request seen on the state stream, either
/// automatically or by asking on stdin.
async fn answer_approvals(
    mut states: UnboundedReceiver<AgentState>,
    approvals: Arc<ApprovalGate>,
    auto_approve: bool,
) {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stderr = tokio::io::stderr();

    while let Some(state) = states.recv().await {
        let AgentState::AwaitingApproval {
            id,
            tool_name,
            tool_args,
            reason,
        } = state
        else {
            continue;
        };

        let decision = if auto_approve {
            ReviewDecision::Approved
        } else {
            let prompt = format!("{reason}\n  {tool_name} {tool_args}\nApprove? [y/N/a(lways)] ");
            if stderr.write_all(prompt.as_bytes()).await.is_err() {
                ReviewDecision::Denied
            } else {
                let _ = stderr.flush().await;
                match stdin.next_line().await {
                    Ok(Some(answer)) => parse_decision(&answer),
                    _ => ReviewDecision::Denied,
                }
            }
        };
        approvals.submit(&id, decision);
    }
}

fn parse_decision(answer: &str) -> ReviewDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ReviewDecision::Approved,
        "a" | "always" => ReviewDecision::ApprovedForSession,
        _ => ReviewDecision::Denied,
    }
}

fn run_prompt(config: &AppConfig, transcript: &Path, model: Option<String>) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(transcript)
        .with_context(|| format!("Failed to read {}", transcript.display()))?;
    let input: Vec<ResponseItem> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", transcript.display()))?;

    let mut family = config.model_family();
    if let Some(model) = model {
        family.id = model;
    }

    let store = InstructionStore::new();
    let runner = Arc::new(SystemShellRunner::new(
        &config.project_root,
        config.shell_timeout_secs,
    ));
    let tools = default_router(&config.project_root, runner).specs();
    let turn = TurnContext::new(family.clone(), tools)
        .with_base_instructions_override(config.base_instructions_override(&store)?);

    let prompt = build_prompt(&turn, input);
    let messages = build_messages_for_chat_api(&prompt, &family)?;
    let out = json!({
        "model": family.id,
        "parallel_tool_calls": prompt.parallel_tool_calls,
        "tools": prompt.tools,
        "messages": messages,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
