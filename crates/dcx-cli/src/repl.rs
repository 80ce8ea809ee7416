use std::io::{IsTerminal, Write};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dcx_agent::{
    parse_builtin, AgentError, BuiltinCommand, CommandRouter, ConfirmationPrompt, ProjectContext,
    CONTEXT_FILE_NAME,
};
use rustyline::{error::ReadlineError, history::DefaultHistory, Config as ReadlineConfig, Editor};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::progress::ProgressReporter;

const REPL_PROMPT: &str = "dcx> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplControl {
    Continue,
    Exit,
}

/// Asks on the terminal whether the tool loop may continue.
pub(crate) struct StdinConfirmation;

#[async_trait]
impl ConfirmationPrompt for StdinConfirmation {
    async fn confirm(&self, message: &str) -> bool {
        if !std::io::stdin().is_terminal() {
            tracing::warn!("stdin is not a terminal, declining tool-loop confirmation");
            return false;
        }
        let message = message.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "\n{message} [y/N] ");
            let _ = stderr.flush();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;
        match answer {
            Ok(Ok(line)) => is_affirmative(&line),
            Ok(Err(error)) => {
                tracing::warn!(%error, "failed to read confirmation");
                false
            }
            Err(error) => {
                tracing::warn!(%error, "confirmation task failed");
                false
            }
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub(crate) async fn run_interactive(
    router: &mut CommandRouter,
    context: &ProjectContext,
    status: watch::Receiver<String>,
) -> Result<()> {
    print_banner(router);
    if std::io::stdin().is_terminal() && std::io::stdout().is_terminal() {
        run_interactive_tty(router, context, status).await
    } else {
        run_interactive_stdin(router, context, status).await
    }
}

fn print_banner(router: &CommandRouter) {
    println!("dcx ready. Providers: {}", router.provider_names().join(", "));
    println!("Prefix with @<provider> to choose a model, 'use your tools <command>' for direct file commands, 'exit' to quit.");
}

async fn run_interactive_stdin(
    router: &mut CommandRouter,
    context: &ProjectContext,
    status: watch::Receiver<String>,
) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("{REPL_PROMPT}");
        std::io::stdout()
            .flush()
            .context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if dispatch_interactive_turn(router, context, &status, &line).await? == ReplControl::Exit {
            break;
        }
    }
    Ok(())
}

async fn run_interactive_tty(
    router: &mut CommandRouter,
    context: &ProjectContext,
    status: watch::Receiver<String>,
) -> Result<()> {
    let mut editor = build_repl_editor()?;

    loop {
        let readline = tokio::task::block_in_place(|| editor.readline(REPL_PROMPT));
        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(anyhow!("failed to read interactive input: {error}")),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());

        match dispatch_interactive_turn(router, context, &status, &line).await {
            Ok(ReplControl::Continue) => continue,
            Ok(ReplControl::Exit) => break,
            Err(error) => eprintln!("interactive turn failed: {error:#}"),
        }
    }
    Ok(())
}

fn build_repl_editor() -> Result<Editor<(), DefaultHistory>> {
    let config = ReadlineConfig::builder().auto_add_history(false).build();
    Editor::<(), DefaultHistory>::with_config(config).context("failed to initialize interactive editor")
}

async fn dispatch_interactive_turn(
    router: &mut CommandRouter,
    context: &ProjectContext,
    status: &watch::Receiver<String>,
    input: &str,
) -> Result<ReplControl> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(ReplControl::Continue);
    }

    if let Some(command) = parse_builtin(trimmed) {
        return run_builtin(router, context, command);
    }

    let started = Instant::now();
    let progress = ProgressReporter::start(status.clone());
    let outcome = router.dispatch(trimmed).await;
    progress.finish().await;
    let elapsed = started.elapsed().as_secs_f64();

    match outcome {
        Ok(answer) => {
            println!("{answer}");
            println!("({elapsed:.1}s)");
        }
        Err(error) => report_turn_error(&error),
    }
    Ok(ReplControl::Continue)
}

fn run_builtin(
    router: &mut CommandRouter,
    context: &ProjectContext,
    command: BuiltinCommand,
) -> Result<ReplControl> {
    match command {
        BuiltinCommand::Exit => return Ok(ReplControl::Exit),
        BuiltinCommand::ClearAll => {
            router.clear_all_sessions()?;
            println!("Cleared all sessions.");
        }
        BuiltinCommand::ClearProvider(provider) => {
            if router.clear_session(&provider)? {
                println!("Cleared {provider} session.");
            } else {
                println!("Unknown provider: {provider}");
            }
        }
        BuiltinCommand::BuildContext => match context.build_and_save() {
            Ok(_) => println!("Successfully built and saved project context to {CONTEXT_FILE_NAME}."),
            Err(error) => eprintln!("Error: {error:#}"),
        },
    }
    Ok(ReplControl::Continue)
}

fn report_turn_error(error: &AgentError) {
    match error {
        AgentError::SecurityBlocked(violation) => println!("Security: {violation}"),
        AgentError::OperationCancelled | AgentError::LoopLimitExceeded(_) => println!("{error}"),
        _ => eprintln!("Error: {error}"),
    }
}
