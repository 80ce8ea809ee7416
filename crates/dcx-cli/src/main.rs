mod app_config;
mod bootstrap_helpers;
mod cli_args;
mod progress;
mod repl;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dcx_agent::{
    system_prompt_with_context, AgentLoop, CommandRouter, CommandRunner, CommandRunnerConfig,
    ConfirmationPrompt, GatewayToolExecutor, KeywordIntentClassifier, ProjectContext,
    ProviderRuntime, SecurityMiddleware, CONTEXT_FILE_NAME, DEFAULT_MAX_STREAM_BYTES,
};
use dcx_ai::{OpenAiClient, OpenAiConfig};
use dcx_sandbox::{
    run_sandbox_service, spawn_sandbox_service, PathValidator, SandboxFs, SandboxGateway,
    SandboxGatewayConfig, SandboxServiceConfig,
};
use dcx_session::SessionStore;
use tokio::sync::watch;

use crate::app_config::AppConfig;
use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::{Cli, CliCommand};
use crate::repl::{run_interactive, StdinConfirmation};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let config = AppConfig::from_cli(&cli)?;
    match cli.command {
        Some(CliCommand::Serve) => run_sandbox_service(sandbox_service_config(&config)?).await,
        Some(CliCommand::BuildContext) => build_project_context(&config),
        None => run_repl(&config).await,
    }
}

fn build_project_context(config: &AppConfig) -> Result<()> {
    ProjectContext::new(&config.project_dir).build_and_save()?;
    println!("Successfully built and saved project context to {CONTEXT_FILE_NAME}.");
    Ok(())
}

fn sandbox_service_config(config: &AppConfig) -> Result<SandboxServiceConfig> {
    let validator = PathValidator::with_default_extensions(&config.sandbox_root)
        .context("failed to initialize sandbox path validator")?;
    Ok(SandboxServiceConfig {
        bind: config.sandbox_bind.clone(),
        api_key: config.sandbox_api_key.clone(),
        fs: SandboxFs::new(validator, config.max_file_size),
    })
}

async fn run_repl(config: &AppConfig) -> Result<()> {
    let service = spawn_sandbox_service(sandbox_service_config(config)?).await?;
    let (status_tx, status_rx) = watch::channel(String::new());
    let mut router = build_router(config, &service.base_url(), status_tx)?;

    let context = ProjectContext::new(&config.project_dir);
    let outcome = run_interactive(&mut router, &context, status_rx).await;
    if let Err(error) = router.save_sessions() {
        tracing::warn!(error = %format!("{error:#}"), "failed to save sessions on exit");
    }
    service.shutdown().await?;
    outcome
}

fn build_router(
    config: &AppConfig,
    sandbox_url: &str,
    status: watch::Sender<String>,
) -> Result<CommandRouter> {
    let security = SecurityMiddleware::new()?;
    let gateway = SandboxGateway::new(SandboxGatewayConfig {
        base_url: sandbox_url.to_string(),
        api_key: config.sandbox_api_key.clone(),
        request_timeout_ms: config.gateway_timeout_ms,
    })
    .context("failed to build sandbox gateway client")?;
    let runner = CommandRunner::new(
        CommandRunnerConfig {
            working_dir: config.sandbox_root.clone(),
            timeout_ms: config.command_timeout_ms,
            max_stream_bytes: DEFAULT_MAX_STREAM_BYTES,
        },
        security.clone(),
    );
    let executor = Arc::new(GatewayToolExecutor::new(gateway, runner, config.dry_run));
    let confirmation: Arc<dyn ConfirmationPrompt> = Arc::new(StdinConfirmation);

    let state_dir = config.state_dir();
    let context = ProjectContext::new(&config.project_dir);
    let mut providers = Vec::with_capacity(config.providers.len());
    for provider in &config.providers {
        let client = OpenAiClient::new(OpenAiConfig::from_provider(
            provider,
            config.model_timeout_ms,
        ))
        .with_context(|| format!("failed to build client for provider '{}'", provider.name))?;
        let system_prompt = system_prompt_with_context(&provider.name, &context);
        let session = SessionStore::load(&state_dir, &provider.name, &system_prompt)?;
        tracing::debug!(
            provider = %provider.name,
            messages = session.len(),
            "loaded provider session"
        );
        let agent = AgentLoop::new(
            provider.clone(),
            Arc::new(client),
            executor.clone(),
            confirmation.clone(),
            config.agent,
        )
        .with_status_channel(status.clone());
        providers.push(ProviderRuntime { agent, session });
    }

    Ok(CommandRouter::new(
        security,
        Arc::new(KeywordIntentClassifier),
        executor,
        providers,
        &config.default_provider,
    ))
}
