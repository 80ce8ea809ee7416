use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use dcx_agent::AgentLoopConfig;
use dcx_ai::ProviderConfig;
use dcx_session::{PruningPolicy, SESSION_STATE_DIR};
use regex::Regex;

use crate::cli_args::Cli;

const DEEPSEEK_KEY_PATTERN: &str = r"^sk-[a-zA-Z0-9]{24}$";

#[derive(Debug, Clone)]
/// Immutable runtime configuration, validated once at startup.
pub struct AppConfig {
    pub project_dir: PathBuf,
    pub sandbox_root: PathBuf,
    pub sandbox_bind: String,
    pub sandbox_api_key: String,
    pub max_file_size: u64,
    pub agent: AgentLoopConfig,
    pub model_timeout_ms: u64,
    pub gateway_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub default_provider: String,
    pub providers: Vec<ProviderConfig>,
    pub dry_run: bool,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let project_dir = resolve_directory(&cli.project_dir, "--dir")?;
        let sandbox_root = match &cli.sandbox_root {
            Some(root) => resolve_directory(root, "--sandbox-root")?,
            None => project_dir.clone(),
        };
        if cli.sandbox_api_key.trim().is_empty() {
            bail!("--sandbox-api-key must not be empty");
        }
        if cli.history_keep >= cli.history_limit {
            bail!(
                "--history-keep ({}) must be smaller than --history-limit ({})",
                cli.history_keep,
                cli.history_limit
            );
        }

        let mut providers = vec![ProviderConfig::local(
            cli.local_endpoint.trim(),
            cli.local_model.trim(),
        )];
        if let Some(key) = cli
            .deepseek_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
        {
            let pattern =
                Regex::new(DEEPSEEK_KEY_PATTERN).context("failed to compile key pattern")?;
            if !pattern.is_match(key) {
                bail!("DEEPSEEK_API_KEY is malformed: expected 'sk-' followed by 24 alphanumeric characters");
            }
            providers.push(ProviderConfig::deepseek(
                cli.deepseek_endpoint.trim(),
                cli.deepseek_model.trim(),
                key,
            ));
        }

        Ok(Self {
            project_dir,
            sandbox_root,
            sandbox_bind: cli.sandbox_bind.trim().to_string(),
            sandbox_api_key: cli.sandbox_api_key.trim().to_string(),
            max_file_size: cli.max_file_size,
            agent: AgentLoopConfig {
                max_iterations: cli.max_iterations,
                pruning: PruningPolicy {
                    max_messages: cli.history_limit,
                    keep_recent: cli.history_keep,
                },
                non_interactive: cli.non_interactive,
                auto_confirm: cli.auto_confirm,
            },
            model_timeout_ms: cli.model_timeout_ms,
            gateway_timeout_ms: cli.gateway_timeout_ms,
            command_timeout_ms: cli.command_timeout_ms,
            default_provider: cli.default_provider.trim().to_ascii_lowercase(),
            providers,
            dry_run: cli.dry_run,
        })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project_dir.join(SESSION_STATE_DIR)
    }
}

fn resolve_directory(path: &Path, flag: &str) -> Result<PathBuf> {
    let resolved = std::fs::canonicalize(path)
        .with_context(|| format!("{flag} '{}' does not exist", path.display()))?;
    if !resolved.is_dir() {
        bail!("{flag} '{}' is not a directory", path.display());
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tempfile::tempdir;

    use super::AppConfig;
    use crate::cli_args::Cli;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("dcx").chain(args.iter().copied())).expect("parse")
    }

    #[test]
    fn functional_from_cli_canonicalizes_and_defaults_sandbox_root() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().to_string_lossy().into_owned();
        let config = AppConfig::from_cli(&parse(&["--dir", &dir])).expect("config");
        let canonical = std::fs::canonicalize(temp.path()).expect("canonical");
        assert_eq!(config.project_dir, canonical);
        assert_eq!(config.sandbox_root, canonical);
        assert_eq!(config.state_dir(), canonical.join(".deepcoderx"));
        assert_eq!(config.agent.max_iterations, 50);
    }

    #[test]
    fn functional_deepseek_is_enabled_only_with_valid_key() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().to_string_lossy().into_owned();
        let config = AppConfig::from_cli(&parse(&[
            "--dir",
            &dir,
            "--deepseek-api-key",
            "sk-abcdefghijklmnopqrstuvwx",
        ]))
        .expect("config");
        let names = config
            .providers
            .iter()
            .map(|provider| provider.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["local", "deepseek"]);

        let error = AppConfig::from_cli(&parse(&[
            "--dir",
            &dir,
            "--deepseek-api-key",
            "sk-short",
        ]))
        .expect_err("malformed key");
        assert!(error.to_string().contains("DEEPSEEK_API_KEY is malformed"));
    }

    #[test]
    fn regression_history_keep_must_be_below_limit() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().to_string_lossy().into_owned();
        let error = AppConfig::from_cli(&parse(&[
            "--dir",
            &dir,
            "--history-limit",
            "4",
            "--history-keep",
            "4",
        ]))
        .expect_err("invalid pruning");
        assert!(error.to_string().contains("--history-keep"));
    }

    #[test]
    fn regression_missing_directory_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("absent").to_string_lossy().into_owned();
        let error = AppConfig::from_cli(&parse(&["--dir", &missing])).expect_err("missing dir");
        assert!(error.to_string().contains("does not exist"));

        let file = temp.path().join("file.txt");
        std::fs::write(&file, "x").expect("write");
        let file = file.to_string_lossy().into_owned();
        let error = AppConfig::from_cli(&parse(&["--dir", &file])).expect_err("file dir");
        assert!(error.to_string().contains("is not a directory"));
    }
}
