use std::path::PathBuf;

use clap::{Parser, Subcommand};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "dcx",
    about = "Terminal coding assistant with a sandboxed file service",
    version
)]
/// Public struct `Cli` used across dcx components.
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<CliCommand>,

    #[arg(
        long = "dir",
        env = "DCX_PROJECT_DIR",
        default_value = ".",
        help = "Project directory. Sessions are stored under <dir>/.deepcoderx."
    )]
    pub project_dir: PathBuf,

    #[arg(
        long,
        env = "DCX_SANDBOX_ROOT",
        help = "Root the sandbox service confines file operations to. Defaults to --dir."
    )]
    pub sandbox_root: Option<PathBuf>,

    #[arg(
        long,
        env = "DCX_SANDBOX_BIND",
        default_value = "127.0.0.1:8080",
        help = "Socket address the sandbox service binds."
    )]
    pub sandbox_bind: String,

    #[arg(
        long,
        env = "DCX_SANDBOX_API_KEY",
        default_value = "secure_mcp_key_123",
        hide_env_values = true,
        help = "Pre-shared key required on every sandbox request."
    )]
    pub sandbox_api_key: String,

    #[arg(
        long,
        env = "DCX_MAX_FILE_SIZE",
        default_value_t = 1_048_576,
        value_parser = parse_positive_u64,
        help = "Largest file, in bytes, the sandbox reads or writes."
    )]
    pub max_file_size: u64,

    #[arg(
        long,
        env = "DCX_MAX_ITERATIONS",
        default_value_t = 50,
        value_parser = parse_positive_usize,
        help = "Tool turns allowed per request before the loop stops."
    )]
    pub max_iterations: usize,

    #[arg(
        long,
        env = "DCX_HISTORY_LIMIT",
        default_value_t = 10,
        value_parser = parse_positive_usize,
        help = "Session length that triggers pruning."
    )]
    pub history_limit: usize,

    #[arg(
        long,
        env = "DCX_HISTORY_KEEP",
        default_value_t = 8,
        value_parser = parse_positive_usize,
        help = "Most recent messages kept when a session is pruned."
    )]
    pub history_keep: usize,

    #[arg(long, default_value_t = 90_000, value_parser = parse_positive_u64)]
    pub model_timeout_ms: u64,

    #[arg(long, default_value_t = 10_000, value_parser = parse_positive_u64)]
    pub gateway_timeout_ms: u64,

    #[arg(long, default_value_t = 120_000, value_parser = parse_positive_u64)]
    pub command_timeout_ms: u64,

    #[arg(
        long,
        default_value = "local",
        help = "Provider that receives input without an @provider tag."
    )]
    pub default_provider: String,

    #[arg(long, env = "DCX_LOCAL_ENDPOINT", default_value = "http://127.0.0.1:1234/v1")]
    pub local_endpoint: String,

    #[arg(long, env = "DCX_LOCAL_MODEL", default_value = "local-model")]
    pub local_model: String,

    #[arg(long, env = "DCX_DEEPSEEK_ENDPOINT", default_value = "https://api.deepseek.com/v1")]
    pub deepseek_endpoint: String,

    #[arg(long, env = "DCX_DEEPSEEK_MODEL", default_value = "deepseek-chat")]
    pub deepseek_model: String,

    #[arg(
        long,
        env = "DEEPSEEK_API_KEY",
        hide_env_values = true,
        help = "DeepSeek API key. The deepseek provider is enabled only when set."
    )]
    pub deepseek_api_key: Option<String>,

    #[arg(long, help = "Log at debug level.")]
    pub debug: bool,

    #[arg(long, help = "Report mutating tool calls instead of executing them.")]
    pub dry_run: bool,

    #[arg(long, help = "Continue past the tool-loop confirmation without asking.")]
    pub auto_confirm: bool,

    #[arg(
        long,
        env = "DCX_NON_INTERACTIVE",
        help = "Automated execution: tool-loop confirmations are declined."
    )]
    pub non_interactive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
/// Enumerates supported `CliCommand` values.
pub enum CliCommand {
    /// Run only the sandbox service until Ctrl-C.
    Serve,
    /// Rebuild the project context file under --dir and exit.
    BuildContext,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{parse_positive_u64, parse_positive_usize, Cli, CliCommand};

    #[test]
    fn unit_positive_parsers_reject_zero_and_garbage() {
        assert_eq!(parse_positive_usize("3"), Ok(3));
        assert!(parse_positive_usize("0").is_err());
        assert!(parse_positive_u64("-1").is_err());
        assert_eq!(parse_positive_u64("90000"), Ok(90_000));
    }

    #[test]
    fn functional_defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["dcx"]).expect("parse");
        assert_eq!(cli.command, None);
        assert_eq!(cli.sandbox_bind, "127.0.0.1:8080");
        assert_eq!(cli.max_iterations, 50);
        assert_eq!(cli.history_limit, 10);
        assert_eq!(cli.history_keep, 8);
        assert_eq!(cli.max_file_size, 1_048_576);
        assert_eq!(cli.default_provider, "local");
    }

    #[test]
    fn functional_serve_subcommand_parses() {
        let cli = Cli::try_parse_from(["dcx", "--dry-run", "serve"]).expect("parse");
        assert_eq!(cli.command, Some(CliCommand::Serve));
        assert!(cli.dry_run);
    }

    #[test]
    fn functional_build_context_subcommand_parses() {
        let cli = Cli::try_parse_from(["dcx", "--dir", "/tmp", "build-context"]).expect("parse");
        assert_eq!(cli.command, Some(CliCommand::BuildContext));
    }

    #[test]
    fn regression_zero_iterations_is_rejected() {
        assert!(Cli::try_parse_from(["dcx", "--max-iterations", "0"]).is_err());
    }
}
