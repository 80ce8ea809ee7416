//! Pre-flight filter applied to every raw user command.

use std::path::Path;

use aho_corasick::AhoCorasick;
use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use thiserror::Error;

pub const CREDENTIAL_PATTERN: &str = r"sk-[a-zA-Z0-9]{24}";

/// Shell shapes refused everywhere. The fork bomb is matched literally.
pub const UNSAFE_PATTERNS: [&str; 9] = [
    r"rm\s+-rf",
    r"chmod\s+777",
    r"dd\s+if=",
    r"mv\s+/",
    r"cp\s+/",
    r"format\s+",
    ":(){:|:&};:",
    r"curl\s+-X\s+POST",
    r"wget\s+.*\s+-O",
];

const FORK_BOMB_PATTERN: &str = ":(){:|:&};:";
const FORK_BOMB_REGEX: &str = r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:";

pub const FILE_COMMANDS: [&str; 6] = ["edit", "create", "run", "show", "implement", "apply"];

pub const SAFE_EXTENSIONS: [&str; 15] = [
    ".py", ".js", ".ts", ".java", ".go", ".rs", ".txt", ".md", ".json", ".yml", ".yaml", ".html",
    ".css", ".sh", ".bat",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Enumerates supported `SecurityViolation` values.
pub enum SecurityViolation {
    #[error("Blocked potential API key exposure")]
    CredentialExposure,
    #[error("Blocked dangerous pattern: {pattern}")]
    DangerousPattern { pattern: String },
    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },
}

#[derive(Debug, Clone)]
/// Compiled credential, shell-pattern and file-type checks.
pub struct SecurityMiddleware {
    credential: Regex,
    unsafe_patterns: Vec<(&'static str, Regex)>,
    file_commands: AhoCorasick,
    file_target: Regex,
}

impl SecurityMiddleware {
    pub fn new() -> Result<Self> {
        let credential =
            Regex::new(CREDENTIAL_PATTERN).context("failed to compile credential pattern")?;
        let unsafe_patterns = UNSAFE_PATTERNS
            .iter()
            .map(|pattern| {
                let source = if *pattern == FORK_BOMB_PATTERN {
                    FORK_BOMB_REGEX
                } else {
                    *pattern
                };
                RegexBuilder::new(source)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| (*pattern, regex))
                    .with_context(|| format!("failed to compile unsafe pattern {pattern}"))
            })
            .collect::<Result<Vec<_>>>()?;
        let file_commands = AhoCorasick::new(FILE_COMMANDS)
            .context("failed to build file command matcher")?;
        let file_target = Regex::new(&format!(
            r"\b(?:{})\s+([\w/.\-]+)",
            FILE_COMMANDS.join("|")
        ))
        .context("failed to compile file command pattern")?;

        Ok(Self {
            credential,
            unsafe_patterns,
            file_commands,
            file_target,
        })
    }

    /// Rejects the whole command on the first violation found.
    pub fn check(&self, input: &str) -> Result<(), SecurityViolation> {
        if self.credential.is_match(input) {
            return Err(SecurityViolation::CredentialExposure);
        }
        if let Some(pattern) = self.find_unsafe_pattern(input) {
            return Err(SecurityViolation::DangerousPattern {
                pattern: pattern.to_string(),
            });
        }
        if let Some(extension) = self.disallowed_file_extension(input) {
            return Err(SecurityViolation::UnsupportedFileType { extension });
        }
        Ok(())
    }

    pub fn find_unsafe_pattern(&self, text: &str) -> Option<&'static str> {
        self.unsafe_patterns
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(pattern, _)| *pattern)
    }

    fn disallowed_file_extension(&self, input: &str) -> Option<String> {
        if !self.file_commands.is_match(input) {
            return None;
        }
        let target = self.file_target.captures(input)?.get(1)?.as_str();
        let extension = Path::new(target).extension()?.to_str()?;
        if extension.is_empty() {
            return None;
        }
        let extension = format!(".{}", extension.to_ascii_lowercase());
        (!SAFE_EXTENSIONS.contains(&extension.as_str())).then_some(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::{SecurityMiddleware, SecurityViolation};

    fn middleware() -> SecurityMiddleware {
        SecurityMiddleware::new().expect("security middleware")
    }

    #[test]
    fn unit_plain_requests_pass() {
        let security = middleware();
        assert_eq!(security.check("explain what app.py does"), Ok(()));
        assert_eq!(security.check("show me main.rs"), Ok(()));
        assert_eq!(security.check("run the tests"), Ok(()));
    }

    #[test]
    fn functional_credential_shaped_tokens_are_blocked() {
        let result = middleware().check("use key sk-abcdefghijklmnopqrstuvwx please");
        assert_eq!(result, Err(SecurityViolation::CredentialExposure));
        assert_eq!(middleware().check("sk-short"), Ok(()));
    }

    #[test]
    fn functional_dangerous_patterns_are_case_insensitive() {
        let security = middleware();
        for (input, pattern) in [
            ("please RM -RF build", r"rm\s+-rf"),
            ("chmod 777 secrets", r"chmod\s+777"),
            ("dd if=/dev/zero of=/dev/sda", r"dd\s+if="),
            ("curl -x post http://evil", r"curl\s+-X\s+POST"),
            ("wget http://x/y -O out", r"wget\s+.*\s+-O"),
        ] {
            assert_eq!(
                security.check(input),
                Err(SecurityViolation::DangerousPattern {
                    pattern: pattern.to_string()
                }),
                "{input}"
            );
        }
    }

    #[test]
    fn regression_fork_bomb_is_matched_literally() {
        let security = middleware();
        assert_eq!(security.find_unsafe_pattern(":(){ :|:& };:"), Some(":(){:|:&};:"));
        assert_eq!(security.find_unsafe_pattern("a :() b"), None);
    }

    #[test]
    fn functional_file_commands_check_target_extension() {
        let security = middleware();
        assert_eq!(
            security.check("edit payload.exe now"),
            Err(SecurityViolation::UnsupportedFileType {
                extension: ".exe".to_string()
            })
        );
        assert_eq!(security.check("run build.BAT"), Ok(()));
        assert_eq!(security.check("create src/lib.rs"), Ok(()));
        assert_eq!(security.check("read archive.zip"), Ok(()));
    }
}
