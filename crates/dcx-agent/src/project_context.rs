//! Generated project overview that seeds the cloud provider's system prompt.
//!
//! The file lives at `<project>/.deepcoderx_context.md`. It is built once on
//! first use and rebuilt only on request, so models may append log entries to it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dcx_ai::DEEPSEEK_PROVIDER;
use dcx_core::write_text_atomic;
use ignore::WalkBuilder;

use crate::tool_catalogue::system_prompt_for;


pub const CONTEXT_FILE_NAME: &str = ".deepcoderx_context.md";
/// Optional project notes whose `## Core Concept:` section becomes the description.
pub const DESCRIPTION_FILE_NAME: &str = "DeepCoderX.md";
pub const MAX_TREE_ENTRIES: usize = 2_000;

const CORE_CONCEPT_HEADING: &str = "## Core Concept:";
const NO_DESCRIPTION: &str = "No project description found.";
const SECTION_RULE: &str = "-----------------------------";
const CONTEXT_RULES: &str = "\
## START RULES ##
- 1: Read this document to learn the project layout before changing code.
- 2: Start each log entry with [DATE] [MODEL NAME] [TIME].
- 3: Record only what you changed in the code and why. Stay professional and brief.
- 4: Stay on topic.
- 5: Append entries. Never erase or replace earlier text.
- 6: Keep the file clean.
- 7: Never use mock data or mock replies.
## END RULES ##";

#[derive(Debug, Clone)]
/// Reads and builds the context file for one project directory.
pub struct ProjectContext {
    root: PathBuf,
}

impl ProjectContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(CONTEXT_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Returns the saved context, or `None` when it has not been built yet.
    pub fn read(&self) -> Result<Option<String>> {
        let path = self.path();
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => {
                Err(error).with_context(|| format!("failed to read {}", path.display()))
            }
        }
    }

    /// Scans the project and overwrites the context file.
    pub fn build_and_save(&self) -> Result<String> {
        let description = project_description(&self.root)?;
        let content = render_context(&self.root, &file_tree(&self.root), &description);
        let path = self.path();
        write_text_atomic(&path, &content)
            .with_context(|| format!("failed to save project context {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = content.len(), "built project context");
        Ok(content)
    }

    pub fn load_or_build(&self) -> Result<String> {
        match self.read()? {
            Some(content) => Ok(content),
            None => self.build_and_save(),
        }
    }
}

pub fn uses_project_context(provider: &str) -> bool {
    provider == DEEPSEEK_PROVIDER
}

/// System prompt for `provider`. The cloud provider also gets the project
/// context, built on first use; a context failure only drops that section.
pub fn system_prompt_with_context(provider: &str, context: &ProjectContext) -> String {
    let prompt = system_prompt_for(provider);
    if !uses_project_context(provider) {
        return prompt;
    }
    match context.load_or_build() {
        Ok(body) => format!("{prompt}\n\n**Project Context File:**\n{body}"),
        Err(error) => {
            tracing::warn!(
                provider,
                error = %format!("{error:#}"),
                "continuing without project context"
            );
            prompt
        }
    }
}

/// Indented tree of the project, four spaces per level, siblings sorted.
///
/// Hidden entries and anything `.gitignore` excludes are left out.
pub fn file_tree(root: &Path) -> String {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .follow_links(false)
        .require_git(false)
        .sort_by_file_name(|left, right| left.cmp(right))
        .build();

    let mut lines = Vec::new();
    let mut omitted = 0usize;
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                tracing::debug!(%error, "skipping unreadable entry in project tree");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        if lines.len() >= MAX_TREE_ENTRIES {
            omitted += 1;
            continue;
        }
        let indent = "    ".repeat(entry.depth() - 1);
        lines.push(format!("{indent}{}", entry.file_name().to_string_lossy()));
    }
    if omitted > 0 {
        lines.push(format!("... ({omitted} more entries)"));
    }
    lines.join("\n")
}

pub fn project_description(root: &Path) -> Result<String> {
    let path = root.join(DESCRIPTION_FILE_NAME);
    let notes = match std::fs::read_to_string(&path) {
        Ok(notes) => notes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(NO_DESCRIPTION.to_string());
        }
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    Ok(core_concept(&notes).unwrap_or_else(|| NO_DESCRIPTION.to_string()))
}

/// Text under the core-concept heading, up to the next `## ` heading.
fn core_concept(notes: &str) -> Option<String> {
    let (_, after) = notes.split_once(CORE_CONCEPT_HEADING)?;
    let section = after
        .find("\n## ")
        .map_or(after, |end| &after[..end])
        .trim();
    (!section.is_empty()).then(|| section.to_string())
}

fn render_context(root: &Path, tree: &str, description: &str) -> String {
    format!(
        "CONTEXT FILE FOR PROJECT.\n{SECTION_RULE}\n\n{CONTEXT_RULES}\n\n\
## TECHNICAL PROJECT INFO ##\n\n# project structure #\n\n{tree}\n\n\
- PROJECT DEV DIR: {}\n\n## END TECHNICAL PROJECT INFO ##\n\n{SECTION_RULE}\n\n\
YOUR GOAL: Help the user achieve the goals for the project. Write the best code you can.\n\n\
{SECTION_RULE}\n\n## PROJECT DESCRIPTION ##\n\n{description}\n\n## END PROJECT DESCRIPTION ##\n",
        root.display()
    )
}
