//! Tools the model may request and the prompts that advertise them.

use dcx_ai::DEEPSEEK_PROVIDER;

/// JSON keys accepted as the tool name, checked in this order.
pub const TOOL_NAME_KEYS: [&str; 3] = ["tool", "tool_name", "function"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Declared parameters and usage example for one tool.
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    pub example: &'static str,
    pub mutating: bool,
}

pub const KNOWN_TOOLS: [ToolSpec; 8] = [
    ToolSpec {
        name: "read_file",
        description: "Read the content of a file.",
        required: &["path"],
        optional: &[],
        example: r#"{"tool": "read_file", "path": "config.py"}"#,
        mutating: false,
    },
    ToolSpec {
        name: "write_file",
        description: "Write content to a file, creating parent directories.",
        required: &["path"],
        optional: &["content"],
        example: r#"{"tool": "write_file", "path": "script.py", "content": "print('hello')"}"#,
        mutating: true,
    },
    ToolSpec {
        name: "list_dir",
        description: "List the files and directories inside a directory.",
        required: &[],
        optional: &["path"],
        example: r#"{"tool": "list_dir", "path": "."}"#,
        mutating: false,
    },
    ToolSpec {
        name: "delete_path",
        description: "Delete a file, or a directory when recursive is true.",
        required: &["path"],
        optional: &["recursive"],
        example: r#"{"tool": "delete_path", "path": "build/output.txt"}"#,
        mutating: true,
    },
    ToolSpec {
        name: "move_path",
        description: "Move or rename a file or directory.",
        required: &["source", "destination"],
        optional: &["overwrite"],
        example: r#"{"tool": "move_path", "source": "old.py", "destination": "src/new.py"}"#,
        mutating: true,
    },
    ToolSpec {
        name: "make_dir",
        description: "Create a directory.",
        required: &["path"],
        optional: &["parents", "exist_ok"],
        example: r#"{"tool": "make_dir", "path": "src/utils", "parents": true}"#,
        mutating: true,
    },
    ToolSpec {
        name: "stat_path",
        description: "Report size, permissions and timestamps for a path.",
        required: &["path"],
        optional: &[],
        example: r#"{"tool": "stat_path", "path": "README.md"}"#,
        mutating: false,
    },
    ToolSpec {
        name: "run_bash",
        description: "Run a shell command in the project directory.",
        required: &["command"],
        optional: &[],
        example: r#"{"tool": "run_bash", "command": "ls -la"}"#,
        mutating: true,
    },
];

pub fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    KNOWN_TOOLS.iter().find(|spec| spec.name == name)
}

pub fn known_tool_names() -> Vec<String> {
    KNOWN_TOOLS.iter().map(|spec| spec.name.to_string()).collect()
}

fn render_tool_catalogue() -> String {
    KNOWN_TOOLS
        .iter()
        .map(|spec| {
            let mut params = spec
                .required
                .iter()
                .map(|name| format!("{name}: str"))
                .collect::<Vec<_>>();
            params.extend(spec.optional.iter().map(|name| format!("{name}?")));
            format!(
                "- `{}({})`: {} Example: `{}`",
                spec.name,
                params.join(", "),
                spec.description,
                spec.example
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// System prompt for a provider session.
pub fn system_prompt_for(provider: &str) -> String {
    let preamble = if provider == DEEPSEEK_PROVIDER {
        "You are an expert software architect. Your primary goal is to answer the user's request. \
You MUST use the provided tools to gather any additional information you need. \
Formulate a plan and execute it step-by-step using the tools until you have enough \
information to provide a final answer."
    } else {
        "You are an expert programmer. You have access to a set of tools to interact with the \
local file system. When you need to access files, you must use these tools."
    };
    format!(
        "{preamble}\n\n**Available Tools:**\n{}\n\n\
To use a tool, respond with a JSON object like this:\n\
{{\"tool\": \"read_file\", \"path\": \"src/main.py\"}}\n\
You may emit several tool calls in one reply; they run in the order written.\n\
After you use a tool, the system replies with a message starting with \"Tool Results:\". \
If you have enough information to answer the user's request, provide the final answer \
directly without using a tool.",
        render_tool_catalogue()
    )
}
