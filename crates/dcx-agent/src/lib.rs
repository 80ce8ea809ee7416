//! Agent runtime for dcx: tool-call extraction, the tool loop, command routing
//! and the pre-flight security filter.

mod agent_loop;
mod command_router;
mod intent_classifier;
mod local_runner;
mod project_context;
mod security_middleware;
mod tool_call_extractor;
mod tool_catalogue;
mod tool_executor;

pub use agent_loop::{
    AgentError, AgentLoop, AgentLoopConfig, AutoDecline, ConfirmationPrompt, LoopPhase, LoopState,
    TurnOutcome, DEFAULT_MAX_ITERATIONS,
};
pub use command_router::{
    default_routes, parse_builtin, BuiltinCommand, CommandRouter, ProviderRuntime, Route,
    RouteHandler,
};
pub use intent_classifier::{classify_keywords, Intent, IntentClassifier, KeywordIntentClassifier};
pub use local_runner::{
    CommandError, CommandOutput, CommandRunner, CommandRunnerConfig, DEFAULT_MAX_STREAM_BYTES,
};
pub use project_context::{
    file_tree, project_description, system_prompt_with_context, uses_project_context,
    ProjectContext, CONTEXT_FILE_NAME, DESCRIPTION_FILE_NAME, MAX_TREE_ENTRIES,
};
pub use security_middleware::{
    SecurityMiddleware, SecurityViolation, CREDENTIAL_PATTERN, FILE_COMMANDS, SAFE_EXTENSIONS,
    UNSAFE_PATTERNS,
};
pub use tool_call_extractor::{
    candidate_json_objects, extract_tool_calls, parse_candidate, repair_control_characters,
    Extraction, ExtractionError, ToolInvocation,
};
pub use tool_catalogue::{
    find_tool, known_tool_names, system_prompt_for, ToolSpec, KNOWN_TOOLS, TOOL_NAME_KEYS,
};
pub use tool_executor::{
    aggregate_tool_results, bool_param, string_param, GatewayToolExecutor, ToolExecutor,
    ToolResult, INVALID_TOOL_CALL,
};
