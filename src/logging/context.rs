use crate::cli::Command;
use std::env;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Commands run by hand against a workspace.
    LocalDev,
    /// Continuous integration runs, detected through `CI=true`.
    Ci,
}

impl ExecutionContext {
    /// Returns `true` when console sinks are off unless configured.
    pub fn disables_console(self) -> bool {
        matches!(self, ExecutionContext::Ci)
    }
}

/// Derive the active execution context from a parsed CLI command plus overrides.
pub fn detect_context(command: &Command) -> ExecutionContext {
    if ci_enabled() {
        return ExecutionContext::Ci;
    }

    match command {
        Command::Stubs(_)
        | Command::Resolve(_)
        | Command::Fold(_)
        | Command::Unfold(_)
        | Command::Expand(_) => ExecutionContext::LocalDev,
    }
}

fn ci_enabled() -> bool {
    env::var("CI")
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "true" | "1"))
        .unwrap_or(false)
}
