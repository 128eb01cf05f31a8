use clap::Args;
use std::path::PathBuf;

pub const DEFAULT_FEATURE: &str = "feature";

#[derive(Args)]
pub struct StubsArgs {
    /// Stub file to load (service -> method#path -> status-alias -> content)
    #[arg(value_name = "STUB_FILE")]
    pub stub_file: PathBuf,

    /// Workspace root holding apiflows.toml and .apiflows/ (default: current directory)
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Stub file to resolve against
    #[arg(value_name = "STUB_FILE")]
    pub stub_file: PathBuf,

    /// HTTP method of the outbound call
    #[arg(value_name = "METHOD")]
    pub method: String,

    /// Absolute URL of the outbound call
    #[arg(value_name = "URL")]
    pub url: String,

    /// Workspace root holding apiflows.toml and .apiflows/ (default: current directory)
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,
}

#[derive(Args)]
pub struct FoldArgs {
    /// Captured pipelines (test name -> list of raw points)
    #[arg(value_name = "PIPELINES")]
    pub input: PathBuf,

    /// Pipelines captured by the repeat pass; differing values become ANY
    #[arg(long, value_name = "FILE")]
    pub repeated: Option<PathBuf>,

    /// Stub file whose entries are written as the used stubs artifact
    #[arg(long, value_name = "FILE")]
    pub stubs: Option<PathBuf>,

    /// Directory receiving the snapshot artifacts
    #[arg(long, default_value = ".", value_name = "DIR", help_heading = "Output")]
    pub output_dir: PathBuf,

    /// Base name of the snapshot artifacts
    #[arg(long, default_value = DEFAULT_FEATURE, value_name = "NAME", help_heading = "Output")]
    pub feature: String,

    /// Keep one branch per test instead of folding shared prefixes
    #[arg(long, help_heading = "Output")]
    pub flat: bool,

    /// Workspace root holding apiflows.toml and .apiflows/ (default: current directory)
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,
}

#[derive(Args)]
pub struct UnfoldArgs {
    /// Snapshot tree to flatten
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Workspace root holding apiflows.toml and .apiflows/ (default: current directory)
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,
}

#[derive(Args)]
pub struct ExpandArgs {
    /// Snapshot tree to expand into tests
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Mark points already covered by an earlier test
    #[arg(long, help_heading = "Filters")]
    pub filter_used_asserts: bool,

    /// Skip flows whose points were all covered by earlier tests
    #[arg(long, help_heading = "Filters")]
    pub filter_used_subflows: bool,

    /// Prepend a context point to flows that ran inside a context
    #[arg(long)]
    pub context_set_up: bool,

    /// Workspace root holding apiflows.toml and .apiflows/ (default: current directory)
    #[arg(long, value_name = "PATH")]
    pub workspace: Option<PathBuf>,
}
