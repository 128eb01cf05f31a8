pub mod args;
pub mod commands;

pub use args::{ExpandArgs, FoldArgs, ResolveArgs, StubsArgs, UnfoldArgs};
use clap::{Parser, Subcommand};
use std::path::Path;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
SNAPSHOT COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "apiflows")]
#[command(version = crate::VERSION)]
#[command(about = "Explore stub combinations and manage API flow snapshots")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: check the stub file, fold captured pipelines into a snapshot, then expand it into tests."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Print a stub file as the engine sees it",
        long_about = "Stubs loads a stub file, drops the apistubs marker and commented keys, validates endpoint and variant keys, and prints the result.",
        after_help = "Example:\n    apiflows stubs tests/github.stubs.yaml"
    )]
    Stubs(StubsArgs),
    #[command(
        about = "Resolve an outbound call against a stub file",
        long_about = "Resolve maps the URL to an external service, selects the most specific path template of that service and lists the stored response variants.",
        after_help = "Example:\n    apiflows resolve tests/github.stubs.yaml GET https://api.github.com/repos/acme/app"
    )]
    Resolve(ResolveArgs),
    #[command(
        about = "Normalize captured pipelines into snapshot artifacts",
        long_about = "Fold hashes every point, generalizes values that differ from the repeat pass, folds shared prefixes into a tree and writes the snapshot, meta, points and stubs files.",
        after_help = "Example:\n    apiflows fold captured.yaml --repeated repeated.yaml --feature login --output-dir tests/"
    )]
    Fold(FoldArgs),
    #[command(
        about = "Flatten a snapshot tree into pipelines",
        long_about = "Unfold walks every root-to-leaf flow of a snapshot tree and prints one linear pipeline per flow.",
        after_help = "Example:\n    apiflows unfold tests/login.apiflows.yaml"
    )]
    Unfold(UnfoldArgs),
    #[command(
        about = "List the tests a snapshot expands into",
        long_about = "Expand names every flow of a snapshot tree, prefixing ok_ or error_ by the response statuses it contains.",
        after_help = "Example:\n    apiflows expand tests/login.apiflows.yaml --filter-used-asserts"
    )]
    Expand(ExpandArgs),
}

impl Command {
    /// Workspace given on the command line, if any.
    pub fn workspace(&self) -> Option<&Path> {
        match self {
            Command::Stubs(args) => args.workspace.as_deref(),
            Command::Resolve(args) => args.workspace.as_deref(),
            Command::Fold(args) => args.workspace.as_deref(),
            Command::Unfold(args) => args.workspace.as_deref(),
            Command::Expand(args) => args.workspace.as_deref(),
        }
    }
}

pub async fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::Stubs(stubs_args) => commands::stubs(stubs_args).await,
        Command::Resolve(resolve_args) => commands::resolve(resolve_args).await,
        Command::Fold(fold_args) => commands::fold(fold_args).await,
        Command::Unfold(unfold_args) => commands::unfold(unfold_args).await,
        Command::Expand(expand_args) => commands::expand(expand_args).await,
    }
}
