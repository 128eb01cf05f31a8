use apiflows::{cli, logging, Result};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let _logging = logging::init(&args.command)?;
    cli::run(args).await
}
