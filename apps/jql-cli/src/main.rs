use clap::Parser;
use jql_cli::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jql_cli::run(Cli::parse()).await
}
