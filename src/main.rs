use anyhow::Result;
use clap::Parser;
use fiscus::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    cli.run().await
}
