use anyhow::Result;
use calvin::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
