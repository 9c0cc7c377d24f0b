use anyhow::Result;
use orepool_backend::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
