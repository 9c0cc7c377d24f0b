pub mod args;
pub mod commands;

pub use args::{Args, Commands};

pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    commands::execute(args).await
}
