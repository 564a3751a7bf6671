pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pubstore")]
#[command(about = "Manage a published package repository in object storage")]
pub struct Args {
    /// Config file (defaults to ~/.pubstore/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured publish prefix
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
