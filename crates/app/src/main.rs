mod args;
mod logging;
mod op;
mod ops;
mod state;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Cat, Exists, Ln, Ls, Mv, Publish, Put, Readlink, Rm, Rmdir, Version};
use state::AppState;
use tokio::sync::watch;

command_enum! {
    (Put, Put),
    (Rm, Rm),
    (Rmdir, Rmdir),
    (Mv, Mv),
    (Ln, Ln),
    (Exists, Exists),
    (Readlink, Readlink),
    (Ls, Ls),
    (Cat, Cat),
    (Publish, Publish),
    (Version, Version),
}

/// First Ctrl-C asks running copies to stop, a second one exits.
fn shutdown_on_ctrl_c() -> watch::Receiver<()> {
    let (tx, rx) = watch::channel(());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("interrupted, cancelling (Ctrl-C again to abort)");
        let _ = tx.send(());

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    rx
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let state = match AppState::load(args.config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error: failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let level = state.config.level().unwrap_or(tracing::Level::WARN);
    let guards = logging::init_logging(level, state.config.log_dir.as_deref());
    tracing::debug!(config = %state.config_path.display(), "loaded config");

    let mut storage_config = state.config.storage;
    if let Some(prefix) = args.prefix {
        storage_config.prefix = prefix;
    }
    let ctx = op::OpContext::new(storage_config, shutdown_on_ctrl_c());

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush log writers before exiting
    drop(guards);
    std::process::exit(code);
}
