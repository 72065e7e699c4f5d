//! Keep the storefront dev server running for manual test runs

use clap::Args;
use std::path::PathBuf;
use tracing::info;

use storefront_harness::{HarnessConfig, ServerHandle};

#[derive(Args)]
pub struct ServeArgs {
    /// Port to serve on (defaults to the configured server port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Program used to run the entry point
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Extra directory to search for the project root from
    #[arg(long)]
    pub root: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs, mut config: HarnessConfig) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(interpreter) = args.interpreter {
        config.server.interpreter = interpreter;
    }
    if let Some(root) = args.root {
        config.server.search_roots.insert(0, root);
    }
    config.validate()?;

    let mut server = ServerHandle::acquire(&config.server).await?;
    println!("Server URL: {}", server.base_url());
    if server.is_reused() {
        println!("Reusing a server that was already running; it will be left alone on exit.");
    }

    info!("Press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    server.teardown();
    Ok(())
}
