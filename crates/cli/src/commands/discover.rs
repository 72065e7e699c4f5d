//! Project root discovery

use clap::Args;
use std::path::PathBuf;

use storefront_harness::discovery::discover_root;
use storefront_harness::HarnessConfig;

#[derive(Args)]
pub struct DiscoverArgs {
    /// Extra directory to search from, tried first
    #[arg(long)]
    pub from: Option<PathBuf>,
}

pub fn execute(args: DiscoverArgs, mut config: HarnessConfig) -> anyhow::Result<()> {
    if let Some(from) = args.from {
        config.server.search_roots.insert(0, from);
    }

    let root = discover_root(&config.server)?;
    println!("{}", root.display());
    Ok(())
}
