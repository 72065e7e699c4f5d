//! Health probe

use clap::Args;
use std::time::Duration;

use storefront_harness::server::probe;
use storefront_harness::HarnessConfig;

#[derive(Args)]
pub struct ProbeArgs {
    /// Port to probe (defaults to the configured server port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Connect timeout in milliseconds
    #[arg(long, default_value = "500")]
    pub timeout_ms: u64,
}

pub fn execute(args: ProbeArgs, config: HarnessConfig) -> anyhow::Result<()> {
    let host = &config.server.probe_host;
    let port = args.port.unwrap_or(config.server.port);

    if probe(host, port, Duration::from_millis(args.timeout_ms)) {
        println!("✅ Serving on {}:{}", host, port);
        Ok(())
    } else {
        anyhow::bail!("Nothing listening on {}:{}", host, port);
    }
}
