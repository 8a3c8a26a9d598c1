mod cli;

use anyhow::Result;
use clap::Parser;
use holderscan::{init_tracing, Runner};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = cli::Cli::parse().into_config()?;

    tracing::info!(
        rpc_url = %config.rpc_url(),
        start_block = ?config.start_block(),
        end_block = ?config.end_block(),
        top_k = config.top_k(),
        output = %config.output_path().display(),
        "starting holder scan"
    );

    let report = Runner::new(config)?.run_until_ctrl_c().await?.into_result()?;
    tracing::info!(
        outcome = %report.outcome,
        holders = report.holders.len(),
        last_processed_block = ?report.last_processed_block,
        "holder scan complete"
    );
    Ok(())
}
