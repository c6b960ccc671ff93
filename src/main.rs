//! Command-line entry point for replicheck.

use clap::Parser;
use replicheck::{HarnessArgs, HarnessPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = HarnessArgs::parse();
    let mut pipeline = HarnessPipeline::new(args.harness_config());
    let report = pipeline.run().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}
