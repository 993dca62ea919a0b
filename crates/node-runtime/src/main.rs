//! # Relay Validator Node Runtime
//!
//! Entry point for a relay validator node.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging
//! 2. Load configuration from `QC_*` environment variables
//! 3. Load the validator key (`QC_VALIDATOR_KEY`)
//! 4. Start the runtime (optionally staking `QC_VALIDATOR_STAKE`)
//! 5. Run until Ctrl+C, then shut down gracefully

use anyhow::Result;
use node_runtime::{load_stake_from, load_validator_key, RelayRuntime};
use qc_18_relay_validator::ValidatorConfig;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ValidatorConfig::from_env();
    let keypair = load_validator_key()?;
    let stake = load_stake_from(|key| std::env::var(key).ok())?;

    let runtime = RelayRuntime::new(config, keypair)?;
    runtime.start(stake).await?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
