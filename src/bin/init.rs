//! # Secret Lease Init
//!
//! Init container entry point: resolves the pod's annotated secrets,
//! resources and leases into properties files. Exits non-zero, writing
//! nothing, when any parameter cannot be resolved.

use anyhow::{Context, Result};
use clap::Parser;
use secret_lease_controller::config::Settings;
use secret_lease_controller::init::{self, InitOptions};
use secret_lease_controller::runtime::initialization::{
    init_tracing, install_crypto_provider, log_build_info,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let options = InitOptions::parse();

    install_crypto_provider();
    init_tracing();
    log_build_info("secret lease init");

    let settings = Settings::from_env();
    let plan = init::run(&options, &settings)
        .await
        .context("Init failed, no files were written")?;
    info!(files = plan.files().len(), "Done");
    Ok(())
}
