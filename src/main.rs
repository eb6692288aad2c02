//! # Secret Lease Controller
//!
//! Watches pods in every namespace and provisions what their annotations ask
//! for:
//!
//! 1. **Secrets** - generated RSA, GPG, random or password material, written once
//! 2. **Leases** - one integer slot per pod within a declared range, released on delete
//! 3. **Resources** - never generated, only read by the init container
//!
//! Values live in a DynamoDB table named `<ENV_LABEL>-kube-secret`.
//! Prometheus metrics and probes are served on `METRICS_PORT`.

use anyhow::Result;
use secret_lease_controller::controller::CompletionLatch;
use secret_lease_controller::runtime::{initialize, run_watch_loop};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    let latch = CompletionLatch::new();
    run_watch_loop(
        init_result.pods,
        init_result.creator,
        init_result.server_state,
        latch.clone(),
        init_result.settings.max_concurrent_events,
    )
    .await?;

    latch.wait().await;
    info!("Controller stopped");
    Ok(())
}
