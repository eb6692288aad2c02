//! # Watch Loop
//!
//! Watches pods in every namespace and feeds their events to the creator.
//!
//! Events for distinct pods are handled concurrently, up to the configured
//! limit; the creator serialises events for the same pod. The loop ends when
//! the watch stream ends or a shutdown signal arrives, and then releases the
//! completion latch.

use crate::controller::{CompletionLatch, Creator, EventAction, LifecycleEvent};
use crate::server::ServerState;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube_runtime::{watcher, WatchStreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Map a watch event onto a lifecycle event.
///
/// Objects from the initial listing count as added, later applies as
/// modified. Bookkeeping events map to `None`.
#[must_use]
pub fn lifecycle_event(event: watcher::Event<Pod>) -> Option<LifecycleEvent> {
    match event {
        watcher::Event::InitApply(pod) => Some(LifecycleEvent::from_pod(EventAction::Added, &pod)),
        watcher::Event::Apply(pod) => Some(LifecycleEvent::from_pod(EventAction::Modified, &pod)),
        watcher::Event::Delete(pod) => Some(LifecycleEvent::from_pod(EventAction::Deleted, &pod)),
        watcher::Event::Init | watcher::Event::InitDone => None,
    }
}

/// Run the pod watch until the stream ends or shutdown is requested.
///
/// Watch errors are logged and retried with backoff.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn run_watch_loop(
    pods: Api<Pod>,
    creator: Arc<Creator>,
    server_state: Arc<ServerState>,
    latch: CompletionLatch,
    max_concurrent_events: usize,
) -> Result<(), anyhow::Error> {
    // Shutdown: mark not ready and release the latch so the stream stops.
    let shutdown_state = Arc::clone(&server_state);
    let shutdown_latch = latch.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        }
        shutdown_state.is_ready.store(false, Ordering::Relaxed);
        shutdown_latch.release();
    });

    let watch_span = tracing::span!(
        tracing::Level::INFO,
        "controller.watch",
        operation = "watch_loop",
        max_concurrent_events
    );

    info!("Starting pod watch loop...");
    server_state.is_ready.store(true, Ordering::Relaxed);

    let stop = latch.clone();
    watcher(pods, watcher::Config::default())
        .default_backoff()
        .take_until(async move { stop.wait().await })
        .for_each_concurrent(max_concurrent_events, |item| {
            let creator = Arc::clone(&creator);
            async move {
                match item {
                    Ok(event) => {
                        if let Some(event) = lifecycle_event(event) {
                            debug!(pod = %event.workload, action = %event.action, "watch.event");
                            creator.process(&event).await;
                        }
                    }
                    Err(e) => warn!(error = %e, "Pod watch error, retrying with backoff"),
                }
            }
        })
        .instrument(watch_span)
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    latch.release();
    info!(
        events = creator.stats().events(),
        exceptions = creator.stats().exceptions(),
        "Pod watch closed, controller stopped"
    );
    Ok(())
}
