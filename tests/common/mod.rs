//! Shared fixtures for the integration tests.
//!
//! Builds creators over the in-memory store with the deterministic generator,
//! so runs are repeatable and never touch AWS.

#![allow(dead_code, reason = "Not every test file uses every helper")]

use secret_lease_controller::controller::{Creator, EventAction, LifecycleEvent, WorkloadRef};
use secret_lease_controller::generator::DeterministicGenerator;
use secret_lease_controller::model::{LeaseParameter, Parameter};
use secret_lease_controller::storage::InMemoryStorageProvider;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const DOMAIN: &str = "bsycorp.com";

pub fn annotations(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect()
}

pub fn event(action: EventAction, pod: &str, entries: &[(&str, &str)]) -> LifecycleEvent {
    LifecycleEvent::new(action, WorkloadRef::new("default", pod), annotations(entries))
}

pub fn creator_with_ttl(store: Arc<InMemoryStorageProvider>, ttl: Duration) -> Creator {
    Creator::new(
        DOMAIN,
        store,
        Arc::new(DeterministicGenerator::new().expect("bundled key pool loads")),
        ttl,
    )
}

pub fn creator(store: Arc<InMemoryStorageProvider>) -> Creator {
    creator_with_ttl(store, Duration::from_secs(60))
}

pub fn lease(name: &str, start: u32, end: u32) -> LeaseParameter {
    let key = format!("lease.{DOMAIN}/{name}");
    let value = format!("kind=INDEX,rangeStart={start},rangeEnd={end}");
    match Parameter::construct(DOMAIN, &key, &value) {
        Ok(Some(Parameter::Lease(lease))) => lease,
        other => panic!("expected a lease parameter, got {other:?}"),
    }
}
