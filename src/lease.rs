//! # Lease Allocator
//!
//! Hands out exclusive integer slots from a lease range, one per requester.
//!
//! A slot is an item at `<lease path>.<index>` whose value is the requester
//! identity. Claiming a slot is a conditional insert, so concurrent
//! allocators racing on one index see exactly one winner; losers move on to
//! the next candidate. Releasing is a conditional delete that expects the
//! requester identity, so a slot reassigned since is never removed.

use crate::model::{LeaseParameter, Parameter};
use crate::storage::{StorageError, StorageProvider};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("no free lease in {start}..={end} for {annotation}")]
    Exhausted {
        annotation: String,
        start: u32,
        end: u32,
    },

    #[error("stored lease key {key} does not end in a slot index")]
    InvalidSlot { key: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Slot held by a requester after [`LeaseAllocator::assign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseAssignment {
    pub index: u32,
    /// Full storage key of the slot.
    pub key: String,
    /// The requester already held this slot.
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub struct LeaseAllocator {
    store: Arc<dyn StorageProvider>,
}

impl LeaseAllocator {
    #[must_use]
    pub fn new(store: Arc<dyn StorageProvider>) -> Self {
        Self { store }
    }

    /// Slot currently held by `requester`, if any.
    ///
    /// # Errors
    ///
    /// Propagates store failures, and rejects keys without a numeric suffix.
    pub async fn held_by(
        &self,
        prefix: &str,
        lease: &LeaseParameter,
        requester: &str,
    ) -> Result<Option<LeaseAssignment>, LeaseError> {
        let parameter = Parameter::Lease(lease.clone());
        let Some(key) = self
            .store
            .get_key_by_parameter_and_value(prefix, &parameter, requester)
            .await?
        else {
            return Ok(None);
        };
        let index = lease
            .slot_from_key(prefix, &key)
            .and_then(|slot| slot.parse().ok())
            .ok_or_else(|| LeaseError::InvalidSlot { key: key.clone() })?;
        Ok(Some(LeaseAssignment {
            index,
            key,
            reused: true,
        }))
    }

    /// Reuse the requester's slot or claim the first free one in range.
    ///
    /// # Errors
    ///
    /// [`LeaseError::Exhausted`] when every slot is taken; store failures
    /// other than a lost race abort the scan.
    pub async fn assign(
        &self,
        prefix: &str,
        lease: &LeaseParameter,
        requester: &str,
    ) -> Result<LeaseAssignment, LeaseError> {
        let span = info_span!(
            "lease.assign",
            annotation = lease.name().annotation(),
            requester
        );

        async move {
            if let Some(existing) = self.held_by(prefix, lease, requester).await? {
                debug!(index = existing.index, "requester already holds a slot");
                return Ok(existing);
            }

            let parameter = Parameter::Lease(lease.clone());
            let taken: HashSet<String> = self
                .store
                .get_keys_by_parameter(prefix, &parameter)
                .await?
                .into_iter()
                .collect();

            for index in lease.range() {
                let slot = Parameter::ResolvedLease(lease.resolve(index.to_string()));
                let key = slot.storage_full_path(prefix);
                if taken.contains(&key) {
                    continue;
                }
                match self.store.put(prefix, &slot, requester, false).await {
                    Ok(()) => {
                        info!(index, key = %key, "lease assigned");
                        return Ok(LeaseAssignment {
                            index,
                            key,
                            reused: false,
                        });
                    }
                    Err(e) if e.is_conflict() => {
                        debug!(index, "lost race for slot, continuing");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let range = lease.range();
            Err(LeaseError::Exhausted {
                annotation: lease.name().annotation().to_string(),
                start: *range.start(),
                end: *range.end(),
            })
        }
        .instrument(span)
        .await
    }

    /// Release the requester's slot. Returns the released index, or `None`
    /// when the requester held nothing or the slot changed hands meanwhile.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn release(
        &self,
        prefix: &str,
        lease: &LeaseParameter,
        requester: &str,
    ) -> Result<Option<u32>, LeaseError> {
        let span = info_span!(
            "lease.release",
            annotation = lease.name().annotation(),
            requester
        );

        async move {
            let Some(held) = self.held_by(prefix, lease, requester).await? else {
                debug!("requester holds no slot");
                return Ok(None);
            };
            let slot = Parameter::ResolvedLease(lease.resolve(held.index.to_string()));
            if self.store.delete(prefix, &slot, requester).await? {
                info!(index = held.index, "lease released");
                Ok(Some(held.index))
            } else {
                debug!(index = held.index, "slot no longer held by requester");
                Ok(None)
            }
        }
        .instrument(span)
        .await
    }
}
