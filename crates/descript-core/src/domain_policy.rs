//! Global domain policy
//!
//! The host has exactly one domain policy slot. Whoever activates it owns
//! script enforcement until the returned guard is deactivated or dropped.
//! The whitelist itself lives independently of the slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use descript_policy::{PolicyDecider, WhitelistStore};

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct DomainPolicyRegistry {
    active: Arc<AtomicBool>,
}

impl DomainPolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Claim the slot and enforce `store` through it
    pub fn activate(&self, store: Arc<WhitelistStore>) -> Result<DomainPolicy> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CoreError::DomainPolicyActive)?;

        tracing::info!("Domain policy activated");

        Ok(DomainPolicy {
            registry: self.clone(),
            decider: PolicyDecider::new(store),
            released: false,
        })
    }
}

/// Active domain policy; releases the slot when deactivated or dropped
#[derive(Debug)]
pub struct DomainPolicy {
    registry: DomainPolicyRegistry,
    decider: PolicyDecider,
    released: bool,
}

impl DomainPolicy {
    /// Decider for the host's content-load hook while this policy is active
    pub fn decider(&self) -> &PolicyDecider {
        &self.decider
    }

    pub fn deactivate(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.active.store(false, Ordering::Release);
        tracing::info!("Domain policy deactivated");
    }
}

impl Drop for DomainPolicy {
    fn drop(&mut self) {
        self.release();
    }
}
