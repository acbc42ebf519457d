//! Process-wide endpoint leases
//!
//! A lease marks an endpoint as in use for the lifetime of a session. It is
//! released on drop, so a session that is torn down for any reason (explicit
//! disconnect, timeout during connect, EOF) frees its endpoint.

use std::collections::HashSet;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::error::LinkError;

fn registry() -> &'static Mutex<HashSet<String>> {
    static LEASES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    LEASES.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive claim on an endpoint
#[derive(Debug)]
pub struct EndpointLease {
    endpoint: String,
}

impl EndpointLease {
    /// Claim `endpoint`, failing with `LinkError::Busy` if already held
    pub fn acquire(endpoint: &str) -> Result<Self, LinkError> {
        let mut held = registry().lock();
        if !held.insert(endpoint.to_string()) {
            return Err(LinkError::Busy(format!(
                "{} already has an open session",
                endpoint
            )));
        }
        tracing::trace!(endpoint, "Endpoint lease acquired");
        Ok(Self {
            endpoint: endpoint.to_string(),
        })
    }

    /// Whether any live lease holds `endpoint`
    pub fn is_held(endpoint: &str) -> bool {
        registry().lock().contains(endpoint)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for EndpointLease {
    fn drop(&mut self) {
        registry().lock().remove(&self.endpoint);
        tracing::trace!(endpoint = %self.endpoint, "Endpoint lease released");
    }
}
