//! Host port allocation for preview containers.

use crate::deployment::{
    domain::PortRange,
    ports::{ContainerRepository, PortProbe, StoreError},
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

/// Errors returned by [`PortAllocator::allocate`].
#[derive(Debug, Clone, Error)]
pub enum PortAllocationError {
    /// Every port in the range is held or unbindable.
    #[error("no ports available in range {0}")]
    NoPortsAvailable(PortRange),
    /// Active ports could not be read from storage.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The blocking port scan did not complete.
    #[error("port scan failed: {0}")]
    ProbeFailed(String),
}

type ClaimSet = Arc<Mutex<BTreeSet<u16>>>;

/// A port handed out by the allocator but not yet recorded on a container
/// row.
///
/// The claim keeps concurrent allocations away from the port until it is
/// dropped, by which point the caller has persisted the row (or given up).
#[derive(Debug)]
pub struct PortClaim {
    port: u16,
    claims: ClaimSet,
}

impl PortClaim {
    /// Returns the claimed port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortClaim {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.port);
    }
}

/// Scans the configured range for a port that no active container holds and
/// the operating system will let a listener bind.
///
/// Allocations are serialised: the scan and the claim happen under one lock,
/// so two deploys can never pick the same port.
#[derive(Debug)]
pub struct PortAllocator<R, Q> {
    repository: Arc<R>,
    probe: Arc<Q>,
    range: PortRange,
    scan: AsyncMutex<()>,
    claims: ClaimSet,
}

impl<R, Q> PortAllocator<R, Q>
where
    R: ContainerRepository,
    Q: PortProbe,
{
    /// Creates an allocator over `range`.
    #[must_use]
    pub fn new(repository: Arc<R>, probe: Arc<Q>, range: PortRange) -> Self {
        Self {
            repository,
            probe,
            range,
            scan: AsyncMutex::new(()),
            claims: ClaimSet::default(),
        }
    }

    /// Returns the configured range.
    #[must_use]
    pub const fn range(&self) -> PortRange {
        self.range
    }

    /// Claims the lowest free port in the range.
    ///
    /// # Errors
    ///
    /// Returns [`PortAllocationError::NoPortsAvailable`] when the range is
    /// exhausted, or [`PortAllocationError::Store`] when active ports cannot
    /// be read.
    pub async fn allocate(&self) -> Result<PortClaim, PortAllocationError> {
        let _scan = self.scan.lock().await;
        let held: BTreeSet<u16> = self.repository.active_ports().await?.into_iter().collect();
        let candidates: Vec<u16> = {
            let claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
            self.range
                .iter()
                .filter(|port| !held.contains(port) && !claims.contains(port))
                .collect()
        };

        // Bind probes block; claims only shrink while `scan` is held.
        let probe = Arc::clone(&self.probe);
        let port = tokio::task::spawn_blocking(move || {
            candidates
                .into_iter()
                .find(|port| probe.is_bindable(*port))
        })
        .await
        .map_err(|err| PortAllocationError::ProbeFailed(err.to_string()))?
        .ok_or(PortAllocationError::NoPortsAvailable(self.range))?;
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(port);

        tracing::debug!(port, range = %self.range, "allocated preview port");
        Ok(PortClaim {
            port,
            claims: Arc::clone(&self.claims),
        })
    }
}
