//! Port probe with a fixed set of occupied ports.

use crate::deployment::ports::PortProbe;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

/// Port probe that reports every port bindable except the blocked ones.
#[derive(Debug, Clone, Default)]
pub struct StaticPortProbe {
    blocked: Arc<RwLock<BTreeSet<u16>>>,
    probed: Arc<RwLock<Vec<u16>>>,
}

impl StaticPortProbe {
    /// Creates a probe with no blocked ports.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `port` as held by some process outside the orchestrator.
    pub fn block(&self, port: u16) {
        if let Ok(mut blocked) = self.blocked.write() {
            blocked.insert(port);
        }
    }

    /// Releases a previously blocked port.
    pub fn unblock(&self, port: u16) {
        if let Ok(mut blocked) = self.blocked.write() {
            blocked.remove(&port);
        }
    }

    /// Returns every port probed so far, in probe order.
    #[must_use]
    pub fn probed(&self) -> Vec<u16> {
        self.probed
            .read()
            .map(|probed| probed.clone())
            .unwrap_or_default()
    }
}

impl PortProbe for StaticPortProbe {
    fn is_bindable(&self, port: u16) -> bool {
        if let Ok(mut probed) = self.probed.write() {
            probed.push(port);
        }
        self.blocked
            .read()
            .map(|blocked| !blocked.contains(&port))
            .unwrap_or(false)
    }
}
