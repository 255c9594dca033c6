//! Port probe that asks the operating system directly.

use crate::deployment::ports::PortProbe;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

/// Probes ports by briefly binding a TCP listener on the publish address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpPortProbe {
    bind_host: IpAddr,
}

impl TcpPortProbe {
    /// Creates a probe binding on `bind_host`.
    #[must_use]
    pub const fn new(bind_host: IpAddr) -> Self {
        Self { bind_host }
    }
}

impl Default for TcpPortProbe {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl PortProbe for TcpPortProbe {
    fn is_bindable(&self, port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(self.bind_host, port)).is_ok()
    }
}
