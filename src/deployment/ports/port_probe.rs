//! Operating-system port availability probe.

/// Checks whether the OS would let a listener bind a host port right now.
///
/// The answer is best-effort: a port may be taken between the probe and the
/// engine binding it. Probes may block, so callers run them off the async
/// executor.
pub trait PortProbe: Send + Sync + 'static {
    /// Returns whether `port` can currently be bound.
    fn is_bindable(&self, port: u16) -> bool;
}
