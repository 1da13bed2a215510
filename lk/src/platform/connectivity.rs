//! Connectivity signal source

use std::sync::RwLock;

use tracing::debug;

use crate::network::ConnectionSignals;

/// Ambient source of connection metadata and online status
pub trait ConnectivityProbe: Send + Sync {
    /// Current connection signals, or `None` when the host exposes none
    fn signals(&self) -> Option<ConnectionSignals>;

    /// Whether the host reports itself online
    fn is_online(&self) -> bool {
        true
    }
}

/// Probe for hosts without any connection API.
///
/// Always reports no signals (classified as `unknown`) and online.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProbe;

impl ConnectivityProbe for NoopProbe {
    fn signals(&self) -> Option<ConnectionSignals> {
        None
    }
}

#[derive(Debug, Clone)]
struct ProbeState {
    signals: Option<ConnectionSignals>,
    online: bool,
}

/// Probe whose readings are set explicitly, for embedding hosts and simulation
#[derive(Debug)]
pub struct ManualProbe {
    state: RwLock<ProbeState>,
}

impl ManualProbe {
    /// Create a probe reporting the given signals and online
    pub fn new(signals: Option<ConnectionSignals>) -> Self {
        debug!(?signals, "ManualProbe::new: called");
        Self {
            state: RwLock::new(ProbeState { signals, online: true }),
        }
    }

    /// Replace the reported connection signals
    pub fn set_signals(&self, signals: Option<ConnectionSignals>) {
        debug!(?signals, "ManualProbe::set_signals: called");
        if let Ok(mut state) = self.state.write() {
            state.signals = signals;
        }
    }

    /// Set the reported online status
    pub fn set_online(&self, online: bool) {
        debug!(online, "ManualProbe::set_online: called");
        if let Ok(mut state) = self.state.write() {
            state.online = online;
        }
    }
}

impl Default for ManualProbe {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ConnectivityProbe for ManualProbe {
    fn signals(&self) -> Option<ConnectionSignals> {
        self.state.read().ok().and_then(|s| s.signals.clone())
    }

    fn is_online(&self) -> bool {
        self.state.read().map(|s| s.online).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::EffectiveType;

    #[test]
    fn test_noop_probe_degrades() {
        let probe = NoopProbe;
        assert!(probe.signals().is_none());
        assert!(probe.is_online());
    }

    #[test]
    fn test_manual_probe_updates() {
        let probe = ManualProbe::default();
        assert!(probe.signals().is_none());

        probe.set_signals(Some(ConnectionSignals::with_type(EffectiveType::ThreeG)));
        assert_eq!(
            probe.signals().and_then(|s| s.effective_type),
            Some(EffectiveType::ThreeG)
        );

        probe.set_online(false);
        assert!(!probe.is_online());
    }
}
