//! Classifier and quality types

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::platform::ConnectivityProbe;

/// Downlink (Mbps) above which a top-tier connection counts as fast
const FAST_DOWNLINK_MBPS: f64 = 10.0;

/// Round-trip time (ms) below which a top-tier connection counts as fast
const FAST_RTT_MS: u64 = 100;

/// Downlink (Mbps) above which a second-tier connection counts as good
const GOOD_DOWNLINK_MBPS: f64 = 1.5;

/// Round-trip time (ms) above which any connection counts as slow
const SLOW_RTT_MS: u64 = 1000;

/// Effective connection type reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2G,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveType {
    fn is_top_tier(self) -> bool {
        self == Self::FourG
    }

    fn is_second_tier(self) -> bool {
        self == Self::ThreeG
    }

    fn is_bottom_tier(self) -> bool {
        matches!(self, Self::Slow2G | Self::TwoG)
    }
}

impl std::fmt::Display for EffectiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slow2G => write!(f, "slow-2g"),
            Self::TwoG => write!(f, "2g"),
            Self::ThreeG => write!(f, "3g"),
            Self::FourG => write!(f, "4g"),
        }
    }
}

impl std::str::FromStr for EffectiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "slow-2g" => Ok(Self::Slow2G),
            "2g" => Ok(Self::TwoG),
            "3g" => Ok(Self::ThreeG),
            "4g" => Ok(Self::FourG),
            _ => Err(format!("Unknown effective connection type: {}", s)),
        }
    }
}

/// Raw connection metadata as exposed by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSignals {
    #[serde(rename = "effective-type")]
    pub effective_type: Option<EffectiveType>,

    #[serde(rename = "downlink-mbps")]
    pub downlink_mbps: Option<f64>,

    #[serde(rename = "rtt-ms")]
    pub rtt_ms: Option<u64>,

    /// The user asked the host to reduce data usage
    #[serde(rename = "save-data", default)]
    pub save_data: bool,
}

impl ConnectionSignals {
    /// Signals carrying only an effective type
    pub fn with_type(effective_type: EffectiveType) -> Self {
        Self {
            effective_type: Some(effective_type),
            ..Default::default()
        }
    }

    /// Signals carrying every measurement
    pub fn new(effective_type: EffectiveType, downlink_mbps: f64, rtt_ms: u64) -> Self {
        Self {
            effective_type: Some(effective_type),
            downlink_mbps: Some(downlink_mbps),
            rtt_ms: Some(rtt_ms),
            save_data: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.effective_type.is_none() && self.downlink_mbps.is_none() && self.rtt_ms.is_none() && !self.save_data
    }
}

/// Ordinal classification of current connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Fast,
    Good,
    Slow,
    /// No signal source; the conservative default
    #[default]
    Unknown,
}

impl NetworkQuality {
    /// Multiplier applied to an operation's base timeout
    pub fn timeout_factor(self) -> f64 {
        match self {
            Self::Fast => 0.7,
            Self::Good => 1.0,
            Self::Slow => 2.0,
            Self::Unknown => 1.0,
        }
    }
}

impl std::fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Good => write!(f, "good"),
            Self::Slow => write!(f, "slow"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for NetworkQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "good" => Ok(Self::Good),
            "slow" => Ok(Self::Slow),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown network quality: {}", s)),
        }
    }
}

/// Classify connection signals. First matching rule wins.
///
/// Pure and side-effect free; callers decide how often to sample.
pub fn classify(signals: Option<&ConnectionSignals>) -> NetworkQuality {
    let Some(signals) = signals.filter(|s| !s.is_empty()) else {
        debug!("classify: no signal source");
        return NetworkQuality::Unknown;
    };

    if signals.save_data {
        debug!("classify: save-data requested");
        return NetworkQuality::Slow;
    }

    let effective = signals.effective_type;
    let downlink = signals.downlink_mbps.unwrap_or(0.0);
    let rtt = signals.rtt_ms;

    let top_tier = effective.is_some_and(EffectiveType::is_top_tier);
    let second_tier = effective.is_some_and(EffectiveType::is_second_tier);
    let bottom_tier = effective.is_some_and(EffectiveType::is_bottom_tier);

    if top_tier && downlink > FAST_DOWNLINK_MBPS && rtt.is_some_and(|r| r < FAST_RTT_MS) {
        debug!(downlink, ?rtt, "classify: fast");
        return NetworkQuality::Fast;
    }

    if top_tier || (second_tier && downlink > GOOD_DOWNLINK_MBPS) {
        debug!(?effective, downlink, "classify: good");
        return NetworkQuality::Good;
    }

    if bottom_tier || rtt.is_some_and(|r| r > SLOW_RTT_MS) {
        debug!(?effective, ?rtt, "classify: slow");
        return NetworkQuality::Slow;
    }

    debug!(?effective, "classify: partial signals, defaulting to good");
    NetworkQuality::Good
}

/// Read the probe and classify in one step
pub fn sample(probe: &dyn ConnectivityProbe) -> NetworkQuality {
    classify(probe.signals().as_ref())
}
