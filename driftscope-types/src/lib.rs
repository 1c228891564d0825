//! Shared vocabulary for the driftscope crates.
//!
//! Every decoded value belongs to exactly one ([`Source`], [`Channel`]) pair.
//! Both are closed enums with stable symbolic keys, which are used on the wire
//! and in recordings.

#[cfg(feature = "serde")]
mod serde;

use std::{
    fmt::{
        Debug,
        Display,
    },
    str::FromStr,
};

/// A scalar measurement series.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    GroundSpeed,
    SatCount,
    VelocityX,
    VelocityY,
    VelocityZ,
    Altitude,
    GroundSpeedDiff,
    VelocityXDiff,
    VelocityYDiff,
    VelocityZDiff,
    AltitudeDiff,
}

impl Channel {
    pub const ALL: [Self; 11] = [
        Self::GroundSpeed,
        Self::SatCount,
        Self::VelocityX,
        Self::VelocityY,
        Self::VelocityZ,
        Self::Altitude,
        Self::GroundSpeedDiff,
        Self::VelocityXDiff,
        Self::VelocityYDiff,
        Self::VelocityZDiff,
        Self::AltitudeDiff,
    ];

    pub const fn key(&self) -> &'static str {
        match self {
            Self::GroundSpeed => "GS",
            Self::SatCount => "SC",
            Self::VelocityX => "VX",
            Self::VelocityY => "VY",
            Self::VelocityZ => "VZ",
            Self::Altitude => "ALT",
            Self::GroundSpeedDiff => "GSD",
            Self::VelocityXDiff => "VXD",
            Self::VelocityYDiff => "VYD",
            Self::VelocityZDiff => "VZD",
            Self::AltitudeDiff => "ALTD",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.key() == key)
    }

    /// Human readable name, e.g. for chart titles.
    pub const fn title(&self) -> &'static str {
        match self {
            Self::GroundSpeed => "Ground Speed",
            Self::SatCount => "Satellite Count",
            Self::VelocityX => "Velocity (X)",
            Self::VelocityY => "Velocity (Y)",
            Self::VelocityZ => "Velocity (Z)",
            Self::Altitude => "Altitude",
            Self::GroundSpeedDiff => "Ground Speed Diff",
            Self::VelocityXDiff => "Velocity X Diff",
            Self::VelocityYDiff => "Velocity Y Diff",
            Self::VelocityZDiff => "Velocity Z Diff",
            Self::AltitudeDiff => "Altitude Diff",
        }
    }

    /// Axis label including the unit.
    pub const fn unit_label(&self) -> &'static str {
        match self {
            Self::GroundSpeed => "Speed (cm/s)",
            Self::SatCount => "Satellite Count",
            Self::VelocityX | Self::VelocityY | Self::VelocityZ => "Velocity (cm/s)",
            Self::Altitude => "Altitude (cm)",
            Self::GroundSpeedDiff
            | Self::VelocityXDiff
            | Self::VelocityYDiff
            | Self::VelocityZDiff
            | Self::AltitudeDiff => "Threshold Differences (cm)",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Channel({})", self.key())
    }
}

impl FromStr for Channel {
    type Err = ChannelFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| {
            ChannelFromStrError {
                input: s.to_owned(),
            }
        })
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("Invalid channel key: {input}")]
pub struct ChannelFromStrError {
    pub input: String,
}

/// Logical producer of samples.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    /// Estimator fused with satellite-navigation correction.
    Uninhibited,
    /// Estimator running without satellite-navigation correction.
    Inhibited,
    /// The satellite-navigation receiver.
    GroundTruth,
    /// Differences computed on board by the spoofing detector.
    SpoofDiff,
}

impl Source {
    pub const ALL: [Self; 4] = [
        Self::Uninhibited,
        Self::Inhibited,
        Self::GroundTruth,
        Self::SpoofDiff,
    ];

    pub const fn key(&self) -> &'static str {
        match self {
            Self::Uninhibited => "EKF_U",
            Self::Inhibited => "EKF_I",
            Self::GroundTruth => "GPS",
            Self::SpoofDiff => "SPF",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|source| source.key() == key)
    }

    /// The fixed set of channels this source reports, in wire order.
    pub const fn channels(&self) -> &'static [Channel] {
        match self {
            Self::Uninhibited | Self::Inhibited => &ESTIMATE_CHANNELS,
            Self::GroundTruth => &GROUND_TRUTH_CHANNELS,
            Self::SpoofDiff => &SPOOF_DIFF_CHANNELS,
        }
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        self.channels().contains(&channel)
    }

    /// Position of `channel` in [`Self::channels`].
    pub fn channel_index(&self, channel: Channel) -> Option<usize> {
        self.channels().iter().position(|c| *c == channel)
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Source({})", self.key())
    }
}

impl FromStr for Source {
    type Err = SourceFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| {
            SourceFromStrError {
                input: s.to_owned(),
            }
        })
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("Invalid source key: {input}")]
pub struct SourceFromStrError {
    pub input: String,
}

pub const ESTIMATE_ARITY: usize = 5;
pub const GROUND_TRUTH_ARITY: usize = 6;
pub const SPOOF_DIFF_ARITY: usize = 5;

/// Field order of the `U` and `I` frames.
pub const ESTIMATE_CHANNELS: [Channel; ESTIMATE_ARITY] = [
    Channel::GroundSpeed,
    Channel::VelocityX,
    Channel::VelocityY,
    Channel::VelocityZ,
    Channel::Altitude,
];

/// Field order of the `G` frames.
pub const GROUND_TRUTH_CHANNELS: [Channel; GROUND_TRUTH_ARITY] = [
    Channel::GroundSpeed,
    Channel::SatCount,
    Channel::VelocityX,
    Channel::VelocityY,
    Channel::VelocityZ,
    Channel::Altitude,
];

/// Field order of the `SPF` frames.
pub const SPOOF_DIFF_CHANNELS: [Channel; SPOOF_DIFF_ARITY] = [
    Channel::GroundSpeedDiff,
    Channel::VelocityXDiff,
    Channel::VelocityYDiff,
    Channel::VelocityZDiff,
    Channel::AltitudeDiff,
];

/// One measurement: device clock in milliseconds and the measured value.
///
/// Samples are kept in arrival order, which is not necessarily timestamp
/// order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub time_ms: u64,
    pub value: f64,
}

impl Sample {
    pub const fn new(time_ms: u64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

impl From<(u64, f64)> for Sample {
    fn from((time_ms, value): (u64, f64)) -> Self {
        Self { time_ms, value }
    }
}

impl From<Sample> for (u64, f64) {
    fn from(value: Sample) -> Self {
        (value.time_ms, value.value)
    }
}
