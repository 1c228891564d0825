//! Classification and decoding of diagnostic status text frames.
//!
//! The flight controller prints its diagnostics as short free text lines. The
//! ones we care about start with a literal family prefix:
//!
//! ```text
//! Setting GPS Initial Altitude: <int> cm
//! SPF[<time_ms>]<gs_diff>;<vx_diff>;<vy_diff>;<vz_diff>;<alt_diff>
//! U[<time_ms>]<gs>;<vx>;<vy>;<vz>;<alt>
//! I[<time_ms>]<gs>;<vx>;<vy>;<vz>;<alt>
//! G[<time_ms>]<gs>;<sat_count>;<vx>;<vy>;<vz>;<alt>
//! ```
//!
//! Everything else the controller prints is not for us and gets dropped.

use std::str::FromStr;

use driftscope_types::{
    Channel,
    ESTIMATE_ARITY,
    GROUND_TRUTH_ARITY,
    SPOOF_DIFF_ARITY,
    Sample,
    Source,
};

/// Lines shorter than this are never inspected.
pub const MIN_FRAME_LENGTH: usize = 8;

const INITIAL_ALTITUDE_LEAD: &str = " GPS Initial Altitude:";
const INITIAL_ALTITUDE_UNIT: &str = " cm";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    InitialAltitude,
    SpoofDiff,
    Uninhibited,
    Inhibited,
    GroundTruth,
}

impl FrameKind {
    /// Prefix tests in the order they're applied. Longer prefixes go first, so
    /// that adding a family with a shorter prefix can't shadow them.
    pub const PREFIX_ORDER: [Self; 5] = [
        Self::InitialAltitude,
        Self::SpoofDiff,
        Self::Uninhibited,
        Self::Inhibited,
        Self::GroundTruth,
    ];

    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::InitialAltitude => "Setting",
            Self::SpoofDiff => "SPF",
            Self::Uninhibited => "U",
            Self::Inhibited => "I",
            Self::GroundTruth => "G",
        }
    }

    /// The source a family's samples belong to. The initial altitude
    /// announcement carries no samples.
    pub const fn source(&self) -> Option<Source> {
        match self {
            Self::InitialAltitude => None,
            Self::SpoofDiff => Some(Source::SpoofDiff),
            Self::Uninhibited => Some(Source::Uninhibited),
            Self::Inhibited => Some(Source::Inhibited),
            Self::GroundTruth => Some(Source::GroundTruth),
        }
    }

    /// Determines the family of a raw line.
    ///
    /// Returns the family and the remainder of the line after the prefix, or
    /// `None` if the line is unrecognized.
    pub fn classify(line: &str) -> Option<(Self, &str)> {
        if line.len() < MIN_FRAME_LENGTH {
            return None;
        }

        Self::PREFIX_ORDER
            .into_iter()
            .find_map(|kind| line.strip_prefix(kind.prefix()).map(|rest| (kind, rest)))
    }
}

/// A decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    InitialAltitude {
        altitude_cm: i32,
    },
    SpoofDiff {
        time_ms: u64,
        values: [f64; SPOOF_DIFF_ARITY],
    },
    Uninhibited {
        time_ms: u64,
        values: [f64; ESTIMATE_ARITY],
    },
    Inhibited {
        time_ms: u64,
        values: [f64; ESTIMATE_ARITY],
    },
    GroundTruth {
        time_ms: u64,
        values: [f64; GROUND_TRUTH_ARITY],
    },
}

impl Frame {
    /// Decodes a line, or returns `None` if it's unrecognized or malformed.
    ///
    /// Partial and corrupted lines are expected on the transport, so this
    /// only leaves a trace message behind.
    pub fn decode(line: &str) -> Option<Self> {
        match line.parse() {
            Ok(frame) => Some(frame),
            Err(error) => {
                tracing::trace!(%line, %error, "dropping frame");
                None
            }
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Self::InitialAltitude { .. } => FrameKind::InitialAltitude,
            Self::SpoofDiff { .. } => FrameKind::SpoofDiff,
            Self::Uninhibited { .. } => FrameKind::Uninhibited,
            Self::Inhibited { .. } => FrameKind::Inhibited,
            Self::GroundTruth { .. } => FrameKind::GroundTruth,
        }
    }

    pub fn source(&self) -> Option<Source> {
        self.kind().source()
    }

    pub fn time_ms(&self) -> Option<u64> {
        match self {
            Self::InitialAltitude { .. } => None,
            Self::SpoofDiff { time_ms, .. } => Some(*time_ms),
            Self::Uninhibited { time_ms, .. } => Some(*time_ms),
            Self::Inhibited { time_ms, .. } => Some(*time_ms),
            Self::GroundTruth { time_ms, .. } => Some(*time_ms),
        }
    }

    /// The frame's fields, each routed to its channel.
    pub fn samples(&self) -> impl Iterator<Item = (Channel, Sample)> + '_ {
        // the value arrays have the same arity as the source's channel list
        let (time_ms, values) = match self {
            Self::InitialAltitude { .. } => (0, <&[f64]>::default()),
            Self::SpoofDiff { time_ms, values } => (*time_ms, values.as_slice()),
            Self::Uninhibited { time_ms, values } => (*time_ms, values.as_slice()),
            Self::Inhibited { time_ms, values } => (*time_ms, values.as_slice()),
            Self::GroundTruth { time_ms, values } => (*time_ms, values.as_slice()),
        };
        let channels = self
            .source()
            .map(|source| source.channels())
            .unwrap_or_default();

        channels
            .iter()
            .zip(values)
            .map(move |(channel, value)| (*channel, Sample::new(time_ms, *value)))
    }
}

impl FromStr for Frame {
    type Err = FrameFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < MIN_FRAME_LENGTH {
            return Err(FrameFromStrError::TooShort { length: s.len() });
        }

        let (kind, rest) = FrameKind::classify(s).ok_or_else(|| {
            FrameFromStrError::UnrecognizedPrefix {
                value: s.to_owned(),
            }
        })?;

        let frame = match kind {
            FrameKind::InitialAltitude => {
                Self::InitialAltitude {
                    altitude_cm: parse_initial_altitude(rest)?,
                }
            }
            FrameKind::SpoofDiff => {
                let (time_ms, values) = parse_fields(rest)?;
                Self::SpoofDiff { time_ms, values }
            }
            FrameKind::Uninhibited => {
                let (time_ms, values) = parse_fields(rest)?;
                Self::Uninhibited { time_ms, values }
            }
            FrameKind::Inhibited => {
                let (time_ms, values) = parse_fields(rest)?;
                Self::Inhibited { time_ms, values }
            }
            FrameKind::GroundTruth => {
                let (time_ms, values) = parse_fields(rest)?;
                Self::GroundTruth { time_ms, values }
            }
        };

        Ok(frame)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("status text frame parse error")]
pub enum FrameFromStrError {
    #[error("frame too short: {length} bytes")]
    TooShort { length: usize },
    #[error("unrecognized prefix: {value}")]
    UnrecognizedPrefix { value: String },
    #[error("missing bracketed timestamp")]
    MissingTimestamp,
    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("invalid field #{index}: {value}")]
    InvalidField { index: usize, value: String },
    #[error("invalid initial altitude: {value}")]
    InvalidInitialAltitude { value: String },
}

/// Parses `[<time_ms>]<f64>;...;<f64>` with exactly `N` fields.
fn parse_fields<const N: usize>(s: &str) -> Result<(u64, [f64; N]), FrameFromStrError> {
    let (timestamp, fields) = s
        .strip_prefix('[')
        .and_then(|s| s.split_once(']'))
        .ok_or(FrameFromStrError::MissingTimestamp)?;

    let time_ms = timestamp.trim().parse::<u64>().map_err(|_| {
        FrameFromStrError::InvalidTimestamp {
            value: timestamp.to_owned(),
        }
    })?;

    let mut fields = fields.split(';');
    let mut values = [0.0; N];

    for (index, value) in values.iter_mut().enumerate() {
        let field = fields.next().ok_or(FrameFromStrError::FieldCount {
            expected: N,
            found: index,
        })?;
        *value = field.trim().parse().map_err(|_| {
            FrameFromStrError::InvalidField {
                index,
                value: field.to_owned(),
            }
        })?;
    }

    let excess = fields.count();
    if excess > 0 {
        return Err(FrameFromStrError::FieldCount {
            expected: N,
            found: N + excess,
        });
    }

    Ok((time_ms, values))
}

/// Parses the remainder of `Setting GPS Initial Altitude: <int> cm`.
fn parse_initial_altitude(s: &str) -> Result<i32, FrameFromStrError> {
    let err = || {
        FrameFromStrError::InvalidInitialAltitude {
            value: s.to_owned(),
        }
    };

    let s = s.strip_prefix(INITIAL_ALTITUDE_LEAD).ok_or_else(err)?;
    let end = s.rfind(INITIAL_ALTITUDE_UNIT).ok_or_else(err)?;
    s[..end].trim().parse().map_err(|_| err())
}
