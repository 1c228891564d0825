use driftscope_statustext::Frame;
use driftscope_types::{
    Channel,
    Sample,
    Source,
};
use parking_lot::Mutex;

use crate::store::{
    ChannelLogs,
    ChannelStore,
    StoreError,
};

/// One recording: all channel logs plus the receiver's initial altitude.
///
/// A session is created empty and filled by ingestion, or restored from a
/// recording with [`LogDirectory::load`][crate::persistence::LogDirectory::load].
/// Share it with `Arc` between the ingestion task and readers.
#[derive(Debug, Default)]
pub struct Session {
    store: ChannelStore,
    altitude: Mutex<InitialAltitude>,
}

#[derive(Clone, Debug, Default)]
struct InitialAltitude {
    bias_cm: Option<i32>,
    /// Ground-truth altitudes as loaded, before the bias was subtracted.
    /// `Some` iff the bias was applied.
    raw_altitudes: Option<Vec<Sample>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &ChannelStore {
        &self.store
    }

    /// The initial altitude announced by the receiver, in centimeters.
    pub fn initial_altitude_cm(&self) -> Option<i32> {
        self.altitude.lock().bias_cm
    }

    pub fn set_initial_altitude_cm(&self, altitude_cm: i32) {
        let mut altitude = self.altitude.lock();
        if let Some(previous) = altitude.bias_cm {
            if previous != altitude_cm {
                tracing::warn!(previous, altitude_cm, "initial altitude announced again");
            }
        }
        altitude.bias_cm = Some(altitude_cm);
    }

    /// Whether ground-truth altitudes in this session have the initial
    /// altitude subtracted already.
    pub fn is_altitude_corrected(&self) -> bool {
        self.altitude.lock().raw_altitudes.is_some()
    }

    /// Builds a session from stored logs, which contain raw receiver
    /// altitudes.
    ///
    /// A positive initial altitude is subtracted from every ground-truth
    /// altitude sample. This happens exactly once per session.
    pub fn restore(mut logs: ChannelLogs, initial_altitude_cm: Option<i32>) -> Self {
        let mut raw_altitudes = None;

        if let Some(bias_cm) = initial_altitude_cm.filter(|bias_cm| *bias_cm > 0) {
            let altitudes = logs.channel_mut(Source::GroundTruth, Channel::Altitude);
            raw_altitudes = Some(altitudes.as_deref().cloned().unwrap_or_default());
            for sample in altitudes.into_iter().flatten() {
                sample.value -= f64::from(bias_cm);
            }
        }

        Self {
            store: ChannelStore::from_logs(logs),
            altitude: Mutex::new(InitialAltitude {
                bias_cm: initial_altitude_cm,
                raw_altitudes,
            }),
        }
    }

    /// Channel logs with raw receiver altitudes, i.e. with any applied
    /// correction undone. This is what gets stored.
    ///
    /// Corrected samples are replaced by the values they were loaded with, so
    /// the result is bit-exact. Samples appended after the restore were never
    /// corrected and are kept as they are.
    pub fn raw_logs(&self) -> ChannelLogs {
        let mut logs = self.store.snapshot_all();
        let altitude = self.altitude.lock();

        if let (Some(raw), Some(altitudes)) = (
            &altitude.raw_altitudes,
            logs.channel_mut(Source::GroundTruth, Channel::Altitude),
        ) {
            for (sample, raw) in altitudes.iter_mut().zip(raw) {
                *sample = *raw;
            }
        }

        logs
    }

    /// Routes one decoded frame into the session. Returns the number of
    /// samples appended.
    pub fn push_frame(&self, frame: &Frame) -> Result<usize, StoreError> {
        match (frame, frame.source()) {
            (Frame::InitialAltitude { altitude_cm }, _) => {
                tracing::info!(altitude_cm, "initial altitude");
                self.set_initial_altitude_cm(*altitude_cm);
                Ok(0)
            }
            (_, Some(source)) => self.store.append_all(source, frame.samples()),
            (_, None) => Ok(0),
        }
    }

    /// Decodes one raw line and pushes it. Returns `None` if the line was
    /// dropped.
    pub fn push_line(&self, line: &str) -> Option<Result<usize, StoreError>> {
        Frame::decode(line).map(|frame| self.push_frame(&frame))
    }
}
