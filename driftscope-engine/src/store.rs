//! Per-source channel logs behind a single lock.

use std::collections::BTreeMap;

use driftscope_types::{
    Channel,
    Sample,
    Source,
};
use parking_lot::Mutex;

/// Samples of one source, per channel, in arrival order.
pub type SourceLog = BTreeMap<Channel, Vec<Sample>>;

#[derive(Debug, thiserror::Error)]
#[error("store error")]
pub enum StoreError {
    #[error("channel {channel} is not reported by source {origin}")]
    ChannelNotInSource { origin: Source, channel: Channel },
}

/// The logs of all four sources.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelLogs {
    uninhibited: SourceLog,
    inhibited: SourceLog,
    ground_truth: SourceLog,
    spoof_diff: SourceLog,
}

impl ChannelLogs {
    pub fn source(&self, source: Source) -> &SourceLog {
        match source {
            Source::Uninhibited => &self.uninhibited,
            Source::Inhibited => &self.inhibited,
            Source::GroundTruth => &self.ground_truth,
            Source::SpoofDiff => &self.spoof_diff,
        }
    }

    fn source_mut(&mut self, source: Source) -> &mut SourceLog {
        match source {
            Source::Uninhibited => &mut self.uninhibited,
            Source::Inhibited => &mut self.inhibited,
            Source::GroundTruth => &mut self.ground_truth,
            Source::SpoofDiff => &mut self.spoof_diff,
        }
    }

    /// Samples of one channel. Empty if nothing was recorded.
    pub fn channel(&self, source: Source, channel: Channel) -> &[Sample] {
        self.source(source)
            .get(&channel)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn push(
        &mut self,
        source: Source,
        channel: Channel,
        sample: Sample,
    ) -> Result<(), StoreError> {
        check_channel(source, channel)?;
        self.source_mut(source)
            .entry(channel)
            .or_default()
            .push(sample);
        Ok(())
    }

    /// Replaces the log of one source. Channels the source doesn't report are
    /// rejected.
    pub fn set_source(&mut self, source: Source, log: SourceLog) -> Result<(), StoreError> {
        for channel in log.keys() {
            check_channel(source, *channel)?;
        }
        *self.source_mut(source) = log;
        Ok(())
    }

    pub(crate) fn channel_mut(
        &mut self,
        source: Source,
        channel: Channel,
    ) -> Option<&mut Vec<Sample>> {
        self.source_mut(source).get_mut(&channel)
    }

    pub fn num_samples(&self) -> usize {
        Source::ALL
            .into_iter()
            .flat_map(|source| self.source(source).values())
            .map(Vec::len)
            .sum()
    }
}

fn check_channel(source: Source, channel: Channel) -> Result<(), StoreError> {
    if source.has_channel(channel) {
        Ok(())
    }
    else {
        Err(StoreError::ChannelNotInSource {
            origin: source,
            channel,
        })
    }
}

/// Concurrency-safe store of all channel logs of a session.
///
/// Every operation takes the same lock, and holds it only for the append or
/// copy itself. Readers always get owned snapshots, so they never observe a
/// partially applied append.
#[derive(Debug, Default)]
pub struct ChannelStore {
    logs: Mutex<ChannelLogs>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_logs(logs: ChannelLogs) -> Self {
        Self {
            logs: Mutex::new(logs),
        }
    }

    pub fn append(
        &self,
        source: Source,
        channel: Channel,
        sample: Sample,
    ) -> Result<(), StoreError> {
        self.logs.lock().push(source, channel, sample)
    }

    /// Appends several samples of one source under a single lock.
    ///
    /// Either all samples are appended, or none if one of them belongs to a
    /// channel the source doesn't report. Returns the number of samples
    /// appended.
    pub fn append_all(
        &self,
        source: Source,
        samples: impl IntoIterator<Item = (Channel, Sample)>,
    ) -> Result<usize, StoreError> {
        let samples = samples.into_iter().collect::<Vec<_>>();
        for (channel, _) in &samples {
            check_channel(source, *channel)?;
        }

        let mut logs = self.logs.lock();
        for (channel, sample) in &samples {
            logs.push(source, *channel, *sample)?;
        }

        Ok(samples.len())
    }

    pub fn len(&self, source: Source, channel: Channel) -> usize {
        self.logs.lock().channel(source, channel).len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.lock().num_samples() == 0
    }

    pub fn snapshot(&self, source: Source, channel: Channel) -> Vec<Sample> {
        self.logs.lock().channel(source, channel).to_vec()
    }

    /// Samples from offset `start` onwards. Empty if `start` is past the end.
    ///
    /// Useful for consumers that poll for new samples while a capture is
    /// running.
    pub fn snapshot_from(&self, source: Source, channel: Channel, start: usize) -> Vec<Sample> {
        self.logs
            .lock()
            .channel(source, channel)
            .get(start..)
            .map_or_else(Vec::new, |samples| samples.to_vec())
    }

    pub fn snapshot_source(&self, source: Source) -> SourceLog {
        self.logs.lock().source(source).clone()
    }

    /// Snapshots several sources consistently with each other.
    pub fn snapshot_sources<const N: usize>(&self, sources: [Source; N]) -> [SourceLog; N] {
        let logs = self.logs.lock();
        sources.map(|source| logs.source(source).clone())
    }

    pub fn snapshot_all(&self) -> ChannelLogs {
        self.logs.lock().clone()
    }

    /// Replaces everything. Nobody may be ingesting into this store at the
    /// same time.
    pub fn replace_all(&self, logs: ChannelLogs) {
        *self.logs.lock() = logs;
    }
}
