//! Aligning the inhibited estimate with ground truth.
//!
//! Samples are paired by exact timestamp. The estimate is scanned in arrival
//! order and looked up in a timestamp index of ground truth. Estimate samples
//! without a ground-truth partner are left out, and a channel without a
//! single pair doesn't appear in any result.

use std::collections::{
    BTreeMap,
    HashMap,
};

use driftscope_types::{
    Channel,
    Sample,
    Source,
};

use crate::{
    session::Session,
    store::SourceLog,
};

/// Timestamp to value. If a timestamp occurs more than once, the last sample
/// wins.
fn time_index(samples: &[Sample]) -> HashMap<u64, f64> {
    samples
        .iter()
        .map(|sample| (sample.time_ms, sample.value))
        .collect()
}

fn matched_pairs<'a>(
    estimate: &'a [Sample],
    truth: &'a HashMap<u64, f64>,
) -> impl Iterator<Item = (&'a Sample, f64)> + 'a {
    estimate
        .iter()
        .filter_map(move |sample| truth.get(&sample.time_ms).map(|truth| (sample, *truth)))
}

/// The absolute difference at the last matched timestamp, in estimate
/// arrival order.
///
/// Note that this is neither the maximum nor the mean over all pairs.
/// Returns `None` if no timestamps match.
pub fn threshold(estimate: &[Sample], truth: &[Sample]) -> Option<f64> {
    let truth = time_index(truth);
    matched_pairs(estimate, &truth)
        .last()
        .map(|(sample, truth)| (sample.value - truth).abs())
}

/// Pairs of inhibited estimate and ground truth logs, per channel both
/// sources report. Channels with an empty estimate are skipped.
fn paired_channels<'a>(
    inhibited: &'a SourceLog,
    ground_truth: &'a SourceLog,
) -> impl Iterator<Item = (Channel, &'a [Sample], &'a [Sample])> + 'a {
    inhibited.iter().filter_map(move |(channel, estimate)| {
        if estimate.is_empty() {
            return None;
        }
        let truth = ground_truth.get(channel)?;
        Some((*channel, estimate.as_slice(), truth.as_slice()))
    })
}

/// [`threshold`] for every channel of the session.
pub fn thresholds(session: &Session) -> BTreeMap<Channel, f64> {
    let [inhibited, ground_truth] = session
        .store()
        .snapshot_sources([Source::Inhibited, Source::GroundTruth]);

    paired_channels(&inhibited, &ground_truth)
        .filter_map(|(channel, estimate, truth)| {
            let value = threshold(estimate, truth);
            if value.is_none() {
                tracing::debug!(%channel, "no matching timestamps");
            }
            Some((channel, value?))
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiffRow {
    pub time_ms: u64,
    pub estimate: f64,
    pub truth: f64,
    /// Satellite count reported with the ground-truth sample, if any.
    pub sat_count: Option<f64>,
    pub abs_diff: f64,
    pub squared_diff: f64,
}

/// All matched pairs of one channel.
#[derive(Clone, Debug, PartialEq)]
pub struct DiffTable {
    /// One row per matched estimate sample, in arrival order. Never empty.
    pub rows: Vec<DiffRow>,
    pub mean_abs_diff: f64,
    /// Square root of the mean squared difference.
    pub rms_diff: f64,
}

/// Pairs `estimate` with `truth` and annotates each pair with the satellite
/// count at that timestamp. Returns `None` if no timestamps match.
pub fn diff_table(
    estimate: &[Sample],
    truth: &[Sample],
    sat_count: &[Sample],
) -> Option<DiffTable> {
    let truth = time_index(truth);
    let sat_count = time_index(sat_count);

    let rows = matched_pairs(estimate, &truth)
        .map(|(sample, truth)| {
            let abs_diff = (sample.value - truth).abs();
            DiffRow {
                time_ms: sample.time_ms,
                estimate: sample.value,
                truth,
                sat_count: sat_count.get(&sample.time_ms).copied(),
                abs_diff,
                squared_diff: abs_diff * abs_diff,
            }
        })
        .collect::<Vec<_>>();

    if rows.is_empty() {
        return None;
    }

    let n = rows.len() as f64;
    let mean_abs_diff = rows.iter().map(|row| row.abs_diff).sum::<f64>() / n;
    let rms_diff = (rows.iter().map(|row| row.squared_diff).sum::<f64>() / n).sqrt();

    Some(DiffTable {
        rows,
        mean_abs_diff,
        rms_diff,
    })
}

/// [`diff_table`] for every channel of the session.
pub fn diff_tables(session: &Session) -> BTreeMap<Channel, DiffTable> {
    let [inhibited, ground_truth] = session
        .store()
        .snapshot_sources([Source::Inhibited, Source::GroundTruth]);
    let sat_count = channel_samples(&ground_truth, Channel::SatCount);

    paired_channels(&inhibited, &ground_truth)
        .filter_map(|(channel, estimate, truth)| {
            diff_table(estimate, truth, sat_count).map(|table| (channel, table))
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelSummary {
    pub inhibited: usize,
    pub uninhibited: usize,
    pub ground_truth: usize,
    /// Longest capture span of the three sources, in whole seconds.
    pub span_secs: u64,
}

fn channel_samples(log: &SourceLog, channel: Channel) -> &[Sample] {
    log.get(&channel).map(Vec::as_slice).unwrap_or_default()
}

fn span_ms(samples: &[Sample]) -> u64 {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => last.time_ms.saturating_sub(first.time_ms),
        _ => 0,
    }
}

/// Sample counts per channel. Channels that the inhibited estimate or ground
/// truth didn't report are left out.
pub fn summary(session: &Session) -> BTreeMap<Channel, ChannelSummary> {
    let [uninhibited, inhibited, ground_truth] = session.store().snapshot_sources([
        Source::Uninhibited,
        Source::Inhibited,
        Source::GroundTruth,
    ]);

    Source::Inhibited
        .channels()
        .iter()
        .filter_map(|channel| {
            let inhibited = channel_samples(&inhibited, *channel);
            let ground_truth = channel_samples(&ground_truth, *channel);
            if inhibited.is_empty() || ground_truth.is_empty() {
                return None;
            }
            let uninhibited = channel_samples(&uninhibited, *channel);

            let span_ms = [uninhibited, inhibited, ground_truth]
                .into_iter()
                .map(span_ms)
                .max()
                .unwrap_or_default();

            Some((
                *channel,
                ChannelSummary {
                    inhibited: inhibited.len(),
                    uninhibited: uninhibited.len(),
                    ground_truth: ground_truth.len(),
                    span_secs: span_ms / 1000,
                },
            ))
        })
        .collect()
}

/// Splits samples into timestamps and values, e.g. for plotting.
pub fn unzip_series(samples: &[Sample]) -> (Vec<u64>, Vec<f64>) {
    samples
        .iter()
        .map(|sample| (sample.time_ms, sample.value))
        .unzip()
}
