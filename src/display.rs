//! Display-resolution summaries.
//!
//! A [`DisplaySummary`] is the sole interface handed to drawing code: pure
//! (max, min, rms) triples per displayed channel at pixel resolution, always
//! derived from the storage-resolution summary, never from raw decode.

use crate::reducer;
use crate::summary::{Bucket, Summary};

/// Pixel-resolution bucket columns for the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplaySummary {
    channels: u16,
    width: usize,
    /// One row of `width` buckets per displayed channel.
    rows: Vec<Vec<Bucket>>,
}

impl DisplaySummary {
    /// Number of displayed channels (1 in mono view).
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of columns, equal to the requested pixel width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Column buckets for one displayed channel.
    pub fn channel_columns(&self, channel: usize) -> &[Bucket] {
        self.rows
            .get(channel)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Bucket at `(channel, x)`; zero out of range.
    pub fn column(&self, channel: usize, x: usize) -> Bucket {
        self.rows
            .get(channel)
            .and_then(|row| row.get(x))
            .copied()
            .unwrap_or(Bucket::ZERO)
    }
}

/// Reduce a storage-resolution summary to `target_width` columns.
///
/// The reducer runs once per source channel; in mono view the per-channel
/// rows are then merged elementwise (max/min extrema, averaged rms).
pub(crate) fn reduce_for_display(
    summary: &Summary,
    target_width: usize,
    mono: bool,
) -> DisplaySummary {
    let target_width = target_width.max(1);
    let channels = summary.channels().max(1) as usize;
    let mut rows: Vec<Vec<Bucket>> = Vec::with_capacity(channels);
    for channel in 0..channels {
        let source = summary.channel_buckets(channel);
        rows.push(reducer::reduce_buckets(&source, target_width));
    }
    if mono && rows.len() > 1 {
        let merged = reducer::merge_channels(&rows);
        rows = vec![merged];
    }
    DisplaySummary {
        channels: rows.len() as u16,
        width: target_width,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_summary(bucket_count: usize) -> Summary {
        let mut summary = Summary::new(2, bucket_count);
        for i in 0..bucket_count {
            for c in 0..2 {
                if let Some(slot) = summary.bucket_mut(c, i) {
                    let sign = if c == 0 { 1.0 } else { 0.5 };
                    *slot = Bucket {
                        max: sign * (i as f32 / bucket_count as f32),
                        min: -sign * (i as f32 / bucket_count as f32),
                        rms: sign * 0.1,
                    };
                }
            }
        }
        summary
    }

    #[test]
    fn reduction_produces_exact_target_width() {
        let summary = stereo_summary(2048);
        let display = reduce_for_display(&summary, 300, false);
        assert_eq!(display.width(), 300);
        assert_eq!(display.channels(), 2);
        assert_eq!(display.channel_columns(0).len(), 300);
        assert_eq!(display.channel_columns(1).len(), 300);
    }

    #[test]
    fn mono_view_collapses_to_one_row_with_extrema() {
        let summary = stereo_summary(64);
        let display = reduce_for_display(&summary, 16, true);
        assert_eq!(display.channels(), 1);
        // Left channel has the wider swing, so mono extrema must match it.
        let stereo = reduce_for_display(&summary, 16, false);
        for x in 0..16 {
            assert_eq!(display.column(0, x).max, stereo.column(0, x).max);
            assert_eq!(display.column(0, x).min, stereo.column(0, x).min);
        }
    }

    #[test]
    fn width_is_clamped_to_at_least_one() {
        let summary = stereo_summary(8);
        let display = reduce_for_display(&summary, 0, true);
        assert_eq!(display.width(), 1);
    }

    #[test]
    fn out_of_range_column_reads_zero() {
        let summary = stereo_summary(8);
        let display = reduce_for_display(&summary, 4, true);
        assert_eq!(display.column(3, 0), Bucket::ZERO);
        assert_eq!(display.column(0, 99), Bucket::ZERO);
    }
}
