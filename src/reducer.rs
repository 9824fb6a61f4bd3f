//! Drift-corrected bucket reduction.
//!
//! The same boundary algorithm is used at both resolutions: once while
//! decoding raw frames into the storage-resolution summary, and again when
//! re-bucketing that summary down to pixel width. Boundaries come from a
//! floating accumulator so the remainder of `n_in / n_out` is spread evenly
//! across the output instead of piling up at either end.

use crate::summary::{Bucket, Summary};

/// Contiguous run boundaries partitioning `[0, n_in)` into `n_out` buckets.
///
/// Runs are monotonic, non-overlapping, and cover the input exactly; each run
/// length is within 1 of `n_in / n_out`. When `n_out > n_in` some runs are
/// empty.
pub fn run_bounds(n_in: usize, n_out: usize) -> Vec<(usize, usize)> {
    let n_out = n_out.max(1);
    let per_bucket = n_in as f64 / n_out as f64;
    let mut bounds = Vec::with_capacity(n_out);
    let mut start = 0usize;
    for i in 0..n_out {
        let end = if i + 1 == n_out {
            // Clamp the final boundary so float rounding cannot drop or
            // duplicate the tail element.
            n_in
        } else {
            (((i + 1) as f64) * per_bucket).floor() as usize
        };
        let end = end.clamp(start, n_in);
        bounds.push((start, end));
        start = end;
    }
    bounds
}

/// Re-bucket already-reduced buckets down to `n_out`.
///
/// Per run: elementwise max/min, and the arithmetic mean of the already-rooted
/// rms values. Averaging rms-of-rms is an approximation (a true rms would need
/// the original sums of squares); it is kept deliberately for compatibility
/// with the stored summaries this crate has always produced.
pub fn reduce_buckets(src: &[Bucket], n_out: usize) -> Vec<Bucket> {
    let mut out = Vec::with_capacity(n_out.max(1));
    let mut previous = Bucket::ZERO;
    for (start, end) in run_bounds(src.len(), n_out) {
        if end <= start {
            // Empty run at tiny inputs: repeat the previous bucket.
            out.push(previous);
            continue;
        }
        let mut max = -1.0_f32;
        let mut min = 1.0_f32;
        let mut rms_sum = 0.0_f32;
        for bucket in &src[start..end] {
            max = max.max(bucket.max);
            min = min.min(bucket.min);
            rms_sum += bucket.rms;
        }
        let merged = Bucket {
            max,
            min,
            rms: rms_sum / (end - start) as f32,
        };
        out.push(merged);
        previous = merged;
    }
    out
}

/// Collapse per-channel bucket rows into one mono row.
///
/// Elementwise max/min across channels; rms averaged, same approximation as
/// [`reduce_buckets`].
pub fn merge_channels(rows: &[Vec<Bucket>]) -> Vec<Bucket> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let width = first.len();
    let mut out = vec![Bucket::ZERO; width];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut max = -1.0_f32;
        let mut min = 1.0_f32;
        let mut rms_sum = 0.0_f32;
        let mut counted = 0usize;
        for row in rows {
            let Some(bucket) = row.get(i) else { continue };
            max = max.max(bucket.max);
            min = min.min(bucket.min);
            rms_sum += bucket.rms;
            counted += 1;
        }
        if counted == 0 {
            continue;
        }
        *slot = Bucket {
            max,
            min,
            rms: rms_sum / counted as f32,
        };
    }
    out
}

struct ChannelAccum {
    max: f32,
    min: f32,
    sum_squares: f64,
    samples: u64,
}

impl ChannelAccum {
    fn reset(&mut self) {
        self.max = -1.0;
        self.min = 1.0;
        self.sum_squares = 0.0;
        self.samples = 0;
    }

    fn push(&mut self, sample: f32) {
        let sample = sample.clamp(-1.0, 1.0);
        self.max = self.max.max(sample);
        self.min = self.min.min(sample);
        self.sum_squares += f64::from(sample) * f64::from(sample);
        self.samples += 1;
    }

    fn finish(&self) -> Bucket {
        if self.samples == 0 {
            return Bucket::ZERO;
        }
        Bucket {
            max: self.max,
            min: self.min,
            rms: (self.sum_squares / self.samples as f64).sqrt() as f32,
        }
    }
}

/// Frames per provisional bucket when the total frame count is unknown.
const UNKNOWN_RUN_FRAMES: u64 = 4096;

/// Fold-mode reducer used while streaming raw frames out of a decoder.
///
/// Frames extend the current bucket's running max/min/sum-of-squares; the
/// bucket is sealed only when the drift-corrected boundary is crossed, so the
/// per-bucket run lengths sum to the total frame count exactly. When the
/// total is unknown, frames are staged into fixed-size provisional buckets
/// that are reduced to the target count at the end instead.
pub struct SummaryBuilder {
    channels: usize,
    bucket_count: usize,
    total_frames: u64,
    frames_per_bucket: f64,
    frames_seen: u64,
    sealed: usize,
    acc: Vec<ChannelAccum>,
    summary: Summary,
    /// Per-channel provisional buckets, used only when the total is unknown.
    staged: Vec<Vec<Bucket>>,
}

impl SummaryBuilder {
    /// Start a builder expecting `total_frames` interleaved frames; 0 means
    /// the length is unknown (headerless streams).
    pub fn new(channels: u16, bucket_count: usize, total_frames: u64) -> Self {
        let channels_usize = channels.max(1) as usize;
        let mut acc = Vec::with_capacity(channels_usize);
        for _ in 0..channels_usize {
            let mut slot = ChannelAccum {
                max: -1.0,
                min: 1.0,
                sum_squares: 0.0,
                samples: 0,
            };
            slot.reset();
            acc.push(slot);
        }
        Self {
            channels: channels_usize,
            bucket_count,
            total_frames,
            frames_per_bucket: total_frames as f64 / bucket_count.max(1) as f64,
            frames_seen: 0,
            sealed: 0,
            acc,
            summary: Summary::new(channels.max(1), bucket_count),
            staged: vec![Vec::new(); channels_usize],
        }
    }

    fn boundary(&self, bucket: usize) -> u64 {
        if bucket >= self.bucket_count {
            self.total_frames
        } else {
            (bucket as f64 * self.frames_per_bucket).floor() as u64
        }
    }

    /// Frames consumed so far.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Buckets sealed (or staged, for unknown totals) so far.
    pub fn buckets_sealed(&self) -> usize {
        if self.total_frames == 0 {
            self.staged.first().map(Vec::len).unwrap_or(0)
        } else {
            self.sealed
        }
    }

    /// Fold a chunk of interleaved samples into the summary.
    ///
    /// A trailing partial frame (short read mid-frame) is ignored.
    pub fn push_frames(&mut self, interleaved: &[f32]) {
        if self.total_frames == 0 {
            self.push_unknown(interleaved);
            return;
        }
        for frame in interleaved.chunks_exact(self.channels) {
            if self.sealed >= self.bucket_count && self.frames_seen >= self.total_frames {
                // Decoder delivered more frames than the duration promised;
                // they cannot move any boundary, so drop them.
                return;
            }
            for (channel, &sample) in frame.iter().enumerate() {
                self.acc[channel].push(sample);
            }
            self.frames_seen += 1;
            while self.sealed < self.bucket_count && self.frames_seen >= self.boundary(self.sealed + 1)
            {
                self.seal_bucket();
            }
        }
    }

    fn push_unknown(&mut self, interleaved: &[f32]) {
        for frame in interleaved.chunks_exact(self.channels) {
            for (channel, &sample) in frame.iter().enumerate() {
                self.acc[channel].push(sample);
            }
            self.frames_seen += 1;
            if self.frames_seen % UNKNOWN_RUN_FRAMES == 0 {
                self.stage_bucket();
            }
        }
    }

    fn stage_bucket(&mut self) {
        for channel in 0..self.channels {
            self.staged[channel].push(self.acc[channel].finish());
            self.acc[channel].reset();
        }
    }

    fn seal_bucket(&mut self) {
        let index = self.sealed;
        for channel in 0..self.channels {
            // An empty run repeats the previous bucket instead of sealing
            // silence.
            let bucket = if self.acc[channel].samples == 0 && index > 0 {
                self.summary.bucket(channel, index - 1)
            } else {
                self.acc[channel].finish()
            };
            if let Some(slot) = self.summary.bucket_mut(channel, index) {
                *slot = bucket;
            }
            self.acc[channel].reset();
        }
        self.sealed += 1;
    }

    fn reduce_staged(&self) -> Summary {
        let mut summary = Summary::new(self.channels as u16, self.bucket_count);
        if self.staged.iter().all(Vec::is_empty) {
            return summary;
        }
        for channel in 0..self.channels {
            let reduced = reduce_buckets(&self.staged[channel], self.bucket_count);
            for (index, bucket) in reduced.into_iter().enumerate() {
                if let Some(slot) = summary.bucket_mut(channel, index) {
                    *slot = bucket;
                }
            }
        }
        summary
    }

    /// Snapshot of the summary built so far. With a known total, unsealed
    /// buckets are zero; with an unknown one, the staged buckets are
    /// stretched to the full width.
    pub fn partial(&self) -> Summary {
        if self.total_frames == 0 {
            return self.reduce_staged();
        }
        self.summary.clone()
    }

    /// Seal any in-progress bucket and pad the unfilled tail.
    ///
    /// A short read from the decoder is normal end-of-stream, so the tail is
    /// filled by repeating the last sealed bucket rather than erroring.
    pub fn finish(mut self) -> Summary {
        if self.total_frames == 0 {
            if self.acc.iter().any(|acc| acc.samples > 0) {
                self.stage_bucket();
            }
            return self.reduce_staged();
        }
        if self.acc.iter().any(|acc| acc.samples > 0) && self.sealed < self.bucket_count {
            self.seal_bucket();
        }
        if self.sealed > 0 {
            for index in self.sealed..self.bucket_count {
                for channel in 0..self.channels {
                    let last = self.summary.bucket(channel, self.sealed - 1);
                    if let Some(slot) = self.summary.bucket_mut(channel, index) {
                        *slot = last;
                    }
                }
            }
        }
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_partition_input_exactly() {
        for n_in in [1usize, 2, 7, 300, 2048, 441_000] {
            for n_out in [1usize, 2, 3, 64, 300, 2048] {
                if n_out > n_in {
                    continue;
                }
                let bounds = run_bounds(n_in, n_out);
                assert_eq!(bounds.len(), n_out);
                assert_eq!(bounds[0].0, 0);
                assert_eq!(bounds[n_out - 1].1, n_in);
                let mut covered = 0usize;
                let mut cursor = 0usize;
                let nominal = n_in as f64 / n_out as f64;
                for (start, end) in bounds {
                    assert_eq!(start, cursor, "runs must be contiguous");
                    assert!(end >= start);
                    let len = end - start;
                    assert!(
                        (len as f64 - nominal).abs() <= 1.0,
                        "run length {len} drifts from nominal {nominal}"
                    );
                    covered += len;
                    cursor = end;
                }
                assert_eq!(covered, n_in);
            }
        }
    }

    #[test]
    fn bounds_for_2048_to_300_use_runs_of_6_or_7() {
        let bounds = run_bounds(2048, 300);
        let mut total = 0usize;
        for (start, end) in bounds {
            let len = end - start;
            assert!(len == 6 || len == 7, "unexpected run length {len}");
            total += len;
        }
        assert_eq!(total, 2048);
    }

    #[test]
    fn reduce_to_same_width_is_identity() {
        let src: Vec<Bucket> = (0..32)
            .map(|i| Bucket {
                max: i as f32 / 32.0,
                min: -(i as f32) / 64.0,
                rms: i as f32 / 100.0,
            })
            .collect();
        let out = reduce_buckets(&src, src.len());
        assert_eq!(out, src);
    }

    #[test]
    fn reduce_merges_extrema_and_averages_rms() {
        let src = vec![
            Bucket {
                max: 0.5,
                min: -0.1,
                rms: 0.2,
            },
            Bucket {
                max: 0.3,
                min: -0.8,
                rms: 0.4,
            },
        ];
        let out = reduce_buckets(&src, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].max, 0.5);
        assert_eq!(out[0].min, -0.8);
        assert!((out[0].rms - 0.3).abs() < 1e-6);
    }

    #[test]
    fn reduce_tiny_input_repeats_previous_bucket() {
        let src = vec![Bucket {
            max: 0.7,
            min: -0.7,
            rms: 0.5,
        }];
        let out = reduce_buckets(&src, 4);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], src[0]);
        // Later empty runs repeat the last materialized bucket.
        assert!(out[1..].iter().all(|b| *b == src[0]));
    }

    #[test]
    fn merge_channels_takes_extrema_and_mean_rms() {
        let left = vec![Bucket {
            max: 0.9,
            min: -0.2,
            rms: 0.6,
        }];
        let right = vec![Bucket {
            max: 0.1,
            min: -0.9,
            rms: 0.2,
        }];
        let mono = merge_channels(&[left, right]);
        assert_eq!(mono.len(), 1);
        assert_eq!(mono[0].max, 0.9);
        assert_eq!(mono[0].min, -0.9);
        assert!((mono[0].rms - 0.4).abs() < 1e-6);
    }

    #[test]
    fn builder_consumes_exact_frame_count() {
        // 10 s stereo at 44100 Hz into 2048 buckets.
        let total_frames = 10 * 44_100_u64;
        let mut builder = SummaryBuilder::new(2, 2048, total_frames);
        let chunk = vec![0.25_f32; 2 * 441];
        let mut pushed = 0u64;
        while pushed < total_frames {
            let frames = 441.min(total_frames - pushed) as usize;
            builder.push_frames(&chunk[..frames * 2]);
            pushed += frames as u64;
        }
        assert_eq!(builder.frames_seen(), total_frames);
        assert_eq!(builder.buckets_sealed(), 2048);
        let summary = builder.finish();
        assert_eq!(summary.bucket_count(), 2048);
        for i in 0..2048 {
            let bucket = summary.bucket(0, i);
            assert!((bucket.max - 0.25).abs() < 1e-6);
            assert!((bucket.rms - 0.25).abs() < 1e-4);
        }
    }

    #[test]
    fn builder_run_lengths_sum_to_total() {
        let total_frames = 441_000_u64;
        let bounds = run_bounds(total_frames as usize, 2048);
        let sum: usize = bounds.iter().map(|(s, e)| e - s).sum();
        assert_eq!(sum as u64, total_frames);
    }

    #[test]
    fn builder_pads_tail_on_short_read() {
        let mut builder = SummaryBuilder::new(1, 8, 800);
        builder.push_frames(&vec![0.5_f32; 400]);
        let summary = builder.finish();
        // Half the stream arrived: sealed buckets carry signal and the tail
        // repeats the last sealed bucket instead of staying zero.
        let last = summary.bucket(0, 7);
        assert!((last.max - 0.5).abs() < 1e-6);
    }

    #[test]
    fn builder_with_unknown_total_keeps_every_frame() {
        // A headerless stream reports no length; frames must accumulate
        // instead of being dropped after the first one.
        let mut builder = SummaryBuilder::new(1, 64, 0);
        let chunk = vec![0.5_f32; 500];
        let mut pushed = 0usize;
        while pushed < 8_000 {
            builder.push_frames(&chunk);
            pushed += 500;
        }
        assert_eq!(builder.frames_seen(), 8_000);
        let summary = builder.finish();
        assert_eq!(summary.bucket_count(), 64);
        for i in 0..64 {
            let bucket = summary.bucket(0, i);
            assert!(
                (bucket.max - 0.5).abs() < 1e-6,
                "bucket {i} lost its signal: max = {}",
                bucket.max
            );
        }
    }

    #[test]
    fn builder_repeats_previous_bucket_for_mid_stream_empty_runs() {
        // Fewer frames than buckets: most boundary crossings seal empty runs,
        // which must repeat the previous bucket rather than insert silence.
        let mut builder = SummaryBuilder::new(1, 8, 4);
        builder.push_frames(&[0.8, -0.4, 0.6, 0.2]);
        let summary = builder.finish();
        let first = summary.bucket(0, 0);
        assert!((first.max - 0.8).abs() < 1e-6);
        assert_eq!(summary.bucket(0, 1), first);
        assert_ne!(summary.bucket(0, 1), Bucket::ZERO);
    }

    #[test]
    fn builder_handles_empty_stream() {
        let builder = SummaryBuilder::new(2, 8, 0);
        let summary = builder.finish();
        assert_eq!(summary.bucket_count(), 8);
        assert!(
            (0..8).all(|i| summary.bucket(0, i) == Bucket::ZERO),
            "empty stream must stay zeroed"
        );
    }
}
