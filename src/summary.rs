//! Amplitude summary data model.
//!
//! A [`Summary`] holds a fixed number of [`Bucket`] aggregates per channel at
//! storage resolution. Buckets are stored interleaved by bucket index so the
//! blob layout matches the persisted cache record: the triple for channel `c`
//! at bucket `i` lives at flat index `i * channels + c`.

/// Number of buckets stored per channel at decode time.
pub const DEFAULT_BUCKET_COUNT: usize = 2048;

/// Scalar values per bucket: max, min, rms.
pub(crate) const VALUES_PER_BUCKET: usize = 3;

/// Encoded size of one bucket in the cache blob (three little-endian f32s).
pub(crate) const BYTES_PER_BUCKET: usize = VALUES_PER_BUCKET * 4;

/// One (max, min, rms) aggregate over a contiguous run of input frames.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bucket {
    /// Largest sample in the run, in `[-1.0, 1.0]`.
    pub max: f32,
    /// Smallest sample in the run, in `[-1.0, 1.0]`.
    pub min: f32,
    /// Root-mean-square of the run, non-negative.
    pub rms: f32,
}

impl Bucket {
    /// The all-zero bucket used for silence and unfilled tails.
    pub const ZERO: Bucket = Bucket {
        max: 0.0,
        min: 0.0,
        rms: 0.0,
    };
}

/// Fixed-size amplitude summary of one track.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    channels: u16,
    bucket_count: usize,
    buckets: Vec<Bucket>,
}

impl Summary {
    /// Create a zero-filled summary for `channels` channels.
    pub fn new(channels: u16, bucket_count: usize) -> Self {
        let bucket_count = if channels == 0 { 0 } else { bucket_count };
        Self {
            channels,
            bucket_count,
            buckets: vec![Bucket::ZERO; bucket_count * channels as usize],
        }
    }

    /// Number of audio channels represented.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of buckets stored per channel.
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Whether this summary holds no buckets at all.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Bucket for `channel` at `index`. Returns [`Bucket::ZERO`] out of range.
    pub fn bucket(&self, channel: usize, index: usize) -> Bucket {
        let channels = self.channels.max(1) as usize;
        if channel >= channels || index >= self.bucket_count {
            return Bucket::ZERO;
        }
        self.buckets
            .get(index * channels + channel)
            .copied()
            .unwrap_or(Bucket::ZERO)
    }

    pub(crate) fn bucket_mut(&mut self, channel: usize, index: usize) -> Option<&mut Bucket> {
        let channels = self.channels.max(1) as usize;
        if channel >= channels || index >= self.bucket_count {
            return None;
        }
        self.buckets.get_mut(index * channels + channel)
    }

    /// All buckets for one channel, in bucket order.
    pub fn channel_buckets(&self, channel: usize) -> Vec<Bucket> {
        let channels = self.channels.max(1) as usize;
        if channel >= channels {
            return Vec::new();
        }
        self.buckets
            .iter()
            .skip(channel)
            .step_by(channels)
            .copied()
            .collect()
    }

    /// Encode into the fixed-width cache blob (little-endian f32 triples).
    pub fn to_blob(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.buckets.len() * BYTES_PER_BUCKET);
        for bucket in &self.buckets {
            out.extend_from_slice(&bucket.max.to_le_bytes());
            out.extend_from_slice(&bucket.min.to_le_bytes());
            out.extend_from_slice(&bucket.rms.to_le_bytes());
        }
        out
    }

    /// Decode a cache blob back into a summary.
    ///
    /// The blob length alone determines the bucket count. A trailing partial
    /// triple (corrupt record) is dropped; decoding never reads past the
    /// stored length.
    pub fn from_blob(channels: u16, data: &[u8]) -> Self {
        if channels == 0 {
            return Self::new(0, 0);
        }
        let stride = channels as usize * BYTES_PER_BUCKET;
        let bucket_count = data.len() / stride;
        let mut summary = Self::new(channels, bucket_count);
        let mut values = data
            .chunks_exact(4)
            .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]));
        for bucket in summary.buckets.iter_mut() {
            let (Some(max), Some(min), Some(rms)) = (values.next(), values.next(), values.next())
            else {
                break;
            };
            *bucket = Bucket { max, min, rms };
        }
        summary
    }

    /// Copy bucket values into `out` as flat (max, min, rms) floats.
    ///
    /// Copies only as many whole values as fit and returns the number of
    /// floats written; the caller's buffer is never overrun.
    pub fn write_values(&self, out: &mut [f32]) -> usize {
        let mut written = 0;
        'outer: for bucket in &self.buckets {
            for value in [bucket.max, bucket.min, bucket.rms] {
                let Some(slot) = out.get_mut(written) else {
                    break 'outer;
                };
                *slot = value;
                written += 1;
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_summary(channels: u16, bucket_count: usize) -> Summary {
        let mut summary = Summary::new(channels, bucket_count);
        for i in 0..bucket_count {
            for c in 0..channels as usize {
                *summary.bucket_mut(c, i).unwrap() = Bucket {
                    max: i as f32 / bucket_count as f32,
                    min: -(i as f32) / bucket_count as f32,
                    rms: (c + 1) as f32 * 0.01,
                };
            }
        }
        summary
    }

    #[test]
    fn blob_round_trip_preserves_buckets() {
        let summary = ramp_summary(2, 16);
        let blob = summary.to_blob();
        assert_eq!(blob.len(), 16 * 2 * BYTES_PER_BUCKET);
        let restored = Summary::from_blob(2, &blob);
        assert_eq!(restored, summary);
    }

    #[test]
    fn from_blob_truncates_partial_trailing_triple() {
        let summary = ramp_summary(1, 4);
        let mut blob = summary.to_blob();
        blob.truncate(blob.len() - 5);
        let restored = Summary::from_blob(1, &blob);
        assert_eq!(restored.bucket_count(), 3);
        for i in 0..3 {
            assert_eq!(restored.bucket(0, i), summary.bucket(0, i));
        }
    }

    #[test]
    fn from_blob_with_zero_channels_is_empty() {
        let restored = Summary::from_blob(0, &[0u8; 24]);
        assert!(restored.is_empty());
        assert_eq!(restored.bucket_count(), 0);
    }

    #[test]
    fn write_values_never_overruns_small_buffers() {
        let summary = ramp_summary(2, 8);
        for capacity in 0..summary.to_blob().len() / 4 + 8 {
            let mut out = vec![0.0_f32; capacity];
            let written = summary.write_values(&mut out);
            assert!(written <= capacity);
            assert_eq!(written, capacity.min(8 * 2 * VALUES_PER_BUCKET));
        }
    }

    #[test]
    fn out_of_range_bucket_reads_zero() {
        let summary = ramp_summary(2, 4);
        assert_eq!(summary.bucket(5, 0), Bucket::ZERO);
        assert_eq!(summary.bucket(0, 99), Bucket::ZERO);
    }
}
