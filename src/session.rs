//! Background decode session: streams PCM out of a decoder, folds it into a
//! storage-resolution summary, and publishes partial snapshots along the way.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::reducer::SummaryBuilder;
use crate::shared::{SessionToken, SharedSummary};
use crate::store::{CachePolicy, SummaryStore};
use crate::summary::Summary;
use crate::track::TrackKey;

/// How many buckets between partial publications: roughly 64 visible updates
/// over a full track, independent of duration.
const PUBLISH_DIVISOR: usize = 64;

/// Upper bound on frames pulled per decoder read.
const MAX_CHUNK_FRAMES: usize = 65_536;

/// Frames per read when the stream length is unknown.
const UNKNOWN_CHUNK_FRAMES: usize = 4_096;

/// Errors surfaced by decoders and decode sessions. All are non-fatal to the
/// host: the worst outcome is an empty or briefly outdated waveform.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decoder could not open the underlying media.
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The decoder opened but could not initialize a usable audio stream.
    #[error("Unsupported audio stream: {message}")]
    Init { message: String },
    /// A read failed mid-stream. Treated as implicit end-of-stream.
    #[error("Decode read failed: {message}")]
    Read { message: String },
}

/// Stream parameters reported by a decoder before any frames are read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceSpec {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Total duration in seconds; 0.0 when the container does not report one.
    pub duration_seconds: f64,
}

impl SourceSpec {
    /// Expected frame count per channel, rounded; 0 when unknown.
    pub fn total_frames(&self) -> u64 {
        (self.duration_seconds * f64::from(self.sample_rate)).round() as u64
    }
}

/// The external-decoder seam: anything that can stream interleaved f32
/// frames. Sample-format conversion happens behind this trait.
pub trait PcmSource: Send {
    /// Stream parameters; stable for the lifetime of the source.
    fn spec(&self) -> SourceSpec;

    /// Fill `out` with up to `out.len() / channels` interleaved frames.
    /// Returns the number of whole frames written; 0 means end-of-stream.
    fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError>;
}

/// One ephemeral decode pass over a track, owned by a single background
/// thread.
pub struct DecodeSession {
    key: TrackKey,
    token: SessionToken,
    shared: SharedSummary,
    store: Arc<SummaryStore>,
    policy: CachePolicy,
    bucket_count: usize,
}

impl DecodeSession {
    /// Build a session that publishes through `token` into `shared`.
    pub fn new(
        key: TrackKey,
        token: SessionToken,
        shared: SharedSummary,
        store: Arc<SummaryStore>,
        policy: CachePolicy,
        bucket_count: usize,
    ) -> Self {
        Self {
            key,
            token,
            shared,
            store,
            policy,
            bucket_count,
        }
    }

    /// Drive `source` to end-of-stream, publishing partial summaries as
    /// buckets fill and caching the final result.
    ///
    /// Publication and the final cache write are both gated on the session
    /// token still being current; a superseded session keeps decoding but its
    /// output is discarded. Read errors mid-stream are treated as a normal
    /// end-of-stream.
    pub fn run<S: PcmSource>(self, mut source: S) -> Result<Summary, DecodeError> {
        let spec = source.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(DecodeError::Init {
                message: format!(
                    "{} channels at {} Hz",
                    spec.channels, spec.sample_rate
                ),
            });
        }
        let total_frames = spec.total_frames();
        let mut builder = SummaryBuilder::new(spec.channels, self.bucket_count, total_frames);

        let channels = spec.channels as usize;
        let chunk_frames = if total_frames == 0 {
            UNKNOWN_CHUNK_FRAMES
        } else {
            (total_frames / self.bucket_count.max(1) as u64)
                .clamp(1, MAX_CHUNK_FRAMES as u64) as usize
        };
        let mut chunk = vec![0.0_f32; chunk_frames * channels];
        let publish_every = (self.bucket_count / PUBLISH_DIVISOR).max(1);
        let mut published_at = 0usize;
        let mut current = true;

        loop {
            let frames = match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(frames) => frames,
                Err(err) => {
                    // Short reads and mid-stream failures end the track early
                    // rather than erroring; the sealed buckets stand.
                    tracing::warn!("Decode for {} ended early: {err}", self.key);
                    break;
                }
            };
            builder.push_frames(&chunk[..frames * channels]);

            if current && builder.buckets_sealed() >= published_at + publish_every {
                published_at = builder.buckets_sealed();
                current = self.shared.publish(&self.token, builder.partial());
                if !current {
                    tracing::debug!("Session for {} superseded, muting publishes", self.key);
                }
            }
        }

        let frames_seen = builder.frames_seen();
        let summary = builder.finish();
        if current {
            current = self.shared.publish(&self.token, summary.clone());
        }
        tracing::debug!(
            "Decoded {} frames into {} buckets for {}",
            frames_seen,
            summary.bucket_count(),
            self.key
        );

        // The final cache write is also gated on currency: a session that was
        // superseded mid-decode must not persist a summary the user already
        // navigated away from.
        if current && self.policy.allows(&self.key, spec.duration_seconds) {
            self.store.put(&self.key, &summary);
        }
        Ok(summary)
    }
}
