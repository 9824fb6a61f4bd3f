//! The context object binding store, dedup queue, shared buffer, and
//! configuration.
//!
//! One engine per widget instance; construction and teardown follow the
//! widget's lifetime, and everything a session needs is passed explicitly
//! instead of living in globals.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::EngineConfig;
use crate::dedup::DedupQueue;
use crate::display::DisplaySummary;
use crate::session::{DecodeSession, PcmSource};
use crate::shared::SharedSummary;
use crate::store::{CachePolicy, SummaryStore};
use crate::track::TrackKey;
use crate::{app_dirs, summary::Summary};

/// Outcome of a track-started notification.
pub enum TrackStart {
    /// The stored summary was copied straight into the shared buffer.
    CacheHit,
    /// A background decode session was spawned.
    Decoding(JoinHandle<()>),
    /// A session for this key is already in flight; the request was dropped.
    AlreadyInFlight,
    /// The session thread could not be spawned.
    SpawnFailed,
}

/// Waveform summary engine: admits decode sessions, serves display
/// snapshots, and owns the persistent cache.
pub struct WaveformEngine {
    config: EngineConfig,
    store: Arc<SummaryStore>,
    dedup: Arc<DedupQueue>,
    shared: SharedSummary,
}

impl WaveformEngine {
    /// Engine backed by the platform cache directory.
    pub fn new(config: EngineConfig) -> Self {
        let store = match app_dirs::cache_dir() {
            Ok(dir) => SummaryStore::open(&dir),
            Err(err) => {
                tracing::warn!("Summary cache disabled: {err}");
                SummaryStore::disabled()
            }
        };
        Self::with_store(config, store)
    }

    /// Engine with the cache rooted at an explicit directory.
    pub fn with_store_dir(config: EngineConfig, dir: &Path) -> Self {
        Self::with_store(config, SummaryStore::open(dir))
    }

    fn with_store(config: EngineConfig, store: SummaryStore) -> Self {
        Self {
            config,
            store: Arc::new(store),
            dedup: Arc::new(DedupQueue::new()),
            shared: SharedSummary::new(),
        }
    }

    /// The engine's configuration snapshot.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle to the shared summary slot, for renderers that poll directly.
    pub fn shared(&self) -> &SharedSummary {
        &self.shared
    }

    /// The persistent store (mainly for tests and maintenance tooling).
    pub fn store(&self) -> &SummaryStore {
        &self.store
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy {
            max_cached_duration_seconds: self.config.max_cached_duration_seconds,
        }
    }

    /// React to the host's track-started notification.
    ///
    /// On a cache hit the stored summary lands in the shared buffer without
    /// touching the decoder. Otherwise a decode session is admitted through
    /// the dedup queue and spawned on its own named thread; a duplicate
    /// request for a key already in flight is dropped.
    pub fn on_track_started<S>(&self, key: TrackKey, source: S) -> TrackStart
    where
        S: PcmSource + 'static,
    {
        let duration = source.spec().duration_seconds;

        if self.policy().allows(&key, duration) {
            if let Some(cached) = self.store.get(&key) {
                tracing::debug!("Cache hit for {key}");
                let token = self.shared.begin_track(&key);
                self.shared.publish(&token, cached);
                return TrackStart::CacheHit;
            }
        }

        // Claim the key before touching the shared slot: a dropped duplicate
        // must leave the in-flight session's token current so its result
        // still lands.
        let Some(guard) = self.dedup.admit(&key) else {
            return TrackStart::AlreadyInFlight;
        };
        let token = self.shared.begin_track(&key);

        let session = DecodeSession::new(
            key.clone(),
            token,
            self.shared.clone(),
            Arc::clone(&self.store),
            self.policy(),
            self.config.bucket_count,
        );
        let spawned = std::thread::Builder::new()
            .name("waveform-decode".to_string())
            .spawn(move || {
                let _guard = guard;
                if let Err(err) = session.run(source) {
                    tracing::warn!("Decode session for {key} failed: {err}");
                }
            });
        match spawned {
            Ok(handle) => TrackStart::Decoding(handle),
            Err(err) => {
                tracing::warn!("Failed to spawn decode thread: {err}");
                TrackStart::SpawnFailed
            }
        }
    }

    /// React to track-stopped: clear the shared buffer and invalidate any
    /// in-flight session's publishes.
    pub fn on_track_stopped(&self) {
        self.shared.clear();
    }

    /// Display-resolution snapshot of the current summary, honoring the
    /// configured mono downmix.
    pub fn snapshot_for_width(&self, target_width: usize) -> Option<DisplaySummary> {
        self.shared
            .snapshot_for_width(target_width, self.config.mix_to_mono)
    }

    /// Current storage-resolution summary, if one is published.
    pub fn current_summary(&self) -> Option<Summary> {
        self.shared.current_summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{DecodeError, SourceSpec};
    use std::sync::mpsc;
    use tempfile::tempdir;

    struct SilentSource {
        spec: SourceSpec,
        remaining: u64,
    }

    impl SilentSource {
        fn new(duration_seconds: f64) -> Self {
            let spec = SourceSpec {
                sample_rate: 8_000,
                channels: 1,
                duration_seconds,
            };
            Self {
                remaining: spec.total_frames(),
                spec,
            }
        }
    }

    impl PcmSource for SilentSource {
        fn spec(&self) -> SourceSpec {
            self.spec
        }

        fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError> {
            let frames = out.len().min(self.remaining as usize);
            out[..frames].fill(0.0);
            self.remaining -= frames as u64;
            Ok(frames)
        }
    }

    /// Source that blocks until the test releases it, to hold a session in
    /// flight deterministically.
    struct GatedSource {
        inner: SilentSource,
        gate: mpsc::Receiver<()>,
        waited: bool,
    }

    impl PcmSource for GatedSource {
        fn spec(&self) -> SourceSpec {
            self.inner.spec()
        }

        fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError> {
            if !self.waited {
                let _ = self.gate.recv();
                self.waited = true;
            }
            self.inner.read(out)
        }
    }

    fn engine_in(dir: &Path) -> WaveformEngine {
        WaveformEngine::with_store_dir(
            EngineConfig {
                bucket_count: 128,
                ..EngineConfig::default()
            },
            dir,
        )
    }

    #[test]
    fn decode_then_replay_hits_the_cache() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        let key = TrackKey::new("/music/a.flac");

        let started = engine.on_track_started(key.clone(), SilentSource::new(1.0));
        let TrackStart::Decoding(handle) = started else {
            panic!("first play must decode");
        };
        handle.join().unwrap();
        assert!(engine.store().exists(&key));

        let replay = engine.on_track_started(key, SilentSource::new(1.0));
        assert!(matches!(replay, TrackStart::CacheHit));
        assert!(engine.current_summary().is_some());
    }

    #[test]
    fn duplicate_request_for_in_flight_key_is_dropped() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        let key = TrackKey::new("/music/slow.flac");
        let (release, gate) = mpsc::channel();
        let gated = GatedSource {
            inner: SilentSource::new(1.0),
            gate,
            waited: false,
        };

        let TrackStart::Decoding(handle) = engine.on_track_started(key.clone(), gated) else {
            panic!("first request must decode");
        };
        let duplicate = engine.on_track_started(key.clone(), SilentSource::new(1.0));
        assert!(matches!(duplicate, TrackStart::AlreadyInFlight));

        release.send(()).unwrap();
        handle.join().unwrap();
        // The dropped duplicate must not have staled the in-flight session:
        // its summary still lands in the shared buffer and in the cache.
        assert!(engine.current_summary().is_some());
        assert!(engine.store().exists(&key));
        // The key is released once the session ends.
        let again = engine.on_track_started(key, SilentSource::new(1.0));
        assert!(matches!(again, TrackStart::CacheHit));
    }

    #[test]
    fn track_stopped_clears_the_shared_buffer() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        let key = TrackKey::new("/music/a.flac");
        let TrackStart::Decoding(handle) =
            engine.on_track_started(key, SilentSource::new(0.5))
        else {
            panic!("must decode");
        };
        handle.join().unwrap();
        assert!(engine.current_summary().is_some());
        engine.on_track_stopped();
        assert!(engine.current_summary().is_none());
        assert!(engine.snapshot_for_width(100).is_none());
    }
}
