//! Bucketed waveform summaries: decode a track once, keep a compact
//! (max, min, rms) amplitude summary per channel, cache it in SQLite, and
//! re-bucket it to pixel resolution whenever the display needs it.

/// Platform directory helpers anchored to a single `.waveline` folder.
pub mod app_dirs;
/// Engine configuration loaded from `waveline.toml`.
pub mod config;
/// Redraw tick and resize debounce helpers.
pub mod debounce;
/// Symphonia-backed `PcmSource` implementation.
pub mod decoder;
/// At-most-one-session-per-track admission queue.
pub mod dedup;
/// Display-resolution summary snapshots.
pub mod display;
/// Context object binding store, dedup queue, and shared buffer.
pub mod engine;
/// Tracing subscriber setup.
pub mod logging;
/// Drift-corrected bucket reduction.
pub mod reducer;
/// Background decode session driving a `PcmSource`.
pub mod session;
/// Mutex-guarded slot holding the current track's summary.
pub mod shared;
/// SQLite-backed summary persistence.
pub mod store;
/// Summary and bucket data model.
pub mod summary;
/// Stable track identity used as the cache key.
pub mod track;

pub use config::EngineConfig;
pub use decoder::SymphoniaSource;
pub use display::DisplaySummary;
pub use engine::{TrackStart, WaveformEngine};
pub use session::{DecodeError, PcmSource, SourceSpec};
pub use store::SummaryStore;
pub use summary::{Bucket, Summary};
pub use track::TrackKey;
