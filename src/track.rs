//! Stable track identity used to key the summary cache.

use std::fmt;

/// Identity of one logical track: its source URI plus, for compound-file
/// formats, the sub-track index inside that file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey {
    uri: String,
    subsong: Option<u32>,
}

impl TrackKey {
    /// Key for a plain single-track source.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            subsong: None,
        }
    }

    /// Key for one sub-track inside a compound file (cue sheet, SID, ...).
    pub fn with_subsong(uri: impl Into<String>, subsong: u32) -> Self {
        Self {
            uri: uri.into(),
            subsong: Some(subsong),
        }
    }

    /// The source URI as given.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Serialized cache key. Distinct sub-tracks of one physical file must
    /// not collide, so the subsong index becomes part of the text.
    pub fn cache_key(&self) -> String {
        match self.subsong {
            Some(index) => format!("{}#{index}", self.uri),
            None => self.uri.clone(),
        }
    }

    /// Whether the source is a local file (plain path or `file://`).
    ///
    /// Streamed sources are never cached, so everything with a non-file
    /// scheme counts as remote.
    pub fn is_local(&self) -> bool {
        match self.uri.split_once("://") {
            Some((scheme, _)) => scheme.eq_ignore_ascii_case("file"),
            None => true,
        }
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}
