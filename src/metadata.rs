//! Opaque song metadata and lyrics capabilities
//!
//! Tag readers and lyrics files live outside the synchronized core; the
//! coordinator only needs "given a song identifier, return whatever metadata
//! and lyrics exist". Providers that know nothing return empty values.

use serde::{Deserialize, Serialize};

/// Descriptive tags of a song. Fields the provider cannot determine stay
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
}

/// One timed caption fragment, offset in nanoseconds from the start of the
/// song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricsAtom {
    pub timestamp: i64,
    pub caption: String,
}

/// One displayed line of lyrics, as a sequence of timed atoms
pub type LyricsLine = Vec<LyricsAtom>;

pub trait MetadataProvider: Send + Sync {
    fn collect_metadata(&self, song: &str) -> SongMetadata;
}

pub trait LyricsProvider: Send + Sync {
    fn collect_lyrics(&self, song: &str) -> Vec<LyricsLine>;
}

/// Provider that knows nothing about any song
pub struct EmptyProvider;

impl MetadataProvider for EmptyProvider {
    fn collect_metadata(&self, _song: &str) -> SongMetadata {
        SongMetadata::default()
    }
}

impl LyricsProvider for EmptyProvider {
    fn collect_lyrics(&self, _song: &str) -> Vec<LyricsLine> {
        Vec::new()
    }
}
