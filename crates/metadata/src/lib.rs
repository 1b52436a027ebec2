use std::path::Path;
use std::sync::Arc;

use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use tracing::debug;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TagInfo {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub duration_secs: Option<u32>,
    pub bitrate_kbps: Option<u32>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut info = TagInfo::default();

    let duration_secs = properties.duration().as_secs();
    if duration_secs > 0 {
        info.duration_secs = Some(duration_secs.min(u64::from(u32::MAX)) as u32);
    }
    info.bitrate_kbps = properties
        .audio_bitrate()
        .or(properties.overall_bitrate())
        .filter(|kbps| *kbps > 0);

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = tag.get_string(&ItemKey::TrackTitle).and_then(clean);
        let track_artist = tag.get_string(&ItemKey::TrackArtist).and_then(clean);
        let album_artist = tag.get_string(&ItemKey::AlbumArtist).and_then(clean);
        info.artist = track_artist.or(album_artist);
    }

    Ok(info)
}

fn clean(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Source of embedded tag data for a file.
///
/// Implementations must not fail: anything unreadable is reported as `None`
/// and the caller keeps the identity it parsed from the filename.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Option<TagInfo>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyReader;

impl MetadataReader for LoftyReader {
    fn read(&self, path: &Path) -> Option<TagInfo> {
        match read_tags(path) {
            Ok(info) => Some(info),
            Err(err) => {
                debug!("No metadata for {:?}: {}", path, err);
                None
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataReader for NoMetadata {
    fn read(&self, _path: &Path) -> Option<TagInfo> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBackend {
    Lofty,
    Disabled,
}

impl MetadataBackend {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            MetadataBackend::Lofty
        } else {
            MetadataBackend::Disabled
        }
    }

    pub fn reader(self) -> Arc<dyn MetadataReader> {
        match self {
            MetadataBackend::Lofty => Arc::new(LoftyReader),
            MetadataBackend::Disabled => Arc::new(NoMetadata),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn unreadable_file_yields_no_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.flac");
        fs::write(&path, b"definitely not a flac stream").unwrap();
        assert!(read_tags(&path).is_err());
        assert!(LoftyReader.read(&path).is_none());
    }

    #[test]
    fn missing_file_yields_no_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.flac");
        assert!(read_tags(&path).is_err());
        assert!(LoftyReader.read(&path).is_none());
    }

    #[test]
    fn disabled_backend_never_reads() {
        let reader = MetadataBackend::from_enabled(false).reader();
        assert!(reader.read(Path::new("/anything.mp3")).is_none());
        assert_eq!(MetadataBackend::from_enabled(true), MetadataBackend::Lofty);
    }

    #[test]
    fn clean_drops_blank_values() {
        assert_eq!(clean("  Artist "), Some("Artist".to_string()));
        assert_eq!(clean("   "), None);
    }
}
