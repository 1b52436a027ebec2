use std::fs;
use std::path::Path;

use common::{parse_filename, Enrichment, TrackRecord};
use metadata::{MetadataReader, TagInfo};

use crate::LibraryError;

pub fn build_record(path: &Path, reader: &dyn MetadataReader) -> Result<TrackRecord, LibraryError> {
    let stat = fs::metadata(path)?;
    if !stat.is_file() {
        return Err(LibraryError::NotAFile(path.to_path_buf()));
    }

    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let parsed = parse_filename(&filename);
    let enrichment = reader.read(path).map(enrichment_from_tags);

    Ok(TrackRecord::new(
        path.to_path_buf(),
        stat.len(),
        parsed,
        enrichment,
    ))
}

fn enrichment_from_tags(tags: TagInfo) -> Enrichment {
    Enrichment {
        artist: tags.artist,
        title: tags.title,
        duration_secs: tags.duration_secs,
        bitrate_kbps: tags.bitrate_kbps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadata::NoMetadata;
    use tempfile::tempdir;

    struct FixedTags(TagInfo);

    impl MetadataReader for FixedTags {
        fn read(&self, _path: &Path) -> Option<TagInfo> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn builds_parser_only_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("02 - Artist - Song.mp3");
        fs::write(&path, b"0123456789").unwrap();

        let rec = build_record(&path, &NoMetadata).unwrap();
        assert_eq!(rec.artist, "Artist");
        assert_eq!(rec.song, "Song");
        assert_eq!(rec.track_number, Some(2));
        assert_eq!(rec.size_bytes, 10);
        assert_eq!(rec.duration_secs, None);
    }

    #[test]
    fn tags_fill_missing_artist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Song Only.flac");
        fs::write(&path, b"x").unwrap();

        let reader = FixedTags(TagInfo {
            artist: Some("Tagged".to_string()),
            title: Some("Ignored".to_string()),
            duration_secs: Some(200),
            bitrate_kbps: Some(900),
        });
        let rec = build_record(&path, &reader).unwrap();
        assert_eq!(rec.artist, "Tagged");
        assert_eq!(rec.song, "Song Only");
        assert_eq!(rec.duration_secs, Some(200));
        assert_eq!(rec.bitrate_kbps, Some(900));
    }

    #[test]
    fn vanished_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = build_record(&dir.path().join("gone.mp3"), &NoMetadata).unwrap_err();
        assert!(matches!(err, LibraryError::Io(_)));
    }

    #[test]
    fn directory_is_not_a_record() {
        let dir = tempdir().unwrap();
        let err = build_record(dir.path(), &NoMetadata).unwrap_err();
        assert!(matches!(err, LibraryError::NotAFile(_)));
    }
}
